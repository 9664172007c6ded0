//! Caller identity and the role → capability permission gate.
//!
//! Callers arrive already authenticated; the core only evaluates what
//! their role tag allows at the guard point of each transition.

use serde::{Deserialize, Serialize};

/// Identity of an authenticated user, as issued by the external auth system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        UserId(s.to_string())
    }
}

/// Team (sales group) a user belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamId(pub String);

impl std::fmt::Display for TeamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TeamId {
    fn from(s: &str) -> Self {
        TeamId(s.to_string())
    }
}

/// Account role tag attached to every caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountRole {
    SuperAdmin,
    Admin,
    TeamLeader,
    Staff,
    Viewer,
}

impl AccountRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountRole::SuperAdmin => "SUPER_ADMIN",
            AccountRole::Admin => "ADMIN",
            AccountRole::TeamLeader => "TEAM_LEADER",
            AccountRole::Staff => "STAFF",
            AccountRole::Viewer => "VIEWER",
        }
    }

    /// Static capability set for this role.
    pub fn capabilities(&self) -> &'static [Capability] {
        match self {
            AccountRole::SuperAdmin | AccountRole::Admin => &[
                Capability::Reserve,
                Capability::ConfirmAny,
                Capability::ReleaseAny,
            ],
            AccountRole::TeamLeader => &[Capability::Reserve, Capability::ConfirmTeam],
            AccountRole::Staff => &[Capability::Reserve],
            AccountRole::Viewer => &[],
        }
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }
}

impl std::str::FromStr for AccountRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUPER_ADMIN" => Ok(AccountRole::SuperAdmin),
            "ADMIN" => Ok(AccountRole::Admin),
            "TEAM_LEADER" => Ok(AccountRole::TeamLeader),
            "STAFF" => Ok(AccountRole::Staff),
            "VIEWER" => Ok(AccountRole::Viewer),
            _ => Err(format!("Invalid account role: {}", s)),
        }
    }
}

/// Things a role may be allowed to do to a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Place a hold on an available slot
    Reserve,
    /// Confirm any hold
    ConfirmAny,
    /// Confirm holds placed by members of the caller's own team
    ConfirmTeam,
    /// Release any hold
    ReleaseAny,
}

/// A user as recorded on a slot (holder or confirmer).
///
/// The team is snapshotted when the record is written, so later team
/// changes do not retroactively change who may confirm a hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub team_id: Option<TeamId>,
}

/// Per-request caller context supplied by the surrounding application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityContext {
    pub user_id: UserId,
    pub role: AccountRole,
    pub team_id: Option<TeamId>,
}

impl CapabilityContext {
    pub fn new(user_id: impl Into<String>, role: AccountRole, team_id: Option<&str>) -> Self {
        Self {
            user_id: UserId(user_id.into()),
            role,
            team_id: team_id.map(TeamId::from),
        }
    }

    pub fn actor(&self) -> Actor {
        Actor {
            user_id: self.user_id.clone(),
            team_id: self.team_id.clone(),
        }
    }

    pub fn can_reserve(&self) -> bool {
        self.role.has(Capability::Reserve)
    }

    /// Holder, ADMIN/SUPER_ADMIN, or a TEAM_LEADER of the holder's team.
    pub fn can_confirm(&self, holder: &Actor) -> bool {
        if self.user_id == holder.user_id || self.role.has(Capability::ConfirmAny) {
            return true;
        }
        self.role.has(Capability::ConfirmTeam)
            && matches!(
                (&self.team_id, &holder.team_id),
                (Some(mine), Some(theirs)) if mine == theirs
            )
    }

    /// Holder or ADMIN/SUPER_ADMIN.
    pub fn can_release(&self, holder: &Actor) -> bool {
        self.user_id == holder.user_id || self.role.has(Capability::ReleaseAny)
    }
}
