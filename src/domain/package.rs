//! Multi-day package links between two slots.
//!
//! A link is a plain association: neither transitions nor sweeps look at
//! it, and each linked slot moves through its lifecycle on its own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::slot::SlotId;

/// Unique identifier for a package link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageLinkId(pub Uuid);

impl std::fmt::Display for PackageLinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl From<Uuid> for PackageLinkId {
    fn from(uuid: Uuid) -> Self {
        PackageLinkId(uuid)
    }
}

impl std::ops::Deref for PackageLinkId {
    type Target = Uuid;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageLink {
    pub id: PackageLinkId,
    pub primary_slot_id: SlotId,
    pub connected_slot_id: SlotId,
    /// Free-text accommodation details for the package
    pub accommodation_note: String,
    pub created_at: DateTime<Utc>,
}

impl PackageLink {
    pub fn involves(&self, slot_id: SlotId) -> bool {
        self.primary_slot_id == slot_id || self.connected_slot_id == slot_id
    }

    /// The slot on the other side of the link from `slot_id`.
    pub fn other_side(&self, slot_id: SlotId) -> Option<SlotId> {
        if self.primary_slot_id == slot_id {
            Some(self.connected_slot_id)
        } else if self.connected_slot_id == slot_id {
            Some(self.primary_slot_id)
        } else {
            None
        }
    }
}
