//! Core types for tee-time slots.
//!
//! This module defines the slot lifecycle using the typestate pattern. Each
//! slot progresses through distinct states, and which lifecycle fields exist
//! is decided by the state type rather than by nullable columns.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::capability::Actor;
use crate::domain::classify::{self, BookingCategory, TimeBucket};
use crate::domain::course::CourseId;
use crate::error::{Result, TeeTimeError};

/// Status column value for filtering and conditional updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    Available,
    Held,
    Confirmed,
    Completed,
    Cancelled,
}

impl SlotStatus {
    /// Statuses that count toward live availability on the dashboard.
    pub const LIVE: [SlotStatus; 3] = [
        SlotStatus::Available,
        SlotStatus::Held,
        SlotStatus::Confirmed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SlotStatus::Available => "available",
            SlotStatus::Held => "held",
            SlotStatus::Confirmed => "confirmed",
            SlotStatus::Completed => "completed",
            SlotStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SlotStatus::Completed | SlotStatus::Cancelled)
    }
}

impl std::str::FromStr for SlotStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "available" => Ok(SlotStatus::Available),
            "held" => Ok(SlotStatus::Held),
            "confirmed" => Ok(SlotStatus::Confirmed),
            "completed" => Ok(SlotStatus::Completed),
            "cancelled" => Ok(SlotStatus::Cancelled),
            _ => Err(format!("Invalid slot status: {}", s)),
        }
    }
}

/// Marker trait for valid slot states.
pub trait SlotState: Send + Sync {}

/// A tee-time slot in a specific lifecycle state.
///
/// `version` is the repository sequence number the slot was read at. A
/// transition hands the next-state slot back to the repository with this
/// version untouched; the repository applies it only if the stored row still
/// has the expected status and version.
#[derive(Debug, Clone, Serialize)]
pub struct Slot<T: SlotState> {
    /// The current state of the slot.
    pub state: T,
    /// Attributes fixed at registration.
    pub data: SlotData,
    /// Repository sequence number.
    pub version: i64,
}

/// Whether the slot is sold on its own or as half of a multi-day package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotKind {
    SingleDay,
    Package,
}

impl SlotKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotKind::SingleDay => "single_day",
            SlotKind::Package => "package",
        }
    }
}

impl std::str::FromStr for SlotKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "single_day" => Ok(SlotKind::SingleDay),
            "package" => Ok(SlotKind::Package),
            _ => Err(format!("Invalid slot kind: {}", s)),
        }
    }
}

/// Green fee as a fixed-point amount with one decimal place, stored in tenths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GreenFee(pub i64);

impl GreenFee {
    pub fn tenths(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for GreenFee {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.0 / 10, self.0 % 10)
    }
}

impl std::str::FromStr for GreenFee {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        let (whole, frac) = match s.split_once('.') {
            Some((whole, frac)) if frac.len() == 1 => (whole, frac),
            Some(_) => return Err(format!("Green fee allows exactly one decimal place: {:?}", s)),
            None => (s, ""),
        };

        let all_digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
        if whole.is_empty() || !all_digits(whole) || !all_digits(frac) {
            return Err(format!("Invalid green fee: {:?}", s));
        }

        let whole: i64 = whole
            .parse()
            .map_err(|_| format!("Green fee out of range: {:?}", s))?;
        let tenth: i64 = if frac.is_empty() { 0 } else { frac.parse().unwrap_or(0) };

        whole
            .checked_mul(10)
            .and_then(|w| w.checked_add(tenth))
            .map(GreenFee)
            .ok_or_else(|| format!("Green fee out of range: {:?}", s))
    }
}

/// Attributes fixed when the slot is registered, including the derived
/// bucket and category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotData {
    pub id: SlotId,
    pub course_id: CourseId,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub green_fee: GreenFee,
    /// 1..=4
    pub player_count: u8,
    pub request_type: String,
    pub hole_count: u8,
    pub caddy_type: String,
    pub includes_deposit: bool,
    pub includes_meal: bool,
    pub includes_cart: bool,
    pub requirement_note: String,
    pub kind: SlotKind,

    // Derived once by the classifier
    pub time_bucket: TimeBucket,
    pub category: BookingCategory,
}

impl SlotData {
    /// Local date and time the round starts.
    pub fn scheduled_local(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }

    /// Start of the round as an instant, given the configured zone.
    pub fn scheduled_at(&self, offset: FixedOffset) -> DateTime<Utc> {
        // A fixed offset has no gaps or folds, so the mapping is always unique
        (self.scheduled_local() - offset).and_utc()
    }
}

// ============================================================================
// Slot States
// ============================================================================

/// Open for holds. Also the state a released or expired hold returns to.
#[derive(Debug, Clone, Serialize)]
pub struct Available {}

impl SlotState for Available {}

/// Exclusively claimed by one caller until confirmed, released or expired.
#[derive(Debug, Clone, Serialize)]
pub struct Held {
    pub holder: Actor,
    pub held_at: DateTime<Utc>,
}

impl SlotState for Held {}

/// Booking confirmed. The hold record is kept for history.
#[derive(Debug, Clone, Serialize)]
pub struct Confirmed {
    pub holder: Actor,
    pub held_at: DateTime<Utc>,
    pub confirmer: Actor,
    pub confirmed_at: DateTime<Utc>,
}

impl SlotState for Confirmed {}

/// The round was played (terminal).
#[derive(Debug, Clone, Serialize)]
pub struct Completed {
    pub holder: Actor,
    pub held_at: DateTime<Utc>,
    pub confirmer: Actor,
    pub confirmed_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl SlotState for Completed {}

/// Never booked and now in the past (terminal).
#[derive(Debug, Clone, Serialize)]
pub struct Cancelled {
    pub cancelled_at: DateTime<Utc>,
}

impl SlotState for Cancelled {}

/// Unique identifier for a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(pub Uuid);

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Display only first 8 characters for readability in logs
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl From<Uuid> for SlotId {
    fn from(uuid: Uuid) -> Self {
        SlotId(uuid)
    }
}

impl std::ops::Deref for SlotId {
    type Target = Uuid;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// ============================================================================
// Unified Slot Representation
// ============================================================================

/// Enum that can hold a slot in any state.
///
/// Used by storage and read endpoints that handle slots uniformly.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", content = "slot", rename_all = "lowercase")]
pub enum AnySlot {
    Available(Slot<Available>),
    Held(Slot<Held>),
    Confirmed(Slot<Confirmed>),
    Completed(Slot<Completed>),
    Cancelled(Slot<Cancelled>),
}

impl AnySlot {
    pub fn id(&self) -> SlotId {
        self.data().id
    }

    pub fn status(&self) -> SlotStatus {
        match self {
            AnySlot::Available(_) => SlotStatus::Available,
            AnySlot::Held(_) => SlotStatus::Held,
            AnySlot::Confirmed(_) => SlotStatus::Confirmed,
            AnySlot::Completed(_) => SlotStatus::Completed,
            AnySlot::Cancelled(_) => SlotStatus::Cancelled,
        }
    }

    pub fn data(&self) -> &SlotData {
        match self {
            AnySlot::Available(s) => &s.data,
            AnySlot::Held(s) => &s.data,
            AnySlot::Confirmed(s) => &s.data,
            AnySlot::Completed(s) => &s.data,
            AnySlot::Cancelled(s) => &s.data,
        }
    }

    pub fn version(&self) -> i64 {
        match self {
            AnySlot::Available(s) => s.version,
            AnySlot::Held(s) => s.version,
            AnySlot::Confirmed(s) => s.version,
            AnySlot::Completed(s) => s.version,
            AnySlot::Cancelled(s) => s.version,
        }
    }

    pub(crate) fn set_version(&mut self, version: i64) {
        match self {
            AnySlot::Available(s) => s.version = version,
            AnySlot::Held(s) => s.version = version,
            AnySlot::Confirmed(s) => s.version = version,
            AnySlot::Completed(s) => s.version = version,
            AnySlot::Cancelled(s) => s.version = version,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    /// Holder recorded on the slot, if its state carries one.
    pub fn holder(&self) -> Option<(&Actor, DateTime<Utc>)> {
        match self {
            AnySlot::Held(s) => Some((&s.state.holder, s.state.held_at)),
            AnySlot::Confirmed(s) => Some((&s.state.holder, s.state.held_at)),
            AnySlot::Completed(s) => Some((&s.state.holder, s.state.held_at)),
            AnySlot::Available(_) | AnySlot::Cancelled(_) => None,
        }
    }

    /// Confirmer recorded on the slot, if its state carries one.
    pub fn confirmer(&self) -> Option<(&Actor, DateTime<Utc>)> {
        match self {
            AnySlot::Confirmed(s) => Some((&s.state.confirmer, s.state.confirmed_at)),
            AnySlot::Completed(s) => Some((&s.state.confirmer, s.state.confirmed_at)),
            AnySlot::Available(_) | AnySlot::Held(_) | AnySlot::Cancelled(_) => None,
        }
    }

    pub fn into_available(self) -> Option<Slot<Available>> {
        match self {
            AnySlot::Available(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_held(self) -> Option<Slot<Held>> {
        match self {
            AnySlot::Held(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_confirmed(self) -> Option<Slot<Confirmed>> {
        match self {
            AnySlot::Confirmed(s) => Some(s),
            _ => None,
        }
    }
}

// Conversion traits for going from typed Slot to AnySlot

impl From<Slot<Available>> for AnySlot {
    fn from(s: Slot<Available>) -> Self {
        AnySlot::Available(s)
    }
}

impl From<Slot<Held>> for AnySlot {
    fn from(s: Slot<Held>) -> Self {
        AnySlot::Held(s)
    }
}

impl From<Slot<Confirmed>> for AnySlot {
    fn from(s: Slot<Confirmed>) -> Self {
        AnySlot::Confirmed(s)
    }
}

impl From<Slot<Completed>> for AnySlot {
    fn from(s: Slot<Completed>) -> Self {
        AnySlot::Completed(s)
    }
}

impl From<Slot<Cancelled>> for AnySlot {
    fn from(s: Slot<Cancelled>) -> Self {
        AnySlot::Cancelled(s)
    }
}

// ============================================================================
// Registration Input
// ============================================================================

fn default_kind() -> SlotKind {
    SlotKind::SingleDay
}

/// Raw slot attributes as submitted by an operator, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotInput {
    pub course_id: CourseId,
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:MM` (seconds optional)
    pub time: String,
    /// Decimal text with at most one fractional digit, e.g. `"185000"` or `"92.5"`
    pub green_fee: String,
    pub player_count: u8,
    pub request_type: String,
    pub hole_count: u8,
    pub caddy_type: String,
    #[serde(default)]
    pub includes_deposit: bool,
    #[serde(default)]
    pub includes_meal: bool,
    #[serde(default)]
    pub includes_cart: bool,
    #[serde(default)]
    pub requirement_note: String,
    #[serde(default = "default_kind")]
    pub kind: SlotKind,
}

impl SlotInput {
    /// Validate the raw input and classify it into fixed slot attributes.
    pub fn into_data(self, id: SlotId) -> Result<SlotData> {
        let date = NaiveDate::parse_from_str(self.date.trim(), "%Y-%m-%d").map_err(|e| {
            TeeTimeError::InvalidInput(format!("Invalid date {:?}: {}", self.date, e))
        })?;
        let time = parse_tee_time(&self.time)?;
        let green_fee: GreenFee = self.green_fee.parse().map_err(TeeTimeError::InvalidInput)?;

        if !(1..=4).contains(&self.player_count) {
            return Err(TeeTimeError::InvalidInput(format!(
                "player_count must be between 1 and 4, got {}",
                self.player_count
            )));
        }
        if self.hole_count == 0 {
            return Err(TeeTimeError::InvalidInput(
                "hole_count must be positive".to_string(),
            ));
        }

        Ok(SlotData {
            id,
            course_id: self.course_id,
            date,
            time,
            green_fee,
            player_count: self.player_count,
            request_type: self.request_type,
            hole_count: self.hole_count,
            caddy_type: self.caddy_type,
            includes_deposit: self.includes_deposit,
            includes_meal: self.includes_meal,
            includes_cart: self.includes_cart,
            requirement_note: self.requirement_note,
            kind: self.kind,
            time_bucket: classify::time_bucket(time),
            category: classify::booking_category(self.player_count),
        })
    }
}

fn parse_tee_time(raw: &str) -> Result<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map_err(|e| TeeTimeError::InvalidInput(format!("Invalid time {:?}: {}", raw, e)))
}

// ============================================================================
// Read Projection
// ============================================================================

/// Flat, serializable projection of a slot returned by every endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotView {
    pub id: SlotId,
    pub status: SlotStatus,
    pub version: i64,
    pub course_id: CourseId,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub green_fee: String,
    pub player_count: u8,
    pub request_type: String,
    pub hole_count: u8,
    pub caddy_type: String,
    pub includes_deposit: bool,
    pub includes_meal: bool,
    pub includes_cart: bool,
    pub requirement_note: String,
    pub kind: SlotKind,
    pub time_bucket: TimeBucket,
    pub category: BookingCategory,
    pub holder: Option<Actor>,
    pub held_at: Option<DateTime<Utc>>,
    pub confirmer: Option<Actor>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl From<&AnySlot> for SlotView {
    fn from(slot: &AnySlot) -> Self {
        let data = slot.data();
        let (holder, held_at) = match slot.holder() {
            Some((actor, at)) => (Some(actor.clone()), Some(at)),
            None => (None, None),
        };
        let (confirmer, confirmed_at) = match slot.confirmer() {
            Some((actor, at)) => (Some(actor.clone()), Some(at)),
            None => (None, None),
        };

        SlotView {
            id: data.id,
            status: slot.status(),
            version: slot.version(),
            course_id: data.course_id,
            date: data.date,
            time: data.time,
            green_fee: data.green_fee.to_string(),
            player_count: data.player_count,
            request_type: data.request_type.clone(),
            hole_count: data.hole_count,
            caddy_type: data.caddy_type.clone(),
            includes_deposit: data.includes_deposit,
            includes_meal: data.includes_meal,
            includes_cart: data.includes_cart,
            requirement_note: data.requirement_note.clone(),
            kind: data.kind,
            time_bucket: data.time_bucket,
            category: data.category,
            holder,
            held_at,
            confirmer,
            confirmed_at,
        }
    }
}

impl<T: SlotState + Clone> From<&Slot<T>> for SlotView
where
    AnySlot: From<Slot<T>>,
{
    fn from(slot: &Slot<T>) -> Self {
        SlotView::from(&AnySlot::from(slot.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> SlotInput {
        SlotInput {
            course_id: CourseId(Uuid::new_v4()),
            date: "2026-07-04".to_string(),
            time: "14:59".to_string(),
            green_fee: "185000.5".to_string(),
            player_count: 3,
            request_type: "transfer".to_string(),
            hole_count: 18,
            caddy_type: "dedicated".to_string(),
            includes_deposit: true,
            includes_meal: false,
            includes_cart: true,
            requirement_note: String::new(),
            kind: SlotKind::SingleDay,
        }
    }

    #[test]
    fn test_green_fee_parsing() {
        assert_eq!("150000".parse::<GreenFee>().unwrap(), GreenFee(1_500_000));
        assert_eq!("92.5".parse::<GreenFee>().unwrap(), GreenFee(925));
        assert_eq!("0.0".parse::<GreenFee>().unwrap(), GreenFee(0));
        assert_eq!(GreenFee(925).to_string(), "92.5");

        for bad in ["", "1.25", "-5", "abc", ".5", "1.", "1.x"] {
            assert!(bad.parse::<GreenFee>().is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_input_classifies_once() {
        let data = input().into_data(SlotId(Uuid::new_v4())).unwrap();
        assert_eq!(data.time_bucket, TimeBucket::Midday);
        assert_eq!(data.category, BookingCategory::Shared);
        assert_eq!(data.green_fee, GreenFee(1_850_005));

        let full = SlotInput {
            player_count: 4,
            time: "15:00".to_string(),
            ..input()
        }
        .into_data(SlotId(Uuid::new_v4()))
        .unwrap();
        assert_eq!(full.time_bucket, TimeBucket::Evening);
        assert_eq!(full.category, BookingCategory::FullGroup);
    }

    #[test]
    fn test_input_rejects_malformed_fields() {
        let id = SlotId(Uuid::new_v4());
        let cases = [
            SlotInput { player_count: 0, ..input() },
            SlotInput { player_count: 5, ..input() },
            SlotInput { date: "2026-13-01".to_string(), ..input() },
            SlotInput { time: "25:00".to_string(), ..input() },
            SlotInput { green_fee: "12.34".to_string(), ..input() },
            SlotInput { hole_count: 0, ..input() },
        ];
        for case in cases {
            assert!(matches!(
                case.into_data(id),
                Err(TeeTimeError::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn test_scheduled_at_applies_offset() {
        let data = SlotInput {
            time: "07:30".to_string(),
            ..input()
        }
        .into_data(SlotId(Uuid::new_v4()))
        .unwrap();
        let seoul = FixedOffset::east_opt(9 * 3600).unwrap();
        let at = data.scheduled_at(seoul);
        assert_eq!(at.to_rfc3339(), "2026-07-03T22:30:00+00:00");
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            SlotStatus::Available,
            SlotStatus::Held,
            SlotStatus::Confirmed,
            SlotStatus::Completed,
            SlotStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<SlotStatus>().unwrap(), status);
        }
        assert!(SlotStatus::Completed.is_terminal());
        assert!(!SlotStatus::Held.is_terminal());
    }
}
