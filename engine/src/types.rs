//! Domain value objects for the gig marketplace.
//!
//! This module contains the identifier newtypes and small value objects
//! shared by every engine component. Record types (gigs, venues, fee
//! records) live in [`crate::state`].

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a gig instance
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GigId(Uuid);

impl GigId {
    /// Creates a new random `GigId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `GigId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for GigId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GigId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a venue profile
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VenueId(Uuid);

impl VenueId {
    /// Creates a new random `VenueId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `VenueId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for VenueId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VenueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a performer profile
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PerformerId(Uuid);

impl PerformerId {
    /// Creates a new random `PerformerId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `PerformerId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PerformerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PerformerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a reusable gig template
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TemplateId(Uuid);

impl TemplateId {
    /// Creates a new random `TemplateId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `TemplateId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TemplateId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// External processor identifiers
// ============================================================================

/// Identifier of a charge held by the payment processor
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChargeId(String);

impl ChargeId {
    /// Wrap a processor-issued charge identifier
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw identifier
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChargeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a completed payout transfer
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferId(String);

impl TransferId {
    /// Wrap a processor-issued transfer identifier
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw identifier
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a completed refund
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RefundId(String);

impl RefundId {
    /// Wrap a processor-issued refund identifier
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw identifier
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RefundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Performer's connected payout destination at the payment processor
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PayoutAccount(String);

impl PayoutAccount {
    /// Wrap a processor-issued account identifier
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw identifier
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PayoutAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Idempotency key for payment-processor calls.
///
/// Derived from the gig id plus the transition being applied, so a retried
/// call after a lost acknowledgement can never double-charge or
/// double-transfer.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Key for a lifecycle transition of a gig
    #[must_use]
    pub fn for_transition(gig_id: GigId, transition: &str) -> Self {
        Self(format!("{gig_id}:{transition}"))
    }

    /// The raw key
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Money Value Object (pence-based to avoid floating point errors)
// ============================================================================

/// Represents money in pence to avoid floating-point arithmetic errors
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money(u64);

impl Money {
    /// A zero amount
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from pence
    #[must_use]
    pub const fn from_pence(pence: u64) -> Self {
        Self(pence)
    }

    /// Creates a `Money` value from whole pounds
    ///
    /// # Panics
    ///
    /// Panics if the conversion would overflow (`pounds * 100 > u64::MAX`).
    /// Use `checked_from_pounds` for non-panicking conversion.
    #[must_use]
    #[allow(clippy::panic)]
    pub const fn from_pounds(pounds: u64) -> Self {
        match pounds.checked_mul(100) {
            Some(pence) => Self(pence),
            None => panic!("Money::from_pounds overflow"),
        }
    }

    /// Creates a `Money` value from whole pounds with overflow checking
    #[must_use]
    pub const fn checked_from_pounds(pounds: u64) -> Option<Self> {
        match pounds.checked_mul(100) {
            Some(pence) => Some(Self(pence)),
            None => None,
        }
    }

    /// Returns the amount in pence
    #[must_use]
    pub const fn pence(&self) -> u64 {
        self.0
    }

    /// Returns the amount in whole pounds (rounded down)
    #[must_use]
    pub const fn pounds(&self) -> u64 {
        self.0 / 100
    }

    /// Checks if the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Adds two money amounts with overflow checking
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }

    /// Adds two money amounts, saturating at the numeric bound
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Subtracts two money amounts (returns `None` if the result would be
    /// negative)
    #[must_use]
    pub const fn checked_sub(self, other: Self) -> Option<Self> {
        if self.0 >= other.0 {
            Some(Self(self.0 - other.0))
        } else {
            None
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "£{}.{:02}", self.pounds(), self.0 % 100)
    }
}

/// Settlement currency for a gig fee
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    /// Pound sterling
    #[default]
    Gbp,
    /// Euro
    Eur,
    /// United States dollar
    Usd,
}

impl Currency {
    /// ISO 4217 code
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Gbp => "GBP",
            Self::Eur => "EUR",
            Self::Usd => "USD",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Scheduling
// ============================================================================

/// When a gig takes place: a local calendar date, a start time, and a
/// duration.
///
/// The date and time are *local calendar values* in the engine's reference
/// timezone; they are only resolved to instants at the calendar boundary
/// ([`crate::calendar`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GigSchedule {
    /// Calendar date of the performance (ISO 8601 date-only)
    pub date: NaiveDate,

    /// Local start time
    pub start_time: NaiveTime,

    /// Performance duration in minutes
    pub duration_minutes: u32,
}

impl GigSchedule {
    /// Create a schedule
    #[must_use]
    pub const fn new(date: NaiveDate, start_time: NaiveTime, duration_minutes: u32) -> Self {
        Self {
            date,
            start_time,
            duration_minutes,
        }
    }

    /// Local wall-clock start of the performance
    #[must_use]
    pub fn local_start(&self) -> NaiveDateTime {
        self.date.and_time(self.start_time)
    }

    /// Local wall-clock end of the performance
    #[must_use]
    pub fn local_end(&self) -> NaiveDateTime {
        self.local_start() + chrono::Duration::minutes(i64::from(self.duration_minutes))
    }

    /// A schedule identical to this one on a different date
    #[must_use]
    pub const fn on_date(&self, date: NaiveDate) -> Self {
        Self {
            date,
            start_time: self.start_time,
            duration_minutes: self.duration_minutes,
        }
    }
}

// ============================================================================
// Applications
// ============================================================================

/// Where one performer's application to one gig stands
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplicationStatus {
    /// Applied, awaiting the venue's decision
    Applied,
    /// Accepted by the venue
    Accepted,
    /// Declined by the venue
    Declined,
}

/// One performer's application to a gig
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Application {
    /// The applying performer
    pub performer_id: PerformerId,

    /// Application status
    pub status: ApplicationStatus,

    /// When the application was made
    pub applied_at: chrono::DateTime<chrono::Utc>,
}
