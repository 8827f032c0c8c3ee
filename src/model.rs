use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Minute offset from local midnight. Appointment starts live in `[0, 1440)`;
/// computed ends may run past midnight.
pub type Minute = u32;

pub type AppointmentId = Ulid;
pub type ResourceId = Ulid;

pub const MINUTES_PER_DAY: Minute = 24 * 60;

/// Sentinel id for the "unassigned" calendar column.
pub const UNASSIGNED_RESOURCE: ResourceId = Ulid(0);

/// Half-open interval `[start, end)` in minutes of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Minute,
    pub end: Minute,
}

impl Span {
    pub fn new(start: Minute, end: Minute) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration(&self) -> Minute {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        !(self.end <= other.start || self.start >= other.end)
    }

    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// Lifecycle of an appointment as tracked by the booking store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Arrived,
    InService,
    PendingCheckout,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    /// Cancelled and no-show appointments leave their chair free.
    pub fn occupies_slot(self) -> bool {
        !matches!(self, AppointmentStatus::Cancelled | AppointmentStatus::NoShow)
    }

    pub fn is_movable(self) -> bool {
        matches!(self, AppointmentStatus::Pending | AppointmentStatus::Confirmed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Arrived => "arrived",
            AppointmentStatus::InService => "in-service",
            AppointmentStatus::PendingCheckout => "pending-checkout",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no-show",
        }
    }
}

/// Which calendar column an appointment sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceTarget {
    Unassigned,
    Staff(ResourceId),
}

impl ResourceTarget {
    pub fn from_option(id: Option<ResourceId>) -> Self {
        match id {
            Some(id) if id != UNASSIGNED_RESOURCE => ResourceTarget::Staff(id),
            _ => ResourceTarget::Unassigned,
        }
    }

    pub fn as_option(&self) -> Option<ResourceId> {
        match self {
            ResourceTarget::Unassigned => None,
            ResourceTarget::Staff(id) => Some(*id),
        }
    }

    /// Parse a drop-target identifier: `"unassigned"` or a staff ULID.
    /// Blank or malformed input yields `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if raw.eq_ignore_ascii_case("unassigned") {
            return Some(ResourceTarget::Unassigned);
        }
        Ulid::from_string(raw).ok().map(|id| Self::from_option(Some(id)))
    }
}

impl std::fmt::Display for ResourceTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceTarget::Unassigned => write!(f, "unassigned"),
            ResourceTarget::Staff(id) => write!(f, "{id}"),
        }
    }
}

/// Where an appointment sits: column, day and start minute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Placement {
    pub resource: ResourceTarget,
    pub day: NaiveDate,
    pub start: Minute,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: AppointmentId,
    /// `None` means the appointment sits in the unassigned column.
    #[serde(default)]
    pub resource_id: Option<ResourceId>,
    pub day: NaiveDate,
    pub start: Minute,
    /// Explicit service duration in minutes, if the booking carries one.
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default)]
    pub service_name: String,
    pub status: AppointmentStatus,
    /// Linked external work order. Anything with a job card is already in the shop.
    #[serde(default)]
    pub job_card_id: Option<String>,
}

impl Appointment {
    pub fn resource_target(&self) -> ResourceTarget {
        ResourceTarget::from_option(self.resource_id)
    }

    pub fn placement(&self) -> Placement {
        Placement {
            resource: self.resource_target(),
            day: self.day,
            start: self.start,
        }
    }

    /// Copy of this appointment moved to `placement`. Identity is kept.
    pub fn relocated(&self, placement: Placement) -> Self {
        Self {
            resource_id: placement.resource.as_option(),
            day: placement.day,
            start: placement.start,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub name: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Immutable snapshot of a salon's appointments as read from the booking store.
///
/// `revision` changes whenever the store applies a write, so callers can tell two
/// snapshots apart without diffing them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub revision: u64,
    pub appointments: Vec<Appointment>,
    #[serde(default)]
    pub resources: Vec<Resource>,
}

impl Schedule {
    pub fn new(revision: u64, appointments: Vec<Appointment>, resources: Vec<Resource>) -> Self {
        Self {
            revision,
            appointments,
            resources,
        }
    }

    pub fn get(&self, id: &AppointmentId) -> Option<&Appointment> {
        self.appointments.iter().find(|a| a.id == *id)
    }

    /// A target is placeable if it is the unassigned column or an active staff member.
    /// A snapshot without a roster does not restrict staff ids.
    pub fn accepts_target(&self, target: &ResourceTarget) -> bool {
        match target {
            ResourceTarget::Unassigned => true,
            ResourceTarget::Staff(_) if self.resources.is_empty() => true,
            ResourceTarget::Staff(id) => self.resources.iter().any(|r| r.id == *id && r.active),
        }
    }
}

/// The single write a committed relocation sends to the booking store.
///
/// `expected` is the placement the session saw when it began; the store applies the
/// move only if the appointment still sits there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RescheduleIntent {
    pub appointment_id: AppointmentId,
    pub expected: Placement,
    pub target: Placement,
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub index: usize,
    pub minute: Minute,
    pub label_24h: String,
    pub label_12h: String,
}
