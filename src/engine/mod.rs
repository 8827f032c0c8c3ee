mod duration;
mod error;
pub mod grid;
mod overlap;
mod placement;
mod session;

pub use duration::{DurationResolver, DurationRule, DurationTable, DurationTableBuilder};
pub use error::SchedulingError;
pub use grid::BusinessHours;
pub use overlap::{conflict_count, span_of, ConflictGroup, Entry, OverlapIndex};
pub use placement::{BoundaryCheck, Candidate, PlacementResult, PlacementValidator, RejectReason};
pub use session::{Evaluation, RelocationSession, SessionState};

use chrono::{NaiveDate, NaiveDateTime};

use crate::config::EngineConfig;
use crate::model::*;

/// The synchronous scheduling API a calendar or booking layer calls into.
///
/// Holds only configuration. Every query takes the schedule snapshot to judge
/// against, so a `Scheduler` can be shared freely.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    validator: PlacementValidator,
}

impl Scheduler {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            validator: PlacementValidator::new(
                config.hours,
                config.boundary,
                DurationResolver::new(config.durations),
            ),
        }
    }

    pub fn validator(&self) -> &PlacementValidator {
        &self.validator
    }

    pub fn hours(&self) -> &BusinessHours {
        self.validator.hours()
    }

    pub fn list_time_slots(&self) -> Vec<TimeSlot> {
        grid::list_time_slots(self.validator.hours())
    }

    pub fn resolve_duration(&self, appointment: &Appointment) -> u32 {
        self.validator.durations().resolve(appointment)
    }

    /// Appointments sharing `target`'s column and day whose spans overlap it.
    pub fn find_conflicts(&self, target: &Appointment, schedule: &Schedule) -> Vec<Appointment> {
        self.validator
            .index(schedule)
            .overlaps_of(target)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Validate raw drop-target input: `resource` is a staff ULID or `"unassigned"`,
    /// `time` is `"HH:MM"`.
    pub fn validate_placement(
        &self,
        resource: &str,
        time: &str,
        day: NaiveDate,
        duration: u32,
        schedule: &Schedule,
    ) -> PlacementResult {
        self.validator
            .validate(&Candidate::parse(resource, time, day, duration), schedule)
    }

    pub fn validate(&self, candidate: &Candidate, schedule: &Schedule) -> PlacementResult {
        self.validator.validate(candidate, schedule)
    }

    pub fn conflict_count(&self, schedule: &Schedule) -> usize {
        self.validator.index(schedule).conflict_count()
    }

    pub fn conflict_groups(&self, schedule: &Schedule) -> Vec<ConflictGroup> {
        self.validator.index(schedule).conflict_groups()
    }

    pub fn available_starts(
        &self,
        resource: ResourceTarget,
        day: NaiveDate,
        duration: u32,
        schedule: &Schedule,
    ) -> Vec<Minute> {
        self.validator
            .available_starts(resource, day, duration, None, schedule)
    }

    pub fn begin_relocation(
        &self,
        source: Appointment,
        now: NaiveDateTime,
    ) -> Result<RelocationSession<'_>, SchedulingError> {
        RelocationSession::begin(&self.validator, source, now)
    }

    /// [`begin_relocation`](Self::begin_relocation) at the salon's local wall-clock time.
    pub fn begin_relocation_now(
        &self,
        source: Appointment,
    ) -> Result<RelocationSession<'_>, SchedulingError> {
        self.begin_relocation(source, chrono::Local::now().naive_local())
    }
}
