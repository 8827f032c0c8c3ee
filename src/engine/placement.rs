use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::limits::MAX_DURATION_MINUTES;
use crate::model::*;

use super::duration::DurationResolver;
use super::grid::{self, BusinessHours};
use super::overlap::OverlapIndex;
use super::SchedulingError;

/// How strictly the business-hours window is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BoundaryCheck {
    /// Start and computed end must both fall inside opening hours.
    #[default]
    StartAndEnd,
    /// Legacy mode: only the start is checked, so a late booking may run past closing.
    StartOnly,
}

impl BoundaryCheck {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "start-and-end" | "start_and_end" => Some(BoundaryCheck::StartAndEnd),
            "start-only" | "start_only" => Some(BoundaryCheck::StartOnly),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RejectReason {
    OutsideBusinessHours,
    /// Conflicting appointment ids in start order.
    ConflictsWith(Vec<AppointmentId>),
    InvalidResourceOrTime,
}

impl RejectReason {
    /// Text a calendar can show next to the drop target.
    pub fn describe(&self) -> String {
        match self {
            RejectReason::OutsideBusinessHours => "Outside business hours".to_string(),
            RejectReason::ConflictsWith(ids) if ids.len() == 1 => {
                "Overlaps another appointment".to_string()
            }
            RejectReason::ConflictsWith(ids) => {
                format!("Overlaps {} other appointments", ids.len())
            }
            RejectReason::InvalidResourceOrTime => "Invalid staff member or time".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PlacementResult {
    Valid,
    Rejected(RejectReason),
}

impl PlacementResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, PlacementResult::Valid)
    }

    pub fn reason(&self) -> Option<&RejectReason> {
        match self {
            PlacementResult::Valid => None,
            PlacementResult::Rejected(reason) => Some(reason),
        }
    }

    pub fn conflicting_ids(&self) -> &[AppointmentId] {
        match self {
            PlacementResult::Rejected(RejectReason::ConflictsWith(ids)) => ids,
            _ => &[],
        }
    }

    /// For callers that want to `?` a verdict.
    pub fn into_result(self) -> Result<(), SchedulingError> {
        match self {
            PlacementResult::Valid => Ok(()),
            PlacementResult::Rejected(reason) => Err(reason.into()),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            PlacementResult::Valid => "valid",
            PlacementResult::Rejected(RejectReason::OutsideBusinessHours) => "outside_hours",
            PlacementResult::Rejected(RejectReason::ConflictsWith(_)) => "conflict",
            PlacementResult::Rejected(RejectReason::InvalidResourceOrTime) => "invalid",
        }
    }
}

/// A proposed placement as it arrives from input. Resource and start stay optional
/// because the drop target may be missing or unparseable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    /// The appointment being moved, excluded from its own conflict check.
    pub appointment_id: Option<AppointmentId>,
    pub resource: Option<ResourceTarget>,
    pub start: Option<Minute>,
    pub day: NaiveDate,
    pub duration: u32,
}

impl Candidate {
    pub fn new(resource: ResourceTarget, start: Minute, day: NaiveDate, duration: u32) -> Self {
        Self {
            appointment_id: None,
            resource: Some(resource),
            start: Some(start),
            day,
            duration,
        }
    }

    /// Build from raw drop-target strings: a staff ULID or `"unassigned"`, and `"HH:MM"`.
    pub fn parse(resource: &str, time: &str, day: NaiveDate, duration: u32) -> Self {
        Self {
            appointment_id: None,
            resource: ResourceTarget::parse(resource),
            start: grid::parse_time(time),
            day,
            duration,
        }
    }

    pub fn moving(mut self, appointment_id: AppointmentId) -> Self {
        self.appointment_id = Some(appointment_id);
        self
    }
}

/// Decides whether a candidate placement is legal. Purely advisory: the booking store
/// re-validates on write.
#[derive(Debug, Clone, Default)]
pub struct PlacementValidator {
    hours: BusinessHours,
    boundary: BoundaryCheck,
    durations: DurationResolver,
}

impl PlacementValidator {
    pub fn new(hours: BusinessHours, boundary: BoundaryCheck, durations: DurationResolver) -> Self {
        Self {
            hours,
            boundary,
            durations,
        }
    }

    pub fn hours(&self) -> &BusinessHours {
        &self.hours
    }

    pub fn boundary(&self) -> BoundaryCheck {
        self.boundary
    }

    pub fn durations(&self) -> &DurationResolver {
        &self.durations
    }

    pub fn index<'a>(&'a self, schedule: &'a Schedule) -> OverlapIndex<'a> {
        OverlapIndex::build(&schedule.appointments, &self.durations)
    }

    pub fn validate(&self, candidate: &Candidate, schedule: &Schedule) -> PlacementResult {
        let index = self.index(schedule);
        self.validate_in(candidate, schedule, &index)
    }

    /// Validate against a prebuilt index of `schedule`.
    pub fn validate_in(
        &self,
        candidate: &Candidate,
        schedule: &Schedule,
        index: &OverlapIndex<'_>,
    ) -> PlacementResult {
        let result = self.check(candidate, schedule, index);
        debug!(
            resource = ?candidate.resource,
            start = ?candidate.start,
            day = %candidate.day,
            duration = candidate.duration,
            verdict = result.label(),
            "placement validated"
        );
        metrics::counter!(crate::observability::PLACEMENTS_VALIDATED_TOTAL, "verdict" => result.label())
            .increment(1);
        result
    }

    fn check(
        &self,
        candidate: &Candidate,
        schedule: &Schedule,
        index: &OverlapIndex<'_>,
    ) -> PlacementResult {
        let (Some(resource), Some(start)) = (candidate.resource, candidate.start) else {
            return PlacementResult::Rejected(RejectReason::InvalidResourceOrTime);
        };
        if start >= MINUTES_PER_DAY
            || candidate.duration == 0
            || candidate.duration > MAX_DURATION_MINUTES
            || !schedule.accepts_target(&resource)
        {
            return PlacementResult::Rejected(RejectReason::InvalidResourceOrTime);
        }
        let Some(end) = start.checked_add(candidate.duration) else {
            return PlacementResult::Rejected(RejectReason::InvalidResourceOrTime);
        };

        let span = Span::new(start, end);
        let outside = match self.boundary {
            BoundaryCheck::StartAndEnd => !self.hours.window().contains_span(&span),
            BoundaryCheck::StartOnly => grid::time_to_index(start, &self.hours).is_none(),
        };
        if outside {
            return PlacementResult::Rejected(RejectReason::OutsideBusinessHours);
        }

        let conflicts: Vec<AppointmentId> = index
            .overlapping(resource, candidate.day, span, candidate.appointment_id)
            .map(|e| e.appointment.id)
            .collect();
        if !conflicts.is_empty() {
            return PlacementResult::Rejected(RejectReason::ConflictsWith(conflicts));
        }

        PlacementResult::Valid
    }

    /// Grid starts on `resource`/`day` where an appointment of `duration` could be dropped.
    pub fn available_starts(
        &self,
        resource: ResourceTarget,
        day: NaiveDate,
        duration: u32,
        moving: Option<AppointmentId>,
        schedule: &Schedule,
    ) -> Vec<Minute> {
        let index = self.index(schedule);
        (0..grid::slot_count(&self.hours))
            .filter_map(|idx| grid::index_to_time(idx, &self.hours))
            .filter(|&start| {
                let candidate = Candidate {
                    appointment_id: moving,
                    ..Candidate::new(resource, start, day, duration)
                };
                self.check(&candidate, schedule, &index).is_valid()
            })
            .collect()
    }
}
