use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::model::*;
use crate::observability::{HOVER_EVALUATIONS_TOTAL, SESSIONS_TOTAL};
use crate::store::BookingStore;

use super::placement::{Candidate, PlacementResult, PlacementValidator};
use super::SchedulingError;

/// Lifecycle of a relocation. There is no idle variant: no session value means idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    /// Source captured, nothing hovered yet.
    Open,
    /// A candidate has been validated at least once.
    Evaluating,
    Committed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Committed | SessionState::Cancelled)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Open => "open",
            SessionState::Evaluating => "evaluating",
            SessionState::Committed => "committed",
            SessionState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Last hover input and the verdict it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub resource: Option<ResourceTarget>,
    pub start: Option<Minute>,
    pub day: NaiveDate,
    pub revision: u64,
    pub result: PlacementResult,
}

impl Evaluation {
    pub fn placement(&self) -> Option<Placement> {
        Some(Placement {
            resource: self.resource?,
            day: self.day,
            start: self.start?,
        })
    }

    /// Human-readable rejection, if any.
    pub fn reason(&self) -> Option<String> {
        self.result.reason().map(|r| r.describe())
    }

    pub fn conflicting_ids(&self) -> &[AppointmentId] {
        self.result.conflicting_ids()
    }
}

/// One drag (or keyboard move) of one appointment, from pick-up to drop or abandon.
///
/// Every call takes the schedule snapshot it should be judged against; the session
/// keeps no shared state and never writes anything except the single reschedule
/// intent sent on a successful [`commit`](Self::commit).
#[derive(Debug)]
pub struct RelocationSession<'v> {
    validator: &'v PlacementValidator,
    source: Appointment,
    duration: u32,
    now: NaiveDateTime,
    state: SessionState,
    last: Option<Evaluation>,
    emitted: Option<RescheduleIntent>,
    cancel_reason: Option<String>,
    /// Keyboard position in minutes of day. Kept even while it sits off the day, so
    /// nudging back returns to where the keyboard left.
    cursor: Option<i64>,
}

impl<'v> RelocationSession<'v> {
    /// Pick up `source`. Only pending or confirmed appointments without a job card move.
    pub fn begin(
        validator: &'v PlacementValidator,
        source: Appointment,
        now: NaiveDateTime,
    ) -> Result<Self, SchedulingError> {
        if !source.status.is_movable() {
            metrics::counter!(SESSIONS_TOTAL, "outcome" => "refused").increment(1);
            return Err(SchedulingError::ImmovableAppointment {
                id: source.id,
                reason: "only pending or confirmed appointments can be moved",
            });
        }
        if source.job_card_id.is_some() {
            metrics::counter!(SESSIONS_TOTAL, "outcome" => "refused").increment(1);
            return Err(SchedulingError::ImmovableAppointment {
                id: source.id,
                reason: "appointment has a linked job card",
            });
        }

        let duration = validator.durations().resolve(&source);
        info!(id = %source.id, duration, "relocation session opened");
        metrics::counter!(SESSIONS_TOTAL, "outcome" => "begun").increment(1);
        Ok(Self {
            validator,
            source,
            duration,
            now,
            state: SessionState::Open,
            last: None,
            emitted: None,
            cancel_reason: None,
            cursor: None,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn source(&self) -> &Appointment {
        &self.source
    }

    pub fn duration(&self) -> u32 {
        self.duration
    }

    pub fn last_evaluation(&self) -> Option<&Evaluation> {
        self.last.as_ref()
    }

    /// The intent sent to the store, once committed.
    pub fn emitted(&self) -> Option<&RescheduleIntent> {
        self.emitted.as_ref()
    }

    pub fn cancel_reason(&self) -> Option<&str> {
        self.cancel_reason.as_deref()
    }

    /// Hover over a column and time on the source appointment's day.
    pub fn hover(
        &mut self,
        resource: Option<ResourceTarget>,
        start: Option<Minute>,
        schedule: &Schedule,
    ) -> Result<PlacementResult, SchedulingError> {
        self.hover_on(self.source.day, resource, start, schedule)
    }

    /// Hover over a column and time on any day.
    ///
    /// Repeated calls with the same target against the same schedule revision return
    /// the cached verdict without re-validating.
    pub fn hover_on(
        &mut self,
        day: NaiveDate,
        resource: Option<ResourceTarget>,
        start: Option<Minute>,
        schedule: &Schedule,
    ) -> Result<PlacementResult, SchedulingError> {
        self.ensure_live("hover")?;
        self.cursor = None;
        Ok(self.evaluate(day, resource, start, schedule))
    }

    fn evaluate(
        &mut self,
        day: NaiveDate,
        resource: Option<ResourceTarget>,
        start: Option<Minute>,
        schedule: &Schedule,
    ) -> PlacementResult {
        if let Some(last) = &self.last
            && last.resource == resource
            && last.start == start
            && last.day == day
            && last.revision == schedule.revision
        {
            metrics::counter!(HOVER_EVALUATIONS_TOTAL, "cache" => "hit").increment(1);
            return last.result.clone();
        }

        let candidate = Candidate {
            appointment_id: Some(self.source.id),
            resource,
            start,
            day,
            duration: self.duration,
        };
        let result = self.validator.validate(&candidate, schedule);
        metrics::counter!(HOVER_EVALUATIONS_TOTAL, "cache" => "miss").increment(1);
        debug!(id = %self.source.id, ?resource, ?start, valid = result.is_valid(), "hover evaluated");

        self.last = Some(Evaluation {
            resource,
            start,
            day,
            revision: schedule.revision,
            result: result.clone(),
        });
        self.state = SessionState::Evaluating;
        result
    }

    /// Keyboard move: shift the keyboard position by whole slots and hover there.
    ///
    /// The position starts at the last hovered time, or the source placement. Moves off
    /// either end of the day hover an invalid time, but the offset is kept so nudging
    /// back lands on the grid again. A mouse hover resets it.
    pub fn nudge(
        &mut self,
        delta_slots: i32,
        schedule: &Schedule,
    ) -> Result<PlacementResult, SchedulingError> {
        self.ensure_live("nudge")?;
        let (resource, day) = match &self.last {
            Some(last) => (
                last.resource.unwrap_or_else(|| self.source.resource_target()),
                last.day,
            ),
            None => (self.source.resource_target(), self.source.day),
        };
        let base = self
            .cursor
            .or_else(|| self.last.as_ref().and_then(|l| l.start).map(i64::from))
            .unwrap_or_else(|| i64::from(self.source.start));
        let step = i64::from(self.validator.hours().slot_minutes());
        let moved = base.saturating_add(i64::from(delta_slots) * step);
        self.cursor = Some(moved);
        let start = Minute::try_from(moved)
            .ok()
            .filter(|m| *m < MINUTES_PER_DAY);
        Ok(self.evaluate(day, Some(resource), start, schedule))
    }

    /// Drop. Sends exactly one reschedule intent to `store` if the last verdict is
    /// valid and still current for `schedule`, the target differs from where the
    /// appointment sits, and the target is not already in the past.
    ///
    /// Guard failures leave the session evaluating. A store rejection ends it as
    /// cancelled.
    pub fn commit(
        &mut self,
        schedule: &Schedule,
        store: &impl BookingStore,
    ) -> Result<RescheduleIntent, SchedulingError> {
        self.ensure_live("commit")?;
        let target = self.committable_target(schedule)?;

        let intent = RescheduleIntent {
            appointment_id: self.source.id,
            expected: self.source.placement(),
            target,
        };
        match store.reschedule(&intent) {
            Ok(()) => {
                self.state = SessionState::Committed;
                self.emitted = Some(intent);
                info!(id = %self.source.id, to = %target.resource, start = target.start, "relocation committed");
                metrics::counter!(SESSIONS_TOTAL, "outcome" => "committed").increment(1);
                Ok(intent)
            }
            Err(e) => {
                let reason = e.to_string();
                warn!(id = %self.source.id, %reason, "booking store rejected relocation");
                self.state = SessionState::Cancelled;
                self.cancel_reason = Some(reason.clone());
                metrics::counter!(SESSIONS_TOTAL, "outcome" => "store_rejected").increment(1);
                Err(SchedulingError::StoreRejected(reason))
            }
        }
    }

    /// Abandon the move. Nothing is sent anywhere.
    pub fn cancel(&mut self) -> Result<(), SchedulingError> {
        self.ensure_live("cancel")?;
        self.state = SessionState::Cancelled;
        self.cancel_reason = Some("cancelled by user".to_string());
        info!(id = %self.source.id, "relocation cancelled");
        metrics::counter!(SESSIONS_TOTAL, "outcome" => "cancelled").increment(1);
        Ok(())
    }

    fn ensure_live(&self, op: &'static str) -> Result<(), SchedulingError> {
        if self.state.is_terminal() {
            return Err(SchedulingError::InvalidStateTransition {
                state: self.state,
                op,
                reason: "session already finished",
            });
        }
        Ok(())
    }

    fn committable_target(&self, schedule: &Schedule) -> Result<Placement, SchedulingError> {
        let refuse = |reason| SchedulingError::InvalidStateTransition {
            state: self.state,
            op: "commit",
            reason,
        };
        let Some(last) = &self.last else {
            return Err(refuse("nothing hovered yet"));
        };
        if !last.result.is_valid() {
            return Err(refuse("last hovered placement was rejected"));
        }
        if last.revision != schedule.revision {
            return Err(refuse("schedule changed since last hover"));
        }
        let Some(target) = last.placement() else {
            return Err(refuse("last hovered placement was rejected"));
        };
        if target == self.source.placement() {
            return Err(refuse("placement unchanged"));
        }
        let today = self.now.date();
        let now_minute = self.now.hour() * 60 + self.now.minute();
        if target.day < today || (target.day == today && target.start < now_minute) {
            return Err(refuse("target time is in the past"));
        }
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use crate::store::StoreError;
    use chrono::NaiveTime;
    use ulid::Ulid;

    /// Records every intent it receives; optionally refuses them all.
    #[derive(Default)]
    struct RecordingStore {
        intents: RefCell<Vec<RescheduleIntent>>,
        refuse: Option<StoreError>,
    }

    impl BookingStore for RecordingStore {
        fn appointments(&self, _from: NaiveDate, _to: NaiveDate) -> Result<Schedule, StoreError> {
            Ok(Schedule::default())
        }

        fn reschedule(&self, intent: &RescheduleIntent) -> Result<(), StoreError> {
            self.intents.borrow_mut().push(*intent);
            match &self.refuse {
                Some(e) => Err(e.clone()),
                None => Ok(()),
            }
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    fn morning() -> NaiveDateTime {
        day().and_time(NaiveTime::from_hms_opt(8, 0, 0).unwrap())
    }

    fn appt(resource: Ulid, start: Minute, duration: u32) -> Appointment {
        Appointment {
            id: Ulid::new(),
            resource_id: Some(resource),
            day: day(),
            start,
            duration: Some(duration),
            service_name: String::new(),
            status: AppointmentStatus::Confirmed,
            job_card_id: None,
        }
    }

    fn staff(r: Ulid) -> Option<ResourceTarget> {
        Some(ResourceTarget::Staff(r))
    }

    #[test]
    fn begin_refuses_immovable_status() {
        let v = PlacementValidator::default();
        for status in [
            AppointmentStatus::Arrived,
            AppointmentStatus::InService,
            AppointmentStatus::PendingCheckout,
            AppointmentStatus::Completed,
            AppointmentStatus::Cancelled,
            AppointmentStatus::NoShow,
        ] {
            let mut a = appt(Ulid::new(), 600, 30);
            a.status = status;
            let result = RelocationSession::begin(&v, a, morning());
            assert!(
                matches!(result, Err(SchedulingError::ImmovableAppointment { .. })),
                "{status:?}"
            );
        }
    }

    #[test]
    fn begin_refuses_job_card() {
        let v = PlacementValidator::default();
        let mut a = appt(Ulid::new(), 600, 30);
        a.job_card_id = Some("JC-1042".into());
        assert!(matches!(
            RelocationSession::begin(&v, a, morning()),
            Err(SchedulingError::ImmovableAppointment { reason, .. }) if reason.contains("job card")
        ));
    }

    #[test]
    fn hover_moves_to_evaluating() {
        let v = PlacementValidator::default();
        let r = Ulid::new();
        let a = appt(r, 600, 30);
        let schedule = Schedule::new(1, vec![a.clone()], vec![]);
        let mut s = RelocationSession::begin(&v, a, morning()).unwrap();
        assert_eq!(s.state(), SessionState::Open);
        let result = s.hover(staff(r), Some(660), &schedule).unwrap();
        assert!(result.is_valid());
        assert_eq!(s.state(), SessionState::Evaluating);
    }

    #[test]
    fn hover_reports_reason_and_conflicts() {
        let v = PlacementValidator::default();
        let r = Ulid::new();
        let a = appt(r, 600, 30);
        let blocker = appt(r, 700, 60);
        let schedule = Schedule::new(1, vec![a.clone(), blocker.clone()], vec![]);
        let mut s = RelocationSession::begin(&v, a, morning()).unwrap();
        s.hover(staff(r), Some(690), &schedule).unwrap();
        let eval = s.last_evaluation().unwrap();
        assert_eq!(eval.conflicting_ids(), &[blocker.id]);
        assert_eq!(eval.reason().as_deref(), Some("Overlaps another appointment"));
    }

    #[test]
    fn hover_is_idempotent_and_cached() {
        let v = PlacementValidator::default();
        let r = Ulid::new();
        let a = appt(r, 600, 30);
        let quiet = Schedule::new(7, vec![a.clone()], vec![]);
        let mut s = RelocationSession::begin(&v, a.clone(), morning()).unwrap();
        let first = s.hover(staff(r), Some(690), &quiet).unwrap();
        assert!(first.is_valid());

        // Same revision, different contents: the revision is the cache key, so the
        // blocker is not seen until the revision moves.
        let blocker = appt(r, 700, 60);
        let same_revision = Schedule::new(7, vec![a.clone(), blocker.clone()], vec![]);
        let second = s.hover(staff(r), Some(690), &same_revision).unwrap();
        assert_eq!(second, first);
        assert_eq!(s.last_evaluation().unwrap().revision, 7);

        let bumped = Schedule::new(8, vec![a, blocker.clone()], vec![]);
        let third = s.hover(staff(r), Some(690), &bumped).unwrap();
        assert_eq!(third.conflicting_ids(), &[blocker.id]);
    }

    #[test]
    fn hover_recomputes_on_new_revision() {
        let v = PlacementValidator::default();
        let r = Ulid::new();
        let a = appt(r, 600, 30);
        let mut s = RelocationSession::begin(&v, a.clone(), morning()).unwrap();

        let empty = Schedule::new(1, vec![a.clone()], vec![]);
        assert!(s.hover(staff(r), Some(720), &empty).unwrap().is_valid());

        let blocker = appt(r, 720, 30);
        let busier = Schedule::new(2, vec![a, blocker.clone()], vec![]);
        let again = s.hover(staff(r), Some(720), &busier).unwrap();
        assert_eq!(again.conflicting_ids(), &[blocker.id]);
    }

    #[test]
    fn commit_emits_exactly_once() {
        let v = PlacementValidator::default();
        let r = Ulid::new();
        let a = appt(r, 600, 30);
        let schedule = Schedule::new(1, vec![a.clone()], vec![]);
        let store = RecordingStore::default();
        let mut s = RelocationSession::begin(&v, a.clone(), morning()).unwrap();
        s.hover(staff(r), Some(660), &schedule).unwrap();

        let intent = s.commit(&schedule, &store).unwrap();
        assert_eq!(intent.appointment_id, a.id);
        assert_eq!(intent.expected, a.placement());
        assert_eq!(intent.target.start, 660);
        assert_eq!(s.state(), SessionState::Committed);
        assert_eq!(s.emitted(), Some(&intent));
        assert_eq!(store.intents.borrow().len(), 1);

        for result in [
            s.hover(staff(r), Some(720), &schedule).map(|_| ()),
            s.commit(&schedule, &store).map(|_| ()),
            s.cancel(),
        ] {
            assert!(matches!(
                result,
                Err(SchedulingError::InvalidStateTransition { state: SessionState::Committed, .. })
            ));
        }
        assert_eq!(store.intents.borrow().len(), 1);
    }

    #[test]
    fn commit_without_valid_verdict_is_caller_error() {
        let v = PlacementValidator::default();
        let r = Ulid::new();
        let a = appt(r, 600, 30);
        let blocker = appt(r, 700, 60);
        let schedule = Schedule::new(1, vec![a.clone(), blocker], vec![]);
        let store = RecordingStore::default();
        let mut s = RelocationSession::begin(&v, a, morning()).unwrap();

        // Nothing hovered yet.
        assert!(matches!(
            s.commit(&schedule, &store),
            Err(SchedulingError::InvalidStateTransition { state: SessionState::Open, .. })
        ));

        s.hover(staff(r), Some(690), &schedule).unwrap();
        assert!(matches!(
            s.commit(&schedule, &store),
            Err(SchedulingError::InvalidStateTransition { state: SessionState::Evaluating, .. })
        ));
        assert_eq!(s.state(), SessionState::Evaluating);
        assert!(store.intents.borrow().is_empty());
    }

    #[test]
    fn commit_refuses_stale_verdict() {
        let v = PlacementValidator::default();
        let r = Ulid::new();
        let a = appt(r, 600, 30);
        let store = RecordingStore::default();
        let mut s = RelocationSession::begin(&v, a.clone(), morning()).unwrap();
        let old = Schedule::new(1, vec![a.clone()], vec![]);
        s.hover(staff(r), Some(660), &old).unwrap();

        let newer = Schedule::new(2, vec![a], vec![]);
        let result = s.commit(&newer, &store);
        assert!(matches!(
            result,
            Err(SchedulingError::InvalidStateTransition { reason, .. }) if reason.contains("schedule changed")
        ));
        // Re-hover against the new snapshot and the commit goes through.
        s.hover(staff(r), Some(660), &newer).unwrap();
        assert!(s.commit(&newer, &store).is_ok());
    }

    #[test]
    fn commit_refuses_unchanged_placement() {
        let v = PlacementValidator::default();
        let r = Ulid::new();
        let a = appt(r, 600, 30);
        let schedule = Schedule::new(1, vec![a.clone()], vec![]);
        let store = RecordingStore::default();
        let mut s = RelocationSession::begin(&v, a, morning()).unwrap();
        assert!(s.hover(staff(r), Some(600), &schedule).unwrap().is_valid());
        assert!(matches!(
            s.commit(&schedule, &store),
            Err(SchedulingError::InvalidStateTransition { reason: "placement unchanged", .. })
        ));
        assert_eq!(s.state(), SessionState::Evaluating);
    }

    #[test]
    fn commit_refuses_past_same_day_target() {
        let v = PlacementValidator::default();
        let r = Ulid::new();
        let a = appt(r, 14 * 60, 30);
        let schedule = Schedule::new(1, vec![a.clone()], vec![]);
        let store = RecordingStore::default();
        let lunchtime = day().and_time(NaiveTime::from_hms_opt(12, 10, 0).unwrap());
        let mut s = RelocationSession::begin(&v, a, lunchtime).unwrap();

        s.hover(staff(r), Some(11 * 60), &schedule).unwrap();
        assert!(matches!(
            s.commit(&schedule, &store),
            Err(SchedulingError::InvalidStateTransition { reason: "target time is in the past", .. })
        ));

        s.hover(staff(r), Some(13 * 60), &schedule).unwrap();
        assert!(s.commit(&schedule, &store).is_ok());
    }

    #[test]
    fn store_rejection_cancels_session() {
        let v = PlacementValidator::default();
        let r = Ulid::new();
        let a = appt(r, 600, 30);
        let schedule = Schedule::new(1, vec![a.clone()], vec![]);
        let store = RecordingStore {
            refuse: Some(StoreError::Conflict(vec![Ulid::new()])),
            ..Default::default()
        };
        let mut s = RelocationSession::begin(&v, a, morning()).unwrap();
        s.hover(staff(r), Some(660), &schedule).unwrap();

        let err = s.commit(&schedule, &store).unwrap_err();
        assert!(matches!(err, SchedulingError::StoreRejected(_)));
        assert!(err.requires_refetch());
        assert_eq!(s.state(), SessionState::Cancelled);
        assert!(s.cancel_reason().unwrap().contains("slot taken"));
        assert!(s.emitted().is_none());
    }

    #[test]
    fn cancel_from_open_and_evaluating() {
        let v = PlacementValidator::default();
        let r = Ulid::new();
        let a = appt(r, 600, 30);
        let schedule = Schedule::new(1, vec![a.clone()], vec![]);

        let mut open = RelocationSession::begin(&v, a.clone(), morning()).unwrap();
        open.cancel().unwrap();
        assert_eq!(open.state(), SessionState::Cancelled);
        assert!(open.cancel().is_err());

        let mut evaluating = RelocationSession::begin(&v, a, morning()).unwrap();
        evaluating.hover(staff(r), Some(660), &schedule).unwrap();
        evaluating.cancel().unwrap();
        assert!(matches!(
            evaluating.hover(staff(r), Some(690), &schedule),
            Err(SchedulingError::InvalidStateTransition { state: SessionState::Cancelled, .. })
        ));
    }

    #[test]
    fn nudge_steps_by_slot() {
        let v = PlacementValidator::default();
        let r = Ulid::new();
        let a = appt(r, 600, 30);
        let schedule = Schedule::new(1, vec![a.clone()], vec![]);
        let mut s = RelocationSession::begin(&v, a, morning()).unwrap();

        s.nudge(1, &schedule).unwrap();
        assert_eq!(s.last_evaluation().unwrap().start, Some(630));
        s.nudge(2, &schedule).unwrap();
        assert_eq!(s.last_evaluation().unwrap().start, Some(690));
        s.nudge(-3, &schedule).unwrap();
        assert_eq!(s.last_evaluation().unwrap().start, Some(600));

        // Off the front of the day: invalid time, not clamped.
        let off = s.nudge(-100, &schedule).unwrap();
        assert!(!off.is_valid());
        assert_eq!(s.last_evaluation().unwrap().start, None);

        // Nudging back retraces the offset instead of restarting from the source.
        s.nudge(50, &schedule).unwrap();
        assert_eq!(s.last_evaluation().unwrap().start, None);
        s.nudge(53, &schedule).unwrap();
        assert_eq!(s.last_evaluation().unwrap().start, Some(690));
    }

    #[test]
    fn hover_resets_keyboard_position() {
        let v = PlacementValidator::default();
        let r = Ulid::new();
        let a = appt(r, 600, 30);
        let schedule = Schedule::new(1, vec![a.clone()], vec![]);
        let mut s = RelocationSession::begin(&v, a, morning()).unwrap();

        s.nudge(-100, &schedule).unwrap();
        s.hover(staff(r), Some(780), &schedule).unwrap();
        s.nudge(1, &schedule).unwrap();
        assert_eq!(s.last_evaluation().unwrap().start, Some(810));

        // A direct hover with no time falls back to the source start.
        s.hover(staff(r), None, &schedule).unwrap();
        s.nudge(1, &schedule).unwrap();
        assert_eq!(s.last_evaluation().unwrap().start, Some(630));
    }

    #[test]
    fn unparseable_hover_target_rejected() {
        let v = PlacementValidator::default();
        let a = appt(Ulid::new(), 600, 30);
        let schedule = Schedule::new(1, vec![a.clone()], vec![]);
        let store = RecordingStore::default();
        let mut s = RelocationSession::begin(&v, a, morning()).unwrap();
        let result = s.hover(None, Some(660), &schedule).unwrap();
        assert_eq!(
            result.reason().map(|r| r.describe()).as_deref(),
            Some("Invalid staff member or time")
        );
        assert!(s.commit(&schedule, &store).is_err());
    }
}
