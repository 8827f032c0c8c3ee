use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use dashmap::DashMap;
use tracing::{info, warn};

use crate::engine::{Candidate, PlacementResult, PlacementValidator, RejectReason};
use crate::model::*;
use crate::notify::{NotifyHub, ScheduleChange};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    NotFound(AppointmentId),
    AlreadyExists(AppointmentId),
    /// The appointment no longer sits where the caller last saw it.
    Stale {
        id: AppointmentId,
        current: Placement,
    },
    Conflict(Vec<AppointmentId>),
    Rejected(String),
    /// The write may or may not have landed; callers must treat it as not applied.
    Unavailable(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound(id) => write!(f, "appointment not found: {id}"),
            StoreError::AlreadyExists(id) => write!(f, "appointment already exists: {id}"),
            StoreError::Stale { id, current } => write!(
                f,
                "appointment {id} was moved by someone else (now {} on {} at {})",
                current.resource,
                current.day,
                crate::engine::grid::format_24h(current.start)
            ),
            StoreError::Conflict(ids) => {
                write!(f, "slot taken by {} appointment(s)", ids.len())
            }
            StoreError::Rejected(reason) => write!(f, "rejected: {reason}"),
            StoreError::Unavailable(reason) => write!(f, "store unavailable: {reason}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// The booking store the engine reads snapshots from and commits relocations to.
///
/// One store instance serves one salon. `reschedule` must be atomic and must
/// re-validate: the engine's own validation is advisory.
pub trait BookingStore {
    /// Snapshot of every appointment with `from <= day <= to`, plus the staff roster.
    fn appointments(&self, from: NaiveDate, to: NaiveDate) -> Result<Schedule, StoreError>;

    /// Apply `intent` if the appointment still sits at `intent.expected` and the target
    /// is free.
    fn reschedule(&self, intent: &RescheduleIntent) -> Result<(), StoreError>;
}

/// Reference store keeping everything in memory.
///
/// Writes are serialized by one lock so the placement check and the move happen as a
/// single compare-and-swap; reads go straight to the maps.
pub struct InMemoryBookingStore {
    appointments: DashMap<AppointmentId, Appointment>,
    resources: DashMap<ResourceId, Resource>,
    revision: AtomicU64,
    write_lock: Mutex<()>,
    validator: PlacementValidator,
    notify: Arc<NotifyHub>,
}

impl InMemoryBookingStore {
    pub fn new(validator: PlacementValidator, notify: Arc<NotifyHub>) -> Self {
        Self {
            appointments: DashMap::new(),
            resources: DashMap::new(),
            revision: AtomicU64::new(0),
            write_lock: Mutex::new(()),
            validator,
            notify,
        }
    }

    pub fn notify(&self) -> &Arc<NotifyHub> {
        &self.notify
    }

    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    pub fn get(&self, id: &AppointmentId) -> Option<Appointment> {
        self.appointments.get(id).map(|e| e.value().clone())
    }

    pub fn upsert_resource(&self, resource: Resource) {
        let _guard = self.lock();
        self.resources.insert(resource.id, resource);
        self.bump();
    }

    /// Seed existing data without validation. Imported schedules may already contain
    /// conflicts; that is what the conflict report is for.
    pub fn load(&self, schedule: Schedule) {
        let _guard = self.lock();
        for resource in schedule.resources {
            self.resources.insert(resource.id, resource);
        }
        for appointment in schedule.appointments {
            self.appointments.insert(appointment.id, appointment);
        }
        self.bump();
    }

    /// Book a new appointment, rejecting it if its placement is not legal.
    pub fn book(&self, appointment: Appointment) -> Result<u64, StoreError> {
        let _guard = self.lock();
        if self.appointments.contains_key(&appointment.id) {
            return Err(StoreError::AlreadyExists(appointment.id));
        }
        let placement = appointment.placement();
        let duration = self.validator.durations().resolve(&appointment);
        self.check_free(appointment.id, placement, duration)?;

        self.appointments.insert(appointment.id, appointment.clone());
        let revision = self.bump();
        self.notify.send(
            placement.day,
            &ScheduleChange::Booked {
                revision,
                appointment_id: appointment.id,
                placement,
            },
        );
        Ok(revision)
    }

    pub fn set_status(&self, id: AppointmentId, status: AppointmentStatus) -> Result<u64, StoreError> {
        let _guard = self.lock();
        let day = {
            let mut entry = self
                .appointments
                .get_mut(&id)
                .ok_or(StoreError::NotFound(id))?;
            entry.status = status;
            entry.day
        };
        let revision = self.bump();
        self.notify.send(
            day,
            &ScheduleChange::StatusChanged {
                revision,
                appointment_id: id,
                status,
            },
        );
        Ok(revision)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn bump(&self) -> u64 {
        self.revision.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn snapshot_days(&self, from: NaiveDate, to: NaiveDate) -> Schedule {
        let mut appointments: Vec<Appointment> = self
            .appointments
            .iter()
            .filter(|e| e.day >= from && e.day <= to)
            .map(|e| e.value().clone())
            .collect();
        appointments.sort_by(|a, b| (a.day, a.start, a.id).cmp(&(b.day, b.start, b.id)));
        let mut resources: Vec<Resource> = self.resources.iter().map(|e| e.value().clone()).collect();
        resources.sort_by_key(|r| r.id);
        Schedule::new(self.revision(), appointments, resources)
    }

    /// Caller holds the write lock.
    fn check_free(
        &self,
        id: AppointmentId,
        placement: Placement,
        duration: u32,
    ) -> Result<(), StoreError> {
        let day = self.snapshot_days(placement.day, placement.day);
        let candidate = Candidate::new(placement.resource, placement.start, placement.day, duration).moving(id);
        match self.validator.validate(&candidate, &day) {
            PlacementResult::Valid => Ok(()),
            PlacementResult::Rejected(RejectReason::ConflictsWith(ids)) => Err(StoreError::Conflict(ids)),
            PlacementResult::Rejected(reason) => Err(StoreError::Rejected(reason.describe())),
        }
    }
}

impl BookingStore for InMemoryBookingStore {
    fn appointments(&self, from: NaiveDate, to: NaiveDate) -> Result<Schedule, StoreError> {
        if from > to {
            return Err(StoreError::Rejected(format!("empty date range {from}..={to}")));
        }
        Ok(self.snapshot_days(from, to))
    }

    fn reschedule(&self, intent: &RescheduleIntent) -> Result<(), StoreError> {
        let _guard = self.lock();
        let result = self.apply_reschedule(intent);
        let outcome = match &result {
            Ok(_) => "applied",
            Err(StoreError::Stale { .. }) => "stale",
            Err(StoreError::Conflict(_)) => "conflict",
            Err(_) => "rejected",
        };
        metrics::counter!(crate::observability::STORE_RESCHEDULES_TOTAL, "outcome" => outcome)
            .increment(1);
        result
    }
}

impl InMemoryBookingStore {
    /// Caller holds the write lock.
    fn apply_reschedule(&self, intent: &RescheduleIntent) -> Result<(), StoreError> {
        let id = intent.appointment_id;
        let current = self.get(&id).ok_or(StoreError::NotFound(id))?;
        if current.placement() != intent.expected {
            warn!(%id, "reschedule lost a race: appointment already moved");
            return Err(StoreError::Stale {
                id,
                current: current.placement(),
            });
        }
        if !current.status.is_movable() || current.job_card_id.is_some() {
            return Err(StoreError::Rejected(format!(
                "appointment is {}",
                current.status.as_str()
            )));
        }
        let duration = self.validator.durations().resolve(&current);
        self.check_free(id, intent.target, duration)?;

        self.appointments.insert(id, current.relocated(intent.target));
        let revision = self.bump();
        let change = ScheduleChange::Rescheduled {
            revision,
            appointment_id: id,
            from: intent.expected,
            to: intent.target,
        };
        self.notify.send(intent.expected.day, &change);
        if intent.target.day != intent.expected.day {
            self.notify.send(intent.target.day, &change);
        }
        info!(%id, revision, to = %intent.target.resource, "appointment rescheduled");
        Ok(())
    }
}
