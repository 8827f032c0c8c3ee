use chrono::NaiveDate;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::model::{AppointmentId, AppointmentStatus, Placement};

const CHANNEL_CAPACITY: usize = 256;

/// What changed in the booking store. Subscribers re-fetch the day they show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ScheduleChange {
    Booked {
        revision: u64,
        appointment_id: AppointmentId,
        placement: Placement,
    },
    Rescheduled {
        revision: u64,
        appointment_id: AppointmentId,
        from: Placement,
        to: Placement,
    },
    StatusChanged {
        revision: u64,
        appointment_id: AppointmentId,
        status: AppointmentStatus,
    },
}

impl ScheduleChange {
    pub fn revision(&self) -> u64 {
        match self {
            ScheduleChange::Booked { revision, .. }
            | ScheduleChange::Rescheduled { revision, .. }
            | ScheduleChange::StatusChanged { revision, .. } => *revision,
        }
    }
}

/// Broadcast hub for schedule changes per calendar day.
pub struct NotifyHub {
    channels: DashMap<NaiveDate, broadcast::Sender<ScheduleChange>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to changes touching `day`. Creates the channel if needed.
    pub fn subscribe(&self, day: NaiveDate) -> broadcast::Receiver<ScheduleChange> {
        let sender = self
            .channels
            .entry(day)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, day: NaiveDate, change: &ScheduleChange) {
        if let Some(sender) = self.channels.get(&day) {
            let _ = sender.send(change.clone());
        }
    }

    /// Drop a day's channel once the calendar navigates away from it.
    pub fn remove(&self, day: &NaiveDate) {
        self.channels.remove(day);
    }
}
