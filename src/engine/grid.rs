use chrono::{NaiveTime, Timelike};
use serde::Serialize;

use crate::config::ConfigError;
use crate::model::*;

pub const DEFAULT_OPEN_HOUR: u32 = 9;
pub const DEFAULT_CLOSE_HOUR: u32 = 18;
pub const DEFAULT_SLOT_MINUTES: u32 = 30;

/// Salon opening window and slot granularity. `open_hour < close_hour <= 24`, and the
/// granularity divides an hour so every slot starts on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BusinessHours {
    open_hour: u32,
    close_hour: u32,
    slot_minutes: u32,
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self {
            open_hour: DEFAULT_OPEN_HOUR,
            close_hour: DEFAULT_CLOSE_HOUR,
            slot_minutes: DEFAULT_SLOT_MINUTES,
        }
    }
}

impl BusinessHours {
    pub fn new(open_hour: u32, close_hour: u32, slot_minutes: u32) -> Result<Self, ConfigError> {
        if open_hour >= close_hour || close_hour > 24 {
            return Err(ConfigError::InvalidHours {
                open_hour,
                close_hour,
            });
        }
        if slot_minutes == 0 || 60 % slot_minutes != 0 {
            return Err(ConfigError::InvalidGranularity(slot_minutes));
        }
        Ok(Self {
            open_hour,
            close_hour,
            slot_minutes,
        })
    }

    pub fn open_hour(&self) -> u32 {
        self.open_hour
    }

    pub fn close_hour(&self) -> u32 {
        self.close_hour
    }

    pub fn slot_minutes(&self) -> u32 {
        self.slot_minutes
    }

    pub fn open_minute(&self) -> Minute {
        self.open_hour * 60
    }

    pub fn close_minute(&self) -> Minute {
        self.close_hour * 60
    }

    pub fn window(&self) -> Span {
        Span::new(self.open_minute(), self.close_minute())
    }
}

// ── Slot math ────────────────────────────────────────────────────

pub fn slot_count(hours: &BusinessHours) -> usize {
    ((hours.close_hour - hours.open_hour) * 60 / hours.slot_minutes) as usize
}

/// Slot containing minute `t`, or `None` if `t` is outside `[open, close)`.
/// Early starts are never clamped into slot 0.
pub fn time_to_index(t: Minute, hours: &BusinessHours) -> Option<usize> {
    if t < hours.open_minute() || t >= hours.close_minute() {
        return None;
    }
    Some(((t - hours.open_minute()) / hours.slot_minutes) as usize)
}

/// Number of slots a duration covers, rounded up, never less than one.
pub fn duration_to_span(minutes: u32, hours: &BusinessHours) -> usize {
    (minutes.div_ceil(hours.slot_minutes) as usize).max(1)
}

pub fn index_to_time(idx: usize, hours: &BusinessHours) -> Option<Minute> {
    if idx >= slot_count(hours) {
        return None;
    }
    Some(hours.open_minute() + idx as Minute * hours.slot_minutes)
}

/// `("09:00", "9:00 AM")` style labels for a slot.
pub fn index_to_display(idx: usize, hours: &BusinessHours) -> (String, String) {
    let minute = hours.open_minute() + idx as Minute * hours.slot_minutes;
    (format_24h(minute), format_12h(minute))
}

pub fn list_time_slots(hours: &BusinessHours) -> Vec<TimeSlot> {
    (0..slot_count(hours))
        .map(|index| {
            let (label_24h, label_12h) = index_to_display(index, hours);
            TimeSlot {
                index,
                minute: hours.open_minute() + index as Minute * hours.slot_minutes,
                label_24h,
                label_12h,
            }
        })
        .collect()
}

// ── Wall-clock conversion ────────────────────────────────────────

/// Parse `"HH:MM"` into a minute of day.
pub fn parse_time(raw: &str) -> Option<Minute> {
    let t = NaiveTime::parse_from_str(raw.trim(), "%H:%M").ok()?;
    Some(t.hour() * 60 + t.minute())
}

fn naive(minute: Minute) -> NaiveTime {
    let m = minute % MINUTES_PER_DAY;
    NaiveTime::from_hms_opt(m / 60, m % 60, 0).unwrap_or(NaiveTime::MIN)
}

pub fn format_24h(minute: Minute) -> String {
    naive(minute).format("%H:%M").to_string()
}

pub fn format_12h(minute: Minute) -> String {
    naive(minute).format("%-I:%M %p").to_string()
}
