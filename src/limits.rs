//! Hard bounds on input sizes. Anything past these is rejected, never wrapped.

use crate::model::{MINUTES_PER_DAY, Minute};

/// Longest single appointment the engine will place or index. Nothing in a salon runs
/// past a full day, and bounding it keeps `start + duration` far from `u32::MAX`.
pub const MAX_DURATION_MINUTES: Minute = MINUTES_PER_DAY;
