//! Metric names. The library only records through the `metrics` facade; whoever
//! embeds it decides whether and where to export.

/// Counter: placement validations. Labels: verdict.
pub const PLACEMENTS_VALIDATED_TOTAL: &str = "chairtime_placements_validated_total";

/// Counter: relocation hover evaluations. Labels: cache (hit | miss).
pub const HOVER_EVALUATIONS_TOTAL: &str = "chairtime_hover_evaluations_total";

/// Counter: relocation session outcomes. Labels: outcome.
pub const SESSIONS_TOTAL: &str = "chairtime_sessions_total";

/// Counter: reschedule writes seen by the in-memory store. Labels: outcome.
pub const STORE_RESCHEDULES_TOTAL: &str = "chairtime_store_reschedules_total";

/// Gauge: conflict count of the most recently reported schedule.
pub const SCHEDULE_CONFLICTS: &str = "chairtime_schedule_conflicts";
