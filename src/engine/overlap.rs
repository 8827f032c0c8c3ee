use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::warn;

use crate::limits::MAX_DURATION_MINUTES;
use crate::model::*;

use super::duration::DurationResolver;

/// One occupying appointment together with its resolved `[start, end)` span.
#[derive(Debug, Clone, Copy)]
pub struct Entry<'a> {
    pub span: Span,
    pub appointment: &'a Appointment,
}

/// A maximal run of transitively overlapping appointments on one column and day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictGroup {
    pub resource: ResourceTarget,
    pub day: NaiveDate,
    pub span: Span,
    pub appointment_ids: Vec<AppointmentId>,
}

/// Per (resource, day) view of a schedule, each bucket sorted by start then id.
///
/// Borrowed from the appointment slice it was built from; rebuild it whenever that
/// slice changes instead of keeping it around.
pub struct OverlapIndex<'a> {
    durations: &'a DurationResolver,
    buckets: HashMap<(ResourceTarget, NaiveDate), Vec<Entry<'a>>>,
}

impl<'a> OverlapIndex<'a> {
    pub fn build(appointments: &'a [Appointment], durations: &'a DurationResolver) -> Self {
        let mut buckets: HashMap<(ResourceTarget, NaiveDate), Vec<Entry<'a>>> = HashMap::new();
        for appointment in appointments {
            if !appointment.status.occupies_slot() {
                continue;
            }
            let Some(span) = span_of(appointment, durations) else {
                warn!(id = %appointment.id, start = appointment.start, "appointment starts outside the day; not indexed");
                continue;
            };
            buckets
                .entry((appointment.resource_target(), appointment.day))
                .or_default()
                .push(Entry { span, appointment });
        }
        for entries in buckets.values_mut() {
            entries.sort_by(|a, b| {
                a.span
                    .start
                    .cmp(&b.span.start)
                    .then(a.appointment.id.cmp(&b.appointment.id))
            });
        }
        Self { durations, buckets }
    }

    pub fn durations(&self) -> &'a DurationResolver {
        self.durations
    }

    /// Occupying appointments in one calendar column, in start order.
    pub fn occupied(&self, resource: ResourceTarget, day: NaiveDate) -> &[Entry<'a>] {
        self.buckets
            .get(&(resource, day))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Entries on `resource`/`day` whose span intersects `span`, skipping `exclude`.
    /// The unassigned column is a waiting list and never reports overlaps.
    pub fn overlapping(
        &self,
        resource: ResourceTarget,
        day: NaiveDate,
        span: Span,
        exclude: Option<AppointmentId>,
    ) -> impl Iterator<Item = &Entry<'a>> {
        let entries = match resource {
            ResourceTarget::Unassigned => &[][..],
            ResourceTarget::Staff(_) => self.occupied(resource, day),
        };
        // Everything at index >= right_bound starts at or after span.end → can't overlap.
        let right_bound = entries.partition_point(|e| e.span.start < span.end);
        entries[..right_bound]
            .iter()
            .filter(move |e| e.span.overlaps(&span) && Some(e.appointment.id) != exclude)
    }

    /// Every other appointment on the target's column and day that overlaps it.
    /// Self is excluded by id.
    pub fn overlaps_of(&self, target: &Appointment) -> Vec<&'a Appointment> {
        let Some(span) = span_of(target, self.durations) else {
            return Vec::new();
        };
        self.overlapping(target.resource_target(), target.day, span, Some(target.id))
            .map(|e| e.appointment)
            .collect()
    }

    /// Appointments with at least one overlap, halved to fold symmetric pairs.
    ///
    /// Undercounts when three or more appointments overlap each other on one column;
    /// use [`OverlapIndex::conflict_groups`] when exact clusters matter.
    pub fn conflict_count(&self) -> usize {
        let mut with_overlap = 0usize;
        for ((resource, day), entries) in &self.buckets {
            for entry in entries {
                if self
                    .overlapping(*resource, *day, entry.span, Some(entry.appointment.id))
                    .next()
                    .is_some()
                {
                    with_overlap += 1;
                }
            }
        }
        with_overlap / 2
    }

    /// Connected overlap clusters of two or more appointments, ordered by column, day
    /// and start.
    pub fn conflict_groups(&self) -> Vec<ConflictGroup> {
        let mut groups = Vec::new();
        let mut keys: Vec<&(ResourceTarget, NaiveDate)> = self.buckets.keys().collect();
        keys.sort();

        for key in keys {
            let (resource, day) = *key;
            if resource == ResourceTarget::Unassigned {
                continue;
            }
            let mut current: Option<(Span, Vec<AppointmentId>)> = None;
            for entry in &self.buckets[key] {
                if let Some((span, ids)) = current.as_mut()
                    && entry.span.start < span.end
                {
                    span.end = span.end.max(entry.span.end);
                    ids.push(entry.appointment.id);
                    continue;
                }
                if let Some((span, ids)) = current.take()
                    && ids.len() > 1
                {
                    groups.push(ConflictGroup {
                        resource,
                        day,
                        span,
                        appointment_ids: ids,
                    });
                }
                current = Some((entry.span, vec![entry.appointment.id]));
            }
            if let Some((span, ids)) = current
                && ids.len() > 1
            {
                groups.push(ConflictGroup {
                    resource,
                    day,
                    span,
                    appointment_ids: ids,
                });
            }
        }
        groups
    }
}

/// Occupied `[start, end)` of an appointment, with its duration clamped to
/// [`MAX_DURATION_MINUTES`]. `None` if it does not start inside the day.
pub fn span_of(appointment: &Appointment, durations: &DurationResolver) -> Option<Span> {
    if appointment.start >= MINUTES_PER_DAY {
        return None;
    }
    let minutes = durations.resolve(appointment).clamp(1, MAX_DURATION_MINUTES);
    Some(Span::new(appointment.start, appointment.start + minutes))
}

/// Conflict count over a whole appointment set. See [`OverlapIndex::conflict_count`].
pub fn conflict_count(all: &[Appointment], durations: &DurationResolver) -> usize {
    OverlapIndex::build(all, durations).conflict_count()
}
