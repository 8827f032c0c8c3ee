use std::collections::BTreeMap;

use tracing::info;
use tracing_subscriber::EnvFilter;

use chairtime::engine::grid;
use chairtime::model::{ResourceTarget, Schedule};
use chairtime::{EngineConfig, Scheduler};

const USAGE: &str = "usage: chairtime <schedule.json>";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let path = std::env::args().nth(1).ok_or(USAGE)?;
    let config = EngineConfig::from_env()?;
    info!(
        open = config.hours.open_hour(),
        close = config.hours.close_hour(),
        slot = config.hours.slot_minutes(),
        boundary = ?config.boundary,
        "engine configured"
    );
    let scheduler = Scheduler::new(config);

    let raw = tokio::fs::read_to_string(&path).await?;
    let schedule: Schedule = serde_json::from_str(&raw)?;
    info!(
        %path,
        revision = schedule.revision,
        appointments = schedule.appointments.len(),
        resources = schedule.resources.len(),
        "schedule loaded"
    );

    print_grid(&scheduler);
    print_conflicts(&scheduler, &schedule);
    Ok(())
}

fn print_grid(scheduler: &Scheduler) {
    let slots = scheduler.list_time_slots();
    println!("=== slot grid ({} slots) ===", slots.len());
    for slot in &slots {
        println!("  [{:>2}] {}  {:>8}", slot.index, slot.label_24h, slot.label_12h);
    }
}

fn print_conflicts(scheduler: &Scheduler, schedule: &Schedule) {
    let names: BTreeMap<ResourceTarget, &str> = schedule
        .resources
        .iter()
        .map(|r| (ResourceTarget::Staff(r.id), r.name.as_str()))
        .collect();
    let label = |target: &ResourceTarget| match names.get(target) {
        Some(name) => (*name).to_string(),
        None => target.to_string(),
    };

    println!("\n=== conflicts ===");
    let index = scheduler.validator().index(schedule);
    let mut any = false;
    for appointment in schedule.appointments.iter().filter(|a| a.status.occupies_slot()) {
        let conflicts = index.overlaps_of(appointment);
        if conflicts.is_empty() {
            continue;
        }
        any = true;
        let Some(span) = chairtime::engine::span_of(appointment, index.durations()) else {
            continue;
        };
        println!(
            "  {} {} {}-{} [{} slots] {} ({}) overlaps:",
            appointment.day,
            label(&appointment.resource_target()),
            grid::format_24h(span.start),
            grid::format_24h(span.end),
            grid::duration_to_span(span.duration(), scheduler.hours()),
            appointment.service_name,
            appointment.id,
        );
        for other in conflicts {
            println!("    - {} {} ({})", grid::format_24h(other.start), other.service_name, other.id);
        }
    }
    if !any {
        println!("  none");
    }

    let count = scheduler.conflict_count(schedule);
    metrics::gauge!(chairtime::observability::SCHEDULE_CONFLICTS).set(count as f64);
    println!("\nconflict count: {count}");

    let groups = scheduler.conflict_groups(schedule);
    println!("\n=== conflict groups ({}) ===", groups.len());
    for group in &groups {
        println!(
            "  {} {} {}-{} ({} min): {} appointments",
            group.day,
            label(&group.resource),
            grid::format_24h(group.span.start),
            grid::format_24h(group.span.end),
            group.span.duration(),
            group.appointment_ids.len()
        );
    }
}
