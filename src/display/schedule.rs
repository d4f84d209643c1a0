//! Schedule display formatting

use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::models::{Frequency, Recurrence, Schedule, ScheduleLogEntry};
use crate::schedule::ScheduleStats;

use super::{format_optional_time, format_time};

/// One-line description of a recurrence rule
pub fn format_recurrence(rule: &Recurrence) -> String {
    let at = rule.time_of_day.format("%H:%M");
    let every = |unit: &str| {
        if rule.interval == 1 {
            format!("every {}", unit)
        } else {
            format!("every {} {}s", rule.interval, unit)
        }
    };
    match rule.frequency {
        Frequency::Daily => format!("{} at {} UTC", every("day"), at),
        Frequency::Weekly => {
            let days: Vec<String> = rule.days_of_week.iter().map(|d| d.to_string()).collect();
            format!("{} on {} at {} UTC", every("week"), days.join(","), at)
        }
        Frequency::Monthly => format!(
            "{} on day {} at {} UTC",
            every("month"),
            rule.day_of_month.unwrap_or(1),
            at
        ),
        Frequency::Custom => every("unit"),
    }
}

#[derive(Tabled)]
struct ScheduleRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Recurrence")]
    recurrence: String,
    #[tabled(rename = "Active")]
    active: String,
    #[tabled(rename = "Next run")]
    next_run: String,
    #[tabled(rename = "Runs")]
    runs: String,
}

pub fn format_schedule_list(schedules: &[Schedule]) -> String {
    if schedules.is_empty() {
        return "No schedules found.".to_string();
    }
    let rows: Vec<ScheduleRow> = schedules
        .iter()
        .map(|s| ScheduleRow {
            id: s.id.to_string(),
            name: s.name.clone(),
            kind: s.backup_kind.to_string(),
            recurrence: format_recurrence(&s.recurrence),
            active: if s.is_active { "yes" } else { "no" }.to_string(),
            next_run: format_optional_time(s.next_run),
            runs: format!("{}/{}", s.successful_runs, s.total_runs),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::psql());
    table.to_string()
}

pub fn format_schedule_details(schedule: &Schedule) -> String {
    let mut output = String::new();

    output.push_str(&format!("Schedule: {}\n", schedule.name));
    output.push_str(&format!("  ID:         {}\n", schedule.id.full()));
    output.push_str(&format!("  Recurrence: {}\n", format_recurrence(&schedule.recurrence)));
    output.push_str(&format!("  Backup:     {}\n", schedule.backup_kind));
    output.push_str(&format!("  Location:   {}\n", schedule.location));
    output.push_str(&format!(
        "  Encrypted:  {}\n",
        if schedule.is_encrypted { "Yes" } else { "No" }
    ));
    output.push_str(&format!("  Retention:  {} day(s)\n", schedule.retention_days));
    output.push_str(&format!(
        "  Active:     {}\n",
        if schedule.is_active { "Yes" } else { "No" }
    ));
    output.push('\n');
    output.push_str(&format!("  Last run: {}\n", format_optional_time(schedule.last_run)));
    output.push_str(&format!("  Next run: {}\n", format_optional_time(schedule.next_run)));
    output.push_str(&format!(
        "  Runs:     {} total, {} succeeded, {} failed\n",
        schedule.total_runs, schedule.successful_runs, schedule.failed_runs
    ));
    output.push('\n');
    output.push_str(&format!(
        "  Created:  {} by {}\n",
        format_time(schedule.created_at),
        schedule.created_by
    ));
    output
}

#[derive(Tabled)]
struct LogRow {
    #[tabled(rename = "Run")]
    id: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Scheduled")]
    scheduled: String,
    #[tabled(rename = "Completed")]
    completed: String,
    #[tabled(rename = "Backup")]
    artifact: String,
    #[tabled(rename = "Note")]
    note: String,
}

pub fn format_schedule_logs(entries: &[ScheduleLogEntry]) -> String {
    if entries.is_empty() {
        return "No runs recorded.".to_string();
    }
    let rows: Vec<LogRow> = entries
        .iter()
        .map(|e| LogRow {
            id: e.id.to_string(),
            status: e.status.to_string(),
            scheduled: format_time(e.scheduled_at),
            completed: format_optional_time(e.completed_at),
            artifact: e
                .artifact_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string()),
            note: match (&e.error_message, e.manual) {
                (Some(error), _) => error.clone(),
                (None, true) => "manual".to_string(),
                (None, false) => String::new(),
            },
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::psql());
    table.to_string()
}

pub fn format_stats(stats: &ScheduleStats) -> String {
    let mut output = String::new();
    output.push_str("Schedule Statistics\n");
    output.push_str("===================\n");
    output.push_str(&format!(
        "  Schedules:  {} ({} active)\n",
        stats.total_schedules, stats.active_schedules
    ));
    output.push_str(&format!(
        "  Runs:       {} total, {} succeeded, {} failed\n",
        stats.total_runs, stats.successful_runs, stats.failed_runs
    ));
    if let Some(rate) = stats.success_rate() {
        output.push_str(&format!("  Success:    {:.1}%\n", rate));
    }
    output.push_str(&format!(
        "  Next run:   {}\n",
        format_optional_time(stats.next_scheduled_run)
    ));
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, Weekday};

    #[test]
    fn test_format_recurrence() {
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        assert_eq!(
            format_recurrence(&Recurrence::daily(nine)),
            "every day at 09:00 UTC"
        );
        assert_eq!(
            format_recurrence(&Recurrence::weekly(nine, vec![Weekday::Mon, Weekday::Thu]).with_interval(2)),
            "every 2 weeks on Mon,Thu at 09:00 UTC"
        );
    }
}
