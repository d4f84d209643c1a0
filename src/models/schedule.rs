//! Backup schedule model
//!
//! A schedule is a recurrence rule that periodically triggers artifact
//! creation, plus the run counters the schedule engine maintains.

use chrono::{DateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::artifact::{BackupKind, CompressionLevel, StorageLocation};
use super::ids::{ArtifactId, ScheduleId, ScheduleLogId};

/// How often a schedule fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    #[default]
    Daily,
    Weekly,
    Monthly,
    /// Every `interval` configured base units
    Custom,
}

impl Frequency {
    /// Parse a frequency from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            "monthly" => Some(Self::Monthly),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Daily => write!(f, "DAILY"),
            Self::Weekly => write!(f, "WEEKLY"),
            Self::Monthly => write!(f, "MONTHLY"),
            Self::Custom => write!(f, "CUSTOM"),
        }
    }
}

/// Parse a weekday name such as "MONDAY", "thu" or "Sun"
pub fn parse_weekday(s: &str) -> Option<Weekday> {
    s.trim().parse::<Weekday>().ok()
}

/// Parse a "HH:MM" or "HH:MM:SS" time of day
pub fn parse_time_of_day(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s.trim(), "%H:%M:%S"))
        .ok()
}

/// Ten years, expressed in each frequency's unit
const MAX_DAILY_INTERVAL: u32 = 3_660;
const MAX_WEEKLY_INTERVAL: u32 = 522;
const MAX_MONTHLY_INTERVAL: u32 = 120;
/// Custom units are at least a second and at most ten years long
const MAX_CUSTOM_INTERVAL: u32 = 10_000;

/// The recurrence portion of a schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurrence {
    pub frequency: Frequency,
    /// Every N days / weeks / months / custom units
    pub interval: u32,
    pub time_of_day: NaiveTime,
    #[serde(default)]
    pub days_of_week: Vec<Weekday>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_month: Option<u32>,
}

impl Recurrence {
    pub fn daily(time_of_day: NaiveTime) -> Self {
        Self {
            frequency: Frequency::Daily,
            interval: 1,
            time_of_day,
            days_of_week: Vec::new(),
            day_of_month: None,
        }
    }

    pub fn weekly(time_of_day: NaiveTime, days_of_week: Vec<Weekday>) -> Self {
        Self {
            frequency: Frequency::Weekly,
            interval: 1,
            time_of_day,
            days_of_week,
            day_of_month: None,
        }
    }

    pub fn monthly(time_of_day: NaiveTime, day_of_month: u32) -> Self {
        Self {
            frequency: Frequency::Monthly,
            interval: 1,
            time_of_day,
            days_of_week: Vec::new(),
            day_of_month: Some(day_of_month),
        }
    }

    pub fn with_interval(mut self, interval: u32) -> Self {
        self.interval = interval;
        self
    }

    /// Largest accepted interval for this rule's frequency
    pub fn max_interval(&self) -> u32 {
        match self.frequency {
            Frequency::Daily => MAX_DAILY_INTERVAL,
            Frequency::Weekly => MAX_WEEKLY_INTERVAL,
            Frequency::Monthly => MAX_MONTHLY_INTERVAL,
            Frequency::Custom => MAX_CUSTOM_INTERVAL,
        }
    }

    /// Validate the rule
    pub fn validate(&self) -> Result<(), String> {
        if self.interval == 0 {
            return Err("Interval must be at least 1".into());
        }
        if self.interval > self.max_interval() {
            return Err(format!(
                "Interval {} is too large for a {} schedule (max {})",
                self.interval,
                self.frequency.to_string().to_lowercase(),
                self.max_interval()
            ));
        }
        match self.frequency {
            Frequency::Weekly if self.days_of_week.is_empty() => {
                Err("Weekly schedules need at least one day of week".into())
            }
            Frequency::Monthly => match self.day_of_month {
                Some(day) if (1..=31).contains(&day) => Ok(()),
                Some(day) => Err(format!("Day of month out of range: {}", day)),
                None => Err("Monthly schedules need a day of month".into()),
            },
            _ => Ok(()),
        }
    }
}

/// Input for creating or updating a schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub name: String,
    pub recurrence: Recurrence,
    pub backup_kind: BackupKind,
    pub location: StorageLocation,
    pub is_encrypted: bool,
    #[serde(default)]
    pub compression: CompressionLevel,
    pub retention_days: u32,
}

/// A recurring backup schedule
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Schedule {
    pub id: ScheduleId,
    pub name: String,
    pub recurrence: Recurrence,
    pub backup_kind: BackupKind,
    pub location: StorageLocation,
    pub is_encrypted: bool,
    #[serde(default)]
    pub compression: CompressionLevel,
    pub retention_days: u32,
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_runs: u64,
    #[serde(default)]
    pub successful_runs: u64,
    #[serde(default)]
    pub failed_runs: u64,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Schedule {
    /// Build an active schedule from its configuration
    pub fn from_config(config: ScheduleConfig, created_by: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ScheduleId::new(),
            name: config.name,
            recurrence: config.recurrence,
            backup_kind: config.backup_kind,
            location: config.location,
            is_encrypted: config.is_encrypted,
            compression: config.compression,
            retention_days: config.retention_days,
            is_active: true,
            last_run: None,
            next_run: None,
            total_runs: 0,
            successful_runs: 0,
            failed_runs: 0,
            created_by: created_by.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the configurable fields, keeping counters and identity
    pub fn apply_config(&mut self, config: ScheduleConfig) {
        self.name = config.name;
        self.recurrence = config.recurrence;
        self.backup_kind = config.backup_kind;
        self.location = config.location;
        self.is_encrypted = config.is_encrypted;
        self.compression = config.compression;
        self.retention_days = config.retention_days;
        self.updated_at = Utc::now();
    }

    /// Whether the ticker should fire this schedule at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.next_run.map_or(false, |next| next <= now)
    }
}

/// Status of one schedule execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleRunStatus {
    Scheduled,
    Running,
    Completed,
    Failed,
}

impl ScheduleRunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Legal transitions: `Scheduled -> Running -> {Completed, Failed}`.
    /// A run that never got an artifact may fail straight from `Scheduled`.
    pub fn can_transition_to(&self, next: ScheduleRunStatus) -> bool {
        matches!(
            (self, next),
            (Self::Scheduled, Self::Running)
                | (Self::Scheduled, Self::Failed)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }
}

impl fmt::Display for ScheduleRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scheduled => write!(f, "SCHEDULED"),
            Self::Running => write!(f, "RUNNING"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// One execution of a schedule
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleLogEntry {
    pub id: ScheduleLogId,
    pub schedule_id: ScheduleId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_id: Option<ArtifactId>,
    pub status: ScheduleRunStatus,
    pub scheduled_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Triggered by an operator rather than the ticker
    #[serde(default)]
    pub manual: bool,
}

impl ScheduleLogEntry {
    pub fn scheduled(schedule_id: ScheduleId, at: DateTime<Utc>, manual: bool) -> Self {
        Self {
            id: ScheduleLogId::new(),
            schedule_id,
            artifact_id: None,
            status: ScheduleRunStatus::Scheduled,
            scheduled_at: at,
            started_at: None,
            completed_at: None,
            error_message: None,
            manual,
        }
    }
}
