//! Expansion of one booking into recurring instances.
//!
//! Two shapes are supported: the same weekday for a number of following
//! weeks, or an explicit set of weekdays, optionally repeated for a number of
//! weeks. The anchor booking itself is never part of the expansion.

use crate::{
    error::SchedulingError,
    types::{clock_time, weekday_index},
};
use chrono::{Datelike, Days, NaiveDate, NaiveTime, Weekday};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum WeekdayLabels {
    #[default]
    Portuguese,
    English,
}

impl WeekdayLabels {
    pub fn label(&self, weekday: Weekday) -> &'static str {
        const PORTUGUESE: [&str; 7] = [
            "Domingo", "Segunda", "Terça", "Quarta", "Quinta", "Sexta", "Sábado",
        ];
        const ENGLISH: [&str; 7] = [
            "Sunday",
            "Monday",
            "Tuesday",
            "Wednesday",
            "Thursday",
            "Friday",
            "Saturday",
        ];
        let index = weekday.num_days_from_sunday() as usize;
        match self {
            WeekdayLabels::Portuguese => PORTUGUESE[index],
            WeekdayLabels::English => ENGLISH[index],
        }
    }
}

fn default_weeks_count() -> u32 {
    1
}

fn default_same_time_for_all() -> bool {
    true
}

/// Recurrence options as a client sends them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RecurrenceOptions {
    #[serde(default)]
    pub replicate_same_weekday: bool,
    #[serde(default = "default_weeks_count")]
    #[validate(range(min = 1, max = 12, message = "weeks count must be between 1 and 12"))]
    pub weeks_count: u32,
    #[serde(default)]
    pub replicate_to_weekday_set: bool,
    /// Weekday indices, 0 = Sunday.
    #[serde(default)]
    pub weekday_set: Vec<u8>,
    #[serde(default = "default_same_time_for_all")]
    pub same_time_for_all: bool,
}

impl Default for RecurrenceOptions {
    fn default() -> Self {
        Self {
            replicate_same_weekday: false,
            weeks_count: default_weeks_count(),
            replicate_to_weekday_set: false,
            weekday_set: Vec::new(),
            same_time_for_all: default_same_time_for_all(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Replication {
    None,
    SameWeekday { weeks: u32 },
    /// `weeks` additional weeks after the anchor week.
    WeekdaySet { weekdays: Vec<Weekday>, weeks: u32 },
}

impl TryFrom<&RecurrenceOptions> for Replication {
    type Error = SchedulingError;

    fn try_from(options: &RecurrenceOptions) -> Result<Self, Self::Error> {
        options
            .validate()
            .map_err(|err| SchedulingError::InvalidRecurrence(err.to_string()))?;

        let mut weekdays: Vec<Weekday> = Vec::with_capacity(options.weekday_set.len());
        for &index in &options.weekday_set {
            let weekday = weekday_from_index(index)?;
            if !weekdays.contains(&weekday) {
                weekdays.push(weekday);
            }
        }

        if options.replicate_to_weekday_set && !weekdays.is_empty() {
            let weeks = if options.replicate_same_weekday {
                options.weeks_count
            } else {
                0
            };
            return Ok(Replication::WeekdaySet { weekdays, weeks });
        }

        if options.replicate_same_weekday {
            return Ok(Replication::SameWeekday {
                weeks: options.weeks_count,
            });
        }

        Ok(Replication::None)
    }
}

fn weekday_from_index(index: u8) -> Result<Weekday, SchedulingError> {
    match index {
        0 => Ok(Weekday::Sun),
        1 => Ok(Weekday::Mon),
        2 => Ok(Weekday::Tue),
        3 => Ok(Weekday::Wed),
        4 => Ok(Weekday::Thu),
        5 => Ok(Weekday::Fri),
        6 => Ok(Weekday::Sat),
        other => Err(SchedulingError::InvalidRecurrence(format!(
            "weekday index {other} is outside 0..=6"
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicatedSlot {
    pub date: NaiveDate,
    #[serde(with = "clock_time")]
    pub time: NaiveTime,
    #[serde(default)]
    pub weekday: String,
}

fn offset(anchor: NaiveDate, days: u32) -> Result<NaiveDate, SchedulingError> {
    anchor
        .checked_add_days(Days::new(u64::from(days)))
        .ok_or_else(|| {
            SchedulingError::InvalidRecurrence(format!("{anchor} plus {days} days is out of range"))
        })
}

/// Dates and times that `replication` adds to a booking on `anchor_date`.
pub fn expand(
    anchor_date: NaiveDate,
    anchor_time: NaiveTime,
    replication: &Replication,
    labels: WeekdayLabels,
) -> Result<Vec<ReplicatedSlot>, SchedulingError> {
    let slot = |date: NaiveDate| ReplicatedSlot {
        date,
        time: anchor_time,
        weekday: labels.label(date.weekday()).to_string(),
    };

    let mut slots = Vec::new();
    match replication {
        Replication::None => {}
        Replication::SameWeekday { weeks } => {
            for week in 1..=*weeks {
                slots.push(slot(offset(anchor_date, week * 7)?));
            }
        }
        Replication::WeekdaySet { weekdays, weeks } => {
            let anchor_weekday = weekday_index(anchor_date);
            for week in 0..=*weeks {
                for weekday in weekdays {
                    let days_until = (weekday.num_days_from_sunday() + 7 - anchor_weekday) % 7;
                    // The anchor booking already covers this one.
                    if week == 0 && days_until == 0 {
                        continue;
                    }
                    slots.push(slot(offset(anchor_date, days_until + week * 7)?));
                }
            }
        }
    }
    Ok(slots)
}

/// Pending set of replicated instances, editable until it is submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplicationPlan {
    anchor_date: NaiveDate,
    #[serde(with = "clock_time")]
    anchor_time: NaiveTime,
    same_time_for_all: bool,
    instances: Vec<ReplicatedSlot>,
}

impl ReplicationPlan {
    pub fn generate(
        anchor_date: NaiveDate,
        anchor_time: NaiveTime,
        options: &RecurrenceOptions,
        labels: WeekdayLabels,
    ) -> Result<Self, SchedulingError> {
        let replication = Replication::try_from(options)?;
        let instances = expand(anchor_date, anchor_time, &replication, labels)?;
        Ok(Self {
            anchor_date,
            anchor_time,
            same_time_for_all: options.same_time_for_all,
            instances,
        })
    }

    pub fn anchor_date(&self) -> NaiveDate {
        self.anchor_date
    }

    pub fn anchor_time(&self) -> NaiveTime {
        self.anchor_time
    }

    pub fn same_time_for_all(&self) -> bool {
        self.same_time_for_all
    }

    pub fn instances(&self) -> &[ReplicatedSlot] {
        &self.instances
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// With "same time for all" the anchor and every instance move together.
    pub fn set_time(&mut self, index: usize, time: NaiveTime) -> Result<(), SchedulingError> {
        if index >= self.instances.len() {
            return Err(SchedulingError::InvalidRecurrence(format!(
                "no replicated appointment at position {index}"
            )));
        }
        if self.same_time_for_all {
            self.anchor_time = time;
            self.instances.iter_mut().for_each(|slot| slot.time = time);
        } else {
            self.instances[index].time = time;
        }
        Ok(())
    }

    /// Enabling aligns every instance on the first instance's time.
    pub fn set_same_time_for_all(&mut self, enabled: bool) {
        self.same_time_for_all = enabled;
        if !enabled {
            return;
        }
        if let Some(first_time) = self.instances.first().map(|slot| slot.time) {
            self.instances.iter_mut().for_each(|slot| slot.time = first_time);
        }
    }

    pub fn remove(&mut self, index: usize) -> Option<ReplicatedSlot> {
        (index < self.instances.len()).then(|| self.instances.remove(index))
    }
}
