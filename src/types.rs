use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttendanceMode {
    #[default]
    #[serde(alias = "presencial")]
    InPerson,
    #[serde(alias = "remoto")]
    Remote,
}

impl AttendanceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceMode::InPerson => "in-person",
            AttendanceMode::Remote => "remote",
        }
    }
}

impl fmt::Display for AttendanceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceMode {
    type Err = String;

    /// Rows written by the first version of the app use the Portuguese names.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "in-person" | "presencial" => Ok(AttendanceMode::InPerson),
            "remote" | "remoto" => Ok(AttendanceMode::Remote),
            other => Err(format!("Unknown attendance mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    #[default]
    Scheduled,
    Completed,
    Cancelled,
    Missed,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::Missed => "missed",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "scheduled" => Ok(AppointmentStatus::Scheduled),
            "completed" => Ok(AppointmentStatus::Completed),
            "cancelled" => Ok(AppointmentStatus::Cancelled),
            "missed" => Ok(AppointmentStatus::Missed),
            other => Err(format!("Unknown appointment status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub coach_id: Uuid,
    pub student_id: Uuid,
    pub date: NaiveDate,
    #[serde(default, with = "clock_time::option")]
    pub time: Option<NaiveTime>,
    pub mode: AttendanceMode,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A validated appointment that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAppointment {
    pub coach_id: Uuid,
    pub student_id: Uuid,
    pub date: NaiveDate,
    #[serde(with = "clock_time")]
    pub time: NaiveTime,
    pub mode: AttendanceMode,
    #[serde(default)]
    pub status: AppointmentStatus,
    pub notes: Option<String>,
}

impl NewAppointment {
    /// Same booking moved to another date and time.
    pub fn at(&self, date: NaiveDate, time: NaiveTime) -> Self {
        Self {
            date,
            time,
            ..self.clone()
        }
    }
}

/// Equality and range filters understood by every appointment backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppointmentFilter {
    pub coach_id: Option<Uuid>,
    pub student_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub mode: Option<AttendanceMode>,
    pub status: Option<AppointmentStatus>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

impl AppointmentFilter {
    /// In-person occupancy of one coach slot.
    pub fn for_slot(coach_id: Uuid, date: NaiveDate, time: NaiveTime) -> Self {
        Self {
            coach_id: Some(coach_id),
            date: Some(date),
            time: Some(time),
            mode: Some(AttendanceMode::InPerson),
            ..Self::default()
        }
    }

    pub fn for_day(coach_id: Uuid, date: NaiveDate) -> Self {
        Self {
            coach_id: Some(coach_id),
            date: Some(date),
            ..Self::default()
        }
    }

    /// First to last day of the given month. `month` is 1-based.
    pub fn for_month(coach_id: Uuid, year: i32, month: u32) -> Option<Self> {
        let first_day = NaiveDate::from_ymd_opt(year, month, 1)?;
        let last_day = first_day.checked_add_months(Months::new(1))?.pred_opt()?;
        Some(Self {
            coach_id: Some(coach_id),
            date_from: Some(first_day),
            date_to: Some(last_day),
            ..Self::default()
        })
    }

    pub fn matches(&self, appointment: &Appointment) -> bool {
        self.coach_id.map_or(true, |v| appointment.coach_id == v)
            && self.student_id.map_or(true, |v| appointment.student_id == v)
            && self.date.map_or(true, |v| appointment.date == v)
            && self.time.map_or(true, |v| appointment.time == Some(v))
            && self.mode.map_or(true, |v| appointment.mode == v)
            && self.status.map_or(true, |v| appointment.status == v)
            && self.date_from.map_or(true, |v| appointment.date >= v)
            && self.date_to.map_or(true, |v| appointment.date <= v)
    }
}

/// Orders by date, then time, with untimed rows last (as PostgreSQL does).
pub fn sort_chronologically(appointments: &mut [Appointment]) {
    appointments.sort_by_key(|a| (a.date, a.time.is_none(), a.time, a.created_at));
}

pub fn weekday_index(date: NaiveDate) -> u32 {
    date.weekday().num_days_from_sunday()
}

/// `HH:MM` on the wire; `HH:MM:SS` is accepted on input.
pub mod clock_time {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn parse(value: &str) -> Result<NaiveTime, chrono::ParseError> {
        NaiveTime::parse_from_str(value, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
    }

    pub fn format(time: &NaiveTime) -> String {
        time.format("%H:%M").to_string()
    }

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(time))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use chrono::NaiveTime;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            time: &Option<NaiveTime>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match time {
                Some(time) => super::serialize(time, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<NaiveTime>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                Some(raw) if !raw.is_empty() => super::parse(&raw)
                    .map(Some)
                    .map_err(serde::de::Error::custom),
                _ => Ok(None),
            }
        }
    }
}
