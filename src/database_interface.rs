use crate::schema::appointments;
use crate::{
    backend::AppointmentBackend,
    error::StoreError,
    types::{Appointment, AppointmentFilter, AppointmentStatus, NewAppointment},
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::{ConnectionError, PgConnection};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{error, warn};
use uuid::Uuid;

#[derive(Queryable, Selectable)]
#[diesel(table_name = appointments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct AppointmentRow {
    id: Uuid,
    coach_id: Uuid,
    student_id: Uuid,
    date: NaiveDate,
    time: Option<NaiveTime>,
    attendance_mode: String,
    status: String,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<AppointmentRow> for Appointment {
    type Error = StoreError;

    fn try_from(row: AppointmentRow) -> Result<Self, Self::Error> {
        let corrupt = |reason: String| StoreError::CorruptRow { id: row.id, reason };
        Ok(Appointment {
            id: row.id,
            coach_id: row.coach_id,
            student_id: row.student_id,
            date: row.date,
            time: row.time,
            mode: row.attendance_mode.parse().map_err(corrupt)?,
            status: row.status.parse().map_err(corrupt)?,
            notes: row.notes,
            created_at: row.created_at,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = appointments)]
struct NewAppointmentRow<'a> {
    coach_id: Uuid,
    student_id: Uuid,
    date: NaiveDate,
    time: Option<NaiveTime>,
    attendance_mode: &'a str,
    status: &'a str,
    notes: Option<&'a str>,
}

#[derive(Clone)]
pub struct DatabaseInterface {
    connection: Arc<Mutex<PgConnection>>,
}

impl DatabaseInterface {
    pub fn new(database_url: &str) -> Result<Self, ConnectionError> {
        let connection = Self::establish_connection(database_url)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    fn establish_connection(database_url: &str) -> Result<PgConnection, ConnectionError> {
        PgConnection::establish(database_url)
    }

    /// A panicking request poisons the lock but leaves the connection in place.
    fn connection(&self) -> MutexGuard<'_, PgConnection> {
        self.connection.lock().unwrap_or_else(|poisoned| {
            warn!("Database connection lock was poisoned, recovering");
            PoisonError::into_inner(poisoned)
        })
    }
}

fn database_error(err: DieselError, context: &str) -> StoreError {
    error!(?err, "{context}");
    StoreError::Database(err.to_string())
}

impl AppointmentBackend for DatabaseInterface {
    fn appointments(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError> {
        let mut connection = self.connection();

        let mut query = appointments::table
            .select(AppointmentRow::as_select())
            .into_boxed();
        if let Some(coach_id) = filter.coach_id {
            query = query.filter(appointments::coach_id.eq(coach_id));
        }
        if let Some(student_id) = filter.student_id {
            query = query.filter(appointments::student_id.eq(student_id));
        }
        if let Some(date) = filter.date {
            query = query.filter(appointments::date.eq(date));
        }
        if let Some(time) = filter.time {
            query = query.filter(appointments::time.eq(time));
        }
        if let Some(mode) = filter.mode {
            query = query.filter(appointments::attendance_mode.eq(mode.as_str()));
        }
        if let Some(status) = filter.status {
            query = query.filter(appointments::status.eq(status.as_str()));
        }
        if let Some(date_from) = filter.date_from {
            query = query.filter(appointments::date.ge(date_from));
        }
        if let Some(date_to) = filter.date_to {
            query = query.filter(appointments::date.le(date_to));
        }

        let rows = query
            .order((
                appointments::date.asc(),
                appointments::time.asc(),
                appointments::created_at.asc(),
            ))
            .load::<AppointmentRow>(&mut *connection)
            .map_err(|err| database_error(err, "Failed to read appointments from database"))?;

        rows.into_iter().map(Appointment::try_from).collect()
    }

    fn insert_appointment(&self, new: NewAppointment) -> Result<Appointment, StoreError> {
        let mut connection = self.connection();
        let row = NewAppointmentRow {
            coach_id: new.coach_id,
            student_id: new.student_id,
            date: new.date,
            time: Some(new.time),
            attendance_mode: new.mode.as_str(),
            status: new.status.as_str(),
            notes: new.notes.as_deref(),
        };

        // The partial unique index on in-person slots settles races between writers.
        let result = diesel::insert_into(appointments::table)
            .values(&row)
            .returning(AppointmentRow::as_returning())
            .get_result::<AppointmentRow>(&mut *connection);

        match result {
            Ok(row) => Appointment::try_from(row),
            Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                Err(StoreError::SlotTaken {
                    date: new.date,
                    time: new.time,
                })
            }
            Err(err) => Err(database_error(err, "Appointment can't be added")),
        }
    }

    fn update_status(
        &self,
        id: Uuid,
        status: AppointmentStatus,
    ) -> Result<Appointment, StoreError> {
        let mut connection = self.connection();
        let result = diesel::update(appointments::table.find(id))
            .set(appointments::status.eq(status.as_str()))
            .returning(AppointmentRow::as_returning())
            .get_result::<AppointmentRow>(&mut *connection);

        match result {
            Ok(row) => Appointment::try_from(row),
            Err(DieselError::NotFound) => Err(StoreError::NotFound(id)),
            Err(err) => Err(database_error(err, "Appointment status can't be updated")),
        }
    }
}
