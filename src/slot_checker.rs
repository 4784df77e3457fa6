use crate::{
    backend::AppointmentBackend,
    error::StoreError,
    types::{AppointmentFilter, AttendanceMode},
};
use chrono::{NaiveDate, NaiveTime};
use tracing::{debug, warn};
use uuid::Uuid;

/// Decides whether a coach slot can take another booking.
///
/// Only in-person bookings are exclusive. A remote booking is accepted
/// whatever already occupies the slot.
#[derive(Debug, Clone)]
pub struct SlotChecker<T: AppointmentBackend> {
    backend: T,
}

impl<T: AppointmentBackend> SlotChecker<T> {
    pub fn new(backend: T) -> Self {
        Self { backend }
    }

    /// Number of in-person appointments in the slot.
    pub fn in_person_occupancy(
        &self,
        coach_id: Uuid,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<usize, StoreError> {
        let filter = AppointmentFilter::for_slot(coach_id, date, time);
        Ok(self.backend.appointments(&filter)?.len())
    }

    /// The store is queried for both modes, so a failing store rejects remote
    /// bookings too.
    pub fn check(
        &self,
        coach_id: Uuid,
        date: NaiveDate,
        time: NaiveTime,
        mode: AttendanceMode,
    ) -> Result<bool, StoreError> {
        let occupancy = self.in_person_occupancy(coach_id, date, time)?;
        debug!(%coach_id, %date, %time, %mode, occupancy, "Checked slot occupancy");
        Ok(match mode {
            AttendanceMode::InPerson => occupancy == 0,
            AttendanceMode::Remote => true,
        })
    }

    /// Like [`Self::check`], but a store error counts as "cannot create".
    pub fn can_create(
        &self,
        coach_id: Uuid,
        date: NaiveDate,
        time: NaiveTime,
        mode: AttendanceMode,
    ) -> bool {
        match self.check(coach_id, date, time, mode) {
            Ok(available) => available,
            Err(err) => {
                warn!(?err, %coach_id, %date, %time, "Failed to check for conflicts");
                false
            }
        }
    }
}
