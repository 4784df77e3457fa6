use crate::{
    backend::AppointmentBackend,
    error::StoreError,
    types::{
        sort_chronologically, Appointment, AppointmentFilter, AppointmentStatus, AttendanceMode,
        NewAppointment,
    },
};
use chrono::Utc;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tracing::{debug, warn};
use uuid::Uuid;

/// Impersistent appointment store, used when no database is configured.
#[derive(Debug, Clone, Default)]
pub struct LocalAppointments {
    appointments: Arc<Mutex<HashMap<Uuid, Appointment>>>,
}

impl LocalAppointments {
    /// Every write completes before the guard is released, so a poisoned map is still whole.
    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Appointment>> {
        self.appointments.lock().unwrap_or_else(|poisoned| {
            warn!("Appointment store lock was poisoned, recovering");
            PoisonError::into_inner(poisoned)
        })
    }
}

impl AppointmentBackend for LocalAppointments {
    fn appointments(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError> {
        let mut appointments: Vec<Appointment> = self
            .lock()
            .values()
            .filter(|appointment| filter.matches(appointment))
            .cloned()
            .collect();
        sort_chronologically(&mut appointments);
        Ok(appointments)
    }

    fn insert_appointment(&self, new: NewAppointment) -> Result<Appointment, StoreError> {
        let mut appointments = self.lock();

        // Check and insert under the same lock, so two writers can't both win the slot.
        if new.mode == AttendanceMode::InPerson {
            let slot = AppointmentFilter::for_slot(new.coach_id, new.date, new.time);
            if appointments.values().any(|existing| slot.matches(existing)) {
                return Err(StoreError::SlotTaken {
                    date: new.date,
                    time: new.time,
                });
            }
        }

        let appointment = Appointment {
            id: Uuid::new_v4(),
            coach_id: new.coach_id,
            student_id: new.student_id,
            date: new.date,
            time: Some(new.time),
            mode: new.mode,
            status: new.status,
            notes: new.notes,
            created_at: Utc::now(),
        };
        debug!(id = %appointment.id, date = %appointment.date, "Stored appointment in memory");
        appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    fn update_status(
        &self,
        id: Uuid,
        status: AppointmentStatus,
    ) -> Result<Appointment, StoreError> {
        let mut appointments = self.lock();
        match appointments.get_mut(&id) {
            Some(appointment) => {
                appointment.status = status;
                Ok(appointment.clone())
            }
            None => Err(StoreError::NotFound(id)),
        }
    }
}
