use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Mutex,
};

use chrono::Utc;
use uuid::Uuid;

use crate::{
    backend::AppointmentBackend,
    error::StoreError,
    types::{Appointment, AppointmentFilter, AppointmentStatus, NewAppointment},
};

pub struct MockAppointmentBackendInner {
    /// When false, every read fails.
    pub success: AtomicBool,
    /// 1-based insert call that returns a store error. 0 disables it.
    pub fail_insert_on_call: AtomicU64,
    /// 1-based insert call that panics. 0 disables it.
    pub panic_insert_on_call: AtomicU64,
    /// 1-based insert call that loses the slot to a concurrent writer. 0 disables it.
    pub slot_taken_on_call: AtomicU64,
    pub calls_to_appointments: AtomicU64,
    pub calls_to_insert_appointment: AtomicU64,
    pub calls_to_update_status: AtomicU64,
    pub appointments: Mutex<Vec<Appointment>>,
}

/// Records calls and stores inserts without enforcing slot uniqueness.
#[derive(Clone)]
pub struct MockAppointmentBackend(pub Arc<MockAppointmentBackendInner>);

impl MockAppointmentBackendInner {
    fn new() -> Self {
        Self {
            success: AtomicBool::new(true),
            fail_insert_on_call: AtomicU64::default(),
            panic_insert_on_call: AtomicU64::default(),
            slot_taken_on_call: AtomicU64::default(),
            calls_to_appointments: AtomicU64::default(),
            calls_to_insert_appointment: AtomicU64::default(),
            calls_to_update_status: AtomicU64::default(),
            appointments: Mutex::default(),
        }
    }
}

impl MockAppointmentBackend {
    pub fn new() -> Self {
        Self(Arc::new(MockAppointmentBackendInner::new()))
    }

    pub const SUPPOSED_TO_FAIL: &'static str = "Supposed to fail";
}

impl AppointmentBackend for MockAppointmentBackend {
    fn appointments(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError> {
        self.0.calls_to_appointments.fetch_add(1, Ordering::SeqCst);
        if !self.0.success.load(Ordering::SeqCst) {
            return Err(StoreError::Database(Self::SUPPOSED_TO_FAIL.into()));
        }
        Ok(self
            .0
            .appointments
            .lock()
            .unwrap()
            .iter()
            .filter(|appointment| filter.matches(appointment))
            .cloned()
            .collect())
    }

    fn insert_appointment(&self, new: NewAppointment) -> Result<Appointment, StoreError> {
        let call = self
            .0
            .calls_to_insert_appointment
            .fetch_add(1, Ordering::SeqCst)
            + 1;
        if call == self.0.panic_insert_on_call.load(Ordering::SeqCst) {
            panic!("Supposed to panic");
        }
        if call == self.0.fail_insert_on_call.load(Ordering::SeqCst) {
            return Err(StoreError::Database(Self::SUPPOSED_TO_FAIL.into()));
        }
        if call == self.0.slot_taken_on_call.load(Ordering::SeqCst) {
            return Err(StoreError::SlotTaken {
                date: new.date,
                time: new.time,
            });
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
        self.0.appointments.lock().unwrap().push(appointment.clone());
        Ok(appointment)
    }

    fn update_status(
        &self,
        id: Uuid,
        status: AppointmentStatus,
    ) -> Result<Appointment, StoreError> {
        self.0.calls_to_update_status.fetch_add(1, Ordering::SeqCst);
        let mut appointments = self.0.appointments.lock().unwrap();
        let appointment = appointments
            .iter_mut()
            .find(|appointment| appointment.id == id)
            .ok_or(StoreError::NotFound(id))?;
        appointment.status = status;
        Ok(appointment.clone())
    }
}
