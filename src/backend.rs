use crate::error::StoreError;
use crate::types::{Appointment, AppointmentFilter, AppointmentStatus, NewAppointment};
use uuid::Uuid;

pub trait AppointmentBackend: Clone + Send + Sync + 'static {
    /// Matching appointments ordered by date, then time.
    fn appointments(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError>;
    /// Fails with [`StoreError::SlotTaken`] when an in-person appointment
    /// already occupies the same coach, date and time.
    fn insert_appointment(&self, appointment: NewAppointment) -> Result<Appointment, StoreError>;
    fn update_status(&self, id: Uuid, status: AppointmentStatus)
        -> Result<Appointment, StoreError>;
}
