use crate::{
    backend::AppointmentBackend,
    error::{CreationFailure, SchedulingError, StoreError},
    recurrence::{RecurrenceOptions, ReplicatedSlot, ReplicationPlan, WeekdayLabels},
    slot_checker::SlotChecker,
    types::{
        clock_time, Appointment, AppointmentFilter, AppointmentStatus, AttendanceMode,
        NewAppointment,
    },
};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::Validate;

/// Booking as entered by the coach, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct AppointmentDraft {
    #[validate(required(message = "select a coach"))]
    pub coach_id: Option<Uuid>,
    #[validate(required(message = "select a student"))]
    pub student_id: Option<Uuid>,
    #[validate(required(message = "select a date"))]
    pub date: Option<NaiveDate>,
    #[serde(default, with = "clock_time::option")]
    #[validate(required(message = "select a time"))]
    pub time: Option<NaiveTime>,
    #[serde(default)]
    pub mode: AttendanceMode,
    #[validate(length(max = 2000, message = "notes are limited to 2000 characters"))]
    pub notes: Option<String>,
}

impl AppointmentDraft {
    pub fn validated(&self) -> Result<NewAppointment, SchedulingError> {
        self.validate()
            .map_err(|err| SchedulingError::Validation(err.to_string()))?;

        match (self.coach_id, self.student_id, self.date, self.time) {
            (Some(coach_id), Some(student_id), Some(date), Some(time)) => Ok(NewAppointment {
                coach_id,
                student_id,
                date,
                time,
                mode: self.mode,
                status: AppointmentStatus::Scheduled,
                notes: self
                    .notes
                    .as_ref()
                    .map(|notes| notes.trim())
                    .filter(|notes| !notes.is_empty())
                    .map(String::from),
            }),
            _ => Err(SchedulingError::Validation("missing required fields".into())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreationOutcome {
    pub success: bool,
    pub data: Option<Appointment>,
    pub error: Option<String>,
    #[serde(skip)]
    failure: Option<CreationFailure>,
}

impl CreationOutcome {
    fn created(appointment: Appointment) -> Self {
        Self {
            success: true,
            data: Some(appointment),
            error: None,
            failure: None,
        }
    }

    fn failed(failure: CreationFailure) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(failure.to_string()),
            failure: Some(failure),
        }
    }

    pub fn failure(&self) -> Option<&CreationFailure> {
        self.failure.as_ref()
    }
}

/// One outcome per attempted appointment, in submission order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub results: Vec<CreationOutcome>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|outcome| outcome.success).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    pub fn failure_reasons(&self) -> String {
        self.results
            .iter()
            .filter_map(|outcome| outcome.error.as_deref())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn summary(&self) -> String {
        format!(
            "{} appointment(s) created, {} failed",
            self.succeeded(),
            self.failed()
        )
    }
}

#[derive(Debug, Clone)]
pub struct Scheduler<T: AppointmentBackend> {
    backend: T,
    slot_checker: SlotChecker<T>,
    labels: WeekdayLabels,
}

impl<T: AppointmentBackend> Scheduler<T> {
    pub fn new(backend: T, labels: WeekdayLabels) -> Self {
        Self {
            slot_checker: SlotChecker::new(backend.clone()),
            backend,
            labels,
        }
    }

    pub fn slot_checker(&self) -> &SlotChecker<T> {
        &self.slot_checker
    }

    pub fn appointments(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError> {
        self.backend.appointments(filter)
    }

    pub fn update_status(
        &self,
        id: Uuid,
        status: AppointmentStatus,
    ) -> Result<Appointment, StoreError> {
        let appointment = self.backend.update_status(id, status)?;
        info!(%id, %status, "Appointment status updated");
        Ok(appointment)
    }

    fn attempt(&self, appointment: &NewAppointment) -> Result<Appointment, CreationFailure> {
        let (date, time) = (appointment.date, appointment.time);
        match self
            .slot_checker
            .check(appointment.coach_id, date, time, appointment.mode)
        {
            Ok(true) => {}
            Ok(false) => return Err(CreationFailure::Conflict { date, time }),
            Err(source) => return Err(CreationFailure::Undetermined { date, time, source }),
        }

        self.backend
            .insert_appointment(appointment.clone())
            .map_err(CreationFailure::Store)
    }

    /// Conflict check followed by insert. Never panics, whatever the backend does.
    pub fn create_one(&self, appointment: NewAppointment) -> CreationOutcome {
        match panic::catch_unwind(AssertUnwindSafe(|| self.attempt(&appointment))) {
            Ok(Ok(created)) => {
                info!(
                    id = %created.id,
                    date = %created.date,
                    mode = %created.mode,
                    "Appointment created"
                );
                CreationOutcome::created(created)
            }
            Ok(Err(failure)) => {
                warn!(%failure, date = %appointment.date, "Appointment not created");
                CreationOutcome::failed(failure)
            }
            Err(_) => {
                error!(date = %appointment.date, "Unexpected error while creating appointment");
                CreationOutcome::failed(CreationFailure::Unexpected)
            }
        }
    }

    /// Items are independent: a failed one does not stop or undo the others.
    pub fn create_many(&self, appointments: Vec<NewAppointment>) -> BatchReport {
        let report = BatchReport {
            results: appointments
                .into_iter()
                .map(|appointment| self.create_one(appointment))
                .collect(),
        };
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Appointment batch processed"
        );
        report
    }

    pub fn plan(
        &self,
        anchor_date: NaiveDate,
        anchor_time: NaiveTime,
        options: &RecurrenceOptions,
    ) -> Result<ReplicationPlan, SchedulingError> {
        ReplicationPlan::generate(anchor_date, anchor_time, options, self.labels)
    }

    /// Creates the drafted booking first, then one copy per slot.
    pub fn create_batch(
        &self,
        draft: &AppointmentDraft,
        slots: &[ReplicatedSlot],
    ) -> Result<BatchReport, SchedulingError> {
        let base = draft.validated()?;
        if slots.is_empty() {
            return Ok(BatchReport {
                results: vec![self.create_one(base)],
            });
        }

        let mut appointments = Vec::with_capacity(slots.len() + 1);
        appointments.extend(slots.iter().map(|slot| base.at(slot.date, slot.time)));
        appointments.insert(0, base);
        Ok(self.create_many(appointments))
    }

    /// Submits a draft together with its (possibly edited) replication plan.
    pub fn submit(
        &self,
        draft: &AppointmentDraft,
        plan: Option<&ReplicationPlan>,
    ) -> Result<BatchReport, SchedulingError> {
        let Some(plan) = plan.filter(|plan| !plan.is_empty()) else {
            return self.create_batch(draft, &[]);
        };

        if draft.date.is_some() && draft.date != Some(plan.anchor_date()) {
            return Err(SchedulingError::Validation(
                "replication plan belongs to another date".into(),
            ));
        }
        let anchored = AppointmentDraft {
            time: draft.time.map(|_| plan.anchor_time()),
            ..draft.clone()
        };
        self.create_batch(&anchored, plan.instances())
    }

    pub fn submit_recurring(
        &self,
        draft: &AppointmentDraft,
        options: &RecurrenceOptions,
    ) -> Result<BatchReport, SchedulingError> {
        let base = draft.validated()?;
        let plan = self.plan(base.date, base.time, options)?;
        self.submit(draft, Some(&plan))
    }
}
