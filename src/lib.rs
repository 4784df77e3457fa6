//! Appointment booking for coaches: slot conflict checks, recurring
//! appointment generation and batch creation with per-item outcomes.

#[macro_use]
extern crate diesel;

pub mod backend;
pub mod configuration;
pub mod configuration_handler;
pub mod database_interface;
pub mod error;
pub mod http;
pub mod local_appointments;
pub mod recurrence;
pub mod scheduler;
mod schema;
pub mod slot_checker;
#[cfg(test)]
mod testutils;
pub mod types;
