//! Deadline-scheduled requeue (C1) used by the controller runtime and the
//! renewal/backoff paths that need "come back at time T" rather than "come
//! back after duration D".

pub mod scheduled_queue;

pub use scheduled_queue::{Scheduler, ScheduledWorkQueue};
