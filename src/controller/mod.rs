//! Controller runtime and reconcilers (C3/C4/C6/C8): the pieces that pull
//! `resource::{Certificate, Order}` keys off a [`crate::queue::RateLimitedQueue`]
//! and drive them toward their desired state through the [`crate::issuer`]
//! and [`crate::challenge::driver`] seams.
pub mod certificate_reconciler;
pub mod order_reconciler;
pub mod runtime;
pub mod webhook_bootstrap;

pub use runtime::{AlwaysLeader, ControllerRuntime, KeyLister, LeaderGate, Sync};
