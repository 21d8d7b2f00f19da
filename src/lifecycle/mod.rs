//! The booking lifecycle core: how a request moves between passenger and
//! driver, how seats are counted, and when the counterpart hears about it.

pub mod expiry;
pub mod seats;
pub mod state_machine;
pub mod store;

mod coordinator;

pub use coordinator::RideLifecycle;
