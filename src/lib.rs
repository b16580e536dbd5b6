//! # GeoClock core.
//!
//! The control core of a geofenced time-and-attendance enforcer. Employees
//! share their phone location through a chat platform; this crate keeps the
//! latest location per employee, tracks live-sharing sessions, and
//! periodically verifies that every clocked-in employee is still inside
//! their assigned working area. Drifting outside, letting live sharing
//! lapse, or letting location data go stale results in an automatic
//! clock-out with notifications to the employee and their manager.
//!
//! The entry points are [`context::Context`] (owns the store pool, the
//! live-session registry and the event channel), `Context::start_io` (spawns
//! the monitor, the sweeper and the transport poller) and
//! [`location::on_location_event`] for inbound location events.

#![forbid(unsafe_code)]
#![warn(unused, clippy::wildcard_imports, clippy::needless_borrow)]

#[macro_use]
pub mod log;

pub mod attendance;
pub mod commands;
pub mod config;
pub mod constants;
pub mod context;
pub mod employee;
pub mod events;
pub mod live;
pub mod location;
pub mod monitor;
pub mod polygon;
mod scheduler;
pub mod sql;
mod stock_str;
pub mod storage;
#[cfg(test)]
pub(crate) mod test_utils;
pub mod tools;
pub mod transport;
pub mod validator;
