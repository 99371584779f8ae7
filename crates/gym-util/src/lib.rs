//! Shared utilities for gymd
//!
//! This crate provides:
//! - ID types (MemberId, ClassId, TrainerId, EnrollmentId, MembershipId, ClientId)
//! - Wall-clock helpers (mock-able `now()`, `WallClock`, `DaysOfWeek`)
//! - The schedule descriptor model and overlap test
//! - Rate limiting helpers
//! - Default paths for socket, data, config, and log directories

mod ids;
mod paths;
mod rate_limit;
mod schedule;
mod time;

pub use ids::*;
pub use paths::*;
pub use rate_limit::*;
pub use schedule::*;
pub use time::*;
