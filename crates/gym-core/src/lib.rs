//! Core scheduling and ledger logic for gymd
//!
//! This crate is the heart of gymd, containing:
//! - Membership lifecycle (end dates, initial credit allotment, renewal)
//! - Session ledger (debit and capped credit of combative sessions)
//! - Enrollment state machine (scheduled -> attended | missed | cancelled)
//! - Trainer conflict detection
//! - Missed-session and membership-expiry sweeps
//! - The `GymEngine` facade tying these to the store in single transactions

mod conflict;
mod engine;
mod enrollment;
mod error;
mod events;
mod ledger;
mod membership;
mod notify;
mod sweeps;

#[cfg(test)]
mod testing;

pub use conflict::*;
pub use engine::*;
pub use enrollment::*;
pub use error::*;
pub use events::*;
pub use ledger::*;
pub use membership::*;
pub use notify::*;
