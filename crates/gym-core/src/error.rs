//! Error taxonomy for engine operations

use chrono::NaiveDate;
use gym_api::{AttendanceStatus, MemberStatus, MembershipStatus};
use gym_store::StoreError;
use gym_util::{ClassId, EnrollmentId, MemberId};
use thiserror::Error;

/// Why a member cannot be charged a session
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CreditDenial {
    #[error("member is {status}")]
    MemberNotActive { status: MemberStatus },

    #[error("member has no combative membership")]
    NoCombativeMembership,

    #[error("combative membership is {status}")]
    MembershipNotActive { status: MembershipStatus },

    #[error("combative membership ended on {end_date}")]
    MembershipLapsed { end_date: NaiveDate },

    #[error("no sessions remaining")]
    NoSessionsRemaining,
}

/// Engine errors
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed input, rejected before any mutation
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Schedule overlaps another class of the same trainer
    #[error("Schedule conflicts with {class_name} ({class_id})")]
    Conflict { class_id: ClassId, class_name: String },

    #[error("Class {class_id} is full ({capacity} places)")]
    Capacity { class_id: ClassId, capacity: u32 },

    #[error("No usable session credit: {0}")]
    Credit(CreditDenial),

    #[error("{member_id} is already booked into {class_id} on {session_date}")]
    DuplicateBooking {
        member_id: MemberId,
        class_id: ClassId,
        session_date: NaiveDate,
    },

    #[error("Enrollment {enrollment_id} is already {attendance}")]
    AlreadyTerminal {
        enrollment_id: EnrollmentId,
        attendance: AttendanceStatus,
    },

    /// The write transaction could not be acquired in time
    #[error("Store is busy, try again")]
    Concurrency,

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        CoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Concurrency)
    }
}

impl From<StoreError> for CoreError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Busy => CoreError::Concurrency,
            other => CoreError::Store(other),
        }
    }
}

impl From<CreditDenial> for CoreError {
    fn from(denial: CreditDenial) -> Self {
        CoreError::Credit(denial)
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
