//! Enrollment state machine
//!
//! ```text
//! scheduled --cancel----> cancelled  (status cancelled, refund)
//!           --attended--> attended   (status completed, no refund)
//!           --missed----> missed     (status cancelled, refund)
//!           --timed out-> missed     (status cancelled, refund per policy)
//! ```
//!
//! Every non-scheduled state is terminal.

use chrono::{DateTime, Local};
use gym_api::{AttendanceOutcome, AttendanceStatus, Enrollment, EnrollmentStatus};

use crate::{CoreError, CoreResult};

/// A request to move an enrollment out of `scheduled`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Member or staff cancelled the booking
    Cancel,
    /// Staff confirmed the member attended
    Attended,
    /// Staff recorded a no-show
    Missed,
    /// The session date passed while still scheduled
    TimedOut { refund: bool },
}

impl From<AttendanceOutcome> for Transition {
    fn from(outcome: AttendanceOutcome) -> Self {
        match outcome {
            AttendanceOutcome::Attended => Transition::Attended,
            AttendanceOutcome::Missed => Transition::Missed,
        }
    }
}

/// What the caller must do to the ledger after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionEffect {
    /// Credit one session back to the enrollment's membership
    pub refund: bool,
}

/// Apply a transition in place.
///
/// Fails with `AlreadyTerminal` unless the enrollment is still scheduled.
/// `refund_processed` guards the refund: it is set the first time a refund
/// is granted and a set flag suppresses any further one.
pub fn apply_transition(
    enrollment: &mut Enrollment,
    transition: Transition,
    now: DateTime<Local>,
) -> CoreResult<TransitionEffect> {
    if enrollment.attendance_status.is_terminal() || enrollment.status != EnrollmentStatus::Active
    {
        return Err(CoreError::AlreadyTerminal {
            enrollment_id: enrollment.enrollment_id,
            attendance: enrollment.attendance_status,
        });
    }

    let wants_refund = match transition {
        Transition::Cancel => {
            enrollment.status = EnrollmentStatus::Cancelled;
            enrollment.attendance_status = AttendanceStatus::Cancelled;
            enrollment.cancelled_at = Some(now);
            true
        }
        Transition::Attended => {
            enrollment.status = EnrollmentStatus::Completed;
            enrollment.attendance_status = AttendanceStatus::Attended;
            enrollment.attendance_marked_at = Some(now);
            false
        }
        Transition::Missed => {
            enrollment.status = EnrollmentStatus::Cancelled;
            enrollment.attendance_status = AttendanceStatus::Missed;
            enrollment.attendance_marked_at = Some(now);
            true
        }
        Transition::TimedOut { refund } => {
            enrollment.status = EnrollmentStatus::Cancelled;
            enrollment.attendance_status = AttendanceStatus::Missed;
            enrollment.cancelled_at = Some(now);
            enrollment.attendance_marked_at = Some(now);
            refund
        }
    };

    let refund = wants_refund && !enrollment.refund_processed;
    if refund {
        enrollment.refund_processed = true;
    }

    Ok(TransitionEffect { refund })
}
