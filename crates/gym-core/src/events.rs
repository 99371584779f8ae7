//! Core events emitted by the engine

use chrono::NaiveDate;
use gym_api::{AttendanceStatus, SweepKind, SweepReport};
use gym_util::{ClassId, EnrollmentId, MemberId, TrainerId};

/// Events emitted by the core engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreEvent {
    /// Class created, rescheduled, or its enrollment count changed
    ClassChanged {
        class_id: ClassId,
        trainer_id: TrainerId,
        current_enrollment: u32,
        capacity: u32,
    },

    /// Class archived
    ClassRemoved {
        class_id: ClassId,
        cancelled_enrollments: usize,
    },

    /// Enrollment booked or moved to a terminal state
    EnrollmentChanged {
        enrollment_id: EnrollmentId,
        class_id: ClassId,
        member_id: MemberId,
        session_date: NaiveDate,
        attendance_status: AttendanceStatus,
    },

    SweepCompleted {
        kind: SweepKind,
        report: SweepReport,
    },
}
