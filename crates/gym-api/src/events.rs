//! Event types for gymd -> client streaming

use chrono::{DateTime, Local, NaiveDate};
use gym_util::{ClassId, EnrollmentId, MemberId, TrainerId};
use serde::{Deserialize, Serialize};

use crate::{API_VERSION, AttendanceStatus, SweepReport};

/// Event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub api_version: u32,
    pub timestamp: DateTime<Local>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            api_version: API_VERSION,
            timestamp: gym_util::now(),
            payload,
        }
    }
}

/// Kinds of sweep the service runs on a timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepKind {
    Missed,
    Expiry,
}

impl SweepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SweepKind::Missed => "missed",
            SweepKind::Expiry => "expiry",
        }
    }
}

/// All possible events from the service to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    ClassChanged {
        class_id: ClassId,
        trainer_id: TrainerId,
        current_enrollment: u32,
        capacity: u32,
    },

    ClassRemoved {
        class_id: ClassId,
        cancelled_enrollments: usize,
    },

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

    /// Service is shutting down
    Shutdown,
}
