//! Audit event types

use chrono::{DateTime, Local, NaiveDate};
use gym_api::{AttendanceStatus, AuditRecord, MemberStatus, MembershipType};
use gym_util::{ClassId, EnrollmentId, MemberId, MembershipId, TrainerId};
use serde::{Deserialize, Serialize};

/// Types of audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    /// Service started
    ServiceStarted,

    /// Service stopped
    ServiceStopped,

    /// Configuration loaded
    ConfigLoaded { trainer_count: usize },

    MemberRegistered {
        member_id: MemberId,
        memberships: usize,
    },

    MemberStatusChanged {
        member_id: MemberId,
        status: MemberStatus,
    },

    MembershipRenewed {
        member_id: MemberId,
        membership_id: MembershipId,
        kind: MembershipType,
        end_date: NaiveDate,
        superseded: Vec<MembershipId>,
    },

    /// Set only by the expiry sweep
    MembershipExpired {
        member_id: MemberId,
        membership_id: MembershipId,
    },

    ClassCreated {
        class_id: ClassId,
        trainer_id: TrainerId,
        schedule: String,
        replaced: Vec<ClassId>,
    },

    ClassRescheduled {
        class_id: ClassId,
        trainer_id: TrainerId,
        schedule: String,
        replaced: Vec<ClassId>,
    },

    ClassRemoved {
        class_id: ClassId,
        cancelled_enrollments: usize,
    },

    EnrollmentCreated {
        enrollment_id: EnrollmentId,
        class_id: ClassId,
        member_id: MemberId,
        membership_id: MembershipId,
        session_date: NaiveDate,
        remaining_sessions: u32,
    },

    EnrollmentCancelled {
        enrollment_id: EnrollmentId,
        refunded: bool,
    },

    AttendanceMarked {
        enrollment_id: EnrollmentId,
        attendance: AttendanceStatus,
        refunded: bool,
        /// Set by the missed-session sweep rather than staff
        automatic: bool,
    },

    SweepCompleted {
        sweep: String,
        examined: usize,
        transitioned: usize,
        failed: usize,
    },

    CountersReconciled { repaired: usize },

    /// Client connected
    ClientConnected {
        client_id: String,
        role: String,
        uid: Option<u32>,
    },

    /// Client disconnected
    ClientDisconnected { client_id: String },
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: i64,

    /// Event timestamp
    pub timestamp: DateTime<Local>,

    /// Event type and details
    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self::at(event, gym_util::now())
    }

    pub fn at(event: AuditEventType, timestamp: DateTime<Local>) -> Self {
        Self {
            id: 0, // Will be set by store
            timestamp,
            event,
        }
    }

    /// Event name as stored in the `type` tag
    pub fn type_name(&self) -> String {
        serde_json::to_value(&self.event)
            .ok()
            .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(String::from))
            .unwrap_or_default()
    }

    pub fn to_record(&self) -> AuditRecord {
        AuditRecord {
            id: self.id,
            timestamp: self.timestamp,
            event_type: self.type_name(),
            details: serde_json::to_value(&self.event).unwrap_or(serde_json::Value::Null),
        }
    }
}
