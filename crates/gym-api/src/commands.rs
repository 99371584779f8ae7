//! Command types for the gymd protocol

use chrono::{DateTime, Local, NaiveDate};
use gym_util::{ClassId, ClientId, EnrollmentId, TrainerId, WallClock};
use serde::{Deserialize, Serialize};

use crate::{
    API_VERSION, AttendanceOutcome, Class, ClientRole, ConflictResolution, Enrollment,
    HealthStatus, Member, MemberStatus, MembershipType,
};

/// Request wrapper with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Request ID for correlation
    pub request_id: u64,
    /// API version
    pub api_version: u32,
    /// The command
    pub command: Command,
}

impl Request {
    pub fn new(request_id: u64, command: Command) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            command,
        }
    }
}

/// Response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Corresponding request ID
    pub request_id: u64,
    /// API version
    pub api_version: u32,
    /// Response payload or error
    pub result: ResponseResult,
}

impl Response {
    pub fn success(request_id: u64, payload: ResponsePayload) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Ok(payload),
        }
    }

    pub fn error(request_id: u64, error: ErrorInfo) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Err(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseResult {
    Ok(ResponsePayload),
    Err(ErrorInfo),
}

/// Error information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
    /// The same request may succeed if sent again
    #[serde(default)]
    pub retryable: bool,
    /// Set for schedule conflicts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflicting_class: Option<ClassId>,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retryable: matches!(code, ErrorCode::Busy | ErrorCode::RateLimited),
            conflicting_class: None,
        }
    }

    pub fn with_conflicting_class(mut self, class_id: ClassId) -> Self {
        self.conflicting_class = Some(class_id);
        self
    }
}

/// Error codes for the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    Validation,
    NotFound,
    ScheduleConflict,
    ClassFull,
    NoCredit,
    DuplicateBooking,
    AlreadyTerminal,
    /// Transaction could not be acquired in time
    Busy,
    PermissionDenied,
    RateLimited,
    InternalError,
}

/// Membership requested at registration or renewal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipRequest {
    #[serde(rename = "type")]
    pub kind: MembershipType,
    pub duration: u32,
    pub start_date: NaiveDate,
}

/// All possible commands from clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Register a new member with their initial memberships
    RegisterMember {
        name: String,
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        email: Option<String>,
        #[serde(default)]
        memberships: Vec<MembershipRequest>,
    },

    /// Add a membership, superseding an active one of the same type
    RenewMembership {
        /// `MEM-` id, internal id or username
        member: String,
        membership: MembershipRequest,
    },

    GetMember { member: String },

    SetMemberStatus { member: String, status: MemberStatus },

    CreateClass {
        name: String,
        trainer_id: TrainerId,
        schedule: String,
        capacity: u32,
        #[serde(default)]
        resolution: ConflictResolution,
    },

    /// Reassign and/or reschedule a class
    UpdateClassSchedule {
        class_id: ClassId,
        trainer_id: TrainerId,
        schedule: String,
        #[serde(default)]
        resolution: ConflictResolution,
    },

    /// Archive a class and cancel its scheduled sessions (admin only)
    RemoveClass { class_id: ClassId },

    GetClass { class_id: ClassId },

    ListClasses {
        #[serde(default)]
        trainer_id: Option<TrainerId>,
        #[serde(default)]
        include_archived: bool,
    },

    /// Book one session of a class
    EnrollMember {
        class_id: ClassId,
        member: String,
        session_date: NaiveDate,
        /// Defaults to the class start time
        #[serde(default)]
        session_time: Option<WallClock>,
    },

    CancelEnrollment { enrollment_id: EnrollmentId },

    MarkAttendance {
        enrollment_id: EnrollmentId,
        outcome: AttendanceOutcome,
    },

    GetEnrollment { enrollment_id: EnrollmentId },

    // Maintenance commands (admin only)

    RunMissedSweep,

    RunExpirySweep,

    ReconcileCounters,

    GetAuditLog {
        #[serde(default = "default_audit_limit")]
        limit: usize,
    },

    /// Subscribe to events (returns immediately, events stream separately)
    SubscribeEvents,

    /// Unsubscribe from events
    UnsubscribeEvents,

    /// Get health status
    GetHealth,

    /// Ping for keepalive
    Ping,
}

fn default_audit_limit() -> usize {
    50
}

impl Command {
    /// Commands reserved for the admin role
    pub fn requires_admin(&self) -> bool {
        match self {
            Command::RemoveClass { .. }
            | Command::RunMissedSweep
            | Command::RunExpirySweep
            | Command::ReconcileCounters
            | Command::GetAuditLog { .. } => true,
            Command::CreateClass { resolution, .. }
            | Command::UpdateClassSchedule { resolution, .. } => {
                *resolution == ConflictResolution::ReplaceConflicting
            }
            _ => false,
        }
    }

    pub fn is_permitted_for(&self, role: ClientRole) -> bool {
        !self.requires_admin() || role == ClientRole::Admin
    }
}

/// Totals reported by a sweep run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Candidates selected
    pub examined: usize,
    /// Records this run moved to a new state
    pub transitioned: usize,
    /// Candidates already handled by a concurrent run
    pub skipped: usize,
    /// Records whose transaction failed
    pub failed: usize,
    /// Credits returned to memberships
    pub refunded: usize,
}

/// A class whose enrollment counter was out of step with the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterRepair {
    pub class_id: ClassId,
    pub recorded: u32,
    pub actual: u32,
}

/// Audit log line for clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    pub timestamp: DateTime<Local>,
    pub event_type: String,
    pub details: serde_json::Value,
}

/// Response payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsePayload {
    Member(Member),
    Class {
        class: Class,
        /// Non-fatal issues such as failed trainer notifications
        #[serde(default)]
        warnings: Vec<String>,
    },
    Classes {
        classes: Vec<Class>,
    },
    Enrollment(Enrollment),
    SweepCompleted {
        report: SweepReport,
        warnings: Vec<String>,
    },
    Reconciled {
        repairs: Vec<CounterRepair>,
    },
    AuditLog {
        events: Vec<AuditRecord>,
    },
    Subscribed {
        client_id: ClientId,
    },
    Unsubscribed,
    Health(HealthStatus),
    Pong,
}

/// Client connection info (set by IPC layer)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub client_id: ClientId,
    pub role: ClientRole,
    /// Unix UID if available
    pub uid: Option<u32>,
}

impl ClientInfo {
    pub fn new(role: ClientRole) -> Self {
        Self {
            client_id: ClientId::new(),
            role,
            uid: None,
        }
    }

    pub fn with_uid(mut self, uid: u32) -> Self {
        self.uid = Some(uid);
        self
    }
}
