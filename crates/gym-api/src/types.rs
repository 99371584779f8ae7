//! Domain records shared by the store, the engine and clients

use chrono::{DateTime, Local, NaiveDate};
use gym_util::{
    ClassId, EnrollmentId, MemberId, MembershipId, Schedule, TrainerId, WallClock,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Error returned when a stored or supplied status string is not recognised
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Snake-case string enums that round-trip through the database as text.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum!(
    /// Standing of a member at the facility
    MemberStatus, "member status" {
        Active => "active",
        Inactive => "inactive",
        Suspended => "suspended",
    }
);

text_enum!(
    /// Membership plan. Fixed at creation.
    MembershipType, "membership type" {
        Monthly => "monthly",
        Combative => "combative",
    }
);

text_enum!(
    /// `Expired` is terminal and only ever set by the expiry sweep
    MembershipStatus, "membership status" {
        Active => "active",
        Inactive => "inactive",
        Suspended => "suspended",
        Expired => "expired",
    }
);

text_enum!(
    EnrollmentStatus, "enrollment status" {
        Active => "active",
        Cancelled => "cancelled",
        Completed => "completed",
    }
);

text_enum!(
    /// `Scheduled` is the only non-terminal state
    AttendanceStatus, "attendance status" {
        Scheduled => "scheduled",
        Attended => "attended",
        Missed => "missed",
        Cancelled => "cancelled",
    }
);

text_enum!(
    /// Outcome staff can record for a session
    AttendanceOutcome, "attendance outcome" {
        Attended => "attended",
        Missed => "missed",
    }
);

text_enum!(
    /// What to do with trainer conflicts when writing a class
    ConflictResolution, "conflict resolution" {
        Reject => "reject",
        ReplaceConflicting => "replace_conflicting",
    }
);

impl Default for ConflictResolution {
    fn default() -> Self {
        Self::Reject
    }
}

impl AttendanceStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AttendanceStatus::Scheduled)
    }
}

/// One purchased plan held by a member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub membership_id: MembershipId,
    #[serde(rename = "type")]
    pub kind: MembershipType,
    /// Months for monthly plans, purchased sessions for combative plans
    pub duration: u32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Always 0 for monthly plans
    pub remaining_sessions: u32,
    pub status: MembershipStatus,
}

impl Membership {
    pub fn is_combative(&self) -> bool {
        self.kind == MembershipType::Combative
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub member_id: MemberId,
    pub internal_id: Uuid,
    pub username: Option<String>,
    pub name: String,
    pub email: Option<String>,
    pub status: MemberStatus,
    /// In the order they were created or renewed
    pub memberships: Vec<Membership>,
    pub created_at: DateTime<Local>,
}

/// A class schedule as stored: structured when the descriptor parses,
/// kept verbatim otherwise.
///
/// Freeform schedules carry no day information and never take part in
/// conflict detection or occurrence checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ClassSchedule {
    Parsed(Schedule),
    Freeform { text: String },
}

impl ClassSchedule {
    pub fn from_descriptor(s: &str) -> Self {
        match s.parse::<Schedule>() {
            Ok(schedule) => ClassSchedule::Parsed(schedule),
            Err(_) => ClassSchedule::Freeform {
                text: s.trim().to_string(),
            },
        }
    }

    pub fn as_schedule(&self) -> Option<&Schedule> {
        match self {
            ClassSchedule::Parsed(schedule) => Some(schedule),
            ClassSchedule::Freeform { .. } => None,
        }
    }

    /// Canonical text form for parsed schedules, the original text otherwise
    pub fn descriptor(&self) -> String {
        match self {
            ClassSchedule::Parsed(schedule) => schedule.to_string(),
            ClassSchedule::Freeform { text } => text.clone(),
        }
    }
}

impl From<Schedule> for ClassSchedule {
    fn from(schedule: Schedule) -> Self {
        ClassSchedule::Parsed(schedule)
    }
}

impl From<String> for ClassSchedule {
    fn from(s: String) -> Self {
        ClassSchedule::from_descriptor(&s)
    }
}

impl From<ClassSchedule> for String {
    fn from(schedule: ClassSchedule) -> Self {
        schedule.descriptor()
    }
}

impl fmt::Display for ClassSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.descriptor())
    }
}

/// Roster line, derived from the enrollment ledger on read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub enrollment_id: EnrollmentId,
    pub member_id: MemberId,
    pub session_date: NaiveDate,
    pub status: EnrollmentStatus,
    pub attendance_status: AttendanceStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Class {
    pub class_id: ClassId,
    pub name: String,
    pub trainer_id: TrainerId,
    pub schedule: ClassSchedule,
    pub capacity: u32,
    /// Number of enrollments with status `active`
    pub current_enrollment: u32,
    #[serde(default)]
    pub enrolled_members: Vec<RosterEntry>,
    pub archived: bool,
    pub created_at: DateTime<Local>,
}

impl Class {
    pub fn is_full(&self) -> bool {
        self.current_enrollment >= self.capacity
    }
}

/// One booked session instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub enrollment_id: EnrollmentId,
    pub class_id: ClassId,
    pub member_id: MemberId,
    /// Membership the credit was debited from
    pub membership_id: MembershipId,
    pub session_date: NaiveDate,
    pub session_time: WallClock,
    pub status: EnrollmentStatus,
    pub attendance_status: AttendanceStatus,
    pub refund_processed: bool,
    pub created_at: DateTime<Local>,
    pub cancelled_at: Option<DateTime<Local>>,
    pub attendance_marked_at: Option<DateTime<Local>>,
}

impl Enrollment {
    pub fn roster_entry(&self) -> RosterEntry {
        RosterEntry {
            enrollment_id: self.enrollment_id,
            member_id: self.member_id.clone(),
            session_date: self.session_date,
            status: self.status,
            attendance_status: self.attendance_status,
        }
    }
}

/// Role for authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientRole {
    /// Front desk - members, bookings, attendance
    Staff,
    /// Facility admin - can also remove classes, force-replace conflicts
    /// and run maintenance jobs by hand
    Admin,
}

impl ClientRole {
    pub fn can_remove_classes(&self) -> bool {
        matches!(self, ClientRole::Admin)
    }

    pub fn can_replace_conflicts(&self) -> bool {
        matches!(self, ClientRole::Admin)
    }

    pub fn can_run_maintenance(&self) -> bool {
        matches!(self, ClientRole::Admin)
    }
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub live: bool,
    pub ready: bool,
    pub store_ok: bool,
    pub last_missed_sweep: Option<DateTime<Local>>,
    pub last_expiry_sweep: Option<DateTime<Local>>,
}
