//! Store trait definitions

use chrono::NaiveDate;
use gym_api::{Class, Enrollment, Member, MemberStatus, Membership};
use gym_util::{ClassId, EnrollmentId, MemberId, MembershipId, TrainerId};

use crate::{AuditEvent, StoreResult};

/// Main store trait
pub trait Store: Send + Sync {
    /// Start a write transaction. Fails with `StoreError::Busy` if the
    /// write lock cannot be taken within the configured timeout.
    fn begin(&self) -> StoreResult<Box<dyn StoreTx + '_>>;

    /// Start a read-only view
    fn read(&self) -> StoreResult<Box<dyn StoreTx + '_>>;

    /// Get recent audit events, newest first
    fn recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}

/// A unit of work against the store. Dropping it without calling
/// [`commit`](StoreTx::commit) rolls back every write made through it.
pub trait StoreTx {
    /// Next value of a named counter, starting at 1
    fn next_sequence(&self, name: &str) -> StoreResult<u64>;

    // Members

    /// Insert a member together with its memberships
    fn insert_member(&self, member: &Member) -> StoreResult<()>;

    fn update_member_status(&self, member_id: &MemberId, status: MemberStatus)
    -> StoreResult<()>;

    fn get_member(&self, member_id: &MemberId) -> StoreResult<Option<Member>>;

    /// Look a member up by `MEM-` id, internal UUID or username
    fn find_member(&self, identifier: &str) -> StoreResult<Option<Member>>;

    // Memberships

    /// Append a membership to the end of a member's list
    fn insert_membership(&self, member_id: &MemberId, membership: &Membership)
    -> StoreResult<()>;

    /// Persist `remaining_sessions` and `status`
    fn update_membership(&self, membership: &Membership) -> StoreResult<()>;

    fn get_membership(&self, membership_id: &MembershipId) -> StoreResult<Option<Membership>>;

    /// Active memberships with `end_date <= date`, with their owners
    fn active_memberships_ending_by(
        &self,
        date: NaiveDate,
    ) -> StoreResult<Vec<(MemberId, Membership)>>;

    // Classes

    fn insert_class(&self, class: &Class) -> StoreResult<()>;

    /// Persist every class field except the roster
    fn update_class(&self, class: &Class) -> StoreResult<()>;

    /// Class with its roster projection
    fn get_class(&self, class_id: &ClassId) -> StoreResult<Option<Class>>;

    /// All classes in creation order
    fn list_classes(&self, include_archived: bool) -> StoreResult<Vec<Class>>;

    /// A trainer's non-archived classes in creation order
    fn classes_for_trainer(&self, trainer_id: &TrainerId) -> StoreResult<Vec<Class>>;

    // Enrollments

    /// Number of enrollments with status `active`
    fn count_active_enrollments(&self, class_id: &ClassId) -> StoreResult<u32>;

    /// Fails with `StoreError::Constraint` if an active enrollment already
    /// exists for the same member, class and date.
    fn insert_enrollment(&self, enrollment: &Enrollment) -> StoreResult<()>;

    /// Persist status, attendance, refund flag and timestamps
    fn update_enrollment(&self, enrollment: &Enrollment) -> StoreResult<()>;

    fn get_enrollment(&self, enrollment_id: &EnrollmentId) -> StoreResult<Option<Enrollment>>;

    fn find_active_enrollment(
        &self,
        member_id: &MemberId,
        class_id: &ClassId,
        session_date: NaiveDate,
    ) -> StoreResult<Option<Enrollment>>;

    /// Scheduled, active enrollments with `session_date < date`
    fn scheduled_enrollments_before(&self, date: NaiveDate) -> StoreResult<Vec<Enrollment>>;

    fn scheduled_enrollments_for_class(&self, class_id: &ClassId)
    -> StoreResult<Vec<Enrollment>>;

    // Audit log

    /// Append an audit event, returning its id
    fn append_audit(&self, event: &AuditEvent) -> StoreResult<i64>;

    /// Make every write in this transaction durable
    fn commit(self: Box<Self>) -> StoreResult<()>;
}
