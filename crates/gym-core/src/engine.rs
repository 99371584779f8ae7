//! Core scheduling engine
//!
//! Every mutating operation runs in a single store transaction: validation,
//! ledger changes, counter updates and the audit record either all commit or
//! all roll back. Trainer notifications go out after the commit.

use chrono::{DateTime, Local, NaiveDate};
use gym_api::{
    AttendanceOutcome, AttendanceStatus, AuditRecord, Class, ClassSchedule, ConflictResolution,
    Enrollment, EnrollmentStatus, Member, MemberStatus, Membership, MembershipRequest,
    MembershipStatus,
};
use gym_config::FacilityPolicy;
use gym_store::{AuditEvent, AuditEventType, Store, StoreError, StoreTx};
use gym_util::{ClassId, EnrollmentId, MemberId, Schedule, ScheduleError, TrainerId, WallClock};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    CoreError, CoreEvent, CoreResult, Notification, Notifier, Transition, apply_transition,
    find_conflicts, ledger, new_membership,
};

const MEMBER_SEQUENCE: &str = "member";
const CLASS_SEQUENCE: &str = "class";

/// Result of a committed operation
#[derive(Debug, Clone)]
pub struct Outcome<T> {
    pub record: T,
    /// Problems that did not undo the change (failed notifications,
    /// schedules kept without day information)
    pub warnings: Vec<String>,
    pub events: Vec<CoreEvent>,
}

impl<T> Outcome<T> {
    pub fn new(record: T) -> Self {
        Self {
            record,
            warnings: Vec::new(),
            events: Vec::new(),
        }
    }
}

/// Registration input
#[derive(Debug, Clone)]
pub struct NewMember {
    pub name: String,
    pub username: Option<String>,
    pub email: Option<String>,
    pub memberships: Vec<MembershipRequest>,
}

/// Class creation input
#[derive(Debug, Clone)]
pub struct NewClass {
    pub name: String,
    pub trainer_id: TrainerId,
    pub schedule: String,
    pub capacity: u32,
    pub resolution: ConflictResolution,
}

/// Booking input
#[derive(Debug, Clone)]
pub struct EnrollRequest {
    pub class_id: ClassId,
    /// Member id, internal id or username
    pub member: String,
    pub session_date: NaiveDate,
    /// Defaults to the class start time
    pub session_time: Option<WallClock>,
}

/// An enrollment moved to a terminal state inside a transaction
#[derive(Debug, Clone)]
pub(crate) struct Finished {
    pub enrollment: Enrollment,
    pub class: Class,
    pub refunded: bool,
}

/// A class archived inside a transaction, with the bookings it cancelled
#[derive(Debug, Clone)]
struct Archived {
    class: Class,
    cancelled: Vec<Enrollment>,
}

/// The core engine
pub struct GymEngine {
    pub(crate) policy: FacilityPolicy,
    pub(crate) store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
}

impl GymEngine {
    pub fn new(policy: FacilityPolicy, store: Arc<dyn Store>, notifier: Arc<dyn Notifier>) -> Self {
        info!(
            trainer_count = policy.trainers.len(),
            missed_sweep = ?policy.booking.missed_sweep,
            notifications = policy.notifications.enabled,
            "Core engine initialized"
        );

        let engine = Self {
            policy,
            store,
            notifier,
        };

        let loaded = AuditEventType::ConfigLoaded {
            trainer_count: engine.policy.trainers.len(),
        };
        if let Err(e) = engine.append_audit(loaded, gym_util::now()) {
            warn!(error = %e, "Failed to audit configuration load");
        }

        engine
    }

    pub fn policy(&self) -> &FacilityPolicy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn is_healthy(&self) -> bool {
        self.store.is_healthy()
    }

    // Members

    pub fn register_member(&self, request: NewMember, now: DateTime<Local>) -> CoreResult<Member> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(CoreError::Validation("member name cannot be empty".into()));
        }

        let username = non_blank(request.username);
        if let Some(username) = &username
            && (MemberId::parse(username).is_some() || Uuid::parse_str(username).is_ok())
        {
            return Err(CoreError::Validation(format!(
                "username '{}' is shaped like a member id",
                username
            )));
        }

        let email = non_blank(request.email);
        if let Some(email) = &email
            && !email.contains('@')
        {
            return Err(CoreError::Validation(format!(
                "'{}' is not an email address",
                email
            )));
        }

        let mut memberships: Vec<Membership> = Vec::with_capacity(request.memberships.len());
        for requested in &request.memberships {
            if memberships.iter().any(|m| m.kind == requested.kind) {
                return Err(CoreError::Validation(format!(
                    "only one {} membership can be registered at a time",
                    requested.kind
                )));
            }
            memberships.push(new_membership(requested)?);
        }

        let tx = self.store.begin()?;

        if let Some(username) = &username
            && tx.find_member(username)?.is_some()
        {
            return Err(CoreError::Validation(format!(
                "username '{}' is already taken",
                username
            )));
        }

        let member = Member {
            member_id: MemberId::from_sequence(tx.next_sequence(MEMBER_SEQUENCE)?),
            internal_id: Uuid::new_v4(),
            username,
            name: name.to_string(),
            email,
            status: MemberStatus::Active,
            memberships,
            created_at: now,
        };
        tx.insert_member(&member)?;
        tx.append_audit(&AuditEvent::at(
            AuditEventType::MemberRegistered {
                member_id: member.member_id.clone(),
                memberships: member.memberships.len(),
            },
            now,
        ))?;
        tx.commit()?;

        info!(
            member_id = %member.member_id,
            memberships = member.memberships.len(),
            "Member registered"
        );
        Ok(member)
    }

    /// Look a member up by member id, internal id or username
    pub fn get_member(&self, identifier: &str) -> CoreResult<Member> {
        self.store
            .read()?
            .find_member(identifier)?
            .ok_or_else(|| CoreError::not_found("member", identifier))
    }

    pub fn set_member_status(
        &self,
        identifier: &str,
        status: MemberStatus,
        now: DateTime<Local>,
    ) -> CoreResult<Member> {
        let tx = self.store.begin()?;
        let mut member = tx
            .find_member(identifier)?
            .ok_or_else(|| CoreError::not_found("member", identifier))?;

        if member.status == status {
            return Ok(member);
        }

        tx.update_member_status(&member.member_id, status)?;
        tx.append_audit(&AuditEvent::at(
            AuditEventType::MemberStatusChanged {
                member_id: member.member_id.clone(),
                status,
            },
            now,
        ))?;
        tx.commit()?;

        info!(
            member_id = %member.member_id,
            from = %member.status,
            to = %status,
            "Member status changed"
        );
        member.status = status;
        Ok(member)
    }

    /// Add a new membership, superseding any active one of the same type.
    ///
    /// Unused combative credit on a superseded membership is not carried over.
    pub fn renew_membership(
        &self,
        identifier: &str,
        request: &MembershipRequest,
        now: DateTime<Local>,
    ) -> CoreResult<Member> {
        let membership = new_membership(request)?;

        let tx = self.store.begin()?;
        let mut member = tx
            .find_member(identifier)?
            .ok_or_else(|| CoreError::not_found("member", identifier))?;

        let mut superseded = Vec::new();
        for existing in member
            .memberships
            .iter_mut()
            .filter(|m| m.kind == membership.kind && m.status == MembershipStatus::Active)
        {
            existing.status = MembershipStatus::Inactive;
            tx.update_membership(existing)?;
            superseded.push(existing.membership_id);
        }

        tx.insert_membership(&member.member_id, &membership)?;
        tx.append_audit(&AuditEvent::at(
            AuditEventType::MembershipRenewed {
                member_id: member.member_id.clone(),
                membership_id: membership.membership_id,
                kind: membership.kind,
                end_date: membership.end_date,
                superseded: superseded.clone(),
            },
            now,
        ))?;
        tx.commit()?;

        info!(
            member_id = %member.member_id,
            kind = %membership.kind,
            end_date = %membership.end_date,
            superseded = superseded.len(),
            "Membership renewed"
        );
        member.memberships.push(membership);
        Ok(member)
    }

    // Classes

    pub fn create_class(
        &self,
        request: NewClass,
        now: DateTime<Local>,
    ) -> CoreResult<Outcome<Class>> {
        let mut warnings = Vec::new();

        let name = request.name.trim();
        if name.is_empty() {
            return Err(CoreError::Validation("class name cannot be empty".into()));
        }
        if request.capacity == 0 {
            return Err(CoreError::Validation("capacity must be at least 1".into()));
        }
        self.check_trainer(&request.trainer_id)?;
        let schedule = parse_class_schedule(&request.schedule, &mut warnings)?;

        let tx = self.store.begin()?;
        let replaced = self.clear_conflicts(
            &*tx,
            &request.trainer_id,
            &schedule,
            None,
            request.resolution,
            now,
        )?;

        let class = Class {
            class_id: ClassId::from_sequence(tx.next_sequence(CLASS_SEQUENCE)?),
            name: name.to_string(),
            trainer_id: request.trainer_id,
            schedule,
            capacity: request.capacity,
            current_enrollment: 0,
            enrolled_members: Vec::new(),
            archived: false,
            created_at: now,
        };
        tx.insert_class(&class)?;
        tx.append_audit(&AuditEvent::at(
            AuditEventType::ClassCreated {
                class_id: class.class_id.clone(),
                trainer_id: class.trainer_id.clone(),
                schedule: class.schedule.descriptor(),
                replaced: replaced.iter().map(|a| a.class.class_id.clone()).collect(),
            },
            now,
        ))?;
        tx.commit()?;

        info!(
            class_id = %class.class_id,
            trainer_id = %class.trainer_id,
            schedule = %class.schedule,
            replaced = replaced.len(),
            "Class created"
        );

        let mut notifications = vec![Notification::TrainerAssigned {
            trainer_id: class.trainer_id.clone(),
            class_id: class.class_id.clone(),
            class_name: class.name.clone(),
            schedule: class.schedule.descriptor(),
        }];
        notifications.extend(replaced.iter().map(removal_notification));
        warnings.extend(self.send_notifications(&notifications));

        let mut events = vec![class_event(&class)];
        events.extend(replaced.iter().flat_map(removal_events));

        Ok(Outcome {
            record: class,
            warnings,
            events,
        })
    }

    /// Change a class's trainer and schedule together
    pub fn update_class_schedule(
        &self,
        class_id: &ClassId,
        trainer_id: &TrainerId,
        schedule: &str,
        resolution: ConflictResolution,
        now: DateTime<Local>,
    ) -> CoreResult<Outcome<Class>> {
        let mut warnings = Vec::new();
        self.check_trainer(trainer_id)?;
        let schedule = parse_class_schedule(schedule, &mut warnings)?;

        let tx = self.store.begin()?;
        let mut class = tx
            .get_class(class_id)?
            .ok_or_else(|| CoreError::not_found("class", class_id))?;
        if class.archived {
            return Err(CoreError::Validation(format!(
                "class {} has been removed",
                class_id
            )));
        }

        let replaced =
            self.clear_conflicts(&*tx, trainer_id, &schedule, Some(class_id), resolution, now)?;

        let previous_trainer = std::mem::replace(&mut class.trainer_id, trainer_id.clone());
        let schedule_changed = class.schedule != schedule;
        class.schedule = schedule;
        tx.update_class(&class)?;
        tx.append_audit(&AuditEvent::at(
            AuditEventType::ClassRescheduled {
                class_id: class.class_id.clone(),
                trainer_id: class.trainer_id.clone(),
                schedule: class.schedule.descriptor(),
                replaced: replaced.iter().map(|a| a.class.class_id.clone()).collect(),
            },
            now,
        ))?;
        tx.commit()?;

        info!(
            class_id = %class.class_id,
            trainer_id = %class.trainer_id,
            previous_trainer = %previous_trainer,
            schedule = %class.schedule,
            "Class rescheduled"
        );

        let mut notifications = Vec::new();
        if previous_trainer != class.trainer_id {
            notifications.push(Notification::TrainerAssigned {
                trainer_id: class.trainer_id.clone(),
                class_id: class.class_id.clone(),
                class_name: class.name.clone(),
                schedule: class.schedule.descriptor(),
            });
            notifications.push(Notification::TrainerUnassigned {
                trainer_id: previous_trainer,
                class_id: class.class_id.clone(),
                class_name: class.name.clone(),
            });
        } else if schedule_changed {
            notifications.push(Notification::ScheduleChanged {
                trainer_id: class.trainer_id.clone(),
                class_id: class.class_id.clone(),
                class_name: class.name.clone(),
                schedule: class.schedule.descriptor(),
            });
        }
        notifications.extend(replaced.iter().map(removal_notification));
        warnings.extend(self.send_notifications(&notifications));

        let mut events = vec![class_event(&class)];
        events.extend(replaced.iter().flat_map(removal_events));

        Ok(Outcome {
            record: class,
            warnings,
            events,
        })
    }

    /// Archive a class, cancelling and refunding its scheduled bookings
    pub fn remove_class(
        &self,
        class_id: &ClassId,
        now: DateTime<Local>,
    ) -> CoreResult<Outcome<Class>> {
        let tx = self.store.begin()?;
        let archived = self.archive_class(&*tx, class_id, now)?;
        tx.commit()?;

        let warnings = self.send_notifications(&[removal_notification(&archived)]);
        let events = removal_events(&archived);
        Ok(Outcome {
            record: archived.class,
            warnings,
            events,
        })
    }

    pub fn get_class(&self, class_id: &ClassId) -> CoreResult<Class> {
        self.store
            .read()?
            .get_class(class_id)?
            .ok_or_else(|| CoreError::not_found("class", class_id))
    }

    pub fn list_classes(
        &self,
        trainer_id: Option<&TrainerId>,
        include_archived: bool,
    ) -> CoreResult<Vec<Class>> {
        let classes = self.store.read()?.list_classes(include_archived)?;
        Ok(match trainer_id {
            Some(trainer_id) => classes
                .into_iter()
                .filter(|class| &class.trainer_id == trainer_id)
                .collect(),
            None => classes,
        })
    }

    // Enrollments

    /// Book a member into one session of a class, debiting one combative
    /// credit.
    pub fn enroll_member(
        &self,
        request: EnrollRequest,
        now: DateTime<Local>,
    ) -> CoreResult<Outcome<Enrollment>> {
        let today = now.date_naive();
        if request.session_date < today && !self.policy.booking.allow_past_dates {
            return Err(CoreError::Validation(format!(
                "session date {} is in the past",
                request.session_date
            )));
        }

        let tx = self.store.begin()?;

        let mut class = tx
            .get_class(&request.class_id)?
            .ok_or_else(|| CoreError::not_found("class", &request.class_id))?;
        if class.archived {
            return Err(CoreError::Validation(format!(
                "class {} has been removed",
                class.class_id
            )));
        }

        let session_time = match class.schedule.as_schedule() {
            Some(schedule) => {
                if !schedule.occurs_on(request.session_date) {
                    return Err(CoreError::Validation(format!(
                        "{} does not meet on {}",
                        class.class_id, request.session_date
                    )));
                }
                request.session_time.unwrap_or(schedule.time().start())
            }
            None => request.session_time.ok_or_else(|| {
                CoreError::Validation(format!(
                    "{} has no structured schedule; a session time is required",
                    class.class_id
                ))
            })?,
        };

        let member = tx
            .find_member(&request.member)?
            .ok_or_else(|| CoreError::not_found("member", &request.member))?;

        let duplicate = || CoreError::DuplicateBooking {
            member_id: member.member_id.clone(),
            class_id: class.class_id.clone(),
            session_date: request.session_date,
        };

        if tx
            .find_active_enrollment(&member.member_id, &class.class_id, request.session_date)?
            .is_some()
        {
            return Err(duplicate());
        }

        let active = tx.count_active_enrollments(&class.class_id)?;
        if active >= class.capacity {
            return Err(CoreError::Capacity {
                class_id: class.class_id.clone(),
                capacity: class.capacity,
            });
        }

        let mut membership = ledger::select_debitable(&member, today)?.clone();
        ledger::debit(&mut membership, today)?;
        tx.update_membership(&membership)?;

        let enrollment = Enrollment {
            enrollment_id: EnrollmentId::new(),
            class_id: class.class_id.clone(),
            member_id: member.member_id.clone(),
            membership_id: membership.membership_id,
            session_date: request.session_date,
            session_time,
            status: EnrollmentStatus::Active,
            attendance_status: AttendanceStatus::Scheduled,
            refund_processed: false,
            created_at: now,
            cancelled_at: None,
            attendance_marked_at: None,
        };
        match tx.insert_enrollment(&enrollment) {
            // Lost a race with a concurrent booking of the same session
            Err(StoreError::Constraint(_)) => return Err(duplicate()),
            other => other?,
        }

        class.current_enrollment = active + 1;
        tx.update_class(&class)?;
        tx.append_audit(&AuditEvent::at(
            AuditEventType::EnrollmentCreated {
                enrollment_id: enrollment.enrollment_id,
                class_id: class.class_id.clone(),
                member_id: member.member_id.clone(),
                membership_id: membership.membership_id,
                session_date: enrollment.session_date,
                remaining_sessions: membership.remaining_sessions,
            },
            now,
        ))?;
        tx.commit()?;

        info!(
            enrollment_id = %enrollment.enrollment_id,
            class_id = %class.class_id,
            member_id = %member.member_id,
            session_date = %enrollment.session_date,
            remaining_sessions = membership.remaining_sessions,
            "Member enrolled"
        );

        let events = enrollment_events(&enrollment, &class);
        Ok(Outcome {
            record: enrollment,
            warnings: Vec::new(),
            events,
        })
    }

    /// Cancel a scheduled booking and refund its credit
    pub fn cancel_enrollment(
        &self,
        enrollment_id: &EnrollmentId,
        now: DateTime<Local>,
    ) -> CoreResult<Outcome<Enrollment>> {
        self.transition(enrollment_id, Transition::Cancel, now)
    }

    /// Record attendance. A missed session refunds its credit, an attended
    /// one does not.
    pub fn mark_attendance(
        &self,
        enrollment_id: &EnrollmentId,
        outcome: AttendanceOutcome,
        now: DateTime<Local>,
    ) -> CoreResult<Outcome<Enrollment>> {
        self.transition(enrollment_id, outcome.into(), now)
    }

    pub fn get_enrollment(&self, enrollment_id: &EnrollmentId) -> CoreResult<Enrollment> {
        self.store
            .read()?
            .get_enrollment(enrollment_id)?
            .ok_or_else(|| CoreError::not_found("enrollment", enrollment_id))
    }

    fn transition(
        &self,
        enrollment_id: &EnrollmentId,
        transition: Transition,
        now: DateTime<Local>,
    ) -> CoreResult<Outcome<Enrollment>> {
        let tx = self.store.begin()?;
        let finished = self.finish_enrollment(&*tx, enrollment_id, transition, now)?;
        tx.commit()?;

        info!(
            enrollment_id = %enrollment_id,
            class_id = %finished.enrollment.class_id,
            attendance = %finished.enrollment.attendance_status,
            refunded = finished.refunded,
            "Enrollment closed"
        );

        let events = enrollment_events(&finished.enrollment, &finished.class);
        Ok(Outcome {
            record: finished.enrollment,
            warnings: Vec::new(),
            events,
        })
    }

    /// Move an enrollment out of `scheduled` and apply the ledger side of
    /// the transition: refund, class counter, audit record.
    pub(crate) fn finish_enrollment(
        &self,
        tx: &dyn StoreTx,
        enrollment_id: &EnrollmentId,
        transition: Transition,
        now: DateTime<Local>,
    ) -> CoreResult<Finished> {
        let mut enrollment = tx
            .get_enrollment(enrollment_id)?
            .ok_or_else(|| CoreError::not_found("enrollment", enrollment_id))?;
        let effect = apply_transition(&mut enrollment, transition, now)?;

        let mut refunded = false;
        if effect.refund {
            let mut membership = tx
                .get_membership(&enrollment.membership_id)?
                .ok_or_else(|| CoreError::not_found("membership", enrollment.membership_id))?;
            refunded = ledger::credit(&mut membership);
            if refunded {
                tx.update_membership(&membership)?;
            } else {
                warn!(
                    membership_id = %membership.membership_id,
                    enrollment_id = %enrollment_id,
                    "Refund skipped, membership already holds its full credit"
                );
            }
        }
        tx.update_enrollment(&enrollment)?;

        let mut class = tx
            .get_class(&enrollment.class_id)?
            .ok_or_else(|| CoreError::not_found("class", &enrollment.class_id))?;
        class.current_enrollment = class.current_enrollment.saturating_sub(1);
        tx.update_class(&class)?;

        let audit = match transition {
            Transition::Cancel => AuditEventType::EnrollmentCancelled {
                enrollment_id: *enrollment_id,
                refunded,
            },
            _ => AuditEventType::AttendanceMarked {
                enrollment_id: *enrollment_id,
                attendance: enrollment.attendance_status,
                refunded,
                automatic: matches!(transition, Transition::TimedOut { .. }),
            },
        };
        tx.append_audit(&AuditEvent::at(audit, now))?;

        Ok(Finished {
            enrollment,
            class,
            refunded,
        })
    }

    fn archive_class(
        &self,
        tx: &dyn StoreTx,
        class_id: &ClassId,
        now: DateTime<Local>,
    ) -> CoreResult<Archived> {
        let class = tx
            .get_class(class_id)?
            .ok_or_else(|| CoreError::not_found("class", class_id))?;
        if class.archived {
            return Err(CoreError::Validation(format!(
                "class {} has already been removed",
                class_id
            )));
        }

        let mut cancelled = Vec::new();
        for enrollment in tx.scheduled_enrollments_for_class(class_id)? {
            let finished =
                self.finish_enrollment(tx, &enrollment.enrollment_id, Transition::Cancel, now)?;
            cancelled.push(finished.enrollment);
        }

        let mut class = tx
            .get_class(class_id)?
            .ok_or_else(|| CoreError::not_found("class", class_id))?;
        class.archived = true;
        class.current_enrollment = tx.count_active_enrollments(class_id)?;
        tx.update_class(&class)?;
        tx.append_audit(&AuditEvent::at(
            AuditEventType::ClassRemoved {
                class_id: class_id.clone(),
                cancelled_enrollments: cancelled.len(),
            },
            now,
        ))?;

        info!(
            class_id = %class_id,
            trainer_id = %class.trainer_id,
            cancelled_enrollments = cancelled.len(),
            "Class removed"
        );
        Ok(Archived { class, cancelled })
    }

    /// Apply the conflict policy for a trainer's new or changed schedule.
    ///
    /// Returns the classes archived to make room, which is only ever
    /// non-empty under `ReplaceConflicting`.
    fn clear_conflicts(
        &self,
        tx: &dyn StoreTx,
        trainer_id: &TrainerId,
        schedule: &ClassSchedule,
        exclude: Option<&ClassId>,
        resolution: ConflictResolution,
        now: DateTime<Local>,
    ) -> CoreResult<Vec<Archived>> {
        let Some(candidate) = schedule.as_schedule() else {
            return Ok(Vec::new());
        };

        let classes = tx.classes_for_trainer(trainer_id)?;
        let conflicts = find_conflicts(&classes, trainer_id, candidate, exclude);

        match (resolution, conflicts.first()) {
            (_, None) => Ok(Vec::new()),
            (ConflictResolution::Reject, Some(first)) => {
                info!(
                    trainer_id = %trainer_id,
                    conflicting_class = %first.class_id,
                    schedule = %candidate,
                    "Schedule conflict rejected"
                );
                Err(CoreError::Conflict {
                    class_id: first.class_id.clone(),
                    class_name: first.name.clone(),
                })
            }
            (ConflictResolution::ReplaceConflicting, Some(_)) => {
                let mut archived = Vec::with_capacity(conflicts.len());
                for conflict in &conflicts {
                    archived.push(self.archive_class(tx, &conflict.class_id, now)?);
                }
                Ok(archived)
            }
        }
    }

    fn check_trainer(&self, trainer_id: &TrainerId) -> CoreResult<()> {
        if trainer_id.as_str().trim().is_empty() {
            return Err(CoreError::Validation("trainer id cannot be empty".into()));
        }
        if !self.policy.is_known_trainer(trainer_id) {
            return Err(CoreError::not_found("trainer", trainer_id));
        }
        Ok(())
    }

    /// Deliver notifications, turning each failure into a warning
    fn send_notifications(&self, notifications: &[Notification]) -> Vec<String> {
        if !self.policy.notifications.enabled {
            debug!(count = notifications.len(), "Notifications disabled, skipping");
            return Vec::new();
        }

        let mut warnings = Vec::new();
        for notification in notifications {
            if let Err(e) = self.notifier.notify(notification) {
                warn!(
                    trainer_id = %notification.trainer_id(),
                    error = %e,
                    "Trainer notification failed"
                );
                warnings.push(format!(
                    "trainer {} was not notified: {}",
                    notification.trainer_id(),
                    e
                ));
            }
        }
        warnings
    }

    // Audit

    /// Append a standalone audit record in its own transaction
    pub fn append_audit(&self, event: AuditEventType, now: DateTime<Local>) -> CoreResult<()> {
        let tx = self.store.begin()?;
        tx.append_audit(&AuditEvent::at(event, now))?;
        tx.commit()?;
        Ok(())
    }

    /// Newest audit records first
    pub fn recent_audits(&self, limit: usize) -> CoreResult<Vec<AuditRecord>> {
        Ok(self
            .store
            .recent_audits(limit)?
            .iter()
            .map(AuditEvent::to_record)
            .collect())
    }
}

/// Parse a class schedule descriptor.
///
/// Descriptors that name a time but no recognizable days are kept as
/// freeform text with a warning. Bad times, bad dates and empty ranges are
/// rejected.
fn parse_class_schedule(descriptor: &str, warnings: &mut Vec<String>) -> CoreResult<ClassSchedule> {
    let descriptor = descriptor.trim();
    if descriptor.is_empty() {
        return Err(CoreError::Validation("schedule cannot be empty".into()));
    }

    match descriptor.parse::<Schedule>() {
        Ok(schedule) => Ok(ClassSchedule::Parsed(schedule)),
        Err(e @ (ScheduleError::EmptyRange { .. } | ScheduleError::InvalidDate(_))) => Err(
            CoreError::Validation(format!("schedule '{}': {}", descriptor, e)),
        ),
        Err(ScheduleError::InvalidTime(token)) if looks_like_clock(&token) => {
            Err(CoreError::Validation(format!(
                "schedule '{}': invalid time '{}'",
                descriptor, token
            )))
        }
        Err(e) => {
            debug!(schedule = descriptor, error = %e, "Keeping schedule as freeform text");
            warnings.push(format!(
                "schedule '{}' was not understood ({}); \
                 it is kept as text and not checked for conflicts",
                descriptor, e
            ));
            Ok(ClassSchedule::Freeform {
                text: descriptor.to_string(),
            })
        }
    }
}

/// Digits, separators and an AM/PM marker only, e.g. `25:00` or `7.30pm`
fn looks_like_clock(token: &str) -> bool {
    token.chars().any(|c| c.is_ascii_digit())
        && token.chars().all(|c| {
            c.is_ascii_digit()
                || matches!(c.to_ascii_lowercase(), ':' | '.' | ' ' | 'a' | 'p' | 'm')
        })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn class_event(class: &Class) -> CoreEvent {
    CoreEvent::ClassChanged {
        class_id: class.class_id.clone(),
        trainer_id: class.trainer_id.clone(),
        current_enrollment: class.current_enrollment,
        capacity: class.capacity,
    }
}

pub(crate) fn enrollment_events(enrollment: &Enrollment, class: &Class) -> Vec<CoreEvent> {
    vec![
        CoreEvent::EnrollmentChanged {
            enrollment_id: enrollment.enrollment_id,
            class_id: enrollment.class_id.clone(),
            member_id: enrollment.member_id.clone(),
            session_date: enrollment.session_date,
            attendance_status: enrollment.attendance_status,
        },
        class_event(class),
    ]
}

fn removal_events(archived: &Archived) -> Vec<CoreEvent> {
    let mut events: Vec<CoreEvent> = archived
        .cancelled
        .iter()
        .map(|enrollment| CoreEvent::EnrollmentChanged {
            enrollment_id: enrollment.enrollment_id,
            class_id: enrollment.class_id.clone(),
            member_id: enrollment.member_id.clone(),
            session_date: enrollment.session_date,
            attendance_status: enrollment.attendance_status,
        })
        .collect();
    events.push(CoreEvent::ClassRemoved {
        class_id: archived.class.class_id.clone(),
        cancelled_enrollments: archived.cancelled.len(),
    });
    events
}

fn removal_notification(archived: &Archived) -> Notification {
    Notification::ClassRemoved {
        trainer_id: archived.class.trainer_id.clone(),
        class_id: archived.class.class_id.clone(),
        class_name: archived.class.name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Fixture, day, fixture, fixture_with};
    use crate::CreditDenial;
    use gym_api::MembershipType;
    use gym_config::Trainer;

    #[test]
    fn members_get_sequential_ids() {
        let f = fixture();
        let a = f.member("ana", 5);
        let b = f.member("ben", 5);
        assert_eq!(a.member_id.as_str(), "MEM-0001");
        assert_eq!(b.member_id.as_str(), "MEM-0002");
        assert_eq!(a.memberships[0].remaining_sessions, 5);
        assert_eq!(a.memberships[0].end_date, day(2024, 2, 1));
    }

    #[test]
    fn member_is_found_by_any_identifier() {
        let f = fixture();
        let member = f.member("ana", 5);

        for identifier in [
            member.member_id.to_string(),
            member.internal_id.to_string(),
            "ana".to_string(),
        ] {
            assert_eq!(f.engine.get_member(&identifier).unwrap().member_id, member.member_id);
        }
        assert!(matches!(
            f.engine.get_member("nobody"),
            Err(CoreError::NotFound { entity: "member", .. })
        ));
    }

    #[test]
    fn registration_rejects_bad_input() {
        let f = fixture();
        f.member("ana", 5);

        let base = NewMember {
            name: "Someone".into(),
            username: None,
            email: None,
            memberships: Vec::new(),
        };

        let taken = NewMember {
            username: Some("ana".into()),
            ..base.clone()
        };
        let id_shaped = NewMember {
            username: Some("MEM-0042".into()),
            ..base.clone()
        };
        let two_combative = NewMember {
            memberships: vec![Fixture::combative(5), Fixture::combative(3)],
            ..base.clone()
        };
        let nameless = NewMember {
            name: "  ".into(),
            ..base.clone()
        };

        for request in [taken, id_shaped, two_combative, nameless] {
            assert!(matches!(
                f.engine.register_member(request, f.now),
                Err(CoreError::Validation(_))
            ));
        }
        // Nothing half-registered
        assert!(f.engine.get_member("MEM-0002").is_err());
    }

    #[test]
    fn renewal_supersedes_active_membership_of_same_type() {
        let f = fixture();
        let member = f.member("ana", 5);
        let old = member.memberships[0].membership_id;

        let renewed = f
            .engine
            .renew_membership("ana", &Fixture::combative(8), f.now)
            .unwrap();
        assert_eq!(renewed.memberships.len(), 2);

        let stored = f.engine.get_member("ana").unwrap();
        let old = stored.memberships.iter().find(|m| m.membership_id == old).unwrap();
        assert_eq!(old.status, MembershipStatus::Inactive);
        assert_eq!(old.remaining_sessions, 5);
        assert_eq!(stored.memberships[1].remaining_sessions, 8);
        assert_eq!(stored.memberships[1].status, MembershipStatus::Active);
    }

    #[test]
    fn enrollment_debits_one_session() {
        let f = fixture();
        let member = f.member("ana", 10);
        let class = f.class("t-1", "Monday 18:00-19:00", 5);

        let outcome = f.book(&class, "ana", day(2024, 1, 15)).unwrap();
        let enrollment = outcome.record;
        assert_eq!(enrollment.attendance_status, AttendanceStatus::Scheduled);
        assert_eq!(enrollment.session_time.to_string(), "18:00");
        assert_eq!(enrollment.membership_id, member.memberships[0].membership_id);
        assert_eq!(f.remaining("ana"), 9);

        let class = f.engine.get_class(&class.class_id).unwrap();
        assert_eq!(class.current_enrollment, 1);
        assert_eq!(class.enrolled_members.len(), 1);
        assert_eq!(class.enrolled_members[0].member_id, member.member_id);

        assert!(outcome.events.iter().any(|e| matches!(
            e,
            CoreEvent::ClassChanged { current_enrollment: 1, .. }
        )));
    }

    #[test]
    fn enrollment_rejects_dates_the_class_does_not_meet() {
        let f = fixture();
        f.member("ana", 10);
        let class = f.class("t-1", "Monday 18:00-19:00", 5);

        // Tuesday
        let err = f.book(&class, "ana", day(2024, 1, 16)).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert_eq!(f.remaining("ana"), 10);
    }

    #[test]
    fn enrollment_rejects_past_dates_unless_allowed() {
        let f = fixture();
        f.member("ana", 10);
        let class = f.class("t-1", "Monday 18:00-19:00", 5);
        assert!(matches!(
            f.book(&class, "ana", day(2024, 1, 8)),
            Err(CoreError::Validation(_))
        ));

        let mut policy = FacilityPolicy::default();
        policy.booking.allow_past_dates = true;
        let f = fixture_with(policy);
        f.member("ana", 10);
        let class = f.class("t-1", "Monday 18:00-19:00", 5);
        assert!(f.book(&class, "ana", day(2024, 1, 8)).is_ok());
    }

    #[test]
    fn duplicate_booking_does_not_charge_twice() {
        let f = fixture();
        f.member("ana", 10);
        let class = f.class("t-1", "Monday 18:00-19:00", 5);

        f.book(&class, "ana", day(2024, 1, 15)).unwrap();
        let err = f.book(&class, "ana", day(2024, 1, 15)).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateBooking { .. }));
        assert_eq!(f.remaining("ana"), 9);

        // A different session of the same class is fine
        f.book(&class, "ana", day(2024, 1, 22)).unwrap();
        assert_eq!(f.remaining("ana"), 8);
    }

    #[test]
    fn full_class_rejects_without_debit() {
        let f = fixture();
        f.member("ana", 10);
        f.member("ben", 10);
        let class = f.class("t-1", "Monday 18:00-19:00", 1);

        f.book(&class, "ana", day(2024, 1, 15)).unwrap();
        let err = f.book(&class, "ben", day(2024, 1, 15)).unwrap_err();
        assert!(matches!(err, CoreError::Capacity { capacity: 1, .. }));
        assert_eq!(f.remaining("ben"), 10);
        assert_eq!(f.engine.get_class(&class.class_id).unwrap().current_enrollment, 1);
    }

    #[test]
    fn no_credit_leaves_everything_untouched() {
        let f = fixture();
        f.member("ana", 1);
        let class = f.class("t-1", "Monday,Wednesday 18:00-19:00", 5);

        f.book(&class, "ana", day(2024, 1, 15)).unwrap();
        let err = f.book(&class, "ana", day(2024, 1, 17)).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Credit(CreditDenial::NoSessionsRemaining)
        ));
        assert_eq!(f.remaining("ana"), 0);
        assert_eq!(f.engine.get_class(&class.class_id).unwrap().current_enrollment, 1);
    }

    #[test]
    fn monthly_only_member_cannot_book() {
        let f = fixture();
        f.engine
            .register_member(
                NewMember {
                    name: "Max".into(),
                    username: Some("max".into()),
                    email: None,
                    memberships: vec![MembershipRequest {
                        kind: MembershipType::Monthly,
                        duration: 3,
                        start_date: day(2024, 1, 1),
                    }],
                },
                f.now,
            )
            .unwrap();
        let class = f.class("t-1", "Monday 18:00-19:00", 5);

        assert!(matches!(
            f.book(&class, "max", day(2024, 1, 15)),
            Err(CoreError::Credit(CreditDenial::NoCombativeMembership))
        ));
    }

    #[test]
    fn suspended_member_cannot_book() {
        let f = fixture();
        f.member("ana", 10);
        let class = f.class("t-1", "Monday 18:00-19:00", 5);
        f.engine
            .set_member_status("ana", MemberStatus::Suspended, f.now)
            .unwrap();

        assert!(matches!(
            f.book(&class, "ana", day(2024, 1, 15)),
            Err(CoreError::Credit(CreditDenial::MemberNotActive { .. }))
        ));
    }

    #[test]
    fn cancel_refunds_once() {
        let f = fixture();
        f.member("ana", 10);
        let class = f.class("t-1", "Monday 18:00-19:00", 5);
        let enrollment = f.book(&class, "ana", day(2024, 1, 15)).unwrap().record;

        let cancelled = f
            .engine
            .cancel_enrollment(&enrollment.enrollment_id, f.now)
            .unwrap()
            .record;
        assert_eq!(cancelled.status, EnrollmentStatus::Cancelled);
        assert_eq!(cancelled.attendance_status, AttendanceStatus::Cancelled);
        assert!(cancelled.refund_processed);
        assert!(cancelled.cancelled_at.is_some());
        assert_eq!(f.remaining("ana"), 10);
        assert_eq!(f.engine.get_class(&class.class_id).unwrap().current_enrollment, 0);

        assert!(matches!(
            f.engine.cancel_enrollment(&enrollment.enrollment_id, f.now),
            Err(CoreError::AlreadyTerminal { .. })
        ));
        assert_eq!(f.remaining("ana"), 10);
    }

    #[test]
    fn attended_keeps_the_debit_and_missed_refunds() {
        let f = fixture();
        f.member("ana", 10);
        let class = f.class("t-1", "Monday,Wednesday 18:00-19:00", 5);
        let first = f.book(&class, "ana", day(2024, 1, 15)).unwrap().record;
        let second = f.book(&class, "ana", day(2024, 1, 17)).unwrap().record;
        assert_eq!(f.remaining("ana"), 8);

        let attended = f
            .engine
            .mark_attendance(&first.enrollment_id, AttendanceOutcome::Attended, f.now)
            .unwrap()
            .record;
        assert_eq!(attended.status, EnrollmentStatus::Completed);
        assert!(!attended.refund_processed);
        assert_eq!(f.remaining("ana"), 8);

        let missed = f
            .engine
            .mark_attendance(&second.enrollment_id, AttendanceOutcome::Missed, f.now)
            .unwrap()
            .record;
        assert_eq!(missed.attendance_status, AttendanceStatus::Missed);
        assert_eq!(f.remaining("ana"), 9);

        assert!(matches!(
            f.engine
                .mark_attendance(&first.enrollment_id, AttendanceOutcome::Missed, f.now),
            Err(CoreError::AlreadyTerminal { .. })
        ));
    }

    #[test]
    fn overlapping_schedule_is_rejected_by_default() {
        let f = fixture();
        let existing = f.class("t-1", "Monday,Wednesday 18:00-19:00", 5);

        let err = f
            .engine
            .create_class(
                NewClass {
                    name: "Kickboxing".into(),
                    trainer_id: TrainerId::new("t-1"),
                    schedule: "Wednesday 18:30-19:30".into(),
                    capacity: 5,
                    resolution: ConflictResolution::Reject,
                },
                f.now,
            )
            .unwrap_err();
        match err {
            CoreError::Conflict { class_id, .. } => assert_eq!(class_id, existing.class_id),
            other => panic!("expected conflict, got {:?}", other),
        }

        // Another trainer may use the slot
        f.class("t-2", "Wednesday 18:30-19:30", 5);
        assert_eq!(f.engine.list_classes(None, false).unwrap().len(), 2);
    }

    #[test]
    fn replace_conflicting_archives_and_refunds() {
        let f = fixture();
        f.member("ana", 10);
        let old = f.class("t-1", "Monday 18:00-19:00", 5);
        f.book(&old, "ana", day(2024, 1, 15)).unwrap();

        let outcome = f
            .engine
            .create_class(
                NewClass {
                    name: "Boxing".into(),
                    trainer_id: TrainerId::new("t-1"),
                    schedule: "Monday 18:30-20:00".into(),
                    capacity: 5,
                    resolution: ConflictResolution::ReplaceConflicting,
                },
                f.now,
            )
            .unwrap();

        let old = f.engine.get_class(&old.class_id).unwrap();
        assert!(old.archived);
        assert_eq!(old.current_enrollment, 0);
        assert_eq!(f.remaining("ana"), 10);
        assert_eq!(outcome.record.class_id.as_str(), "CLS-0002");
        assert!(f.notifier.sent().iter().any(|n| matches!(
            n,
            Notification::ClassRemoved { class_id, .. } if class_id == &old.class_id
        )));
    }

    #[test]
    fn rescheduling_skips_its_own_slot() {
        let f = fixture();
        let class = f.class("t-1", "Monday 18:00-19:00", 5);

        let outcome = f
            .engine
            .update_class_schedule(
                &class.class_id,
                &TrainerId::new("t-1"),
                "Monday 18:30-19:30",
                ConflictResolution::Reject,
                f.now,
            )
            .unwrap();
        assert_eq!(outcome.record.schedule.descriptor(), "Mon 18:30-19:30");
        assert!(matches!(
            f.notifier.sent().last(),
            Some(Notification::ScheduleChanged { .. })
        ));
    }

    #[test]
    fn reassignment_notifies_both_trainers() {
        let f = fixture();
        let class = f.class("t-1", "Monday 18:00-19:00", 5);

        f.engine
            .update_class_schedule(
                &class.class_id,
                &TrainerId::new("t-2"),
                "Monday 18:00-19:00",
                ConflictResolution::Reject,
                f.now,
            )
            .unwrap();

        let sent = f.notifier.sent();
        let tail: Vec<&str> = sent[sent.len() - 2..]
            .iter()
            .map(|n| n.trainer_id().as_str())
            .collect();
        assert_eq!(tail, vec!["t-2", "t-1"]);
        assert_eq!(
            f.engine
                .list_classes(Some(&TrainerId::new("t-2")), false)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn unparseable_days_are_kept_as_text() {
        let f = fixture();
        let outcome = f
            .engine
            .create_class(
                NewClass {
                    name: "Open mat".into(),
                    trainer_id: TrainerId::new("t-1"),
                    schedule: "Whenever 18:00-19:00".into(),
                    capacity: 5,
                    resolution: ConflictResolution::Reject,
                },
                f.now,
            )
            .unwrap();
        assert!(outcome.record.schedule.as_schedule().is_none());
        assert_eq!(outcome.warnings.len(), 1);

        let err = f
            .engine
            .create_class(
                NewClass {
                    name: "Backwards".into(),
                    trainer_id: TrainerId::new("t-1"),
                    schedule: "Monday 19:00-18:00".into(),
                    capacity: 5,
                    resolution: ConflictResolution::Reject,
                },
                f.now,
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn free_text_with_digits_is_kept_as_text() {
        let f = fixture();
        let create = |schedule: &str| {
            f.engine.create_class(
                NewClass {
                    name: "Open mat".into(),
                    trainer_id: TrainerId::new("t-1"),
                    schedule: schedule.into(),
                    capacity: 5,
                    resolution: ConflictResolution::Reject,
                },
                f.now,
            )
        };

        for text in [
            "1st floor studio, ask front desk",
            "6pm Mondays",
            "Tue 7pm-8pm (bring gloves)",
        ] {
            let outcome = create(text).unwrap();
            assert_eq!(
                outcome.record.schedule,
                ClassSchedule::Freeform { text: text.into() }
            );
            assert_eq!(outcome.warnings.len(), 1);
        }

        assert!(matches!(create("Mon 25:00-26:00"), Err(CoreError::Validation(_))));
        assert!(matches!(
            create("2024-02-30 18:00-19:00"),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn freeform_class_needs_a_session_time() {
        let f = fixture();
        f.member("ana", 10);
        let class = f
            .engine
            .create_class(
                NewClass {
                    name: "Open mat".into(),
                    trainer_id: TrainerId::new("t-1"),
                    schedule: "by appointment".into(),
                    capacity: 5,
                    resolution: ConflictResolution::Reject,
                },
                f.now,
            )
            .unwrap()
            .record;

        assert!(matches!(
            f.book(&class, "ana", day(2024, 1, 16)),
            Err(CoreError::Validation(_))
        ));

        let timed = EnrollRequest {
            class_id: class.class_id.clone(),
            member: "ana".into(),
            session_date: day(2024, 1, 16),
            session_time: WallClock::new(7, 30),
        };
        assert!(f.engine.enroll_member(timed, f.now).is_ok());
    }

    #[test]
    fn failed_notification_is_a_warning() {
        let f = fixture();
        f.notifier.set_failing(true);

        let outcome = f
            .engine
            .create_class(
                NewClass {
                    name: "Judo".into(),
                    trainer_id: TrainerId::new("t-1"),
                    schedule: "Friday 10:00-11:00".into(),
                    capacity: 5,
                    resolution: ConflictResolution::Reject,
                },
                f.now,
            )
            .unwrap();
        assert_eq!(outcome.warnings.len(), 1);
        assert!(f.engine.get_class(&outcome.record.class_id).is_ok());
    }

    #[test]
    fn disabled_notifications_are_not_sent() {
        let mut policy = FacilityPolicy::default();
        policy.notifications.enabled = false;
        let f = fixture_with(policy);
        f.class("t-1", "Friday 10:00-11:00", 5);
        assert!(f.notifier.sent().is_empty());
    }

    #[test]
    fn trainer_registry_is_enforced_when_configured() {
        let mut policy = FacilityPolicy::default();
        policy.trainers.push(Trainer {
            id: TrainerId::new("t-1"),
            name: "Tina".into(),
            email: None,
        });
        let f = fixture_with(policy);
        f.class("t-1", "Friday 10:00-11:00", 5);

        let err = f
            .engine
            .create_class(
                NewClass {
                    name: "Judo".into(),
                    trainer_id: TrainerId::new("t-9"),
                    schedule: "Friday 12:00-13:00".into(),
                    capacity: 5,
                    resolution: ConflictResolution::Reject,
                },
                f.now,
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { entity: "trainer", .. }));
    }

    #[test]
    fn removing_a_class_cancels_its_bookings() {
        let f = fixture();
        f.member("ana", 10);
        f.member("ben", 10);
        let class = f.class("t-1", "Monday 18:00-19:00", 5);
        f.book(&class, "ana", day(2024, 1, 15)).unwrap();
        f.book(&class, "ben", day(2024, 1, 22)).unwrap();

        let outcome = f.engine.remove_class(&class.class_id, f.now).unwrap();
        assert!(outcome.record.archived);
        assert_eq!(outcome.record.current_enrollment, 0);
        assert!(outcome.events.iter().any(|e| matches!(
            e,
            CoreEvent::ClassRemoved { cancelled_enrollments: 2, .. }
        )));
        assert_eq!(f.remaining("ana"), 10);
        assert_eq!(f.remaining("ben"), 10);

        assert!(f.engine.list_classes(None, false).unwrap().is_empty());
        assert_eq!(f.engine.list_classes(None, true).unwrap().len(), 1);
        assert!(matches!(
            f.book(&class, "ana", day(2024, 1, 29)),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn operations_are_audited() {
        let f = fixture();
        f.member("ana", 10);
        let class = f.class("t-1", "Monday 18:00-19:00", 5);
        f.book(&class, "ana", day(2024, 1, 15)).unwrap();

        let types: Vec<String> = f
            .engine
            .recent_audits(10)
            .unwrap()
            .into_iter()
            .map(|r| r.event_type)
            .collect();
        assert_eq!(
            types,
            vec![
                "enrollment_created",
                "class_created",
                "member_registered",
                "config_loaded"
            ]
        );
    }
}
