//! Background maintenance: missed-session and membership-expiry sweeps,
//! and enrollment counter reconciliation.
//!
//! Sweeps pick their candidates from a read view, then move each record in
//! its own write transaction after re-checking it. A record another run got
//! to first is skipped, so overlapping runs never transition or refund the
//! same record twice.

use chrono::{DateTime, Local, NaiveDate};
use gym_api::{
    AttendanceStatus, CounterRepair, EnrollmentStatus, MembershipStatus, SweepKind, SweepReport,
};
use gym_store::{AuditEvent, AuditEventType};
use gym_util::{EnrollmentId, MemberId, MembershipId};
use tracing::{debug, info, warn};

use crate::engine::{Finished, enrollment_events};
use crate::{CoreEvent, CoreResult, GymEngine, Outcome, Transition};

impl GymEngine {
    /// Time out every scheduled enrollment whose session date is before
    /// today. Refunds follow the configured missed-session policy.
    pub fn run_missed_sweep(&self, now: DateTime<Local>) -> CoreResult<Outcome<SweepReport>> {
        let today = now.date_naive();
        let refund = self.policy.booking.missed_sweep.refunds();
        let candidates = self.store.read()?.scheduled_enrollments_before(today)?;

        let mut outcome = Outcome::new(SweepReport {
            examined: candidates.len(),
            ..Default::default()
        });

        for candidate in &candidates {
            match self.time_out(&candidate.enrollment_id, today, refund, now) {
                Ok(Some(finished)) => {
                    outcome.record.transitioned += 1;
                    if finished.refunded {
                        outcome.record.refunded += 1;
                    }
                    outcome
                        .events
                        .extend(enrollment_events(&finished.enrollment, &finished.class));
                }
                Ok(None) => {
                    outcome.record.skipped += 1;
                    debug!(enrollment_id = %candidate.enrollment_id, "Already closed, skipping");
                }
                Err(e) => {
                    outcome.record.failed += 1;
                    warn!(
                        enrollment_id = %candidate.enrollment_id,
                        error = %e,
                        "Failed to time out enrollment"
                    );
                }
            }
        }

        self.record_sweep(SweepKind::Missed, &mut outcome, now);
        Ok(outcome)
    }

    fn time_out(
        &self,
        enrollment_id: &EnrollmentId,
        today: NaiveDate,
        refund: bool,
        now: DateTime<Local>,
    ) -> CoreResult<Option<Finished>> {
        let tx = self.store.begin()?;

        let Some(current) = tx.get_enrollment(enrollment_id)? else {
            return Ok(None);
        };
        if current.attendance_status != AttendanceStatus::Scheduled
            || current.status != EnrollmentStatus::Active
            || current.session_date >= today
        {
            return Ok(None);
        }

        let finished =
            self.finish_enrollment(&*tx, enrollment_id, Transition::TimedOut { refund }, now)?;
        tx.commit()?;
        Ok(Some(finished))
    }

    /// Expire every active membership whose end date has been reached
    pub fn run_expiry_sweep(&self, now: DateTime<Local>) -> CoreResult<Outcome<SweepReport>> {
        let today = now.date_naive();
        let candidates = self.store.read()?.active_memberships_ending_by(today)?;

        let mut outcome = Outcome::new(SweepReport {
            examined: candidates.len(),
            ..Default::default()
        });

        for (member_id, membership) in &candidates {
            match self.expire_membership(member_id, &membership.membership_id, today, now) {
                Ok(true) => outcome.record.transitioned += 1,
                Ok(false) => outcome.record.skipped += 1,
                Err(e) => {
                    outcome.record.failed += 1;
                    warn!(
                        member_id = %member_id,
                        membership_id = %membership.membership_id,
                        error = %e,
                        "Failed to expire membership"
                    );
                }
            }
        }

        self.record_sweep(SweepKind::Expiry, &mut outcome, now);
        Ok(outcome)
    }

    fn expire_membership(
        &self,
        member_id: &MemberId,
        membership_id: &MembershipId,
        today: NaiveDate,
        now: DateTime<Local>,
    ) -> CoreResult<bool> {
        let tx = self.store.begin()?;

        let Some(mut membership) = tx.get_membership(membership_id)? else {
            return Ok(false);
        };
        if membership.status != MembershipStatus::Active || membership.end_date > today {
            return Ok(false);
        }

        membership.status = MembershipStatus::Expired;
        tx.update_membership(&membership)?;
        tx.append_audit(&AuditEvent::at(
            AuditEventType::MembershipExpired {
                member_id: member_id.clone(),
                membership_id: *membership_id,
            },
            now,
        ))?;
        tx.commit()?;

        debug!(member_id = %member_id, membership_id = %membership_id, "Membership expired");
        Ok(true)
    }

    fn record_sweep(
        &self,
        kind: SweepKind,
        outcome: &mut Outcome<SweepReport>,
        now: DateTime<Local>,
    ) {
        let report = outcome.record.clone();

        let audit = AuditEventType::SweepCompleted {
            sweep: kind.as_str().to_string(),
            examined: report.examined,
            transitioned: report.transitioned,
            failed: report.failed,
        };
        if let Err(e) = self.append_audit(audit, now) {
            warn!(sweep = kind.as_str(), error = %e, "Failed to audit sweep");
            outcome.warnings.push(format!("sweep was not audited: {}", e));
        }

        info!(
            sweep = kind.as_str(),
            examined = report.examined,
            transitioned = report.transitioned,
            skipped = report.skipped,
            failed = report.failed,
            refunded = report.refunded,
            "Sweep completed"
        );
        outcome.events.push(CoreEvent::SweepCompleted { kind, report });
    }

    /// Reset every class's `current_enrollment` to its number of active
    /// enrollments, returning the classes that were off.
    pub fn reconcile_counters(&self, now: DateTime<Local>) -> CoreResult<Vec<CounterRepair>> {
        let tx = self.store.begin()?;

        let mut repairs = Vec::new();
        for mut class in tx.list_classes(true)? {
            let actual = tx.count_active_enrollments(&class.class_id)?;
            if actual == class.current_enrollment {
                continue;
            }

            warn!(
                class_id = %class.class_id,
                recorded = class.current_enrollment,
                actual,
                "Enrollment counter out of step, repairing"
            );
            repairs.push(CounterRepair {
                class_id: class.class_id.clone(),
                recorded: class.current_enrollment,
                actual,
            });
            class.current_enrollment = actual;
            tx.update_class(&class)?;
        }

        tx.append_audit(&AuditEvent::at(
            AuditEventType::CountersReconciled {
                repaired: repairs.len(),
            },
            now,
        ))?;
        tx.commit()?;

        info!(repaired = repairs.len(), "Enrollment counters reconciled");
        Ok(repairs)
    }
}
