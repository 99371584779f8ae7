//! Command dispatch: protocol commands to engine calls and back

use chrono::{DateTime, Local};
use gym_api::{
    ClientRole, Command, ErrorCode, ErrorInfo, EventPayload, ResponsePayload, SweepReport,
};
use gym_core::{
    CoreError, CoreEvent, CoreResult, EnrollRequest, GymEngine, NewClass, NewMember, Outcome,
};
use tracing::error;

/// Result of running one command against the engine
#[derive(Debug)]
pub struct Handled {
    pub result: Result<ResponsePayload, ErrorInfo>,
    pub events: Vec<CoreEvent>,
}

impl Handled {
    fn ok(payload: ResponsePayload) -> Self {
        Self {
            result: Ok(payload),
            events: Vec::new(),
        }
    }

    fn err(info: ErrorInfo) -> Self {
        Self {
            result: Err(info),
            events: Vec::new(),
        }
    }

    fn from_result<T>(result: CoreResult<T>, wrap: impl FnOnce(T) -> ResponsePayload) -> Self {
        match result {
            Ok(record) => Self::ok(wrap(record)),
            Err(e) => Self::err(error_info(&e)),
        }
    }

    fn from_outcome<T>(
        result: CoreResult<Outcome<T>>,
        wrap: impl FnOnce(T, Vec<String>) -> ResponsePayload,
    ) -> Self {
        match result {
            Ok(outcome) => Self {
                result: Ok(wrap(outcome.record, outcome.warnings)),
                events: outcome.events,
            },
            Err(e) => Self::err(error_info(&e)),
        }
    }
}

/// Run an engine command on behalf of a client with `role`.
///
/// Blocks on the store; call from a blocking context.
pub fn execute(
    engine: &GymEngine,
    role: ClientRole,
    command: Command,
    now: DateTime<Local>,
) -> Handled {
    if !command.is_permitted_for(role) {
        return Handled::err(ErrorInfo::new(
            ErrorCode::PermissionDenied,
            "Admin role required",
        ));
    }

    match command {
        Command::RegisterMember {
            name,
            username,
            email,
            memberships,
        } => Handled::from_result(
            engine.register_member(
                NewMember {
                    name,
                    username,
                    email,
                    memberships,
                },
                now,
            ),
            ResponsePayload::Member,
        ),

        Command::RenewMembership { member, membership } => Handled::from_result(
            engine.renew_membership(&member, &membership, now),
            ResponsePayload::Member,
        ),

        Command::GetMember { member } => {
            Handled::from_result(engine.get_member(&member), ResponsePayload::Member)
        }

        Command::SetMemberStatus { member, status } => Handled::from_result(
            engine.set_member_status(&member, status, now),
            ResponsePayload::Member,
        ),

        Command::CreateClass {
            name,
            trainer_id,
            schedule,
            capacity,
            resolution,
        } => Handled::from_outcome(
            engine.create_class(
                NewClass {
                    name,
                    trainer_id,
                    schedule,
                    capacity,
                    resolution,
                },
                now,
            ),
            class_payload,
        ),

        Command::UpdateClassSchedule {
            class_id,
            trainer_id,
            schedule,
            resolution,
        } => Handled::from_outcome(
            engine.update_class_schedule(&class_id, &trainer_id, &schedule, resolution, now),
            class_payload,
        ),

        Command::RemoveClass { class_id } => {
            Handled::from_outcome(engine.remove_class(&class_id, now), class_payload)
        }

        Command::GetClass { class_id } => {
            Handled::from_result(engine.get_class(&class_id), |class| {
                class_payload(class, Vec::new())
            })
        }

        Command::ListClasses {
            trainer_id,
            include_archived,
        } => Handled::from_result(
            engine.list_classes(trainer_id.as_ref(), include_archived),
            |classes| ResponsePayload::Classes { classes },
        ),

        Command::EnrollMember {
            class_id,
            member,
            session_date,
            session_time,
        } => Handled::from_outcome(
            engine.enroll_member(
                EnrollRequest {
                    class_id,
                    member,
                    session_date,
                    session_time,
                },
                now,
            ),
            |enrollment, _| ResponsePayload::Enrollment(enrollment),
        ),

        Command::CancelEnrollment { enrollment_id } => Handled::from_outcome(
            engine.cancel_enrollment(&enrollment_id, now),
            |enrollment, _| ResponsePayload::Enrollment(enrollment),
        ),

        Command::MarkAttendance {
            enrollment_id,
            outcome,
        } => Handled::from_outcome(
            engine.mark_attendance(&enrollment_id, outcome, now),
            |enrollment, _| ResponsePayload::Enrollment(enrollment),
        ),

        Command::GetEnrollment { enrollment_id } => Handled::from_result(
            engine.get_enrollment(&enrollment_id),
            ResponsePayload::Enrollment,
        ),

        Command::RunMissedSweep => {
            Handled::from_outcome(engine.run_missed_sweep(now), sweep_payload)
        }

        Command::RunExpirySweep => {
            Handled::from_outcome(engine.run_expiry_sweep(now), sweep_payload)
        }

        Command::ReconcileCounters => {
            Handled::from_result(engine.reconcile_counters(now), |repairs| {
                ResponsePayload::Reconciled { repairs }
            })
        }

        Command::GetAuditLog { limit } => {
            Handled::from_result(engine.recent_audits(limit), |events| {
                ResponsePayload::AuditLog { events }
            })
        }

        Command::Ping => Handled::ok(ResponsePayload::Pong),

        Command::SubscribeEvents | Command::UnsubscribeEvents | Command::GetHealth => {
            Handled::err(ErrorInfo::new(
                ErrorCode::InternalError,
                "Connection command reached the engine",
            ))
        }
    }
}

fn class_payload(class: gym_api::Class, warnings: Vec<String>) -> ResponsePayload {
    ResponsePayload::Class { class, warnings }
}

fn sweep_payload(report: SweepReport, warnings: Vec<String>) -> ResponsePayload {
    ResponsePayload::SweepCompleted { report, warnings }
}

/// Protocol error for an engine failure
pub fn error_info(err: &CoreError) -> ErrorInfo {
    let code = match err {
        CoreError::Validation(_) => ErrorCode::Validation,
        CoreError::NotFound { .. } => ErrorCode::NotFound,
        CoreError::Conflict { class_id, .. } => {
            return ErrorInfo::new(ErrorCode::ScheduleConflict, err.to_string())
                .with_conflicting_class(class_id.clone());
        }
        CoreError::Capacity { .. } => ErrorCode::ClassFull,
        CoreError::Credit(_) => ErrorCode::NoCredit,
        CoreError::DuplicateBooking { .. } => ErrorCode::DuplicateBooking,
        CoreError::AlreadyTerminal { .. } => ErrorCode::AlreadyTerminal,
        CoreError::Concurrency => ErrorCode::Busy,
        CoreError::Store(e) => {
            error!(error = %e, "Store failure while handling command");
            return ErrorInfo::new(ErrorCode::InternalError, "Internal store error");
        }
    };
    ErrorInfo::new(code, err.to_string())
}

/// Client-facing form of an engine event
pub fn event_payload(event: CoreEvent) -> EventPayload {
    match event {
        CoreEvent::ClassChanged {
            class_id,
            trainer_id,
            current_enrollment,
            capacity,
        } => EventPayload::ClassChanged {
            class_id,
            trainer_id,
            current_enrollment,
            capacity,
        },
        CoreEvent::ClassRemoved {
            class_id,
            cancelled_enrollments,
        } => EventPayload::ClassRemoved {
            class_id,
            cancelled_enrollments,
        },
        CoreEvent::EnrollmentChanged {
            enrollment_id,
            class_id,
            member_id,
            session_date,
            attendance_status,
        } => EventPayload::EnrollmentChanged {
            enrollment_id,
            class_id,
            member_id,
            session_date,
            attendance_status,
        },
        CoreEvent::SweepCompleted { kind, report } => EventPayload::SweepCompleted { kind, report },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use gym_api::{ConflictResolution, MembershipRequest, MembershipType};
    use gym_config::FacilityPolicy;
    use gym_core::LogNotifier;
    use gym_store::{SqliteStore, StoreError};
    use gym_util::{ClassId, TrainerId};
    use std::sync::Arc;

    fn engine() -> GymEngine {
        GymEngine::new(
            FacilityPolicy::default(),
            Arc::new(SqliteStore::in_memory().unwrap()),
            Arc::new(LogNotifier),
        )
    }

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap()
    }

    fn create(schedule: &str, resolution: ConflictResolution) -> Command {
        Command::CreateClass {
            name: "Boxing".into(),
            trainer_id: TrainerId::new("t-1"),
            schedule: schedule.into(),
            capacity: 10,
            resolution,
        }
    }

    #[test]
    fn staff_cannot_run_admin_commands() {
        let engine = engine();
        let handled = execute(&engine, ClientRole::Staff, Command::RunMissedSweep, now());
        assert_eq!(handled.result.unwrap_err().code, ErrorCode::PermissionDenied);

        let handled = execute(
            &engine,
            ClientRole::Staff,
            create("Mon 18:00-19:00", ConflictResolution::ReplaceConflicting),
            now(),
        );
        assert_eq!(handled.result.unwrap_err().code, ErrorCode::PermissionDenied);

        let handled = execute(&engine, ClientRole::Admin, Command::RunMissedSweep, now());
        assert!(matches!(
            handled.result,
            Ok(ResponsePayload::SweepCompleted { .. })
        ));
    }

    #[test]
    fn conflict_reports_the_existing_class() {
        let engine = engine();
        let first = execute(
            &engine,
            ClientRole::Staff,
            create("Mon 18:00-19:00", ConflictResolution::Reject),
            now(),
        );
        assert!(first.result.is_ok());
        assert!(!first.events.is_empty());

        let second = execute(
            &engine,
            ClientRole::Staff,
            create("Mon 18:30-19:30", ConflictResolution::Reject),
            now(),
        );
        let err = second.result.unwrap_err();
        assert_eq!(err.code, ErrorCode::ScheduleConflict);
        assert_eq!(err.conflicting_class, Some(ClassId::from_sequence(1)));
        assert!(second.events.is_empty());
    }

    #[test]
    fn booking_flows_through_dispatch() {
        let engine = engine();
        execute(
            &engine,
            ClientRole::Staff,
            Command::RegisterMember {
                name: "Ana".into(),
                username: Some("ana".into()),
                email: None,
                memberships: vec![MembershipRequest {
                    kind: MembershipType::Combative,
                    duration: 1,
                    start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                }],
            },
            now(),
        )
        .result
        .unwrap();
        execute(
            &engine,
            ClientRole::Staff,
            create("Mon,Wed 18:00-19:00", ConflictResolution::Reject),
            now(),
        )
        .result
        .unwrap();

        let enroll = |day: u32| Command::EnrollMember {
            class_id: ClassId::from_sequence(1),
            member: "ana".into(),
            session_date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            session_time: None,
        };

        let booked = execute(&engine, ClientRole::Staff, enroll(15), now());
        assert!(matches!(booked.result, Ok(ResponsePayload::Enrollment(_))));

        let denied = execute(&engine, ClientRole::Staff, enroll(17), now());
        assert_eq!(denied.result.unwrap_err().code, ErrorCode::NoCredit);

        let duplicate = execute(&engine, ClientRole::Staff, enroll(15), now());
        assert_eq!(duplicate.result.unwrap_err().code, ErrorCode::DuplicateBooking);
    }

    #[test]
    fn audit_log_is_admin_only() {
        let engine = engine();
        execute(
            &engine,
            ClientRole::Staff,
            create("Tue 18:00-19:00", ConflictResolution::Reject),
            now(),
        )
        .result
        .unwrap();

        let audit_log = || Command::GetAuditLog { limit: 10 };
        let denied = execute(&engine, ClientRole::Staff, audit_log(), now());
        assert_eq!(denied.result.unwrap_err().code, ErrorCode::PermissionDenied);

        let handled = execute(&engine, ClientRole::Admin, audit_log(), now());
        match handled.result {
            Ok(ResponsePayload::AuditLog { events }) => assert!(!events.is_empty()),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn sweep_warnings_reach_the_client() {
        let mut outcome = Outcome::new(SweepReport {
            examined: 2,
            transitioned: 2,
            ..SweepReport::default()
        });
        outcome.warnings.push("sweep was not audited".into());

        let handled = Handled::from_outcome(Ok(outcome), sweep_payload);
        match handled.result {
            Ok(ResponsePayload::SweepCompleted { report, warnings }) => {
                assert_eq!(report.transitioned, 2);
                assert_eq!(warnings, vec!["sweep was not audited".to_string()]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn busy_store_is_retryable_for_clients() {
        let info = error_info(&CoreError::from(StoreError::Busy));
        assert_eq!(info.code, ErrorCode::Busy);
        assert!(info.retryable);

        let info = error_info(&CoreError::from(StoreError::Database("disk I/O".into())));
        assert_eq!(info.code, ErrorCode::InternalError);
        assert!(!info.retryable);
    }
}
