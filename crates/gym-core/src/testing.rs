//! Fixtures for engine and sweep tests

use chrono::{DateTime, Local, NaiveDate, TimeZone};
use gym_api::{Class, ConflictResolution, Enrollment, Member, MembershipRequest, MembershipType};
use gym_config::FacilityPolicy;
use gym_store::SqliteStore;
use gym_util::TrainerId;
use std::sync::Arc;

use crate::{CoreResult, EnrollRequest, GymEngine, NewClass, NewMember, Outcome, RecordingNotifier};

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Local> {
    Local.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

pub struct Fixture {
    pub engine: GymEngine,
    pub notifier: Arc<RecordingNotifier>,
    /// Monday 2024-01-15, 10:00
    pub now: DateTime<Local>,
}

pub fn fixture() -> Fixture {
    fixture_with(FacilityPolicy::default())
}

pub fn fixture_with(policy: FacilityPolicy) -> Fixture {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let notifier = Arc::new(RecordingNotifier::new());
    Fixture {
        engine: GymEngine::new(policy, store, notifier.clone()),
        notifier,
        now: at(2024, 1, 15, 10, 0),
    }
}

impl Fixture {
    /// Combative plan starting 2024-01-01, usable until 2024-02-01
    pub fn combative(sessions: u32) -> MembershipRequest {
        MembershipRequest {
            kind: MembershipType::Combative,
            duration: sessions,
            start_date: day(2024, 1, 1),
        }
    }

    pub fn member(&self, username: &str, sessions: u32) -> Member {
        self.engine
            .register_member(
                NewMember {
                    name: username.to_uppercase(),
                    username: Some(username.to_string()),
                    email: None,
                    memberships: vec![Self::combative(sessions)],
                },
                self.now,
            )
            .unwrap()
    }

    pub fn class(&self, trainer: &str, schedule: &str, capacity: u32) -> Class {
        self.engine
            .create_class(
                NewClass {
                    name: format!("{} with {}", schedule, trainer),
                    trainer_id: TrainerId::new(trainer),
                    schedule: schedule.to_string(),
                    capacity,
                    resolution: ConflictResolution::Reject,
                },
                self.now,
            )
            .unwrap()
            .record
    }

    pub fn book(
        &self,
        class: &Class,
        member: &str,
        date: NaiveDate,
    ) -> CoreResult<Outcome<Enrollment>> {
        self.engine.enroll_member(
            EnrollRequest {
                class_id: class.class_id.clone(),
                member: member.to_string(),
                session_date: date,
                session_time: None,
            },
            self.now,
        )
    }

    /// Sessions left on the member's first combative membership
    pub fn remaining(&self, member: &str) -> u32 {
        self.engine
            .get_member(member)
            .unwrap()
            .memberships
            .iter()
            .find(|m| m.is_combative())
            .map(|m| m.remaining_sessions)
            .unwrap()
    }
}
