//! Session ledger: the combative credit counter of each membership
//!
//! Invariant: `0 <= remaining_sessions <= duration` for every combative
//! membership. The store enforces the same bound with a CHECK constraint.

use chrono::NaiveDate;
use gym_api::{Member, MemberStatus, Membership, MembershipStatus};

use crate::CreditDenial;

/// Why a specific membership cannot be debited today, if it cannot
pub fn debit_denial(membership: &Membership, today: NaiveDate) -> Option<CreditDenial> {
    if !membership.is_combative() {
        return Some(CreditDenial::NoCombativeMembership);
    }
    if membership.status != MembershipStatus::Active {
        return Some(CreditDenial::MembershipNotActive {
            status: membership.status,
        });
    }
    if membership.end_date <= today {
        return Some(CreditDenial::MembershipLapsed {
            end_date: membership.end_date,
        });
    }
    if membership.remaining_sessions == 0 {
        return Some(CreditDenial::NoSessionsRemaining);
    }
    None
}

/// Pick the membership a booking is charged to: the first debitable
/// combative membership in the member's list.
///
/// When none qualifies, the denial describes the most recent combative
/// membership.
pub fn select_debitable(member: &Member, today: NaiveDate) -> Result<&Membership, CreditDenial> {
    if member.status != MemberStatus::Active {
        return Err(CreditDenial::MemberNotActive {
            status: member.status,
        });
    }

    let mut last_denial = CreditDenial::NoCombativeMembership;
    for membership in member.memberships.iter().filter(|m| m.is_combative()) {
        match debit_denial(membership, today) {
            None => return Ok(membership),
            Some(denial) => last_denial = denial,
        }
    }
    Err(last_denial)
}

/// Consume one session. Preconditions are re-checked here.
pub fn debit(membership: &mut Membership, today: NaiveDate) -> Result<(), CreditDenial> {
    if let Some(denial) = debit_denial(membership, today) {
        return Err(denial);
    }
    membership.remaining_sessions -= 1;
    Ok(())
}

/// Return one session, never exceeding the purchased duration.
///
/// Returns whether the balance changed.
pub fn credit(membership: &mut Membership) -> bool {
    if !membership.is_combative() || membership.remaining_sessions >= membership.duration {
        return false;
    }
    membership.remaining_sessions += 1;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use gym_api::MembershipType;
    use gym_util::{MemberId, MembershipId};
    use uuid::Uuid;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn membership(kind: MembershipType, duration: u32, remaining: u32) -> Membership {
        Membership {
            membership_id: MembershipId::new(),
            kind,
            duration,
            start_date: day(2024, 1, 1),
            end_date: day(2024, 2, 1),
            remaining_sessions: remaining,
            status: MembershipStatus::Active,
        }
    }

    fn member(memberships: Vec<Membership>) -> Member {
        Member {
            member_id: MemberId::from_sequence(1),
            internal_id: Uuid::new_v4(),
            username: None,
            name: "Test".into(),
            email: None,
            status: MemberStatus::Active,
            memberships,
            created_at: Local::now(),
        }
    }

    #[test]
    fn debit_consumes_one_session() {
        let mut m = membership(MembershipType::Combative, 10, 1);
        debit(&mut m, day(2024, 1, 15)).unwrap();
        assert_eq!(m.remaining_sessions, 0);
        assert_eq!(
            debit(&mut m, day(2024, 1, 15)),
            Err(CreditDenial::NoSessionsRemaining)
        );
        assert_eq!(m.remaining_sessions, 0);
    }

    #[test]
    fn debit_requires_end_date_after_today() {
        let mut m = membership(MembershipType::Combative, 10, 5);
        assert!(debit(&mut m, day(2024, 1, 31)).is_ok());
        assert_eq!(
            debit(&mut m, day(2024, 2, 1)),
            Err(CreditDenial::MembershipLapsed {
                end_date: day(2024, 2, 1)
            })
        );
    }

    #[test]
    fn debit_refuses_inactive_and_monthly() {
        let mut m = membership(MembershipType::Combative, 10, 5);
        m.status = MembershipStatus::Suspended;
        assert_eq!(
            debit(&mut m, day(2024, 1, 15)),
            Err(CreditDenial::MembershipNotActive {
                status: MembershipStatus::Suspended
            })
        );

        let mut monthly = membership(MembershipType::Monthly, 1, 0);
        assert_eq!(
            debit(&mut monthly, day(2024, 1, 15)),
            Err(CreditDenial::NoCombativeMembership)
        );
    }

    #[test]
    fn credit_is_capped_at_duration() {
        let mut m = membership(MembershipType::Combative, 2, 1);
        assert!(credit(&mut m));
        assert_eq!(m.remaining_sessions, 2);
        assert!(!credit(&mut m));
        assert_eq!(m.remaining_sessions, 2);
    }

    #[test]
    fn select_skips_unusable_memberships() {
        let mut spent = membership(MembershipType::Combative, 5, 0);
        spent.status = MembershipStatus::Inactive;
        let usable = membership(MembershipType::Combative, 8, 3);
        let m = member(vec![
            membership(MembershipType::Monthly, 1, 0),
            spent,
            usable.clone(),
        ]);

        let chosen = select_debitable(&m, day(2024, 1, 15)).unwrap();
        assert_eq!(chosen.membership_id, usable.membership_id);
    }

    #[test]
    fn select_reports_why_nothing_qualifies() {
        let m = member(vec![membership(MembershipType::Monthly, 1, 0)]);
        assert_eq!(
            select_debitable(&m, day(2024, 1, 15)),
            Err(CreditDenial::NoCombativeMembership)
        );

        let m = member(vec![membership(MembershipType::Combative, 5, 0)]);
        assert_eq!(
            select_debitable(&m, day(2024, 1, 15)),
            Err(CreditDenial::NoSessionsRemaining)
        );

        let mut m = member(vec![membership(MembershipType::Combative, 5, 5)]);
        m.status = MemberStatus::Suspended;
        assert_eq!(
            select_debitable(&m, day(2024, 1, 15)),
            Err(CreditDenial::MemberNotActive {
                status: MemberStatus::Suspended
            })
        );
    }
}
