//! Membership lifecycle: derived end dates and initial credit

use chrono::{Months, NaiveDate};
use gym_api::{Membership, MembershipRequest, MembershipStatus, MembershipType};
use gym_util::MembershipId;

use crate::{CoreError, CoreResult};

/// Combative credits are always usable for one month, however many were bought.
pub const COMBATIVE_WINDOW_MONTHS: u32 = 1;

/// End date for a plan starting on `start_date`.
///
/// Month arithmetic clamps to the last day of shorter months
/// (Jan 31 + 1 month = Feb 29 in a leap year).
pub fn membership_end_date(
    kind: MembershipType,
    duration: u32,
    start_date: NaiveDate,
) -> CoreResult<NaiveDate> {
    let months = match kind {
        MembershipType::Monthly => duration,
        MembershipType::Combative => COMBATIVE_WINDOW_MONTHS,
    };
    start_date
        .checked_add_months(Months::new(months))
        .ok_or_else(|| {
            CoreError::Validation(format!(
                "{} months from {} is out of range",
                months, start_date
            ))
        })
}

/// Build a fresh, active membership from a request
pub fn new_membership(request: &MembershipRequest) -> CoreResult<Membership> {
    if request.duration == 0 {
        return Err(CoreError::Validation(format!(
            "{} membership duration must be at least 1",
            request.kind
        )));
    }

    let end_date = membership_end_date(request.kind, request.duration, request.start_date)?;
    let remaining_sessions = match request.kind {
        MembershipType::Combative => request.duration,
        MembershipType::Monthly => 0,
    };

    Ok(Membership {
        membership_id: MembershipId::new(),
        kind: request.kind,
        duration: request.duration,
        start_date: request.start_date,
        end_date,
        remaining_sessions,
        status: MembershipStatus::Active,
    })
}
