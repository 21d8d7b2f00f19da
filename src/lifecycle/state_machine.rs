use sea_orm::ActiveEnum;

use crate::entities::ride::RequiredGender;
use crate::entities::ride_request::RequestStatus;
use crate::entities::user::Gender;
use crate::error::AppError;

/// Everything a passenger or driver can do to an existing ride request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestAction {
    Accept,
    Reject,
    CheckIn,
    CheckOut,
    Cancel,
    Rate,
}

impl RequestAction {
    pub fn verb(&self) -> &'static str {
        match self {
            RequestAction::Accept => "accept",
            RequestAction::Reject => "reject",
            RequestAction::CheckIn => "check in",
            RequestAction::CheckOut => "check out",
            RequestAction::Cancel => "cancel",
            RequestAction::Rate => "rate",
        }
    }
}

/// Computes the status an action moves a request into, or refuses.
/// Pure: callers persist the result and run side effects only afterwards.
pub fn apply(action: RequestAction, from: RequestStatus) -> Result<RequestStatus, AppError> {
    use RequestAction::*;
    use RequestStatus::*;

    let next = match (action, from) {
        (Accept, Waiting) => Accepted,
        (Reject, Waiting) => Rejected,
        (CheckIn, Accepted) => CheckedIn,
        (CheckOut, CheckedIn) => CheckedOut,
        (Cancel, Waiting | Accepted | CheckedIn) => Cancelled,
        // Rating does not move the request anywhere
        (Rate, CheckedOut) => CheckedOut,
        (action, from) => {
            return Err(AppError::InvalidTransition {
                action: action.verb(),
                from: from.to_value(),
            })
        }
    };

    Ok(next)
}

/// A request still occupying its (ride, user) slot.
pub const ACTIVE_STATUSES: [RequestStatus; 3] = [
    RequestStatus::Waiting,
    RequestStatus::Accepted,
    RequestStatus::CheckedIn,
];

pub fn is_active(status: RequestStatus) -> bool {
    ACTIVE_STATUSES.contains(&status)
}

pub fn is_terminal(status: RequestStatus) -> bool {
    matches!(
        status,
        RequestStatus::Rejected | RequestStatus::CheckedOut | RequestStatus::Cancelled
    )
}

/// A seat is taken at check-in, so only a cancellation out of `checked_in`
/// puts one back. Cancelling a merely accepted request never touched the
/// counter.
pub fn frees_seat_on_cancel(from: RequestStatus) -> bool {
    matches!(from, RequestStatus::CheckedIn)
}

pub fn gender_eligible(required: RequiredGender, gender: Gender) -> bool {
    match required {
        RequiredGender::Either => true,
        RequiredGender::Male => gender == Gender::Male,
        RequiredGender::Female => gender == Gender::Female,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use RequestAction::*;
    use RequestStatus::*;

    const ALL_STATUSES: [RequestStatus; 6] =
        [Waiting, Accepted, Rejected, CheckedIn, CheckedOut, Cancelled];
    const ALL_ACTIONS: [RequestAction; 6] = [Accept, Reject, CheckIn, CheckOut, Cancel, Rate];

    fn successors(from: RequestStatus) -> Vec<RequestStatus> {
        ALL_ACTIONS
            .iter()
            .filter_map(|&action| apply(action, from).ok())
            .filter(|&next| next != from)
            .collect()
    }

    #[test]
    fn waiting_moves_only_to_accepted_rejected_or_cancelled() {
        let next = successors(Waiting);
        assert_eq!(next.len(), 3);
        assert!(next.contains(&Accepted));
        assert!(next.contains(&Rejected));
        assert!(next.contains(&Cancelled));
    }

    #[test]
    fn accepted_moves_only_to_checked_in_or_cancelled() {
        let next = successors(Accepted);
        assert_eq!(next.len(), 2);
        assert!(next.contains(&CheckedIn));
        assert!(next.contains(&Cancelled));
    }

    #[test]
    fn checked_in_moves_only_to_checked_out_or_cancelled() {
        let next = successors(CheckedIn);
        assert_eq!(next.len(), 2);
        assert!(next.contains(&CheckedOut));
        assert!(next.contains(&Cancelled));
    }

    #[test]
    fn terminal_states_have_no_outgoing_transitions() {
        for status in [Rejected, CheckedOut, Cancelled] {
            assert!(is_terminal(status));
            assert!(successors(status).is_empty(), "{status:?} should be terminal");
        }
    }

    #[test]
    fn rating_keeps_a_checked_out_request_checked_out() {
        assert_eq!(apply(Rate, CheckedOut).unwrap(), CheckedOut);
        for status in ALL_STATUSES.into_iter().filter(|&s| s != CheckedOut) {
            assert!(apply(Rate, status).is_err());
        }
    }

    #[test]
    fn refusals_carry_the_action_and_current_state() {
        let err = apply(Accept, Cancelled).unwrap_err();
        match err {
            AppError::InvalidTransition { action, from } => {
                assert_eq!(action, "accept");
                assert_eq!(from, "cancelled");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn active_and_terminal_partition_the_statuses() {
        for status in ALL_STATUSES {
            assert_ne!(is_active(status), is_terminal(status));
        }
    }

    #[test]
    fn only_checked_in_frees_a_seat_on_cancel() {
        for status in ALL_STATUSES {
            assert_eq!(frees_seat_on_cancel(status), status == CheckedIn);
        }
    }

    /// Exhaustively interleaves two passengers' actions over a one-seat
    /// ride, applying the ledger discipline (take a seat at check-in,
    /// return it on cancel-from-checked-in, refuse check-in at zero). The
    /// counter must stay within [0, 1] in every reachable state; both
    /// passengers simultaneously checked in would drive it negative.
    #[test]
    fn seat_counter_stays_in_bounds_for_every_interleaving() {
        use std::collections::HashSet;

        type Sim = (i32, [RequestStatus; 2]);

        fn step(sim: Sim, who: usize, action: RequestAction) -> Option<Sim> {
            let (mut seats, mut statuses) = sim;
            let from = statuses[who];
            let next = apply(action, from).ok()?;
            match action {
                CheckIn => {
                    if seats == 0 {
                        return None; // refused with SeatsUnavailable
                    }
                    seats -= 1;
                }
                Cancel if frees_seat_on_cancel(from) => seats += 1,
                _ => {}
            }
            statuses[who] = next;
            Some((seats, statuses))
        }

        let mut seen = HashSet::new();
        let mut stack = vec![(1, [Waiting, Waiting])];
        while let Some(sim) = stack.pop() {
            if !seen.insert(sim) {
                continue;
            }
            assert!(
                (0..=1).contains(&sim.0),
                "seat counter out of bounds in {sim:?}"
            );
            for who in 0..2 {
                for action in ALL_ACTIONS {
                    if let Some(next) = step(sim, who, action) {
                        stack.push(next);
                    }
                }
            }
        }
    }

    #[test]
    fn gender_eligibility_follows_the_ride_restriction() {
        assert!(gender_eligible(RequiredGender::Either, Gender::Male));
        assert!(gender_eligible(RequiredGender::Either, Gender::Female));
        assert!(gender_eligible(RequiredGender::Male, Gender::Male));
        assert!(!gender_eligible(RequiredGender::Male, Gender::Female));
        assert!(gender_eligible(RequiredGender::Female, Gender::Female));
        assert!(!gender_eligible(RequiredGender::Female, Gender::Male));
    }
}
