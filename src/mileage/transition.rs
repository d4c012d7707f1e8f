use super::models::ChargeRequestStatus;

/// Effect of a processing decision on the owner's personal bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceEffect {
    None,
    Credit,
    Debit,
}

/// Outcome of applying an approve/reject decision to a charge request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ChargeRequestStatus,
    pub to: ChargeRequestStatus,
    pub effect: BalanceEffect,
}

impl Transition {
    /// Each call sets the outcome rather than stepping the state: repeating a
    /// decision is a no-op and flipping it reverses the earlier credit.
    pub fn decide(current: ChargeRequestStatus, approve: bool) -> Self {
        use ChargeRequestStatus::*;

        let (to, effect) = match (current, approve) {
            (Requested, true) => (Approved, BalanceEffect::Credit),
            (Requested, false) => (Rejected, BalanceEffect::None),
            (Approved, true) => (Approved, BalanceEffect::None),
            (Approved, false) => (Rejected, BalanceEffect::Debit),
            (Rejected, true) => (Approved, BalanceEffect::Credit),
            (Rejected, false) => (Rejected, BalanceEffect::None),
        };
        Self {
            from: current,
            to,
            effect,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.from == self.to
    }

    /// Signed change to `personal_charged_mileage` for a request of `amount`.
    pub fn personal_delta(&self, amount: i64) -> i64 {
        match self.effect {
            BalanceEffect::None => 0,
            BalanceEffect::Credit => amount,
            BalanceEffect::Debit => -amount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ChargeRequestStatus::*;

    #[test]
    fn decision_table() {
        let cases = [
            (Requested, true, Approved, 1000),
            (Requested, false, Rejected, 0),
            (Approved, true, Approved, 0),
            (Approved, false, Rejected, -1000),
            (Rejected, true, Approved, 1000),
            (Rejected, false, Rejected, 0),
        ];
        for (from, approve, to, delta) in cases {
            let transition = Transition::decide(from, approve);
            assert_eq!(transition.to, to, "{from} approve={approve}");
            assert_eq!(transition.personal_delta(1000), delta, "{from} approve={approve}");
        }
    }

    #[test]
    fn repeated_decisions_are_noops() {
        assert!(Transition::decide(Approved, true).is_noop());
        assert!(Transition::decide(Rejected, false).is_noop());
        assert!(!Transition::decide(Requested, false).is_noop());
    }

    #[test]
    fn flipping_twice_nets_to_zero() {
        let approve = Transition::decide(Requested, true);
        let reject = Transition::decide(approve.to, false);
        let again = Transition::decide(reject.to, true);
        let net = approve.personal_delta(750) + reject.personal_delta(750);
        assert_eq!(net, 0);
        assert_eq!(again.personal_delta(750), 750);
    }
}
