use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::{Decimal, RoundingStrategy};

use crate::{
    Currency, CurrencySupport, EngineError, ResultEngine,
    money::{from_minor_units, to_minor_units},
};

use super::{SplitRequest, SplitShare, SplitStrategy};

/// Turns an amount and a [`SplitRequest`] into per-participant shares.
///
/// Every share is rounded to the minor-unit scale (half-up, i.e. midpoint away
/// from zero). The rounding error is then handed out one minor unit at a time
/// in ascending participant-id order, so the shares always add up to the
/// amount exactly and identical requests always yield identical output.
///
/// # Examples
///
/// ```rust
/// use engine::{SplitCalculator, SplitRequest};
/// use rust_decimal::Decimal;
///
/// let shares = SplitCalculator::with_scale(2)
///     .compute(Decimal::new(10000, 2), &SplitRequest::equal(["a", "b", "c"]))
///     .unwrap();
/// let amounts: Vec<_> = shares.iter().map(|s| s.share.to_string()).collect();
/// assert_eq!(amounts, ["33.34", "33.33", "33.33"]);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SplitCalculator {
    scale: u32,
}

/// Naive allocation of one participant before remainder correction.
struct Allocation<'a> {
    participant_id: &'a str,
    minor: i64,
    eligible: bool,
}

impl Default for SplitCalculator {
    fn default() -> Self {
        Self::with_scale(2)
    }
}

impl SplitCalculator {
    /// Calculator for an explicit minor-unit scale.
    #[must_use]
    pub const fn with_scale(scale: u32) -> Self {
        Self { scale }
    }

    /// Calculator for `currency`, failing fast when its precision is not
    /// configured in `support`.
    pub fn for_currency(currency: Currency, support: &CurrencySupport) -> ResultEngine<Self> {
        support.precision(currency).map(Self::with_scale)
    }

    #[must_use]
    pub const fn scale(&self) -> u32 {
        self.scale
    }

    /// Computes the owed share of every participant, sorted by participant id.
    pub fn compute(&self, amount: Decimal, request: &SplitRequest) -> ResultEngine<Vec<SplitShare>> {
        let amount_minor = self.validate_amount(amount)?;
        let participants = validate_participants(&request.participants)?;

        let mut allocations = match &request.strategy {
            SplitStrategy::Equal => {
                let weights = participants.iter().map(|id| (*id, Decimal::ONE)).collect();
                self.proportional(amount, weights)?
            }
            SplitStrategy::Custom(amounts) => {
                check_weight_keys(&participants, amounts)?;
                self.custom(amount_minor, &participants, amounts)?
            }
            SplitStrategy::Percentage(percentages) => {
                check_weight_keys(&participants, percentages)?;
                if let Some((id, _)) = percentages
                    .iter()
                    .find(|(_, pct)| pct.is_sign_negative() && !pct.is_zero())
                {
                    return Err(EngineError::InvalidSplit(format!(
                        "negative percentage for participant {id}"
                    )));
                }
                let total = checked_sum(percentages.values().copied())?;
                if total != Decimal::ONE_HUNDRED {
                    return Err(EngineError::InvalidSplit(format!(
                        "percentages sum to {total}, expected 100"
                    )));
                }
                let weights = participants
                    .iter()
                    .map(|id| (*id, percentages[*id]))
                    .collect();
                self.proportional(amount, weights)?
            }
            SplitStrategy::Share(shares) => {
                check_weight_keys(&participants, shares)?;
                if let Some((id, _)) = shares.iter().find(|(_, count)| **count == 0) {
                    return Err(EngineError::InvalidSplit(format!(
                        "share count must be > 0 for participant {id}"
                    )));
                }
                let weights = participants
                    .iter()
                    .map(|id| (*id, Decimal::from(shares[*id])))
                    .collect();
                self.proportional(amount, weights)?
            }
        };

        let allocated = allocations
            .iter()
            .try_fold(0_i64, |acc, a| acc.checked_add(a.minor))
            .ok_or_else(overflow)?;
        let delta = amount_minor - allocated;
        distribute_remainder(&mut allocations, delta)?;

        tracing::debug!(
            split_type = request.split_type().as_str(),
            participants = allocations.len(),
            amount = %amount,
            remainder_minor = delta,
            "computed split"
        );

        Ok(allocations
            .into_iter()
            .map(|a| SplitShare {
                participant_id: a.participant_id.to_string(),
                share: from_minor_units(a.minor, self.scale),
            })
            .collect())
    }

    fn validate_amount(&self, amount: Decimal) -> ResultEngine<i64> {
        if amount <= Decimal::ZERO {
            return Err(EngineError::InvalidSplit("amount must be > 0".to_string()));
        }
        to_minor_units(amount, self.scale).map_err(|err| match err {
            EngineError::InvalidAmount(msg) => EngineError::InvalidSplit(msg),
            other => other,
        })
    }

    /// Rounds `amount * weight / total` for every participant.
    fn proportional<'a>(
        &self,
        amount: Decimal,
        weights: Vec<(&'a str, Decimal)>,
    ) -> ResultEngine<Vec<Allocation<'a>>> {
        let total = checked_sum(weights.iter().map(|(_, w)| *w))?;
        if total.is_zero() {
            return Err(EngineError::InvalidSplit("weights sum to zero".to_string()));
        }
        weights
            .into_iter()
            .map(|(participant_id, weight)| {
                let exact = amount
                    .checked_mul(weight)
                    .and_then(|v| v.checked_div(total))
                    .ok_or_else(overflow)?;
                let rounded =
                    exact.round_dp_with_strategy(self.scale, RoundingStrategy::MidpointAwayFromZero);
                Ok(Allocation {
                    participant_id,
                    minor: to_minor_units(rounded, self.scale)?,
                    eligible: !weight.is_zero(),
                })
            })
            .collect()
    }

    fn custom<'a>(
        &self,
        amount_minor: i64,
        participants: &BTreeSet<&'a str>,
        amounts: &BTreeMap<String, Decimal>,
    ) -> ResultEngine<Vec<Allocation<'a>>> {
        let mut allocations = Vec::with_capacity(participants.len());
        let mut total = 0_i64;
        for id in participants {
            let value = amounts[*id];
            if value.is_sign_negative() && !value.is_zero() {
                return Err(EngineError::InvalidSplit(format!(
                    "negative amount for participant {id}"
                )));
            }
            let minor = to_minor_units(value, self.scale).map_err(|_| {
                EngineError::InvalidSplit(format!(
                    "amount for participant {id} exceeds {} decimals",
                    self.scale
                ))
            })?;
            total = total.checked_add(minor).ok_or_else(overflow)?;
            allocations.push(Allocation {
                participant_id: *id,
                minor,
                eligible: true,
            });
        }
        if total != amount_minor {
            return Err(EngineError::InvalidSplit(format!(
                "custom amounts sum to {}, expected {}",
                from_minor_units(total, self.scale),
                from_minor_units(amount_minor, self.scale)
            )));
        }
        Ok(allocations)
    }
}

/// Checks that the payer takes part in the split, unless the caller allows an
/// external payer.
pub fn validate_payer(
    paid_by: &str,
    participants: &[String],
    allow_external_payer: bool,
) -> ResultEngine<()> {
    if paid_by.trim().is_empty() {
        return Err(EngineError::InvalidSplit("payer must not be empty".to_string()));
    }
    if allow_external_payer || participants.iter().any(|p| p == paid_by) {
        return Ok(());
    }
    Err(EngineError::InvalidSplit(format!(
        "payer {paid_by} is not a participant"
    )))
}

fn validate_participants(participants: &[String]) -> ResultEngine<BTreeSet<&str>> {
    if participants.is_empty() {
        return Err(EngineError::InvalidSplit(
            "participants must not be empty".to_string(),
        ));
    }
    let mut set = BTreeSet::new();
    for id in participants {
        if id.trim().is_empty() {
            return Err(EngineError::InvalidSplit(
                "participant id must not be empty".to_string(),
            ));
        }
        if !set.insert(id.as_str()) {
            return Err(EngineError::InvalidSplit(format!(
                "duplicate participant {id}"
            )));
        }
    }
    Ok(set)
}

fn check_weight_keys<W>(
    participants: &BTreeSet<&str>,
    weights: &BTreeMap<String, W>,
) -> ResultEngine<()> {
    if let Some(missing) = participants.iter().find(|id| !weights.contains_key(**id)) {
        return Err(EngineError::InvalidSplit(format!(
            "missing weight for participant {missing}"
        )));
    }
    if let Some(extra) = weights.keys().find(|id| !participants.contains(id.as_str())) {
        return Err(EngineError::InvalidSplit(format!(
            "weight given for non-participant {extra}"
        )));
    }
    Ok(())
}

/// Applies `delta` minor units to `allocations`, one unit per split per pass,
/// in their (ascending participant id) order.
///
/// Zero-weight participants only absorb units when nobody else can, and a
/// share never goes below zero.
fn distribute_remainder(allocations: &mut [Allocation<'_>], delta: i64) -> ResultEngine<()> {
    let step = delta.signum();
    let mut order: Vec<usize> = (0..allocations.len())
        .filter(|&i| allocations[i].eligible)
        .collect();
    if order.is_empty() {
        order = (0..allocations.len()).collect();
    }

    let mut remaining = delta;
    while remaining != 0 {
        let mut progressed = false;
        for &idx in &order {
            if remaining == 0 {
                break;
            }
            if step < 0 && allocations[idx].minor == 0 {
                continue;
            }
            allocations[idx].minor += step;
            remaining -= step;
            progressed = true;
        }
        if !progressed {
            return Err(EngineError::InvalidSplit(
                "unable to reconcile rounding remainder".to_string(),
            ));
        }
    }
    Ok(())
}

fn checked_sum(values: impl Iterator<Item = Decimal>) -> ResultEngine<Decimal> {
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(v))
        .ok_or_else(overflow)
}

fn overflow() -> EngineError {
    EngineError::InvalidSplit("amount out of range".to_string())
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn calc() -> SplitCalculator {
        SplitCalculator::default()
    }

    fn as_map(shares: &[SplitShare]) -> BTreeMap<&str, Decimal> {
        shares
            .iter()
            .map(|s| (s.participant_id.as_str(), s.share))
            .collect()
    }

    fn total(shares: &[SplitShare]) -> Decimal {
        shares.iter().map(|s| s.share).sum()
    }

    fn weights<W: Copy>(pairs: &[(&str, W)]) -> BTreeMap<String, W> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn equal_three_way_puts_leftover_cent_on_first_participant() {
        let shares = calc()
            .compute(dec!(100.00), &SplitRequest::equal(["C", "A", "B"]))
            .unwrap();
        let ids: Vec<_> = shares.iter().map(|s| s.participant_id.as_str()).collect();
        assert_eq!(ids, ["A", "B", "C"]);
        assert_eq!(
            as_map(&shares),
            BTreeMap::from([("A", dec!(33.34)), ("B", dec!(33.33)), ("C", dec!(33.33))])
        );
    }

    #[test]
    fn equal_split_takes_back_overshoot() {
        // 2.00 / 3 rounds each share up to 0.67, one cent too many
        let shares = calc()
            .compute(dec!(2.00), &SplitRequest::equal(["A", "B", "C"]))
            .unwrap();
        assert_eq!(
            as_map(&shares),
            BTreeMap::from([("A", dec!(0.66)), ("B", dec!(0.67)), ("C", dec!(0.67))])
        );
    }

    #[test]
    fn equal_split_sums_exactly_for_many_counts() {
        let amounts = [dec!(0.01), dec!(0.10), dec!(1), dec!(10.01), dec!(99.99), dec!(1234.57)];
        for amount in amounts {
            for n in 1..=13 {
                let participants: Vec<String> = (0..n).map(|i| format!("user{i:02}")).collect();
                let shares = calc()
                    .compute(amount, &SplitRequest::equal(participants))
                    .unwrap();
                assert_eq!(shares.len(), n);
                assert_eq!(total(&shares), amount, "amount {amount} among {n}");
                assert!(shares.iter().all(|s| !s.share.is_sign_negative()));
            }
        }
    }

    #[test]
    fn single_participant_owes_everything() {
        let shares = calc()
            .compute(dec!(12.34), &SplitRequest::equal(["solo"]))
            .unwrap();
        assert_eq!(shares[0].share, dec!(12.34));
    }

    #[test]
    fn percentage_even_split() {
        let request = SplitRequest::percentage(weights(&[("A", dec!(50)), ("B", dec!(50))]));
        let shares = calc().compute(dec!(45.50), &request).unwrap();
        assert_eq!(
            as_map(&shares),
            BTreeMap::from([("A", dec!(22.75)), ("B", dec!(22.75))])
        );
        assert_eq!(total(&shares), dec!(45.50));
    }

    #[test]
    fn percentage_with_thirds_reconciles() {
        let request = SplitRequest::percentage(weights(&[
            ("A", dec!(33.33)),
            ("B", dec!(33.33)),
            ("C", dec!(33.34)),
        ]));
        let shares = calc().compute(dec!(10.00), &request).unwrap();
        assert_eq!(total(&shares), dec!(10.00));
    }

    #[test]
    fn percentage_must_sum_to_hundred() {
        let request = SplitRequest::percentage(weights(&[("A", dec!(50)), ("B", dec!(49.99))]));
        assert!(matches!(
            calc().compute(dec!(10), &request),
            Err(EngineError::InvalidSplit(_))
        ));
    }

    #[test]
    fn zero_percentage_never_receives_remainder() {
        let request = SplitRequest::percentage(weights(&[
            ("A", dec!(0)),
            ("B", dec!(50)),
            ("C", dec!(50)),
        ]));
        let shares = calc().compute(dec!(0.01), &request).unwrap();
        let map = as_map(&shares);
        assert_eq!(map["A"], dec!(0));
        assert_eq!(total(&shares), dec!(0.01));
    }

    #[test]
    fn share_split_of_equal_counts() {
        let request = SplitRequest::share(weights(&[("A", 1), ("B", 1), ("C", 1)]));
        let shares = calc().compute(dec!(80.25), &request).unwrap();
        assert_eq!(total(&shares), dec!(80.25));
        assert_eq!(
            as_map(&shares),
            BTreeMap::from([("A", dec!(26.75)), ("B", dec!(26.75)), ("C", dec!(26.75))])
        );
    }

    #[test]
    fn share_split_is_weighted() {
        let request = SplitRequest::share(weights(&[("A", 2), ("B", 1)]));
        let shares = calc().compute(dec!(10.00), &request).unwrap();
        assert_eq!(
            as_map(&shares),
            BTreeMap::from([("A", dec!(6.67)), ("B", dec!(3.33))])
        );
    }

    #[test]
    fn share_counts_must_be_positive() {
        let request = SplitRequest::share(weights(&[("A", 0), ("B", 1)]));
        assert!(calc().compute(dec!(10), &request).is_err());
    }

    #[test]
    fn custom_amounts_are_kept_verbatim() {
        let amounts = weights(&[("A", dec!(10.10)), ("B", dec!(5.40)), ("C", dec!(0))]);
        let shares = calc()
            .compute(dec!(15.50), &SplitRequest::custom(amounts.clone()))
            .unwrap();
        let map = as_map(&shares);
        for (id, amount) in &amounts {
            assert_eq!(map[id.as_str()], *amount);
        }
    }

    #[test]
    fn custom_amounts_must_match_total_exactly() {
        let amounts = weights(&[("A", dec!(10.00)), ("B", dec!(5.49))]);
        assert_eq!(
            calc().compute(dec!(15.50), &SplitRequest::custom(amounts)),
            Err(EngineError::InvalidSplit(
                "custom amounts sum to 15.49, expected 15.50".to_string()
            ))
        );
    }

    #[test]
    fn custom_requires_weight_for_every_participant() {
        let request = SplitRequest::new(
            vec!["A".to_string(), "B".to_string()],
            SplitStrategy::Custom(weights(&[("A", dec!(10))])),
        );
        assert_eq!(
            calc().compute(dec!(10), &request),
            Err(EngineError::InvalidSplit(
                "missing weight for participant B".to_string()
            ))
        );
    }

    #[test]
    fn weights_for_strangers_are_rejected() {
        let request = SplitRequest::new(
            vec!["A".to_string()],
            SplitStrategy::Share(weights(&[("A", 1), ("Z", 1)])),
        );
        assert!(matches!(
            calc().compute(dec!(10), &request),
            Err(EngineError::InvalidSplit(_))
        ));
    }

    #[test]
    fn rejects_empty_participants() {
        let request = SplitRequest::equal(Vec::<String>::new());
        assert_eq!(
            calc().compute(dec!(10), &request),
            Err(EngineError::InvalidSplit(
                "participants must not be empty".to_string()
            ))
        );
    }

    #[test]
    fn rejects_non_positive_amount() {
        for amount in [dec!(-5), dec!(0)] {
            assert_eq!(
                calc().compute(amount, &SplitRequest::equal(["A"])),
                Err(EngineError::InvalidSplit("amount must be > 0".to_string()))
            );
        }
    }

    #[test]
    fn rejects_duplicates_and_excess_precision() {
        assert!(matches!(
            calc().compute(dec!(10), &SplitRequest::equal(["A", "A"])),
            Err(EngineError::InvalidSplit(_))
        ));
        assert!(matches!(
            calc().compute(dec!(10.001), &SplitRequest::equal(["A"])),
            Err(EngineError::InvalidSplit(_))
        ));
    }

    #[test]
    fn compute_is_deterministic() {
        let request = SplitRequest::share(weights(&[("x", 3), ("y", 7), ("z", 11)]));
        let first = calc().compute(dec!(100.01), &request).unwrap();
        let second = calc().compute(dec!(100.01), &request).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn zero_decimal_currency_splits_whole_units() {
        let calc = SplitCalculator::for_currency(
            Currency::Jpy,
            &CurrencySupport::default().enable(Currency::Jpy),
        )
        .unwrap();
        let shares = calc
            .compute(dec!(1000), &SplitRequest::equal(["A", "B", "C"]))
            .unwrap();
        assert_eq!(
            as_map(&shares),
            BTreeMap::from([("A", dec!(334)), ("B", dec!(333)), ("C", dec!(333))])
        );
    }

    #[test]
    fn unconfigured_currency_fails_fast() {
        assert!(matches!(
            SplitCalculator::for_currency(Currency::Kwd, &CurrencySupport::default()),
            Err(EngineError::UnsupportedCurrency(_))
        ));
    }

    #[test]
    fn payer_must_participate_unless_allowed() {
        let participants = vec!["A".to_string(), "B".to_string()];
        assert!(validate_payer("A", &participants, false).is_ok());
        assert!(validate_payer("Z", &participants, false).is_err());
        assert!(validate_payer("Z", &participants, true).is_ok());
    }

    #[test]
    fn negative_percentage_is_rejected() {
        let err = calc()
            .compute(
                dec!(10.00),
                &SplitRequest::percentage(weights(&[("A", dec!(150)), ("B", dec!(-50))])),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidSplit(msg) if msg.contains("participant B")));
    }

    #[test]
    fn negative_custom_amount_is_rejected() {
        let err = calc()
            .compute(
                dec!(10.00),
                &SplitRequest::custom(weights(&[("A", dec!(20)), ("B", dec!(-10))])),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidSplit(msg) if msg.contains("participant B")));
    }

    #[test]
    fn custom_amount_with_excess_decimals_is_rejected() {
        // the amounts sum to 10.00 but neither is a whole number of cents
        let err = calc()
            .compute(
                dec!(10.00),
                &SplitRequest::custom(weights(&[("A", dec!(5.005)), ("B", dec!(4.995))])),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidSplit(msg) if msg.contains("participant A")));
    }

    #[test]
    fn blank_participant_is_rejected() {
        let err = calc()
            .compute(dec!(10.00), &SplitRequest::equal([" ", "A"]))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidSplit(_)));
    }

    #[test]
    fn oversized_scale_fails_without_panicking() {
        let err = SplitCalculator::with_scale(19)
            .compute(dec!(1), &SplitRequest::equal(["a"]))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidSplit(_)));
    }
}
