//! Settlement state of expense splits.
//!
//! A split moves `Unsettled -> Settled` exactly once; the settled state is
//! terminal. Undoing a settlement is an administrative operation that is not
//! exposed here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{EngineError, ExpenseSplit, ResultEngine};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SettlementState {
    Unsettled,
    Settled {
        at: DateTime<Utc>,
        by: String,
    },
}

impl ExpenseSplit {
    /// Current settlement state of the split.
    pub fn settlement_state(&self) -> SettlementState {
        match (self.settled, self.settled_at, self.settled_by.as_ref()) {
            (true, Some(at), Some(by)) => SettlementState::Settled { at, by: by.clone() },
            _ => SettlementState::Unsettled,
        }
    }
}

/// Applies settlement transitions to splits.
///
/// In strict mode a split already settled by another user is a conflict
/// ([`EngineError::AlreadySettled`]); in lenient mode the first settlement
/// wins and the split is returned unchanged.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SettlementTracker {
    strict: bool,
}

impl SettlementTracker {
    #[must_use]
    pub const fn new(strict: bool) -> Self {
        Self { strict }
    }

    #[must_use]
    pub const fn strict() -> Self {
        Self::new(true)
    }

    #[must_use]
    pub const fn lenient() -> Self {
        Self::new(false)
    }

    #[must_use]
    pub const fn is_strict(&self) -> bool {
        self.strict
    }

    /// Marks `split` as settled by `settled_by` at `occurred_at`.
    ///
    /// Settling an already settled split again by the same user is a no-op:
    /// the returned split keeps its original timestamp.
    pub fn mark_settled(
        &self,
        split: &ExpenseSplit,
        settled_by: &str,
        occurred_at: DateTime<Utc>,
    ) -> ResultEngine<ExpenseSplit> {
        match split.settlement_state() {
            SettlementState::Unsettled => {
                let mut settled = split.clone();
                settled.settled = true;
                settled.settled_at = Some(occurred_at);
                settled.settled_by = Some(settled_by.to_string());
                Ok(settled)
            }
            SettlementState::Settled { by, .. } if by == settled_by => Ok(split.clone()),
            SettlementState::Settled { by, .. } => {
                if self.strict {
                    return Err(EngineError::AlreadySettled(format!(
                        "split {} already settled by {by}",
                        split.id
                    )));
                }
                Ok(split.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use super::*;
    use crate::{Currency, SplitType};

    fn split() -> ExpenseSplit {
        ExpenseSplit {
            id: Uuid::new_v4(),
            expense_id: Uuid::new_v4(),
            user_id: "bob".to_string(),
            split_type: SplitType::Equal,
            share_amount: dec!(12.50),
            currency: Currency::Eur,
            settled: false,
            settled_at: None,
            settled_by: None,
        }
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn unsettled_split_becomes_settled() {
        let settled = SettlementTracker::strict()
            .mark_settled(&split(), "bob", at(9))
            .unwrap();
        assert!(settled.settled);
        assert_eq!(
            settled.settlement_state(),
            SettlementState::Settled {
                at: at(9),
                by: "bob".to_string()
            }
        );
    }

    #[test]
    fn same_user_settling_again_is_noop() {
        let tracker = SettlementTracker::strict();
        let first = tracker.mark_settled(&split(), "bob", at(9)).unwrap();
        let second = tracker.mark_settled(&first, "bob", at(17)).unwrap();
        assert_eq!(first, second);
        assert_eq!(second.settled_at, Some(at(9)));
    }

    #[test]
    fn strict_mode_rejects_different_settler() {
        let tracker = SettlementTracker::strict();
        let settled = tracker.mark_settled(&split(), "bob", at(9)).unwrap();
        assert!(matches!(
            tracker.mark_settled(&settled, "alice", at(10)),
            Err(EngineError::AlreadySettled(_))
        ));
    }

    #[test]
    fn lenient_mode_keeps_first_settlement() {
        let tracker = SettlementTracker::lenient();
        let settled = tracker.mark_settled(&split(), "bob", at(9)).unwrap();
        let again = tracker.mark_settled(&settled, "alice", at(10)).unwrap();
        assert_eq!(again.settled_by.as_deref(), Some("bob"));
        assert_eq!(again.settled_at, Some(at(9)));
    }

    #[test]
    fn input_split_is_not_mutated() {
        let original = split();
        let _ = SettlementTracker::lenient().mark_settled(&original, "bob", at(9));
        assert_eq!(original.settlement_state(), SettlementState::Unsettled);
    }
}
