use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use sea_orm::{QueryFilter, TransactionTrait, prelude::*};
use serde::Serialize;

use crate::{
    Currency, EngineError, ExpenseStatus, Money, ResultEngine, expense_splits, expenses,
    group_members,
};

use super::{Engine, with_tx};

/// Net position of one member: positive when the member is owed money.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MemberBalance {
    pub user_id: String,
    pub net: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GroupBalances {
    pub group_id: String,
    pub currency: Currency,
    /// Sorted by user id; always sums to zero.
    pub members: Vec<MemberBalance>,
}

impl Engine {
    /// Computes who owes whom from the unsettled splits of confirmed
    /// expenses.
    ///
    /// - The payer is credited with every unsettled share owed by others.
    /// - A participant is debited with their unsettled share.
    /// - A payer's own split nets to zero and is ignored.
    pub async fn group_balances(
        &self,
        group_id: &str,
        user_id: &str,
    ) -> ResultEngine<GroupBalances> {
        with_tx!(self, |db_tx| {
            let (group, _) = self
                .require_group_member(&db_tx, group_id, user_id)
                .await?;
            let currency = Currency::try_from(group.currency.as_str())?;

            let zero = Money::from_minor(0, currency);
            let mut net: BTreeMap<String, Money> = group_members::Entity::find()
                .filter(group_members::Column::GroupId.eq(group_id.to_string()))
                .all(&db_tx)
                .await?
                .into_iter()
                .map(|m| (m.user_id, zero))
                .collect();

            let payers: HashMap<String, String> = expenses::Entity::find()
                .filter(expenses::Column::GroupId.eq(group_id.to_string()))
                .filter(confirmed())
                .all(&db_tx)
                .await?
                .into_iter()
                .map(|e| (e.id, e.paid_by))
                .collect();

            let open_splits = expense_splits::Entity::find()
                .inner_join(expenses::Entity)
                .filter(expenses::Column::GroupId.eq(group_id.to_string()))
                .filter(confirmed())
                .filter(expense_splits::Column::Settled.eq(false))
                .all(&db_tx)
                .await?;

            for split in open_splits {
                let payer = payers.get(&split.expense_id).ok_or_else(|| {
                    EngineError::KeyNotFound("expense not exists".to_string())
                })?;
                if *payer == split.user_id {
                    continue;
                }
                let share = Money::from_minor(split.share_minor, currency);
                let credit = net.entry(payer.clone()).or_insert(zero);
                *credit = credit.checked_add(share).ok_or_else(overflow)?;
                let debit = net.entry(split.user_id).or_insert(zero);
                *debit = debit.checked_sub(share).ok_or_else(overflow)?;
            }

            let members = net
                .into_iter()
                .map(|(user_id, balance)| MemberBalance {
                    user_id,
                    net: balance.to_decimal(),
                })
                .collect();

            Ok(GroupBalances {
                group_id: group_id.to_string(),
                currency,
                members,
            })
        })
    }
}

fn confirmed() -> sea_orm::sea_query::SimpleExpr {
    expenses::Column::Status.eq(ExpenseStatus::Confirmed.as_str().to_string())
}

fn overflow() -> EngineError {
    EngineError::InvalidAmount("balance overflow".to_string())
}
