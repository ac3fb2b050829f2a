use chrono::{DateTime, Utc};
use sea_orm::{
    DatabaseTransaction, QueryFilter, QueryOrder, TransactionTrait, prelude::*, sea_query::Expr,
};
use uuid::Uuid;

use crate::{EngineError, ExpenseSplit, ExpenseStatus, ResultEngine, expense_splits};

use super::{Engine, expenses::load_expense, with_tx};

impl Engine {
    /// Marks a split as settled by `user_id`.
    ///
    /// The debtor, the payer of the expense or a group owner may settle. A
    /// repeated settlement by the same user returns the stored split
    /// unchanged; a settlement by someone else is rejected in strict mode.
    pub async fn settle_split(
        &self,
        split_id: Uuid,
        user_id: &str,
        occurred_at: DateTime<Utc>,
    ) -> ResultEngine<ExpenseSplit> {
        with_tx!(self, |db_tx| {
            let split = load_split(&db_tx, split_id).await?;
            let expense = load_expense(&db_tx, split.expense_id).await?;
            let (_, role) = self
                .require_group_member(&db_tx, &expense.group_id, user_id)
                .await?;
            if split.user_id != user_id && expense.paid_by != user_id && !role.can_manage() {
                return Err(EngineError::Forbidden(
                    "only the debtor, the payer or a group owner can settle".to_string(),
                ));
            }
            if expense.status == ExpenseStatus::Cancelled {
                return Err(EngineError::InvalidStatus(
                    "expense is cancelled".to_string(),
                ));
            }

            let updated = self.apply_settlement(&split, user_id, occurred_at)?;
            if updated == split {
                Ok(updated)
            } else if claim_split(&db_tx, &updated).await? {
                tracing::info!(
                    split_id = %updated.id,
                    settled_by = user_id,
                    "split settled"
                );
                Ok(updated)
            } else {
                // settled by a concurrent transaction since it was loaded
                let current = load_split(&db_tx, split_id).await?;
                self.apply_settlement(&current, user_id, occurred_at)
            }
        })
    }

    fn apply_settlement(
        &self,
        split: &ExpenseSplit,
        user_id: &str,
        occurred_at: DateTime<Utc>,
    ) -> ResultEngine<ExpenseSplit> {
        self.settlement
            .mark_settled(split, user_id, occurred_at)
            .inspect_err(|err| {
                tracing::warn!(split_id = %split.id, user_id, "conflicting settlement: {err}");
            })
    }

    /// Lists the unsettled splits owed by `user_id` in a group, across
    /// confirmed expenses.
    pub async fn unsettled_splits(
        &self,
        group_id: &str,
        user_id: &str,
    ) -> ResultEngine<Vec<ExpenseSplit>> {
        with_tx!(self, |db_tx| {
            self.require_group_member(&db_tx, group_id, user_id).await?;
            expense_splits::Entity::find()
                .inner_join(crate::expenses::Entity)
                .filter(crate::expenses::Column::GroupId.eq(group_id.to_string()))
                .filter(
                    crate::expenses::Column::Status
                        .eq(ExpenseStatus::Confirmed.as_str().to_string()),
                )
                .filter(expense_splits::Column::UserId.eq(user_id.to_string()))
                .filter(expense_splits::Column::Settled.eq(false))
                .order_by_asc(crate::expenses::Column::CreatedAt)
                .all(&db_tx)
                .await?
                .into_iter()
                .map(ExpenseSplit::try_from)
                .collect::<ResultEngine<Vec<_>>>()
        })
    }
}

async fn load_split(db: &DatabaseTransaction, split_id: Uuid) -> ResultEngine<ExpenseSplit> {
    let model = expense_splits::Entity::find_by_id(split_id.to_string())
        .one(db)
        .await?
        .ok_or_else(|| EngineError::KeyNotFound("split not exists".to_string()))?;
    ExpenseSplit::try_from(model)
}

/// Writes the settlement only if the row is still unsettled. Returns `false`
/// when another transaction settled it first.
async fn claim_split(db: &DatabaseTransaction, split: &ExpenseSplit) -> ResultEngine<bool> {
    let result = expense_splits::Entity::update_many()
        .col_expr(expense_splits::Column::Settled, Expr::value(true))
        .col_expr(expense_splits::Column::SettledAt, Expr::value(split.settled_at))
        .col_expr(
            expense_splits::Column::SettledBy,
            Expr::value(split.settled_by.clone()),
        )
        .filter(expense_splits::Column::Id.eq(split.id.to_string()))
        .filter(expense_splits::Column::Settled.eq(false))
        .exec(db)
        .await?;
    Ok(result.rows_affected == 1)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use migration::MigratorTrait;
    use rust_decimal_macros::dec;
    use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement};

    use super::*;
    use crate::{Currency, SplitType};

    async fn db_with_open_split(split_id: Uuid, expense_id: Uuid) -> DatabaseConnection {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        migration::Migrator::up(&db, None).await.unwrap();
        let backend = db.get_database_backend();
        let created_at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let statements: Vec<(&str, Vec<sea_orm::Value>)> = vec![
            ("INSERT INTO users (username) VALUES (?)", vec!["alice".into()]),
            ("INSERT INTO users (username) VALUES (?)", vec!["bob".into()]),
            (
                "INSERT INTO groups (id, name, currency, created_by) VALUES (?, ?, ?, ?)",
                vec!["trip".into(), "Trip".into(), "EUR".into(), "alice".into()],
            ),
            (
                "INSERT INTO expenses (id, group_id, description, amount_minor, currency, \
                 paid_by, split_type, status, created_by, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                vec![
                    expense_id.to_string().into(),
                    "trip".into(),
                    "Taxi".into(),
                    1000_i64.into(),
                    "EUR".into(),
                    "alice".into(),
                    "equal".into(),
                    "confirmed".into(),
                    "alice".into(),
                    created_at.into(),
                ],
            ),
            (
                "INSERT INTO expense_splits (id, expense_id, user_id, split_type, \
                 share_minor, currency, settled) VALUES (?, ?, ?, ?, ?, ?, ?)",
                vec![
                    split_id.to_string().into(),
                    expense_id.to_string().into(),
                    "bob".into(),
                    "equal".into(),
                    1000_i64.into(),
                    "EUR".into(),
                    false.into(),
                ],
            ),
        ];
        for (sql, values) in statements {
            db.execute(Statement::from_sql_and_values(backend, sql, values))
                .await
                .unwrap();
        }
        db
    }

    fn settled_by(split_id: Uuid, expense_id: Uuid, user: &str, hour: u32) -> ExpenseSplit {
        ExpenseSplit {
            id: split_id,
            expense_id,
            user_id: "bob".to_string(),
            split_type: SplitType::Equal,
            share_amount: dec!(10.00),
            currency: Currency::Eur,
            settled: true,
            settled_at: Some(Utc.with_ymd_and_hms(2026, 3, 2, hour, 0, 0).unwrap()),
            settled_by: Some(user.to_string()),
        }
    }

    #[tokio::test]
    async fn claim_only_writes_unsettled_rows() {
        let (split_id, expense_id) = (Uuid::new_v4(), Uuid::new_v4());
        let db = db_with_open_split(split_id, expense_id).await;
        let db_tx = db.begin().await.unwrap();

        let first = settled_by(split_id, expense_id, "bob", 10);
        assert!(claim_split(&db_tx, &first).await.unwrap());

        // a later writer that loaded the row before it was settled loses
        let late = settled_by(split_id, expense_id, "alice", 11);
        assert!(!claim_split(&db_tx, &late).await.unwrap());

        assert_eq!(load_split(&db_tx, split_id).await.unwrap(), first);
        db_tx.commit().await.unwrap();
    }
}
