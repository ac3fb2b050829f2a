use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveValue, DatabaseTransaction, QueryFilter, QueryOrder, TransactionTrait, prelude::*,
};
use uuid::Uuid;

use crate::{
    Currency, EngineError, Expense, ExpenseSplit, ExpenseStatus, Money, ResultEngine,
    SplitCalculator, SplitRequest, expense_splits, expenses,
    splits::validate_payer,
    util::{ensure_group_currency, normalize_optional_text, normalize_required_text},
};

use super::{Engine, with_tx};

/// Input of [`Engine::create_expense`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewExpense {
    pub group_id: String,
    pub description: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub category: Option<String>,
    pub paid_by: String,
    pub split: SplitRequest,
    pub created_at: DateTime<Utc>,
}

impl Engine {
    /// Creates a draft expense and all of its splits in one DB transaction.
    ///
    /// The acting user, the payer and every participant must be group
    /// members; the payer may be outside the participants (and the group)
    /// only when the engine allows external payers.
    pub async fn create_expense(&self, new: NewExpense, user_id: &str) -> ResultEngine<Expense> {
        with_tx!(self, |db_tx| {
            let (group, _) = self
                .require_group_member(&db_tx, &new.group_id, user_id)
                .await?;
            let group_currency = Currency::try_from(group.currency.as_str())?;
            ensure_group_currency(group_currency, new.currency)?;
            let description = normalize_required_text(&new.description, "description")?;
            self.require_participants(&db_tx, &new.group_id, &new.paid_by, &new.split)
                .await?;

            let mut expense = Expense {
                id: Uuid::new_v4(),
                group_id: new.group_id.clone(),
                description,
                amount: new.amount,
                currency: new.currency,
                category: normalize_optional_text(new.category.as_deref()),
                paid_by: new.paid_by.clone(),
                split_type: new.split.split_type(),
                status: ExpenseStatus::Draft,
                created_by: user_id.to_string(),
                created_at: new.created_at,
                splits: Vec::new(),
            };
            expense.splits = self.build_splits(&expense, &new.split)?;

            expenses::ActiveModel::try_from(&expense)?
                .insert(&db_tx)
                .await?;
            insert_splits(&db_tx, &expense.splits).await?;

            tracing::info!(
                expense_id = %expense.id,
                group_id = %expense.group_id,
                amount = %Money::from_decimal(expense.amount, expense.currency)?,
                splits = expense.splits.len(),
                "expense created"
            );
            Ok(expense)
        })
    }

    /// Returns an expense with its splits (members only).
    pub async fn expense(&self, expense_id: Uuid, user_id: &str) -> ResultEngine<Expense> {
        with_tx!(self, |db_tx| {
            let expense = load_expense(&db_tx, expense_id).await?;
            self.require_group_member(&db_tx, &expense.group_id, user_id)
                .await?;
            Ok(expense)
        })
    }

    /// Lists the expenses of a group, oldest first.
    pub async fn list_expenses(
        &self,
        group_id: &str,
        user_id: &str,
        include_cancelled: bool,
    ) -> ResultEngine<Vec<Expense>> {
        with_tx!(self, |db_tx| {
            self.require_group_member(&db_tx, group_id, user_id).await?;

            let mut query = expenses::Entity::find()
                .filter(expenses::Column::GroupId.eq(group_id.to_string()))
                .order_by_asc(expenses::Column::CreatedAt)
                .order_by_asc(expenses::Column::Id);
            if !include_cancelled {
                query = query.filter(
                    expenses::Column::Status.ne(ExpenseStatus::Cancelled.as_str().to_string()),
                );
            }

            let mut list = Vec::new();
            for model in query.all(&db_tx).await? {
                let mut expense = Expense::try_from(model)?;
                expense.splits = load_splits(&db_tx, expense.id).await?;
                list.push(expense);
            }
            Ok(list)
        })
    }

    /// Moves a draft expense to `Confirmed`. Its amount and splits are frozen
    /// from then on.
    pub async fn confirm_expense(&self, expense_id: Uuid, user_id: &str) -> ResultEngine<Expense> {
        self.transition_expense(expense_id, ExpenseStatus::Confirmed, user_id)
            .await
    }

    /// Cancels a draft or confirmed expense. Cancelled expenses no longer
    /// count towards balances and their splits cannot be settled.
    pub async fn cancel_expense(&self, expense_id: Uuid, user_id: &str) -> ResultEngine<Expense> {
        self.transition_expense(expense_id, ExpenseStatus::Cancelled, user_id)
            .await
    }

    async fn transition_expense(
        &self,
        expense_id: Uuid,
        next: ExpenseStatus,
        user_id: &str,
    ) -> ResultEngine<Expense> {
        with_tx!(self, |db_tx| {
            let mut expense = load_expense(&db_tx, expense_id).await?;
            self.require_expense_manager(&db_tx, &expense, user_id)
                .await?;
            expense.status = expense.status.transition(next)?;

            expenses::ActiveModel {
                id: ActiveValue::Set(expense.id.to_string()),
                status: ActiveValue::Set(expense.status.as_str().to_string()),
                ..Default::default()
            }
            .update(&db_tx)
            .await?;

            tracing::info!(
                expense_id = %expense.id,
                status = expense.status.as_str(),
                "expense status changed"
            );
            Ok(expense)
        })
    }

    /// Replaces the amount and every split of a draft expense.
    ///
    /// Fails with [`EngineError::InvalidStatus`] once the expense is confirmed
    /// or cancelled, or when one of its splits is already settled.
    pub async fn resplit_expense(
        &self,
        expense_id: Uuid,
        amount: Decimal,
        split: SplitRequest,
        user_id: &str,
    ) -> ResultEngine<Expense> {
        with_tx!(self, |db_tx| {
            let mut expense = load_expense(&db_tx, expense_id).await?;
            self.require_expense_manager(&db_tx, &expense, user_id)
                .await?;
            if expense.status != ExpenseStatus::Draft {
                return Err(EngineError::InvalidStatus(format!(
                    "expense is {}, only drafts can be re-split",
                    expense.status.as_str()
                )));
            }
            if expense.splits.iter().any(|s| s.settled) {
                return Err(EngineError::InvalidStatus(
                    "expense has settled splits".to_string(),
                ));
            }
            self.require_participants(&db_tx, &expense.group_id, &expense.paid_by, &split)
                .await?;

            expense.amount = amount;
            expense.split_type = split.split_type();
            expense.splits = self.build_splits(&expense, &split)?;

            expense_splits::Entity::delete_many()
                .filter(expense_splits::Column::ExpenseId.eq(expense_id.to_string()))
                .exec(&db_tx)
                .await?;
            let amount = Money::from_decimal(expense.amount, expense.currency)?;
            expenses::ActiveModel {
                id: ActiveValue::Set(expense.id.to_string()),
                amount_minor: ActiveValue::Set(amount.minor()),
                split_type: ActiveValue::Set(expense.split_type.as_str().to_string()),
                ..Default::default()
            }
            .update(&db_tx)
            .await?;
            insert_splits(&db_tx, &expense.splits).await?;

            tracing::info!(expense_id = %expense.id, amount = %amount, "expense re-split");
            Ok(expense)
        })
    }

    /// Deletes an expense together with its splits.
    pub async fn delete_expense(&self, expense_id: Uuid, user_id: &str) -> ResultEngine<()> {
        with_tx!(self, |db_tx| {
            let expense = load_expense(&db_tx, expense_id).await?;
            self.require_expense_manager(&db_tx, &expense, user_id)
                .await?;

            expense_splits::Entity::delete_many()
                .filter(expense_splits::Column::ExpenseId.eq(expense_id.to_string()))
                .exec(&db_tx)
                .await?;
            expenses::Entity::delete_by_id(expense_id.to_string())
                .exec(&db_tx)
                .await?;

            tracing::info!(expense_id = %expense_id, "expense deleted");
            Ok(())
        })
    }

    fn build_splits(
        &self,
        expense: &Expense,
        request: &SplitRequest,
    ) -> ResultEngine<Vec<ExpenseSplit>> {
        let calculator = SplitCalculator::for_currency(expense.currency, &self.currencies)?;
        let split_type = request.split_type();
        Ok(calculator
            .compute(expense.amount, request)?
            .into_iter()
            .map(|share| ExpenseSplit::new(expense.id, split_type, expense.currency, share))
            .collect())
    }

    /// Checks the payer and every participant against the group membership.
    async fn require_participants(
        &self,
        db: &DatabaseTransaction,
        group_id: &str,
        paid_by: &str,
        request: &SplitRequest,
    ) -> ResultEngine<()> {
        validate_payer(paid_by, &request.participants, self.allow_external_payer)?;
        if self.membership_role(db, group_id, paid_by).await?.is_none() {
            if !self.allow_external_payer {
                return Err(EngineError::Forbidden(format!(
                    "{paid_by} is not a member of the group"
                )));
            }
            self.require_user_exists(db, paid_by).await?;
        }
        for participant in &request.participants {
            if self.membership_role(db, group_id, participant).await?.is_none() {
                return Err(EngineError::Forbidden(format!(
                    "{participant} is not a member of the group"
                )));
            }
        }
        Ok(())
    }
}

pub(super) async fn load_expense(
    db: &DatabaseTransaction,
    expense_id: Uuid,
) -> ResultEngine<Expense> {
    let model = expenses::Entity::find_by_id(expense_id.to_string())
        .one(db)
        .await?
        .ok_or_else(|| EngineError::KeyNotFound("expense not exists".to_string()))?;
    let mut expense = Expense::try_from(model)?;
    expense.splits = load_splits(db, expense_id).await?;
    Ok(expense)
}

pub(super) async fn load_splits(
    db: &DatabaseTransaction,
    expense_id: Uuid,
) -> ResultEngine<Vec<ExpenseSplit>> {
    expense_splits::Entity::find()
        .filter(expense_splits::Column::ExpenseId.eq(expense_id.to_string()))
        .order_by_asc(expense_splits::Column::UserId)
        .all(db)
        .await?
        .into_iter()
        .map(ExpenseSplit::try_from)
        .collect()
}

async fn insert_splits(db: &DatabaseTransaction, splits: &[ExpenseSplit]) -> ResultEngine<()> {
    for split in splits {
        expense_splits::ActiveModel::try_from(split)?
            .insert(db)
            .await?;
    }
    Ok(())
}
