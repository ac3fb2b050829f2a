//! Expense primitives.
//!
//! An [`Expense`] is paid by one user for a group and divided among
//! participants via [`ExpenseSplit`](crate::ExpenseSplit)s.
//!
//! The amount is stored as integer **minor units** of the expense currency.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    Currency, EngineError, ExpenseSplit, Money, ResultEngine, SplitType, util::parse_uuid,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExpenseStatus {
    Draft,
    Confirmed,
    Cancelled,
}

impl ExpenseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Allowed transitions: `Draft -> Confirmed`, `Draft -> Cancelled`,
    /// `Confirmed -> Cancelled`.
    #[must_use]
    pub fn can_transition_to(self, next: ExpenseStatus) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::Confirmed)
                | (Self::Draft, Self::Cancelled)
                | (Self::Confirmed, Self::Cancelled)
        )
    }

    /// Checks the transition, returning the new status.
    pub fn transition(self, next: ExpenseStatus) -> ResultEngine<ExpenseStatus> {
        if !self.can_transition_to(next) {
            return Err(EngineError::InvalidStatus(format!(
                "cannot move expense from {} to {}",
                self.as_str(),
                next.as_str()
            )));
        }
        Ok(next)
    }
}

impl TryFrom<&str> for ExpenseStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "draft" => Ok(Self::Draft),
            "confirmed" => Ok(Self::Confirmed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(EngineError::InvalidStatus(format!(
                "invalid expense status: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    pub id: Uuid,
    pub group_id: String,
    pub description: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub category: Option<String>,
    pub paid_by: String,
    pub split_type: SplitType,
    pub status: ExpenseStatus,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub splits: Vec<ExpenseSplit>,
}

impl Expense {
    /// Sum of the owed shares of all loaded splits.
    pub fn split_total(&self) -> Decimal {
        self.splits.iter().map(|s| s.share_amount).sum()
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "expenses")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub group_id: String,
    pub description: String,
    pub amount_minor: i64,
    pub currency: String,
    pub category: Option<String>,
    pub paid_by: String,
    pub split_type: String,
    pub status: String,
    pub created_by: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::groups::Entity",
        from = "Column::GroupId",
        to = "super::groups::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Groups,
    #[sea_orm(has_many = "super::expense_splits::Entity")]
    ExpenseSplits,
}

impl Related<super::groups::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Groups.def()
    }
}

impl Related<super::expense_splits::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ExpenseSplits.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<&Expense> for ActiveModel {
    type Error = EngineError;

    fn try_from(expense: &Expense) -> Result<Self, Self::Error> {
        let amount = Money::from_decimal(expense.amount, expense.currency)?;
        Ok(Self {
            id: ActiveValue::Set(expense.id.to_string()),
            group_id: ActiveValue::Set(expense.group_id.clone()),
            description: ActiveValue::Set(expense.description.clone()),
            amount_minor: ActiveValue::Set(amount.minor()),
            currency: ActiveValue::Set(expense.currency.code().to_string()),
            category: ActiveValue::Set(expense.category.clone()),
            paid_by: ActiveValue::Set(expense.paid_by.clone()),
            split_type: ActiveValue::Set(expense.split_type.as_str().to_string()),
            status: ActiveValue::Set(expense.status.as_str().to_string()),
            created_by: ActiveValue::Set(expense.created_by.clone()),
            created_at: ActiveValue::Set(expense.created_at),
        })
    }
}

impl TryFrom<Model> for Expense {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let currency = Currency::try_from(model.currency.as_str())?;
        Ok(Self {
            id: parse_uuid(&model.id, "expense")?,
            group_id: model.group_id,
            description: model.description,
            amount: Money::from_minor(model.amount_minor, currency).to_decimal(),
            currency,
            category: model.category,
            paid_by: model.paid_by,
            split_type: SplitType::try_from(model.split_type.as_str())?,
            status: ExpenseStatus::try_from(model.status.as_str())?,
            created_by: model.created_by,
            created_at: model.created_at,
            splits: Vec::new(),
        })
    }
}
