//! Expense splits.
//!
//! An [`ExpenseSplit`] is one participant's owed share of an expense. After
//! creation it only changes through settlement (see
//! [`SettlementTracker`](crate::SettlementTracker)).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Currency, EngineError, Money, SplitShare, SplitType, util::parse_uuid};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseSplit {
    pub id: Uuid,
    pub expense_id: Uuid,
    pub user_id: String,
    pub split_type: SplitType,
    pub share_amount: Decimal,
    pub currency: Currency,
    pub settled: bool,
    pub settled_at: Option<DateTime<Utc>>,
    pub settled_by: Option<String>,
}

impl ExpenseSplit {
    /// Builds an unsettled split from a computed share.
    pub fn new(expense_id: Uuid, split_type: SplitType, currency: Currency, share: SplitShare) -> Self {
        Self {
            id: Uuid::new_v4(),
            expense_id,
            user_id: share.participant_id,
            split_type,
            share_amount: share.share,
            currency,
            settled: false,
            settled_at: None,
            settled_by: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "expense_splits")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub expense_id: String,
    pub user_id: String,
    pub split_type: String,
    pub share_minor: i64,
    pub currency: String,
    pub settled: bool,
    pub settled_at: Option<DateTimeUtc>,
    pub settled_by: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::expenses::Entity",
        from = "Column::ExpenseId",
        to = "super::expenses::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Expenses,
}

impl Related<super::expenses::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Expenses.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<&ExpenseSplit> for ActiveModel {
    type Error = EngineError;

    fn try_from(split: &ExpenseSplit) -> Result<Self, Self::Error> {
        let share = Money::from_decimal(split.share_amount, split.currency)?;
        Ok(Self {
            id: ActiveValue::Set(split.id.to_string()),
            expense_id: ActiveValue::Set(split.expense_id.to_string()),
            user_id: ActiveValue::Set(split.user_id.clone()),
            split_type: ActiveValue::Set(split.split_type.as_str().to_string()),
            share_minor: ActiveValue::Set(share.minor()),
            currency: ActiveValue::Set(split.currency.code().to_string()),
            settled: ActiveValue::Set(split.settled),
            settled_at: ActiveValue::Set(split.settled_at),
            settled_by: ActiveValue::Set(split.settled_by.clone()),
        })
    }
}

impl TryFrom<Model> for ExpenseSplit {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let currency = Currency::try_from(model.currency.as_str())?;
        Ok(Self {
            id: parse_uuid(&model.id, "split")?,
            expense_id: parse_uuid(&model.expense_id, "expense")?,
            user_id: model.user_id,
            split_type: SplitType::try_from(model.split_type.as_str())?,
            share_amount: Money::from_minor(model.share_minor, currency).to_decimal(),
            currency,
            settled: model.settled,
            settled_at: model.settled_at,
            settled_by: model.settled_by,
        })
    }
}
