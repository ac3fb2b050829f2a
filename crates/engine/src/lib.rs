//! Shared-expense engine.
//!
//! Splits expense amounts among group members with exact decimal arithmetic
//! and tracks the settlement of every split. The pure parts
//! ([`SplitCalculator`], [`SettlementTracker`]) can be used on their own;
//! [`Engine`] persists expenses and splits through sea-orm.

pub use currency::{Currency, CurrencySupport};
pub use error::EngineError;
pub use expense_splits::ExpenseSplit;
pub use expenses::{Expense, ExpenseStatus};
pub use money::{Money, parse_amount};
pub use ops::{Engine, EngineBuilder, GroupBalances, MemberBalance, NewExpense};
pub use settlement::{SettlementState, SettlementTracker};
pub use splits::{
    SplitCalculator, SplitRequest, SplitShare, SplitStrategy, SplitType, validate_payer,
};

mod currency;
mod error;
mod expense_splits;
mod expenses;
mod group_members;
mod groups;
mod money;
mod ops;
mod settlement;
mod splits;
mod users;
mod util;

type ResultEngine<T> = Result<T, EngineError>;
