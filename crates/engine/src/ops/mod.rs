use sea_orm::DatabaseConnection;

use crate::{CurrencySupport, ResultEngine, SettlementTracker};

mod access;
mod balances;
mod expenses;
mod settlements;

pub use balances::{GroupBalances, MemberBalance};
pub use expenses::NewExpense;

/// Run a block inside a DB transaction, committing on success and rolling back on error.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let $tx = $self.database.begin().await?;
        let result = $body;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }};
}

pub(crate) use with_tx;

#[derive(Debug)]
pub struct Engine {
    database: DatabaseConnection,
    currencies: CurrencySupport,
    settlement: SettlementTracker,
    allow_external_payer: bool,
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn settlement_tracker(&self) -> SettlementTracker {
        self.settlement
    }
}

/// The builder for `Engine`
#[derive(Default)]
pub struct EngineBuilder {
    database: DatabaseConnection,
    currencies: CurrencySupport,
    strict_settlement: bool,
    allow_external_payer: bool,
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    /// Currencies accepted besides the two-decimal ones.
    pub fn currencies(mut self, currencies: CurrencySupport) -> EngineBuilder {
        self.currencies = currencies;
        self
    }

    /// Reject a settlement by a different user once a split is settled.
    pub fn strict_settlement(mut self, strict: bool) -> EngineBuilder {
        self.strict_settlement = strict;
        self
    }

    /// Allow expenses whose payer is not among the participants.
    pub fn allow_external_payer(mut self, allow: bool) -> EngineBuilder {
        self.allow_external_payer = allow;
        self
    }

    /// Construct `Engine`
    pub async fn build(self) -> ResultEngine<Engine> {
        Ok(Engine {
            database: self.database,
            currencies: self.currencies,
            settlement: SettlementTracker::new(self.strict_settlement),
            allow_external_payer: self.allow_external_payer,
        })
    }
}
