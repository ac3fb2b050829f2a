//! Split primitives.
//!
//! A [`SplitRequest`] describes how an expense amount is divided among its
//! participants; the [`SplitCalculator`] turns it into one [`SplitShare`] per
//! participant.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::EngineError;

mod calculator;

pub use calculator::{SplitCalculator, validate_payer};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SplitType {
    Equal,
    Custom,
    Percentage,
    Share,
}

impl SplitType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Equal => "equal",
            Self::Custom => "custom",
            Self::Percentage => "percentage",
            Self::Share => "share",
        }
    }
}

impl TryFrom<&str> for SplitType {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "equal" => Ok(Self::Equal),
            "custom" => Ok(Self::Custom),
            "percentage" => Ok(Self::Percentage),
            "share" => Ok(Self::Share),
            other => Err(EngineError::InvalidSplit(format!(
                "invalid split type: {other}"
            ))),
        }
    }
}

/// Strategy used to divide an amount, with its strategy-specific weights keyed
/// by participant id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "weights", rename_all = "snake_case")]
pub enum SplitStrategy {
    Equal,
    /// Explicit amounts; they must add up to the expense amount.
    Custom(BTreeMap<String, Decimal>),
    /// Percentages; they must add up to exactly 100.
    Percentage(BTreeMap<String, Decimal>),
    /// Positive integer share counts.
    Share(BTreeMap<String, u32>),
}

impl SplitStrategy {
    pub fn split_type(&self) -> SplitType {
        match self {
            Self::Equal => SplitType::Equal,
            Self::Custom(_) => SplitType::Custom,
            Self::Percentage(_) => SplitType::Percentage,
            Self::Share(_) => SplitType::Share,
        }
    }
}

/// Transient input consumed when an expense is created or re-split.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitRequest {
    pub participants: Vec<String>,
    pub strategy: SplitStrategy,
}

impl SplitRequest {
    pub fn new(participants: Vec<String>, strategy: SplitStrategy) -> Self {
        Self {
            participants,
            strategy,
        }
    }

    /// Equal split among `participants`.
    pub fn equal<I, S>(participants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            participants.into_iter().map(Into::into).collect(),
            SplitStrategy::Equal,
        )
    }

    /// Custom split where participants are the keys of `amounts`.
    pub fn custom(amounts: BTreeMap<String, Decimal>) -> Self {
        Self::new(
            amounts.keys().cloned().collect(),
            SplitStrategy::Custom(amounts),
        )
    }

    /// Percentage split where participants are the keys of `percentages`.
    pub fn percentage(percentages: BTreeMap<String, Decimal>) -> Self {
        Self::new(
            percentages.keys().cloned().collect(),
            SplitStrategy::Percentage(percentages),
        )
    }

    /// Share-weighted split where participants are the keys of `shares`.
    pub fn share(shares: BTreeMap<String, u32>) -> Self {
        Self::new(shares.keys().cloned().collect(), SplitStrategy::Share(shares))
    }

    pub fn split_type(&self) -> SplitType {
        self.strategy.split_type()
    }
}

/// A participant's owed share of an expense.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitShare {
    pub participant_id: String,
    pub share: Decimal,
}
