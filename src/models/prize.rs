use serde::{Deserialize, Serialize};

use crate::entities::prize_entity as prizes;
use crate::entities::prizes::UNLIMITED_UNITS;
use crate::error::{AppError, AppResult};

/// Units of a prize still claimable in one period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "units", rename_all = "snake_case")]
pub enum UnitsLeft {
    Unlimited,
    Limited(i64),
}

impl UnitsLeft {
    /// `counted` is the number of claims still holding a unit.
    pub fn compute(prize: &prizes::Model, counted: u64) -> Self {
        if prize.is_unlimited() {
            UnitsLeft::Unlimited
        } else {
            let counted = i64::try_from(counted).unwrap_or(i64::MAX);
            UnitsLeft::Limited(i64::from(prize.total_units).saturating_sub(counted))
        }
    }

    /// Negative counts happen when the total was lowered below existing claims.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, UnitsLeft::Limited(n) if *n <= 0)
    }
}

/// Prize creation request
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NewPrize {
    pub description: String,
    /// Units per time period, -1 = unlimited
    pub total_units: i32,
}

impl NewPrize {
    pub fn limited(description: impl Into<String>, total_units: i32) -> Self {
        Self {
            description: description.into(),
            total_units,
        }
    }

    pub fn unlimited(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            total_units: UNLIMITED_UNITS,
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.description.trim().is_empty() {
            return Err(AppError::ValidationError(
                "Prize description must not be empty".into(),
            ));
        }
        if self.description.chars().count() > 255 {
            return Err(AppError::ValidationError(
                "Prize description is limited to 255 characters".into(),
            ));
        }
        if self.total_units < UNLIMITED_UNITS {
            return Err(AppError::ValidationError(format!(
                "total_units must be -1 (unlimited) or non-negative, got {}",
                self.total_units
            )));
        }
        Ok(())
    }
}

/// Availability snapshot of one prize in one period
#[derive(Debug, Clone, Serialize)]
pub struct PrizeAvailabilityView {
    pub prize_id: i32,
    pub description: String,
    pub total_units: i32,
    pub units_left: UnitsLeft,
    /// Exhaustion flag as persisted
    pub all_claimed: bool,
}
