use sea_orm::DbErr;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Period end must be after period start")]
    InvalidRange,

    #[error("Period {boundary} falls inside existing period '{existing}'")]
    OverlapsExistingPeriod {
        boundary: &'static str,
        existing: String,
    },

    #[error("Period encompasses existing period '{existing}'")]
    EncompassesExistingPeriod { existing: String },

    #[error("A period named '{0}' already exists")]
    DuplicatePeriodName(String),

    #[error("Period {0} is referenced by claims and can no longer change")]
    PeriodInUse(i32),

    #[error("No chances remaining")]
    NoChancesRemaining,

    #[error("Corrupt chance state: {0}")]
    CorruptChanceState(String),

    #[error("This prize has already been claimed by this participant")]
    AlreadyClaimed,

    #[error("All units of this prize have been claimed")]
    AllClaimed,

    #[error("Claim {0} was not confirmed in time")]
    ClaimExpired(i32),

    #[error("Prize {prize_id} is not offered in period {period_id}")]
    NotAvailableInPeriod { prize_id: i32, period_id: i32 },

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("JSON serialization/deserialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl AppError {
    /// Stable machine readable code for presentation layers.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidRange => "INVALID_RANGE",
            AppError::OverlapsExistingPeriod { .. } => "OVERLAPS_EXISTING_PERIOD",
            AppError::EncompassesExistingPeriod { .. } => "ENCOMPASSES_EXISTING_PERIOD",
            AppError::DuplicatePeriodName(_) => "DUPLICATE_PERIOD_NAME",
            AppError::PeriodInUse(_) => "PERIOD_IN_USE",
            AppError::NoChancesRemaining => "NO_CHANCES_REMAINING",
            AppError::CorruptChanceState(_) => "CORRUPT_CHANCE_STATE",
            AppError::AlreadyClaimed => "ALREADY_CLAIMED",
            AppError::AllClaimed => "ALL_CLAIMED",
            AppError::ClaimExpired(_) => "CLAIM_EXPIRED",
            AppError::NotAvailableInPeriod { .. } => "NOT_AVAILABLE_IN_PERIOD",
            AppError::ConcurrentModification(_) => "CONCURRENT_MODIFICATION",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::SerdeJsonError(_) => "SERIALIZATION_ERROR",
            AppError::ConfigError(_) => "CONFIG_ERROR",
            AppError::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    /// Errors `get_and_claim_random` answers with a fresh random pick.
    pub fn is_retryable_pick(&self) -> bool {
        matches!(self, AppError::AllClaimed | AppError::AlreadyClaimed)
    }

    /// Infrastructure failures whose outcome the caller should re-query before retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::DatabaseError(_) | AppError::ConcurrentModification(_)
        )
    }
}
