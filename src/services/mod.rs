pub mod claim_service;
pub mod participant_service;
pub mod prize_service;
pub mod time_period_service;

pub use claim_service::*;
pub use participant_service::*;
pub use prize_service::*;
pub use time_period_service::*;
