pub mod claims;
pub mod participants;
pub mod prize_availability;
pub mod prizes;
pub mod time_periods;

pub use claims as claim_entity;
pub use participants as participant_entity;
pub use prize_availability as prize_availability_entity;
pub use prizes as prize_entity;
pub use time_periods as time_period_entity;
