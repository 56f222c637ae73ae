pub mod claim;
pub mod pagination;
pub mod participant;
pub mod policy;
pub mod prize;
pub mod time_period;

pub use claim::*;
pub use pagination::*;
pub use participant::*;
pub use policy::*;
pub use prize::*;
pub use time_period::*;
