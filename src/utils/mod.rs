pub mod random;
pub mod time;

pub use random::{Chooser, RandomChooser};
pub use time::start_of_day;
