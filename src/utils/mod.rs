pub mod clock;
pub mod formatting;
pub mod path;
pub mod table;
pub mod time;

pub use clock::{Clock, ManualClock, SystemClock};
