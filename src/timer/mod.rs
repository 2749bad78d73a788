pub mod driver;
pub mod queue;

pub use driver::{ChurnTracker, Deadline, TimerEvent, Timers};
pub use queue::{Fired, TimerId, TimerKind, TimerQueue};
