pub mod clock;
pub mod deadline;
pub mod frames;
pub mod timer;

pub use clock::{high_precision_sleep, Clock, HighPrecisionClock, SimClock};
pub use deadline::DeadlineQueue;
pub use frames::{CalibrationStats, FlipLog};
pub use timer::Timer;
