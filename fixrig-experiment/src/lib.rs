pub mod config;
pub mod hardware;
pub mod interrupt;
pub mod monitor;
pub mod reward;
pub mod rig;
pub mod run;
pub mod sim;
pub mod task;
pub mod trial;
pub use config::{CommonParams, ConfigError, FixationGrid, RunConfig, RunLimits, Settings};
pub use hardware::{
    BarSource, Display, EventSink, GazeSource, Hardware, JsonLinesSink, Juicer, NullEvents,
    NullSpeaker, RecordSink, Speaker,
};
pub use interrupt::{Delivered, InterruptClass, InterruptLatch, InterruptSource};
pub use monitor::{GazeWindow, ResponseBar};
pub use reward::reward_duration;
pub use rig::{DeadlineAction, FrameHook, Raised, Rig};
pub use run::{GridSchedule, RunController, RunError, RunHandle, RunStatistics, RunSummary, StopReason};
pub use task::{FixationTask, Task};
pub use trial::run_trial;
