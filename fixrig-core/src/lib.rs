pub mod outcome;
pub mod params;
pub mod phase;
pub mod record;
pub mod stimulus;

pub use outcome::{AbortKind, EarlyKind, Outcome};
pub use params::TrialParameters;
pub use phase::TrialPhase;
pub use record::{tags, Event, GazeSample, TrialRecord};
pub use stimulus::{Rgba, Shape, Sprite, FIX_SPOT};
