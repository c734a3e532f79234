use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a trial ended before the go-cue was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EarlyKind {
    /// Bar released before the target dimmed (or faster than the minimum RT).
    PreTarget,
    /// Gaze left the fixation window.
    FixBreak,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AbortKind {
    User,
    /// Unexpected failure inside the trial body.
    Fault,
}

/// Authoritative classification of a finished trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Correct,
    EarlyRelease(EarlyKind),
    MaxRtExceeded,
    Uninitiated,
    UserAbort(AbortKind),
}

impl Outcome {
    /// Single-letter code consumed by downstream analysis. Must not change.
    pub fn code(&self) -> char {
        match self {
            Outcome::Correct => 'C',
            Outcome::EarlyRelease(_) => 'E',
            Outcome::MaxRtExceeded => 'M',
            Outcome::Uninitiated => 'U',
            Outcome::UserAbort(_) => 'A',
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Outcome::Correct => "Correct",
            Outcome::EarlyRelease(_) => "EarlyRelease",
            Outcome::MaxRtExceeded => "MaxRTExceeded",
            Outcome::Uninitiated => "UninitiatedTrial",
            Outcome::UserAbort(_) => "UserAbort",
        }
    }

    /// Human-readable qualifier; empty when the variant has none.
    pub fn sub_tag(&self) -> &'static str {
        match self {
            Outcome::EarlyRelease(EarlyKind::PreTarget) => "PreTarget",
            Outcome::EarlyRelease(EarlyKind::FixBreak) => "FixBreak",
            Outcome::UserAbort(AbortKind::Fault) => "Fault",
            _ => "",
        }
    }

    pub fn is_correct(&self) -> bool {
        matches!(self, Outcome::Correct)
    }

    /// Outcomes that earn the error signal, the penalty timeout and a
    /// repeat of the hold time.
    pub fn is_error(&self) -> bool {
        matches!(self, Outcome::EarlyRelease(_) | Outcome::MaxRtExceeded)
    }

    pub fn is_abort(&self) -> bool {
        matches!(self, Outcome::UserAbort(_))
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sub = self.sub_tag();
        if sub.is_empty() {
            write!(f, "{} {}", self.code(), self.name())
        } else {
            write!(f, "{} {} {}", self.code(), self.name(), sub)
        }
    }
}
