/// Phases a trial moves through, in order.
#[derive(Copy, Debug, Clone, PartialEq, Eq, Default)]
pub enum TrialPhase {
    #[default]
    Iti,
    WaitFixation,
    FixatingGrace,
    ResponseWindow,
    Outcome,
    Cleanup,
}

impl TrialPhase {
    /// Nominal successor when nothing goes wrong.
    pub fn next(&self) -> Option<Self> {
        use TrialPhase::*;
        Some(match self {
            Iti => WaitFixation,
            WaitFixation => FixatingGrace,
            FixatingGrace => ResponseWindow,
            ResponseWindow => Outcome,
            Outcome => Cleanup,
            Cleanup => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrialPhase::Iti => "iti",
            TrialPhase::WaitFixation => "wait_fixation",
            TrialPhase::FixatingGrace => "fixating_grace",
            TrialPhase::ResponseWindow => "response_window",
            TrialPhase::Outcome => "outcome",
            TrialPhase::Cleanup => "cleanup",
        }
    }
}
