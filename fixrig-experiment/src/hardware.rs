//! Contracts of the collaborators the trial logic drives but does not own:
//! acquisition, display, reward solenoid, speaker and the output streams.

use crate::monitor::ResponseBar;
use fixrig_core::{GazeSample, Rgba, Sprite, TrialRecord};
use serde_json::to_writer;
use std::io::Write;

pub trait GazeSource {
    /// Latest gaze sample. `now_ms` is the trial clock, for sources that
    /// have no clock of their own.
    fn sample(&mut self, now_ms: u64) -> Option<GazeSample>;
}

/// Raw state of the response bar, before polarity correction.
pub trait BarSource: Send + Sync {
    fn raw_down(&self) -> bool;
}

pub trait Juicer {
    /// Fire-and-forget solenoid opening.
    fn deliver(&mut self, duration_ms: u64);
}

pub trait Speaker {
    fn beep(&mut self) {}
}

pub trait Display {
    fn show(&mut self, id: &'static str, sprite: Sprite);
    fn hide(&mut self, id: &'static str);
    /// Removes every sprite.
    fn clear(&mut self);
    fn sprite_count(&self) -> usize;
    fn set_background(&mut self, color: Rgba);
    /// Presents the frame; returns the time the flip actually happens,
    /// never earlier than `now_ms`.
    fn flip(&mut self, now_ms: u64) -> u64;
}

/// Digital event encoder stream (the acquisition layer's strobe port).
pub trait EventSink {
    fn encode(&mut self, code: usize, tag: &str, t_ms: u64);
}

pub trait RecordSink {
    fn write(&mut self, record: &TrialRecord) -> anyhow::Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullSpeaker;

impl Speaker for NullSpeaker {}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullEvents;

impl EventSink for NullEvents {
    fn encode(&mut self, _code: usize, _tag: &str, _t_ms: u64) {}
}

/// One JSON document per line.
pub struct JsonLinesSink<W: Write> {
    out: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> RecordSink for JsonLinesSink<W> {
    fn write(&mut self, record: &TrialRecord) -> anyhow::Result<()> {
        to_writer(&mut self.out, record)?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        Ok(())
    }
}

/// Everything a rig is wired to.
pub struct Hardware {
    pub gaze: Box<dyn GazeSource>,
    pub bar: ResponseBar,
    pub juicer: Box<dyn Juicer>,
    pub display: Box<dyn Display>,
    pub speaker: Box<dyn Speaker>,
    pub events: Box<dyn EventSink>,
}
