//! A scripted subject and recording doubles for the rig's collaborators,
//! so complete trials can run without hardware.
//!
//! The subject reacts to the event tags the trial strobes out and is
//! advanced by gaze sampling, which the rig does on every idle tick before
//! it looks at the bar.

use crate::hardware::{BarSource, Display, EventSink, GazeSource, Hardware, Juicer, RecordSink, Speaker};
use crate::monitor::ResponseBar;
use fixrig_core::{tags, GazeSample, Rgba, Sprite, TrialRecord, FIX_SPOT};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Where the subject looks when not fixating.
pub const AWAY: (f32, f32) = (1000.0, 1000.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// Release the bar this long after the target dims.
    AfterDim(u64),
    /// Release this long after the response window opens, dim or not.
    AfterWindowOpen(u64),
    Never,
}

/// A brief look away shortly after first reaching the fixation spot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Glance {
    pub after_entry_ms: u64,
    pub away_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Behavior {
    /// Looks at the fixation spot at all.
    pub fixates: bool,
    /// Saccade latency from fixation spot onset.
    pub gaze_latency_ms: u64,
    /// Holds the bar in the start state from the beginning of the trial.
    pub holds_bar: bool,
    pub response: Response,
    /// Looks away this long after fixation is acquired.
    pub break_after_acquired_ms: Option<u64>,
    pub glance: Option<Glance>,
    /// Start state of the bar the subject is trained on.
    pub resp_down: bool,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            fixates: true,
            gaze_latency_ms: 150,
            holds_bar: true,
            response: Response::AfterDim(250),
            break_after_acquired_ms: None,
            glance: None,
            resp_down: true,
        }
    }
}

impl Behavior {
    pub fn correct(rt_ms: u64) -> Self {
        Self {
            response: Response::AfterDim(rt_ms),
            ..Self::default()
        }
    }

    pub fn never_fixates() -> Self {
        Self {
            fixates: false,
            ..Self::default()
        }
    }

    pub fn never_responds() -> Self {
        Self {
            response: Response::Never,
            ..Self::default()
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Marks {
    fix_on: Option<u64>,
    acquired: Option<u64>,
    window_open: Option<u64>,
    dim: Option<u64>,
}

#[derive(Debug)]
struct SubjectState {
    behavior: Behavior,
    target: (f32, f32),
    marks: Marks,
    released: bool,
    strobes: Vec<(usize, String, u64)>,
    samples: usize,
}

impl SubjectState {
    fn gaze_at(&self, now: u64) -> (f32, f32) {
        let b = &self.behavior;
        let Some(fix_on) = self.marks.fix_on else {
            return AWAY;
        };
        let entry = fix_on + b.gaze_latency_ms;
        if !b.fixates || now < entry {
            return AWAY;
        }
        if let Some(g) = b.glance {
            let leave = entry + g.after_entry_ms;
            if (leave..leave + g.away_ms).contains(&now) {
                return AWAY;
            }
        }
        if let (Some(acquired), Some(after)) = (self.marks.acquired, b.break_after_acquired_ms) {
            if now >= acquired + after {
                return AWAY;
            }
        }
        self.target
    }

    fn update_bar(&mut self, now: u64) {
        let release_at = match self.behavior.response {
            Response::AfterDim(rt) => self.marks.dim.map(|t| t + rt),
            Response::AfterWindowOpen(after) => self.marks.window_open.map(|t| t + after),
            Response::Never => None,
        };
        if release_at.is_some_and(|t| now >= t) {
            self.released = true;
        }
    }

    fn bar_down(&self) -> bool {
        let holding = self.behavior.holds_bar && !self.released;
        if holding {
            self.behavior.resp_down
        } else {
            !self.behavior.resp_down
        }
    }
}

/// Scripted subject. Clones share state, so one clone can be the gaze
/// source, one the bar, one the event sink, and the test keeps another.
#[derive(Debug, Clone)]
pub struct SimSubject {
    state: Arc<Mutex<SubjectState>>,
}

impl SimSubject {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            state: Arc::new(Mutex::new(SubjectState {
                behavior,
                target: (0.0, 0.0),
                marks: Marks::default(),
                released: false,
                strobes: Vec::new(),
                samples: 0,
            })),
        }
    }

    /// Takes effect from the next trial start.
    pub fn set_behavior(&self, behavior: Behavior) {
        self.state.lock().behavior = behavior;
    }

    pub fn behavior(&self) -> Behavior {
        self.state.lock().behavior.clone()
    }

    /// Where the subject will look when fixating.
    pub fn look_at(&self, target: (f32, f32)) {
        self.state.lock().target = target;
    }

    /// Every `(code, tag, t_ms)` strobed out so far.
    pub fn strobes(&self) -> Vec<(usize, String, u64)> {
        self.state.lock().strobes.clone()
    }

    pub fn samples_taken(&self) -> usize {
        self.state.lock().samples
    }

    /// Wires the subject and the given doubles into rig hardware.
    pub fn hardware<D, J, S>(&self, display: D, juicer: J, speaker: S) -> Hardware
    where
        D: Display + 'static,
        J: Juicer + 'static,
        S: Speaker + 'static,
    {
        Hardware {
            gaze: Box::new(self.clone()),
            bar: ResponseBar::new(Box::new(self.clone())),
            juicer: Box::new(juicer),
            display: Box::new(Watched::new(display, self.clone())),
            speaker: Box::new(speaker),
            events: Box::new(self.clone()),
        }
    }
}

impl GazeSource for SimSubject {
    fn sample(&mut self, now_ms: u64) -> Option<GazeSample> {
        let mut state = self.state.lock();
        state.samples += 1;
        state.update_bar(now_ms);
        let (x, y) = state.gaze_at(now_ms);
        Some(GazeSample { t_ms: now_ms, x, y })
    }
}

impl BarSource for SimSubject {
    fn raw_down(&self) -> bool {
        self.state.lock().bar_down()
    }
}

impl EventSink for SimSubject {
    fn encode(&mut self, code: usize, tag: &str, t_ms: u64) {
        let mut state = self.state.lock();
        state.strobes.push((code, tag.to_string(), t_ms));
        match tag {
            tags::TRIAL_START => {
                state.marks = Marks::default();
                state.released = false;
            }
            tags::FIX_ON => state.marks.fix_on = Some(t_ms),
            tags::FIX_ACQUIRED => state.marks.acquired = Some(t_ms),
            tags::WINDOW_OPEN => state.marks.window_open = Some(t_ms),
            tags::DIM => state.marks.dim = Some(t_ms),
            _ => {}
        }
    }
}

/// Display wrapper that lets the subject see where the fixation spot is.
pub struct Watched<D> {
    inner: D,
    subject: SimSubject,
}

impl<D: Display> Watched<D> {
    pub fn new(inner: D, subject: SimSubject) -> Self {
        Self { inner, subject }
    }
}

impl<D: Display> Display for Watched<D> {
    fn show(&mut self, id: &'static str, sprite: Sprite) {
        if id == FIX_SPOT {
            self.subject.look_at(sprite.pos);
        }
        self.inner.show(id, sprite);
    }

    fn hide(&mut self, id: &'static str) {
        self.inner.hide(id);
    }

    fn clear(&mut self) {
        self.inner.clear();
    }

    fn sprite_count(&self) -> usize {
        self.inner.sprite_count()
    }

    fn set_background(&mut self, color: Rgba) {
        self.inner.set_background(color);
    }

    fn flip(&mut self, now_ms: u64) -> u64 {
        self.inner.flip(now_ms)
    }
}

#[derive(Debug, Default)]
struct Screen {
    sprites: BTreeMap<&'static str, Sprite>,
    background: Rgba,
    flips: Vec<u64>,
    backgrounds: Vec<Rgba>,
}

/// In-memory display. Flips land on the next frame boundary of a fixed
/// refresh period. Clones share the same screen.
#[derive(Debug, Clone)]
pub struct RecordingDisplay {
    screen: Arc<Mutex<Screen>>,
    frame_ms: u64,
}

impl RecordingDisplay {
    /// `frame_ms == 0` flips immediately.
    pub fn new(frame_ms: u64) -> Self {
        Self {
            screen: Arc::default(),
            frame_ms,
        }
    }

    pub fn sprites(&self) -> Vec<(&'static str, Sprite)> {
        self.screen.lock().sprites.iter().map(|(k, v)| (*k, *v)).collect()
    }

    pub fn sprite(&self, id: &str) -> Option<Sprite> {
        self.screen.lock().sprites.get(id).copied()
    }

    pub fn background(&self) -> Rgba {
        self.screen.lock().background
    }

    /// Every background colour set, in order.
    pub fn backgrounds(&self) -> Vec<Rgba> {
        self.screen.lock().backgrounds.clone()
    }

    pub fn flips(&self) -> Vec<u64> {
        self.screen.lock().flips.clone()
    }
}

impl Display for RecordingDisplay {
    fn show(&mut self, id: &'static str, sprite: Sprite) {
        self.screen.lock().sprites.insert(id, sprite);
    }

    fn hide(&mut self, id: &'static str) {
        self.screen.lock().sprites.remove(id);
    }

    fn clear(&mut self) {
        self.screen.lock().sprites.clear();
    }

    fn sprite_count(&self) -> usize {
        self.screen.lock().sprites.len()
    }

    fn set_background(&mut self, color: Rgba) {
        let mut screen = self.screen.lock();
        screen.background = color;
        screen.backgrounds.push(color);
    }

    fn flip(&mut self, now_ms: u64) -> u64 {
        let t = match self.frame_ms {
            0 => now_ms,
            frame => now_ms.div_ceil(frame) * frame,
        };
        self.screen.lock().flips.push(t);
        t
    }
}

/// Solenoid double: remembers every opening.
#[derive(Debug, Clone, Default)]
pub struct RecordingJuicer {
    deliveries: Arc<Mutex<Vec<u64>>>,
}

impl RecordingJuicer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliveries(&self) -> Vec<u64> {
        self.deliveries.lock().clone()
    }
}

impl Juicer for RecordingJuicer {
    fn deliver(&mut self, duration_ms: u64) {
        self.deliveries.lock().push(duration_ms);
    }
}

#[derive(Debug, Clone, Default)]
pub struct CountingSpeaker {
    beeps: Arc<Mutex<usize>>,
}

impl CountingSpeaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn beeps(&self) -> usize {
        *self.beeps.lock()
    }
}

impl Speaker for CountingSpeaker {
    fn beep(&mut self) {
        *self.beeps.lock() += 1;
    }
}

/// Keeps records in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<TrialRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<TrialRecord> {
        self.records.lock().clone()
    }

    pub fn codes(&self) -> String {
        self.records.lock().iter().map(|r| r.result).collect()
    }
}

impl RecordSink for MemorySink {
    fn write(&mut self, record: &TrialRecord) -> anyhow::Result<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_follows_the_script() {
        let mut s = SimSubject::new(Behavior::correct(200));
        s.encode(0, tags::TRIAL_START, 0);
        assert_eq!(s.sample(10).map(|g| (g.x, g.y)), Some(AWAY));
        assert!(s.raw_down());

        s.encode(0, tags::FIX_ON, 100);
        assert_eq!(s.sample(249).map(|g| (g.x, g.y)), Some(AWAY));
        assert_eq!(s.sample(250).map(|g| (g.x, g.y)), Some((0.0, 0.0)));

        s.encode(0, tags::DIM, 1000);
        s.sample(1199);
        assert!(s.raw_down());
        s.sample(1200);
        assert!(!s.raw_down());

        s.encode(0, tags::TRIAL_START, 0);
        assert!(s.raw_down());
    }

    #[test]
    fn glance_leaves_and_returns() {
        let mut s = SimSubject::new(Behavior {
            gaze_latency_ms: 0,
            glance: Some(Glance {
                after_entry_ms: 50,
                away_ms: 20,
            }),
            ..Behavior::default()
        });
        s.encode(0, tags::FIX_ON, 0);
        let at = |s: &mut SimSubject, t| s.sample(t).map(|g| (g.x, g.y));
        assert_eq!(at(&mut s, 49), Some((0.0, 0.0)));
        assert_eq!(at(&mut s, 50), Some(AWAY));
        assert_eq!(at(&mut s, 69), Some(AWAY));
        assert_eq!(at(&mut s, 70), Some((0.0, 0.0)));
    }

    #[test]
    fn watched_display_moves_the_target() {
        let subject = SimSubject::new(Behavior::default());
        let screen = RecordingDisplay::new(0);
        let mut display = Watched::new(screen.clone(), subject.clone());
        display.show(FIX_SPOT, Sprite::spot((30.0, -40.0), 5.0, [255; 4]));
        assert_eq!(screen.sprite_count(), 1);
        assert_eq!(subject.state.lock().target, (30.0, -40.0));
    }

    #[test]
    fn recording_display_quantizes_flips() {
        let mut d = RecordingDisplay::new(16);
        assert_eq!(d.flip(0), 0);
        assert_eq!(d.flip(1), 16);
        assert_eq!(d.flip(33), 48);
        assert_eq!(d.flips(), vec![0, 16, 48]);
    }
}
