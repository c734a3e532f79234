use crate::probe::ProbeTask;
use crate::trainee::Trainee;
use anyhow::{Context, Result};
use clap::Parser;
use fixrig_experiment::sim::{Behavior, RecordingJuicer, SimSubject};
use fixrig_experiment::{JsonLinesSink, NullSpeaker, RecordSink, Rig, RunConfig, RunController};
use fixrig_render::SkiaDisplay;
use fixrig_timing::{Clock, HighPrecisionClock, SimClock};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;
use tracing::{info, Level};

const DEFAULT_TRIALS: usize = 20;

/// Runs a fixation/bar-release session against a simulated subject.
#[derive(Debug, Parser)]
#[command(name = "fixrig", version)]
pub struct Args {
    /// JSON run configuration; defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stop after this many counted trials.
    #[arg(short = 'n', long)]
    trials: Option<usize>,

    /// RNG seed for parameter sampling and the subject.
    #[arg(long)]
    seed: Option<u64>,

    /// Probability that the simulated subject gets a trial right.
    #[arg(long, default_value_t = 0.8)]
    accuracy: f64,

    /// Run against the wall clock instead of simulated time.
    #[arg(long)]
    realtime: bool,

    /// Trial records as JSON lines; stdout when omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(long, default_value_t = 1280)]
    width: u32,

    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Display refresh period.
    #[arg(long, default_value_t = 16)]
    frame_ms: u64,

    #[arg(long, default_value = "info")]
    log_level: Level,
}

pub struct App {
    args: Args,
    config: RunConfig,
    seed: u64,
}

impl App {
    pub fn new() -> Result<Self> {
        let args = Args::parse();
        tracing_subscriber::fmt()
            .with_max_level(args.log_level)
            .with_target(false)
            .with_writer(io::stderr)
            .init();
        Self::from_args(args)
    }

    fn from_args(args: Args) -> Result<Self> {
        anyhow::ensure!(
            (0.0..=1.0).contains(&args.accuracy),
            "accuracy must be within [0, 1], got {}",
            args.accuracy
        );
        let mut config = match &args.config {
            Some(path) => {
                info!(path = %path.display(), "loading configuration");
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                RunConfig::from_json(&text)
                    .with_context(|| format!("parsing {}", path.display()))?
            }
            None => RunConfig::default(),
        };
        match args.trials {
            Some(n) => config.limits.max_trials = Some(n),
            None if config.limits == Default::default() => {
                config.limits.max_trials = Some(DEFAULT_TRIALS)
            }
            None => {}
        }
        let seed = args.seed.unwrap_or_else(rand::random);
        Ok(Self { args, config, seed })
    }

    pub fn run(self) -> Result<()> {
        info!(
            platform = std::env::consts::OS,
            arch = std::env::consts::ARCH,
            seed = self.seed,
            realtime = self.args.realtime,
            "fixrig session"
        );
        if self.args.realtime {
            self.session(HighPrecisionClock::new())
        } else {
            self.session(SimClock::new())
        }
    }

    fn sink(&self) -> Result<Box<dyn RecordSink>> {
        Ok(match &self.args.output {
            Some(path) => {
                let file = File::create(path)
                    .with_context(|| format!("creating {}", path.display()))?;
                Box::new(JsonLinesSink::new(BufWriter::new(file)))
            }
            None => Box::new(JsonLinesSink::new(io::stdout())),
        })
    }

    fn session<C: Clock>(&self, clock: C) -> Result<()> {
        let subject = SimSubject::new(Behavior::default());
        let juicer = RecordingJuicer::new();
        let display = SkiaDisplay::new(self.args.width, self.args.height, self.args.frame_ms)?;
        let rig = Rig::new(clock, subject.hardware(display, juicer.clone(), NullSpeaker));

        let task = Trainee::new(
            ProbeTask::default(),
            subject,
            self.args.accuracy,
            StdRng::seed_from_u64(self.seed.wrapping_add(1)),
        );
        let mut controller = RunController::new(
            rig,
            task,
            self.config.clone(),
            StdRng::seed_from_u64(self.seed),
            self.sink()?,
        );
        let summary = controller.start_run()?;

        let deliveries = juicer.deliveries();
        info!(
            rewards = deliveries.len(),
            total_ms = deliveries.iter().sum::<u64>(),
            "juice delivered"
        );
        eprintln!("{}", serde_json::to_string_pretty(&summary)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["fixrig"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn defaults_to_a_bounded_session() {
        let app = App::from_args(args(&[])).unwrap();
        assert_eq!(app.config.limits.max_trials, Some(DEFAULT_TRIALS));
        assert!(!app.args.realtime);
        assert_eq!(app.args.log_level, Level::INFO);
    }

    #[test]
    fn trial_count_and_seed_from_the_command_line() {
        let app = App::from_args(args(&["-n", "3", "--seed", "11", "--log-level", "debug"])).unwrap();
        assert_eq!(app.config.limits.max_trials, Some(3));
        assert_eq!(app.seed, 11);
        assert_eq!(app.args.log_level, Level::DEBUG);
    }

    #[test]
    fn accuracy_outside_unit_interval_is_rejected() {
        assert!(App::from_args(args(&["--accuracy", "1.5"])).is_err());
    }

    #[test]
    fn missing_config_file_is_reported() {
        let err = App::from_args(args(&["--config", "/nonexistent/fixrig.json"]))
            .err()
            .unwrap();
        assert!(format!("{err:#}").contains("/nonexistent/fixrig.json"));
    }

    #[test]
    fn simulated_session_writes_one_line_per_trial() {
        let path = std::env::temp_dir().join(format!("fixrig-app-{}.jsonl", std::process::id()));
        let app = App::from_args(args(&[
            "-n",
            "4",
            "--seed",
            "5",
            "--accuracy",
            "1",
            "--width",
            "320",
            "--height",
            "240",
            "--output",
            path.to_str().unwrap(),
        ]))
        .unwrap();
        app.run().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();
        let results: Vec<String> = text
            .lines()
            .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap()["result"].to_string())
            .collect();
        assert_eq!(results, vec!["\"C\""; 4]);
    }
}
