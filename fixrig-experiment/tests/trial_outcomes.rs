mod common;

use common::{count_of, on_tick, params, queued, time_of, CountingTask, Harness, FRAME_MS};
use fixrig_core::{tags, AbortKind, EarlyKind, Outcome, TrialParameters};
use fixrig_experiment::sim::{Behavior, Glance, Response};
use fixrig_experiment::{InterruptClass, Raised, Rig, Task};
use fixrig_timing::{Clock, Timer};

#[test]
fn correct_release_after_dim_is_rewarded() {
    for p in [params(), queued(params())] {
        let mut h = Harness::new(Behavior::correct(250));
        let mut task = CountingTask::default();
        let record = h.run(&mut task, &p);

        assert_eq!(record.outcome, Outcome::Correct, "stim_to_end={}", p.stim_to_end);
        assert_eq!(record.result, 'C');
        assert!(
            (250 - FRAME_MS as i64..=250).contains(&record.reaction_time_ms),
            "rt {}",
            record.reaction_time_ms
        );
        assert_eq!(h.juicer.deliveries(), vec![80]);
        assert!(record.has_event(tags::REWARD));
        assert!(!record.has_event(tags::PENALTY));
        assert_eq!(h.speaker.beeps(), 0);
        assert_eq!(task.stimulated, 1);
        h.assert_cleaned_up();
    }
}

#[test]
fn dim_comes_one_hold_after_window_opens() {
    for p in [params(), queued(params())] {
        let mut h = Harness::new(Behavior::correct(250));
        let record = h.run(&mut CountingTask::default(), &p);
        assert_eq!(
            time_of(&record, tags::DIM) - time_of(&record, tags::WINDOW_OPEN),
            p.hold_ms
        );
    }
}

#[test]
fn release_before_dim_is_early_and_penalized() {
    let mut h = Harness::new(Behavior {
        response: Response::AfterWindowOpen(100),
        ..Behavior::default()
    });
    let p = params();
    let record = h.run(&mut CountingTask::default(), &p);

    assert_eq!(record.outcome, Outcome::EarlyRelease(EarlyKind::PreTarget));
    assert_eq!(record.result, 'E');
    assert_eq!(record.reaction_time_ms, -1);
    assert!(!record.has_event(tags::DIM));
    assert!(h.juicer.deliveries().is_empty());
    assert_eq!(h.speaker.beeps(), 1);
    assert!(h.display.backgrounds().contains(&p.error_color));
    assert_eq!(h.display.background(), p.background);
    assert_eq!(
        time_of(&record, tags::TRIAL_END) - time_of(&record, tags::PENALTY),
        p.timeout_ms
    );
    h.assert_cleaned_up();
}

#[test]
fn release_faster_than_minimum_rt_is_an_anticipation() {
    let mut h = Harness::new(Behavior::correct(50));
    let record = h.run(&mut CountingTask::default(), &params());
    assert_eq!(record.outcome, Outcome::EarlyRelease(EarlyKind::PreTarget));
    assert!(record.has_event(tags::DIM));
    assert!(record.has_event(tags::EARLY_RELEASE));
    assert_eq!(record.reaction_time_ms, -1);
}

#[test]
fn never_fixating_is_uninitiated_without_stimulus() {
    let mut h = Harness::new(Behavior::never_fixates());
    let mut task = CountingTask::default();
    let p = params();
    let record = h.run(&mut task, &p);

    assert_eq!(record.outcome, Outcome::Uninitiated);
    assert_eq!(record.result, 'U');
    assert_eq!(record.reaction_time_ms, -1);
    assert_eq!(task.stimulated, 0);
    assert!(!record.has_event(tags::WINDOW_OPEN));
    assert_eq!(
        time_of(&record, tags::ACQUIRE_TIMEOUT) - time_of(&record, tags::FIX_ON),
        p.max_acquire_ms
    );
    assert_eq!(
        time_of(&record, tags::TRIAL_END) - time_of(&record, tags::PENALTY),
        p.uninit_timeout_ms
    );
    assert_eq!(h.speaker.beeps(), 0);
    h.assert_cleaned_up();
}

#[test]
fn bar_not_held_is_uninitiated() {
    let mut h = Harness::new(Behavior {
        holds_bar: false,
        ..Behavior::default()
    });
    let record = h.run(&mut CountingTask::default(), &params());
    assert_eq!(record.outcome, Outcome::Uninitiated);
    assert!(!record.has_event(tags::FIX_ENTER));
}

#[test]
fn acquisition_cannot_finish_after_the_timeout() {
    let mut h = Harness::new(Behavior {
        gaze_latency_ms: 950,
        ..Behavior::default()
    });
    let p = params();
    let record = h.run(&mut CountingTask::default(), &p);

    assert_eq!(record.outcome, Outcome::Uninitiated);
    assert!(record.has_event(tags::FIX_ENTER));
    assert!(!record.has_event(tags::FIX_ACQUIRED));
    assert_eq!(
        time_of(&record, tags::ACQUIRE_TIMEOUT) - time_of(&record, tags::FIX_ON),
        p.max_acquire_ms
    );
    h.assert_cleaned_up();
}

#[test]
fn letting_go_of_the_bar_during_grace_is_not_a_fixation_exit() {
    let mut h = Harness::new(Behavior::correct(250));
    let subject = h.subject.clone();
    h.rig.set_frame_hook(on_tick(move |now| {
        if now == 300 {
            subject.set_behavior(Behavior {
                holds_bar: false,
                ..Behavior::default()
            });
        }
    }));
    let record = h.run(&mut CountingTask::default(), &params());

    assert_eq!(record.outcome, Outcome::Uninitiated);
    assert_eq!(count_of(&record, tags::FIX_ENTER), 1);
    assert_eq!(count_of(&record, tags::BAR_NOT_READY), 1);
    assert_eq!(count_of(&record, tags::FIX_EXIT), 0);
    assert!(!record.has_event(tags::FIX_ACQUIRED));
}

#[test]
fn no_response_is_max_rt_exceeded() {
    for p in [params(), queued(params())] {
        let mut h = Harness::new(Behavior::never_responds());
        let record = h.run(&mut CountingTask::default(), &p);

        assert_eq!(record.outcome, Outcome::MaxRtExceeded);
        assert_eq!(record.result, 'M');
        assert_eq!(record.reaction_time_ms, -1);
        assert_eq!(
            time_of(&record, tags::NO_RESPONSE) - time_of(&record, tags::DIM),
            p.max_rt_ms
        );
        assert!(record.has_event(tags::PENALTY));
        h.assert_cleaned_up();
    }
}

#[test]
fn gaze_break_after_acquisition_is_a_fix_break() {
    let mut h = Harness::new(Behavior {
        break_after_acquired_ms: Some(500),
        ..Behavior::default()
    });
    let record = h.run(&mut CountingTask::default(), &params());

    assert_eq!(record.outcome, Outcome::EarlyRelease(EarlyKind::FixBreak));
    assert_eq!(record.reaction_time_ms, -1);
    let acquired = record.event_index(tags::FIX_ACQUIRED).unwrap();
    let lost = record.event_index(tags::FIX_LOST).unwrap();
    assert!(acquired < lost);
    assert_eq!(
        time_of(&record, tags::FIX_LOST) - time_of(&record, tags::FIX_ACQUIRED),
        500
    );
    assert!(record.has_event(tags::PENALTY));
    h.assert_cleaned_up();
}

#[test]
fn leaving_during_grace_restarts_acquisition() {
    let mut h = Harness::new(Behavior {
        gaze_latency_ms: 150,
        glance: Some(Glance {
            after_entry_ms: 50,
            away_ms: 20,
        }),
        ..Behavior::default()
    });
    let p = params();
    let record = h.run(&mut CountingTask::default(), &p);

    assert_eq!(record.outcome, Outcome::Correct);
    assert_eq!(count_of(&record, tags::FIX_ENTER), 2);
    assert_eq!(count_of(&record, tags::FIX_EXIT), 1);
    let fix_on = time_of(&record, tags::FIX_ON);
    let acquired = time_of(&record, tags::FIX_ACQUIRED);
    assert_eq!(acquired - fix_on, 150 + 50 + 20 + p.grace_ms);
    let second_entry = record
        .events
        .iter()
        .filter(|e| e.tag == tags::FIX_ENTER)
        .map(|e| e.t_ms)
        .last()
        .unwrap();
    assert_eq!(acquired - second_entry, p.grace_ms);
}

#[test]
fn disabled_gaze_window_waits_for_the_bar_only() {
    let mut h = Harness::new(Behavior::never_fixates());
    let p = TrialParameters {
        fix_win_radius: 0.0,
        ..params()
    };
    let record = h.run(&mut CountingTask::default(), &p);
    assert_eq!(record.outcome, Outcome::Correct);
    assert!(!record.has_event(tags::FIX_ACQUIRED));
    assert!(record.has_event(tags::WINDOW_OPEN));
}

#[test]
fn user_abort_skips_the_penalty() {
    let mut h = Harness::new(Behavior::never_responds());
    let handle = h.rig.handle();
    h.rig.set_frame_hook(on_tick(move |now| {
        if now == 1500 {
            handle.abort_trial();
        }
    }));
    let mut task = CountingTask::default();
    let record = h.run(&mut task, &params());

    assert_eq!(record.outcome, Outcome::UserAbort(AbortKind::User));
    assert_eq!(record.result, 'A');
    assert_eq!(record.reaction_time_ms, -1);
    assert!(record.has_event(tags::USER_ABORT));
    assert!(!record.has_event(tags::PENALTY));
    assert!(task.post_fixation >= 1);
    h.assert_cleaned_up();
}

#[test]
fn abort_during_penalty_cuts_it_short() {
    let mut h = Harness::new(Behavior::never_responds());
    let handle = h.rig.handle();
    let p = params();
    h.rig.set_frame_hook(on_tick(move |now| {
        if now == 5000 {
            handle.abort_trial();
        }
    }));
    let record = h.run(&mut CountingTask::default(), &p);
    assert_eq!(record.outcome, Outcome::MaxRtExceeded);
    assert!(time_of(&record, tags::TRIAL_END) - time_of(&record, tags::PENALTY) < p.timeout_ms);
    h.assert_cleaned_up();
}

#[test]
fn external_alarm_ends_the_window_as_max_rt() {
    let mut h = Harness::new(Behavior::never_responds());
    let source = h.rig.interrupt_source();
    h.rig.set_frame_hook(on_tick(move |now| {
        if now == 2000 {
            source.signal(InterruptClass::Alarm);
        }
    }));
    let record = h.run(&mut CountingTask::default(), &params());
    assert_eq!(record.outcome, Outcome::MaxRtExceeded);
    assert!(!record.has_event(tags::DIM));
}

struct FaultyTask;

impl Task for FaultyTask {
    fn stimulate<C: Clock>(
        &mut self,
        rig: &mut Rig<C>,
        _params: &TrialParameters,
        timer: &Timer<C>,
        _duration_ms: u64,
    ) -> Result<(), Raised> {
        while timer.elapsed_ms() < 10 {
            rig.idle_tick()?;
        }
        Err(anyhow::anyhow!("probe texture missing").into())
    }
}

#[test]
fn task_fault_aborts_the_trial_and_cleans_up() {
    let mut h = Harness::new(Behavior::correct(250));
    let record = h.run(&mut FaultyTask, &params());
    assert_eq!(record.outcome, Outcome::UserAbort(AbortKind::Fault));
    assert_eq!(record.result, 'A');
    assert!(record.has_event(tags::FAULT));
    assert!(!record.has_event(tags::PENALTY));
    h.assert_cleaned_up();
}

struct PanickingTask;

impl Task for PanickingTask {
    fn stimulate<C: Clock>(
        &mut self,
        _rig: &mut Rig<C>,
        _params: &TrialParameters,
        _timer: &Timer<C>,
        _duration_ms: u64,
    ) -> Result<(), Raised> {
        panic!("stimulus generator bug");
    }
}

#[test]
fn panicking_task_is_cleaned_up_and_recorded_as_a_fault() {
    let mut h = Harness::new(Behavior::correct(250));
    let record = h.run(&mut PanickingTask, &params());

    assert_eq!(record.outcome, Outcome::UserAbort(AbortKind::Fault));
    assert_eq!(record.result, 'A');
    assert_eq!(record.reaction_time_ms, -1);
    assert!(record.event_index(tags::FAULT) < record.event_index(tags::TRIAL_END));
    assert!(record.events.iter().any(|e| e.tag.starts_with("outcome A")));
    assert_eq!(record.events.last().map(|e| e.tag.as_str()), Some(tags::TRIAL_END));
    assert!(h.juicer.deliveries().is_empty());
    h.assert_cleaned_up();
}

#[test]
fn records_carry_outcome_and_gaze_trace() {
    let mut h = Harness::new(Behavior::correct(250));
    let record = h.run(&mut CountingTask::default(), &params());
    let fix_on = time_of(&record, tags::FIX_ON);
    assert!(!record.gaze_trace.is_empty());
    assert!(record.gaze_trace.iter().all(|g| g.t_ms >= fix_on));
    assert!(record.has_event("outcome C Correct"));
    assert_eq!(record.events.last().map(|e| e.tag.as_str()), Some(tags::TRIAL_END));
}

#[test]
fn strobes_mirror_the_event_log_with_stable_codes() {
    let mut h = Harness::new(Behavior::correct(250));
    let record = h.run(&mut CountingTask::default(), &params());
    let strobes = h.subject.strobes();
    assert_eq!(strobes.len(), record.events.len());
    for ((code, tag, t), event) in strobes.iter().zip(&record.events) {
        assert_eq!(tag, &event.tag);
        assert_eq!(*t, event.t_ms);
        assert_eq!(*code, fixrig_cache::tag_code(tag));
    }
}

#[test]
fn reaction_time_is_only_reported_for_correct_trials() {
    let behaviors = [
        Behavior::correct(300),
        Behavior::never_fixates(),
        Behavior::never_responds(),
        Behavior {
            response: Response::AfterWindowOpen(400),
            ..Behavior::default()
        },
        Behavior {
            break_after_acquired_ms: Some(100),
            ..Behavior::default()
        },
    ];
    let p = params();
    for behavior in behaviors {
        let mut h = Harness::new(behavior);
        let record = h.run(&mut CountingTask::default(), &p);
        if record.outcome.is_correct() {
            assert!((0..=p.max_rt_ms as i64).contains(&record.reaction_time_ms));
        } else {
            assert_eq!(record.reaction_time_ms, -1, "{}", record.outcome);
        }
    }
}
