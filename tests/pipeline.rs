use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Result};
use tether_visitor_analytics::{
    backend_config::BackendConfig,
    frame::{Frame, FrameEncoding},
    perception::{BoundingBox, DetectedFace, EmotionLabel, PerceptionResult},
    systems::{inference::PerceptionBackend, ControlCommand, PollOutcome, Systems, TickOutcome},
    theme,
};

enum Step {
    Faces(Duration, Vec<(f32, f32, EmotionLabel)>),
    Fail,
}

/// Plays back a shared script, one step per call; an exhausted script fails
#[derive(Clone, Default)]
struct ScriptedBackend {
    script: Arc<Mutex<VecDeque<Step>>>,
}

impl ScriptedBackend {
    fn push(&self, step: Step) {
        self.script.lock().unwrap().push_back(step);
    }
}

impl PerceptionBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn analyze(&mut self, frame: &Frame) -> Result<PerceptionResult> {
        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(Step::Faces(delay, faces)) => {
                thread::sleep(delay);
                let faces = faces
                    .into_iter()
                    .map(|(x, y, emotion)| {
                        DetectedFace::new(BoundingBox::new(x - 20., y - 20., 40., 40.), emotion)
                    })
                    .collect();
                Ok(PerceptionResult::for_frame(faces, frame))
            }
            Some(Step::Fail) | None => Err(anyhow!("model unavailable")),
        }
    }
}

/// Always slower than any sensible timeout; counts the calls it starts
#[derive(Clone, Default)]
struct SlowBackend {
    calls_started: Arc<AtomicUsize>,
}

impl PerceptionBackend for SlowBackend {
    fn name(&self) -> &'static str {
        "slow"
    }

    fn analyze(&mut self, frame: &Frame) -> Result<PerceptionResult> {
        self.calls_started.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(60));
        Ok(PerceptionResult::for_frame(vec![], frame))
    }
}

fn config() -> BackendConfig {
    BackendConfig {
        target_fps: 1000.,
        greet_visitors: true,
        ..BackendConfig::default()
    }
}

fn systems(backend: &ScriptedBackend) -> Systems {
    Systems::new(&config(), Box::new(backend.clone()), Instant::now()).unwrap()
}

/// Same size as the reference resolution, so detections need no rescaling
fn frame() -> Frame {
    Frame::new(
        vec![0xFF, 0xD8, 0xFF, 0xE0],
        1280,
        720,
        FrameEncoding::Jpeg,
        Instant::now(),
    )
}

fn submit(systems: &mut Systems) {
    systems.push_frame(frame());
    let outcome = systems.tick(Instant::now());
    assert!(
        matches!(outcome, TickOutcome::Submitted(_)),
        "expected a submission, got {:?}",
        outcome
    );
}

fn wait_for_outcome(systems: &mut Systems) -> PollOutcome {
    let started = Instant::now();
    loop {
        if let Some(outcome) = systems.poll(Instant::now()) {
            return outcome;
        }
        assert!(started.elapsed() < Duration::from_secs(2), "no outcome");
        thread::sleep(Duration::from_millis(2));
    }
}

fn run_one(systems: &mut Systems) -> PollOutcome {
    // Let the (1 ms) submission interval pass
    thread::sleep(Duration::from_millis(3));
    submit(systems);
    wait_for_outcome(systems)
}

#[test]
fn frames_flow_into_statistics_and_visitors() {
    let backend = ScriptedBackend::default();
    backend.push(Step::Faces(
        Duration::ZERO,
        vec![(100., 100., EmotionLabel::Happy)],
    ));
    backend.push(Step::Faces(
        Duration::ZERO,
        vec![
            (130., 100., EmotionLabel::Happy),
            (400., 300., EmotionLabel::Sad),
        ],
    ));

    let mut systems = systems(&backend);
    assert!(systems.handle_control(ControlCommand::Start));

    match run_one(&mut systems) {
        PollOutcome::Applied(applied) => {
            assert_eq!(applied.feedback.visitors, 1);
            assert_eq!(applied.greetings.len(), 1);
            assert_eq!(applied.feedback.emotion, Some(EmotionLabel::Happy));
        }
        other => panic!("unexpected outcome {:?}", other),
    }

    match run_one(&mut systems) {
        PollOutcome::Applied(applied) => {
            assert_eq!(applied.feedback.visitors, 2);
            // Only the new visitor is greeted
            assert_eq!(applied.greetings.len(), 1);
            assert_eq!(applied.greetings[0].emotion, EmotionLabel::Sad);
        }
        other => panic!("unexpected outcome {:?}", other),
    }

    let status = systems.status(Instant::now());
    assert!(status.is_running);
    assert_eq!(status.visitors, 2);
    assert_eq!(status.emotion_stats[&EmotionLabel::Happy], 2);
    assert_eq!(status.emotion_stats[&EmotionLabel::Sad], 1);
    assert_eq!(status.system_status.ai_model, "Active");
    assert_eq!(status.system_status.backend, "Running");
}

#[test]
fn nothing_is_submitted_while_stopped() {
    let backend = ScriptedBackend::default();
    let mut systems = systems(&backend);

    systems.push_frame(frame());
    assert!(matches!(systems.tick(Instant::now()), TickOutcome::Idle));
    assert!(systems.poll(Instant::now()).is_none());
    assert_eq!(systems.scheduler.submitted_count(), 0);

    let status = systems.status(Instant::now());
    assert!(!status.is_running);
    assert_eq!(status.system_status.backend, "Stopped");
}

#[test]
fn camera_reset_discards_in_flight_result() {
    let backend = ScriptedBackend::default();
    backend.push(Step::Faces(
        Duration::from_millis(100),
        vec![(100., 100., EmotionLabel::Angry)],
    ));

    let mut systems = systems(&backend);
    systems.handle_control(ControlCommand::Start);
    submit(&mut systems);

    systems.reset_camera(Instant::now());
    assert!(matches!(wait_for_outcome(&mut systems), PollOutcome::Discarded));

    let status = systems.status(Instant::now());
    assert!(status.is_running);
    assert_eq!(status.visitors, 0);
    assert_eq!(status.emotion_stats[&EmotionLabel::Angry], 0);
    assert_eq!(status.system_status.camera, "Resetting...");
}

#[test]
fn stop_discards_in_flight_result_and_idles_display() {
    let backend = ScriptedBackend::default();
    backend.push(Step::Faces(
        Duration::ZERO,
        vec![(100., 100., EmotionLabel::Happy)],
    ));
    backend.push(Step::Faces(
        Duration::from_millis(100),
        vec![(600., 100., EmotionLabel::Sad)],
    ));

    let mut systems = systems(&backend);
    systems.handle_control(ControlCommand::Start);
    assert!(matches!(run_one(&mut systems), PollOutcome::Applied(_)));

    thread::sleep(Duration::from_millis(3));
    submit(&mut systems);
    assert!(systems.handle_control(ControlCommand::Stop));
    assert!(matches!(wait_for_outcome(&mut systems), PollOutcome::Discarded));

    let status = systems.status(Instant::now());
    assert_eq!(status.visitors, 1);
    assert_eq!(status.emotion_stats[&EmotionLabel::Sad], 0);
    assert_eq!(status.emotion, None);
    assert_eq!(status.heatmap, theme::IDLE_HEATMAP);
    assert_eq!(status.message, theme::READY_MESSAGE);
}

#[test]
fn repeated_failures_degrade_model_status() {
    let backend = ScriptedBackend::default();
    let mut systems = systems(&backend);
    systems.handle_control(ControlCommand::Start);

    for _ in 0..3 {
        assert!(matches!(run_one(&mut systems), PollOutcome::Failed(_)));
    }
    let status = systems.status(Instant::now());
    assert!(status.system_status.ai_model.starts_with("Degraded: 3"));
    assert!(status.is_running);

    backend.push(Step::Faces(Duration::ZERO, vec![]));
    assert!(matches!(run_one(&mut systems), PollOutcome::Applied(_)));
    assert_eq!(systems.status(Instant::now()).system_status.ai_model, "Active");
}

#[test]
fn reset_statistics_keeps_session_running() {
    let backend = ScriptedBackend::default();
    backend.push(Step::Faces(
        Duration::ZERO,
        vec![(100., 100., EmotionLabel::Neutral)],
    ));
    let mut systems = systems(&backend);
    systems.handle_control(ControlCommand::Start);
    assert!(matches!(run_one(&mut systems), PollOutcome::Applied(_)));

    systems.handle_control(ControlCommand::ResetStatistics);
    let status = systems.status(Instant::now());
    assert!(status.is_running);
    assert_eq!(status.visitors, 0);
    assert!(status.emotion_stats.values().all(|count| *count == 0));
}

#[test]
fn slow_model_does_not_build_a_backlog() {
    let backend = SlowBackend::default();
    let config = BackendConfig {
        target_fps: 1000.,
        inference_timeout_ms: 20,
        ..BackendConfig::default()
    };
    let mut systems = Systems::new(&config, Box::new(backend.clone()), Instant::now()).unwrap();
    systems.handle_control(ControlCommand::Start);

    let started = Instant::now();
    let mut submitted = 0;
    let mut max_backlog = 0;
    while started.elapsed() < Duration::from_millis(1500) {
        systems.push_frame(frame());
        if let TickOutcome::Submitted(_) = systems.tick(Instant::now()) {
            submitted += 1;
        }
        systems.poll(Instant::now());

        let backlog = submitted - backend.calls_started.load(Ordering::SeqCst);
        max_backlog = max_backlog.max(backlog);
        thread::sleep(Duration::from_millis(1));
    }

    assert!(max_backlog <= 1, "{} frames queued at the model", max_backlog);
    // Back to back at 60 ms per call is the most the model can be asked for
    assert!(backend.calls_started.load(Ordering::SeqCst) <= 1500 / 60 + 2);
    assert!(systems
        .status(Instant::now())
        .system_status
        .ai_model
        .starts_with("Degraded"));
}
