use std::{
    sync::mpsc::{self, Receiver, SyncSender, TryRecvError, TrySendError},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use anyhow::Result;
use log::{debug, error, warn};

use crate::{errors::InferenceError, frame::Frame, perception::PerceptionResult};

/// A perception model: takes one frame, returns whatever faces it found.
///
/// Implementations run on the gateway's worker thread and may block; the
/// gateway is responsible for never letting that block the caller.
pub trait PerceptionBackend: Send {
    /// Backend identifier, for logs and status
    fn name(&self) -> &'static str;

    fn analyze(&mut self, frame: &Frame) -> Result<PerceptionResult>;

    /// Optional warm-up hook, called once on the worker thread before the first frame
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Identifies one submission. The generation is whatever the session
/// generation was at submit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    pub call_id: u64,
    pub generation: u64,
}

#[derive(Debug)]
pub struct Completion {
    pub ticket: Ticket,
    pub outcome: Result<PerceptionResult, InferenceError>,
    pub latency: Duration,
}

struct Request {
    ticket: Ticket,
    frame: Frame,
}

struct Response {
    ticket: Ticket,
    outcome: Result<PerceptionResult, InferenceError>,
}

struct Pending {
    ticket: Ticket,
    submitted_at: Instant,
    deadline: Instant,
}

/// Boundary to the perception model. Frames are handed to a dedicated worker
/// thread; results are collected without blocking via [`InferenceGateway::poll`].
///
/// A call that does not come back within the timeout is reported as
/// [`InferenceError::Timeout`] and forgotten; if its result turns up later it
/// is discarded. The request queue holds at most one frame: while the worker
/// is still stuck on an abandoned call and another is already waiting,
/// submissions are refused with [`InferenceError::Busy`].
pub struct InferenceGateway {
    backend_name: &'static str,
    requests: SyncSender<Request>,
    responses: Receiver<Response>,
    pending: Option<Pending>,
    timeout: Duration,
    next_call_id: u64,
    _worker: JoinHandle<()>,
}

impl InferenceGateway {
    pub fn new(mut backend: Box<dyn PerceptionBackend>, timeout: Duration) -> Result<Self> {
        let backend_name = backend.name();
        let (requests, request_rx) = mpsc::sync_channel::<Request>(1);
        let (response_tx, responses) = mpsc::channel::<Response>();

        let worker = thread::Builder::new()
            .name(format!("inference-{}", backend_name))
            .spawn(move || {
                if let Err(e) = backend.warm_up() {
                    error!("Warm-up failed for backend {}: {}", backend.name(), e);
                }
                for Request { ticket, frame } in request_rx.iter() {
                    let outcome = backend
                        .analyze(&frame)
                        .map_err(|e| InferenceError::Failure(e.to_string()));
                    if response_tx.send(Response { ticket, outcome }).is_err() {
                        break;
                    }
                }
                debug!("Inference worker for {} finished", backend.name());
            })?;

        Ok(InferenceGateway {
            backend_name,
            requests,
            responses,
            pending: None,
            timeout,
            next_call_id: 0,
            _worker: worker,
        })
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend_name
    }

    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Hand a frame to the model without waiting for the result
    pub fn submit(
        &mut self,
        frame: Frame,
        generation: u64,
        now: Instant,
    ) -> Result<Ticket, InferenceError> {
        frame.validate()?;
        if let Some(pending) = &self.pending {
            return Err(InferenceError::Failure(format!(
                "call {} is still outstanding",
                pending.ticket.call_id
            )));
        }

        let ticket = Ticket {
            call_id: self.next_call_id + 1,
            generation,
        };
        match self.requests.try_send(Request { ticket, frame }) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => return Err(InferenceError::Busy),
            Err(TrySendError::Disconnected(_)) => return Err(InferenceError::WorkerStopped),
        }
        self.next_call_id = ticket.call_id;
        self.pending = Some(Pending {
            ticket,
            submitted_at: now,
            deadline: now + self.timeout,
        });
        Ok(ticket)
    }

    /// Collect the outcome of the outstanding call, if it has finished or timed out
    pub fn poll(&mut self, now: Instant) -> Option<Completion> {
        loop {
            match self.responses.try_recv() {
                Ok(response) => {
                    if let Some(completion) = self.accept(response, now) {
                        return Some(completion);
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    return self.fail_pending(InferenceError::WorkerStopped, now);
                }
            }
        }

        match &self.pending {
            Some(pending) if now >= pending.deadline => {
                warn!(
                    "Inference call {} timed out after {:?}",
                    pending.ticket.call_id, self.timeout
                );
                self.fail_pending(InferenceError::Timeout(self.timeout), now)
            }
            _ => None,
        }
    }

    fn accept(&mut self, response: Response, now: Instant) -> Option<Completion> {
        match self.pending.take() {
            Some(pending) if pending.ticket == response.ticket => Some(Completion {
                ticket: response.ticket,
                outcome: response.outcome,
                latency: now.saturating_duration_since(pending.submitted_at),
            }),
            other => {
                debug!(
                    "Discarding late result for abandoned call {}",
                    response.ticket.call_id
                );
                self.pending = other;
                None
            }
        }
    }

    fn fail_pending(&mut self, error: InferenceError, now: Instant) -> Option<Completion> {
        self.pending.take().map(|pending| Completion {
            ticket: pending.ticket,
            outcome: Err(error),
            latency: now.saturating_duration_since(pending.submitted_at),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        frame::FrameEncoding,
        perception::{BoundingBox, DetectedFace, EmotionLabel},
    };
    use anyhow::anyhow;
    use std::collections::VecDeque;

    /// Each call sleeps for the next scripted delay; a `None` delay fails the call
    struct ScriptedBackend {
        script: VecDeque<Option<Duration>>,
    }

    impl PerceptionBackend for ScriptedBackend {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn analyze(&mut self, frame: &Frame) -> Result<PerceptionResult> {
            match self.script.pop_front().flatten() {
                Some(delay) => {
                    thread::sleep(delay);
                    let face =
                        DetectedFace::new(BoundingBox::new(0., 0., 10., 10.), EmotionLabel::Happy);
                    Ok(PerceptionResult::for_frame(vec![face], frame))
                }
                None => Err(anyhow!("model exploded")),
            }
        }
    }

    fn gateway(script: Vec<Option<Duration>>, timeout: Duration) -> InferenceGateway {
        let backend = ScriptedBackend {
            script: script.into(),
        };
        InferenceGateway::new(Box::new(backend), timeout).unwrap()
    }

    fn frame() -> Frame {
        Frame::new(vec![0xFF, 0xD8, 0xFF, 0xE0], 4, 4, FrameEncoding::Jpeg, Instant::now())
    }

    fn wait_for_completion(gateway: &mut InferenceGateway, limit: Duration) -> Completion {
        let started = Instant::now();
        loop {
            if let Some(completion) = gateway.poll(Instant::now()) {
                return completion;
            }
            assert!(started.elapsed() < limit, "no completion within {:?}", limit);
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn successful_call_completes() {
        let mut gateway = gateway(vec![Some(Duration::ZERO)], Duration::from_secs(1));
        let ticket = gateway.submit(frame(), 7, Instant::now()).unwrap();
        assert!(gateway.is_busy());

        let completion = wait_for_completion(&mut gateway, Duration::from_secs(1));
        assert_eq!(completion.ticket, ticket);
        assert_eq!(completion.ticket.generation, 7);
        assert_eq!(completion.outcome.unwrap().faces().len(), 1);
        assert!(!gateway.is_busy());
    }

    #[test]
    fn failure_is_reported_not_retried() {
        let mut gateway = gateway(vec![None], Duration::from_secs(1));
        gateway.submit(frame(), 0, Instant::now()).unwrap();
        let completion = wait_for_completion(&mut gateway, Duration::from_secs(1));
        assert!(matches!(completion.outcome, Err(InferenceError::Failure(_))));
        assert!(!gateway.is_busy());
    }

    #[test]
    fn hung_call_times_out_within_bound() {
        let timeout = Duration::from_millis(50);
        let mut gateway = gateway(vec![Some(Duration::from_millis(500))], timeout);
        let started = Instant::now();
        gateway.submit(frame(), 0, started).unwrap();

        let completion = wait_for_completion(&mut gateway, Duration::from_secs(1));
        assert_eq!(completion.outcome.unwrap_err(), InferenceError::Timeout(timeout));
        assert!(started.elapsed() < timeout + Duration::from_millis(100));
        assert!(!gateway.is_busy());
    }

    #[test]
    fn late_result_of_abandoned_call_is_discarded() {
        let timeout = Duration::from_millis(300);
        let mut gateway = gateway(
            vec![Some(Duration::from_millis(400)), Some(Duration::ZERO)],
            timeout,
        );
        let first = gateway.submit(frame(), 1, Instant::now()).unwrap();
        let completion = wait_for_completion(&mut gateway, Duration::from_secs(2));
        assert_eq!(completion.ticket, first);
        assert!(completion.outcome.is_err());

        let second = gateway.submit(frame(), 2, Instant::now()).unwrap();
        let completion = wait_for_completion(&mut gateway, Duration::from_secs(2));
        assert_eq!(completion.ticket, second);
        assert!(completion.outcome.is_ok());
    }

    #[test]
    fn invalid_frames_are_rejected_before_dispatch() {
        let mut gateway = gateway(vec![], Duration::from_secs(1));
        let bad = Frame::new(vec![1, 2, 3], 4, 4, FrameEncoding::Jpeg, Instant::now());
        assert!(matches!(
            gateway.submit(bad, 0, Instant::now()),
            Err(InferenceError::InvalidFrameEncoding(_))
        ));
        assert!(!gateway.is_busy());
    }

    #[test]
    fn abandoned_call_blocks_queue_instead_of_piling_up() {
        let timeout = Duration::from_millis(20);
        let mut gateway = gateway(
            vec![Some(Duration::from_millis(300)), Some(Duration::ZERO)],
            timeout,
        );

        gateway.submit(frame(), 0, Instant::now()).unwrap();
        let completion = wait_for_completion(&mut gateway, Duration::from_secs(1));
        assert_eq!(completion.outcome.unwrap_err(), InferenceError::Timeout(timeout));

        // The worker is still on the first call; one more frame may wait behind it
        gateway.submit(frame(), 0, Instant::now()).unwrap();
        let completion = wait_for_completion(&mut gateway, Duration::from_secs(1));
        assert_eq!(completion.outcome.unwrap_err(), InferenceError::Timeout(timeout));

        assert_eq!(
            gateway.submit(frame(), 0, Instant::now()),
            Err(InferenceError::Busy)
        );
        assert!(!gateway.is_busy());
    }
}
