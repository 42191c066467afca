//! Request scheduler core.
//!
//! The Scheduler owns both lane queues, one scheduling loop task and one
//! worker task per lane. The loop:
//! 1. Checks the queues under the lock, sleeping `idle_poll_ms` when both are empty
//! 2. Picks the next eligible head (FAST first, SLOW unless a transfer is in flight)
//! 3. Marks it PROCESSING and hands a work order to the lane worker
//! 4. Waits on the rendezvous until that record's outcome is reported
//!
//! Step 4 means admissions are serialized across both lanes: a FAST record
//! dispatched while a SLOW transfer runs still waits for the rendezvous
//! release of whatever was admitted before it. There is no timeout on that
//! wait; a transport call that never returns stalls the loop for good.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;

use super::queue::{LaneQueues, SchedulerSnapshot};
use super::worker::{LaneWorker, WorkOrder};
use crate::config::SchedulerConfig;
use crate::domain::{
    Category, CompletionCallback, Lane, ProgressCallback, RequestRecord, RequestState, Response, ResultCode,
};
use crate::error::{RestlaneError, Result};
use crate::transport::{Transport, TransportError};

/// Outcome of one pass of the scheduling loop
enum Step {
    /// Both queues empty
    Idle,
    /// Work queued, nothing eligible
    Blocked,
    /// Head record dropped without dispatch
    Dropped,
    Dispatch(Lane, WorkOrder),
}

/// State shared by the loop, the workers and submitters
pub(crate) struct SchedulerCore {
    queues: Mutex<LaneQueues>,
    rendezvous: Semaphore,
    config: SchedulerConfig,
}

impl SchedulerCore {
    fn new(config: SchedulerConfig) -> Self {
        Self {
            queues: Mutex::new(LaneQueues::new()),
            rendezvous: Semaphore::new(0),
            config,
        }
    }

    // A panicking callback must not take the scheduler down with it.
    fn queues(&self) -> MutexGuard<'_, LaneQueues> {
        self.queues.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn submit(
        &self,
        mut record: RequestRecord,
        on_complete: CompletionCallback,
        on_progress: ProgressCallback,
    ) -> Result<()> {
        if record.state() != RequestState::None {
            return Err(RestlaneError::InvalidArgument(format!(
                "record {} was already submitted (state {:?})",
                record.id,
                record.state()
            )));
        }
        // Non-REST ids are accepted here and dropped by the loop.
        if record.event_id.is_rest() {
            record.payload.validate(record.lane)?;
        }

        let mut queues = self.queues();
        record.advance(RequestState::Waiting)?;
        record.attach_callbacks(on_complete, on_progress);
        tracing::debug!(
            request_id = %record.id,
            event_id = %record.event_id,
            lane = %record.lane,
            "Request queued"
        );
        queues.push(record);
        Ok(())
    }

    fn next_step(&self) -> Step {
        let mut queues = self.queues();
        if queues.is_empty() {
            return Step::Idle;
        }
        let Some(lane) = queues.select_next() else {
            return Step::Blocked;
        };
        let Some(head) = queues.head_mut(lane) else {
            return Step::Blocked;
        };

        match head.category() {
            Some(Category::Rest) => {}
            other => {
                let reason = match other {
                    Some(category) => format!("{} event cannot be scheduled", category),
                    None => RestlaneError::UnrecognizedEvent(head.event_id.raw()).to_string(),
                };
                tracing::warn!(
                    request_id = %head.id,
                    event_id = %head.event_id,
                    lane = %lane,
                    reason = %reason,
                    "Dropping request"
                );
                queues.pop_head(lane);
                return Step::Dropped;
            }
        }

        if let Err(e) = head.advance(RequestState::Processing) {
            tracing::error!(request_id = %head.id, error = %e, "Cannot start request");
            return Step::Blocked;
        }
        tracing::info!(
            request_id = %head.id,
            event_id = %head.event_id,
            lane = %lane,
            "Processing request"
        );

        Step::Dispatch(
            lane,
            WorkOrder {
                request_id: head.id.clone(),
                event_id: head.event_id,
                payload: head.payload.clone(),
            },
        )
    }

    pub(crate) fn set_transfer_busy(&self, lane: Lane, busy: bool) {
        self.queues().set_transfer_busy(lane, busy);
    }

    pub(crate) fn report_progress(&self, lane: Lane, fraction: f64, resource: &str) -> Result<()> {
        let (event_id, callback) = {
            let queues = self.queues();
            let head = processing_head(&queues, lane)?;
            (head.event_id, head.on_progress())
        };

        if let Some(callback) = callback
            && catch_unwind(AssertUnwindSafe(|| callback(event_id, fraction, resource))).is_err()
        {
            tracing::error!(event_id = %event_id, lane = %lane, "Progress callback panicked");
        }
        Ok(())
    }

    pub(crate) fn report_outcome(&self, lane: Lane, outcome: std::result::Result<Response, TransportError>) -> Result<()> {
        let record = {
            let mut queues = self.queues();
            processing_head(&queues, lane)?;
            let Some(mut record) = queues.pop_head(lane) else {
                return Err(stale(lane, "queue is empty"));
            };
            record.advance(RequestState::Completed)?;
            record
        };

        let (code, response) = match outcome {
            Ok(response) => (ResultCode::Success, response),
            Err(e) => (ResultCode::Failure, e.to_response()),
        };
        tracing::info!(
            request_id = %record.id,
            event_id = %record.event_id,
            lane = %lane,
            result = ?code,
            "Request completed"
        );

        if let Some(callback) = record.on_complete()
            && catch_unwind(AssertUnwindSafe(|| callback(record.event_id, code, &response))).is_err()
        {
            tracing::error!(event_id = %record.event_id, lane = %lane, "Completion callback panicked");
        }

        if self.config.serialize_admission {
            self.rendezvous.add_permits(1);
        }
        Ok(())
    }

    fn snapshot(&self) -> SchedulerSnapshot {
        self.queues().snapshot()
    }

    async fn await_rendezvous(&self) -> bool {
        match self.rendezvous.acquire().await {
            Ok(permit) => {
                permit.forget();
                true
            }
            Err(_) => false,
        }
    }
}

fn stale(lane: Lane, reason: &str) -> RestlaneError {
    RestlaneError::StaleReport {
        lane,
        reason: reason.to_string(),
    }
}

fn processing_head(queues: &LaneQueues, lane: Lane) -> Result<&RequestRecord> {
    match queues.head(lane) {
        None => Err(stale(lane, "queue is empty")),
        Some(head) if head.state() == RequestState::Processing => Ok(head),
        Some(head) => Err(stale(lane, &format!("head {} is {:?}", head.id, head.state()))),
    }
}

/// Log and swallow a stale report. Returns whether the report was delivered.
pub(crate) fn absorb(result: Result<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) if e.is_absorbed() => {
            log::warn!("Ignoring report: {}", e);
            false
        }
        Err(e) => {
            log::error!("Report failed: {}", e);
            false
        }
    }
}

/// Senders into the two lane workers, owned by the loop task
struct Dispatcher {
    fast: mpsc::UnboundedSender<WorkOrder>,
    slow: mpsc::UnboundedSender<WorkOrder>,
}

impl Dispatcher {
    fn send(&self, lane: Lane, order: WorkOrder) -> std::result::Result<(), mpsc::error::SendError<WorkOrder>> {
        match lane {
            Lane::Fast => self.fast.send(order),
            Lane::Slow => self.slow.send(order),
        }
    }
}

async fn run_loop(core: Arc<SchedulerCore>, dispatcher: Dispatcher) {
    let idle = core.config.idle_poll();
    tracing::info!(
        idle_poll_ms = idle.as_millis() as u64,
        serialize_admission = core.config.serialize_admission,
        "Scheduling loop started"
    );

    loop {
        match core.next_step() {
            Step::Idle | Step::Blocked => tokio::time::sleep(idle).await,
            Step::Dropped => tokio::task::yield_now().await,
            Step::Dispatch(lane, order) => {
                if let Err(e) = dispatcher.send(lane, order) {
                    tracing::error!(
                        lane = %lane,
                        request_id = %e.0.request_id,
                        "Lane worker is gone, failing request"
                    );
                    let failure = TransportError::Network(format!("{} lane worker unavailable", lane));
                    absorb(core.report_outcome(lane, Err(failure)));
                }

                if core.config.serialize_admission && !core.await_rendezvous().await {
                    tracing::error!("Rendezvous closed, scheduling loop exiting");
                    return;
                }
            }
        }
    }
}

/// Two-lane request scheduler.
///
/// Construct one per composition root and share it (`Arc<Scheduler>`) with
/// submitters. Dropping it aborts the loop and both lane workers.
pub struct Scheduler {
    core: Arc<SchedulerCore>,
    workers: Vec<LaneWorker>,
    loop_handle: JoinHandle<()>,
}

impl Scheduler {
    /// Start the loop and both lane workers on the current tokio runtime
    pub fn start(config: SchedulerConfig, transport: Arc<dyn Transport>) -> Self {
        let core = Arc::new(SchedulerCore::new(config));
        let workers = vec![
            LaneWorker::spawn(Lane::Fast, core.clone(), transport.clone()),
            LaneWorker::spawn(Lane::Slow, core.clone(), transport),
        ];
        let dispatcher = Dispatcher {
            fast: worker_sender(&workers, Lane::Fast),
            slow: worker_sender(&workers, Lane::Slow),
        };
        let loop_handle = tokio::spawn(run_loop(core.clone(), dispatcher));

        Self {
            core,
            workers,
            loop_handle,
        }
    }

    /// Queue `record` on its lane with the given callbacks.
    ///
    /// Fails with `InvalidArgument` when the record was already submitted or
    /// its payload cannot run on the chosen lane.
    pub fn submit(
        &self,
        record: RequestRecord,
        on_complete: CompletionCallback,
        on_progress: ProgressCallback,
    ) -> Result<()> {
        self.core.submit(record, on_complete, on_progress)
    }

    /// Forward progress for the lane's processing head. Stale reports are
    /// logged and ignored; returns whether a record received it.
    pub fn report_progress(&self, lane: Lane, fraction: f64, resource: &str) -> bool {
        absorb(self.core.report_progress(lane, fraction, resource))
    }

    /// Complete the lane's processing head. Stale reports are logged and
    /// ignored; returns whether a record was completed.
    pub fn report_outcome(&self, lane: Lane, outcome: std::result::Result<Response, TransportError>) -> bool {
        absorb(self.core.report_outcome(lane, outcome))
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        self.core.snapshot()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.core.config
    }

    pub fn is_running(&self) -> bool {
        !self.loop_handle.is_finished()
    }

    /// Abort the loop and the lane workers. Queued records are discarded.
    pub fn shutdown(&self) {
        self.loop_handle.abort();
        for worker in &self.workers {
            worker.abort();
        }
        self.core.rendezvous.close();
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_sender(workers: &[LaneWorker], lane: Lane) -> mpsc::UnboundedSender<WorkOrder> {
    workers
        .iter()
        .find(|w| w.lane() == lane)
        .map(LaneWorker::sender)
        .unwrap_or_else(|| mpsc::unbounded_channel().0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ApiRequest, HttpMethod, Payload, completion_fn, no_progress, progress_fn};
    use crate::transport::MockTransport;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn login_record(lane: Lane) -> RequestRecord {
        let payload =
            Payload::new(json!({"user": "x"})).with_request(ApiRequest::new(HttpMethod::Post, "http://api/login"));
        RequestRecord::new(1000, lane, payload)
    }

    fn counting_callback(counter: Arc<AtomicU32>) -> CompletionCallback {
        completion_fn(move |_, _, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_core_submit_marks_waiting() {
        let core = SchedulerCore::new(SchedulerConfig::default());
        core.submit(login_record(Lane::Fast), completion_fn(|_, _, _| {}), no_progress())
            .unwrap();

        let snapshot = core.snapshot();
        assert_eq!(snapshot.fast.len(), 1);
        assert_eq!(snapshot.fast[0].state, RequestState::Waiting);
    }

    #[test]
    fn test_core_submit_rejects_resubmission() {
        let core = SchedulerCore::new(SchedulerConfig::default());
        let mut record = login_record(Lane::Fast);
        record.advance(RequestState::Waiting).unwrap();

        let err = core
            .submit(record, completion_fn(|_, _, _| {}), no_progress())
            .unwrap_err();
        assert!(matches!(err, RestlaneError::InvalidArgument(_)));
    }

    #[test]
    fn test_core_submit_rejects_missing_request() {
        let core = SchedulerCore::new(SchedulerConfig::default());
        let record = RequestRecord::new(1000, Lane::Fast, Payload::new(json!({"user": "x"})));
        assert!(
            core.submit(record, completion_fn(|_, _, _| {}), no_progress())
                .is_err()
        );
        assert!(core.snapshot().is_idle());
    }

    #[test]
    fn test_next_step_dispatches_fast_first() {
        let core = SchedulerCore::new(SchedulerConfig::default());
        core.submit(login_record(Lane::Slow), completion_fn(|_, _, _| {}), no_progress())
            .unwrap();
        core.submit(login_record(Lane::Fast), completion_fn(|_, _, _| {}), no_progress())
            .unwrap();

        match core.next_step() {
            Step::Dispatch(lane, order) => {
                assert_eq!(lane, Lane::Fast);
                assert_eq!(order.event_id.raw(), 1000);
            }
            _ => panic!("Expected a FAST dispatch"),
        }
        assert_eq!(core.snapshot().processing_count(Lane::Fast), 1);
    }

    #[test]
    fn test_next_step_drops_unrecognized_event() {
        let core = SchedulerCore::new(SchedulerConfig::default());
        let record = RequestRecord::new(9999, Lane::Fast, Payload::new(json!({"user": "x"})));
        core.submit(record, completion_fn(|_, _, _| panic!("must not complete")), no_progress())
            .unwrap();

        assert!(matches!(core.next_step(), Step::Dropped));
        assert!(matches!(core.next_step(), Step::Idle));
    }

    #[test]
    fn test_next_step_drops_non_rest_event() {
        let core = SchedulerCore::new(SchedulerConfig::default());
        let record = RequestRecord::new(2000, Lane::Slow, Payload::default());
        core.submit(record, completion_fn(|_, _, _| {}), no_progress())
            .unwrap();

        assert!(matches!(core.next_step(), Step::Dropped));
    }

    #[test]
    fn test_report_outcome_completes_head_once() {
        let core = SchedulerCore::new(SchedulerConfig::default());
        let completed = Arc::new(AtomicU32::new(0));
        core.submit(login_record(Lane::Fast), counting_callback(completed.clone()), no_progress())
            .unwrap();
        assert!(matches!(core.next_step(), Step::Dispatch(Lane::Fast, _)));

        core.report_outcome(Lane::Fast, Ok(Response::ok(json!({}))))
            .unwrap();
        let second = core.report_outcome(Lane::Fast, Ok(Response::ok(json!({}))));

        assert!(matches!(second, Err(RestlaneError::StaleReport { .. })));
        assert_eq!(completed.load(Ordering::SeqCst), 1);
        assert_eq!(core.rendezvous.available_permits(), 1);
    }

    #[test]
    fn test_report_outcome_ignores_waiting_head() {
        let core = SchedulerCore::new(SchedulerConfig::default());
        let completed = Arc::new(AtomicU32::new(0));
        core.submit(login_record(Lane::Slow), counting_callback(completed.clone()), no_progress())
            .unwrap();

        let result = core.report_outcome(Lane::Slow, Ok(Response::ok(json!({}))));

        assert!(matches!(result, Err(RestlaneError::StaleReport { .. })));
        assert_eq!(completed.load(Ordering::SeqCst), 0);
        assert_eq!(core.snapshot().slow.len(), 1);
        assert_eq!(core.rendezvous.available_permits(), 0);
    }

    #[test]
    fn test_report_outcome_failure_code() {
        let core = SchedulerCore::new(SchedulerConfig::default());
        let codes = Arc::new(Mutex::new(Vec::new()));
        let sink = codes.clone();
        core.submit(
            login_record(Lane::Fast),
            completion_fn(move |_, code, response| {
                sink.lock().unwrap().push((code, response.status));
            }),
            no_progress(),
        )
        .unwrap();
        assert!(matches!(core.next_step(), Step::Dispatch(..)));

        core.report_outcome(
            Lane::Fast,
            Err(TransportError::Status {
                code: 500,
                message: "boom".to_string(),
            }),
        )
        .unwrap();

        assert_eq!(*codes.lock().unwrap(), vec![(ResultCode::Failure, 500)]);
    }

    #[test]
    fn test_report_progress_only_for_processing_head() {
        let core = SchedulerCore::new(SchedulerConfig::default());
        let progress = Arc::new(Mutex::new(Vec::new()));
        let sink = progress.clone();
        core.submit(
            login_record(Lane::Slow),
            completion_fn(|_, _, _| {}),
            progress_fn(move |_, fraction, resource| {
                sink.lock().unwrap().push((fraction, resource.to_string()));
            }),
        )
        .unwrap();

        assert!(core.report_progress(Lane::Slow, 0.1, "early").is_err());
        assert!(core.report_progress(Lane::Fast, 0.1, "empty").is_err());

        assert!(matches!(core.next_step(), Step::Dispatch(Lane::Slow, _)));
        core.report_progress(Lane::Slow, 0.5, "pic.jpg").unwrap();

        assert_eq!(*progress.lock().unwrap(), vec![(0.5, "pic.jpg".to_string())]);
    }

    #[test]
    fn test_panicking_callback_is_contained() {
        let core = SchedulerCore::new(SchedulerConfig::default());
        core.submit(
            login_record(Lane::Fast),
            completion_fn(|_, _, _| panic!("callback bug")),
            no_progress(),
        )
        .unwrap();
        assert!(matches!(core.next_step(), Step::Dispatch(..)));

        core.report_outcome(Lane::Fast, Ok(Response::ok(json!({}))))
            .unwrap();

        assert!(core.snapshot().is_idle());
        assert_eq!(core.rendezvous.available_permits(), 1);
    }

    #[test]
    fn test_per_lane_mode_does_not_release_rendezvous() {
        let core = SchedulerCore::new(SchedulerConfig::default().per_lane());
        core.submit(login_record(Lane::Fast), completion_fn(|_, _, _| {}), no_progress())
            .unwrap();
        assert!(matches!(core.next_step(), Step::Dispatch(..)));
        core.report_outcome(Lane::Fast, Ok(Response::ok(json!({}))))
            .unwrap();
        assert_eq!(core.rendezvous.available_permits(), 0);
    }

    #[test]
    fn test_absorb() {
        assert!(absorb(Ok(())));
        assert!(!absorb(Err(stale(Lane::Fast, "queue is empty"))));
        assert!(!absorb(Err(RestlaneError::UnrecognizedEvent(9999))));
        assert!(!absorb(Err(RestlaneError::InvalidArgument("x".to_string()))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_scheduler_completes_fast_request() {
        let transport = Arc::new(MockTransport::new().with_delay(Duration::from_millis(5)));
        let scheduler = Scheduler::start(SchedulerConfig::default(), transport.clone());
        let completed = Arc::new(AtomicU32::new(0));

        scheduler
            .submit(login_record(Lane::Fast), counting_callback(completed.clone()), no_progress())
            .unwrap();

        for _ in 0..100 {
            if completed.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(completed.load(Ordering::SeqCst), 1);
        assert_eq!(transport.call_count(), 1);
        assert!(scheduler.snapshot().is_idle());
        assert!(scheduler.is_running());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_scheduler_stale_reports_return_false() {
        let scheduler = Scheduler::start(SchedulerConfig::default(), Arc::new(MockTransport::new()));

        assert!(!scheduler.report_outcome(Lane::Fast, Ok(Response::ok(json!({})))));
        assert!(!scheduler.report_progress(Lane::Slow, 0.5, "nothing"));
        assert!(scheduler.is_running());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_scheduler_shutdown_stops_loop() {
        let scheduler = Scheduler::start(SchedulerConfig::default(), Arc::new(MockTransport::new()));
        scheduler.shutdown();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!scheduler.is_running());
    }
}
