//! Lane workers.
//!
//! Each lane owns one worker task. The worker receives work orders from the
//! scheduling loop, performs the transport call matching the payload shape
//! and reports progress and the final outcome back to the scheduler.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::core::{SchedulerCore, absorb};
use crate::domain::{CallKind, EventId, Lane, Payload, Response, Transfer};
use crate::transport::{ProgressReporter, Transport, TransportError};

/// What the scheduling loop hands to a lane worker
#[derive(Debug, Clone)]
pub(crate) struct WorkOrder {
    pub request_id: String,
    pub event_id: EventId,
    pub payload: Payload,
}

/// Handle to a running lane worker task
pub(crate) struct LaneWorker {
    lane: Lane,
    tx: mpsc::UnboundedSender<WorkOrder>,
    handle: JoinHandle<()>,
}

impl LaneWorker {
    /// Spawn the worker task for `lane` on the current runtime
    pub(crate) fn spawn(lane: Lane, core: Arc<SchedulerCore>, transport: Arc<dyn Transport>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_worker(lane, core, transport, rx));
        Self { lane, tx, handle }
    }

    pub(crate) fn lane(&self) -> Lane {
        self.lane
    }

    pub(crate) fn sender(&self) -> mpsc::UnboundedSender<WorkOrder> {
        self.tx.clone()
    }

    pub(crate) fn abort(&self) {
        self.handle.abort();
    }
}

async fn run_worker(
    lane: Lane,
    core: Arc<SchedulerCore>,
    transport: Arc<dyn Transport>,
    mut rx: mpsc::UnboundedReceiver<WorkOrder>,
) {
    while let Some(order) = rx.recv().await {
        let kind = order.payload.call_kind(lane);
        tracing::debug!(
            request_id = %order.request_id,
            event_id = %order.event_id,
            lane = %lane,
            kind = ?kind,
            "Starting transport call"
        );

        if kind.is_file_transfer() {
            core.set_transfer_busy(lane, true);
        }

        let reporter = {
            let core = core.clone();
            let resource = order.payload.resource();
            ProgressReporter::new(move |fraction| {
                absorb(core.report_progress(lane, fraction, &resource));
            })
        };

        let outcome = AssertUnwindSafe(perform(transport.as_ref(), kind, &order.payload, &reporter))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(TransportError::Panicked(panic_message(panic.as_ref()))));

        if let Err(e) = &outcome {
            tracing::warn!(
                request_id = %order.request_id,
                event_id = %order.event_id,
                lane = %lane,
                error = %e,
                "Transport call failed"
            );
        }

        if kind.is_file_transfer() {
            core.set_transfer_busy(lane, false);
        }

        absorb(core.report_outcome(lane, outcome));
    }

    tracing::debug!(lane = %lane, "Lane worker channel closed");
}

/// Run the transport call selected by `kind` for `payload`
pub(crate) async fn perform(
    transport: &dyn Transport,
    kind: CallKind,
    payload: &Payload,
    progress: &ProgressReporter,
) -> Result<Response, TransportError> {
    match (kind, &payload.transfer, &payload.request) {
        (
            CallKind::Download,
            Some(Transfer::Download {
                source_url,
                destination,
            }),
            _,
        ) => transport.download(source_url, destination, progress).await,
        (CallKind::Multipart, Some(Transfer::Multipart { fields, files }), Some(request)) => {
            transport.multipart_upload(fields, files, request, progress).await
        }
        (CallKind::Upload, Some(Transfer::Upload { source }), Some(request)) => {
            transport.upload(source, request, progress).await
        }
        (CallKind::Simple, _, Some(request)) => transport.simple_call(request).await,
        _ => Err(TransportError::InvalidRequest(format!(
            "payload cannot drive a {:?} call",
            kind
        ))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
