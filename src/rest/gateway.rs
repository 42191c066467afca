//! REST gateway: the submission facade in front of the scheduler.
//!
//! `submit` builds the request record for a REST event, fills in the HTTP
//! request from its route and attaches callbacks that post completion and
//! progress back into the dispatch engine inbox.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::route::ApiRoute;
use crate::config::ApiConfig;
use crate::domain::{
    CompletionCallback, EventId, Lane, Payload, ProgressCallback, RequestRecord, completion_fn, progress_fn,
};
use crate::error::Result;
use crate::events::EngineEvent;
use crate::scheduler::Scheduler;

pub struct RestGateway {
    scheduler: Arc<Scheduler>,
    inbox: mpsc::UnboundedSender<EngineEvent>,
    api: ApiConfig,
}

impl RestGateway {
    pub fn new(scheduler: Arc<Scheduler>, inbox: mpsc::UnboundedSender<EngineEvent>, api: ApiConfig) -> Self {
        Self { scheduler, inbox, api }
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Queue a REST call whose outcome is republished through the engine.
    ///
    /// Returns the id of the queued record.
    pub fn submit(&self, event_id: impl Into<EventId>, lane: Lane, payload: Payload) -> Result<String> {
        let record = RequestRecord::new(event_id, lane, payload);
        let id = record.id.clone();
        let (on_complete, on_progress) = self.republishing_callbacks();
        self.submit_with(record, on_complete, on_progress)?;
        Ok(id)
    }

    /// Queue `record` with caller-supplied callbacks
    pub fn submit_with(
        &self,
        mut record: RequestRecord,
        on_complete: CompletionCallback,
        on_progress: ProgressCallback,
    ) -> Result<()> {
        self.attach_route(&mut record)?;
        log::debug!("Submitting {} event {} on {} lane", record.id, record.event_id, record.lane);
        self.scheduler.submit(record, on_complete, on_progress)
    }

    fn attach_route(&self, record: &mut RequestRecord) -> Result<()> {
        if !record.event_id.is_rest() || record.payload.request.is_some() {
            return Ok(());
        }
        if let Some(route) = ApiRoute::for_event(record.event_id, &record.payload.params)? {
            record.payload.request = Some(route.to_request(&self.api));
        }
        Ok(())
    }

    fn republishing_callbacks(&self) -> (CompletionCallback, ProgressCallback) {
        let inbox = self.inbox.clone();
        let on_complete = completion_fn(move |event_id, result, response| {
            if inbox
                .send(EngineEvent::completed(event_id, result, response.clone()))
                .is_err()
            {
                log::debug!("Engine inbox closed, completion of {} not republished", event_id);
            }
        });

        let inbox = self.inbox.clone();
        let on_progress = progress_fn(move |event_id, fraction, resource| {
            if inbox
                .send(EngineEvent::progress(event_id, fraction, resource))
                .is_err()
            {
                log::debug!("Engine inbox closed, progress of {} not republished", event_id);
            }
        });

        (on_complete, on_progress)
    }
}
