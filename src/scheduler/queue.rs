//! Lane queues and the selection rule.
//!
//! Both queues and the slow-lane transfer flag live in one struct so a single
//! mutex guards all of them.

use std::collections::VecDeque;

use serde::Serialize;

use crate::domain::{EventId, Lane, RequestRecord, RequestState};

/// One queued record as seen from outside the scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaneEntry {
    pub request_id: String,
    pub event_id: EventId,
    pub state: RequestState,
}

/// Point-in-time view of both lanes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerSnapshot {
    pub fast: Vec<LaneEntry>,
    pub slow: Vec<LaneEntry>,
    pub slow_transfer_busy: bool,
}

impl SchedulerSnapshot {
    pub fn lane(&self, lane: Lane) -> &[LaneEntry] {
        match lane {
            Lane::Fast => &self.fast,
            Lane::Slow => &self.slow,
        }
    }

    pub fn processing_count(&self, lane: Lane) -> usize {
        self.lane(lane)
            .iter()
            .filter(|e| e.state == RequestState::Processing)
            .count()
    }

    pub fn is_idle(&self) -> bool {
        self.fast.is_empty() && self.slow.is_empty()
    }
}

/// FAST and SLOW queues plus the slow-lane transfer flag
#[derive(Debug, Default)]
pub struct LaneQueues {
    fast: VecDeque<RequestRecord>,
    slow: VecDeque<RequestRecord>,
    slow_transfer_busy: bool,
}

impl LaneQueues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: RequestRecord) {
        match record.lane {
            Lane::Fast => self.fast.push_back(record),
            Lane::Slow => self.slow.push_back(record),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fast.is_empty() && self.slow.is_empty()
    }

    pub fn len(&self, lane: Lane) -> usize {
        self.queue(lane).len()
    }

    pub fn head(&self, lane: Lane) -> Option<&RequestRecord> {
        self.queue(lane).front()
    }

    pub fn head_mut(&mut self, lane: Lane) -> Option<&mut RequestRecord> {
        self.queue_mut(lane).front_mut()
    }

    pub fn pop_head(&mut self, lane: Lane) -> Option<RequestRecord> {
        self.queue_mut(lane).pop_front()
    }

    pub fn slow_transfer_busy(&self) -> bool {
        self.slow_transfer_busy
    }

    /// Only the SLOW lane carries transfers; FAST is ignored.
    pub fn set_transfer_busy(&mut self, lane: Lane, busy: bool) {
        if lane == Lane::Slow {
            self.slow_transfer_busy = busy;
        }
    }

    /// Lane whose head should be dispatched next, if any.
    ///
    /// FAST wins whenever its head is waiting. SLOW is eligible only when its
    /// head is waiting and no slow-lane file transfer is in flight. A lane
    /// whose head is already processing is never eligible.
    ///
    /// The transfer flag is defensive: the worker clears it before reporting
    /// the outcome, so while it is set the SLOW head is still PROCESSING and
    /// already blocks its lane.
    pub fn select_next(&self) -> Option<Lane> {
        if self.head_is_waiting(Lane::Fast) {
            Some(Lane::Fast)
        } else if self.head_is_waiting(Lane::Slow) && !self.slow_transfer_busy {
            Some(Lane::Slow)
        } else {
            None
        }
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        let entries = |queue: &VecDeque<RequestRecord>| {
            queue
                .iter()
                .map(|r| LaneEntry {
                    request_id: r.id.clone(),
                    event_id: r.event_id,
                    state: r.state(),
                })
                .collect()
        };
        SchedulerSnapshot {
            fast: entries(&self.fast),
            slow: entries(&self.slow),
            slow_transfer_busy: self.slow_transfer_busy,
        }
    }

    fn head_is_waiting(&self, lane: Lane) -> bool {
        self.head(lane).is_some_and(|r| r.state() == RequestState::Waiting)
    }

    fn queue(&self, lane: Lane) -> &VecDeque<RequestRecord> {
        match lane {
            Lane::Fast => &self.fast,
            Lane::Slow => &self.slow,
        }
    }

    fn queue_mut(&mut self, lane: Lane) -> &mut VecDeque<RequestRecord> {
        match lane {
            Lane::Fast => &mut self.fast,
            Lane::Slow => &mut self.slow,
        }
    }
}
