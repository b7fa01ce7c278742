//! Serial event queue for the migration driver.
//!
//! One worker task consumes events strictly one at a time; everything else
//! only submits. Submissions either append at the tail, prepend at the head
//! (used once at startup so recovery runs before anything else), or are
//! deferred to a deadline. While the worker is inside a long-running
//! handler, further events simply queue up behind it.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, VecDeque};

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::driver::DriverCore;
use super::events::DriverEvent;
use crate::error::{DriverError, MigrationClientError};

/// A queue submission from outside the worker.
pub(crate) enum Submission {
    /// Enqueue at the tail.
    Append(DriverEvent),
    /// Enqueue at the head.
    Prepend(DriverEvent),
    /// Enqueue once `deadline` has passed.
    Deferred {
        /// Earliest instant the event may run.
        deadline: Instant,
        /// The event.
        event: DriverEvent,
    },
}

/// Cheap-to-clone submission side of the queue.
#[derive(Clone)]
pub(crate) struct EventQueueHandle {
    tx: mpsc::UnboundedSender<Submission>,
    cancel: CancellationToken,
}

impl EventQueueHandle {
    /// Enqueue at the tail. Rejected with a queue-closed completion once
    /// shutdown began.
    pub(crate) fn append(&self, event: DriverEvent) {
        self.submit(Submission::Append(event));
    }

    /// Enqueue at the head.
    pub(crate) fn prepend(&self, event: DriverEvent) {
        self.submit(Submission::Prepend(event));
    }

    /// Enqueue to run no earlier than `deadline`.
    pub(crate) fn schedule_deferred(&self, deadline: Instant, event: DriverEvent) {
        self.submit(Submission::Deferred { deadline, event });
    }

    /// Begin a soft shutdown: the in-flight event completes, already queued
    /// events drain, deferred events are rejected.
    pub(crate) fn shutdown(&self) {
        self.cancel.cancel();
    }

    fn submit(&self, submission: Submission) {
        if self.cancel.is_cancelled() {
            Self::reject(submission);
            return;
        }
        if let Err(mpsc::error::SendError(submission)) = self.tx.send(submission) {
            Self::reject(submission);
        }
    }

    fn reject(submission: Submission) {
        let event = match submission {
            Submission::Append(event)
            | Submission::Prepend(event)
            | Submission::Deferred { event, .. } => event,
        };
        trace!(event = event.name(), "rejecting event, queue is closed");
        event.reject_closed();
    }
}

/// An event parked until its deadline.
struct DeferredEntry {
    deadline: Instant,
    seq: u64,
    event: DriverEvent,
}

impl PartialEq for DeferredEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for DeferredEntry {}

impl PartialOrd for DeferredEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DeferredEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.deadline
            .cmp(&other.deadline)
            .then(self.seq.cmp(&other.seq))
    }
}

/// Deadline-ordered side structure for deferred events. Same-deadline ties
/// fire in insertion order.
#[derive(Default)]
struct DeferredQueue {
    heap: BinaryHeap<Reverse<DeferredEntry>>,
    next_seq: u64,
}

impl DeferredQueue {
    fn push(&mut self, deadline: Instant, event: DriverEvent) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(DeferredEntry {
            deadline,
            seq,
            event,
        }));
    }

    /// Next deadline to wake up for, if any event is parked.
    fn next_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|Reverse(entry)| entry.deadline)
    }

    /// Pop the next event whose deadline has passed.
    fn pop_due(&mut self, now: Instant) -> Option<DriverEvent> {
        if self.next_deadline()? <= now {
            self.heap.pop().map(|Reverse(entry)| entry.event)
        } else {
            None
        }
    }

    fn drain(&mut self) -> Vec<DriverEvent> {
        let mut events = Vec::with_capacity(self.heap.len());
        while let Some(Reverse(entry)) = self.heap.pop() {
            events.push(entry.event);
        }
        events
    }
}

/// The consuming side of the queue, owned by the worker task.
pub(crate) struct EventLoop {
    rx: mpsc::UnboundedReceiver<Submission>,
    cancel: CancellationToken,
    ready: VecDeque<DriverEvent>,
    deferred: DeferredQueue,
}

impl EventLoop {
    /// Create a connected handle/loop pair.
    pub(crate) fn channel() -> (EventQueueHandle, EventLoop) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = EventQueueHandle {
            tx,
            cancel: cancel.clone(),
        };
        let event_loop = EventLoop {
            rx,
            cancel,
            ready: VecDeque::new(),
            deferred: DeferredQueue::default(),
        };
        (handle, event_loop)
    }

    /// Run the worker until shutdown.
    pub(crate) async fn run(mut self, mut core: DriverCore) {
        loop {
            while let Ok(submission) = self.rx.try_recv() {
                self.admit(submission);
            }
            while let Some(event) = self.deferred.pop_due(Instant::now()) {
                self.ready.push_back(event);
            }

            if let Some(event) = self.ready.pop_front() {
                Self::dispatch(&mut core, event).await;
                continue;
            }

            if self.cancel.is_cancelled() {
                break;
            }
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                submission = self.rx.recv() => match submission {
                    Some(submission) => self.admit(submission),
                    None => break,
                },
                _ = Self::sleep_until(self.deferred.next_deadline()) => {}
            }
        }
        self.drain(&mut core).await;
        debug!("migration driver event loop stopped");
    }

    fn admit(&mut self, submission: Submission) {
        match submission {
            Submission::Append(event) => self.ready.push_back(event),
            Submission::Prepend(event) => self.ready.push_front(event),
            Submission::Deferred { deadline, event } => self.deferred.push(deadline, event),
        }
    }

    async fn sleep_until(deadline: Option<Instant>) {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }

    /// Finish already queued events, then reject what never became due.
    async fn drain(mut self, core: &mut DriverCore) {
        self.rx.close();
        while let Ok(submission) = self.rx.try_recv() {
            self.admit(submission);
        }
        while let Some(event) = self.ready.pop_front() {
            Self::dispatch(core, event).await;
        }
        for event in self.deferred.drain() {
            event.reject_closed();
        }
    }

    async fn dispatch(core: &mut DriverCore, event: DriverEvent) {
        let name = event.name();
        trace!(event = name, "processing driver event");
        if let Err(error) = core.handle(event).await {
            Self::classify(core, name, &error);
        }
        core.sync_view().await;
    }

    /// Per-event exception policy: authentication failures and unknown
    /// errors go to the fault handler; transient store errors wait for the
    /// next poll; a closed queue is uninteresting.
    fn classify(core: &DriverCore, event: &'static str, error: &DriverError) {
        match error {
            DriverError::Client(MigrationClientError::Auth(_)) => {
                core.report_fault(
                    &format!("encountered legacy store authentication error in {event}"),
                    error,
                );
            }
            DriverError::Client(MigrationClientError::Store(_)) => {
                info!(event, %error, "transient legacy store error, will retry on the next poll");
            }
            DriverError::QueueClosed => {
                debug!(event, "not processing event because the queue is closed");
            }
            _ => {
                core.report_fault(&format!("unhandled error in {event}"), error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn poll() -> DriverEvent {
        DriverEvent::Poll
    }

    #[tokio::test]
    async fn deferred_queue_orders_by_deadline_then_insertion() {
        let mut queue = DeferredQueue::default();
        let now = Instant::now();
        let later = now + Duration::from_millis(50);

        queue.push(later, DriverEvent::SendRpcs);
        queue.push(now, DriverEvent::Poll);
        queue.push(now, DriverEvent::WaitForBrokers);

        assert_eq!(queue.next_deadline(), Some(now));
        assert!(matches!(queue.pop_due(now), Some(DriverEvent::Poll)));
        assert!(matches!(
            queue.pop_due(now),
            Some(DriverEvent::WaitForBrokers)
        ));
        // The later entry is not due yet.
        assert!(queue.pop_due(now).is_none());
        assert!(matches!(queue.pop_due(later), Some(DriverEvent::SendRpcs)));
        assert!(queue.pop_due(later).is_none());
    }

    #[tokio::test]
    async fn deferred_queue_never_fires_early() {
        let mut queue = DeferredQueue::default();
        let deadline = Instant::now() + Duration::from_secs(60);
        queue.push(deadline, poll());
        assert!(queue.pop_due(Instant::now()).is_none());
        assert_eq!(queue.next_deadline(), Some(deadline));
    }
}
