//! Per-sender serialization of inbound messages.
//!
//! Admission is decided in [`Dispatcher::dispatch`], against the time the
//! message arrived. Each sender then gets a worker task that runs the rest
//! of the pipeline for that sender's messages one at a time, in arrival
//! order. Different senders run concurrently, bounded by a shared
//! semaphore. Workers exit after a quiet period so idle senders cost
//! nothing.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use {
    concierge_channels::SkipReason,
    concierge_common::InboundMessage,
    dashmap::{DashMap, mapref::entry::Entry},
    tokio::sync::{
        Semaphore,
        mpsc::{self, error::TrySendError},
    },
    tracing::{debug, warn},
};

use crate::pipeline::{Admission, RelayPipeline};

#[derive(Debug, Clone, Copy)]
pub struct DispatcherLimits {
    /// Pipelines allowed to run at the same time across all senders.
    pub max_in_flight: usize,
    /// Jobs buffered per sender; beyond this new messages are dropped.
    pub queue_depth: usize,
    /// A worker with nothing to do for this long exits.
    pub idle_timeout: Duration,
}

impl Default for DispatcherLimits {
    fn default() -> Self {
        Self {
            max_in_flight: 32,
            queue_depth: 64,
            idle_timeout: Duration::from_secs(300),
        }
    }
}

/// What [`Dispatcher::dispatch`] did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// Admitted and queued for a reply.
    Queued,
    /// Over the limit; a throttle notice was queued instead.
    Throttled,
    /// Dropped by the inbound filter.
    Skipped(SkipReason),
    /// The sender's queue was full and the message was dropped.
    Overflow,
}

enum Job {
    Relay(InboundMessage),
    Notice,
}

struct Worker {
    id: u64,
    tx: mpsc::Sender<Job>,
}

/// Routes inbound messages to per-sender workers.
#[derive(Clone)]
pub struct Dispatcher {
    pipeline: Arc<RelayPipeline>,
    workers: Arc<DashMap<String, Worker>>,
    permits: Arc<Semaphore>,
    limits: DispatcherLimits,
    next_id: Arc<AtomicU64>,
}

impl Dispatcher {
    pub fn new(pipeline: Arc<RelayPipeline>, limits: DispatcherLimits) -> Self {
        Self {
            pipeline,
            workers: Arc::new(DashMap::new()),
            permits: Arc::new(Semaphore::new(limits.max_in_flight.max(1))),
            limits,
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn active_workers(&self) -> usize {
        self.workers.len()
    }

    /// Admit `msg` as arriving now and queue its job behind earlier
    /// messages from the same sender. Never waits.
    pub fn dispatch(&self, msg: InboundMessage) -> Dispatched {
        self.dispatch_at(msg, Instant::now())
    }

    /// Like [`dispatch`](Self::dispatch) with an explicit arrival time.
    pub fn dispatch_at(&self, msg: InboundMessage, arrived: Instant) -> Dispatched {
        let sender = msg.sender_id.clone();
        let (job, queued) = match self.pipeline.admit(&msg, arrived) {
            Admission::Skip(reason) => return Dispatched::Skipped(reason),
            Admission::Throttled => (Job::Notice, Dispatched::Throttled),
            Admission::Admitted => (Job::Relay(msg), Dispatched::Queued),
        };

        let mut job = job;
        loop {
            // Enqueue under the entry lock so an idle worker cannot retire
            // between the lookup and the send.
            match self.workers.entry(sender.clone()) {
                Entry::Occupied(occupied) => {
                    let sent = occupied.get().tx.try_send(job);
                    match sent {
                        Ok(()) => return queued,
                        Err(TrySendError::Full(_)) => {
                            warn!(sender = %sender, "sender queue full, dropping message");
                            return Dispatched::Overflow;
                        },
                        Err(TrySendError::Closed(back)) => {
                            job = back;
                            occupied.remove();
                        },
                    }
                },
                Entry::Vacant(vacant) => {
                    let worker = self.spawn_worker(&sender);
                    match worker.tx.try_send(job) {
                        Ok(()) => {
                            vacant.insert(worker);
                            return queued;
                        },
                        Err(TrySendError::Full(back) | TrySendError::Closed(back)) => job = back,
                    }
                },
            }
        }
    }

    fn spawn_worker(&self, sender: &str) -> Worker {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.limits.queue_depth.max(1));
        debug!(sender, worker = id, "starting sender worker");
        tokio::spawn(run_worker(
            sender.to_string(),
            id,
            rx,
            Arc::clone(&self.pipeline),
            Arc::clone(&self.permits),
            Arc::clone(&self.workers),
            self.limits.idle_timeout,
        ));
        Worker { id, tx }
    }
}

async fn run_worker(
    sender: String,
    id: u64,
    mut rx: mpsc::Receiver<Job>,
    pipeline: Arc<RelayPipeline>,
    permits: Arc<Semaphore>,
    workers: Arc<DashMap<String, Worker>>,
    idle_timeout: Duration,
) {
    loop {
        let job = match tokio::time::timeout(idle_timeout, rx.recv()).await {
            Ok(Some(job)) => job,
            Ok(None) => break,
            Err(_) => {
                let retired = workers
                    .remove_if(&sender, |_, w| w.id == id && rx.is_empty())
                    .is_some();
                if retired {
                    break;
                }
                continue;
            },
        };

        let Ok(_permit) = permits.acquire().await else {
            warn!(sender = %sender, "dispatcher closed, dropping message");
            break;
        };
        let outcome = match job {
            Job::Relay(msg) => pipeline.relay(&msg).await,
            Job::Notice => pipeline.send_throttle_notice(&sender).await,
        };
        debug!(sender = %sender, ?outcome, "message processed");
    }

    rx.close();
    debug!(sender = %sender, worker = id, "sender worker stopped");
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        crate::pipeline::tests::{Backend, Recorder, config, pipeline},
        concierge_config::RateLimitConfig,
    };

    async fn settle(rec: &Recorder, expected_calls: usize) {
        for _ in 0..1_000 {
            if rec.calls().len() >= expected_calls {
                return;
            }
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn same_sender_is_processed_in_order() {
        let rec = Recorder::new(Backend::Reply);
        let dispatcher = Dispatcher::new(
            Arc::new(pipeline(&config(), &rec)),
            DispatcherLimits::default(),
        );

        for text in ["one", "two", "three"] {
            dispatcher.dispatch(InboundMessage::direct("A", text));
        }
        settle(&rec, 12).await;

        let replies: Vec<_> = rec
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("reply:"))
            .collect();
        assert_eq!(replies, vec!["reply:A:one", "reply:A:two", "reply:A:three"]);
        assert_eq!(dispatcher.active_workers(), 1);
    }

    #[tokio::test]
    async fn one_worker_per_sender() {
        let rec = Recorder::new(Backend::Reply);
        let dispatcher = Dispatcher::new(
            Arc::new(pipeline(&config(), &rec)),
            DispatcherLimits::default(),
        );

        for sender in ["A", "B", "C"] {
            dispatcher.dispatch(InboundMessage::direct(sender, "hi"));
        }
        settle(&rec, 12).await;

        assert_eq!(dispatcher.active_workers(), 3);
        assert_eq!(
            rec.calls().iter().filter(|c| c.starts_with("send:")).count(),
            3
        );
    }

    #[tokio::test(start_paused = true)]
    async fn idle_workers_retire() {
        let rec = Recorder::new(Backend::Reply);
        let dispatcher = Dispatcher::new(
            Arc::new(pipeline(&config(), &rec)),
            DispatcherLimits {
                idle_timeout: Duration::from_secs(5),
                ..DispatcherLimits::default()
            },
        );

        dispatcher.dispatch(InboundMessage::direct("A", "hi"));
        settle(&rec, 4).await;
        assert_eq!(dispatcher.active_workers(), 1);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(dispatcher.active_workers(), 0);

        // A later message starts a fresh worker.
        dispatcher.dispatch(InboundMessage::direct("A", "again"));
        settle(&rec, 8).await;
        assert!(rec.calls().contains(&"reply:A:again".to_string()));
    }

    #[tokio::test]
    async fn admission_counts_arrival_not_processing_time() {
        // Each reply takes longer than half the window, so stamping messages
        // when the worker reaches them would spread them past the limit.
        let rec = Recorder::new(Backend::Slow(Duration::from_millis(600)));
        let mut cfg = config();
        cfg.rate_limit = RateLimitConfig {
            max_messages: 2,
            window_secs: 1,
        };
        let dispatcher = Dispatcher::new(
            Arc::new(pipeline(&cfg, &rec)),
            DispatcherLimits::default(),
        );

        let outcomes: Vec<_> = (0..3)
            .map(|_| dispatcher.dispatch(InboundMessage::direct("A", "hello")))
            .collect();
        assert_eq!(outcomes, vec![
            Dispatched::Queued,
            Dispatched::Queued,
            Dispatched::Throttled
        ]);

        rec.wait_for_calls(9).await;
        let notice = format!("send:A:{}", cfg.replies.throttled);
        assert_eq!(rec.count("reply:"), 2);
        assert_eq!(rec.calls().iter().filter(|c| **c == notice).count(), 1);
        assert_eq!(rec.calls().last(), Some(&notice));
    }

    #[tokio::test]
    async fn filtered_messages_are_not_queued() {
        let rec = Recorder::new(Backend::Reply);
        let dispatcher = Dispatcher::new(
            Arc::new(pipeline(&config(), &rec)),
            DispatcherLimits::default(),
        );

        let outcome = dispatcher.dispatch(InboundMessage::direct("A", "  "));
        assert_eq!(outcome, Dispatched::Skipped(SkipReason::EmptyBody));
        assert_eq!(dispatcher.active_workers(), 0);
    }

    #[tokio::test]
    async fn full_sender_queue_drops_instead_of_waiting() {
        let rec = Recorder::new(Backend::Slow(Duration::from_secs(3600)));
        let dispatcher = Dispatcher::new(
            Arc::new(pipeline(&config(), &rec)),
            DispatcherLimits {
                queue_depth: 1,
                ..DispatcherLimits::default()
            },
        );

        // Nothing yields in between, so the worker has not drained its slot.
        assert_eq!(
            dispatcher.dispatch(InboundMessage::direct("A", "one")),
            Dispatched::Queued
        );
        assert_eq!(
            dispatcher.dispatch(InboundMessage::direct("A", "two")),
            Dispatched::Overflow
        );
        // Other senders are unaffected.
        assert_eq!(
            dispatcher.dispatch(InboundMessage::direct("B", "hi")),
            Dispatched::Queued
        );
        assert_eq!(dispatcher.active_workers(), 2);
    }
}
