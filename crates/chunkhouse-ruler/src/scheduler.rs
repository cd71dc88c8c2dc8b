//! Rule Evaluation Scheduler
//!
//! Maintains a due-time-ordered queue of per-tenant work items and hands
//! them to workers. Three guarantees matter here:
//!
//! - **No double dispatch.** A tenant handed to one worker is marked
//!   in-flight and cannot be handed to another until the worker acks with
//!   [`Scheduler::work_item_done`].
//! - **Bounded starvation.** A tenant evaluated at `t` is requeued for
//!   `max(now, t + evaluation_interval)`, independent of other tenants'
//!   load, so slow evaluations delay rather than pile up.
//! - **Clean close.** After [`Scheduler::stop`], [`Scheduler::next_work_item`]
//!   returns `None` to every blocked worker.
//!
//! The poll loop refreshes the per-tenant rule view from the configs API;
//! rules are snapshotted at dispatch time, so workers always evaluate the
//! latest configuration.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::configs::RulesProvider;
use crate::rules::Rule;

/// One tenant's rules, due for evaluation.
#[derive(Debug)]
pub struct WorkItem {
    pub tenant: String,
    pub rules: Vec<Rule>,
    /// The nominal due time; the requeue cadence is anchored to this, not
    /// to when a worker got around to the item.
    pub scheduled_at: Instant,
}

// Min-heap entry: (due, seq) orders equal due times by insertion.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct QueueEntry {
    due: Instant,
    seq: u64,
    tenant: String,
}

#[derive(Default)]
struct State {
    queue: BinaryHeap<Reverse<QueueEntry>>,
    /// Tenants with an entry in `queue`.
    queued: HashSet<String>,
    /// Tenants currently held by a worker.
    in_flight: HashSet<String>,
    /// Latest rule view per tenant.
    configs: HashMap<String, Vec<Rule>>,
    closed: bool,
    seq: u64,
}

enum Pop {
    Item(WorkItem),
    Closed,
    Empty,
    WaitUntil(Instant),
}

/// Per-tenant timed work queue, fed by the configs poll loop.
pub struct Scheduler {
    provider: Arc<dyn RulesProvider>,
    poll_interval: Duration,
    evaluation_interval: Duration,
    state: Mutex<State>,
    notify: Notify,
    stop: CancellationToken,
}

impl Scheduler {
    pub fn new(
        provider: Arc<dyn RulesProvider>,
        poll_interval: Duration,
        evaluation_interval: Duration,
    ) -> Self {
        Self {
            provider,
            poll_interval,
            evaluation_interval,
            state: Mutex::new(State::default()),
            notify: Notify::new(),
            stop: CancellationToken::new(),
        }
    }

    /// Poll the configs API until stopped. New tenants are enqueued due
    /// immediately; known tenants just get their rule view refreshed.
    pub async fn run(&self) {
        info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            evaluation_interval_ms = self.evaluation_interval.as_millis() as u64,
            "Scheduler started"
        );
        loop {
            match self.provider.rules().await {
                Ok(configs) => self.apply_configs(configs),
                Err(e) => warn!(error = %e, "Failed to poll rule configs, keeping previous view"),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = self.stop.cancelled() => {
                    debug!("Scheduler poll loop exiting");
                    return;
                }
            }
        }
    }

    /// Replace the rule view with a fresh poll result.
    fn apply_configs(&self, configs: HashMap<String, Vec<Rule>>) {
        let now = Instant::now();
        let mut wakeups = 0;
        {
            let mut state = self.state.lock().unwrap();
            if state.closed {
                return;
            }

            let mut fresh: Vec<String> = configs
                .keys()
                .filter(|t| !state.queued.contains(*t) && !state.in_flight.contains(*t))
                .cloned()
                .collect();
            fresh.sort();
            state.configs = configs;

            for tenant in fresh {
                debug!(tenant = %tenant, "Enqueueing tenant for evaluation");
                push(&mut state, tenant, now);
                wakeups += 1;
            }
        }
        for _ in 0..wakeups {
            self.notify.notify_one();
        }
    }

    /// Block until a work item is due, marking its tenant in-flight.
    /// Returns `None` once the scheduler is stopped.
    pub async fn next_work_item(&self) -> Option<WorkItem> {
        loop {
            match self.try_pop(Instant::now()) {
                Pop::Item(item) => {
                    // Another item may already be due; pass the wakeup on
                    // so a second worker does not sleep through it.
                    self.notify.notify_one();
                    return Some(item);
                }
                Pop::Closed => return None,
                Pop::Empty => {
                    tokio::select! {
                        _ = self.notify.notified() => {}
                        _ = self.stop.cancelled() => {}
                    }
                }
                Pop::WaitUntil(due) => {
                    tokio::select! {
                        _ = tokio::time::sleep_until(due) => {}
                        _ = self.notify.notified() => {}
                        _ = self.stop.cancelled() => {}
                    }
                }
            }
        }
    }

    fn try_pop(&self, now: Instant) -> Pop {
        let mut state = self.state.lock().unwrap();
        loop {
            if state.closed {
                return Pop::Closed;
            }
            let Some(Reverse(head)) = state.queue.peek() else {
                return Pop::Empty;
            };
            if head.due > now {
                return Pop::WaitUntil(head.due);
            }

            let Some(Reverse(entry)) = state.queue.pop() else {
                return Pop::Empty;
            };
            state.queued.remove(&entry.tenant);

            match state.configs.get(&entry.tenant) {
                Some(rules) => {
                    let rules = rules.clone();
                    state.in_flight.insert(entry.tenant.clone());
                    return Pop::Item(WorkItem {
                        tenant: entry.tenant,
                        rules,
                        scheduled_at: entry.due,
                    });
                }
                // Config disappeared while queued; drop the entry.
                None => continue,
            }
        }
    }

    /// Ack a finished item and requeue its tenant one evaluation interval
    /// past its nominal due time.
    pub fn work_item_done(&self, item: WorkItem) {
        let mut requeued = false;
        {
            let mut state = self.state.lock().unwrap();
            state.in_flight.remove(&item.tenant);
            if state.closed {
                return;
            }
            if state.configs.contains_key(&item.tenant) {
                let due = (item.scheduled_at + self.evaluation_interval).max(Instant::now());
                push(&mut state, item.tenant, due);
                requeued = true;
            } else {
                debug!(tenant = %item.tenant, "Tenant config removed, not requeueing");
            }
        }
        if requeued {
            self.notify.notify_one();
        }
    }

    /// Close the queue. Blocked `next_work_item` calls return `None`.
    pub fn stop(&self) {
        {
            let mut state = self.state.lock().unwrap();
            state.closed = true;
        }
        self.stop.cancel();
        self.notify.notify_waiters();
        info!("Scheduler stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }
}

fn push(state: &mut State, tenant: String, due: Instant) {
    state.seq += 1;
    let seq = state.seq;
    state.queued.insert(tenant.clone());
    state.queue.push(Reverse(QueueEntry { due, seq, tenant }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use async_trait::async_trait;

    struct StaticProvider {
        configs: HashMap<String, Vec<Rule>>,
    }

    impl StaticProvider {
        fn tenants(tenants: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                configs: tenants
                    .iter()
                    .map(|t| (t.to_string(), vec![Rule::new("r", "up")]))
                    .collect(),
            })
        }
    }

    #[async_trait]
    impl RulesProvider for StaticProvider {
        async fn rules(&self) -> Result<HashMap<String, Vec<Rule>>> {
            Ok(self.configs.clone())
        }
    }

    fn scheduler(provider: Arc<StaticProvider>) -> Scheduler {
        Scheduler::new(
            provider,
            Duration::from_millis(100),
            Duration::from_secs(1),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_tenant_is_due_immediately() {
        let s = scheduler(StaticProvider::tenants(&["a"]));
        s.apply_configs(s.provider.rules().await.unwrap());

        let item = s.next_work_item().await.unwrap();
        assert_eq!(item.tenant, "a");
        assert_eq!(item.rules.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_double_dispatch_while_in_flight() {
        let s = scheduler(StaticProvider::tenants(&["a"]));
        s.apply_configs(s.provider.rules().await.unwrap());

        let item = s.next_work_item().await.unwrap();

        // Re-applying configs must not enqueue the in-flight tenant.
        s.apply_configs(s.provider.rules().await.unwrap());
        assert!(matches!(s.try_pop(Instant::now()), Pop::Empty));

        s.work_item_done(item);
        // Requeued one evaluation interval out, not immediately.
        assert!(matches!(s.try_pop(Instant::now()), Pop::WaitUntil(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_requeue_cadence_is_anchored_to_due_time() {
        let s = scheduler(StaticProvider::tenants(&["a"]));
        s.apply_configs(s.provider.rules().await.unwrap());

        let item = s.next_work_item().await.unwrap();
        let scheduled_at = item.scheduled_at;
        s.work_item_done(item);

        match s.try_pop(Instant::now()) {
            Pop::WaitUntil(due) => assert_eq!(due, scheduled_at + Duration::from_secs(1)),
            other => panic!("expected WaitUntil, got {}", discriminant_name(&other)),
        }

        // Once the interval elapses the item is dispatchable again.
        let item = s.next_work_item().await.unwrap();
        assert_eq!(item.tenant, "a");
        assert_eq!(item.scheduled_at, scheduled_at + Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_evaluation_does_not_pile_up() {
        let s = scheduler(StaticProvider::tenants(&["a"]));
        s.apply_configs(s.provider.rules().await.unwrap());

        let item = s.next_work_item().await.unwrap();
        // Evaluation takes 3 intervals; the requeue lands at now, not in
        // the past, so missed cadences are skipped instead of bursting.
        tokio::time::advance(Duration::from_secs(3)).await;
        let finished_at = Instant::now();
        s.work_item_done(item);

        let item = s.next_work_item().await.unwrap();
        assert!(item.scheduled_at >= finished_at);
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_tenant_is_not_requeued() {
        let s = scheduler(StaticProvider::tenants(&["a"]));
        s.apply_configs(s.provider.rules().await.unwrap());

        let item = s.next_work_item().await.unwrap();
        s.apply_configs(HashMap::new());
        s.work_item_done(item);

        assert!(matches!(s.try_pop(Instant::now()), Pop::Empty));
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_entry_for_removed_tenant_is_dropped() {
        let s = scheduler(StaticProvider::tenants(&["a", "b"]));
        s.apply_configs(s.provider.rules().await.unwrap());

        // Remove "a" while both are queued; only "b" should dispatch.
        let mut remaining = s.provider.rules().await.unwrap();
        remaining.remove("a");
        {
            let mut state = s.state.lock().unwrap();
            state.configs = remaining;
        }

        let item = s.next_work_item().await.unwrap();
        assert_eq!(item.tenant, "b");
        assert!(matches!(s.try_pop(Instant::now()), Pop::Empty));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_unblocks_waiting_workers() {
        let s = Arc::new(scheduler(StaticProvider::tenants(&[])));

        let waiter = {
            let s = s.clone();
            tokio::spawn(async move { s.next_work_item().await })
        };
        tokio::task::yield_now().await;

        s.stop();
        assert!(waiter.await.unwrap().is_none());
        assert!(s.next_work_item().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_equal_due_times_dispatch_in_insertion_order() {
        let s = scheduler(StaticProvider::tenants(&[]));
        let now = Instant::now();
        {
            let mut state = s.state.lock().unwrap();
            state.configs.insert("a".to_string(), vec![]);
            state.configs.insert("b".to_string(), vec![]);
            push(&mut state, "a".to_string(), now);
            push(&mut state, "b".to_string(), now);
        }

        let first = s.next_work_item().await.unwrap();
        let second = s.next_work_item().await.unwrap();
        assert_eq!(first.tenant, "a");
        assert_eq!(second.tenant, "b");
    }

    fn discriminant_name(pop: &Pop) -> &'static str {
        match pop {
            Pop::Item(_) => "Item",
            Pop::Closed => "Closed",
            Pop::Empty => "Empty",
            Pop::WaitUntil(_) => "WaitUntil",
        }
    }
}
