//! Evaluation Workers
//!
//! Each worker loops: pop the next due work item (blocking), bind a
//! request context to the item's tenant, evaluate, ack. Workers exit when
//! the `done` signal flips or the scheduler queue closes.

use std::sync::Arc;

use chunkhouse_core::RequestContext;
use tokio::sync::watch;
use tracing::debug;

use crate::ruler::Ruler;
use crate::scheduler::Scheduler;

pub(crate) struct Worker {
    pub(crate) id: usize,
    pub(crate) scheduler: Arc<Scheduler>,
    pub(crate) ruler: Arc<Ruler>,
    pub(crate) done: watch::Receiver<bool>,
}

impl Worker {
    pub(crate) async fn run(mut self) {
        loop {
            if *self.done.borrow() {
                debug!(worker = self.id, "Stop requested, terminating worker");
                return;
            }

            let item = tokio::select! {
                _ = wait_for_done(&mut self.done) => {
                    debug!(worker = self.id, "Stop requested, terminating worker");
                    return;
                }
                item = self.scheduler.next_work_item() => item,
            };
            let Some(item) = item else {
                debug!(worker = self.id, "Queue closed, terminating worker");
                return;
            };

            let ctx = RequestContext::with_tenant(&item.tenant);
            self.ruler.evaluate(&ctx, &item.rules).await;
            self.scheduler.work_item_done(item);
        }
    }
}

async fn wait_for_done(done: &mut watch::Receiver<bool>) {
    loop {
        if *done.borrow() {
            return;
        }
        if done.changed().await.is_err() {
            return;
        }
    }
}
