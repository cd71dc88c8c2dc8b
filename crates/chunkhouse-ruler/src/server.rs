//! Ruler Server Lifecycle
//!
//! Owns the scheduler poll loop and the worker pool. The lifecycle is
//! single-shot: `run` may be called once, `stop` tears everything down and
//! returns only after the scheduler loop and every worker have exited.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::configs::{ConfigsClient, RulesProvider};
use crate::error::{Error, Result};
use crate::ruler::Ruler;
use crate::scheduler::Scheduler;
use crate::worker::Worker;

/// Configuration for the rule evaluation server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulerConfig {
    /// Base URL of the rule configs API.
    pub configs_api_url: String,

    /// External URL of this deployment; used only for template expansion
    /// in rule output.
    #[serde(default)]
    pub external_url: Option<String>,

    /// How frequently to evaluate each tenant's rules (default: 15s)
    #[serde(default = "default_evaluation_interval_ms")]
    pub evaluation_interval_ms: u64,

    /// How frequently to poll the configs API (default: 60s)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Number of evaluation workers (default: 4)
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
}

fn default_evaluation_interval_ms() -> u64 {
    15_000
}

fn default_poll_interval_ms() -> u64 {
    60_000
}

fn default_num_workers() -> usize {
    4
}

enum Lifecycle {
    New,
    Running,
    Stopped,
}

/// Rule processing server: scheduler + worker pool.
pub struct RulerServer {
    scheduler: Arc<Scheduler>,
    ruler: Arc<Ruler>,
    num_workers: usize,
    done_tx: watch::Sender<bool>,
    done_rx: watch::Receiver<bool>,
    handles: Vec<JoinHandle<()>>,
    lifecycle: Lifecycle,
}

impl RulerServer {
    /// Build a server polling the HTTP configs API.
    pub fn new(cfg: RulerConfig, ruler: Ruler) -> Result<Self> {
        let provider = Arc::new(ConfigsClient::new(&cfg.configs_api_url)?);
        Self::with_provider(cfg, ruler, provider)
    }

    /// Build a server on any rules provider (tests inject static ones).
    pub fn with_provider(
        cfg: RulerConfig,
        ruler: Ruler,
        provider: Arc<dyn RulesProvider>,
    ) -> Result<Self> {
        if cfg.num_workers == 0 {
            return Err(Error::NoWorkers(cfg.num_workers));
        }

        let scheduler = Arc::new(Scheduler::new(
            provider,
            Duration::from_millis(cfg.poll_interval_ms),
            Duration::from_millis(cfg.evaluation_interval_ms),
        ));
        let (done_tx, done_rx) = watch::channel(false);

        Ok(Self {
            scheduler,
            ruler: Arc::new(ruler),
            num_workers: cfg.num_workers,
            done_tx,
            done_rx,
            handles: Vec::new(),
            lifecycle: Lifecycle::New,
        })
    }

    /// Start the scheduler loop and workers. May be called exactly once.
    pub fn run(&mut self) -> Result<()> {
        match self.lifecycle {
            Lifecycle::New => {}
            Lifecycle::Running => return Err(Error::Lifecycle("already running")),
            Lifecycle::Stopped => return Err(Error::Lifecycle("already stopped")),
        }
        self.lifecycle = Lifecycle::Running;

        let scheduler = self.scheduler.clone();
        self.handles
            .push(tokio::spawn(async move { scheduler.run().await }));

        for id in 0..self.num_workers {
            let worker = Worker {
                id,
                scheduler: self.scheduler.clone(),
                ruler: self.ruler.clone(),
                done: self.done_rx.clone(),
            };
            self.handles.push(tokio::spawn(worker.run()));
        }

        info!(workers = self.num_workers, "Ruler up and running");
        Ok(())
    }

    /// Stop everything. Returns only after the scheduler loop and all
    /// workers have exited.
    pub async fn stop(&mut self) {
        if matches!(self.lifecycle, Lifecycle::Stopped) {
            return;
        }
        self.lifecycle = Lifecycle::Stopped;

        self.scheduler.stop();
        let _ = self.done_tx.send(true);

        for handle in self.handles.drain(..) {
            let _ = handle.await;
        }
        info!("Ruler stopped");
    }
}
