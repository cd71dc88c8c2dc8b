//! Ruler
//!
//! Evaluates a tenant's rules against the query engine and routes the
//! results to the sample appender, timing each group evaluation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chunkhouse_core::RequestContext;
use chunkhouse_observability::metrics::{GROUP_EVALUATION_DURATION, RULES_PROCESSED};
use tracing::debug;

use crate::rules::{GroupOptions, QueryEngine, Rule, RuleGroup, SampleAppender};

/// Evaluates rule groups.
pub struct Ruler {
    engine: Arc<dyn QueryEngine>,
    appender: Arc<dyn SampleAppender>,
    external_url: Option<String>,
}

impl Ruler {
    pub fn new(
        engine: Arc<dyn QueryEngine>,
        appender: Arc<dyn SampleAppender>,
        external_url: Option<String>,
    ) -> Self {
        Self {
            engine,
            appender,
            external_url,
        }
    }

    fn group_options(&self) -> GroupOptions {
        GroupOptions {
            engine: self.engine.clone(),
            appender: self.appender.clone(),
            external_url: self.external_url.clone(),
        }
    }

    /// Evaluate a list of rules in the given context.
    pub async fn evaluate(&self, ctx: &RequestContext, rules: &[Rule]) {
        debug!(rules = rules.len(), "Evaluating rules");

        let start = Instant::now();
        let group = RuleGroup::new(
            "default",
            Duration::ZERO,
            rules.to_vec(),
            self.group_options(),
        );
        let at_ms = chrono::Utc::now().timestamp_millis();
        group.eval(ctx, at_ms).await;

        GROUP_EVALUATION_DURATION.observe(start.elapsed().as_secs_f64());
        RULES_PROCESSED.inc_by(rules.len() as u64);
    }
}
