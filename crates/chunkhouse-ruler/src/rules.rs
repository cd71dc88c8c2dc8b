//! Rules Model
//!
//! Recording rules and the collaborator interfaces they are evaluated
//! against. The query engine and the sample sink are external systems; the
//! ruler only needs the two async traits defined here.
//!
//! A [`RuleGroup`] evaluates its rules in order: each rule's expression is
//! run through the engine at the evaluation timestamp, the resulting
//! samples are renamed to the rule's name (static rule labels merged in),
//! and appended via the bound appender. A failing rule is logged and
//! skipped; the rest of the group still evaluates.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chunkhouse_core::{LabelSet, RequestContext, METRIC_NAME};
use serde::Deserialize;
use tracing::warn;

/// One evaluated sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub metric: LabelSet,
    pub timestamp_ms: i64,
    pub value: f64,
}

/// A recording rule: evaluate `expr`, record the result as `name`.
#[derive(Debug, Clone, Deserialize)]
pub struct Rule {
    pub name: String,
    pub expr: String,
    /// Static labels merged into every recorded sample.
    #[serde(default)]
    pub labels: LabelSet,
}

impl Rule {
    pub fn new(name: impl Into<String>, expr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expr: expr.into(),
            labels: LabelSet::new(),
        }
    }
}

/// The external query engine.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Evaluate an expression at an instant, returning its samples.
    async fn query(
        &self,
        ctx: &RequestContext,
        expr: &str,
        at_ms: i64,
    ) -> std::result::Result<Vec<Sample>, String>;
}

/// The downstream sink for evaluated samples (the distributor).
#[async_trait]
pub trait SampleAppender: Send + Sync {
    async fn append(
        &self,
        ctx: &RequestContext,
        samples: Vec<Sample>,
    ) -> std::result::Result<(), String>;
}

/// Collaborators needed to evaluate a group.
#[derive(Clone)]
pub struct GroupOptions {
    pub engine: Arc<dyn QueryEngine>,
    pub appender: Arc<dyn SampleAppender>,
    /// Used only for template expansion in rule output.
    pub external_url: Option<String>,
}

/// Routes evaluated samples back to the distributor under the request's
/// tenant.
struct BoundAppender {
    ctx: RequestContext,
    inner: Arc<dyn SampleAppender>,
}

impl BoundAppender {
    async fn append(&self, rule: &Rule, samples: Vec<Sample>) {
        if samples.is_empty() {
            return;
        }
        if let Err(e) = self.inner.append(&self.ctx, samples).await {
            warn!(rule = %rule.name, error = %e, "Failed to append rule samples");
        }
    }
}

/// A named set of rules evaluated together.
pub struct RuleGroup {
    name: String,
    // Historical evaluation-delay knob; accepted but not consulted.
    #[allow(dead_code)]
    delay: Duration,
    rules: Vec<Rule>,
    opts: GroupOptions,
}

impl RuleGroup {
    pub fn new(name: impl Into<String>, delay: Duration, rules: Vec<Rule>, opts: GroupOptions) -> Self {
        Self {
            name: name.into(),
            delay,
            rules,
            opts,
        }
    }

    /// Evaluate every rule at `at_ms`. Returns the number of rules that
    /// evaluated cleanly.
    pub async fn eval(&self, ctx: &RequestContext, at_ms: i64) -> usize {
        let appender = BoundAppender {
            ctx: ctx.clone(),
            inner: self.opts.appender.clone(),
        };

        let mut succeeded = 0;
        for rule in &self.rules {
            let samples = match self.opts.engine.query(ctx, &rule.expr, at_ms).await {
                Ok(samples) => samples,
                Err(e) => {
                    warn!(
                        group = %self.name,
                        rule = %rule.name,
                        error = %e,
                        "Rule evaluation failed"
                    );
                    continue;
                }
            };

            let recorded = samples
                .into_iter()
                .map(|mut sample| {
                    sample.metric.insert(METRIC_NAME, &rule.name);
                    sample.metric.extend(&rule.labels);
                    sample
                })
                .collect();

            appender.append(rule, recorded).await;
            succeeded += 1;
        }
        succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct StaticEngine {
        fail_exprs: Vec<String>,
    }

    #[async_trait]
    impl QueryEngine for StaticEngine {
        async fn query(
            &self,
            _ctx: &RequestContext,
            expr: &str,
            at_ms: i64,
        ) -> std::result::Result<Vec<Sample>, String> {
            if self.fail_exprs.iter().any(|e| e == expr) {
                return Err("boom".to_string());
            }
            Ok(vec![Sample {
                metric: LabelSet::from_pairs([(METRIC_NAME, "src"), ("job", "api")]),
                timestamp_ms: at_ms,
                value: 1.0,
            }])
        }
    }

    #[derive(Default)]
    struct RecordingAppender {
        samples: Mutex<Vec<Sample>>,
    }

    #[async_trait]
    impl SampleAppender for RecordingAppender {
        async fn append(
            &self,
            _ctx: &RequestContext,
            samples: Vec<Sample>,
        ) -> std::result::Result<(), String> {
            self.samples.lock().unwrap().extend(samples);
            Ok(())
        }
    }

    fn opts(engine: StaticEngine, appender: Arc<RecordingAppender>) -> GroupOptions {
        GroupOptions {
            engine: Arc::new(engine),
            appender,
            external_url: None,
        }
    }

    #[tokio::test]
    async fn test_eval_renames_and_appends() {
        let appender = Arc::new(RecordingAppender::default());
        let group = RuleGroup::new(
            "default",
            Duration::ZERO,
            vec![Rule::new("job:up:rate", "rate(up[1m])")],
            opts(StaticEngine { fail_exprs: vec![] }, appender.clone()),
        );

        let ctx = RequestContext::with_tenant("u1");
        let succeeded = group.eval(&ctx, 1000).await;
        assert_eq!(succeeded, 1);

        let samples = appender.samples.lock().unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].metric.metric_name(), Some("job:up:rate"));
        assert_eq!(samples[0].metric.get("job"), Some("api"));
        assert_eq!(samples[0].timestamp_ms, 1000);
    }

    #[tokio::test]
    async fn test_eval_merges_static_rule_labels() {
        let appender = Arc::new(RecordingAppender::default());
        let mut rule = Rule::new("recorded", "up");
        rule.labels.insert("team", "infra");
        let group = RuleGroup::new(
            "default",
            Duration::ZERO,
            vec![rule],
            opts(StaticEngine { fail_exprs: vec![] }, appender.clone()),
        );

        group.eval(&RequestContext::with_tenant("u1"), 0).await;
        let samples = appender.samples.lock().unwrap();
        assert_eq!(samples[0].metric.get("team"), Some("infra"));
    }

    #[tokio::test]
    async fn test_failing_rule_does_not_stop_the_group() {
        let appender = Arc::new(RecordingAppender::default());
        let group = RuleGroup::new(
            "default",
            Duration::ZERO,
            vec![Rule::new("bad", "broken_expr"), Rule::new("good", "up")],
            opts(
                StaticEngine {
                    fail_exprs: vec!["broken_expr".to_string()],
                },
                appender.clone(),
            ),
        );

        let succeeded = group.eval(&RequestContext::with_tenant("u1"), 0).await;
        assert_eq!(succeeded, 1);
        assert_eq!(appender.samples.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_rule_deserializes_without_labels() {
        let rule: Rule = serde_json::from_str(r#"{"name": "r", "expr": "up"}"#).unwrap();
        assert!(rule.labels.is_empty());
    }
}
