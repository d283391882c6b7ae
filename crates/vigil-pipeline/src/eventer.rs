use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use prost::Message;
use vigil_common::proto::{self, DataPoint, EventerOut, ValidatorOut};
use vigil_common::types::{Event, Rule};
use vigil_expr::{eval_rule, Env};
use vigil_storage::PipelineStore;

use crate::error::{timed, Result, StageError};
use crate::{require_org, Stage};

/// Joins validated points against the tenant's active rules and records one
/// Event per match.
pub struct Eventer {
    store: Arc<dyn PipelineStore>,
    op_timeout: Duration,
}

impl Eventer {
    pub fn new(store: Arc<dyn PipelineStore>, op_timeout: Duration) -> Self {
        Self { store, op_timeout }
    }

    pub async fn handle(&self, msg: ValidatorOut, now: DateTime<Utc>) -> Result<Vec<EventerOut>> {
        let point = msg
            .point
            .ok_or_else(|| StageError::Malformed("missing point".into()))?;
        let device = msg
            .device
            .ok_or_else(|| StageError::Malformed("missing device".into()))?;
        if point.value.is_none() {
            return Err(StageError::Malformed("point has no value".into()));
        }
        if device.org_id.is_empty() {
            return Err(StageError::Malformed("device has no org".into()));
        }

        require_org(
            self.store.as_ref(),
            &device.org_id,
            self.op_timeout,
            &point.trace_id,
        )
        .await?;

        let candidates = timed(
            self.op_timeout,
            "list rules",
            self.store
                .list_active_rules_by_tags(&device.org_id, &point.attr, &device.tags),
        )
        .await??;

        let matched = evaluate_rules(&point, &device, &candidates, now);
        if matched.is_empty() {
            tracing::debug!(
                unique_id = %point.unique_id,
                attr = %point.attr,
                candidates = candidates.len(),
                trace_id = %point.trace_id,
                "No rule matched"
            );
            return Ok(Vec::new());
        }

        let created_at = point
            .ts_ms
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or(now);

        let mut out = Vec::with_capacity(matched.len());
        for rule in matched {
            let event = Event {
                id: vigil_common::id::next_id(),
                org_id: device.org_id.clone(),
                unique_id: device.unique_id.clone(),
                rule_id: rule.id.clone(),
                created_at,
                trace_id: point.trace_id.clone(),
            };
            timed(self.op_timeout, "create event", self.store.create_event(&event))
                .await?
                .map_err(|e| {
                    tracing::error!(error = %e, rule_id = %rule.id, trace_id = %point.trace_id, "Failed to write event");
                    StageError::Infrastructure(e.to_string())
                })?;

            tracing::info!(
                org_id = %device.org_id,
                unique_id = %device.unique_id,
                rule_id = %rule.id,
                trace_id = %point.trace_id,
                "Rule matched"
            );
            out.push(EventerOut {
                point: Some(point.clone()),
                device: Some(device.clone()),
                rule: Some(rule),
            });
        }
        Ok(out)
    }
}

/// Rules that apply to the point and evaluate to true.
///
/// Re-checks the join the store already performed (same org, active, tag on
/// the device, same attribute) so the result never depends on the lookup
/// being exact. A rule whose expression fails to parse or evaluate is
/// skipped.
pub fn evaluate_rules(
    point: &DataPoint,
    device: &proto::Device,
    rules: &[Rule],
    now: DateTime<Utc>,
) -> Vec<proto::Rule> {
    rules
        .iter()
        .filter(|r| {
            r.org_id == device.org_id
                && r.status.is_active()
                && r.attr == point.attr
                && device.tags.contains(&r.device_tag)
        })
        .filter_map(|r| {
            let wire = proto::Rule::from(r);
            let env = Env::for_point(point, &wire, device, now);
            match eval_rule(&r.expr, &env) {
                Ok(true) => Some(wire),
                Ok(false) => None,
                Err(e) => {
                    tracing::debug!(
                        rule_id = %r.id,
                        error = %e,
                        trace_id = %point.trace_id,
                        "Skipping rule, evaluation failed"
                    );
                    None
                }
            }
        })
        .collect()
}

#[async_trait]
impl Stage for Eventer {
    fn name(&self) -> &'static str {
        "eventer"
    }

    async fn process(&self, payload: &[u8]) -> Result<Vec<Vec<u8>>> {
        let msg = ValidatorOut::decode(payload)?;
        let out = self.handle(msg, Utc::now()).await?;
        Ok(out.iter().map(Message::encode_to_vec).collect())
    }
}
