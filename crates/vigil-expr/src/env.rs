use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use vigil_common::proto::{self, DataPoint};

use crate::value::Value;

/// Variables visible to an expression or template.
#[derive(Debug, Clone, Default)]
pub struct Env {
    vars: BTreeMap<String, Value>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Builds the standard bindings for a point on its way through the
    /// pipeline: `point`, `pointVal`, `pointTS`, `currTS`, `rule` and `device`.
    ///
    /// Timestamps are unix seconds. A point without a timestamp is treated
    /// as observed at `now`.
    pub fn for_point(
        point: &DataPoint,
        rule: &proto::Rule,
        device: &proto::Device,
        now: DateTime<Utc>,
    ) -> Self {
        let point_val = point.value.as_ref().map(Value::from).unwrap_or(Value::Null);
        let point_ts = point.ts_ms.unwrap_or_else(|| now.timestamp_millis()) / 1000;

        let mut point_map = BTreeMap::new();
        point_map.insert("unique_id".to_string(), Value::from(point.unique_id.as_str()));
        point_map.insert("attr".to_string(), Value::from(point.attr.as_str()));
        point_map.insert("value".to_string(), point_val.clone());
        point_map.insert("ts".to_string(), Value::Int(point_ts));
        point_map.insert("trace_id".to_string(), Value::from(point.trace_id.as_str()));

        let mut rule_map = BTreeMap::new();
        rule_map.insert("id".to_string(), Value::from(rule.id.as_str()));
        rule_map.insert("org_id".to_string(), Value::from(rule.org_id.as_str()));
        rule_map.insert("name".to_string(), Value::from(rule.name.as_str()));
        rule_map.insert("status".to_string(), Value::from(status_name(rule.status)));
        rule_map.insert("device_tag".to_string(), Value::from(rule.device_tag.as_str()));
        rule_map.insert("attr".to_string(), Value::from(rule.attr.as_str()));
        rule_map.insert("expr".to_string(), Value::from(rule.expr.as_str()));

        let mut device_map = BTreeMap::new();
        device_map.insert("id".to_string(), Value::from(device.id.as_str()));
        device_map.insert("org_id".to_string(), Value::from(device.org_id.as_str()));
        device_map.insert("unique_id".to_string(), Value::from(device.unique_id.as_str()));
        device_map.insert("name".to_string(), Value::from(device.name.as_str()));
        device_map.insert("status".to_string(), Value::from(status_name(device.status)));
        device_map.insert("tags".to_string(), Value::from(device.tags.clone()));

        let mut env = Env::new();
        env.bind("point", Value::Map(point_map));
        env.bind("pointVal", point_val);
        env.bind("pointTS", Value::Int(point_ts));
        env.bind("currTS", Value::Int(now.timestamp()));
        env.bind("rule", Value::Map(rule_map));
        env.bind("device", Value::Map(device_map));
        env
    }

    /// The bindings as a JSON object, the data model templates render against.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.vars
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

fn status_name(status: i32) -> &'static str {
    match proto::Status::try_from(status) {
        Ok(proto::Status::Active) => "active",
        Ok(proto::Status::Disabled) => "disabled",
        _ => "unspecified",
    }
}
