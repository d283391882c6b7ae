use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use prost::Message;
use vigil_common::proto::{self, ValidatorIn, ValidatorOut};
use vigil_common::trace::generate_trace_id;
use vigil_common::types::normalize_unique_id;
use vigil_storage::PipelineStore;

use crate::error::{timed, Result, StageError};
use crate::Stage;

/// Authenticates raw points against their device and stamps them for the
/// Eventer. Never persists anything.
pub struct Validator {
    store: Arc<dyn PipelineStore>,
    op_timeout: Duration,
}

impl Validator {
    pub fn new(store: Arc<dyn PipelineStore>, op_timeout: Duration) -> Self {
        Self { store, op_timeout }
    }

    /// Resolves the point's device and checks it may publish.
    ///
    /// The token check is skipped only when `skip_token` is set *and* a
    /// tenant is claimed; the admin path always sets both.
    pub async fn validate(&self, input: ValidatorIn, now: DateTime<Utc>) -> Result<ValidatorOut> {
        let mut point = input
            .point
            .ok_or_else(|| StageError::Malformed("missing point".into()))?;
        if point.value.is_none() {
            return Err(StageError::Malformed("point has no value".into()));
        }
        let unique_id = normalize_unique_id(&point.unique_id);
        if unique_id.is_empty() {
            return Err(StageError::Malformed("point has no unique_id".into()));
        }

        let device = timed(
            self.op_timeout,
            "read device",
            self.store.read_device_by_unique_id(&unique_id),
        )
        .await??;

        if !device.status.is_active() {
            tracing::warn!(unique_id = %unique_id, trace_id = %point.trace_id, "Point from disabled device");
            return Err(StageError::Rejected(format!("device {unique_id} is disabled")));
        }
        if !input.org_id.is_empty() && input.org_id != device.org_id {
            tracing::warn!(
                unique_id = %unique_id,
                claimed_org = %input.org_id,
                trace_id = %point.trace_id,
                "Point claims foreign org"
            );
            return Err(StageError::Rejected(format!(
                "device {unique_id} does not belong to org {}",
                input.org_id
            )));
        }
        let trusted = input.skip_token && !input.org_id.is_empty();
        if !trusted && (device.token.is_empty() || !constant_time_eq(&point.token, &device.token)) {
            tracing::warn!(unique_id = %unique_id, trace_id = %point.trace_id, "Invalid device token");
            return Err(StageError::Rejected(format!("invalid token for device {unique_id}")));
        }

        point.unique_id = device.unique_id.clone();
        point.token.clear();
        if point.ts_ms.is_none() {
            point.ts_ms = Some(now.timestamp_millis());
        }
        if point.trace_id.is_empty() {
            point.trace_id = generate_trace_id();
        }

        tracing::debug!(
            unique_id = %point.unique_id,
            org_id = %device.org_id,
            attr = %point.attr,
            trace_id = %point.trace_id,
            "Point validated"
        );

        Ok(ValidatorOut {
            point: Some(point),
            device: Some(proto::Device::from(&device)),
        })
    }
}

#[async_trait]
impl Stage for Validator {
    fn name(&self) -> &'static str {
        "validator"
    }

    async fn process(&self, payload: &[u8]) -> Result<Vec<Vec<u8>>> {
        let input = ValidatorIn::decode(payload)?;
        let out = self.validate(input, Utc::now()).await?;
        Ok(vec![out.encode_to_vec()])
    }
}

/// Compares all bytes of equal-length inputs regardless of where they differ.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |diff, (x, y)| diff | (x ^ y)) == 0
}
