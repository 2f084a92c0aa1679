//! Notification sink (§6): fire-and-forget delivery of the final decision to
//! whatever downstream consumer wants it (dashboard, alerting, execution
//! gateway — out of scope for this crate). Failures are logged by the caller
//! and never affect the pipeline's own success (§4.2 step 16 "Notify").

use async_trait::async_trait;

use crate::domain::FinalDecision;
use crate::errors::PipelineError;

use super::TRACE_ID_HEADER;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, decision: &FinalDecision) -> Result<(), PipelineError>;
}

pub struct HttpNotifier {
    client: reqwest::Client,
    base_url: String,
    timeout: std::time::Duration,
}

impl HttpNotifier {
    pub fn new(client: reqwest::Client, base_url: String, timeout: std::time::Duration) -> Self {
        Self { client, base_url, timeout }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(&self, decision: &FinalDecision) -> Result<(), PipelineError> {
        let response = self
            .client
            .post(format!("{}/notify", self.base_url))
            .timeout(self.timeout)
            .header(TRACE_ID_HEADER, decision.trace_id.clone())
            .json(decision)
            .send()
            .await
            .map_err(|e| PipelineError::UpstreamUnavailable(format!("notifier: {e}")))?;

        if !response.status().is_success() {
            return Err(PipelineError::UpstreamUnavailable(format!(
                "notifier returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
