use crate::dispatch::TaskDispatcher;
use crate::error::{DegreesError, Result};
use crate::node::NodeKind;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

/// Body of a pushed relaxation task
#[derive(Serialize)]
struct RelaxTaskBody {
    distance: u32,
}

/// Push dispatcher for deployments where an external queue or a remote
/// worker fronts the relaxation endpoint: each submission becomes a POST
/// to `{endpoint}/relax/{kind}/{raw_id}`.
pub struct HttpDispatcher {
    client: Client,
    endpoint: String,
}

impl HttpDispatcher {
    /// Create a new push dispatcher
    ///
    /// # Panics
    ///
    /// Panics if HTTP client cannot be created (should not happen in normal operation)
    pub fn new(endpoint: String, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }

    fn task_url(&self, kind: NodeKind, raw_id: &str) -> String {
        format!("{}/relax/{}/{}", self.endpoint, kind, raw_id)
    }
}

#[async_trait]
impl TaskDispatcher for HttpDispatcher {
    async fn submit(&self, kind: NodeKind, raw_id: &str, candidate: u32) -> Result<()> {
        let url = self.task_url(kind, raw_id);

        let response = self
            .client
            .post(&url)
            .json(&RelaxTaskBody {
                distance: candidate,
            })
            .send()
            .await
            .map_err(|e| DegreesError::Dispatch(format!("Network error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DegreesError::Dispatch(format!(
                "relax endpoint rejected {}-{}: {}",
                kind, raw_id, status
            )));
        }

        Ok(())
    }
}
