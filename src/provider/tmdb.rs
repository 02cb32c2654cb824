use crate::error::{DegreesError, Result};
use crate::node::{NodeKind, NodeRef};
use crate::provider::GraphProvider;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

/// Credits payload from the TMDb API.
///
/// Both `/movie/{id}/credits` and `/person/{id}/movie_credits` carry a
/// `cast` array whose entries reference the opposite node kind.
#[derive(Deserialize)]
struct CreditsResponse {
    #[serde(default)]
    cast: Vec<CreditEntry>,
}

/// Individual cast entry in a credits response
#[derive(Deserialize)]
struct CreditEntry {
    id: i64,
}

/// TMDb graph provider
///
/// Expands a person into the works they are credited on and a work into
/// the people credited on it. Performs no retries of its own; redelivery
/// is owned by the task dispatcher.
pub struct TmdbProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl TmdbProvider {
    /// Create a new TMDb provider
    ///
    /// # Panics
    ///
    /// Panics if HTTP client cannot be created (should not happen in normal operation)
    pub fn new(api_key: String, base_url: String, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Path of the credits resource for a node, relative to the API root.
    fn credits_path(kind: NodeKind, raw_id: &str) -> String {
        match kind {
            NodeKind::Person => format!("/person/{}/movie_credits", raw_id),
            NodeKind::Work => format!("/movie/{}/credits", raw_id),
        }
    }
}

#[async_trait]
impl GraphProvider for TmdbProvider {
    async fn expand(&self, kind: NodeKind, raw_id: &str) -> Result<Vec<NodeRef>> {
        let url = format!(
            "{}{}?api_key={}",
            self.base_url,
            Self::credits_path(kind, raw_id),
            self.api_key
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| DegreesError::Provider(format!("Network error: {}", e)))?;

        let status = response.status();

        // Unknown upstream id: the node exists in our store but has no
        // expandable credits. Not a failure.
        if status == StatusCode::NOT_FOUND {
            log::warn!("provider has no {} with id {}, treating as leaf", kind, raw_id);
            return Ok(Vec::new());
        }

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(DegreesError::Provider(format!(
                "TMDb API error {}: {}",
                status, body
            )));
        }

        let credits: CreditsResponse = response
            .json()
            .await
            .map_err(|e| DegreesError::Provider(format!("Failed to parse response: {}", e)))?;

        let neighbor_kind = kind.opposite();
        Ok(credits
            .cast
            .into_iter()
            .map(|entry| NodeRef::new(neighbor_kind, entry.id.to_string()))
            .collect())
    }
}
