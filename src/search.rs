//! Web-search collaborator used by the company-research and college-tier
//! stages. This crate only consumes the seam; deployments plug in a real
//! provider, tests and offline runs use [`NoopSearchProvider`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("search failed: {0}")]
pub struct SearchError(pub String);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub content: String,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, max_hits: usize) -> Result<Vec<SearchHit>, SearchError>;
}

/// Always returns no hits. Stages treat empty results as "search unavailable"
/// and proceed on oracle knowledge alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSearchProvider;

#[async_trait]
impl SearchProvider for NoopSearchProvider {
    async fn search(&self, _query: &str, _max_hits: usize) -> Result<Vec<SearchHit>, SearchError> {
        Ok(Vec::new())
    }
}
