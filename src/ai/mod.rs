pub mod gemini;
pub mod prompt;

use crate::ai::prompt::ReportRequest;
use crate::report::{DEFAULT_SOURCE_TITLE, Report, SourceLink};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info};

pub const API_KEY_ENV: &str = "ZHAOWEN_API_KEY";
pub const FALLBACK_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// A grounding citation as handed back by the backend. Either field may be
/// missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Citation {
    pub title: Option<String>,
    pub uri: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BackendResponse {
    pub text: Option<String>,
    pub citations: Vec<Citation>,
}

#[async_trait]
pub trait ReportBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, request: &ReportRequest) -> Result<BackendResponse>;
}

/// Performs one backend round trip per call and normalizes the answer into a
/// [`Report`]. Errors are logged and passed through as-is.
#[derive(Clone)]
pub struct ReportFetcher {
    backend: Arc<dyn ReportBackend>,
}

impl ReportFetcher {
    pub fn new(backend: Arc<dyn ReportBackend>) -> Self {
        Self { backend }
    }

    pub async fn fetch(&self, request: &ReportRequest) -> Result<Report> {
        let response = self.backend.generate(request).await.map_err(|error| {
            error!(backend = self.backend.name(), error = %error, "report generation failed");
            error
        })?;

        let sources = extract_sources(response.citations);
        let report = Report::new(response.text.unwrap_or_default(), sources, Utc::now());

        info!(
            backend = self.backend.name(),
            content_chars = report.content.chars().count(),
            sources = report.sources.len(),
            "report generated"
        );

        Ok(report)
    }
}

fn extract_sources(citations: Vec<Citation>) -> Vec<SourceLink> {
    citations
        .into_iter()
        .filter_map(|citation| {
            let uri = citation.uri.filter(|uri| !uri.trim().is_empty())?;
            let title = citation
                .title
                .filter(|title| !title.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_SOURCE_TITLE.to_string());
            Some(SourceLink { title, uri })
        })
        .collect()
}

pub fn has_api_key() -> bool {
    resolve_api_key().is_some()
}

pub fn resolve_api_key() -> Option<String> {
    resolve_api_key_with(|name| std::env::var(name).ok())
}

fn resolve_api_key_with<F>(lookup: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    [API_KEY_ENV, FALLBACK_API_KEY_ENV]
        .into_iter()
        .filter_map(lookup)
        .find(|value| !value.trim().is_empty())
}
