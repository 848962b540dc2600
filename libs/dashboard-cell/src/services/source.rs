use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Method;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::models::{DashboardError, EntityKind, TimeWindow, TimestampedRecord};

/// Rows per PostgREST page. Matches Supabase's default `max-rows`, so a full
/// page means there may be more.
pub const PAGE_SIZE: usize = 1000;

/// Where timestamped rows come from.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Rows of `kind` created inside `window`, oldest first.
    async fn fetch_timestamped(&self, kind: EntityKind, window: TimeWindow) -> Result<Vec<TimestampedRecord>>;
}

pub struct SupabaseRecordSource {
    supabase: SupabaseClient,
    auth_token: String,
    page_size: usize,
}

impl SupabaseRecordSource {
    pub fn new(supabase: SupabaseClient, auth_token: impl Into<String>) -> Self {
        Self {
            supabase,
            auth_token: auth_token.into(),
            page_size: PAGE_SIZE,
        }
    }

    /// Must not exceed the server's `max-rows`, or a capped page reads as the last one.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

fn query_timestamp(at: DateTime<Utc>) -> String {
    // `Z` instead of `+00:00`: a bare `+` in a query string decodes to a space.
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[async_trait]
impl RecordSource for SupabaseRecordSource {
    async fn fetch_timestamped(&self, kind: EntityKind, window: TimeWindow) -> Result<Vec<TimestampedRecord>> {
        debug!("Fetching {} created between {} and {}", kind.table(), window.start, window.end);

        let base = format!(
            "/rest/v1/{}?select={}&created_at=gte.{}&created_at=lt.{}&order=created_at.asc,id.asc",
            kind.table(),
            kind.columns(),
            query_timestamp(window.start),
            query_timestamp(window.end),
        );

        let mut records = Vec::new();
        let mut offset = 0;
        loop {
            let path = format!("{}&limit={}&offset={}", base, self.page_size, offset);
            let page: Vec<TimestampedRecord> = self.supabase
                .request(Method::GET, &path, Some(self.auth_token.as_str()), None)
                .await?;

            let fetched = page.len();
            records.extend(page);
            if fetched < self.page_size {
                break;
            }
            offset += fetched;
        }

        debug!("Fetched {} {} rows", records.len(), kind.table());
        Ok(records)
    }
}

/// Records kept in process, filled through `insert`.
#[derive(Default)]
pub struct InMemoryRecordSource {
    records: RwLock<HashMap<EntityKind, Vec<TimestampedRecord>>>,
}

impl InMemoryRecordSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, kind: EntityKind, record: TimestampedRecord) {
        self.records.write().await.entry(kind).or_default().push(record);
    }
}

#[async_trait]
impl RecordSource for InMemoryRecordSource {
    async fn fetch_timestamped(&self, kind: EntityKind, window: TimeWindow) -> Result<Vec<TimestampedRecord>> {
        let mut records: Vec<TimestampedRecord> = self.records.read().await
            .get(&kind)
            .map(|rows| rows.iter().filter(|r| window.contains(r.created_at)).cloned().collect())
            .unwrap_or_default();

        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }
}

/// Supabase sources are built per request so the caller's token is forwarded.
#[derive(Clone)]
pub enum SourceBackend {
    Supabase(SupabaseClient),
    /// Every read fails with `DashboardError::Unconfigured`.
    Unconfigured,
}

impl SourceBackend {
    pub fn from_config(config: &AppConfig) -> Self {
        if config.is_configured() {
            SourceBackend::Supabase(SupabaseClient::new(config))
        } else {
            warn!("Supabase not configured, dashboard requests will fail");
            SourceBackend::Unconfigured
        }
    }

    pub fn for_token(&self, auth_token: &str) -> Result<Arc<dyn RecordSource>, DashboardError> {
        match self {
            SourceBackend::Supabase(client) => {
                Ok(Arc::new(SupabaseRecordSource::new(client.clone(), auth_token)))
            }
            SourceBackend::Unconfigured => Err(DashboardError::Unconfigured),
        }
    }
}
