//! Row-change feed.
//!
//! The database publishes every UPDATE on the watched tables as a JSON
//! notification (see the `notify_row_change` trigger). [`PgChangeFeed`]
//! listens on that channel and hands matching events to the watcher one at
//! a time with poll-or-none semantics: [`ChangeFeed::poll`] returns
//! `Ok(None)` when nothing arrived within the poll timeout.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use sqlx::postgres::PgListener;
use sqlx::PgPool;

/// Default time [`PgChangeFeed::poll`] waits before reporting "no event".
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// One changed row with positional before/after values.
///
/// `columns` names the positions when the producer knows them; it may be
/// empty for producers that only emit positional arrays.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RowEvent {
    pub schema: String,
    pub table: String,
    pub op: String,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub before: Vec<serde_json::Value>,
    #[serde(default)]
    pub after: Vec<serde_json::Value>,
}

/// Which events the feed passes through.
#[derive(Debug, Clone)]
pub struct FeedFilter {
    pub schema: String,
    pub tables: Vec<String>,
}

impl FeedFilter {
    pub fn new(schema: impl Into<String>, tables: &[&str]) -> Self {
        Self {
            schema: schema.into(),
            tables: tables.iter().map(|t| t.to_string()).collect(),
        }
    }

    /// Only UPDATE events on a watched table of the watched schema.
    pub fn matches(&self, event: &RowEvent) -> bool {
        event.op.eq_ignore_ascii_case("UPDATE")
            && event.schema == self.schema
            && self.tables.iter().any(|t| *t == event.table)
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("change feed database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The listener connection dropped; the next poll reconnects.
    #[error("change feed connection lost")]
    Disconnected,

    #[error("malformed change feed payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("change feed is closed")]
    Closed,
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ChangeFeed: Send {
    /// Wait briefly for the next matching event.
    async fn poll(&mut self) -> Result<Option<RowEvent>, FeedError>;

    /// Stop listening and release the connection.
    async fn close(&mut self) -> Result<(), FeedError>;
}

// ---------------------------------------------------------------------------
// PostgreSQL LISTEN/NOTIFY
// ---------------------------------------------------------------------------

pub struct PgChangeFeed {
    listener: Option<PgListener>,
    channel: String,
    filter: FeedFilter,
    poll_timeout: Duration,
}

impl PgChangeFeed {
    /// Open a listener on `channel`.
    pub async fn connect(pool: &PgPool, channel: &str, filter: FeedFilter) -> Result<Self, FeedError> {
        let mut listener = PgListener::connect_with(pool).await?;
        listener.listen(channel).await?;
        tracing::info!(channel, tables = ?filter.tables, "Change feed listening");

        Ok(Self {
            listener: Some(listener),
            channel: channel.to_string(),
            filter,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        })
    }

    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

#[async_trait]
impl ChangeFeed for PgChangeFeed {
    async fn poll(&mut self) -> Result<Option<RowEvent>, FeedError> {
        let listener = self.listener.as_mut().ok_or(FeedError::Closed)?;

        loop {
            let notification = match tokio::time::timeout(self.poll_timeout, listener.try_recv()).await {
                Err(_elapsed) => return Ok(None),
                Ok(Err(e)) => return Err(e.into()),
                Ok(Ok(None)) => return Err(FeedError::Disconnected),
                Ok(Ok(Some(n))) => n,
            };

            let event: RowEvent = serde_json::from_str(notification.payload())?;
            if self.filter.matches(&event) {
                return Ok(Some(event));
            }
            tracing::trace!(table = %event.table, op = %event.op, "Change feed event filtered out");
        }
    }

    async fn close(&mut self) -> Result<(), FeedError> {
        if let Some(mut listener) = self.listener.take() {
            listener.unlisten_all().await?;
            tracing::info!(channel = %self.channel, "Change feed closed");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
