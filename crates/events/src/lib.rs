//! External collaborators at the edges of the worker.
//!
//! - [`feed`]: the row-change stream ([`ChangeFeed`], [`RowEvent`]) and
//!   its PostgreSQL LISTEN/NOTIFY implementation.
//! - [`schema`]: versioned, named-column decoding of positional rows.
//! - [`notify`]: the outbound notification API ([`Notifier`]) with
//!   retry and backoff.

pub mod feed;
pub mod notify;
pub mod schema;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use feed::{ChangeFeed, FeedError, FeedFilter, PgChangeFeed, RowEvent};
pub use notify::{ApiNotifier, Notifier, NotifyError};
pub use schema::{DecodedRow, Row, SchemaDriftError, TableSchema};
