//! Tradepulse Sync - the dashboard's read/write synchronization core.
//!
//! A local cache of server-derived data kept consistent through three
//! paths: on-demand pull fetches keyed by logical query identifiers, a
//! persistent push channel whose events drive targeted invalidation,
//! and write operations whose confirmed side effects invalidate the
//! affected key families before the caller resumes.
//!
//! The guarantees, in one place:
//!
//! - **Single-flight**: concurrent interest in one key shares one
//!   network fetch.
//! - **Generation ordering**: a fetch that settles after a newer fetch
//!   for the same key is discarded, never applied.
//! - **Bounded staleness**: invalidation marks entries stale and
//!   refetches every key with an audience; a reconnect of the push
//!   channel refreshes all subscribed keys as a backstop.

mod backoff;
mod catalog;
mod client;
mod config;
mod error;
mod invalidation;
mod key;
mod mutation;
mod query;
mod realtime;
mod store;
mod transport;

pub use catalog::{decode_payload, route_for, QueryData, QueryRoute};
pub use client::{SubscribeOptions, Subscription, SyncClient};
pub use config::{AuthConfig, ConfigError, ReconnectConfig, RetryConfig, SyncConfig};
pub use error::SyncError;
pub use invalidation::{routes_for, InvalidationDispatcher};
pub use key::{keys, KeySegment, QueryKey};
pub use mutation::{MutationDescriptor, MutationExecutor};
pub use query::QueryExecutor;
pub use realtime::{spawn_stream_manager, ConnectionState};
pub use store::{CacheStore, EntrySnapshot, QueryStatus, SubscriberId};
pub use transport::{EventStream, HttpTransport, RestTransport, StreamTransport, WsStreamTransport};
