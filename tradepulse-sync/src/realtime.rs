//! Push-channel manager with reconnect backoff.
//!
//! Owns the single long-lived connection. Consumers never see transport
//! failures; they see the connection-state watch channel move through
//! `Reconnecting` and, on every recovery, a backstop refresh of all
//! subscribed keys.

use crate::backoff::{BackoffPolicy, BackoffState};
use crate::error::SyncError;
use crate::invalidation::InvalidationDispatcher;
use crate::transport::StreamTransport;
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tradepulse_core::{StreamEnvelope, StreamEvent, SystemNotice};

/// Readiness of the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Lost the connection; waiting out the backoff before retrying.
    Reconnecting,
}

/// Spawn the connection manager. Runs until the returned task is
/// aborted (the client does this on shutdown/drop).
pub fn spawn_stream_manager(
    transport: Arc<dyn StreamTransport>,
    dispatcher: InvalidationDispatcher,
    policy: BackoffPolicy,
    state_tx: watch::Sender<ConnectionState>,
    notices: mpsc::UnboundedSender<SystemNotice>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut backoff = BackoffState::new(policy);
        loop {
            let _ = state_tx.send(ConnectionState::Connecting);
            match transport.connect().await {
                Ok(mut stream) => {
                    let _ = state_tx.send(ConnectionState::Connected);
                    tracing::info!("event stream connected");
                    backoff.reset();
                    // Delivery is not gap-free across an outage: an
                    // invalidation may have been missed while away, so
                    // everything with an audience gets re-pulled.
                    dispatcher.refresh_subscribed();

                    while let Some(item) = stream.next().await {
                        match item {
                            Ok(envelope) => apply_envelope(envelope, &dispatcher, &notices),
                            Err(SyncError::Stream { message }) => {
                                tracing::warn!(error = %message, "event stream transport error");
                                break;
                            }
                            Err(err) => {
                                tracing::warn!(error = %err, "discarding malformed stream frame");
                            }
                        }
                    }
                    tracing::info!("event stream disconnected");
                }
                Err(err) => {
                    tracing::warn!(error = %err, "event stream connect failed");
                }
            }

            let _ = state_tx.send(ConnectionState::Reconnecting);
            tokio::time::sleep(backoff.next_delay()).await;
        }
    })
}

fn apply_envelope(
    envelope: StreamEnvelope,
    dispatcher: &InvalidationDispatcher,
    notices: &mpsc::UnboundedSender<SystemNotice>,
) {
    match StreamEvent::try_from(envelope) {
        Ok(StreamEvent::SystemNotice(notice)) => {
            // Nobody may be listening for notices; that is fine.
            let _ = notices.send(notice);
        }
        Ok(event) => dispatcher.apply_event(&event),
        Err(err) => {
            tracing::warn!(error = %err, "discarding undecodable stream event");
        }
    }
}
