//! Resource change notifications for connected MCP peers.
//!
//! `PeerNotifier` is the store's `ResourceNotifier`: `publish` only queues the
//! change on an unbounded channel, and a background task forwards each change
//! in order as `resources/list_changed` followed by one `resources/updated`
//! per affected URI. Peers whose transport has closed are pruned on the first
//! failed send.

use std::sync::Arc;

use rmcp::model::ResourceUpdatedNotificationParam;
use rmcp::service::{Peer, RoleServer};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;

use crate::store::{ResourceChange, ResourceNotifier};

/// Connected session peers shared between the server handler and the notifier.
pub type PeerList = Arc<tokio::sync::Mutex<Vec<Peer<RoleServer>>>>;

pub struct PeerNotifier {
    tx: UnboundedSender<ResourceChange>,
}

impl PeerNotifier {
    /// Start the forwarding task. It stops when `cancel` fires or the notifier is dropped.
    pub fn spawn(peers: PeerList, cancel: CancellationToken) -> Self {
        let (tx, rx) = unbounded_channel();
        tokio::spawn(forward_changes(rx, peers, cancel));
        Self { tx }
    }
}

impl ResourceNotifier for PeerNotifier {
    fn publish(&self, change: &ResourceChange) {
        if self.tx.send(change.clone()).is_err() {
            tracing::debug!(root = %change.root, "notification task stopped, dropping change");
        }
    }
}

async fn forward_changes(
    mut rx: UnboundedReceiver<ResourceChange>,
    peers: PeerList,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            change = rx.recv() => {
                match change {
                    Some(change) => notify_peers(&peers, &change).await,
                    None => {
                        tracing::debug!("resource notifier channel closed");
                        return;
                    }
                }
            }
            _ = cancel.cancelled() => {
                tracing::debug!("resource notifier cancelled");
                return;
            }
        }
    }
}

/// Send one change to every peer, keeping only those that accepted it.
async fn notify_peers(peers: &PeerList, change: &ResourceChange) {
    let uris: Vec<String> = change
        .changed
        .iter()
        .chain(&change.removed)
        .map(|d| d.uri.clone())
        .collect();

    let mut peers = peers.lock().await;
    let mut live_peers = Vec::with_capacity(peers.len());
    'peers: for peer in peers.drain(..) {
        if let Err(e) = peer.notify_resource_list_changed().await {
            tracing::debug!(error = %e, "pruning stale peer after resources-list-changed error");
            continue;
        }
        for uri in &uris {
            let param = ResourceUpdatedNotificationParam { uri: uri.clone() };
            if let Err(e) = peer.notify_resource_updated(param).await {
                tracing::debug!(error = %e, uri = %uri, "pruning stale peer after resource-updated error");
                continue 'peers;
            }
        }
        live_peers.push(peer);
    }
    tracing::debug!(
        root = %change.root,
        version = %change.version,
        uris = %uris.len(),
        peers = %live_peers.len(),
        "resource change sent"
    );
    *peers = live_peers;
}
