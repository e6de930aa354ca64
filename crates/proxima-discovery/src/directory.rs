//! Peer directory holding the latest discovery snapshot.

use proxima_transport::PeerInformation;
use serde::{Deserialize, Serialize};

/// Host address reported for peers the radio cannot resolve
pub const UNKNOWN_HOST: &str = "unknown";

/// One discovered peer.
///
/// Records are immutable once captured; a new discovery replaces them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    /// Name the peer advertises itself under
    pub display_name: String,
    /// Host address, or [`UNKNOWN_HOST`]
    pub host_address: String,
    /// Service identifier used for device connects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
}

impl PeerRecord {
    /// Whether the radio resolved a host address for this peer
    #[must_use]
    pub fn has_host(&self) -> bool {
        self.host_address != UNKNOWN_HOST
    }

    /// Radio-level description of this peer
    #[must_use]
    pub fn to_peer_information(&self) -> PeerInformation {
        PeerInformation {
            display_name: self.display_name.clone(),
            host_name: self.has_host().then(|| self.host_address.clone()),
            service_name: self.service_name.clone(),
        }
    }
}

impl From<PeerInformation> for PeerRecord {
    fn from(info: PeerInformation) -> Self {
        Self {
            display_name: info.display_name,
            host_address: info.host_name.unwrap_or_else(|| UNKNOWN_HOST.to_string()),
            service_name: info.service_name,
        }
    }
}

/// Most-recent discovery snapshot.
///
/// There is no merge: every [`replace`](Self::replace) discards the previous
/// snapshot entirely.
#[derive(Debug, Clone, Default)]
pub struct PeerDirectory {
    peers: Vec<PeerRecord>,
}

impl PeerDirectory {
    /// Create an empty directory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot wholesale
    pub fn replace(&mut self, snapshot: Vec<PeerRecord>) {
        self.peers = snapshot;
    }

    /// Find a peer by display name.
    ///
    /// When several peers share a name, the last one in the snapshot wins.
    #[must_use]
    pub fn lookup_by_display_name(&self, name: &str) -> Option<&PeerRecord> {
        self.peers.iter().rev().find(|p| p.display_name == name)
    }

    /// Copy of the current snapshot
    #[must_use]
    pub fn snapshot(&self) -> Vec<PeerRecord> {
        self.peers.clone()
    }

    /// Number of peers in the snapshot
    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Whether the snapshot is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
