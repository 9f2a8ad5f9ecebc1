//! Online/offline state consulted before any remote call.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkStatus {
    Online,
    Offline,
}

pub trait ConnectivityProbe: Send + Sync {
    fn is_online(&self) -> bool;

    fn status(&self) -> NetworkStatus {
        if self.is_online() {
            NetworkStatus::Online
        } else {
            NetworkStatus::Offline
        }
    }
}

/// Connectivity flag shared between the monitor that flips it and the
/// services that read it.
#[derive(Debug, Clone)]
pub struct SharedConnectivity {
    online: Arc<AtomicBool>,
}

impl SharedConnectivity {
    pub fn new(online: bool) -> Self {
        Self {
            online: Arc::new(AtomicBool::new(online)),
        }
    }

    /// Returns the previous state.
    pub fn set_online(&self, online: bool) -> bool {
        let previous = self.online.swap(online, Ordering::SeqCst);
        if previous != online {
            if online {
                log::info!("[Connectivity] Back online");
            } else {
                log::warn!("[Connectivity] Transitioning to offline mode");
            }
        }
        previous
    }
}

impl Default for SharedConnectivity {
    fn default() -> Self {
        Self::new(false)
    }
}

impl ConnectivityProbe for SharedConnectivity {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_same_flag() {
        let connectivity = SharedConnectivity::new(false);
        let observer = connectivity.clone();
        assert_eq!(observer.status(), NetworkStatus::Offline);

        assert!(!connectivity.set_online(true));
        assert!(observer.is_online());
    }
}
