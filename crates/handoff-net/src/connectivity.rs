//! Network Information
//!
//! Connectivity state and the pre-flight guard in front of GPS acquisition.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

/// Connection type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionType {
    #[default]
    Unknown,
    Ethernet,
    Wifi,
    Cellular,
    Bluetooth,
    None,
}

impl ConnectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Ethernet => "ethernet",
            Self::Wifi => "wifi",
            Self::Cellular => "cellular",
            Self::Bluetooth => "bluetooth",
            Self::None => "none",
        }
    }

    /// Guess the link type from a Linux interface name
    pub fn from_interface(name: &str) -> Self {
        if name.starts_with("wl") {
            Self::Wifi
        } else if name.starts_with("eth") || name.starts_with("en") {
            Self::Ethernet
        } else if name.starts_with("ww") || name.starts_with("rmnet") {
            Self::Cellular
        } else if name.starts_with("bnep") {
            Self::Bluetooth
        } else {
            Self::Unknown
        }
    }
}

/// Point-in-time network state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkState {
    pub connection_type: ConnectionType,
    pub is_connected: bool,
    /// `None` while the platform has not finished probing
    pub is_internet_reachable: Option<bool>,
}

impl Default for NetworkState {
    fn default() -> Self {
        Self {
            connection_type: ConnectionType::Unknown,
            is_connected: true,
            is_internet_reachable: None,
        }
    }
}

impl NetworkState {
    pub fn offline() -> Self {
        Self {
            connection_type: ConnectionType::None,
            is_connected: false,
            is_internet_reachable: Some(false),
        }
    }

    pub fn online(connection_type: ConnectionType) -> Self {
        Self {
            connection_type,
            is_connected: true,
            is_internet_reachable: Some(true),
        }
    }

    /// Connected, and reachability not known to be false
    pub fn is_online(&self) -> bool {
        self.is_connected && self.is_internet_reachable != Some(false)
    }
}

/// Platform connectivity source
#[async_trait]
pub trait Connectivity: Send + Sync {
    async fn fetch(&self) -> NetworkState;
}

/// Pre-flight connectivity check
#[derive(Clone)]
pub struct NetworkGuard {
    source: Arc<dyn Connectivity>,
}

impl NetworkGuard {
    pub fn new(source: Arc<dyn Connectivity>) -> Self {
        Self { source }
    }

    /// True when a verification round-trip is possible
    pub async fn check(&self) -> bool {
        let state = self.source.fetch().await;
        let online = state.is_online();
        tracing::debug!(
            connection = state.connection_type.as_str(),
            reachable = ?state.is_internet_reachable,
            online,
            "network check"
        );
        online
    }
}

/// Connectivity driven by hand (simulation, tests)
#[derive(Debug, Default)]
pub struct ManualConnectivity {
    state: Mutex<NetworkState>,
}

impl ManualConnectivity {
    pub fn new(state: NetworkState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn set(&self, state: NetworkState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Set online status
    pub fn set_online(&self, online: bool) {
        self.set(if online {
            NetworkState::online(ConnectionType::Unknown)
        } else {
            NetworkState::offline()
        });
    }
}

#[async_trait]
impl Connectivity for ManualConnectivity {
    async fn fetch(&self) -> NetworkState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Reads interface state from the operating system
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConnectivity;

#[async_trait]
impl Connectivity for SystemConnectivity {
    async fn fetch(&self) -> NetworkState {
        smol::unblock(probe).await
    }
}

#[cfg(target_os = "linux")]
fn probe() -> NetworkState {
    let Ok(entries) = std::fs::read_dir("/sys/class/net") else {
        return NetworkState::default();
    };

    let up = entries.flatten().find_map(|entry| {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name == "lo" {
            return None;
        }
        let operstate = std::fs::read_to_string(entry.path().join("operstate")).ok()?;
        (operstate.trim() == "up").then(|| ConnectionType::from_interface(&name))
    });

    match up {
        // Link is up; whether the internet is reachable past it is unknown.
        Some(connection_type) => NetworkState {
            connection_type,
            is_connected: true,
            is_internet_reachable: None,
        },
        None => NetworkState::offline(),
    }
}

#[cfg(not(target_os = "linux"))]
fn probe() -> NetworkState {
    NetworkState::default()
}
