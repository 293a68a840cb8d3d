use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, AtomicU64};
use std::sync::{Arc, Mutex, RwLock};

use dashmap::DashMap;
use sync_core::clock::SessionEpoch;
use sync_core::messages::ControlMessage;
use sync_core::SyncCoordinator;
use tokio::sync::broadcast;

pub type SharedState = Arc<AppState>;

/// A connected stage renderer, with the link health it last reported.
pub struct StagePeer {
    pub addr: SocketAddr,
    /// Last reported clock offset, microseconds.
    pub offset_us: AtomicI64,
    /// Last reported round trip, microseconds.
    pub rtt_us: AtomicU64,
}

pub struct AppState {
    /// Connected stage sessions.
    pub peers: DashMap<String, Arc<StagePeer>>,
    /// Fan-out of commands to every connected stage.
    pub tx: broadcast::Sender<ControlMessage>,
    /// The synchronization loop for the active presentation session.
    pub sync: Mutex<SyncCoordinator>,
    /// Wall-clock origin of the running playback, for late joiners.
    pub epoch: RwLock<Option<SessionEpoch>>,
}

impl AppState {
    pub fn new() -> SharedState {
        let (tx, _) = broadcast::channel(100);

        Arc::new(Self {
            peers: DashMap::new(),
            tx,
            sync: Mutex::new(SyncCoordinator::new()),
            epoch: RwLock::new(None),
        })
    }
}
