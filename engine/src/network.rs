//! Online/offline state shared by every store of an engine.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use tokio::sync::watch;
use tracing::{debug, info};

/// Answers "can we reach the remote service right now?".
pub trait ReachabilityProbe {
    fn probe(&self) -> bool;
}

impl<F: Fn() -> bool> ReachabilityProbe for F {
    fn probe(&self) -> bool {
        self()
    }
}

type ReconnectCallback = Box<dyn FnOnce()>;

/// Process-wide network state with a reconnect registration point.
///
/// Callbacks registered with [`NetworkMonitor::notify_on_reconnect`] run
/// once, in registration order, on the next offline to online transition.
pub struct NetworkMonitor {
    online: Cell<bool>,
    probe: RefCell<Option<Box<dyn ReachabilityProbe>>>,
    reconnect: RefCell<VecDeque<ReconnectCallback>>,
    status: watch::Sender<bool>,
}

impl NetworkMonitor {
    pub fn new(online: bool) -> Self {
        let (status, _) = watch::channel(online);
        Self {
            online: Cell::new(online),
            probe: RefCell::new(None),
            reconnect: RefCell::new(VecDeque::new()),
            status,
        }
    }

    /// Install the probe used by [`NetworkMonitor::check_now`].
    pub fn with_probe(self, probe: impl ReachabilityProbe + 'static) -> Self {
        *self.probe.borrow_mut() = Some(Box::new(probe));
        self
    }

    /// Last known state.
    pub fn is_online(&self) -> bool {
        self.online.get()
    }

    /// Run the probe and record its answer. Without a probe the last known
    /// state stands.
    pub fn check_now(&self) -> bool {
        let probed = self.probe.borrow().as_ref().map(|probe| probe.probe());
        match probed {
            Some(online) => {
                debug!(online, "reachability probe");
                self.set_online(online);
                online
            }
            None => self.is_online(),
        }
    }

    /// The remote service reported itself unreachable. The probe has the
    /// final word when installed; otherwise the report is taken as the
    /// answer. Returns true when the network is now considered offline.
    pub fn confirm_offline(&self) -> bool {
        let probed = self.probe.borrow().as_ref().map(|probe| probe.probe());
        let online = probed.unwrap_or(false);
        debug!(online, probed = probed.is_some(), "confirming offline report");
        self.set_online(online);
        !online
    }

    /// Record a state change. Going online fires the reconnect callbacks.
    pub fn set_online(&self, online: bool) {
        let was_online = self.online.replace(online);
        self.status.send_replace(online);

        if online && !was_online {
            let callbacks: Vec<ReconnectCallback> = self.reconnect.borrow_mut().drain(..).collect();
            info!(callbacks = callbacks.len(), "network online");
            for callback in callbacks {
                callback();
            }
        } else if !online && was_online {
            info!("network offline");
        }
    }

    /// Run `callback` once on the next reconnect.
    pub fn notify_on_reconnect(&self, callback: impl FnOnce() + 'static) {
        self.reconnect.borrow_mut().push_back(Box::new(callback));
    }

    /// Number of callbacks waiting for a reconnect.
    pub fn pending_reconnects(&self) -> usize {
        self.reconnect.borrow().len()
    }

    /// Observe state changes.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.status.subscribe()
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

impl fmt::Debug for NetworkMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkMonitor")
            .field("online", &self.online.get())
            .field("pending_reconnects", &self.pending_reconnects())
            .finish()
    }
}
