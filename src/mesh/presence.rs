use std::time::Duration;

use common::PeerAddress;
use log::{debug, info, warn};
use tokio::time::Instant;

pub const DEFAULT_PRESENCE_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PresenceState {
    /// All zero while unbound.
    pub bound_gateway: PeerAddress,
    pub is_available: bool,
    pub last_bridge_online: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeepAliveOutcome {
    /// The sender became the bound gateway.
    Bound { resync: bool },
    Refreshed { resync: bool },
    /// Foreign sender while bound.
    Ignored,
}

impl KeepAliveOutcome {
    /// The upstream bridge just came online; the gateway needs our config,
    /// attributes and state again.
    pub fn resync(&self) -> bool {
        match self {
            KeepAliveOutcome::Bound { resync } | KeepAliveOutcome::Refreshed { resync } => *resync,
            KeepAliveOutcome::Ignored => false,
        }
    }
}

/// Binds the first gateway heard and forgets it once its keep-alives stop.
pub struct PresenceTracker {
    state: PresenceState,
    timeout: Duration,
    expires_at: Option<Instant>,
}

impl PresenceTracker {
    pub fn new(timeout: Duration) -> Self {
        Self {
            state: PresenceState::default(),
            timeout,
            expires_at: None,
        }
    }

    pub fn on_keep_alive(
        &mut self,
        sender: PeerAddress,
        bridge_online: bool,
        now: Instant,
    ) -> KeepAliveOutcome {
        let newly_bound = if self.state.is_available {
            if sender != self.state.bound_gateway {
                debug!("Keep-alive from foreign gateway {} ignored", sender);
                return KeepAliveOutcome::Ignored;
            }
            false
        } else {
            if sender.is_unbound() {
                debug!("Keep-alive from the zero address ignored");
                return KeepAliveOutcome::Ignored;
            }
            self.state.bound_gateway = sender;
            self.state.is_available = true;
            info!("Bound to gateway {}", sender);
            true
        };

        // Last keep-alive wins
        self.expires_at = Some(now + self.timeout);

        let resync = bridge_online && !self.state.last_bridge_online;
        if bridge_online != self.state.last_bridge_online {
            info!(
                "Upstream bridge of {} went {}",
                sender,
                if bridge_online { "online" } else { "offline" }
            );
            self.state.last_bridge_online = bridge_online;
        }

        if newly_bound {
            KeepAliveOutcome::Bound { resync }
        } else {
            KeepAliveOutcome::Refreshed { resync }
        }
    }

    /// Unbinds once the window has passed without a refresh. Returns true on
    /// that transition only; the caller flushes pending deliveries.
    pub fn poll_expiry(&mut self, now: Instant) -> bool {
        match self.expires_at {
            Some(deadline) if now >= deadline => {
                warn!(
                    "Gateway {} silent for {:?}, unbinding",
                    self.state.bound_gateway, self.timeout
                );
                self.state.bound_gateway = PeerAddress::UNBOUND;
                self.state.is_available = false;
                self.expires_at = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_available(&self) -> bool {
        self.state.is_available
    }

    pub fn bound_gateway(&self) -> Option<PeerAddress> {
        self.state
            .is_available
            .then_some(self.state.bound_gateway)
    }

    pub fn state(&self) -> PresenceState {
        self.state
    }

    /// When the bound gateway expires, if one is bound.
    pub fn deadline(&self) -> Option<Instant> {
        self.expires_at
    }
}

impl Default for PresenceTracker {
    fn default() -> Self {
        PresenceTracker::new(DEFAULT_PRESENCE_TIMEOUT)
    }
}
