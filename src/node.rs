use common::{DeviceType, Envelope, KeepAlive, Payload, PeerAddress, SetCommand};
use log::{debug, info, warn};
use tokio::time::Instant;

use crate::announce::{
    attributes_payload, config_payload, keep_alive_payload, status_payload, Announcement,
    AnnouncementScheduler, Identity,
};
use crate::config::NodeConfig;
use crate::lights::{render, ChannelLevels, ChannelProfile, OutputDriver, RenderMode};
use crate::mesh::{
    AckEvent, Delivery, DeliveryManager, InboundFrame, MeshTransport, PresenceTracker, SequenceId,
};
use crate::state::DeviceState;
use crate::store::StateStore;
use crate::MaintenanceRequest;

/// One light on the mesh.
///
/// Every entry point runs to completion and takes the current time explicitly.
/// The caller feeds frames and acknowledgments in, calls [`LightNode::advance`]
/// and [`LightNode::poll`] from its loop, and sleeps until
/// [`LightNode::next_deadline`].
pub struct LightNode<T, D, S> {
    identity: Identity,
    state: DeviceState,
    presence: PresenceTracker,
    delivery: DeliveryManager<T>,
    scheduler: AnnouncementScheduler,
    driver: D,
    store: S,
    booted_at: Instant,
}

impl<T, D, S> LightNode<T, D, S>
where
    T: MeshTransport,
    D: OutputDriver,
    S: StateStore,
{
    /// Restores the saved state and shows it.
    pub fn new(config: &NodeConfig, transport: T, driver: D, mut store: S, now: Instant) -> Self {
        let state = match store.load() {
            Ok(Some(state)) => {
                info!("Restored device state {:?}", state);
                state
            }
            Ok(None) => DeviceState::default(),
            Err(e) => {
                warn!("Failed to load device state, using defaults: {:#}", e);
                DeviceState::default()
            }
        };

        let identity = Identity {
            device_name: config.device_name.clone(),
            mcu: config.mcu.clone(),
            address: transport.local_address(),
            profile: config.profile,
        };
        info!(
            "{} ({}) starting with profile {:?}",
            identity.device_name, identity.address, identity.profile
        );

        let mut node = Self {
            identity,
            state,
            presence: PresenceTracker::new(config.timing.presence_timeout()),
            delivery: DeliveryManager::new(transport),
            scheduler: AnnouncementScheduler::new(&config.timing, now),
            driver,
            store,
            booted_at: now,
        };
        node.render(RenderMode::Drive);
        node
    }

    /// Handles one inbound frame. UPDATE and RESTART are handed back since the
    /// node cannot service them itself.
    ///
    /// Timers due by `now` fire first, so a keep-alive arriving after the
    /// window has closed rebinds instead of refreshing.
    pub fn handle_frame(&mut self, frame: &InboundFrame, now: Instant) -> Option<MaintenanceRequest> {
        self.advance(now);

        let envelope = match Envelope::decode(&frame.bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Dropping frame from {}: {}", frame.sender, e);
                return None;
            }
        };

        if envelope.device_type != DeviceType::Gateway {
            debug!(
                "Ignoring {:?} from {:?} {}",
                envelope.kind(),
                envelope.device_type,
                frame.sender
            );
            return None;
        }

        match frame.delivery {
            Delivery::Broadcast => {
                match envelope.payload {
                    Payload::KeepAlive(keep_alive) => {
                        self.on_keep_alive(frame.sender, keep_alive, now)
                    }
                    other => debug!("Ignoring broadcast {:?} from {}", other.kind(), frame.sender),
                }
                None
            }
            Delivery::Unicast => {
                if self.presence.bound_gateway() != Some(frame.sender) {
                    debug!(
                        "Ignoring {:?} from {}, not our gateway",
                        envelope.kind(),
                        frame.sender
                    );
                    return None;
                }
                match envelope.payload {
                    Payload::Set(command) => {
                        self.apply_command(&command, now);
                        None
                    }
                    Payload::Update => {
                        info!("Gateway requested the configuration access point");
                        Some(MaintenanceRequest::OpenAccessPoint)
                    }
                    Payload::Restart => {
                        info!("Gateway requested a restart");
                        Some(MaintenanceRequest::Restart)
                    }
                    other => {
                        debug!("Ignoring {:?} from gateway", other.kind());
                        None
                    }
                }
            }
        }
    }

    pub fn on_acknowledge(&mut self, ack: AckEvent) {
        self.delivery.on_acknowledge(ack.sequence_id, ack.success);
    }

    /// Fires every timer that has elapsed by `now`.
    pub fn advance(&mut self, now: Instant) {
        if self.presence.poll_expiry(now) {
            let dropped = self.delivery.flush();
            if dropped > 0 {
                warn!("Dropped {} undelivered messages", dropped);
            }
        }
        self.scheduler.advance(now);
    }

    /// Sends whatever is due, then gives the transport its maintenance slot.
    pub fn poll(&mut self, now: Instant) {
        for announcement in self.scheduler.take_due() {
            self.announce(announcement, now);
        }
        self.delivery.transport_mut().maintenance();
    }

    /// Earliest instant at which [`LightNode::advance`] has work to do.
    pub fn next_deadline(&self) -> Instant {
        let scheduled = self.scheduler.next_deadline();
        match self.presence.deadline() {
            Some(expiry) => scheduled.min(expiry),
            None => scheduled,
        }
    }

    /// Swaps in a new channel layout, shows the current state on it and tells
    /// the gateway about it.
    pub fn reconfigure(&mut self, profile: ChannelProfile, driver: D) {
        info!("Reconfigured from {:?} to {:?}", self.identity.profile, profile);
        self.identity.profile = profile;
        self.driver = driver;
        self.render(RenderMode::Drive);
        self.scheduler.request_config();
    }

    /// CONFIG goes out on the next poll.
    pub fn request_config_announcement(&mut self) {
        self.scheduler.request_config();
    }

    pub fn render(&mut self, mode: RenderMode) -> ChannelLevels {
        render(
            &self.state,
            self.identity.profile,
            mode,
            &mut self.driver,
            &mut self.store,
        )
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn profile(&self) -> ChannelProfile {
        self.identity.profile
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    pub fn delivery(&self) -> &DeliveryManager<T> {
        &self.delivery
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn on_keep_alive(&mut self, sender: PeerAddress, keep_alive: KeepAlive, now: Instant) {
        let outcome = self
            .presence
            .on_keep_alive(sender, keep_alive.is_bridge_online(), now);
        if outcome.resync() {
            for announcement in [
                Announcement::Config,
                Announcement::Attributes,
                Announcement::Status,
            ] {
                self.announce(announcement, now);
            }
        }
    }

    fn apply_command(&mut self, command: &SetCommand, now: Instant) {
        if self.state.apply(command) {
            debug!("Applied {:?}, now {:?}", command, self.state);
        }
        self.render(RenderMode::Drive);
        self.announce(Announcement::Status, now);
    }

    fn announce(&mut self, announcement: Announcement, now: Instant) -> Option<SequenceId> {
        let Some(gateway) = self.presence.bound_gateway() else {
            debug!("No gateway, skipping {:?}", announcement);
            return None;
        };

        let payload = match announcement {
            Announcement::Config => config_payload(&self.identity),
            Announcement::Attributes => {
                attributes_payload(&self.identity, now.saturating_duration_since(self.booted_at))
            }
            Announcement::KeepAlive => keep_alive_payload(),
            Announcement::Status => status_payload(&self.state),
        };

        match self
            .delivery
            .submit(Envelope::new(DeviceType::Led, payload), gateway)
        {
            Ok(sequence_id) => Some(sequence_id),
            Err(e) => {
                warn!("Failed to send {:?}: {}", announcement, e);
                None
            }
        }
    }
}
