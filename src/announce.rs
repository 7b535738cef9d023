//! Periodic announcements to the gateway.

use std::time::Duration;

use common::{
    Attributes, ConfigAnnouncement, KeepAlive, Payload, PeerAddress, LIBRARY_VERSION,
};
use tokio::time::Instant;

use crate::config::Timing;
use crate::lights::ChannelProfile;
use crate::state::DeviceState;
use crate::FIRMWARE_VERSION;

const MIN_PERIOD: Duration = Duration::from_millis(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Announcement {
    Config,
    Attributes,
    KeepAlive,
    Status,
}

/// Due flag set on every period boundary, cleared by whoever consumes it.
#[derive(Clone, Copy, Debug)]
struct PeriodicFlag {
    period: Duration,
    next_fire: Instant,
    due: bool,
}

impl PeriodicFlag {
    /// Starts due, so the first announcement goes out at boot.
    fn new(period: Duration, now: Instant) -> Self {
        let period = period.max(MIN_PERIOD);
        Self {
            period,
            next_fire: now + period,
            due: true,
        }
    }

    fn advance(&mut self, now: Instant) {
        if now < self.next_fire {
            return;
        }
        self.due = true;
        // Missed periods collapse into one firing
        while self.next_fire <= now {
            self.next_fire += self.period;
        }
    }

    fn take(&mut self) -> bool {
        std::mem::replace(&mut self.due, false)
    }
}

pub struct AnnouncementScheduler {
    attributes: PeriodicFlag,
    keep_alive: PeriodicFlag,
    status: PeriodicFlag,
    config_requested: bool,
}

impl AnnouncementScheduler {
    pub fn new(timing: &Timing, now: Instant) -> Self {
        Self {
            attributes: PeriodicFlag::new(timing.attributes_period(), now),
            keep_alive: PeriodicFlag::new(timing.keep_alive_period(), now),
            status: PeriodicFlag::new(timing.status_period(), now),
            config_requested: false,
        }
    }

    /// Sets the flags of every period that has elapsed by `now`.
    pub fn advance(&mut self, now: Instant) {
        self.attributes.advance(now);
        self.keep_alive.advance(now);
        self.status.advance(now);
    }

    /// Queues a one-off CONFIG announcement for the next poll.
    pub fn request_config(&mut self) {
        self.config_requested = true;
    }

    /// Clears and returns every due announcement.
    pub fn take_due(&mut self) -> Vec<Announcement> {
        let mut due = Vec::new();
        if std::mem::replace(&mut self.config_requested, false) {
            due.push(Announcement::Config);
        }
        if self.attributes.take() {
            due.push(Announcement::Attributes);
        }
        if self.keep_alive.take() {
            due.push(Announcement::KeepAlive);
        }
        if self.status.take() {
            due.push(Announcement::Status);
        }
        due
    }

    pub fn next_deadline(&self) -> Instant {
        self.attributes
            .next_fire
            .min(self.keep_alive.next_fire)
            .min(self.status.next_fire)
    }
}

/// What a node says about itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub device_name: String,
    pub mcu: String,
    pub address: PeerAddress,
    pub profile: ChannelProfile,
}

/// `Days:D Hours:H Mins:M`, hours and minutes within the day and hour.
pub fn format_uptime(uptime: Duration) -> String {
    let mins = uptime.as_secs() / 60;
    let hours = mins / 60;
    let days = hours / 24;
    format!("Days:{} Hours:{} Mins:{}", days, hours % 24, mins % 60)
}

pub fn attributes_payload(identity: &Identity, uptime: Duration) -> Payload {
    Payload::Attributes(Attributes {
        device_kind: "ESP-NOW light".to_string(),
        mcu: identity.mcu.clone(),
        mac: identity.address.to_string(),
        firmware: FIRMWARE_VERSION.to_string(),
        library: LIBRARY_VERSION.to_string(),
        uptime: format_uptime(uptime),
    })
}

pub fn config_payload(identity: &Identity) -> Payload {
    Payload::Config(ConfigAnnouncement::light(
        identity.device_name.clone(),
        identity.profile.tag(),
    ))
}

pub fn status_payload(state: &DeviceState) -> Payload {
    Payload::State(state.report())
}

pub fn keep_alive_payload() -> Payload {
    Payload::KeepAlive(KeepAlive::empty())
}
