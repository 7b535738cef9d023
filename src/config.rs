use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{ensure, Context, Error};
use common::PeerAddress;
use log::{info, warn};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::lights::{ChannelPins, ChannelProfile};

pub const DEFAULT_CONFIG_PATH: &str = "node.ron";

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct NodeConfig {
    /// Mesh network the node joins.
    pub network_name: String,
    pub device_name: String,
    pub mcu: String,
    pub profile: ChannelProfile,
    pub pins: ChannelPins,
    pub timing: Timing,
    /// Where the last device state is kept between boots.
    pub status_path: PathBuf,
    pub log_level: String,
    pub simulation: SimulationConfig,
}

/// Periods in seconds.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct Timing {
    pub attributes_secs: u64,
    pub keep_alive_secs: u64,
    pub status_secs: u64,
    pub presence_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    pub node_address: PeerAddress,
    pub gateway_address: PeerAddress,
    pub keep_alive_secs: u64,
    pub set_command_secs: u64,
    /// Probability in 0..=1 that a unicast frame is negatively acknowledged.
    pub ack_failure_rate: f64,
    /// Flip the upstream bridge flag after this many keep-alives, 0 keeps it online.
    pub bridge_toggle_every: u32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let simulation = SimulationConfig::default();
        let [.., a, b, c] = simulation.node_address.octets();
        NodeConfig {
            network_name: "homenet".to_string(),
            device_name: format!("ESP-NOW light {a:02X}{b:02X}{c:02X}"),
            mcu: "ESP8266".to_string(),
            profile: ChannelProfile::RgbPlusColdAndWarmWhite,
            pins: ChannelPins {
                cold_white: Some(12),
                warm_white: Some(13),
                red: Some(17),
                green: Some(27),
                blue: Some(22),
            },
            timing: Timing::default(),
            status_path: PathBuf::from("status.json"),
            log_level: "info".to_string(),
            simulation,
        }
    }
}

impl Default for Timing {
    fn default() -> Self {
        Timing {
            attributes_secs: 60,
            keep_alive_secs: 10,
            status_secs: 300,
            presence_timeout_secs: 15,
        }
    }
}

impl Timing {
    pub fn attributes_period(&self) -> Duration {
        Duration::from_secs(self.attributes_secs)
    }

    pub fn keep_alive_period(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn status_period(&self) -> Duration {
        Duration::from_secs(self.status_secs)
    }

    pub fn presence_timeout(&self) -> Duration {
        Duration::from_secs(self.presence_timeout_secs)
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            node_address: PeerAddress::new([0x5c, 0xcf, 0x7f, 0x01, 0x02, 0x03]),
            gateway_address: PeerAddress::new([0x24, 0x6f, 0x28, 0xaa, 0xbb, 0xcc]),
            keep_alive_secs: 5,
            set_command_secs: 20,
            ack_failure_rate: 0.1,
            bridge_toggle_every: 12,
        }
    }
}

impl NodeConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<NodeConfig, Error> {
        let path = path.as_ref();
        let config = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: NodeConfig =
            ron::from_str(&config).with_context(|| format!("parsing {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the file, writing the defaults there first if it does not exist.
    pub fn load_or_create(path: impl AsRef<Path>) -> Result<NodeConfig, Error> {
        let path = path.as_ref();
        if !path.exists() {
            let config = NodeConfig::default();
            config.save(path)?;
            info!("Wrote default config to {}", path.display());
            return Ok(config);
        }
        NodeConfig::load(path)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let path = path.as_ref();
        let text = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    fn validate(&self) -> Result<(), Error> {
        let timing = &self.timing;
        ensure!(
            timing.attributes_secs > 0
                && timing.keep_alive_secs > 0
                && timing.status_secs > 0
                && timing.presence_timeout_secs > 0,
            "timing periods must be at least one second"
        );
        ensure!(
            (0.0..=1.0).contains(&self.simulation.ack_failure_rate),
            "ack_failure_rate must be within 0..=1"
        );
        ensure!(
            self.simulation.keep_alive_secs > 0 && self.simulation.set_command_secs > 0,
            "simulation periods must be at least one second"
        );
        Ok(())
    }
}

/// Watches the config file and pokes `reloads` whenever it changes. The
/// watcher stops when the returned handle is dropped.
pub fn watch(path: impl AsRef<Path>, reloads: mpsc::Sender<()>) -> Result<RecommendedWatcher, Error> {
    let mut watcher = notify::recommended_watcher(move |event: notify::Result<Event>| match event {
        Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
            // A full queue already holds a pending reload.
            let _ = reloads.try_send(());
        }
        Ok(_) => {}
        Err(e) => warn!("Config watcher error: {}", e),
    })?;
    watcher.watch(path.as_ref(), RecursiveMode::NonRecursive)?;
    Ok(watcher)
}
