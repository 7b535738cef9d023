use std::path::{Path, PathBuf};

use anyhow::{Context, Error};
use espnow_light::prelude::*;
use espnow_light::config::watch;
use espnow_light::{logging, sim};
use log::{error, info, warn};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

enum Exit {
    Restart,
    Shutdown,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Error> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    let mut config = NodeConfig::load_or_create(&config_path)?;
    logging::init(&config.log_level)?;
    info!("Starting config watcher on {}...", config_path.display());

    let (reload_tx, mut reload_rx) = mpsc::channel(1);
    let _watcher = watch(&config_path, reload_tx)?;

    loop {
        match run(&config, &config_path, &mut reload_rx).await? {
            Exit::Restart => {
                info!("Restarting node...");
                match NodeConfig::load(&config_path) {
                    Ok(reloaded) => config = reloaded,
                    Err(e) => warn!("Restarting with the previous config: {:#}", e),
                }
            }
            Exit::Shutdown => break,
        }
    }

    info!("Shut down");
    Ok(())
}

/// One boot of the node, from loading the saved state to a restart or Ctrl-C.
async fn run(
    config: &NodeConfig,
    config_path: &Path,
    reloads: &mut mpsc::Receiver<()>,
) -> Result<Exit, Error> {
    info!("Starting simulated mesh on {}...", config.network_name);
    let (transport, mut link, gateway) = sim::link(&config.simulation);
    let gateway_handle = tokio::spawn(gateway.run());

    info!("Starting lights...");
    let driver = LightController::init(config.profile, &config.pins)
        .context("initializing light outputs")?;
    let store = FileStore::new(&config.status_path);

    let mut node = LightNode::new(config, transport, driver, store, Instant::now());
    let mut current = config.clone();

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let exit = loop {
        let now = Instant::now();
        node.advance(now);
        node.poll(now);

        tokio::select! {
            Some(frame) = link.frames.recv() => {
                match node.handle_frame(&frame, Instant::now()) {
                    Some(MaintenanceRequest::Restart) => break Exit::Restart,
                    Some(MaintenanceRequest::OpenAccessPoint) => {
                        warn!("No configuration access point on this host, edit {} instead", config_path.display());
                    }
                    None => {}
                }
            }
            Some(ack) = link.acks.recv() => node.on_acknowledge(ack),
            Some(()) = reloads.recv() => {
                match NodeConfig::load(config_path) {
                    Ok(new) => {
                        if new.profile != current.profile || new.pins != current.pins {
                            match LightController::init(new.profile, &new.pins) {
                                Ok(driver) => node.reconfigure(new.profile, driver),
                                Err(e) => error!("Keeping the old channel layout: {:#}", e),
                            }
                        }
                        if new.device_name != current.device_name || new.timing != current.timing {
                            info!("Name and timing changes apply after a restart");
                        }
                        current = new;
                    }
                    Err(e) => warn!("Ignoring config change: {:#}", e),
                }
            }
            _ = sleep_until(node.next_deadline()) => {}
            _ = &mut shutdown => break Exit::Shutdown,
        }
    };

    gateway_handle.abort();
    Ok(exit)
}
