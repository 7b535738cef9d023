pub mod announce;
pub mod config;
pub mod lights;
pub mod logging;
pub mod mesh;
pub mod node;
pub mod sim;
pub mod state;
pub mod store;

pub mod prelude {
    pub use crate::{
        announce::*, config::*, lights::*, mesh::*, node::*, state::*, store::*,
        MaintenanceRequest,
    };
}

/// Reported in attributes and written next to the saved state.
pub const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Gateway requests the node hands to the surrounding firmware.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaintenanceRequest {
    /// Bring the configuration access point back up.
    OpenAccessPoint,
    /// Reboot now.
    Restart,
}
