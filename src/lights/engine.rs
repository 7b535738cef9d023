//! Device state to per-channel intensities.

use log::warn;

use super::{Channel, ChannelLevels, ChannelProfile, OutputDriver};
use crate::state::DeviceState;
use crate::store::StateStore;

/// Coldest white, in mireds.
pub const COLD_MIREDS: i32 = 153;
/// Warmest white, in mireds.
pub const WARM_MIREDS: i32 = 500;
pub const MAX_LEVEL: i32 = 255;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderMode {
    /// Write the outputs and persist the state.
    Drive,
    ComputeOnly,
}

/// Integer linear interpolation of `x` from `[in_min, in_max]` onto
/// `[out_min, out_max]`. Truncates toward zero and extrapolates outside the
/// input range.
pub fn linear_interpolate(x: i32, in_min: i32, in_max: i32, out_min: i32, out_max: i32) -> i32 {
    (x - in_min) * (out_max - out_min) / (in_max - in_min) + out_min
}

pub fn cold_white_level(color_temperature: u16, brightness: u8) -> i32 {
    let share = linear_interpolate(color_temperature as i32, WARM_MIREDS, COLD_MIREDS, 0, MAX_LEVEL);
    brightness as i32 * share / MAX_LEVEL
}

pub fn warm_white_level(color_temperature: u16, brightness: u8) -> i32 {
    let share = linear_interpolate(color_temperature as i32, COLD_MIREDS, WARM_MIREDS, 0, MAX_LEVEL);
    brightness as i32 * share / MAX_LEVEL
}

fn scale(component: u8, brightness: u8) -> i32 {
    component as i32 * brightness as i32 / MAX_LEVEL
}

/// Pure mapping, in precedence order:
///
/// 1. power off turns every channel off;
/// 2. a profile with white channels shows white when it has no RGB channels or
///    the color is the white sentinel, with RGB off;
/// 3. otherwise RGB shows the color scaled by brightness, with white off.
///
/// A single cold white channel follows brightness alone. Two white channels
/// split brightness by color temperature.
pub fn compute_levels(state: &DeviceState, profile: ChannelProfile) -> ChannelLevels {
    let mut levels = ChannelLevels::off(profile);
    if !state.power {
        return levels;
    }

    if profile.has_white() && (!profile.has_rgb() || state.is_full_white()) {
        if profile.has_temperature_split() {
            levels.set(
                Channel::ColdWhite,
                cold_white_level(state.color_temperature, state.brightness),
            );
            levels.set(
                Channel::WarmWhite,
                warm_white_level(state.color_temperature, state.brightness),
            );
        } else {
            levels.set(Channel::ColdWhite, state.brightness as i32);
        }
    } else if profile.has_rgb() {
        levels.set(Channel::Red, scale(state.red, state.brightness));
        levels.set(Channel::Green, scale(state.green, state.brightness));
        levels.set(Channel::Blue, scale(state.blue, state.brightness));
    }

    levels
}

/// Computes the levels and, in [`RenderMode::Drive`], writes them out and
/// persists `state`. Driver and store failures are logged.
pub fn render<D, S>(
    state: &DeviceState,
    profile: ChannelProfile,
    mode: RenderMode,
    driver: &mut D,
    store: &mut S,
) -> ChannelLevels
where
    D: OutputDriver + ?Sized,
    S: StateStore + ?Sized,
{
    let levels = compute_levels(state, profile);

    if mode == RenderMode::Drive {
        for (channel, level) in levels.iter() {
            if let Err(e) = driver.write(channel, level) {
                warn!("Failed to drive {:?} to {}: {:#}", channel, level, e);
            }
        }
        if let Err(e) = store.save(state) {
            warn!("Failed to persist device state: {:#}", e);
        }
    }

    levels
}
