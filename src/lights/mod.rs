use std::collections::BTreeMap;

use anyhow::Error;
use log::{debug, info, warn};

#[cfg(feature = "pi")]
use rppal::gpio::{Gpio, OutputPin};

mod engine;
mod profile;

pub use engine::*;
pub use profile::*;

/// Software PWM frequency for the light channels.
#[cfg(feature = "pi")]
const PWM_FREQUENCY_HZ: f64 = 1000.0;

/// Sink for channel intensities.
pub trait OutputDriver {
    /// `level` may be outside 0..=255; implementations clamp it.
    fn write(&mut self, channel: Channel, level: i32) -> Result<(), Error>;
}

/// Hardware duty cycle for a computed level.
pub fn duty(level: i32) -> u8 {
    level.clamp(0, MAX_LEVEL) as u8
}

#[cfg(feature = "pi")]
type PinHandle = OutputPin;

#[cfg(not(feature = "pi"))]
type PinHandle = u8;

/// Drives the channels of one profile on GPIO pins.
pub struct LightController {
    pins: BTreeMap<Channel, PinHandle>,
    duties: BTreeMap<Channel, u8>,
}

impl LightController {
    pub fn init(profile: ChannelProfile, pins: &ChannelPins) -> Result<Self, Error> {
        #[allow(unused_mut)]
        let mut handles = BTreeMap::new();

        for channel in profile.channels() {
            let Some(gpio) = pins.pin(*channel) else {
                warn!("{:?}: no pin bound, channel will not be driven", channel);
                continue;
            };

            info!("{:?}: initializing on GPIO {}", channel, gpio);

            // Only touch GPIO if the Pi feature is enabled
            #[cfg(feature = "pi")]
            let handle = {
                let mut pin = Gpio::new()?.get(gpio)?.into_output();
                pin.set_low();
                pin
            };
            #[cfg(not(feature = "pi"))]
            let handle = gpio;

            handles.insert(*channel, handle);
        }

        Ok(Self {
            pins: handles,
            duties: BTreeMap::new(),
        })
    }

    /// Last duty written to `channel`.
    pub fn duty(&self, channel: Channel) -> Option<u8> {
        self.duties.get(&channel).copied()
    }

    pub fn is_bound(&self, channel: Channel) -> bool {
        self.pins.contains_key(&channel)
    }
}

impl OutputDriver for LightController {
    #[allow(unused_variables)]
    fn write(&mut self, channel: Channel, level: i32) -> Result<(), Error> {
        let duty = duty(level);
        self.duties.insert(channel, duty);

        let Some(pin) = self.pins.get_mut(&channel) else {
            return Ok(());
        };

        #[cfg(feature = "pi")]
        if duty == 0 {
            pin.clear_pwm()?;
            pin.set_low();
        } else {
            pin.set_pwm_frequency(PWM_FREQUENCY_HZ, duty as f64 / MAX_LEVEL as f64)?;
        }

        #[cfg(not(feature = "pi"))]
        debug!("{:?}: GPIO {} duty {}", channel, pin, duty);

        Ok(())
    }
}

/// Driver that remembers every write, in order.
#[derive(Debug, Default, Clone)]
pub struct RecordingDriver {
    pub writes: Vec<(Channel, i32)>,
}

impl RecordingDriver {
    /// Latest level written to `channel`.
    pub fn last(&self, channel: Channel) -> Option<i32> {
        self.writes
            .iter()
            .rev()
            .find(|(written, _)| *written == channel)
            .map(|(_, level)| *level)
    }
}

impl OutputDriver for RecordingDriver {
    fn write(&mut self, channel: Channel, level: i32) -> Result<(), Error> {
        self.writes.push((channel, level));
        Ok(())
    }
}
