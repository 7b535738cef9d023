use common::{SetCommand, StateReport, SwitchState};
use serde::{Deserialize, Serialize};

/// What the light should be showing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DeviceState {
    pub power: bool,
    pub brightness: u8,
    /// Mireds, nominally 153 (cold) to 500 (warm). Not clamped.
    pub color_temperature: u16,
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Default for DeviceState {
    fn default() -> Self {
        DeviceState {
            power: false,
            brightness: 255,
            color_temperature: 255,
            red: 255,
            green: 255,
            blue: 255,
        }
    }
}

impl DeviceState {
    /// The white sentinel color switches RGB+white lights to their white channels.
    pub fn is_full_white(&self) -> bool {
        self.red == 255 && self.green == 255 && self.blue == 255
    }

    /// Applies the keys present in `command`, returns whether anything changed.
    pub fn apply(&mut self, command: &SetCommand) -> bool {
        let before = *self;

        if let Some(power) = command.power_on() {
            self.power = power;
        }
        if let Some(brightness) = command.brightness_level() {
            self.brightness = brightness;
        }
        if let Some(temperature) = command.color_temperature_mireds() {
            self.color_temperature = temperature;
        }
        if let Some((red, green, blue)) = command.rgb_components() {
            self.red = red;
            self.green = green;
            self.blue = blue;
        }

        before != *self
    }

    pub fn report(&self) -> StateReport {
        StateReport {
            state: SwitchState::from(self.power),
            brightness: self.brightness,
            temperature: self.color_temperature,
            rgb: format!("{},{},{}", self.red, self.green, self.blue),
        }
    }
}
