use serde::{Deserialize, Serialize};

/// Which physical channels a node has.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum ChannelProfile {
    #[default]
    None,
    ColdWhite,
    ColdAndWarmWhite,
    Rgb,
    RgbPlusColdWhite,
    RgbPlusColdAndWarmWhite,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
pub enum Channel {
    ColdWhite,
    WarmWhite,
    Red,
    Green,
    Blue,
}

impl ChannelProfile {
    /// Tag announced to the gateway as the light class.
    pub fn tag(self) -> u8 {
        match self {
            ChannelProfile::None => 0,
            ChannelProfile::ColdWhite => 1,
            ChannelProfile::ColdAndWarmWhite => 2,
            ChannelProfile::Rgb => 3,
            ChannelProfile::RgbPlusColdWhite => 4,
            ChannelProfile::RgbPlusColdAndWarmWhite => 5,
        }
    }

    pub fn channels(self) -> &'static [Channel] {
        use Channel::*;
        match self {
            ChannelProfile::None => &[],
            ChannelProfile::ColdWhite => &[ColdWhite],
            ChannelProfile::ColdAndWarmWhite => &[ColdWhite, WarmWhite],
            ChannelProfile::Rgb => &[Red, Green, Blue],
            ChannelProfile::RgbPlusColdWhite => &[ColdWhite, Red, Green, Blue],
            ChannelProfile::RgbPlusColdAndWarmWhite => &[ColdWhite, WarmWhite, Red, Green, Blue],
        }
    }

    pub fn has(self, channel: Channel) -> bool {
        self.channels().contains(&channel)
    }

    pub fn has_rgb(self) -> bool {
        self.has(Channel::Red)
    }

    pub fn has_white(self) -> bool {
        self.has(Channel::ColdWhite)
    }

    /// Two white channels mixed by color temperature.
    pub fn has_temperature_split(self) -> bool {
        self.has(Channel::WarmWhite)
    }
}

/// BCM GPIO number per channel. Unbound channels are computed but not driven.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ChannelPins {
    pub cold_white: Option<u8>,
    pub warm_white: Option<u8>,
    pub red: Option<u8>,
    pub green: Option<u8>,
    pub blue: Option<u8>,
}

impl ChannelPins {
    pub fn pin(&self, channel: Channel) -> Option<u8> {
        match channel {
            Channel::ColdWhite => self.cold_white,
            Channel::WarmWhite => self.warm_white,
            Channel::Red => self.red,
            Channel::Green => self.green,
            Channel::Blue => self.blue,
        }
    }
}

/// Intensity per channel of one profile. Levels are unclamped; channels the
/// profile lacks are `None`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChannelLevels {
    pub cold_white: Option<i32>,
    pub warm_white: Option<i32>,
    pub red: Option<i32>,
    pub green: Option<i32>,
    pub blue: Option<i32>,
}

impl ChannelLevels {
    /// Every channel of `profile` present and off.
    pub fn off(profile: ChannelProfile) -> Self {
        let mut levels = ChannelLevels::default();
        for channel in profile.channels() {
            levels.set(*channel, 0);
        }
        levels
    }

    pub fn get(&self, channel: Channel) -> Option<i32> {
        *self.slot(channel)
    }

    pub fn set(&mut self, channel: Channel, level: i32) {
        let slot = self.slot_mut(channel);
        *slot = Some(level);
    }

    pub fn iter(&self) -> impl Iterator<Item = (Channel, i32)> + '_ {
        [
            Channel::ColdWhite,
            Channel::WarmWhite,
            Channel::Red,
            Channel::Green,
            Channel::Blue,
        ]
        .into_iter()
        .filter_map(|channel| self.get(channel).map(|level| (channel, level)))
    }

    fn slot(&self, channel: Channel) -> &Option<i32> {
        match channel {
            Channel::ColdWhite => &self.cold_white,
            Channel::WarmWhite => &self.warm_white,
            Channel::Red => &self.red,
            Channel::Green => &self.green,
            Channel::Blue => &self.blue,
        }
    }

    fn slot_mut(&mut self, channel: Channel) -> &mut Option<i32> {
        match channel {
            Channel::ColdWhite => &mut self.cold_white,
            Channel::WarmWhite => &mut self.warm_white,
            Channel::Red => &mut self.red,
            Channel::Green => &mut self.green,
            Channel::Blue => &mut self.blue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_follow_declaration_order() {
        let profiles = [
            ChannelProfile::None,
            ChannelProfile::ColdWhite,
            ChannelProfile::ColdAndWarmWhite,
            ChannelProfile::Rgb,
            ChannelProfile::RgbPlusColdWhite,
            ChannelProfile::RgbPlusColdAndWarmWhite,
        ];
        for (tag, profile) in profiles.into_iter().enumerate() {
            assert_eq!(profile.tag() as usize, tag);
        }
    }

    #[test]
    fn off_levels_cover_exactly_the_profile() {
        let levels = ChannelLevels::off(ChannelProfile::RgbPlusColdWhite);
        assert_eq!(levels.cold_white, Some(0));
        assert_eq!(levels.warm_white, None);
        assert_eq!(levels.iter().count(), 4);
        assert_eq!(ChannelLevels::off(ChannelProfile::None).iter().count(), 0);
    }
}
