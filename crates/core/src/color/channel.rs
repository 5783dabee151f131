use std::fmt;

use serde::{Deserialize, Serialize};

use super::Color;

/// Number of addressable ANSI palette entries.
pub const PALETTE_SIZE: usize = 16;

/// Broad class of a terminal color slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Foreground,
    Background,
    Palette,
}

/// A single addressable terminal color slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Foreground,
    Background,
    Palette(u8),
}

impl Channel {
    pub fn kind(self) -> ChannelKind {
        match self {
            Self::Foreground => ChannelKind::Foreground,
            Self::Background => ChannelKind::Background,
            Self::Palette(_) => ChannelKind::Palette,
        }
    }

    /// Every channel, foreground and background first.
    pub fn all() -> impl Iterator<Item = Channel> {
        [Self::Foreground, Self::Background]
            .into_iter()
            .chain((0..PALETTE_SIZE as u8).map(Self::Palette))
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Foreground => f.write_str("foreground"),
            Self::Background => f.write_str("background"),
            Self::Palette(index) => write!(f, "palette[{index}]"),
        }
    }
}

/// One value per terminal color slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelMap<T> {
    pub foreground: T,
    pub background: T,
    pub palette: [T; PALETTE_SIZE],
}

/// The full set of colors for one frame.
pub type ColorFrame = ChannelMap<Color>;

impl<T: Copy> ChannelMap<T> {
    pub fn splat(value: T) -> Self {
        Self {
            foreground: value,
            background: value,
            palette: [value; PALETTE_SIZE],
        }
    }

    /// Panics if a palette index is out of range; callers validate indices
    /// when scenes are resolved.
    pub fn get(&self, channel: Channel) -> T {
        match channel {
            Channel::Foreground => self.foreground,
            Channel::Background => self.background,
            Channel::Palette(index) => self.palette[index as usize],
        }
    }

    pub fn set(&mut self, channel: Channel, value: T) {
        match channel {
            Channel::Foreground => self.foreground = value,
            Channel::Background => self.background = value,
            Channel::Palette(index) => self.palette[index as usize] = value,
        }
    }

    pub fn map<U: Copy>(&self, mut f: impl FnMut(Channel, T) -> U) -> ChannelMap<U> {
        ChannelMap {
            foreground: f(Channel::Foreground, self.foreground),
            background: f(Channel::Background, self.background),
            palette: std::array::from_fn(|i| f(Channel::Palette(i as u8), self.palette[i])),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Channel, T)> + '_ {
        Channel::all().map(move |channel| (channel, self.get(channel)))
    }
}

impl<T: Copy + Default> Default for ChannelMap<T> {
    fn default() -> Self {
        Self::splat(T::default())
    }
}
