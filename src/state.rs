//! Player state as reported by the Volumio `getState` endpoint

use std::fmt;

use serde::{Deserialize, Deserializer};

/// Lowest volume the player accepts
pub const MIN_VOLUME: i64 = 0;
/// Highest volume the player accepts
pub const MAX_VOLUME: i64 = 100;

/// Clamp a requested volume into the range the player accepts.
#[must_use]
pub fn clamp_volume(volume: i64) -> u8 {
    // Both bounds fit in a u8 after clamping
    volume.clamp(MIN_VOLUME, MAX_VOLUME) as u8
}

/// Current playback status of a Volumio player
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum PlaybackStatus {
    Play,
    Pause,
    Stop,
    /// Anything the player reports that is not one of the above, kept verbatim
    Other(String),
    #[default]
    Unknown,
}
impl PlaybackStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Play => "play",
            Self::Pause => "pause",
            Self::Stop => "stop",
            Self::Other(s) => s,
            Self::Unknown => "",
        }
    }
}
impl From<String> for PlaybackStatus {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_ref() {
            "play" => Self::Play,
            "pause" => Self::Pause,
            "stop" => Self::Stop,
            "" => Self::Unknown,
            _ => Self::Other(s),
        }
    }
}
impl fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Treat an explicit `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Snapshot of the player at the time of the query.
///
/// Values are kept as reported: in particular `volume` is not clamped on read.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlayerState {
    #[serde(deserialize_with = "null_as_default")]
    pub status: PlaybackStatus,
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(deserialize_with = "null_as_default")]
    pub artist: String,
    #[serde(deserialize_with = "null_as_default")]
    pub album: String,
    /// Elapsed position, in the unit the player reports (milliseconds on Volumio)
    #[serde(deserialize_with = "null_as_default")]
    pub seek: u64,
    /// Track length in seconds
    #[serde(deserialize_with = "null_as_default")]
    pub duration: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub volume: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub repeat: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub random: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub consume: bool,
    #[serde(rename = "volumio_version", deserialize_with = "null_as_default")]
    pub version: String,
    #[serde(deserialize_with = "null_as_default")]
    pub service: String,
    #[serde(rename = "trackType", deserialize_with = "null_as_default")]
    pub track_type: String,
    #[serde(deserialize_with = "null_as_default")]
    pub samplerate: String,
    #[serde(deserialize_with = "null_as_default")]
    pub bitdepth: String,
    #[serde(deserialize_with = "null_as_default")]
    pub channels: u32,
    #[serde(deserialize_with = "null_as_default")]
    pub updated: String,
    #[serde(rename = "disableUiControls", deserialize_with = "null_as_default")]
    pub disable_ui_controls: bool,
}

impl PlayerState {
    /// Title, artist and album joined for a single display line
    pub fn track_line(&self) -> Option<String> {
        if self.title.is_empty() {
            return None;
        }
        let mut line = self.title.clone();
        if !self.artist.is_empty() {
            line.push_str(" - ");
            line.push_str(&self.artist);
        }
        if !self.album.is_empty() {
            line.push_str(&format!(" ({})", self.album));
        }
        Some(line)
    }

    /// Sample rate, bit depth and channel count, skipping whatever is unknown
    pub fn format_line(&self) -> Option<String> {
        let mut parts: Vec<String> = [&self.track_type, &self.samplerate, &self.bitdepth]
            .into_iter()
            .filter(|s| !s.is_empty())
            .cloned()
            .collect();
        if self.channels > 0 {
            parts.push(format!("{}ch", self.channels));
        }
        (!parts.is_empty()).then(|| parts.join(" / "))
    }
}
