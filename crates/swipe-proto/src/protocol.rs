use serde::{Deserialize, Serialize};

/// A looping background clip attached to a station.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct VideoClip {
    pub url: String,
    /// Loop start marker in seconds.
    #[serde(default)]
    pub start_secs: Option<f64>,
    /// Loop end marker in seconds.  `None` loops at the end of the asset.
    #[serde(default)]
    pub end_secs: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Station {
    pub id: String,
    pub name: String,
    #[serde(default, alias = "logo_url")]
    pub artwork_url: String,
    #[serde(default)]
    pub video: Option<VideoClip>,
    pub stream_url: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    /// Ascending sort key inside the catalog.
    #[serde(default)]
    pub display_order: i64,
    #[serde(default = "default_active", alias = "is_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Station {
    /// A station is playable when it has a non-blank stream endpoint.
    pub fn is_playable(&self) -> bool {
        !self.stream_url.trim().is_empty()
    }

    /// "City, Country" or just "Country".
    pub fn location(&self) -> String {
        match self.city.as_deref().filter(|c| !c.trim().is_empty()) {
            Some(city) if !self.country.is_empty() => format!("{}, {}", city, self.country),
            Some(city) => city.to_string(),
            None => self.country.clone(),
        }
    }
}

/// Playback status as seen by the host.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum PlaybackStatus {
    #[default]
    Idle, // nothing started yet (waiting for the first user gesture)
    Loading,     // play() issued, waiting for audio
    Crossfading, // switching channels
    Playing,
    Paused,
    Error, // rejected or stalled
}

impl PlaybackStatus {
    /// Banner text shown while a transition is in flight.
    pub fn banner(&self) -> Option<&'static str> {
        match self {
            PlaybackStatus::Loading => Some("Loading..."),
            PlaybackStatus::Crossfading => Some("Tuning in..."),
            _ => None,
        }
    }
}

/// Read-only snapshot of the player, published for the HTTP API.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PlayerSnapshot {
    pub station_count: usize,
    pub current_index: Option<usize>,
    pub current_station: Option<String>,
    pub status: PlaybackStatus,
    pub muted: bool,
    pub volume: f32,
    pub error: Option<String>,
    pub listeners: usize,
}

/// Commands that reach the app from outside the terminal (HTTP API).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "cmd")]
pub enum RemoteCommand {
    Next,
    Prev,
    GoTo { index: usize },
    ToggleMute,
    TogglePause,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playable_requires_stream_url() {
        let mut station = Station {
            stream_url: "   ".into(),
            ..Station::default()
        };
        assert!(!station.is_playable());
        station.stream_url = "https://example.org/live.mp3".into();
        assert!(station.is_playable());
    }

    #[test]
    fn test_location_formatting() {
        let mut station = Station {
            country: "France".into(),
            ..Station::default()
        };
        assert_eq!(station.location(), "France");
        station.city = Some("Paris".into());
        assert_eq!(station.location(), "Paris, France");
        station.city = Some("".into());
        assert_eq!(station.location(), "France");
    }

    #[test]
    fn test_remote_command_json() {
        let cmd: RemoteCommand = serde_json::from_str(r#"{"cmd":"GoTo","index":3}"#).unwrap();
        assert_eq!(cmd, RemoteCommand::GoTo { index: 3 });
    }

    #[test]
    fn test_station_defaults_to_active() {
        let station: Station =
            serde_json::from_str(r#"{"id":"a","name":"A","stream_url":"http://x"}"#).unwrap();
        assert!(station.active);
        assert!(station.video.is_none());
    }
}
