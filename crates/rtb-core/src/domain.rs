use serde::{Deserialize, Serialize};

/// Normalized driver identifier.
///
/// A pure function of the user-supplied display name (trimmed, lowercased),
/// so re-tracking the same name overwrites instead of duplicating.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DriverId(pub String);

impl DriverId {
    pub fn normalize(display_name: &str) -> Self {
        Self(display_name.trim().to_lowercase())
    }
}

/// Chat/channel id (numeric) where notifications for a driver are posted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub i64);

/// Race identifier, used as the last-seen marker.
///
/// Race ids are monotonically increasing: "newer" means strictly greater.
/// The ResultSource contract relies on this ordering when filtering out
/// already-notified results.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RaceId(pub u64);

/// One tracked driver.
///
/// `last_race` is the most recent race already notified; `None` means never
/// notified. It serializes as an explicit `null` so the persisted schema
/// stays stable across versions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub driver_id: DriverId,
    pub display_name: String,
    pub channel_id: ChannelId,
    pub last_race: Option<RaceId>,
}

/// A finished race for a tracked driver, as reported by the results provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RaceReport {
    pub race_id: RaceId,
    pub series_name: String,
    pub track_name: String,
    pub finish_position: u32,
    pub start_position: u32,
    pub field_size: u32,
    pub incidents: u32,
    pub irating_change: i32,
    pub new_irating: u32,
    pub sr_change: f64,
    pub new_sr: f64,
    pub race_time: String,
    pub champ_points: Option<u32>,
}

impl RaceReport {
    /// Canned report used by the manual `/testresult` entry point.
    pub fn sample() -> Self {
        Self {
            race_id: RaceId(12345),
            series_name: "GT3 Fixed".to_string(),
            track_name: "Spa-Francorchamps".to_string(),
            finish_position: 3,
            start_position: 7,
            field_size: 24,
            incidents: 4,
            irating_change: 45,
            new_irating: 2545,
            sr_change: 0.15,
            new_sr: 4.50,
            race_time: "42:15.332".to_string(),
            champ_points: Some(85),
        }
    }
}
