use serde::Serialize;

/// Lifecycle of a track: `Tentative -> Confirmed -> Deleted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackState {
    /// Spawned from an unmatched detection, waiting for `min_hits` consecutive matches
    #[default]
    Tentative,
    /// Persisted long enough to count as a person
    Confirmed,
    /// Missed too many frames; removed from the active set
    Deleted,
}
