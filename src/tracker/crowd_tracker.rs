//! Multi-person tracker: Kalman prediction, two-stage assignment, lifecycle.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::detect::Detection;
use crate::error::ConfigError;
use crate::tracker::kalman_filter::KalmanFilter;
use crate::tracker::matching::{self, AssignmentResult};
use crate::tracker::rect::Rect;
use crate::tracker::track::{Track, TrackId, TrackSnapshot};
use crate::tracker::track_state::TrackState;

/// IoU-distance gate for the second (low-confidence) association pass.
const LOW_SCORE_MATCH_THRESH: f32 = 0.5;

/// Configuration for the [`CrowdTracker`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Consecutive matches before a tentative track counts as a person.
    pub min_hits: u32,
    /// Consecutive misses a confirmed track survives before deletion.
    pub max_misses: u32,
    /// Maximum association cost accepted as a match.
    pub match_thresh: f32,
    /// Share of the cost taken by centroid distance instead of IoU.
    pub distance_weight: f32,
    /// Centroid distance (normalized units) at which the distance cost saturates.
    pub max_centroid_distance: f32,
    /// Detections at or above this confidence may start tracks; weaker ones
    /// only keep existing confirmed tracks alive.
    pub spawn_confidence: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            min_hits: 3,
            max_misses: 5,
            match_thresh: 0.8,
            distance_weight: 0.3,
            max_centroid_distance: 0.2,
            spawn_confidence: 0.5,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_hits == 0 {
            return Err(ConfigError::invalid("tracker.min_hits", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.distance_weight) {
            return Err(ConfigError::invalid("tracker.distance_weight", "must be within [0, 1]"));
        }
        if !(self.match_thresh > 0.0 && self.match_thresh.is_finite()) {
            return Err(ConfigError::invalid("tracker.match_thresh", "must be positive"));
        }
        if !(self.max_centroid_distance > 0.0 && self.max_centroid_distance.is_finite()) {
            return Err(ConfigError::invalid(
                "tracker.max_centroid_distance",
                "must be positive",
            ));
        }
        if !(0.0..=1.0).contains(&self.spawn_confidence) {
            return Err(ConfigError::invalid("tracker.spawn_confidence", "must be within [0, 1]"));
        }
        Ok(())
    }
}

/// Arena of live tracks for one camera.
pub struct CrowdTracker {
    tracks: BTreeMap<TrackId, Track>,
    next_track_id: TrackId,
    frame_id: u64,
    deleted_total: u64,
    config: TrackerConfig,
    kalman_filter: KalmanFilter,
}

impl CrowdTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            tracks: BTreeMap::new(),
            next_track_id: 1,
            frame_id: 0,
            deleted_total: 0,
            config,
            kalman_filter: KalmanFilter::default(),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Advance one frame and return the confirmed tracks, ordered by id.
    pub fn update(&mut self, detections: &[Detection]) -> Vec<TrackSnapshot> {
        self.frame_id += 1;

        for track in self.tracks.values_mut() {
            track.predict(&self.kalman_filter);
        }

        // Step 1: split detections into high-score and low-score
        let (high, low): (Vec<&Detection>, Vec<&Detection>) = detections
            .iter()
            .partition(|d| d.confidence >= self.config.spawn_confidence);
        let high: Vec<Detection> = high.into_iter().cloned().collect();
        let low: Vec<Detection> = low.into_iter().cloned().collect();

        // Step 2: first association, every live track against high-score detections
        let track_ids: Vec<TrackId> = self.tracks.keys().copied().collect();
        let track_rects: Vec<Rect> = track_ids.iter().map(|id| self.tracks[id].rect()).collect();
        let cost = matching::association_cost(
            &track_rects,
            &high,
            self.config.distance_weight,
            self.config.max_centroid_distance,
        );
        let AssignmentResult {
            matches,
            unmatched_tracks,
            unmatched_detections,
        } = matching::linear_assignment(&cost, self.config.match_thresh);

        for (itrack, idet) in matches {
            self.associate(track_ids[itrack], &high[idet]);
        }

        // Step 3: second association, leftover confirmed tracks against low-score detections
        let remaining: Vec<TrackId> = unmatched_tracks
            .iter()
            .map(|&i| track_ids[i])
            .filter(|id| self.tracks[id].is_confirmed())
            .collect();
        let remaining_rects: Vec<Rect> = remaining.iter().map(|id| self.tracks[id].rect()).collect();
        let low_rects: Vec<Rect> = low.iter().map(|d| d.bbox).collect();
        let low_cost = matching::iou_distance(&remaining_rects, &low_rects);
        let second = matching::linear_assignment(&low_cost, LOW_SCORE_MATCH_THRESH);

        let mut rescued = Vec::with_capacity(second.matches.len());
        for (itrack, idet) in second.matches {
            self.associate(remaining[itrack], &low[idet]);
            rescued.push(remaining[itrack]);
        }

        // Step 4: everything not associated this frame misses
        for &i in &unmatched_tracks {
            let id = track_ids[i];
            if rescued.contains(&id) {
                continue;
            }
            if let Some(track) = self.tracks.get_mut(&id) {
                track.mark_missed(self.config.max_misses);
            }
        }

        // Step 5: spawn tentative tracks from unmatched high-score detections
        for idet in unmatched_detections {
            let id = self.next_track_id;
            self.next_track_id += 1;
            let track = Track::spawn(
                id,
                &high[idet],
                &self.kalman_filter,
                self.frame_id,
                self.config.min_hits,
            );
            self.tracks.insert(id, track);
        }

        // Step 6: drop deleted tracks from the arena
        let before = self.tracks.len();
        self.tracks.retain(|_, t| t.state != TrackState::Deleted);
        let removed = before - self.tracks.len();
        if removed > 0 {
            self.deleted_total += removed as u64;
            log::trace!("frame {}: removed {} tracks", self.frame_id, removed);
        }

        self.confirmed()
    }

    fn associate(&mut self, id: TrackId, detection: &Detection) {
        if let Some(track) = self.tracks.get_mut(&id) {
            track.update(detection, &self.kalman_filter, self.frame_id, self.config.min_hits);
        }
    }

    /// Confirmed tracks, coasting ones included, ordered by id.
    pub fn confirmed(&self) -> Vec<TrackSnapshot> {
        self.tracks
            .values()
            .filter(|t| t.is_confirmed())
            .map(Track::snapshot)
            .collect()
    }

    pub fn confirmed_count(&self) -> usize {
        self.tracks.values().filter(|t| t.is_confirmed()).count()
    }

    /// Every live track, tentative ones included.
    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    pub fn deleted_total(&self) -> u64 {
        self.deleted_total
    }

    /// Tear down all tracks. Ids keep increasing so none is handed out twice.
    pub fn reset(&mut self) {
        self.deleted_total += self.tracks.len() as u64;
        self.tracks.clear();
        self.frame_id = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(x: f32, y: f32) -> Detection {
        Detection::person(Rect::new(x, y, 0.05, 0.15), 0.9)
    }

    #[test]
    fn test_track_confirms_and_keeps_id() {
        let mut tracker = CrowdTracker::new(TrackerConfig::default());
        assert!(tracker.update(&[person(0.2, 0.2)]).is_empty());
        assert!(tracker.update(&[person(0.205, 0.2)]).is_empty());
        let confirmed = tracker.update(&[person(0.21, 0.2)]);
        assert_eq!(confirmed.len(), 1);
        let id = confirmed[0].track_id;

        for step in 0..5 {
            let x = 0.215 + 0.005 * step as f32;
            let confirmed = tracker.update(&[person(x, 0.2)]);
            assert_eq!(confirmed.len(), 1);
            assert_eq!(confirmed[0].track_id, id);
        }
    }

    #[test]
    fn test_low_score_detection_keeps_confirmed_track() {
        let config = TrackerConfig {
            min_hits: 1,
            ..TrackerConfig::default()
        };
        let mut tracker = CrowdTracker::new(config);
        let id = tracker.update(&[person(0.5, 0.5)])[0].track_id;

        let weak = Detection::person(Rect::new(0.5, 0.5, 0.05, 0.15), 0.2);
        let confirmed = tracker.update(&[weak]);
        assert_eq!(confirmed.len(), 1);
        assert_eq!(confirmed[0].track_id, id);
        assert_eq!(confirmed[0].misses, 0);
    }

    #[test]
    fn test_low_score_detection_never_spawns() {
        let mut tracker = CrowdTracker::new(TrackerConfig {
            min_hits: 1,
            ..TrackerConfig::default()
        });
        let weak = Detection::person(Rect::new(0.5, 0.5, 0.05, 0.15), 0.2);
        assert!(tracker.update(&[weak]).is_empty());
        assert_eq!(tracker.tracks().count(), 0);
    }

    #[test]
    fn test_reset_does_not_recycle_ids() {
        let mut tracker = CrowdTracker::new(TrackerConfig {
            min_hits: 1,
            ..TrackerConfig::default()
        });
        let first = tracker.update(&[person(0.1, 0.1)])[0].track_id;
        tracker.reset();
        let second = tracker.update(&[person(0.1, 0.1)])[0].track_id;
        assert!(second > first);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = TrackerConfig {
            min_hits: 0,
            ..TrackerConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(TrackerConfig::default().validate().is_ok());
    }
}
