//! A single person track and its per-frame bookkeeping.

use std::collections::VecDeque;

use serde::Serialize;

use crate::detect::Detection;
use crate::tracker::kalman_filter::{KalmanFilter, StateCovariance, StateMean};
use crate::tracker::rect::Rect;
use crate::tracker::track_state::TrackState;

pub type TrackId = u64;

/// Recent box centers kept per track, oldest first.
pub const TRAIL_LEN: usize = 30;

/// One tracked person, owned by the tracker's arena.
#[derive(Debug, Clone)]
pub struct Track {
    pub track_id: TrackId,
    pub state: TrackState,
    /// Confidence of the last associated detection
    pub confidence: f32,
    /// Frames since creation
    pub age: u32,
    /// Consecutive successful associations
    pub hits: u32,
    /// Consecutive failed associations
    pub misses: u32,
    /// Last associated detection box (normalized TLWH)
    pub last_box: Rect,
    pub start_frame: u64,
    /// Frame of the last successful association
    pub frame_id: u64,
    trail: VecDeque<(f32, f32)>,
    mean: StateMean,
    covariance: StateCovariance,
}

impl Track {
    /// Start a track from an unmatched detection. It is tentative unless a
    /// single hit already satisfies `min_hits`.
    pub fn spawn(
        track_id: TrackId,
        detection: &Detection,
        kalman_filter: &KalmanFilter,
        frame_id: u64,
        min_hits: u32,
    ) -> Self {
        let (mean, covariance) = kalman_filter.initiate(detection.bbox.to_measurement());
        let state = if min_hits <= 1 {
            TrackState::Confirmed
        } else {
            TrackState::Tentative
        };
        Self {
            track_id,
            state,
            confidence: detection.confidence,
            age: 0,
            hits: 1,
            misses: 0,
            last_box: detection.bbox,
            start_frame: frame_id,
            frame_id,
            trail: VecDeque::from([detection.bbox.center()]),
            mean,
            covariance,
        }
    }

    /// Box implied by the current motion estimate.
    pub fn rect(&self) -> Rect {
        Rect::from_xyah(
            self.mean[0] as f32,
            self.mean[1] as f32,
            self.mean[2] as f32,
            self.mean[3] as f32,
        )
    }

    /// Centers of the last associated detections, oldest first.
    pub fn trail(&self) -> impl Iterator<Item = (f32, f32)> + '_ {
        self.trail.iter().copied()
    }

    pub fn is_confirmed(&self) -> bool {
        self.state == TrackState::Confirmed
    }

    /// Advance the motion model one frame.
    pub fn predict(&mut self, kalman_filter: &KalmanFilter) {
        let mut mean = self.mean.clone();
        if self.misses > 0 {
            // A coasting track should not keep growing.
            mean[7] = 0.0;
        }
        let (mean, covariance) = kalman_filter.predict(&mean, &self.covariance);
        self.mean = mean;
        self.covariance = covariance;
        self.age += 1;
    }

    /// Associate a detection with this track.
    pub fn update(&mut self, detection: &Detection, kalman_filter: &KalmanFilter, frame_id: u64, min_hits: u32) {
        match kalman_filter.update(&self.mean, &self.covariance, detection.bbox.to_measurement()) {
            Some((mean, covariance)) => {
                self.mean = mean;
                self.covariance = covariance;
            }
            None => {
                log::debug!("track {}: singular innovation, keeping prediction", self.track_id);
            }
        }

        self.hits += 1;
        self.misses = 0;
        self.frame_id = frame_id;
        self.confidence = detection.confidence;
        self.last_box = detection.bbox;
        if self.trail.len() == TRAIL_LEN {
            self.trail.pop_front();
        }
        self.trail.push_back(detection.bbox.center());

        if self.state == TrackState::Tentative && self.hits >= min_hits {
            self.state = TrackState::Confirmed;
        }
    }

    /// Record a frame without association.
    ///
    /// Tentative tracks die on their first miss; confirmed tracks coast until
    /// `max_misses` is exceeded.
    pub fn mark_missed(&mut self, max_misses: u32) {
        self.hits = 0;
        self.misses += 1;
        match self.state {
            TrackState::Tentative => self.state = TrackState::Deleted,
            TrackState::Confirmed if self.misses > max_misses => self.state = TrackState::Deleted,
            _ => {}
        }
    }

    pub fn snapshot(&self) -> TrackSnapshot {
        TrackSnapshot {
            track_id: self.track_id,
            state: self.state,
            bbox: self.rect(),
            confidence: self.confidence,
            age: self.age,
            hits: self.hits,
            misses: self.misses,
            trail: self.trail().collect(),
        }
    }
}

/// Read-only view of a track handed outside the tracker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackSnapshot {
    pub track_id: TrackId,
    pub state: TrackState,
    pub bbox: Rect,
    pub confidence: f32,
    pub age: u32,
    pub hits: u32,
    pub misses: u32,
    /// Recent detection centers, oldest first, at most `TRAIL_LEN`.
    pub trail: Vec<(f32, f32)>,
}
