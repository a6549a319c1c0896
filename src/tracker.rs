mod crowd_tracker;
mod kalman_filter;
mod matching;
mod rect;
mod track;
mod track_state;

pub use crowd_tracker::{CrowdTracker, TrackerConfig};
pub use kalman_filter::KalmanFilter;
pub use matching::{AssignmentResult, association_cost, iou_distance, linear_assignment};
pub use rect::Rect;
pub use track::{TRAIL_LEN, Track, TrackId, TrackSnapshot};
pub use track_state::TrackState;
