//! Cost matrices and optimal assignment between tracks and detections.

use ndarray::Array2;

use crate::detect::Detection;
use crate::tracker::rect::Rect;

/// Weight of the confidence tie-break term. Small enough never to flip a
/// match whose overlap/distance cost is meaningfully different.
const CONFIDENCE_TIE_WEIGHT: f32 = 1e-4;
/// Weight of the centroid-distance tie-break term, below the confidence term.
const DISTANCE_TIE_WEIGHT: f32 = 1e-6;

/// Compute IoU distance matrix between tracks and detections.
pub fn iou_distance(track_boxes: &[Rect], det_boxes: &[Rect]) -> Array2<f32> {
    Array2::from_shape_fn((track_boxes.len(), det_boxes.len()), |(i, j)| {
        1.0 - track_boxes[i].iou(&det_boxes[j])
    })
}

/// Centroid distance matrix scaled by `max_distance` and capped at 1.
pub fn centroid_distance(track_boxes: &[Rect], det_boxes: &[Rect], max_distance: f32) -> Array2<f32> {
    Array2::from_shape_fn((track_boxes.len(), det_boxes.len()), |(i, j)| {
        (track_boxes[i].center_distance(&det_boxes[j]) / max_distance).min(1.0)
    })
}

/// Blend overlap and centroid distance into one association cost.
///
/// `distance_weight` of 0 is pure IoU distance. Equal primary costs are
/// resolved towards higher confidence, then smaller centroid distance.
pub fn association_cost(
    track_boxes: &[Rect],
    detections: &[Detection],
    distance_weight: f32,
    max_distance: f32,
) -> Array2<f32> {
    let det_boxes: Vec<Rect> = detections.iter().map(|d| d.bbox).collect();
    let iou_cost = iou_distance(track_boxes, &det_boxes);
    let dist_cost = centroid_distance(track_boxes, &det_boxes, max_distance);

    let mut cost = &iou_cost * (1.0 - distance_weight) + &dist_cost * distance_weight;
    for ((_, j), value) in cost.indexed_iter_mut() {
        *value += CONFIDENCE_TIE_WEIGHT * (1.0 - detections[j].confidence);
    }
    cost + &dist_cost * DISTANCE_TIE_WEIGHT
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignmentResult {
    pub matches: Vec<(usize, usize)>,
    pub unmatched_tracks: Vec<usize>,
    pub unmatched_detections: Vec<usize>,
}

/// Minimum-cost bipartite matching; pairs costing more than `thresh` are rejected.
pub fn linear_assignment(cost_matrix: &Array2<f32>, thresh: f32) -> AssignmentResult {
    let (num_rows, num_cols) = cost_matrix.dim();

    if num_rows == 0 || num_cols == 0 {
        return AssignmentResult {
            matches: vec![],
            unmatched_tracks: (0..num_rows).collect(),
            unmatched_detections: (0..num_cols).collect(),
        };
    }

    // lapjv needs a square matrix; padding cells are never worth taking.
    let size = num_rows.max(num_cols);
    let mut padded = Array2::<f64>::from_elem((size, size), 1e6);
    for ((i, j), value) in cost_matrix.indexed_iter() {
        padded[[i, j]] = f64::from(*value);
    }

    let mut matches = vec![];
    let mut unmatched_tracks = vec![];
    let mut unmatched_detections_mask = vec![true; num_cols];

    match lapjv::lapjv(&padded) {
        Ok((row_to_col, _)) => {
            for (row_idx, &col_idx) in row_to_col.iter().enumerate().take(num_rows) {
                if col_idx < num_cols && cost_matrix[[row_idx, col_idx]] <= thresh {
                    matches.push((row_idx, col_idx));
                    unmatched_detections_mask[col_idx] = false;
                } else {
                    unmatched_tracks.push(row_idx);
                }
            }
        }
        Err(err) => {
            log::warn!("assignment solver failed, treating every pair as unmatched: {err:?}");
            unmatched_tracks = (0..num_rows).collect();
        }
    }

    let unmatched_detections = unmatched_detections_mask
        .iter()
        .enumerate()
        .filter_map(|(i, &unmatched)| unmatched.then_some(i))
        .collect();

    AssignmentResult {
        matches,
        unmatched_tracks,
        unmatched_detections,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x: f32, y: f32, conf: f32) -> Detection {
        Detection::person(Rect::new(x, y, 0.1, 0.2), conf)
    }

    #[test]
    fn test_assignment_prefers_overlap() {
        let tracks = [Rect::new(0.1, 0.1, 0.1, 0.2), Rect::new(0.6, 0.6, 0.1, 0.2)];
        let dets = [det(0.61, 0.6, 0.9), det(0.11, 0.1, 0.9)];
        let cost = association_cost(&tracks, &dets, 0.3, 0.2);
        let result = linear_assignment(&cost, 0.8);
        assert_eq!(result.matches, vec![(0, 1), (1, 0)]);
        assert!(result.unmatched_tracks.is_empty());
        assert!(result.unmatched_detections.is_empty());
    }

    #[test]
    fn test_tie_break_prefers_confidence() {
        // Two detections mirror each other around the track, so overlap and
        // distance are identical; the more confident one must win.
        let tracks = [Rect::new(0.5, 0.5, 0.1, 0.2)];
        let dets = [det(0.48, 0.5, 0.6), det(0.52, 0.5, 0.9)];
        let cost = association_cost(&tracks, &dets, 0.3, 0.2);
        let result = linear_assignment(&cost, 0.8);
        assert_eq!(result.matches, vec![(0, 1)]);
        assert_eq!(result.unmatched_detections, vec![0]);
    }

    #[test]
    fn test_threshold_rejects_distant_pairs() {
        let tracks = [Rect::new(0.0, 0.0, 0.1, 0.2)];
        let dets = [det(0.8, 0.7, 0.9)];
        let cost = association_cost(&tracks, &dets, 0.3, 0.2);
        let result = linear_assignment(&cost, 0.8);
        assert!(result.matches.is_empty());
        assert_eq!(result.unmatched_tracks, vec![0]);
        assert_eq!(result.unmatched_detections, vec![0]);
    }

    #[test]
    fn test_empty_inputs() {
        let result = linear_assignment(&Array2::zeros((0, 3)), 0.8);
        assert_eq!(result.unmatched_detections, vec![0, 1, 2]);
        let result = linear_assignment(&Array2::zeros((2, 0)), 0.8);
        assert_eq!(result.unmatched_tracks, vec![0, 1]);
    }
}
