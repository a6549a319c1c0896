//! Confidence filtering and greedy IoU suppression.

use crate::detect::Detection;

/// Drop detections under `threshold` and any non-finite confidence.
pub fn filter_confidence(detections: &mut Vec<Detection>, threshold: f32) {
    detections.retain(|d| d.confidence.is_finite() && d.confidence >= threshold);
}

/// Greedy per-class non-maximum suppression.
///
/// Keeps the highest-confidence box and discards every later box of the same
/// class whose IoU with a kept box exceeds `iou_threshold`. Output is sorted
/// by descending confidence; equal confidences keep their input order.
pub fn non_max_suppression(detections: &mut Vec<Detection>, iou_threshold: f32) {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept = 0;
    for index in 0..detections.len() {
        let candidate = detections[index];
        let suppressed = detections[..kept].iter().any(|prev| {
            prev.class_id == candidate.class_id && prev.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !suppressed {
            detections.swap(kept, index);
            kept += 1;
        }
    }
    detections.truncate(kept);
}
