use serde::{Deserialize, Serialize};

/// Axis-aligned box stored as top-left corner plus size.
///
/// The pipeline keeps boxes normalized to `[0, 1]` relative to the source
/// frame, so the same geometry holds across camera resolutions. Conversions:
/// - TLWH: top-left x, top-left y, width, height
/// - TLBR: top-left x, top-left y, bottom-right x, bottom-right y
/// - XYAH: center x, center y, aspect ratio (w/h), height (Kalman measurement)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    #[inline]
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[inline]
    pub fn from_tlbr(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
        }
    }

    #[inline]
    pub fn from_xyah(cx: f32, cy: f32, aspect_ratio: f32, height: f32) -> Self {
        let width = aspect_ratio * height;
        Self {
            x: cx - width / 2.0,
            y: cy - height / 2.0,
            width,
            height,
        }
    }

    /// Build from center coordinates and size, the layout YOLO heads emit.
    #[inline]
    pub fn from_cxcywh(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self::new(cx - width / 2.0, cy - height / 2.0, width, height)
    }

    #[inline]
    pub fn to_tlbr(&self) -> [f32; 4] {
        [self.x, self.y, self.x + self.width, self.y + self.height]
    }

    #[inline]
    pub fn to_xyah(&self) -> [f32; 4] {
        let (cx, cy) = self.center();
        let aspect_ratio = if self.height > 0.0 {
            self.width / self.height
        } else {
            0.0
        };
        [cx, cy, aspect_ratio, self.height]
    }

    /// XYAH widened to `f64` for the Kalman filter.
    #[inline]
    pub fn to_measurement(&self) -> [f64; 4] {
        self.to_xyah().map(f64::from)
    }

    #[inline]
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    #[inline]
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Euclidean distance between the two box centers.
    pub fn center_distance(&self, other: &Rect) -> f32 {
        let (ax, ay) = self.center();
        let (bx, by) = other.center();
        ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
    }

    pub fn iou(&self, other: &Rect) -> f32 {
        let [ax1, ay1, ax2, ay2] = self.to_tlbr();
        let [bx1, by1, bx2, by2] = other.to_tlbr();

        let inter_width = (ax2.min(bx2) - ax1.max(bx1)).max(0.0);
        let inter_height = (ay2.min(by2) - ay1.max(by1)).max(0.0);
        let inter_area = inter_width * inter_height;

        let union_area = self.area() + other.area() - inter_area;
        if union_area > 0.0 {
            inter_area / union_area
        } else {
            0.0
        }
    }

    /// Smallest box containing both `self` and `other`.
    pub fn union(&self, other: &Rect) -> Rect {
        let [ax1, ay1, ax2, ay2] = self.to_tlbr();
        let [bx1, by1, bx2, by2] = other.to_tlbr();
        Rect::from_tlbr(ax1.min(bx1), ay1.min(by1), ax2.max(bx2), ay2.max(by2))
    }

    /// Clip to the `[0, 1]` unit square.
    pub fn clamp_unit(&self) -> Rect {
        let [x1, y1, x2, y2] = self.to_tlbr();
        Rect::from_tlbr(
            x1.clamp(0.0, 1.0),
            y1.clamp(0.0, 1.0),
            x2.clamp(0.0, 1.0),
            y2.clamp(0.0, 1.0),
        )
    }

    /// Divide coordinates by the frame size, mapping pixels to `[0, 1]`.
    pub fn normalized(&self, frame_width: f32, frame_height: f32) -> Rect {
        Rect::new(
            self.x / frame_width,
            self.y / frame_height,
            self.width / frame_width,
            self.height / frame_height,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_conversions() {
        let rect = Rect::new(10.0, 20.0, 30.0, 40.0);
        assert_eq!(rect.to_tlbr(), [10.0, 20.0, 40.0, 60.0]);

        let xyah = rect.to_xyah();
        assert_eq!(xyah[0], 25.0);
        assert_eq!(xyah[1], 40.0);
        assert!((xyah[2] - 0.75).abs() < 1e-6);
        assert_eq!(xyah[3], 40.0);
    }

    #[test]
    fn test_from_xyah_inverts_to_xyah() {
        let rect = Rect::from_xyah(25.0, 40.0, 0.75, 40.0);
        assert!((rect.x - 10.0).abs() < 1e-6);
        assert!((rect.y - 20.0).abs() < 1e-6);
        assert!((rect.width - 30.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_partial_overlap() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(5.0, 5.0, 10.0, 10.0);
        // 25 / (100 + 100 - 25)
        assert!((a.iou(&b) - 25.0 / 175.0).abs() < 1e-6);
        assert_eq!(a.iou(&Rect::new(20.0, 20.0, 10.0, 10.0)), 0.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_union_and_clamp() {
        let a = Rect::from_tlbr(-0.1, 0.2, 0.3, 0.4);
        let b = Rect::from_tlbr(0.5, 0.1, 1.2, 0.3);
        let u = a.union(&b).clamp_unit();
        assert_eq!(u.to_tlbr(), [0.0, 0.1, 1.0, 0.4]);
    }

    #[test]
    fn test_normalized() {
        let r = Rect::new(64.0, 48.0, 32.0, 96.0).normalized(640.0, 480.0);
        assert!((r.x - 0.1).abs() < 1e-6);
        assert!((r.height - 0.2).abs() < 1e-6);
    }
}
