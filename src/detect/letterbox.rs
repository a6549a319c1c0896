//! Aspect-preserving resize into the model input tensor, and the inverse box mapping.

use image::RgbImage;
use image::imageops::{self, FilterType};
use ndarray::Array4;

use crate::error::InferenceError;
use crate::tracker::Rect;

/// Gray used by YOLO exports for padding.
const PAD_VALUE: f32 = 114.0 / 255.0;

/// Geometry of one letterbox transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub src_width: u32,
    pub src_height: u32,
    pub dst_width: u32,
    pub dst_height: u32,
}

impl Letterbox {
    /// Fit `src` into `dst` without distortion, centering the padding.
    ///
    /// Pads are whole pixels so the tensor placement and `to_source` share one offset.
    pub fn fit(src_width: u32, src_height: u32, dst_width: u32, dst_height: u32) -> Self {
        let scale = (dst_width as f32 / src_width as f32).min(dst_height as f32 / src_height as f32);
        let (new_w, new_h) = Self::scaled_size(src_width, src_height, scale);
        Self {
            scale,
            pad_x: (dst_width.saturating_sub(new_w) / 2) as f32,
            pad_y: (dst_height.saturating_sub(new_h) / 2) as f32,
            src_width,
            src_height,
            dst_width,
            dst_height,
        }
    }

    fn scaled_size(src_width: u32, src_height: u32, scale: f32) -> (u32, u32) {
        let w = ((src_width as f32 * scale).round() as u32).max(1);
        let h = ((src_height as f32 * scale).round() as u32).max(1);
        (w, h)
    }

    /// Map a box in model input pixels back to the normalized source frame.
    pub fn to_source(&self, rect: &Rect) -> Rect {
        let [x1, y1, x2, y2] = rect.to_tlbr();
        let unmap_x = |x: f32| (x - self.pad_x) / self.scale;
        let unmap_y = |y: f32| (y - self.pad_y) / self.scale;
        Rect::from_tlbr(unmap_x(x1), unmap_y(y1), unmap_x(x2), unmap_y(y2))
            .normalized(self.src_width as f32, self.src_height as f32)
            .clamp_unit()
    }
}

/// Letterbox `image` into an NCHW `[1, 3, dst_height, dst_width]` tensor scaled to `[0, 1]`.
pub fn letterbox(image: &RgbImage, dst_width: u32, dst_height: u32) -> Result<(Array4<f32>, Letterbox), InferenceError> {
    let (src_width, src_height) = image.dimensions();
    if src_width == 0 || src_height == 0 {
        return Err(InferenceError::Preprocess(format!(
            "empty frame {src_width}x{src_height}"
        )));
    }
    if dst_width == 0 || dst_height == 0 {
        return Err(InferenceError::Preprocess(format!(
            "invalid model input {dst_width}x{dst_height}"
        )));
    }

    let geometry = Letterbox::fit(src_width, src_height, dst_width, dst_height);
    let (new_w, new_h) = Letterbox::scaled_size(src_width, src_height, geometry.scale);
    let resized = if (new_w, new_h) == (src_width, src_height) {
        image.clone()
    } else {
        imageops::resize(image, new_w, new_h, FilterType::Triangle)
    };

    let mut tensor = Array4::from_elem((1, 3, dst_height as usize, dst_width as usize), PAD_VALUE);
    let off_x = geometry.pad_x as usize;
    let off_y = geometry.pad_y as usize;
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (tx, ty) = (off_x + x as usize, off_y + y as usize);
        for channel in 0..3 {
            tensor[[0, channel, ty, tx]] = f32::from(pixel.0[channel]) / 255.0;
        }
    }

    Ok((tensor, geometry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_fit_pads_short_side() {
        let lb = Letterbox::fit(1280, 720, 640, 640);
        assert!((lb.scale - 0.5).abs() < 1e-6);
        assert_eq!(lb.pad_x, 0.0);
        assert_eq!(lb.pad_y, 140.0);
    }

    #[test]
    fn test_to_source_inverts_mapping() {
        let lb = Letterbox::fit(1280, 720, 640, 640);
        // A box covering source pixels (320, 180)-(640, 540)
        let in_model = Rect::from_tlbr(160.0, 230.0, 320.0, 410.0);
        let src = lb.to_source(&in_model);
        assert!((src.x - 0.25).abs() < 1e-5);
        assert!((src.y - 0.25).abs() < 1e-5);
        assert!((src.width - 0.25).abs() < 1e-5);
        assert!((src.height - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_letterbox_tensor_layout() {
        let image = RgbImage::from_pixel(40, 20, Rgb([255, 0, 0]));
        let (tensor, lb) = letterbox(&image, 32, 32).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 32, 32]);
        assert_eq!(lb.pad_y, 8.0);
        // Padding rows keep the pad value, content rows carry the image.
        assert!((tensor[[0, 0, 0, 0]] - PAD_VALUE).abs() < 1e-6);
        assert!((tensor[[0, 0, 16, 16]] - 1.0).abs() < 0.01);
        assert!(tensor[[0, 1, 16, 16]].abs() < 0.01);
    }

    #[test]
    fn test_odd_padding_uses_one_offset() {
        // 100x61 into 64x64 scales to 64x39, leaving 25 rows of padding.
        let image = RgbImage::from_pixel(100, 61, Rgb([255, 255, 255]));
        let (tensor, lb) = letterbox(&image, 64, 64).unwrap();
        assert_eq!(lb.pad_y, 12.0);
        assert!((tensor[[0, 0, 11, 32]] - PAD_VALUE).abs() < 1e-6);
        assert!((tensor[[0, 0, 12, 32]] - 1.0).abs() < 0.01);
        assert!((tensor[[0, 0, 50, 32]] - 1.0).abs() < 0.01);
        assert!((tensor[[0, 0, 51, 32]] - PAD_VALUE).abs() < 1e-6);

        // The first content row maps back to the top of the source frame.
        let src = lb.to_source(&Rect::from_tlbr(0.0, 12.0, 64.0, 51.0));
        assert!(src.y.abs() < 1e-5);
        assert!((src.height - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_empty_frame_rejected() {
        let image = RgbImage::new(0, 0);
        assert!(letterbox(&image, 32, 32).is_err());
    }
}
