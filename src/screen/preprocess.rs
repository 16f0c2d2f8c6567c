use image::{imageops, GrayImage, Luma, RgbaImage};

use super::layout::RelativeRect;

const GLYPH: Luma<u8> = Luma([0]);
const BACKGROUND: Luma<u8> = Luma([255]);

/// Binarizes a readout crop.
///
/// The launch monitor draws light digits on a dark panel. A pixel bright in
/// all three channels becomes a black glyph pixel, everything else white
/// background.
pub fn threshold_bright_pixels(img: &RgbaImage, threshold: u8) -> GrayImage {
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let [r, g, b, _] = img.get_pixel(x, y).0;
        if r.min(g).min(b) > threshold {
            GLYPH
        } else {
            BACKGROUND
        }
    })
}

/// Pixel bounds `(x, y, width, height)` of `rect` inside a `width` x `height`
/// frame, clamped to the frame.
pub fn pixel_bounds(rect: &RelativeRect, width: u32, height: u32) -> (u32, u32, u32, u32) {
    let scale = |fraction: f32, extent: u32| ((fraction * extent as f32) as u32).min(extent);
    let x = scale(rect.x, width);
    let y = scale(rect.y, height);
    (
        x,
        y,
        scale(rect.width, width).min(width - x),
        scale(rect.height, height).min(height - y),
    )
}

pub fn crop_region(img: &RgbaImage, rect: &RelativeRect) -> RgbaImage {
    let (x, y, w, h) = pixel_bounds(rect, img.width(), img.height());
    imageops::crop_imm(img, x, y, w, h).to_image()
}

/// Crop handed to the recognizer: binarized with a threshold, plain
/// grayscale without.
pub fn prepare_region(img: &RgbaImage, rect: &RelativeRect, threshold: Option<u8>) -> GrayImage {
    let cropped = crop_region(img, rect);
    match threshold {
        Some(threshold) => threshold_bright_pixels(&cropped, threshold),
        None => imageops::grayscale(&cropped),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn rect(x: f32, y: f32, width: f32, height: f32) -> RelativeRect {
        RelativeRect {
            x,
            y,
            width,
            height,
        }
    }

    #[test]
    fn test_pixel_bounds_of_carry_field() {
        // 1280x720 rectified screen, carry readout in the lower right
        let bounds = pixel_bounds(&rect(0.75, 0.5, 0.2, 0.1), 1280, 720);
        assert_eq!(bounds, (960, 360, 256, 72));
    }

    #[test]
    fn test_crop_is_clamped_to_frame() {
        let frame = RgbaImage::from_fn(40, 20, |x, y| Rgba([x as u8, y as u8, 0, 255]));
        let cropped = crop_region(&frame, &rect(0.8, 0.5, 0.5, 0.9));

        assert_eq!(cropped.dimensions(), (8, 10));
        assert_eq!(cropped.get_pixel(0, 0).0, [32, 10, 0, 255]);
    }

    #[test]
    fn test_bright_digits_become_black_glyphs() {
        let mut panel = RgbaImage::from_pixel(3, 1, Rgba([30, 30, 40, 255]));
        panel.put_pixel(1, 0, Rgba([240, 245, 250, 255]));
        panel.put_pixel(2, 0, Rgba([240, 245, 90, 255]));

        let binary = threshold_bright_pixels(&panel, 160);
        assert_eq!(binary.get_pixel(0, 0), &BACKGROUND);
        assert_eq!(binary.get_pixel(1, 0), &GLYPH);
        assert_eq!(binary.get_pixel(2, 0), &BACKGROUND);
    }

    #[test]
    fn test_unthresholded_crop_keeps_gray_levels() {
        let frame = RgbaImage::from_pixel(10, 10, Rgba([120, 120, 120, 255]));
        let prepared = prepare_region(&frame, &rect(0.0, 0.0, 0.3, 1.0), None);

        assert_eq!(prepared.dimensions(), (3, 10));
        assert_eq!(prepared.get_pixel(2, 9)[0], 120);
    }
}
