//! Draws two grayscale images side by side with lines between matched keypoints.

use image::{GrayImage, Luma, Rgba, RgbaImage};
use imageproc::{drawing, pixelops};
use itertools::Itertools;
use palette::{FromColor, Hsv, RgbHue, Srgb};

const KEYPOINT_COLOR: Rgba<u8> = Rgba([0, 255, 255, 255]);

/// A keypoint to mark on the canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mark {
    pub point: (f32, f32),
    /// Diameter in pixels.
    pub size: f32,
}

/// Renders `b` to the right of `a` and connects `a_marks[i]` with `b_marks[j]`
/// for every `(i, j)` in `matches`.
///
/// Every mark gets a circle of its size. Lines rotate through the hue wheel so
/// that neighbouring matches can be told apart. Matches pointing outside of
/// the marks are skipped.
pub fn render_matches(
    a: &GrayImage,
    a_marks: &[Mark],
    b: &GrayImage,
    b_marks: &[Mark],
    matches: &[(usize, usize)],
) -> RgbaImage {
    let (a_width, a_height) = a.dimensions();
    let (b_width, b_height) = b.dimensions();
    let mut canvas = RgbaImage::from_pixel(
        a_width + b_width,
        std::cmp::max(a_height, b_height),
        Rgba([0, 0, 0, 255]),
    );

    let mut render_image_onto_canvas_x_offset = |image: &GrayImage, x_offset: u32| {
        let (width, height) = image.dimensions();
        for (x, y) in (0..width).cartesian_product(0..height) {
            let Luma([value]) = *image.get_pixel(x, y);
            canvas.put_pixel(x + x_offset, y, Rgba([value, value, value, 255]));
        }
    };
    render_image_onto_canvas_x_offset(a, 0);
    render_image_onto_canvas_x_offset(b, a_width);

    let to_canvas = |mark: &Mark, x_offset: u32| {
        (
            mark.point.0 as i32 + x_offset as i32,
            mark.point.1 as i32,
        )
    };

    for (marks, x_offset) in [(a_marks, 0), (b_marks, a_width)] {
        for mark in marks {
            let radius = std::cmp::max((mark.size / 2.0).round() as i32, 1);
            drawing::draw_hollow_circle_mut(
                &mut canvas,
                to_canvas(mark, x_offset),
                radius,
                KEYPOINT_COLOR,
            );
        }
    }

    for (ix, &(a_ix, b_ix)) in matches.iter().enumerate() {
        if let (Some(a_mark), Some(b_mark)) = (a_marks.get(a_ix), b_marks.get(b_ix)) {
            let hsv = Hsv::new(RgbHue::from_radians(ix as f64 * 0.1), 1.0, 1.0);
            let rgb = Srgb::from_color(hsv);
            drawing::draw_antialiased_line_segment_mut(
                &mut canvas,
                to_canvas(a_mark, 0),
                to_canvas(b_mark, a_width),
                Rgba([
                    (rgb.red * 255.0) as u8,
                    (rgb.green * 255.0) as u8,
                    (rgb.blue * 255.0) as u8,
                    255,
                ]),
                pixelops::interpolate,
            );
        }
    }

    canvas
}
