use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_antialiased_line_segment_mut;
use imageproc::pixelops::interpolate;
use nalgebra::Point2;

/// How far outside the raster a segment may reach before it is clipped, in pixels.
const CLIP_MARGIN: f64 = 4.;

///
/// An isolated, transparent drawing context. Every render creates its own canvas, so nothing
/// drawn for one set of view parameters can leak into another.
///
/// # Fields:
/// - `buffer`: The RGBA raster, fully transparent until drawn on
///
pub struct RenderCanvas {
    pub buffer: RgbaImage,
}

impl RenderCanvas {
    ///
    /// Creates a new, fully transparent canvas.
    ///
    /// # Parameters:
    /// - `width`: The width of the canvas in pixels
    /// - `height`: The height of the canvas in pixels
    ///
    /// # Returns:
    /// - A new `RenderCanvas` instance
    ///
    pub fn new(width: u32, height: u32) -> RenderCanvas {
        RenderCanvas { buffer: RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0])) }
    }

    ///
    /// Draws an antialiased line between two pixel positions. Segments are clipped to the canvas
    /// first; segments with non-finite endpoints are skipped.
    ///
    /// # Parameters:
    /// - `from`: The first point on the line
    /// - `to`: The second point on the line
    /// - `color`: The line colour
    ///
    pub fn line(&mut self, from: Point2<f64>, to: Point2<f64>, color: Rgba<u8>) {
        let bounds = (
            -CLIP_MARGIN,
            -CLIP_MARGIN,
            self.buffer.width() as f64 + CLIP_MARGIN,
            self.buffer.height() as f64 + CLIP_MARGIN,
        );

        let Some((start, end)) = clip_segment(from, to, bounds) else {
            return;
        };

        draw_antialiased_line_segment_mut(
            &mut self.buffer,
            floor_coordinates(start),
            floor_coordinates(end),
            color, interpolate
        );
    }

    pub fn into_image(self) -> RgbaImage {
        self.buffer
    }
}

fn floor_coordinates(point: Point2<f64>) -> (i32, i32) {
    (point.x.floor() as i32, point.y.floor() as i32)
}

///
/// Clips a segment to an axis-aligned rectangle (Liang-Barsky).
///
/// # Parameters:
/// - `from`, `to`: The segment endpoints
/// - `bounds`: The rectangle as (min x, min y, max x, max y)
///
/// # Returns:
/// - The clipped endpoints, or `None` if the segment misses the rectangle
///
pub fn clip_segment(from: Point2<f64>, to: Point2<f64>, bounds: (f64, f64, f64, f64)) -> Option<(Point2<f64>, Point2<f64>)> {
    if !(from.x.is_finite() && from.y.is_finite() && to.x.is_finite() && to.y.is_finite()) {
        return None;
    }

    let (min_x, min_y, max_x, max_y) = bounds;
    let dx = to.x - from.x;
    let dy = to.y - from.y;

    let mut t0: f64 = 0.;
    let mut t1: f64 = 1.;

    let edges = [
        (-dx, from.x - min_x),
        (dx, max_x - from.x),
        (-dy, from.y - min_y),
        (dy, max_y - from.y),
    ];

    for (p, q) in edges {
        if p == 0. {
            if q < 0. {
                return None;
            }
            continue;
        }

        let r = q / p;
        if p < 0. {
            t0 = t0.max(r);
        } else {
            t1 = t1.min(r);
        }

        if t0 > t1 {
            return None;
        }
    }

    Some((
        Point2::new(from.x + t0 * dx, from.y + t0 * dy),
        Point2::new(from.x + t1 * dx, from.y + t1 * dy),
    ))
}
