//!
//! Scene rendering: rasterising a partial toolpath, or the reference arrow, into a transparent
//! frame aligned with the projector
//!

use image::{Rgba, RgbaImage};
use nalgebra::{Point2, Point3, Vector3};

use crate::hardware::BedVolume;
use crate::projection::{ProjectionContext, Projector, ViewParameters, Viewport};
use error::RenderError;

pub mod canvas;
pub mod error;
pub mod toolpath;

/// Fraction of the ROI width/height added on each side.
const ROI_PADDING: f64 = 0.05;

///
/// A straight extruding move between two physical points.
///
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start: Point3<f64>,
    pub end: Point3<f64>,
}

///
/// An axis-aligned bounding box in physical coordinates.
///
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl Bounds {
    ///
    /// # Returns:
    /// - The smallest box holding every point, or `None` if there are no points
    ///
    pub fn enclosing<I: IntoIterator<Item = Point3<f64>>>(points: I) -> Option<Bounds> {
        let mut points = points.into_iter();
        let first = points.next()?;

        Some(points.fold(Bounds { min: first, max: first }, |bounds, p| Bounds {
            min: bounds.min.inf(&p),
            max: bounds.max.sup(&p),
        }))
    }
}

///
/// The contract a toolpath provider must fulfil to be rendered.
///
/// # Functions:
/// - `layer_count`: The number of printed layers
/// - `bounds`: The extent of all printed geometry
/// - `layer_segments`: The extruding moves of every layer in `[min_layer, max_layer]`, inclusive.
///   Indices past the last layer are ignored.
///
pub trait GeometrySource {
    fn layer_count(&self) -> usize;
    fn bounds(&self) -> Bounds;
    fn layer_segments(&self, min_layer: usize, max_layer: usize) -> Vec<Segment>;
}

///
/// A rectangle in pixel coordinates, as (left, top) inclusive to (right, bottom) exclusive.
///
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Roi {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Roi {
    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    ///
    /// Rounds the rectangle outwards to whole pixels and clips it to an image.
    ///
    /// # Returns:
    /// - (x, y, width, height) suitable for cropping, or `None` if nothing is left
    ///
    pub fn to_pixel_rect(&self, image_width: u32, image_height: u32) -> Option<(u32, u32, u32, u32)> {
        let left = self.left.floor().clamp(0., image_width as f64);
        let top = self.top.floor().clamp(0., image_height as f64);
        let right = self.right.ceil().clamp(0., image_width as f64);
        let bottom = self.bottom.ceil().clamp(0., image_height as f64);

        if right <= left || bottom <= top {
            return None;
        }

        Some((left as u32, top as u32, (right - left) as u32, (bottom - top) as u32))
    }
}

///
/// A rendered raster with the geometry needed to place it over a photo. The anchor and ROI are
/// only valid for the view parameters the frame was rendered with.
///
/// # Fields:
/// - `image`: The transparent-background render
/// - `anchor`: The projected bed centre, in render pixels
/// - `roi`: The padded bounding box of non-transparent pixels, or `None` for an empty render
///
#[derive(Debug, Clone)]
pub struct RenderFrame {
    pub image: RgbaImage,
    pub anchor: Point2<f64>,
    pub roi: Option<Roi>,
}

///
/// Resolves a requested layer into the last layer index to draw. `-1`, any other negative
/// value, and anything past the last layer all mean "render everything".
///
/// # Parameters:
/// - `layer`: The requested layer
/// - `layer_count`: The number of layers in the toolpath
///
/// # Returns:
/// - The inclusive upper layer index, or `None` if the toolpath has no layers
///
pub fn resolve_layer(layer: i64, layer_count: usize) -> Option<usize> {
    let last = layer_count.checked_sub(1)?;

    if layer < 0 || layer as u64 > last as u64 {
        Some(last)
    } else {
        Some(layer as usize)
    }
}

///
/// Parses a `#rrggbb` (or `rrggbb`) colour into an opaque pixel.
///
pub fn parse_hex_color(hex: &str) -> Result<Rgba<u8>, RenderError> {
    let digits = hex.trim().trim_start_matches('#');
    if digits.len() != 6 || !digits.is_ascii() {
        return Err(RenderError::InvalidColor(hex.to_owned()));
    }

    let channel = |idx: usize| u8::from_str_radix(&digits[idx..idx + 2], 16).map_err(|_| RenderError::InvalidColor(hex.to_owned()));

    Ok(Rgba([channel(0)?, channel(2)?, channel(4)?, 255]))
}

///
/// Renders the toolpath up to and including a layer, as seen under the given view.
///
/// # Parameters:
/// - `source`: The toolpath to draw
/// - `layer`: The last layer to draw; `-1` draws every layer
/// - `view`: The camera parameters
/// - `bed`: The printable volume, used for the axis limits and box aspect
/// - `viewport`: The raster size
/// - `color`: The line colour
///
/// # Returns:
/// - A `RenderFrame` with the projected bed centre as anchor
///
pub fn render_toolpath<G: GeometrySource + ?Sized>(source: &G, layer: i64, view: &ViewParameters, bed: &BedVolume, viewport: Viewport, color: Rgba<u8>) -> RenderFrame {
    let projector = ProjectionContext::new(bed, viewport).projector(view);
    let mut canvas = canvas::RenderCanvas::new(viewport.width, viewport.height);

    if let Some(last) = resolve_layer(layer, source.layer_count()) {
        for segment in source.layer_segments(0, last) {
            canvas.line(projector.project(&segment.start), projector.project(&segment.end), color);
        }
    }

    finish_frame(canvas, &projector, bed)
}

///
/// Renders the bed outline with an arrow from the bed centre to the origin. It is used while
/// adjusting the view by hand, since the arrow shows which corner the origin is at.
///
/// # Parameters:
/// - `view`: The camera parameters
/// - `bed`: The printable volume
/// - `viewport`: The raster size
///
/// # Returns:
/// - A `RenderFrame` with the projected bed centre as anchor
///
pub fn render_reference(view: &ViewParameters, bed: &BedVolume, viewport: Viewport) -> RenderFrame {
    const OUTLINE: Rgba<u8> = Rgba([0, 0, 255, 255]);
    const ARROW: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const HEAD_RATIO: f64 = 0.2;
    const HEAD_ANGLE_DEG: f64 = 15.;

    let projector = ProjectionContext::new(bed, viewport).projector(view);
    let mut canvas = canvas::RenderCanvas::new(viewport.width, viewport.height);

    let corners = bed.bed_corners();
    for i in 0..corners.len() {
        let next = corners[(i + 1) % corners.len()];
        canvas.line(projector.project(&corners[i]), projector.project(&next), OUTLINE);
    }

    let tail = bed.bed_center();
    let head: Point3<f64> = Point3::origin();
    canvas.line(projector.project(&tail), projector.project(&head), ARROW);

    // two barbs, swung either way within the bed plane
    let back: Vector3<f64> = (tail - head) * HEAD_RATIO;
    let half_angle = HEAD_ANGLE_DEG.to_radians();
    for sign in [-1., 1.] {
        let (sin, cos) = (sign * half_angle).sin_cos();
        let barb = Vector3::new(back.x * cos - back.y * sin, back.x * sin + back.y * cos, back.z);
        canvas.line(projector.project(&head), projector.project(&(head + barb)), ARROW);
    }

    finish_frame(canvas, &projector, bed)
}

fn finish_frame(canvas: canvas::RenderCanvas, projector: &Projector, bed: &BedVolume) -> RenderFrame {
    let image = canvas.into_image();
    let roi = opaque_bounds(&image);
    RenderFrame { image, anchor: projector.project(&bed.bed_center()), roi }
}

///
/// Finds the tight bounding box of non-transparent pixels, padded by 5 % of its size on each
/// side and clipped to the image.
///
/// # Returns:
/// - The padded box, or `None` if every pixel is transparent
///
pub fn opaque_bounds(image: &RgbaImage) -> Option<Roi> {
    let mut extent: Option<(u32, u32, u32, u32)> = None;

    for (x, y, pixel) in image.enumerate_pixels() {
        if pixel[3] == 0 {
            continue;
        }
        extent = Some(match extent {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }

    let (x0, y0, x1, y1) = extent?;
    let width = (x1 + 1 - x0) as f64;
    let height = (y1 + 1 - y0) as f64;

    Some(Roi {
        left: (x0 as f64 - width * ROI_PADDING).max(0.),
        top: (y0 as f64 - height * ROI_PADDING).max(0.),
        right: ((x1 + 1) as f64 + width * ROI_PADDING).min(image.width() as f64),
        bottom: ((y1 + 1) as f64 + height * ROI_PADDING).min(image.height() as f64),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    ///
    /// A square perimeter per layer, one millimetre apart.
    ///
    struct Stack {
        layers: usize,
    }

    impl GeometrySource for Stack {
        fn layer_count(&self) -> usize {
            self.layers
        }

        fn bounds(&self) -> Bounds {
            Bounds { min: Point3::new(50., 50., 0.), max: Point3::new(150., 150., self.layers as f64) }
        }

        fn layer_segments(&self, min_layer: usize, max_layer: usize) -> Vec<Segment> {
            let mut segments = vec![];
            for layer in min_layer..=max_layer.min(self.layers - 1) {
                let z = layer as f64;
                let square = [(50., 50.), (150., 50.), (150., 150.), (50., 150.)];
                for i in 0..4 {
                    let (x0, y0) = square[i];
                    let (x1, y1) = square[(i + 1) % 4];
                    segments.push(Segment { start: Point3::new(x0, y0, z), end: Point3::new(x1, y1, z) });
                }
            }
            segments
        }
    }

    fn side_view() -> ViewParameters {
        ViewParameters::new(30., -60., 0., 0.5, 1.)
    }

    #[test]
    fn negative_layer_means_everything() {
        assert_eq!(resolve_layer(-1, 12), Some(11));
        assert_eq!(resolve_layer(40, 12), Some(11));
        assert_eq!(resolve_layer(3, 12), Some(3));
        assert_eq!(resolve_layer(-1, 0), None);
    }

    #[test]
    fn minus_one_renders_the_same_as_last_layer() {
        let source = Stack { layers: 6 };
        let bed = BedVolume::new(200., 200., 200.);
        let color = Rgba([0, 255, 0, 255]);

        let all = render_toolpath(&source, -1, &side_view(), &bed, Viewport::default(), color);
        let last = render_toolpath(&source, 5, &side_view(), &bed, Viewport::default(), color);

        assert_eq!(all.image, last.image);
        assert_eq!(all.anchor, last.anchor);
    }

    #[test]
    fn fewer_layers_draw_less() {
        let source = Stack { layers: 6 };
        let bed = BedVolume::new(200., 200., 200.);
        let color = Rgba([0, 255, 0, 255]);
        let count = |frame: &RenderFrame| frame.image.pixels().filter(|p| p[3] > 0).count();

        let first = render_toolpath(&source, 0, &side_view(), &bed, Viewport::default(), color);
        let all = render_toolpath(&source, -1, &side_view(), &bed, Viewport::default(), color);

        assert!(count(&first) > 0);
        assert!(count(&all) > count(&first));
    }

    #[test]
    fn anchor_is_projected_bed_center() {
        let source = Stack { layers: 1 };
        let bed = BedVolume::new(200., 200., 200.);
        let frame = render_toolpath(&source, -1, &side_view(), &bed, Viewport::default(), Rgba([1, 2, 3, 255]));
        let expected = crate::projection::project(&bed.bed_center(), &side_view(), &bed, Viewport::default());

        assert_eq!(frame.anchor, expected);
    }

    #[test]
    fn roi_pads_opaque_pixels() {
        let mut image = RgbaImage::from_pixel(100, 100, Rgba([0, 0, 0, 0]));
        for x in 20..40 {
            for y in 50..60 {
                image.put_pixel(x, y, Rgba([255, 255, 255, 255]));
            }
        }

        let roi = opaque_bounds(&image).unwrap();
        assert_eq!(roi, Roi { left: 19., top: 49.5, right: 41., bottom: 60.5 });
        assert!(opaque_bounds(&RgbaImage::new(4, 4)).is_none());
    }

    #[test]
    fn roi_is_clipped_to_image() {
        let image = RgbaImage::from_pixel(10, 10, Rgba([9, 9, 9, 255]));
        assert_eq!(opaque_bounds(&image), Some(Roi { left: 0., top: 0., right: 10., bottom: 10. }));
    }

    #[test]
    fn reference_render_draws_something() {
        let bed = BedVolume::default();
        let frame = render_reference(&ViewParameters::default(), &bed, Viewport::default());

        assert!(frame.roi.is_some());
        assert!(frame.image.pixels().any(|p| p[3] > 0 && p[0] > p[2]));
        assert!(frame.image.pixels().any(|p| p[3] > 0 && p[2] > p[0]));
    }

    #[test]
    fn hex_colours() {
        assert_eq!(parse_hex_color("#ff8000").unwrap(), Rgba([255, 128, 0, 255]));
        assert_eq!(parse_hex_color("00ff00").unwrap(), Rgba([0, 255, 0, 255]));
        assert!(parse_hex_color("#ff80").is_err());
        assert!(parse_hex_color("#gg0000").is_err());
    }
}
