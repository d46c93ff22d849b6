//!
//! Perspective projection of physical printer coordinates into image pixels
//!

use nalgebra::{Matrix4, Point2, Point3, Vector3, Vector4};
use serde::{Serialize, Deserialize};

use crate::hardware::BedVolume;

pub mod math;

/// Lower and upper bounds of each view parameter, in the order
/// (elevation, azimuth, roll, focal length, scale).
pub const VIEW_BOUNDS: [(f64, f64); 5] = [
    (-360., 360.),
    (-360., 360.),
    (-179., 179.),
    (0.075, 1.),
    (0.1, 5.),
];

///
/// The virtual camera parameters. Every construction path clamps each field into
/// `VIEW_BOUNDS`.
///
/// # Fields:
/// - `elevation`: Camera elevation above the bed plane, in degrees
/// - `azimuth`: Camera rotation about the vertical axis, in degrees
/// - `roll`: Camera rotation about its view axis, in degrees
/// - `focal_length`: Perspective factor; 1 is a 90° field of view and smaller values widen it
/// - `scale`: Uniform zoom applied when the render is composited
///
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ViewParameters {
    pub elevation: f64,
    pub azimuth: f64,
    pub roll: f64,
    pub focal_length: f64,
    pub scale: f64,
}

impl ViewParameters {
    pub fn new(elevation: f64, azimuth: f64, roll: f64, focal_length: f64, scale: f64) -> ViewParameters {
        ViewParameters { elevation, azimuth, roll, focal_length, scale }.clamped()
    }

    ///
    /// Builds view parameters from a flat array, clipping every value into bounds.
    ///
    pub fn from_array(values: [f64; 5]) -> ViewParameters {
        ViewParameters::new(values[0], values[1], values[2], values[3], values[4])
    }

    pub fn to_array(&self) -> [f64; 5] {
        [self.elevation, self.azimuth, self.roll, self.focal_length, self.scale]
    }

    ///
    /// # Returns:
    /// - A copy with every field clipped into `VIEW_BOUNDS`. NaN falls back to the lower bound.
    ///
    pub fn clamped(&self) -> ViewParameters {
        let mut values = self.to_array();
        for (value, (lo, hi)) in values.iter_mut().zip(VIEW_BOUNDS.iter()) {
            *value = if value.is_nan() { *lo } else { value.clamp(*lo, *hi) };
        }

        ViewParameters {
            elevation: values[0],
            azimuth: values[1],
            roll: values[2],
            focal_length: values[3],
            scale: values[4],
        }
    }

    ///
    /// Applies a manual offset to each field, as the user nudges the overlay into place.
    ///
    /// # Parameters:
    /// - `delta`: Offsets in the same order as `to_array`
    ///
    /// # Returns:
    /// - The offset parameters, clipped into bounds
    ///
    pub fn offset(&self, delta: [f64; 5]) -> ViewParameters {
        let mut values = self.to_array();
        for (value, d) in values.iter_mut().zip(delta) {
            *value += d;
        }
        ViewParameters::from_array(values)
    }
}

impl Default for ViewParameters {
    /// The calibration starting point: a top-down view at full focal length and unit scale.
    fn default() -> Self {
        ViewParameters { elevation: 90., azimuth: -90., roll: 0., focal_length: 1., scale: 1. }
    }
}

///
/// The pixel size of a render, and the square axes box inside it that the projected scene is
/// mapped onto. The box is the subplot area shrunk to a square and centred.
///
/// # Fields:
/// - `width`: Raster width in pixels
/// - `height`: Raster height in pixels
///
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Subplot area as fractions of the figure: left, right, bottom, top.
const SUBPLOT_AREA: (f64, f64, f64, f64) = (0.125, 0.9, 0.11, 0.88);

/// The 2D data window the projected coordinates are shown through, for an eye distance of 10.
const DATA_X_LIMITS: (f64, f64) = (-0.095, 0.09);
const DATA_Y_LIMITS: (f64, f64) = (-0.095, 0.09);

impl Viewport {
    pub fn new(width: u32, height: u32) -> Viewport {
        Viewport { width: width.max(1), height: height.max(1) }
    }

    ///
    /// # Returns:
    /// - The axes box as (x0, y0, width, height) in display pixels, with y growing upwards
    ///
    pub fn axes_box(&self) -> (f64, f64, f64, f64) {
        let (left, right, bottom, top) = SUBPLOT_AREA;
        let fig_w = self.width as f64;
        let fig_h = self.height as f64;

        let area_w = (right - left) * fig_w;
        let area_h = (top - bottom) * fig_h;
        let side = area_w.min(area_h);

        let x0 = left * fig_w + (area_w - side) / 2.;
        let y0 = bottom * fig_h + (area_h - side) / 2.;

        (x0, y0, side, side)
    }

    ///
    /// Maps projected device coordinates onto image pixels, flipping the vertical axis so that
    /// (0, 0) is the top-left pixel.
    ///
    pub fn to_pixel(&self, device_x: f64, device_y: f64) -> Point2<f64> {
        let (x0, y0, w, h) = self.axes_box();
        let display_x = x0 + (device_x - DATA_X_LIMITS.0) / (DATA_X_LIMITS.1 - DATA_X_LIMITS.0) * w;
        let display_y = y0 + (device_y - DATA_Y_LIMITS.0) / (DATA_Y_LIMITS.1 - DATA_Y_LIMITS.0) * h;

        Point2::new(display_x, self.height as f64 - display_y)
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Viewport::new(640, 480)
    }
}

///
/// The parts of a projection that stay fixed while only the camera moves: the world transform
/// normalising the bed volume into its box aspect, and the viewport. The calibration optimizer
/// builds one of these and reuses it for every error evaluation.
///
#[derive(Debug, Clone)]
pub struct ProjectionContext {
    world: Matrix4<f64>,
    box_aspect: Vector3<f64>,
    viewport: Viewport,
}

impl ProjectionContext {
    ///
    /// Creates a projection context with axis limits equal to the bed volume, and a box aspect
    /// proportional to its dimensions so the bed isn't distorted.
    ///
    /// # Parameters:
    /// - `bed`: The printable volume
    /// - `viewport`: The raster the scene is projected onto
    ///
    pub fn new(bed: &BedVolume, viewport: Viewport) -> ProjectionContext {
        let box_aspect = math::box_aspect(bed.dims());
        let world = math::world_transformation([(0., *bed.length()), (0., *bed.width()), (0., *bed.depth())], &box_aspect);

        ProjectionContext { world, box_aspect, viewport }
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    ///
    /// Builds a projector for one set of view parameters.
    ///
    pub fn projector(&self, view: &ViewParameters) -> Projector {
        let view = view.clamped();
        let camera = math::camera_transformation(&self.box_aspect, view.elevation, view.azimuth, view.roll, view.focal_length);

        Projector { matrix: camera * self.world, viewport: self.viewport }
    }
}

///
/// A fully composed projection for one bed, viewport and set of view parameters.
///
#[derive(Debug, Clone)]
pub struct Projector {
    matrix: Matrix4<f64>,
    viewport: Viewport,
}

impl Projector {
    ///
    /// Projects a physical point to pixel coordinates, with (0, 0) at the top-left.
    ///
    /// # Parameters:
    /// - `point`: The point in physical printer coordinates
    ///
    /// # Returns:
    /// - The pixel coordinate, which may lie outside the raster
    ///
    pub fn project(&self, point: &Point3<f64>) -> Point2<f64> {
        let clip = self.matrix * Vector4::new(point.x, point.y, point.z, 1.);
        self.viewport.to_pixel(clip.x / clip.w, clip.y / clip.w)
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }
}

///
/// Projects a single point under the given view. Use a `ProjectionContext` when projecting many
/// points or many parameter sets against the same bed.
///
pub fn project(point: &Point3<f64>, view: &ViewParameters, bed: &BedVolume, viewport: Viewport) -> Point2<f64> {
    ProjectionContext::new(bed, viewport).projector(view).project(point)
}
