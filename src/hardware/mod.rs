//!
//! Physical printer representations: the bed volume, the extruder envelope and the live
//! machine position reported by the firmware.
//!

use nalgebra::Point3;
use serde::{Serialize, Deserialize};

pub mod error;
pub mod position;

///
/// A simple container for the printable volume of the machine. The volume is an axis-aligned box
/// with one corner at the origin. All fields are measured in millimetres.
/// All features have an associated getter function.
///
/// # Fields:
/// - `length`: The extent of the bed along the X axis
/// - `width`: The extent of the bed along the Y axis
/// - `depth`: The extent of the volume along the Z axis
///
#[derive(getset::Getters, Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[get = "pub"]
pub struct BedVolume {
    length: f64,
    width: f64,
    depth: f64,
}

impl BedVolume {
    ///
    /// Creates a new bed volume. Non-positive dimensions are raised to a millimetre, so the
    /// volume can always be normalised.
    ///
    /// # Returns:
    /// - A new `BedVolume` instance
    ///
    pub fn new(length: f64, width: f64, depth: f64) -> BedVolume {
        BedVolume { length: length.max(1.), width: width.max(1.), depth: depth.max(1.) }
    }

    ///
    /// # Returns:
    /// - The dimensions as an (x, y, z) triple
    ///
    pub fn dims(&self) -> [f64; 3] {
        [self.length, self.width, self.depth]
    }

    ///
    /// # Returns:
    /// - The centre of the bed surface, `(length / 2, width / 2, 0)`
    ///
    pub fn bed_center(&self) -> Point3<f64> {
        Point3::new(self.length / 2., self.width / 2., 0.)
    }

    ///
    /// The four corners of the bed surface, in the fixed winding order used to match them
    /// against a marked quadrilateral: origin, +X, +X+Y, +Y.
    ///
    /// # Returns:
    /// - The four bed corners at `z = 0`
    ///
    pub fn bed_corners(&self) -> [Point3<f64>; 4] {
        [
            Point3::new(0., 0., 0.),
            Point3::new(self.length, 0., 0.),
            Point3::new(self.length, self.width, 0.),
            Point3::new(0., self.width, 0.),
        ]
    }
}

impl Default for BedVolume {
    fn default() -> Self {
        BedVolume::new(230., 230., 250.)
    }
}

///
/// An axis-aligned box around the toolhead approximating the physical extruder. Each range is a
/// (min, max) offset from the current machine position, in millimetres.
///
/// # Fields:
/// - `x_range`: The offsets along X
/// - `y_range`: The offsets along Y
/// - `z_range`: The offsets along Z
///
#[derive(getset::Getters, Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[get = "pub"]
pub struct ExtruderEnvelope {
    x_range: (f64, f64),
    y_range: (f64, f64),
    z_range: (f64, f64),
}

impl ExtruderEnvelope {
    ///
    /// Creates a new envelope. Each range is reordered so that min <= max.
    ///
    /// # Returns:
    /// - A new `ExtruderEnvelope` instance
    ///
    pub fn new(x_range: (f64, f64), y_range: (f64, f64), z_range: (f64, f64)) -> ExtruderEnvelope {
        let order = |(a, b): (f64, f64)| if a <= b { (a, b) } else { (b, a) };
        ExtruderEnvelope { x_range: order(x_range), y_range: order(y_range), z_range: order(z_range) }
    }

    ///
    /// Builds the eight corners of the envelope translated to a machine position.
    ///
    /// # Parameters:
    /// - `position`: The current toolhead position
    ///
    /// # Returns:
    /// - The eight box corners, in physical coordinates
    ///
    pub fn corners_at(&self, position: &position::MachinePosition) -> [Point3<f64>; 8] {
        let mut corners = [Point3::origin(); 8];
        let xs = [self.x_range.0, self.x_range.1];
        let ys = [self.y_range.0, self.y_range.1];
        let zs = [self.z_range.0, self.z_range.1];

        for (i, corner) in corners.iter_mut().enumerate() {
            *corner = Point3::new(
                position.x + xs[i & 1],
                position.y + ys[(i >> 1) & 1],
                position.z + zs[(i >> 2) & 1],
            );
        }

        corners
    }
}

impl Default for ExtruderEnvelope {
    fn default() -> Self {
        ExtruderEnvelope::new((-20., 20.), (-20., 20.), (0., 40.))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use position::MachinePosition;

    #[test]
    fn bed_center_is_on_the_surface() {
        let bed = BedVolume::new(200., 100., 50.);
        assert_eq!(bed.bed_center(), Point3::new(100., 50., 0.));
    }

    #[test]
    fn envelope_ranges_are_ordered() {
        let env = ExtruderEnvelope::new((5., -5.), (0., 1.), (3., 2.));
        assert_eq!(*env.x_range(), (-5., 5.));
        assert_eq!(*env.z_range(), (2., 3.));
    }

    #[test]
    fn envelope_corners_follow_position() {
        let env = ExtruderEnvelope::default();
        let position = MachinePosition { x: 100., y: 50., z: 10., e: 0. };
        let corners = env.corners_at(&position);

        assert_eq!(corners[0], Point3::new(80., 30., 10.));
        assert_eq!(corners[7], Point3::new(120., 70., 50.));
    }
}
