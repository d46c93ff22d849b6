use nalgebra::{Matrix4, Rotation3, Unit, Vector3};

/// Distance of the eye from the centre of the normalised world box.
pub const EYE_DISTANCE: f64 = 10.;

/// Norm the box aspect is rescaled to, so that a unit cube fits the 2D data window.
const BOX_ASPECT_NORM: f64 = 1.8294640721620434;

///
/// Wraps an angle in degrees into (-180, 180].
///
pub fn norm_angle(degrees: f64) -> f64 {
    let wrapped = (degrees + 360.).rem_euclid(360.);
    if wrapped > 180. { wrapped - 360. } else { wrapped }
}

///
/// Calculates the box aspect of a volume: each dimension over the largest one, rescaled to a
/// fixed norm.
///
/// # Parameters:
/// - `dims`: The (x, y, z) extents of the volume
///
/// # Returns:
/// - The box aspect vector
///
pub fn box_aspect(dims: [f64; 3]) -> Vector3<f64> {
    let max = dims.iter().cloned().fold(f64::MIN, f64::max);
    let aspect = Vector3::new(dims[0] / max, dims[1] / max, dims[2] / max);

    aspect * (BOX_ASPECT_NORM / aspect.norm())
}

///
/// Builds the matrix taking data coordinates within the given limits to the box
/// `[0, aspect.x] x [0, aspect.y] x [0, aspect.z]`.
///
/// # Parameters:
/// - `limits`: The (min, max) limits of each axis
/// - `aspect`: The box aspect
///
pub fn world_transformation(limits: [(f64, f64); 3], aspect: &Vector3<f64>) -> Matrix4<f64> {
    let mut world = Matrix4::identity();

    for axis in 0..3 {
        let (min, max) = limits[axis];
        let span = (max - min) / aspect[axis];
        world[(axis, axis)] = 1. / span;
        world[(axis, 3)] = -min / span;
    }

    world
}

///
/// Calculates the camera basis: `u` points right, `v` points up and `w` points from the box
/// centre back towards the eye. The up vector flips once the elevation passes vertical, and
/// roll turns `u` and `v` about `w`.
///
fn view_axes(eye: &Vector3<f64>, center: &Vector3<f64>, elevation_rad: f64, roll_rad: f64) -> (Vector3<f64>, Vector3<f64>, Vector3<f64>) {
    let up = if elevation_rad.abs() > std::f64::consts::FRAC_PI_2 { -Vector3::z() } else { Vector3::z() };

    let w = (eye - center).normalize();
    let mut u = up.cross(&w).normalize();
    let mut v = w.cross(&u);

    if roll_rad != 0. {
        let rotation = Rotation3::from_axis_angle(&Unit::new_normalize(w), -roll_rad);
        u = rotation * u;
        v = rotation * v;
    }

    (u, v, w)
}

///
/// Builds the combined view and perspective matrix for a camera orbiting the normalised box.
///
/// # Parameters:
/// - `aspect`: The box aspect the world has been normalised into
/// - `elevation`, `azimuth`, `roll`: Camera orientation in degrees
/// - `focal_length`: Perspective strength; the eye is pulled in proportionally so the scene
///   keeps roughly the same size on screen
///
/// # Returns:
/// - A matrix taking normalised world coordinates to homogeneous device coordinates
///
pub fn camera_transformation(aspect: &Vector3<f64>, elevation: f64, azimuth: f64, roll: f64, focal_length: f64) -> Matrix4<f64> {
    let center = aspect * 0.5;

    let elevation_rad = norm_angle(elevation).to_radians();
    let azimuth_rad = norm_angle(azimuth).to_radians();
    let roll_rad = norm_angle(roll).to_radians();

    let direction = Vector3::new(
        elevation_rad.cos() * azimuth_rad.cos(),
        elevation_rad.cos() * azimuth_rad.sin(),
        elevation_rad.sin(),
    );

    let eye = center + direction * EYE_DISTANCE;
    let (u, v, w) = view_axes(&eye, &center, elevation_rad, roll_rad);

    let eye_focal = center + direction * (EYE_DISTANCE * focal_length);
    let view = view_transformation(&u, &v, &w, &eye_focal);

    perspective_transformation(-EYE_DISTANCE, EYE_DISTANCE, focal_length) * view
}

fn view_transformation(u: &Vector3<f64>, v: &Vector3<f64>, w: &Vector3<f64>, eye: &Vector3<f64>) -> Matrix4<f64> {
    let mut rotation = Matrix4::identity();
    for col in 0..3 {
        rotation[(0, col)] = u[col];
        rotation[(1, col)] = v[col];
        rotation[(2, col)] = w[col];
    }

    let mut translation = Matrix4::identity();
    for row in 0..3 {
        translation[(row, 3)] = -eye[row];
    }

    rotation * translation
}

fn perspective_transformation(z_front: f64, z_back: f64, focal_length: f64) -> Matrix4<f64> {
    let b = (z_front + z_back) / (z_front - z_back);
    let c = -2. * (z_front * z_back) / (z_front - z_back);

    Matrix4::new(
        focal_length, 0., 0., 0.,
        0., focal_length, 0., 0.,
        0., 0., b, c,
        0., 0., -1., 0.,
    )
}
