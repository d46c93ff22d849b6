use thiserror::Error;

///
/// All errors emitted from the calibration module.
/// The error messages can be displayed to users on the frontend.
///
/// - `InvalidQuadrilateral`: When the marked points can't define an anchor
///     Parameters:
///     - `reason`: What is wrong with the points
///
#[derive(Error, Debug)]
pub enum CalibrationError {
    #[error("The marked bed corners are not a usable quadrilateral: {}", .reason)]
    InvalidQuadrilateral { reason: String },
}
