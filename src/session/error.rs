use thiserror::Error;

use crate::calibration::error::CalibrationError;
use crate::config::error::ConfigError;
use crate::hardware::error::HardwareError;
use crate::overlay::error::OverlayError;
use crate::progress::error::ProgressError;
use crate::render::error::RenderError;
use crate::snapshot::error::SnapshotError;

///
/// Any error a session request can end with. Each variant wraps the error of the module that
/// failed; the message is passed through unchanged.
///
#[derive(Error, Debug)]
pub enum HologramError {
    #[error(transparent)]
    Hardware(#[from] HardwareError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    #[error(transparent)]
    Overlay(#[from] OverlayError),

    #[error(transparent)]
    Progress(#[from] ProgressError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
