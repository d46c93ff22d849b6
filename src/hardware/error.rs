use thiserror::Error;

///
/// All errors emitted from the hardware module.
///
/// - `MalformedPositionLine`: When a firmware status line can not be read as a machine position
///     Parameters:
///     - `line`: The offending status line
///     - `reason`: What was wrong with it
///
#[derive(Error, Debug)]
pub enum HardwareError {
    #[error("Could not read a machine position from `{}`: {}", .line, .reason)]
    MalformedPositionLine { line: String, reason: String },
}
