use thiserror::Error;

///
/// All errors emitted from the config module.
///
/// - `Malformed`: When settings JSON can't be parsed or produced
/// - `Io`: When a settings file can't be read or written
///     Parameters:
///     - `path`: The settings file
///     - `reason`: What went wrong
///
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("The settings are malformed: {}", .0)]
    Malformed(#[from] serde_json::Error),

    #[error("The settings file {} could not be accessed: {}", .path, .reason)]
    Io { path: String, reason: String },
}
