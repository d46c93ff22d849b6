use thiserror::Error;

///
/// All errors emitted from the snapshot module.
///
/// - `SnapshotUnavailable`: When the photo could not be fetched or decoded
///     Parameters:
///     - `source_name`: Where the photo was fetched from
///     - `reason`: What went wrong
///
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("No snapshot could be taken from {}: {}", .source_name, .reason)]
    SnapshotUnavailable { source_name: String, reason: String },
}
