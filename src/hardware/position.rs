use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Serialize, Deserialize};
use tracing::{debug, warn};

use super::error::HardwareError;

/// The marker after which the firmware appends raw stepper counts.
const COUNT_MARKER: &str = "Count";

///
/// The toolhead position as reported by the firmware, in millimetres.
///
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct MachinePosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub e: f64,
}

///
/// Parses a position report such as `X:10.0 Y:20.0 Z:5.0 E:1.2 Count X:12345 Y:6789`.
/// Everything from the ` Count` marker onwards is discarded before the `KEY:value` pairs are
/// read. Unknown keys are ignored.
///
/// # Parameters:
/// - `line`: A single status line received from the printer
///
/// # Returns:
/// - The machine position carried by the line
/// - A `MalformedPositionLine` error if the line only holds the counter block, is missing an
///   axis or carries a value that isn't a number
///
pub fn parse_position_line(line: &str) -> Result<MachinePosition, HardwareError> {
    let trimmed = line.trim();

    if trimmed.starts_with(COUNT_MARKER) {
        return Err(malformed(line, "the line only carries the stepper counter block"));
    }

    let head = match trimmed.find(&format!(" {}", COUNT_MARKER)) {
        Some(idx) => &trimmed[..idx],
        None => trimmed,
    };

    let mut axes: [Option<f64>; 4] = [None; 4];

    for token in head.split_whitespace() {
        let Some((key, value)) = token.split_once(':') else {
            continue;
        };

        let slot = match key {
            "X" => 0,
            "Y" => 1,
            "Z" => 2,
            "E" => 3,
            _ => continue,
        };

        let parsed = value.parse::<f64>().map_err(|err| malformed(line, &format!("value for {} is not a number ({})", key, err)))?;
        axes[slot] = Some(parsed);
    }

    match axes {
        [Some(x), Some(y), Some(z), Some(e)] => Ok(MachinePosition { x, y, z, e }),
        _ => Err(malformed(line, "expected X, Y, Z and E fields")),
    }
}

fn malformed(line: &str, reason: &str) -> HardwareError {
    HardwareError::MalformedPositionLine { line: line.to_owned(), reason: reason.to_owned() }
}

///
/// A single-slot, latest-value-wins cache of the machine position. Clones share the same slot,
/// so the status feed can write while renders read the most recent snapshot without waiting on
/// each other for longer than a copy.
///
#[derive(Clone, Default)]
pub struct PositionCache {
    slot: Arc<RwLock<Option<MachinePosition>>>,
}

impl PositionCache {
    pub fn new() -> PositionCache {
        PositionCache::default()
    }

    ///
    /// Stores a position, replacing whatever was held before.
    ///
    pub fn store(&self, position: MachinePosition) {
        *self.slot.write() = Some(position);
    }

    ///
    /// Parses a status line and stores its position. Malformed lines are logged and dropped; the
    /// previously held position is kept.
    ///
    /// # Parameters:
    /// - `line`: A single status line received from the printer
    ///
    /// # Returns:
    /// - `true` if the line updated the cache
    ///
    pub fn ingest_line(&self, line: &str) -> bool {
        match parse_position_line(line) {
            Ok(position) => {
                debug!(?position, "machine position updated");
                self.store(position);
                true
            }
            Err(err) => {
                warn!("dropping status line: {}", err);
                false
            }
        }
    }

    ///
    /// # Returns:
    /// - The most recent position, if one has been received
    ///
    pub fn latest(&self) -> Option<MachinePosition> {
        *self.slot.read()
    }

    ///
    /// Forgets the held position, e.g. when a new print starts.
    ///
    pub fn clear(&self) {
        *self.slot.write() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_position_and_discards_counts() {
        let position = parse_position_line("X:10.0 Y:20.0 Z:5.0 E:1.2 Count X:12345 Y:6789").unwrap();
        assert_eq!(position, MachinePosition { x: 10.0, y: 20.0, z: 5.0, e: 1.2 });
    }

    #[test]
    fn rejects_counter_only_line() {
        assert!(parse_position_line("Count X:12345 Y:6789").is_err());
    }

    #[test]
    fn rejects_missing_axis() {
        assert!(parse_position_line("X:10.0 Y:20.0 E:1.2").is_err());
    }

    #[test]
    fn rejects_non_numeric_value() {
        assert!(parse_position_line("X:ten Y:20.0 Z:5.0 E:1.2").is_err());
    }

    #[test]
    fn ignores_unknown_tokens() {
        let position = parse_position_line("ok X:1.5 Y:2 Z:0.3 E:0 T:200").unwrap();
        assert_eq!(position.x, 1.5);
        assert_eq!(position.z, 0.3);
    }

    #[test]
    fn cache_keeps_previous_position_on_bad_line() {
        let cache = PositionCache::new();
        assert!(cache.ingest_line("X:10.0 Y:20.0 Z:5.0 E:1.2 Count X:12345 Y:6789"));
        assert!(!cache.ingest_line("Count X:12345 Y:6789"));

        assert_eq!(cache.latest(), Some(MachinePosition { x: 10.0, y: 20.0, z: 5.0, e: 1.2 }));
    }

    #[test]
    fn cache_clones_share_the_slot() {
        let feed = PositionCache::new();
        let reader = feed.clone();
        feed.store(MachinePosition { x: 1., y: 2., z: 3., e: 4. });

        assert_eq!(reader.latest().map(|p| p.z), Some(3.));
        reader.clear();
        assert!(feed.latest().is_none());
    }
}
