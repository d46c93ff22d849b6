//!
//! Lays a render of a print job over a photo of the printer, aligned as if it were a hologram
//! floating over the real bed, and scores how closely the print follows it.
//!

pub mod calibration;
pub mod config;
pub mod hardware;
pub mod overlay;
pub mod progress;
pub mod projection;
pub mod render;
pub mod session;
pub mod snapshot;

pub use calibration::{calibrate, CalibrationOutcome, CalibrationQuadrilateral, PixelPoint};
pub use config::HologramConfig;
pub use hardware::{BedVolume, ExtruderEnvelope};
pub use hardware::position::{MachinePosition, PositionCache};
pub use overlay::{composite, CompositeImage};
pub use projection::{project, ViewParameters, Viewport};
pub use render::{GeometrySource, RenderFrame};
pub use session::HologramSession;
pub use session::error::HologramError;
