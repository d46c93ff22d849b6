//!
//! A hologram session: one printer, one camera and one toolpath
//!
//! The session owns the settings for the duration of a print and wires the engine together:
//! calibration writes view parameters back, overlays are rendered, masked and composited, and
//! progress reports are turned into similarity checkpoints.
//!

use image::{RgbImage, RgbaImage};
use nalgebra::Point2;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::calibration::{self, CalibrationOutcome, CalibrationQuadrilateral, PixelPoint};
use crate::config::HologramConfig;
use crate::hardware::position::{parse_position_line, MachinePosition, PositionCache};
use crate::overlay::{self, mask, CompositeImage};
use crate::progress::{self, ProgressTracker};
use crate::projection::{ProjectionContext, ViewParameters};
use crate::render::{self, GeometrySource, RenderFrame};
use crate::snapshot::SnapshotSource;
use error::HologramError;

pub mod error;

///
/// A rendered overlay and the composite it produced.
///
/// # Fields:
/// - `frame`: The render, masked when a toolhead position was known
/// - `composite`: The render laid over the photo
///
#[derive(Debug, Clone)]
pub struct Overlay {
    pub frame: RenderFrame,
    pub composite: CompositeImage,
}

///
/// Drives the engine for one printer. Requests are handled one at a time; the position cache is
/// the only state shared with the outside.
///
pub struct HologramSession<G: GeometrySource> {
    config: HologramConfig,
    geometry: G,
    positions: PositionCache,
    tracker: ProgressTracker,
    anchor: Option<(Vec<PixelPoint>, Point2<f64>)>,
}

impl<G: GeometrySource> HologramSession<G> {
    ///
    /// Creates a new session.
    ///
    /// # Parameters:
    /// - `config`: The stored settings
    /// - `geometry`: The toolpath being printed
    /// - `positions`: The cache the printer's status feed writes into
    ///
    /// # Returns:
    /// - A new `HologramSession` instance
    ///
    pub fn new(config: HologramConfig, geometry: G, positions: PositionCache) -> HologramSession<G> {
        HologramSession { config, geometry, positions, tracker: ProgressTracker::new(), anchor: None }
    }

    pub fn config(&self) -> &HologramConfig {
        &self.config
    }

    pub fn geometry(&self) -> &G {
        &self.geometry
    }

    pub fn positions(&self) -> &PositionCache {
        &self.positions
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    ///
    /// Replaces the marked bed corners. Invalid points are rejected and the old ones kept.
    ///
    pub fn set_points(&mut self, points: Vec<PixelPoint>) -> Result<(), HologramError> {
        CalibrationQuadrilateral::from_pixels(&points)?;
        self.config.pixels = points;
        self.anchor = None;
        Ok(())
    }

    pub fn set_view(&mut self, view: ViewParameters) {
        self.config.view = view.clamped();
    }

    ///
    /// Nudges the view parameters by hand.
    ///
    /// # Returns:
    /// - The new, clipped parameters
    ///
    pub fn nudge_view(&mut self, delta: [f64; 5]) -> ViewParameters {
        self.config.view = self.config.view().offset(delta);
        self.config.view
    }

    ///
    /// The anchor of the marked quadrilateral, computed once per set of points.
    ///
    pub fn anchor(&mut self) -> Result<Point2<f64>, HologramError> {
        if let Some((points, anchor)) = &self.anchor {
            if *points == self.config.pixels {
                return Ok(*anchor);
            }
        }

        let anchor = self.config.quadrilateral()?.anchor();
        self.anchor = Some((self.config.pixels.clone(), anchor));
        Ok(anchor)
    }

    ///
    /// Solves the view parameters from the marked points. The stored parameters are replaced only
    /// when the search converged; otherwise they are left alone until the user accepts the
    /// result with `accept_calibration`.
    ///
    /// # Returns:
    /// - The outcome of the search
    ///
    pub fn calibrate(&mut self) -> Result<CalibrationOutcome, HologramError> {
        self.calibrate_with_rng(&mut rand::rng())
    }

    pub fn calibrate_with_rng<R: Rng>(&mut self, rng: &mut R) -> Result<CalibrationOutcome, HologramError> {
        let quad = self.config.quadrilateral()?;
        let outcome = calibration::calibrate_with_rng(&quad, &self.config.bed, self.config.viewport, rng);

        self.apply_outcome(&outcome);
        Ok(outcome)
    }

    ///
    /// Stores a calibrated view the user confirmed, converged or not.
    ///
    pub fn accept_calibration(&mut self, view: ViewParameters) {
        info!(?view, "calibration accepted");
        self.config.view = view.clamped();
    }

    fn apply_outcome(&mut self, outcome: &CalibrationOutcome) -> bool {
        if !outcome.converged {
            warn!(error = outcome.error, "calibration did not converge, keeping the stored view");
            return false;
        }

        self.config.view = outcome.view;
        true
    }

    ///
    /// Renders the bed outline and origin arrow over a photo, for checking the view by eye.
    ///
    pub fn reference_overlay(&mut self, photo: &RgbaImage) -> Result<Overlay, HologramError> {
        let anchor = self.anchor()?;
        let view = self.config.view();
        let frame = render::render_reference(&view, &self.config.bed, self.config.viewport);
        let composite = overlay::composite(photo, &frame, anchor, view.scale);

        Ok(Overlay { frame, composite })
    }

    ///
    /// Renders the toolpath up to a layer over a photo. Unless the final layer is requested, the
    /// area under the extruder's last known position is masked out.
    ///
    /// # Parameters:
    /// - `photo`: The photo to draw on
    /// - `layer`: The last layer to draw; `-1` draws everything
    ///
    /// # Returns:
    /// - The render and its composite
    ///
    pub fn toolpath_overlay(&mut self, photo: &RgbaImage, layer: i64) -> Result<Overlay, HologramError> {
        let anchor = self.anchor()?;
        let view = self.config.view();
        let color = self.config.render_color()?;
        let bed = self.config.bed;
        let viewport = self.config.viewport;

        let mut frame = render::render_toolpath(&self.geometry, layer, &view, &bed, viewport, color);

        let layer_count = self.geometry.layer_count();
        let is_final = render::resolve_layer(layer, layer_count) == layer_count.checked_sub(1);
        if !is_final {
            if let Some(position) = self.positions.latest() {
                let projector = ProjectionContext::new(&bed, viewport).projector(&view);
                frame = mask::mask(&frame, &self.config.extruder, &position, &projector);
            }
        }

        let composite = overlay::composite(photo, &frame, anchor, view.scale);
        Ok(Overlay { frame, composite })
    }

    ///
    /// Handles a progress report. When it crosses a new checkpoint, a photo is taken, the toolpath
    /// up to `layer` is laid over it and the similarity of the two is recorded.
    ///
    /// # Parameters:
    /// - `progress`: Print progress in percent
    /// - `layer`: The layer being printed
    /// - `camera`: Where to take the photo from
    ///
    /// # Returns:
    /// - The remapped score if a checkpoint was recorded
    ///
    pub fn on_progress(&mut self, progress: f64, layer: i64, camera: &dyn SnapshotSource) -> Result<Option<f64>, HologramError> {
        let Some(checkpoint) = self.tracker.due_checkpoint(progress) else {
            return Ok(None);
        };

        let photo = camera.fetch()?;
        let overlay = self.toolpath_overlay(&photo, layer)?;
        let raw = progress::similarity(&overlay.frame, &overlay.composite, &photo)?;

        Ok(Some(self.tracker.record(checkpoint, raw)))
    }

    ///
    /// Forgets the scores of the previous print.
    ///
    pub fn new_print(&mut self) {
        info!("new print started, similarity series cleared");
        self.tracker.reset();
    }

    ///
    /// Parses a status line from the printer into the position cache. A malformed line leaves
    /// the cached position untouched.
    ///
    /// # Returns:
    /// - The position read from the line
    ///
    pub fn ingest_status_line(&self, line: &str) -> Result<MachinePosition, HologramError> {
        let position = parse_position_line(line)?;
        self.positions.store(position);
        Ok(position)
    }

    pub fn score_chart(&self, width: u32, height: u32) -> RgbImage {
        debug!("charting {} scores", self.tracker.series().len());
        progress::render_chart(self.tracker.series(), width, height)
    }

    pub fn into_config(self) -> HologramConfig {
        self.config
    }
}
