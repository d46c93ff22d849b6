//!
//! Calibration of the view parameters from four bed corners marked on a photo
//!

use nalgebra::{DVector, Point2, Point3, Vector2};
use rand::Rng;
use serde::{Serialize, Deserialize};
use tracing::info;

use crate::hardware::BedVolume;
use crate::overlay::overlay_scale;
use crate::projection::{ProjectionContext, ViewParameters, Viewport, VIEW_BOUNDS};
use error::CalibrationError;
use optimizer::{HoppingOptions, LocalOptions};

pub mod error;
pub mod optimizer;

/// Aggregate squared pixel error, in px², below which the search stops early.
pub const CONVERGED_ERROR: f64 = 1.;

/// Number of perturb-and-minimise rounds after the first local minimisation.
const HOPPING_ROUNDS: usize = 10;

/// Perturbation half-width, as a fraction of each parameter's range.
const HOPPING_STEP: f64 = 0.2;

/// Metropolis temperature, in px².
const HOPPING_TEMPERATURE: f64 = 1.;

/// Smallest sine of the angle between the diagonals for the quadrilateral to be usable.
const MIN_DIAGONAL_SINE: f64 = 1e-6;

///
/// A pixel position as persisted in settings, `{ "x": .., "y": .. }`.
///
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct PixelPoint {
    pub x: f64,
    pub y: f64,
}

impl From<PixelPoint> for Point2<f64> {
    fn from(point: PixelPoint) -> Self {
        Point2::new(point.x, point.y)
    }
}

///
/// Four marked bed corners in the base photo, in the same order as `BedVolume::bed_corners`,
/// and the anchor derived from them. The correspondence is positional: corners marked in a
/// different winding still calibrate, just to a wrong view.
///
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationQuadrilateral {
    points: [Point2<f64>; 4],
    anchor: Point2<f64>,
}

impl CalibrationQuadrilateral {
    ///
    /// Validates the marked points and computes their anchor.
    ///
    /// # Parameters:
    /// - `points`: The marked corners, in base photo pixels
    ///
    /// # Returns:
    /// - The quadrilateral
    /// - `InvalidQuadrilateral` if there aren't exactly four points or the diagonals don't cross
    ///
    pub fn new(points: &[Point2<f64>]) -> Result<CalibrationQuadrilateral, CalibrationError> {
        let points: [Point2<f64>; 4] = points.try_into().map_err(|_| CalibrationError::InvalidQuadrilateral {
            reason: format!("expected 4 points, got {}", points.len()),
        })?;

        let anchor = diagonal_intersection(&points)?;

        Ok(CalibrationQuadrilateral { points, anchor })
    }

    pub fn from_pixels(points: &[PixelPoint]) -> Result<CalibrationQuadrilateral, CalibrationError> {
        let points: Vec<Point2<f64>> = points.iter().map(|p| Point2::from(*p)).collect();
        CalibrationQuadrilateral::new(&points)
    }

    pub fn points(&self) -> &[Point2<f64>; 4] {
        &self.points
    }

    ///
    /// # Returns:
    /// - The intersection of the diagonals, used as the alignment origin for every overlay
    ///
    pub fn anchor(&self) -> Point2<f64> {
        self.anchor
    }
}

fn cross(a: &Vector2<f64>, b: &Vector2<f64>) -> f64 {
    a.x * b.y - a.y * b.x
}

///
/// Intersects the diagonals `p0-p2` and `p1-p3` of a quadrilateral.
///
/// # Returns:
/// - The intersection point
/// - `InvalidQuadrilateral` if either diagonal has no length or they are (nearly) parallel
///
pub fn diagonal_intersection(points: &[Point2<f64>; 4]) -> Result<Point2<f64>, CalibrationError> {
    let first = points[2] - points[0];
    let second = points[3] - points[1];
    let lengths = first.norm() * second.norm();

    if !lengths.is_finite() || lengths == 0. {
        return Err(CalibrationError::InvalidQuadrilateral { reason: "a diagonal has no length".to_owned() });
    }

    let denominator = cross(&first, &second);
    if denominator.abs() < MIN_DIAGONAL_SINE * lengths {
        return Err(CalibrationError::InvalidQuadrilateral { reason: "the diagonals are parallel".to_owned() });
    }

    let t = cross(&(points[1] - points[0]), &second) / denominator;
    Ok(points[0] + first * t)
}

///
/// The fixed parts of the alignment problem: the projection context, the bed corners and the
/// marked quadrilateral. Only the view parameters vary between evaluations.
///
pub struct AlignmentProblem {
    context: ProjectionContext,
    corners: [Point3<f64>; 4],
    center: Point3<f64>,
    quad: CalibrationQuadrilateral,
}

impl AlignmentProblem {
    pub fn new(quad: &CalibrationQuadrilateral, bed: &BedVolume, viewport: Viewport) -> AlignmentProblem {
        AlignmentProblem {
            context: ProjectionContext::new(bed, viewport),
            corners: bed.bed_corners(),
            center: bed.bed_center(),
            quad: quad.clone(),
        }
    }

    ///
    /// Places the bed corners the way the compositor would: projected, moved so the projected
    /// bed centre sits on the anchor, and scaled about the anchor.
    ///
    /// # Parameters:
    /// - `view`: The view parameters, clipped into bounds before use
    ///
    /// # Returns:
    /// - The four corners in base photo pixels
    ///
    pub fn placed_corners(&self, view: &ViewParameters) -> [Point2<f64>; 4] {
        let view = view.clamped();
        let projector = self.context.projector(&view);
        let center = projector.project(&self.center);
        let scale = overlay_scale(view.scale);
        let anchor = self.quad.anchor();

        self.corners.map(|corner| anchor + (projector.project(&corner) - center) * scale)
    }

    ///
    /// # Returns:
    /// - The sum of squared pixel distances between placed corners and marked points
    ///
    pub fn error(&self, view: &ViewParameters) -> f64 {
        let error: f64 = self
            .placed_corners(view)
            .iter()
            .zip(self.quad.points().iter())
            .map(|(placed, marked)| (placed - marked).norm_squared())
            .sum();

        if error.is_finite() { error } else { f64::MAX }
    }
}

///
/// The result of a calibration run. A run that never reached `CONVERGED_ERROR` still returns
/// its best parameters, but they should be confirmed by the user before being kept.
///
/// # Fields:
/// - `view`: The best view parameters found
/// - `error`: Their aggregate squared pixel error
/// - `converged`: Whether the error reached `CONVERGED_ERROR`
/// - `rounds`: How many hopping rounds ran
///
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationOutcome {
    pub view: ViewParameters,
    pub error: f64,
    pub converged: bool,
    pub rounds: usize,
}

fn normalize(view: &ViewParameters) -> DVector<f64> {
    DVector::from_iterator(5, view.to_array().iter().zip(VIEW_BOUNDS.iter()).map(|(v, (lo, hi))| (v - lo) / (hi - lo)))
}

fn denormalize(x: &DVector<f64>) -> ViewParameters {
    let mut values = [0.; 5];
    for (i, (lo, hi)) in VIEW_BOUNDS.iter().enumerate() {
        values[i] = lo + x[i] * (hi - lo);
    }
    ViewParameters::from_array(values)
}

///
/// Solves for the view parameters that lay the bed corners over the marked quadrilateral.
///
/// # Parameters:
/// - `quad`: The marked bed corners
/// - `bed`: The printable volume
/// - `viewport`: The render size the parameters will be used with
///
/// # Returns:
/// - The best parameters found, with their error and whether the search converged
///
pub fn calibrate(quad: &CalibrationQuadrilateral, bed: &BedVolume, viewport: Viewport) -> CalibrationOutcome {
    calibrate_with_rng(quad, bed, viewport, &mut rand::rng())
}

///
/// As `calibrate`, drawing perturbations from the given random source.
///
pub fn calibrate_with_rng<R: Rng>(quad: &CalibrationQuadrilateral, bed: &BedVolume, viewport: Viewport, rng: &mut R) -> CalibrationOutcome {
    let problem = AlignmentProblem::new(quad, bed, viewport);
    let objective = |x: &DVector<f64>| problem.error(&denormalize(x));

    let options = HoppingOptions {
        iterations: HOPPING_ROUNDS,
        step_size: HOPPING_STEP,
        temperature: HOPPING_TEMPERATURE,
        target: CONVERGED_ERROR,
        local: LocalOptions::default(),
    };

    let lower = DVector::zeros(5);
    let upper = DVector::from_element(5, 1.);
    let start = normalize(&ViewParameters::default());

    let result = optimizer::basin_hopping(&objective, &start, &lower, &upper, &options, rng);
    let view = denormalize(&result.best.x);

    info!(?view, error = result.best.value, converged = result.reached_target, rounds = result.rounds, "calibration finished");

    CalibrationOutcome { view, error: result.best.value, converged: result.reached_target, rounds: result.rounds }
}
