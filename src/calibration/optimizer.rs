//!
//! Bounded minimisation: a projected quasi-Newton (BFGS) local search, driven by basin hopping
//! for a global search
//!

use nalgebra::{DMatrix, DVector};
use rand::Rng;
use tracing::debug;

/// Armijo sufficient-decrease constant.
const ARMIJO: f64 = 1e-4;

/// Smallest line search step before giving up on a direction.
const MIN_STEP: f64 = 1e-10;

/// Relative finite-difference step.
const GRADIENT_STEP: f64 = 1e-6;

/// Ratio between one-sided slopes past which the objective is treated as jumping at the point.
const JUMP_RATIO: f64 = 1e3;

///
/// Options for a single local minimisation.
///
/// # Fields:
/// - `max_iterations`: The maximum number of quasi-Newton steps
/// - `gradient_tolerance`: Stop once the projected gradient's largest component is below this
/// - `function_tolerance`: Stop once a step improves the value by less than this, relatively
/// - `max_step`: The largest change of any coordinate in one step
///
#[derive(Debug, Clone, Copy)]
pub struct LocalOptions {
    pub max_iterations: usize,
    pub gradient_tolerance: f64,
    pub function_tolerance: f64,
    pub max_step: f64,
}

impl Default for LocalOptions {
    fn default() -> Self {
        LocalOptions { max_iterations: 200, gradient_tolerance: 1e-8, function_tolerance: 1e-12, max_step: 0.1 }
    }
}

///
/// Options for the basin hopping driver.
///
/// # Fields:
/// - `iterations`: The number of perturb-and-minimise rounds after the first minimisation
/// - `step_size`: Each coordinate is perturbed uniformly within `±step_size`
/// - `temperature`: The Metropolis temperature deciding whether a worse minimum is accepted
/// - `target`: Stop as soon as a minimum at or below this value is found
/// - `local`: Options for every local minimisation
///
#[derive(Debug, Clone, Copy)]
pub struct HoppingOptions {
    pub iterations: usize,
    pub step_size: f64,
    pub temperature: f64,
    pub target: f64,
    pub local: LocalOptions,
}

///
/// A local minimum.
///
#[derive(Debug, Clone)]
pub struct Minimum {
    pub x: DVector<f64>,
    pub value: f64,
    pub iterations: usize,
}

///
/// The outcome of a global search.
///
/// # Fields:
/// - `best`: The lowest minimum found
/// - `rounds`: How many hopping rounds ran
/// - `reached_target`: Whether `best` reached the target value
///
#[derive(Debug, Clone)]
pub struct HoppingResult {
    pub best: Minimum,
    pub rounds: usize,
    pub reached_target: bool,
}

fn clip(x: &DVector<f64>, lower: &DVector<f64>, upper: &DVector<f64>) -> DVector<f64> {
    DVector::from_iterator(x.len(), x.iter().zip(lower.iter()).zip(upper.iter()).map(|((v, lo), hi)| v.clamp(*lo, *hi)))
}

///
/// Estimates the gradient with finite differences. Where the two one-sided slopes disagree by
/// orders of magnitude the objective jumps at the point, and the gentler slope is kept.
///
fn gradient<F: Fn(&DVector<f64>) -> f64>(objective: &F, x: &DVector<f64>, value: f64) -> DVector<f64> {
    let mut grad = DVector::zeros(x.len());
    let mut probe = x.clone();

    for i in 0..x.len() {
        let h = GRADIENT_STEP * x[i].abs().max(1.);

        probe[i] = x[i] + h;
        let ahead = objective(&probe);
        probe[i] = x[i] - h;
        let behind = objective(&probe);
        probe[i] = x[i];

        let forward = (ahead - value) / h;
        let backward = (value - behind) / h;

        grad[i] = if forward.abs() > JUMP_RATIO * backward.abs().max(f64::EPSILON) {
            backward
        } else if backward.abs() > JUMP_RATIO * forward.abs().max(f64::EPSILON) {
            forward
        } else {
            (ahead - behind) / (2. * h)
        };
    }

    grad
}

///
/// Zeroes the components of a direction that would push a coordinate sitting on a bound
/// further outside.
///
fn mask_active(direction: &mut DVector<f64>, x: &DVector<f64>, lower: &DVector<f64>, upper: &DVector<f64>) {
    for i in 0..direction.len() {
        if (x[i] <= lower[i] && direction[i] < 0.) || (x[i] >= upper[i] && direction[i] > 0.) {
            direction[i] = 0.;
        }
    }
}

///
/// Minimises an objective within a box, with a projected BFGS method and numerical gradients.
///
/// # Parameters:
/// - `objective`: The function to minimise
/// - `start`: The starting point, clipped into the box first
/// - `lower`, `upper`: The box
/// - `options`: Iteration and tolerance settings
///
/// # Returns:
/// - The minimum found
///
pub fn minimize_bounded<F: Fn(&DVector<f64>) -> f64>(objective: &F, start: &DVector<f64>, lower: &DVector<f64>, upper: &DVector<f64>, options: &LocalOptions) -> Minimum {
    let n = start.len();
    let identity = DMatrix::<f64>::identity(n, n);

    let mut x = clip(start, lower, upper);
    let mut value = objective(&x);
    let mut grad = gradient(objective, &x, value);
    let mut inverse_hessian = identity.clone();
    let mut curvature_seen = false;
    let mut iterations = 0;

    while iterations < options.max_iterations {
        iterations += 1;

        let projected = &x - clip(&(&x - &grad), lower, upper);
        if projected.amax() < options.gradient_tolerance {
            break;
        }

        let mut direction = -(&inverse_hessian * &grad);
        mask_active(&mut direction, &x, lower, upper);

        if grad.dot(&direction) >= 0. {
            // the quasi-Newton direction went uphill, fall back to steepest descent
            inverse_hessian = identity.clone();
            curvature_seen = false;
            direction = -grad.clone();
            mask_active(&mut direction, &x, lower, upper);
            if grad.dot(&direction) >= 0. {
                break;
            }
        }

        let largest = direction.amax();
        if largest > options.max_step {
            direction *= options.max_step / largest;
        }

        // backtracking along the projected path, keeping the best decrease if Armijo never holds
        let mut alpha = 1.;
        let mut accepted: Option<(DVector<f64>, f64)> = None;
        while alpha >= MIN_STEP {
            let candidate = clip(&(&x + &direction * alpha), lower, upper);
            let candidate_value = objective(&candidate);
            let decrease = grad.dot(&(&candidate - &x)).min(0.);

            if candidate_value <= value + ARMIJO * decrease && candidate_value < value {
                accepted = Some((candidate, candidate_value));
                break;
            }
            if candidate_value < accepted.as_ref().map_or(value, |(_, v)| *v) {
                accepted = Some((candidate, candidate_value));
            }
            alpha *= 0.5;
        }

        let Some((next, next_value)) = accepted else {
            break;
        };

        let next_grad = gradient(objective, &next, next_value);
        let s = &next - &x;
        let y = &next_grad - &grad;
        let improvement = value - next_value;

        x = next;
        grad = next_grad;
        let previous = value;
        value = next_value;

        if improvement <= options.function_tolerance * previous.abs().max(value.abs()).max(1.) {
            break;
        }

        let sy = s.dot(&y);
        if sy > f64::EPSILON {
            if !curvature_seen {
                inverse_hessian = &identity * (sy / y.dot(&y));
                curvature_seen = true;
            }

            let rho = 1. / sy;
            let left = &identity - (&s * y.transpose()) * rho;
            let right = &identity - (&y * s.transpose()) * rho;
            inverse_hessian = &left * &inverse_hessian * &right + (&s * s.transpose()) * rho;
        }
    }

    Minimum { x, value, iterations }
}

///
/// Global minimisation by basin hopping: minimise locally, then repeatedly perturb the current
/// minimum, minimise again, and accept the new minimum by the Metropolis rule. The best minimum
/// seen is kept throughout.
///
/// # Parameters:
/// - `objective`: The function to minimise
/// - `start`: The first starting point
/// - `lower`, `upper`: The box every point is clipped into
/// - `options`: Hopping and local minimisation settings
/// - `rng`: The random source for perturbations and acceptance
///
/// # Returns:
/// - The best minimum, with whether it reached the target value
///
pub fn basin_hopping<F: Fn(&DVector<f64>) -> f64, R: Rng>(objective: &F, start: &DVector<f64>, lower: &DVector<f64>, upper: &DVector<f64>, options: &HoppingOptions, rng: &mut R) -> HoppingResult {
    let mut current = minimize_bounded(objective, start, lower, upper, &options.local);
    let mut best = current.clone();

    debug!(value = best.value, "initial local minimisation finished");

    if best.value <= options.target {
        return HoppingResult { best, rounds: 0, reached_target: true };
    }

    for round in 1..=options.iterations {
        let perturbed = DVector::from_iterator(current.x.len(), current.x.iter().map(|v| v + rng.random_range(-options.step_size..=options.step_size)));
        let trial = minimize_bounded(objective, &clip(&perturbed, lower, upper), lower, upper, &options.local);

        let accept = trial.value < current.value
            || rng.random::<f64>() < (-(trial.value - current.value) / options.temperature).exp();

        debug!(round, trial = trial.value, current = current.value, best = best.value, accept, "basin hopping round");

        if trial.value < best.value {
            best = trial.clone();
        }
        if accept {
            current = trial;
        }

        if best.value <= options.target {
            return HoppingResult { best, rounds: round, reached_target: true };
        }
    }

    HoppingResult { best, rounds: options.iterations, reached_target: false }
}
