//! Adaptive integration of `y' = f(t, y)` sampled on a caller-supplied grid.
//!
//! The stepper is the Dormand–Prince 5(4) pair with first-same-as-last
//! reuse of the final stage and an RMS error norm, as described in
//! E. Hairer, S. P. Nørsett and G. Wanner, "Solving Ordinary Differential
//! Equations I. Nonstiff Problems", 2nd ed. (1993), section II.4–II.5.

use nalgebra::SVector;
use serde::Deserialize;

use crate::error::SolverError;

/// Right-hand side of an ODE system with `N` components.
pub trait OdeSystem<const N: usize> {
    fn derivative(&self, t: f64, y: &SVector<f64, N>) -> SVector<f64, N>;
}

impl<F, const N: usize> OdeSystem<N> for F
where
    F: Fn(f64, &SVector<f64, N>) -> SVector<f64, N>,
{
    fn derivative(&self, t: f64, y: &SVector<f64, N>) -> SVector<f64, N> {
        self(t, y)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SolverSettings {
    pub rtol: f64,
    pub atol: f64,
    /// Attempted steps allowed between two consecutive output times.
    pub max_steps: usize,
    pub initial_step: Option<f64>,
    pub max_step: Option<f64>,
    pub safety: f64,
    pub min_factor: f64,
    pub max_factor: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            rtol: 1.49012e-8,
            atol: 1.49012e-8,
            max_steps: 500,
            initial_step: None,
            max_step: None,
            safety: 0.9,
            min_factor: 0.2,
            max_factor: 10.0,
        }
    }
}

impl SolverSettings {
    fn check(&self) -> Result<(), SolverError> {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        if !valid(self.rtol) || !valid(self.atol) {
            return Err(SolverError::InvalidTolerance {
                rtol: self.rtol,
                atol: self.atol,
            });
        }
        if !(valid(self.safety) && self.safety <= 1.0) {
            return Err(SolverError::InvalidSettings("safety must lie in (0, 1]"));
        }
        if !(valid(self.min_factor) && self.min_factor <= 1.0) {
            return Err(SolverError::InvalidSettings("min_factor must lie in (0, 1]"));
        }
        if !(self.max_factor.is_finite() && self.max_factor >= 1.0) {
            return Err(SolverError::InvalidSettings("max_factor must be finite and >= 1"));
        }
        if self.initial_step.is_some_and(|h| !valid(h)) {
            return Err(SolverError::InvalidSettings("initial_step must be finite and positive"));
        }
        if self.max_step.is_some_and(|h| !valid(h)) {
            return Err(SolverError::InvalidSettings("max_step must be finite and positive"));
        }
        Ok(())
    }

    fn step_factor(&self, err: f64) -> f64 {
        if err == 0.0 {
            return self.max_factor;
        }
        (self.safety * err.powf(-0.2)).clamp(self.min_factor, self.max_factor)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SolverStats {
    pub accepted: usize,
    pub rejected: usize,
    pub evaluations: usize,
}

#[derive(Debug, Clone)]
pub struct Solution<const N: usize> {
    pub times: Vec<f64>,
    pub states: Vec<SVector<f64, N>>,
    pub stats: SolverStats,
}

/// `n` evenly spaced points from `start` to `end`, both included.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n)
                .map(|i| if i == n - 1 { end } else { start + step * i as f64 })
                .collect()
        }
    }
}

// Dormand–Prince 5(4) tableau.
const C2: f64 = 1.0 / 5.0;
const C3: f64 = 3.0 / 10.0;
const C4: f64 = 4.0 / 5.0;
const C5: f64 = 8.0 / 9.0;

const A21: f64 = 1.0 / 5.0;
const A31: f64 = 3.0 / 40.0;
const A32: f64 = 9.0 / 40.0;
const A41: f64 = 44.0 / 45.0;
const A42: f64 = -56.0 / 15.0;
const A43: f64 = 32.0 / 9.0;
const A51: f64 = 19372.0 / 6561.0;
const A52: f64 = -25360.0 / 2187.0;
const A53: f64 = 64448.0 / 6561.0;
const A54: f64 = -212.0 / 729.0;
const A61: f64 = 9017.0 / 3168.0;
const A62: f64 = -355.0 / 33.0;
const A63: f64 = 46732.0 / 5247.0;
const A64: f64 = 49.0 / 176.0;
const A65: f64 = -5103.0 / 18656.0;
const A71: f64 = 35.0 / 384.0;
const A73: f64 = 500.0 / 1113.0;
const A74: f64 = 125.0 / 192.0;
const A75: f64 = -2187.0 / 6784.0;
const A76: f64 = 11.0 / 84.0;

// Difference between the 5th and 4th order weights.
const E1: f64 = 71.0 / 57600.0;
const E3: f64 = -71.0 / 16695.0;
const E4: f64 = 71.0 / 1920.0;
const E5: f64 = -17253.0 / 339200.0;
const E6: f64 = 22.0 / 525.0;
const E7: f64 = -1.0 / 40.0;

struct Stepper<'a, S: ?Sized, const N: usize> {
    system: &'a S,
    settings: &'a SolverSettings,
    stats: SolverStats,
}

struct Step<const N: usize> {
    y: SVector<f64, N>,
    k7: SVector<f64, N>,
    err: f64,
}

impl<S: OdeSystem<N> + ?Sized, const N: usize> Stepper<'_, S, N> {
    fn eval(&mut self, t: f64, y: &SVector<f64, N>) -> Result<SVector<f64, N>, SolverError> {
        self.stats.evaluations += 1;
        let dy = self.system.derivative(t, y);
        if dy.iter().all(|v| v.is_finite()) {
            Ok(dy)
        } else {
            Err(SolverError::NonFinite { t })
        }
    }

    fn error_norm(&self, scaled: impl Fn(usize) -> (f64, f64)) -> f64 {
        let sum: f64 = (0..N)
            .map(|i| {
                let (value, magnitude) = scaled(i);
                let sk = self.settings.atol + self.settings.rtol * magnitude;
                (value / sk).powi(2)
            })
            .sum();
        (sum / N.max(1) as f64).sqrt()
    }

    fn initial_step(
        &mut self,
        t: f64,
        y: &SVector<f64, N>,
        f0: &SVector<f64, N>,
        h_max: f64,
    ) -> Result<f64, SolverError> {
        let d0 = self.error_norm(|i| (y[i], y[i].abs()));
        let d1 = self.error_norm(|i| (f0[i], y[i].abs()));
        let h0 = if d0 < 1e-5 || d1 < 1e-5 {
            1e-6
        } else {
            0.01 * d0 / d1
        }
        .min(h_max);

        let f1 = self.eval(t + h0, &(y + f0 * h0))?;
        let d2 = self.error_norm(|i| (f1[i] - f0[i], y[i].abs())) / h0;
        let h1 = if d1.max(d2) <= 1e-15 {
            (h0 * 1e-3).max(1e-6)
        } else {
            (0.01 / d1.max(d2)).powf(0.2)
        };
        Ok((100.0 * h0).min(h1).min(h_max))
    }

    fn step(
        &mut self,
        t: f64,
        y: &SVector<f64, N>,
        k1: &SVector<f64, N>,
        h: f64,
    ) -> Result<Step<N>, SolverError> {
        let k2 = self.eval(t + C2 * h, &(y + k1 * (h * A21)))?;
        let k3 = self.eval(t + C3 * h, &(y + (k1 * A31 + k2 * A32) * h))?;
        let k4 = self.eval(t + C4 * h, &(y + (k1 * A41 + k2 * A42 + k3 * A43) * h))?;
        let k5 = self.eval(
            t + C5 * h,
            &(y + (k1 * A51 + k2 * A52 + k3 * A53 + k4 * A54) * h),
        )?;
        let k6 = self.eval(
            t + h,
            &(y + (k1 * A61 + k2 * A62 + k3 * A63 + k4 * A64 + k5 * A65) * h),
        )?;
        let y_new = y + (k1 * A71 + k3 * A73 + k4 * A74 + k5 * A75 + k6 * A76) * h;
        let k7 = self.eval(t + h, &y_new)?;

        let local = (k1 * E1 + k3 * E3 + k4 * E4 + k5 * E5 + k6 * E6 + k7 * E7) * h;
        let err = self.error_norm(|i| (local[i], y[i].abs().max(y_new[i].abs())));
        Ok(Step { y: y_new, k7, err })
    }
}

fn check_grid(t_grid: &[f64]) -> Result<(), SolverError> {
    let finite = t_grid.iter().all(|t| t.is_finite());
    let increasing = t_grid.windows(2).all(|w| w[0] < w[1]);
    if t_grid.is_empty() || !finite || !increasing {
        return Err(SolverError::InvalidGrid);
    }
    Ok(())
}

/// Integrates `system` from `y0` at `t_grid[0]` and returns the state at
/// every grid time. Steps are shortened so that none crosses an output time.
pub fn solve<S, const N: usize>(
    system: &S,
    t_grid: &[f64],
    y0: SVector<f64, N>,
    settings: &SolverSettings,
) -> Result<Solution<N>, SolverError>
where
    S: OdeSystem<N> + ?Sized,
{
    settings.check()?;
    check_grid(t_grid)?;

    let mut states = Vec::with_capacity(t_grid.len());
    states.push(y0);

    let mut stepper = Stepper {
        system,
        settings,
        stats: SolverStats::default(),
    };

    let span = t_grid[t_grid.len() - 1] - t_grid[0];
    if span > 0.0 {
        let h_max = settings.max_step.map_or(span, |h| h.min(span));
        let mut t = t_grid[0];
        let mut y = y0;
        let mut k1 = stepper.eval(t, &y)?;
        let mut h = match settings.initial_step {
            Some(h) => h.min(h_max),
            None => stepper.initial_step(t, &y, &k1, h_max)?,
        };

        for &t_out in &t_grid[1..] {
            let mut attempts = 0;
            while t < t_out {
                if attempts >= settings.max_steps {
                    return Err(SolverError::MaxStepsExceeded { t });
                }
                attempts += 1;

                let remaining = t_out - t;
                let clamped = h >= remaining;
                let h_step = if clamped { remaining } else { h };
                if !clamped && h_step <= 1e-14 * t.abs().max(1.0) {
                    return Err(SolverError::StepSizeUnderflow { t, h: h_step });
                }

                let step = stepper.step(t, &y, &k1, h_step)?;
                if step.err <= 1.0 {
                    stepper.stats.accepted += 1;
                    t = if clamped { t_out } else { t + h_step };
                    y = step.y;
                    k1 = step.k7;
                    let proposed = (h_step * settings.step_factor(step.err)).min(h_max);
                    h = if clamped { proposed.max(h) } else { proposed };
                } else {
                    stepper.stats.rejected += 1;
                    h = h_step * settings.step_factor(step.err).min(1.0);
                }
            }
            states.push(y);
        }
    }

    let stats = stepper.stats;
    tracing::debug!(
        accepted = stats.accepted,
        rejected = stats.rejected,
        evaluations = stats.evaluations,
        points = t_grid.len(),
        "ode solve finished"
    );
    Ok(Solution {
        times: t_grid.to_vec(),
        states,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Vector1, Vector2, Vector3};

    fn decay(_t: f64, y: &Vector1<f64>) -> Vector1<f64> {
        y * -0.5
    }

    #[test]
    fn test_linspace() {
        let grid = linspace(0.0, 3650.0, 100_000);
        assert_eq!(grid.len(), 100_000);
        assert_eq!(grid[0], 0.0);
        assert_eq!(grid[99_999], 3650.0);
        assert!(f64::abs(grid[1] - 3650.0 / 99_999.0) < 1e-12);

        assert!(linspace(0.0, 1.0, 0).is_empty());
        assert_eq!(linspace(2.0, 5.0, 1), vec![2.0]);
        assert_eq!(linspace(0.0, 1.0, 3), vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_exponential_decay() {
        let grid = linspace(0.0, 10.0, 101);
        let solution = solve(&decay, &grid, Vector1::new(1.0), &SolverSettings::default()).unwrap();
        assert_eq!(solution.states.len(), grid.len());
        assert_eq!(solution.states[0][0], 1.0);
        for (t, y) in solution.times.iter().zip(&solution.states) {
            let exact = f64::exp(-0.5 * t);
            assert!(f64::abs(y[0] - exact) < 1e-7, "t={t}: {} vs {exact}", y[0]);
        }
        assert!(solution.stats.accepted >= grid.len() - 1);
    }

    #[test]
    fn test_harmonic_oscillator_returns_after_one_period() {
        let oscillator = |_t: f64, y: &Vector2<f64>| Vector2::new(y[1], -y[0]);
        let grid = linspace(0.0, 2.0 * std::f64::consts::PI, 50);
        let solution = solve(
            &oscillator,
            &grid,
            Vector2::new(1.0, 0.0),
            &SolverSettings::default(),
        )
        .unwrap();
        let last = solution.states.last().unwrap();
        assert!(f64::abs(last[0] - 1.0) < 1e-6);
        assert!(f64::abs(last[1]) < 1e-6);
        for y in &solution.states {
            assert!(f64::abs(y.norm_squared() - 1.0) < 1e-6);
        }
    }

    #[test]
    fn test_linear_invariant_is_preserved() {
        // A -> B -> C chain: the total never changes.
        let chain = |_t: f64, y: &Vector3<f64>| Vector3::new(-0.3 * y[0], 0.3 * y[0] - 0.1 * y[1], 0.1 * y[1]);
        let grid = linspace(0.0, 200.0, 1000);
        let solution = solve(
            &chain,
            &grid,
            Vector3::new(1000.0, 0.0, 0.0),
            &SolverSettings::default(),
        )
        .unwrap();
        for y in &solution.states {
            assert!(f64::abs(y.sum() - 1000.0) < 1e-9);
        }
        assert!(solution.states.last().unwrap()[2] > 999.0);
    }

    #[test]
    fn test_discontinuous_rhs() {
        // Rate switches at t = 1; the exact solution is piecewise exponential.
        let switched = |t: f64, y: &Vector1<f64>| {
            let rate = if t < 1.0 { 1.0 } else { -2.0 };
            y * rate
        };
        let grid = linspace(0.0, 2.0, 9);
        let solution = solve(&switched, &grid, Vector1::new(1.0), &SolverSettings::default()).unwrap();
        let exact = f64::exp(1.0) * f64::exp(-2.0);
        assert!(f64::abs(solution.states[8][0] - exact) < 1e-6);
    }

    #[test]
    fn test_single_point_grid() {
        let solution = solve(&decay, &[3.0], Vector1::new(4.0), &SolverSettings::default()).unwrap();
        assert_eq!(solution.times, vec![3.0]);
        assert_eq!(solution.states, vec![Vector1::new(4.0)]);
        assert_eq!(solution.stats, SolverStats::default());
    }

    #[test]
    fn test_invalid_grid() {
        let settings = SolverSettings::default();
        let y0 = Vector1::new(1.0);
        for grid in [vec![], vec![0.0, 1.0, 1.0], vec![1.0, 0.0], vec![0.0, f64::NAN]] {
            let err = solve(&decay, &grid, y0, &settings).unwrap_err();
            assert_eq!(err, SolverError::InvalidGrid);
        }
    }

    #[test]
    fn test_invalid_tolerance() {
        let settings = SolverSettings {
            rtol: 0.0,
            ..Default::default()
        };
        let err = solve(&decay, &[0.0, 1.0], Vector1::new(1.0), &settings).unwrap_err();
        assert!(matches!(err, SolverError::InvalidTolerance { .. }));
    }

    #[test]
    fn test_invalid_settings() {
        let defaults = SolverSettings::default();
        let cases = [
            SolverSettings { safety: 0.0, ..defaults.clone() },
            SolverSettings { safety: f64::NAN, ..defaults.clone() },
            SolverSettings { safety: 1.5, ..defaults.clone() },
            SolverSettings { min_factor: 5.0, max_factor: 1.0, ..defaults.clone() },
            SolverSettings { min_factor: 0.0, ..defaults.clone() },
            SolverSettings { max_factor: 0.5, ..defaults.clone() },
            SolverSettings { max_factor: f64::INFINITY, ..defaults.clone() },
            SolverSettings { initial_step: Some(-1.0), ..defaults.clone() },
            SolverSettings { initial_step: Some(f64::NAN), ..defaults.clone() },
            SolverSettings { max_step: Some(0.0), ..defaults.clone() },
        ];
        for settings in cases {
            let err = solve(&decay, &[0.0, 1.0], Vector1::new(1.0), &settings).unwrap_err();
            assert!(
                matches!(err, SolverError::InvalidSettings(_)),
                "{settings:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_step_factor_bounds_from_json() {
        let settings: SolverSettings =
            serde_json::from_str(r#"{ "min_factor": 5, "max_factor": 1 }"#).unwrap();
        let err = solve(&decay, &[0.0, 1.0], Vector1::new(1.0), &settings).unwrap_err();
        assert!(matches!(err, SolverError::InvalidSettings(_)));
    }

    #[test]
    fn test_max_steps_exceeded() {
        let settings = SolverSettings {
            max_steps: 1,
            ..Default::default()
        };
        let err = solve(&decay, &[0.0, 100.0], Vector1::new(1.0), &settings).unwrap_err();
        assert!(matches!(err, SolverError::MaxStepsExceeded { .. }));
    }

    #[test]
    fn test_non_finite_derivative() {
        let broken = |t: f64, y: &Vector1<f64>| if t > 1.0 { Vector1::new(f64::NAN) } else { y * -1.0 };
        let grid = linspace(0.0, 2.0, 5);
        let err = solve(&broken, &grid, Vector1::new(1.0), &SolverSettings::default()).unwrap_err();
        match err {
            SolverError::NonFinite { t } => assert!(t > 1.0),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_finite_time_blow_up_is_an_error() {
        // y' = y^2, y(0) = 1 blows up at t = 1.
        let blow_up = |_t: f64, y: &Vector1<f64>| y.component_mul(y);
        let settings = SolverSettings {
            max_steps: 100_000,
            ..Default::default()
        };
        assert!(solve(&blow_up, &[0.0, 2.0], Vector1::new(1.0), &settings).is_err());
    }

    #[test]
    fn test_deserialize_partial_settings() {
        let settings: SolverSettings = serde_json::from_str(r#"{ "rtol": 1e-6 }"#).unwrap();
        assert_eq!(settings.rtol, 1e-6);
        assert_eq!(settings.atol, SolverSettings::default().atol);
        assert!(serde_json::from_str::<SolverSettings>(r#"{ "order": 8 }"#).is_err());
    }
}
