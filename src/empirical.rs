//! Empirical correlations for NaCl brine and salt dissolution.
//!
//! Holds the calibrated solubility grid (specific gravity indexed by weight
//! percent and temperature), the saturation curves, the recession-rate
//! coefficient vector, and the weight-percent-from-density coefficient
//! vector. Tables are immutable after construction and shared read-only by
//! every step of a run.

use once_cell::sync::Lazy;
use tracing::warn;

use crate::constants::{
    DISSOLUTION_REF_TEMP_DEGC, DISSOLUTION_TEMP_COEFF, RECESSION_COEFF_COUNT, TEMP_POINTS,
    WT_PCT_COEFF_COUNT, WT_PCT_POINTS,
};
use crate::error::{Result, SimError};
use crate::math_utils::{interp_clamped, inverse_lerp, lerp, poly_eval};

/// Weight-percent axis of the solubility grid.
pub const WT_PCT_AXIS: [f64; WT_PCT_POINTS] = [
    0.0, 1.0, 2.0, 4.0, 6.0, 8.0, 10.0, 12.0, 14.0, 16.0, 18.0, 20.0, 22.0, 24.0, 26.0,
];

/// Temperature axis of the solubility grid, °C.
pub const TEMP_AXIS_DEGC: [f64; TEMP_POINTS] =
    [0.0, 10.0, 20.0, 25.0, 30.0, 40.0, 50.0, 60.0, 80.0, 100.0];

/// Calibrated wall recession-rate coefficients, ascending powers of the
/// undersaturation fraction, ft/h at the reference temperature.
pub const RECESSION_RATE_COEFFS: [f64; RECESSION_COEFF_COUNT] =
    [0.0, 2.1e-2, 4.6e-2, -2.9e-2, 1.4e-2, -3.0e-3];

/// Calibrated weight-percent-from-specific-gravity coefficients, ascending
/// powers of sg.
pub const WT_PCT_FROM_SG_COEFFS: [f64; WT_PCT_COEFF_COUNT] = [-213.81, 285.09, -71.02];

fn water_sg(temp_degc: f64) -> f64 {
    poly_eval(&[0.9998, 3.5e-5, -6.0e-6, 1.5e-8], temp_degc)
}

/// Calibration form behind the default solubility grid: brine specific
/// gravity as a function of wt% NaCl and temperature.
fn brine_sg(wt_pct: f64, temp_degc: f64) -> f64 {
    water_sg(temp_degc) + 6.9956e-3 * wt_pct + 2.524e-5 * wt_pct * wt_pct
        - 2.0e-6 * wt_pct * (temp_degc - 20.0)
}

/// Saturation weight percent of NaCl in water at `temp_degc`.
fn saturation_wt_pct(temp_degc: f64) -> f64 {
    poly_eval(&[26.3, 1.2e-2, 7.0e-5], temp_degc)
}

/// What to do when a lookup falls outside the calibrated domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RangePolicy {
    /// Clamp to the nearest boundary and log a warning.
    #[default]
    ClampAndWarn,
    /// Fail the lookup; fatal for the active stage.
    Strict,
}

#[derive(Debug, Clone)]
pub struct CorrelationTable {
    wt_pct_axis: [f64; WT_PCT_POINTS],
    temp_axis: [f64; TEMP_POINTS],
    sg_grid: [[f64; TEMP_POINTS]; WT_PCT_POINTS],
    wt_pct_sat: [f64; TEMP_POINTS],
    sg_sat: [f64; TEMP_POINTS],
    recession_coeffs: [f64; RECESSION_COEFF_COUNT],
    wt_pct_coeffs: [f64; WT_PCT_COEFF_COUNT],
    sg_min: f64,
    sg_max: f64,
    policy: RangePolicy,
}

/// Default calibrated table, built once at process start.
pub static DEFAULT_TABLE: Lazy<CorrelationTable> =
    Lazy::new(|| CorrelationTable::calibrated(RangePolicy::ClampAndWarn));

impl CorrelationTable {
    /// Build the default calibrated table with the given range policy.
    pub fn calibrated(policy: RangePolicy) -> CorrelationTable {
        let mut sg_grid = [[0.0; TEMP_POINTS]; WT_PCT_POINTS];
        for (i, &wt) in WT_PCT_AXIS.iter().enumerate() {
            for (j, &t) in TEMP_AXIS_DEGC.iter().enumerate() {
                sg_grid[i][j] = brine_sg(wt, t);
            }
        }
        let mut wt_pct_sat = [0.0; TEMP_POINTS];
        let mut sg_sat = [0.0; TEMP_POINTS];
        for (j, &t) in TEMP_AXIS_DEGC.iter().enumerate() {
            wt_pct_sat[j] = saturation_wt_pct(t);
            sg_sat[j] = brine_sg(wt_pct_sat[j], t);
        }
        // Constructed from a validated closed form, so this cannot fail.
        Self::new(
            WT_PCT_AXIS,
            TEMP_AXIS_DEGC,
            sg_grid,
            wt_pct_sat,
            sg_sat,
            RECESSION_RATE_COEFFS,
            WT_PCT_FROM_SG_COEFFS,
            policy,
        )
        .unwrap_or_else(|e| panic!("default correlation table is invalid: {e}"))
    }

    /// Build a table from externally supplied calibration data.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        wt_pct_axis: [f64; WT_PCT_POINTS],
        temp_axis: [f64; TEMP_POINTS],
        sg_grid: [[f64; TEMP_POINTS]; WT_PCT_POINTS],
        wt_pct_sat: [f64; TEMP_POINTS],
        sg_sat: [f64; TEMP_POINTS],
        recession_coeffs: [f64; RECESSION_COEFF_COUNT],
        wt_pct_coeffs: [f64; WT_PCT_COEFF_COUNT],
        policy: RangePolicy,
    ) -> Result<CorrelationTable> {
        for axis in [&wt_pct_axis[..], &temp_axis[..]] {
            if axis.windows(2).any(|w| w[1] <= w[0]) {
                return Err(SimError::Configuration(
                    "correlation axis values must be strictly increasing".to_string(),
                ));
            }
        }
        let mut sg_min = f64::INFINITY;
        let mut sg_max = f64::NEG_INFINITY;
        for row in &sg_grid {
            for &sg in row {
                if !sg.is_finite() || sg <= 0.0 {
                    return Err(SimError::Configuration(format!(
                        "solubility grid entry {sg} is not a positive finite specific gravity"
                    )));
                }
                sg_min = sg_min.min(sg);
                sg_max = sg_max.max(sg);
            }
        }
        for &sg in &sg_sat {
            sg_max = sg_max.max(sg);
        }
        Ok(CorrelationTable {
            wt_pct_axis,
            temp_axis,
            sg_grid,
            wt_pct_sat,
            sg_sat,
            recession_coeffs,
            wt_pct_coeffs,
            sg_min,
            sg_max,
            policy,
        })
    }

    pub fn with_policy(mut self, policy: RangePolicy) -> CorrelationTable {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> RangePolicy {
        self.policy
    }

    /// Bilinear interpolation of brine specific gravity at (wt%, °C).
    pub fn solubility(&self, wt_pct: f64, temp_degc: f64) -> Result<f64> {
        let wt = self.admit("weight percent", wt_pct, self.wt_pct_axis[0], self.wt_pct_axis[WT_PCT_POINTS - 1])?;
        let t = self.admit("temperature", temp_degc, self.temp_axis[0], self.temp_axis[TEMP_POINTS - 1])?;

        let (i0, i1, fx) = bracket(&self.wt_pct_axis, wt);
        let (j0, j1, fy) = bracket(&self.temp_axis, t);
        let lo = lerp(self.sg_grid[i0][j0], self.sg_grid[i1][j0], fx);
        let hi = lerp(self.sg_grid[i0][j1], self.sg_grid[i1][j1], fx);
        Ok(lerp(lo, hi, fy))
    }

    /// Saturation weight percent at `temp_degc`, from the saturation curve.
    pub fn saturated_wt_pct(&self, temp_degc: f64) -> Result<f64> {
        let t = self.admit("temperature", temp_degc, self.temp_axis[0], self.temp_axis[TEMP_POINTS - 1])?;
        let (v, _) = interp_clamped(&self.temp_axis, &self.wt_pct_sat, t);
        Ok(v)
    }

    /// Saturated brine specific gravity at `temp_degc`.
    pub fn saturated_sg(&self, temp_degc: f64) -> Result<f64> {
        let t = self.admit("temperature", temp_degc, self.temp_axis[0], self.temp_axis[TEMP_POINTS - 1])?;
        let (v, _) = interp_clamped(&self.temp_axis, &self.sg_sat, t);
        Ok(v)
    }

    /// Wall recession rate in ft/h for a local undersaturation fraction
    /// (0 = saturated brine, 1 = fresh water) at `temp_degc`.
    pub fn recession_rate(&self, undersaturation: f64, temp_degc: f64) -> Result<f64> {
        let x = self.admit("undersaturation", undersaturation, 0.0, 1.0)?;
        let t = self.admit("temperature", temp_degc, self.temp_axis[0], self.temp_axis[TEMP_POINTS - 1])?;
        let theta = (DISSOLUTION_TEMP_COEFF * (t - DISSOLUTION_REF_TEMP_DEGC)).exp();
        Ok((poly_eval(&self.recession_coeffs, x) * theta).max(0.0))
    }

    /// Weight percent NaCl from brine specific gravity.
    pub fn wt_pct_from_sg(&self, sg: f64) -> Result<f64> {
        let sg = self.admit("specific gravity", sg, self.sg_min, self.sg_max)?;
        Ok(poly_eval(&self.wt_pct_coeffs, sg).max(0.0))
    }

    /// Calibrated specific-gravity domain `(min, max)`.
    pub fn sg_domain(&self) -> (f64, f64) {
        (self.sg_min, self.sg_max)
    }

    pub fn grid_shape(&self) -> (usize, usize) {
        (WT_PCT_POINTS, TEMP_POINTS)
    }

    pub fn sg_grid(&self) -> &[[f64; TEMP_POINTS]; WT_PCT_POINTS] {
        &self.sg_grid
    }

    pub fn wt_pct_axis(&self) -> &[f64; WT_PCT_POINTS] {
        &self.wt_pct_axis
    }

    pub fn temp_axis(&self) -> &[f64; TEMP_POINTS] {
        &self.temp_axis
    }

    pub fn recession_coeffs(&self) -> &[f64; RECESSION_COEFF_COUNT] {
        &self.recession_coeffs
    }

    pub fn wt_pct_coeffs(&self) -> &[f64; WT_PCT_COEFF_COUNT] {
        &self.wt_pct_coeffs
    }

    pub fn saturation_curves(&self) -> (&[f64; TEMP_POINTS], &[f64; TEMP_POINTS]) {
        (&self.wt_pct_sat, &self.sg_sat)
    }

    fn admit(&self, quantity: &'static str, value: f64, min: f64, max: f64) -> Result<f64> {
        if value >= min && value <= max {
            return Ok(value);
        }
        match self.policy {
            RangePolicy::Strict => Err(SimError::CorrelationRange {
                quantity,
                value,
                min,
                max,
            }),
            RangePolicy::ClampAndWarn => {
                let clamped = value.clamp(min, max);
                warn!(quantity, value, min, max, "correlation input clamped to calibrated range");
                Ok(clamped)
            }
        }
    }
}

/// Bracketing indices and interpolation fraction for `x` on a strictly
/// increasing axis; `x` must already lie within the axis span.
fn bracket(axis: &[f64], x: f64) -> (usize, usize, f64) {
    let last = axis.len() - 1;
    if x <= axis[0] {
        return (0, 0, 0.0);
    }
    if x >= axis[last] {
        return (last, last, 0.0);
    }
    let hi = axis.partition_point(|&a| a < x).max(1);
    let lo = hi - 1;
    (lo, hi, inverse_lerp(axis[lo], axis[hi], x))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::RHO_NACL_SOLID_SG;
    use approx::assert_abs_diff_eq;
    use more_asserts::{assert_ge, assert_le};

    #[test]
    fn solid_salt_density() {
        assert_eq!(RHO_NACL_SOLID_SG, 2.16);
    }

    #[test]
    fn coefficient_vector_lengths() {
        assert_eq!(RECESSION_RATE_COEFFS.len(), 6);
        assert_eq!(WT_PCT_FROM_SG_COEFFS.len(), 3);
    }

    #[test]
    fn sg_grid_shape_and_range() {
        let table = &*DEFAULT_TABLE;
        assert_eq!(table.grid_shape(), (15, 10));
        let (min, max) = table.sg_domain();
        assert_ge!(min, 0.958);
        assert_le!(max, 1.208);
    }

    #[test]
    fn axis_ranges() {
        assert_eq!(WT_PCT_AXIS.len(), 15);
        assert_eq!(TEMP_AXIS_DEGC.len(), 10);
        assert_ge!(WT_PCT_AXIS[0], 0.0);
        assert_le!(WT_PCT_AXIS[14], 26.0);
        assert_ge!(TEMP_AXIS_DEGC[0], 0.0);
        assert_le!(TEMP_AXIS_DEGC[9], 100.0);
    }

    #[test]
    fn saturation_vectors_have_temperature_length() {
        let (wt_sat, sg_sat) = DEFAULT_TABLE.saturation_curves();
        assert_eq!(wt_sat.len(), 10);
        assert_eq!(sg_sat.len(), 10);
    }

    #[test]
    fn solubility_is_exact_on_grid_nodes() {
        let table = &*DEFAULT_TABLE;
        for (i, &wt) in table.wt_pct_axis().iter().enumerate() {
            for (j, &t) in table.temp_axis().iter().enumerate() {
                let sg = table.solubility(wt, t).unwrap();
                assert_abs_diff_eq!(sg, table.sg_grid()[i][j], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn solubility_increases_with_salinity() {
        let table = &*DEFAULT_TABLE;
        let fresh = table.solubility(0.0, 23.0).unwrap();
        let mid = table.solubility(13.0, 23.0).unwrap();
        let strong = table.solubility(25.0, 23.0).unwrap();
        more_asserts::assert_gt!(mid, fresh);
        more_asserts::assert_gt!(strong, mid);
    }

    #[test]
    fn wt_pct_round_trip_through_grid() {
        let table = &*DEFAULT_TABLE;
        for wt in [0.0, 5.0, 13.0, 20.0, 26.0] {
            let sg = table.solubility(wt, 20.0).unwrap();
            let back = table.wt_pct_from_sg(sg).unwrap();
            // The wt% law is an independent fit, not an exact inverse.
            assert_abs_diff_eq!(back, wt, epsilon = 0.25);
        }
    }

    #[test]
    fn recession_rate_monotonic_in_undersaturation() {
        let table = &*DEFAULT_TABLE;
        let mut prev = table.recession_rate(0.0, 23.0).unwrap();
        assert_abs_diff_eq!(prev, 0.0, epsilon = 1e-12);
        for k in 1..=10 {
            let x = k as f64 / 10.0;
            let r = table.recession_rate(x, 23.0).unwrap();
            more_asserts::assert_gt!(r, prev, "rate must grow with undersaturation");
            prev = r;
        }
    }

    #[test]
    fn recession_rate_grows_with_temperature() {
        let table = &*DEFAULT_TABLE;
        let cold = table.recession_rate(1.0, 10.0).unwrap();
        let hot = table.recession_rate(1.0, 60.0).unwrap();
        more_asserts::assert_gt!(hot, cold);
    }

    #[test]
    fn clamp_policy_recovers_out_of_range_inputs() {
        let table = &*DEFAULT_TABLE;
        let at_edge = table.solubility(26.0, 20.0).unwrap();
        let beyond = table.solubility(40.0, 20.0).unwrap();
        assert_abs_diff_eq!(beyond, at_edge, epsilon = 1e-12);
    }

    #[test]
    fn strict_policy_rejects_out_of_range_inputs() {
        let table = CorrelationTable::calibrated(RangePolicy::Strict);
        let err = table.solubility(40.0, 20.0).unwrap_err();
        match err {
            SimError::CorrelationRange { quantity, .. } => {
                assert_eq!(quantity, "weight percent");
            }
            other => panic!("expected CorrelationRange, got {other:?}"),
        }
        assert!(table.recession_rate(1.5, 20.0).is_err());
        assert!(table.wt_pct_from_sg(2.0).is_err());
    }

    #[test]
    fn saturated_sg_sits_above_grid_interior() {
        let table = &*DEFAULT_TABLE;
        let sat = table.saturated_sg(20.0).unwrap();
        let interior = table.solubility(20.0, 20.0).unwrap();
        more_asserts::assert_gt!(sat, interior);
        let wt_sat = table.saturated_wt_pct(20.0).unwrap();
        assert_ge!(wt_sat, 26.0);
    }
}
