//! Discretized cavern wall geometry.
//!
//! The cavern is an ordered sequence of (elevation, radius) nodes with
//! strictly increasing elevations; the wall between adjacent nodes is a
//! conical frustum. Only the step integrator mutates radii, in a single
//! sequential pass per time step; node elevations are fixed references that
//! never move.

use serde::{Deserialize, Serialize};

use crate::constants::ELEVATION_EPS_FT;
use crate::error::{Result, SimError};
use crate::math_utils::{frustum_volume_bbl, inverse_lerp, lerp};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfileNode {
    pub elevation_ft: f64,
    pub radius_ft: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CavernProfile {
    nodes: Vec<ProfileNode>,
}

impl CavernProfile {
    /// Validate and take ownership of an ordered node list.
    pub fn new(nodes: Vec<ProfileNode>) -> Result<CavernProfile> {
        if nodes.len() < 2 {
            return Err(SimError::Configuration(
                "cavern profile needs at least two nodes".to_string(),
            ));
        }
        for pair in nodes.windows(2) {
            if pair[1].elevation_ft <= pair[0].elevation_ft {
                return Err(SimError::Configuration(format!(
                    "profile elevations must be strictly increasing ({} then {})",
                    pair[0].elevation_ft, pair[1].elevation_ft
                )));
            }
        }
        if let Some(bad) = nodes
            .iter()
            .find(|n| !n.radius_ft.is_finite() || n.radius_ft < 0.0)
        {
            return Err(SimError::Configuration(format!(
                "negative or non-finite radius {} at elevation {}",
                bad.radius_ft, bad.elevation_ft
            )));
        }
        Ok(CavernProfile { nodes })
    }

    /// Convenience constructor for an upright cylinder.
    pub fn cylinder(floor_ft: f64, height_ft: f64, radius_ft: f64, node_count: usize) -> Result<CavernProfile> {
        if height_ft <= 0.0 || node_count < 2 {
            return Err(SimError::Configuration(
                "cylinder needs positive height and at least two nodes".to_string(),
            ));
        }
        let nodes = (0..node_count)
            .map(|i| ProfileNode {
                elevation_ft: floor_ft + height_ft * i as f64 / (node_count - 1) as f64,
                radius_ft,
            })
            .collect();
        CavernProfile::new(nodes)
    }

    pub fn nodes(&self) -> &[ProfileNode] {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn floor_elevation_ft(&self) -> f64 {
        self.nodes[0].elevation_ft
    }

    pub fn ceiling_elevation_ft(&self) -> f64 {
        self.nodes[self.nodes.len() - 1].elevation_ft
    }

    pub fn contains_elevation(&self, z_ft: f64) -> bool {
        z_ft >= self.floor_elevation_ft() - ELEVATION_EPS_FT
            && z_ft <= self.ceiling_elevation_ft() + ELEVATION_EPS_FT
    }

    /// Grow one node's radius. Shrinking below zero is clamped: dissolution
    /// never removes a node, only the bed can cover it.
    pub fn apply_radial_growth(&mut self, node_index: usize, delta_radius_ft: f64) {
        let node = &mut self.nodes[node_index];
        node.radius_ft = (node.radius_ft + delta_radius_ft).max(0.0);
    }

    /// Interpolated wall radius at an arbitrary elevation inside the span.
    pub fn radius_at(&self, z_ft: f64) -> f64 {
        if z_ft <= self.floor_elevation_ft() {
            return self.nodes[0].radius_ft;
        }
        if z_ft >= self.ceiling_elevation_ft() {
            return self.nodes[self.nodes.len() - 1].radius_ft;
        }
        let hi = self
            .nodes
            .partition_point(|n| n.elevation_ft < z_ft)
            .max(1);
        let (a, b) = (&self.nodes[hi - 1], &self.nodes[hi]);
        let ratio = inverse_lerp(a.elevation_ft, b.elevation_ft, z_ft);
        lerp(a.radius_ft, b.radius_ft, ratio)
    }

    /// Total cavern volume in barrels: frustum integration over all bands.
    pub fn volume_bbl(&self) -> f64 {
        self.nodes
            .windows(2)
            .map(|w| frustum_volume_bbl(w[0].radius_ft, w[1].radius_ft, w[1].elevation_ft - w[0].elevation_ft))
            .sum()
    }

    /// Volume between two elevations, clipping partial bands with
    /// interpolated radii at the cut planes.
    pub fn volume_between_bbl(&self, z_lo_ft: f64, z_hi_ft: f64) -> f64 {
        if z_hi_ft - z_lo_ft <= ELEVATION_EPS_FT {
            return 0.0;
        }
        let lo = z_lo_ft.max(self.floor_elevation_ft());
        let hi = z_hi_ft.min(self.ceiling_elevation_ft());
        if hi - lo <= ELEVATION_EPS_FT {
            return 0.0;
        }
        let mut total = 0.0;
        for w in self.nodes.windows(2) {
            let band_lo = w[0].elevation_ft.max(lo);
            let band_hi = w[1].elevation_ft.min(hi);
            if band_hi - band_lo <= ELEVATION_EPS_FT {
                continue;
            }
            let r_lo = self.radius_at(band_lo);
            let r_hi = self.radius_at(band_hi);
            total += frustum_volume_bbl(r_lo, r_hi, band_hi - band_lo);
        }
        total
    }

    /// Elevation `z` above `z_floor_ft` such that the contained volume
    /// equals `volume_bbl`. Used for bed-top and interface tracking.
    ///
    /// Saturates at the cavern ceiling if the volume exceeds what is
    /// available. Solved per band with deterministic bisection.
    pub fn elevation_at_volume_above(&self, z_floor_ft: f64, volume_bbl: f64) -> f64 {
        if volume_bbl <= 0.0 {
            return z_floor_ft.max(self.floor_elevation_ft());
        }
        let mut remaining = volume_bbl;
        let mut z = z_floor_ft.max(self.floor_elevation_ft());
        let ceiling = self.ceiling_elevation_ft();
        while z < ceiling - ELEVATION_EPS_FT {
            let band_hi = self.next_node_above(z);
            let band_vol = self.volume_between_bbl(z, band_hi);
            if band_vol < remaining {
                remaining -= band_vol;
                z = band_hi;
                continue;
            }
            // The target lies inside this band: bisect on the cut height.
            let mut lo = z;
            let mut hi = band_hi;
            for _ in 0..60 {
                let mid = 0.5 * (lo + hi);
                if self.volume_between_bbl(z, mid) < remaining {
                    lo = mid;
                } else {
                    hi = mid;
                }
            }
            return 0.5 * (lo + hi);
        }
        ceiling
    }

    /// Mirror of `elevation_at_volume_above` measured down from a reference
    /// elevation; used to place the brine/product interface under a product
    /// blanket of known volume.
    pub fn elevation_at_volume_below(&self, z_top_ft: f64, volume_bbl: f64) -> f64 {
        if volume_bbl <= 0.0 {
            return z_top_ft.min(self.ceiling_elevation_ft());
        }
        let floor = self.floor_elevation_ft();
        let top = z_top_ft.min(self.ceiling_elevation_ft());
        if self.volume_between_bbl(floor, top) <= volume_bbl {
            return floor;
        }
        let mut lo = floor;
        let mut hi = top;
        for _ in 0..60 {
            let mid = 0.5 * (lo + hi);
            if self.volume_between_bbl(mid, top) > volume_bbl {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        0.5 * (lo + hi)
    }

    fn next_node_above(&self, z_ft: f64) -> f64 {
        for n in &self.nodes {
            if n.elevation_ft > z_ft + ELEVATION_EPS_FT {
                return n.elevation_ft;
            }
        }
        self.ceiling_elevation_ft()
    }

    /// Index of the node nearest to an elevation.
    pub fn nearest_node(&self, z_ft: f64) -> usize {
        let mut best = 0;
        let mut best_dist = f64::INFINITY;
        for (i, n) in self.nodes.iter().enumerate() {
            let d = (n.elevation_ft - z_ft).abs();
            if d < best_dist {
                best_dist = d;
                best = i;
            }
        }
        best
    }

    /// Half-band volume attributed to each node, clipped to
    /// `[z_lo_ft, z_hi_ft]`. Nodes outside the window get zero. The sum of
    /// the weights equals the clipped cavern volume.
    pub fn node_band_volumes_bbl(&self, z_lo_ft: f64, z_hi_ft: f64) -> Vec<f64> {
        let mut volumes = vec![0.0; self.nodes.len()];
        for (i, pair) in self.nodes.windows(2).enumerate() {
            let mid = 0.5 * (pair[0].elevation_ft + pair[1].elevation_ft);
            let lower = self.volume_between_bbl(pair[0].elevation_ft.max(z_lo_ft), mid.min(z_hi_ft));
            let upper = self.volume_between_bbl(mid.max(z_lo_ft), pair[1].elevation_ft.min(z_hi_ft));
            volumes[i] += lower;
            volumes[i + 1] += upper;
        }
        volumes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::CUFT_PER_BBL;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn cylinder_100ft() -> CavernProfile {
        CavernProfile::cylinder(0.0, 100.0, 30.0, 11).unwrap()
    }

    #[test]
    fn rejects_bad_profiles() {
        assert!(CavernProfile::new(vec![]).is_err());
        let unordered = vec![
            ProfileNode { elevation_ft: 10.0, radius_ft: 5.0 },
            ProfileNode { elevation_ft: 10.0, radius_ft: 5.0 },
        ];
        assert!(CavernProfile::new(unordered).is_err());
        let negative = vec![
            ProfileNode { elevation_ft: 0.0, radius_ft: -1.0 },
            ProfileNode { elevation_ft: 10.0, radius_ft: 5.0 },
        ];
        assert!(CavernProfile::new(negative).is_err());
    }

    #[test]
    fn cylinder_volume_matches_closed_form() {
        let profile = cylinder_100ft();
        let expected = std::f64::consts::PI * 30.0 * 30.0 * 100.0 / CUFT_PER_BBL;
        assert_relative_eq!(profile.volume_bbl(), expected, max_relative = 1e-12);
    }

    #[test]
    fn volume_between_splits_cleanly() {
        let profile = cylinder_100ft();
        let whole = profile.volume_bbl();
        let lower = profile.volume_between_bbl(0.0, 37.5);
        let upper = profile.volume_between_bbl(37.5, 100.0);
        assert_relative_eq!(lower + upper, whole, max_relative = 1e-10);
    }

    #[test]
    fn radius_interpolates_between_nodes() {
        let profile = CavernProfile::new(vec![
            ProfileNode { elevation_ft: 0.0, radius_ft: 10.0 },
            ProfileNode { elevation_ft: 100.0, radius_ft: 30.0 },
        ])
        .unwrap();
        assert_abs_diff_eq!(profile.radius_at(50.0), 20.0, epsilon = 1e-12);
        assert_abs_diff_eq!(profile.radius_at(-5.0), 10.0, epsilon = 1e-12);
        assert_abs_diff_eq!(profile.radius_at(500.0), 30.0, epsilon = 1e-12);
    }

    #[test]
    fn growth_clamps_at_zero_radius() {
        let mut profile = cylinder_100ft();
        profile.apply_radial_growth(0, -100.0);
        assert_eq!(profile.nodes()[0].radius_ft, 0.0);
        profile.apply_radial_growth(0, 2.5);
        assert_abs_diff_eq!(profile.nodes()[0].radius_ft, 2.5, epsilon = 1e-12);
    }

    #[test]
    fn elevation_at_volume_inverts_volume_between() {
        let profile = cylinder_100ft();
        let v = profile.volume_between_bbl(0.0, 42.0);
        let z = profile.elevation_at_volume_above(0.0, v);
        assert_abs_diff_eq!(z, 42.0, epsilon = 1e-6);

        // Saturates at the ceiling when overfilled.
        let z = profile.elevation_at_volume_above(0.0, profile.volume_bbl() * 2.0);
        assert_abs_diff_eq!(z, 100.0, epsilon = 1e-9);
    }

    #[test]
    fn elevation_at_volume_below_places_interface() {
        let profile = cylinder_100ft();
        let v = profile.volume_between_bbl(80.0, 100.0);
        let z = profile.elevation_at_volume_below(100.0, v);
        assert_abs_diff_eq!(z, 80.0, epsilon = 1e-6);
    }

    #[test]
    fn band_volumes_partition_the_window() {
        let profile = cylinder_100ft();
        let bands = profile.node_band_volumes_bbl(20.0, 80.0);
        let total: f64 = bands.iter().sum();
        assert_relative_eq!(
            total,
            profile.volume_between_bbl(20.0, 80.0),
            max_relative = 1e-9
        );
        // Nodes fully outside the window carry no weight.
        assert_eq!(bands[0], 0.0);
        assert_eq!(bands[10], 0.0);
    }
}
