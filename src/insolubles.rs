//! Insoluble sediment accumulation.
//!
//! Undissolved material released from the leached wall settles to the cavern
//! floor. The bed's solid volume only ever grows; removal is an operational
//! event outside the modeled physics. The bed top is the effective floor for
//! both dissolution and active brine volume.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::geometry::CavernProfile;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsolubleBed {
    solid_volume_bbl: f64,
    top_elevation_ft: f64,
    /// Solid fraction of the settled bed; pore space holds trapped brine.
    packing_fraction: f64,
}

impl InsolubleBed {
    pub fn new(
        initial_solid_bbl: f64,
        packing_fraction: f64,
        profile: &CavernProfile,
    ) -> Result<InsolubleBed> {
        if !(0.0..=1.0).contains(&packing_fraction) || packing_fraction <= 0.0 {
            return Err(SimError::Configuration(format!(
                "sediment packing fraction {packing_fraction} must be in (0, 1]"
            )));
        }
        if initial_solid_bbl < 0.0 {
            return Err(SimError::Configuration(format!(
                "initial insoluble volume {initial_solid_bbl} is negative"
            )));
        }
        let mut bed = InsolubleBed {
            solid_volume_bbl: initial_solid_bbl,
            top_elevation_ft: profile.floor_elevation_ft(),
            packing_fraction,
        };
        bed.settle(profile);
        Ok(bed)
    }

    /// Add settled solids and recompute the bed top from the profile.
    /// Sediment volume is monotonic non-decreasing.
    pub fn accumulate(&mut self, delta_solid_bbl: f64, profile: &CavernProfile) -> Result<()> {
        if delta_solid_bbl < 0.0 {
            return Err(SimError::Configuration(format!(
                "insoluble accumulation {delta_solid_bbl} cannot be negative"
            )));
        }
        self.solid_volume_bbl += delta_solid_bbl;
        self.settle(profile);
        Ok(())
    }

    /// Recompute the bed-top elevation; called after accumulation and after
    /// the integrator has grown the geometry under the bed.
    pub fn settle(&mut self, profile: &CavernProfile) {
        self.top_elevation_ft =
            profile.elevation_at_volume_above(profile.floor_elevation_ft(), self.bulk_volume_bbl());
    }

    pub fn solid_volume_bbl(&self) -> f64 {
        self.solid_volume_bbl
    }

    /// Bulk bed volume: solids plus brine-filled pore space.
    pub fn bulk_volume_bbl(&self) -> f64 {
        self.solid_volume_bbl / self.packing_fraction
    }

    pub fn top_elevation_ft(&self) -> f64 {
        self.top_elevation_ft
    }

    pub fn packing_fraction(&self) -> f64 {
        self.packing_fraction
    }
}
