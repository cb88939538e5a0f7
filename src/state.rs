//! The single live simulation state.
//!
//! Exactly one instance exists per run. It is owned and mutated exclusively
//! by the step integrator; clones are taken only for step-retry snapshots
//! and for read-only capture into result records.

use serde::{Deserialize, Serialize};

use crate::constants::FRESH_WATER_SG_FLOOR;
use crate::empirical::CorrelationTable;
use crate::error::{Result, SimError};
use crate::geometry::CavernProfile;
use crate::insolubles::InsolubleBed;
use crate::ledger::MassBalanceLedger;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationState {
    pub elapsed_h: f64,
    pub profile: CavernProfile,
    /// Brine specific gravity at each profile node.
    pub brine_sg: Vec<f64>,
    pub insolubles: InsolubleBed,
    /// Brine/product interface elevation; the product blanket above it
    /// blocks dissolution.
    pub obi_elevation_ft: f64,
    /// Cumulative product volume above the interface.
    pub product_volume_bbl: f64,
    pub ledger: MassBalanceLedger,
}

impl SimulationState {
    /// Assemble and validate the initial state for a run. The initial brine
    /// is well-mixed at `initial_brine_sg`; the cavern starts brine-full
    /// with the interface at the ceiling.
    pub fn initial(
        profile: CavernProfile,
        initial_brine_sg: f64,
        insolubles: InsolubleBed,
        ledger: MassBalanceLedger,
        table: &CorrelationTable,
        temperature_degc: f64,
    ) -> Result<SimulationState> {
        let sat_sg = table.saturated_sg(temperature_degc)?;
        if initial_brine_sg < FRESH_WATER_SG_FLOOR || initial_brine_sg > sat_sg {
            return Err(SimError::Configuration(format!(
                "initial brine sg {initial_brine_sg} outside [{FRESH_WATER_SG_FLOOR}, {sat_sg:.4}]"
            )));
        }
        let node_count = profile.node_count();
        let obi_elevation_ft = profile.ceiling_elevation_ft();
        Ok(SimulationState {
            elapsed_h: 0.0,
            brine_sg: vec![initial_brine_sg; node_count],
            profile,
            insolubles,
            obi_elevation_ft,
            product_volume_bbl: 0.0,
            ledger,
        })
    }

    /// Total cavern volume, bbl.
    pub fn cavern_volume_bbl(&self) -> f64 {
        self.profile.volume_bbl()
    }

    /// Fluid-occupied volume: everything except settled solids.
    pub fn fluid_volume_bbl(&self) -> f64 {
        self.cavern_volume_bbl() - self.insolubles.solid_volume_bbl()
    }

    /// Band volume per node in the active brine window (bed top to
    /// interface).
    pub fn active_band_volumes_bbl(&self) -> Vec<f64> {
        self.profile
            .node_band_volumes_bbl(self.insolubles.top_elevation_ft(), self.obi_elevation_ft)
    }

    /// Volume-weighted mean brine specific gravity over the active window.
    pub fn average_brine_sg(&self) -> f64 {
        let bands = self.active_band_volumes_bbl();
        let total: f64 = bands.iter().sum();
        if total <= 0.0 {
            return self.brine_sg.last().copied().unwrap_or(FRESH_WATER_SG_FLOOR);
        }
        self.brine_sg
            .iter()
            .zip(&bands)
            .map(|(sg, v)| sg * v)
            .sum::<f64>()
            / total
    }

    /// Brine sg at the node nearest an elevation.
    pub fn brine_sg_at(&self, z_ft: f64) -> f64 {
        self.brine_sg[self.profile.nearest_node(z_ft)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{DEFAULT_SEDIMENT_PACKING_FRACTION, DEFAULT_TEMPERATURE_DEGC};
    use crate::empirical::DEFAULT_TABLE;
    use approx::assert_abs_diff_eq;

    fn state() -> SimulationState {
        let profile = CavernProfile::cylinder(0.0, 100.0, 30.0, 11).unwrap();
        let bed = InsolubleBed::new(0.0, DEFAULT_SEDIMENT_PACKING_FRACTION, &profile).unwrap();
        let ledger = MassBalanceLedger::new(1e-4, 5).unwrap();
        SimulationState::initial(
            profile,
            1.003,
            bed,
            ledger,
            &DEFAULT_TABLE,
            DEFAULT_TEMPERATURE_DEGC,
        )
        .unwrap()
    }

    #[test]
    fn initial_state_is_brine_full_and_well_mixed() {
        let s = state();
        assert_eq!(s.elapsed_h, 0.0);
        assert_eq!(s.obi_elevation_ft, 100.0);
        assert!(s.brine_sg.iter().all(|&sg| sg == 1.003));
        assert_abs_diff_eq!(s.fluid_volume_bbl(), s.cavern_volume_bbl(), epsilon = 1e-9);
    }

    #[test]
    fn average_sg_of_uniform_brine_is_uniform() {
        let s = state();
        assert_abs_diff_eq!(s.average_brine_sg(), 1.003, epsilon = 1e-12);
        assert_abs_diff_eq!(s.brine_sg_at(55.0), 1.003, epsilon = 1e-12);
    }

    #[test]
    fn rejects_unphysical_initial_brine() {
        let profile = CavernProfile::cylinder(0.0, 100.0, 30.0, 11).unwrap();
        let bed = InsolubleBed::new(0.0, 0.6, &profile).unwrap();
        let ledger = MassBalanceLedger::new(1e-4, 5).unwrap();
        let too_heavy = SimulationState::initial(
            profile,
            1.5,
            bed,
            ledger,
            &DEFAULT_TABLE,
            DEFAULT_TEMPERATURE_DEGC,
        );
        assert!(too_heavy.is_err());
    }
}
