// Internal units: elevations and radii in feet, volumes in barrels,
// durations in hours, flowrates in bbl/day (constant stages) or bbl/hour
// (tabulated stages), concentrations as specific gravity, temperature in °C.
// All inputs arrive already normalized by the external unit layer.

pub const CUFT_PER_BBL: f64 = 9702.0 / 1728.0; // 42 US gal, exact in cubic inches
pub const HOURS_PER_DAY: f64 = 24.0;

/// Specific gravity of solid NaCl.
pub const RHO_NACL_SOLID_SG: f64 = 2.16;

// Solubility grid shape (wt% axis x temperature axis).
pub const WT_PCT_POINTS: usize = 15;
pub const TEMP_POINTS: usize = 10;

pub const RECESSION_COEFF_COUNT: usize = 6;
pub const WT_PCT_COEFF_COUNT: usize = 3;

/// Reference temperature for the recession-rate temperature factor.
pub const DISSOLUTION_REF_TEMP_DEGC: f64 = 23.0;
/// Exponential temperature sensitivity of the recession rate, per °C.
pub const DISSOLUTION_TEMP_COEFF: f64 = 0.0234;

/// Solid fraction of a settled insoluble bed (remainder is brine-filled pore
/// space). Bulk bed volume = solid volume / packing fraction.
pub const DEFAULT_SEDIMENT_PACKING_FRACTION: f64 = 0.6;

/// Volume fraction of insoluble material in the salt formation.
pub const DEFAULT_INSOLUBLE_FRACTION: f64 = 0.05;

/// Fraction of dissolved solid-salt volume that reappears as brine volume.
/// Dissolving 1 bbl of solid NaCl swells the brine by about 0.8 bbl.
pub const DISSOLVED_SALT_SWELL_FACTOR: f64 = 0.8;

// Stepping defaults.
pub const DEFAULT_TIME_STEP_H: f64 = 0.1;
pub const DEFAULT_BALANCE_TOLERANCE: f64 = 1.0e-4;
pub const DEFAULT_MAX_CONSECUTIVE_VIOLATIONS: u32 = 5;
pub const DEFAULT_MAX_STEP_SHORTENINGS: u32 = 8;
pub const DEFAULT_TEMPERATURE_DEGC: f64 = 23.0;

/// Floor for the relative-residual denominator so near-zero-flow steps do
/// not divide by zero.
pub const MIN_STEP_REFERENCE_BBL: f64 = 1.0;

/// Lower bound on brine specific gravity accepted as a physical state.
pub const FRESH_WATER_SG_FLOOR: f64 = 0.95;

/// Slack applied when checking concentration bounds after a trial step.
pub const SG_BOUNDS_SLACK: f64 = 1.0e-9;

/// Elevations closer than this are treated as coincident.
pub const ELEVATION_EPS_FT: f64 = 1.0e-9;

/// Stage-time remainders below this many hours are considered complete.
pub const STAGE_TIME_EPS_H: f64 = 1.0e-9;
