//! # Constants and type definitions for spice_pointing
//!
//! This module centralizes the **physical constants**, **conversion factors**, the
//! **well-known body/frame names** and the **type aliases** used throughout the crate.
//!
//! ## Overview
//!
//! - Speed of light and angle conversions
//! - Names bound automatically by every pointing builder
//! - Defaults of the instrument FOV keywords
//! - Core type aliases (times, angles, instrument codes)

// -------------------------------------------------------------------------------------------------
// Physical constants and unit conversions
// -------------------------------------------------------------------------------------------------

/// Speed of light in km/s
pub const VLIGHT: f64 = 2.99792458e5;

/// Degrees → radians
pub const RADEG: f64 = std::f64::consts::PI / 180.0;

/// Arcminutes → radians
pub const RADMIN: f64 = std::f64::consts::PI / 10_800.0;

/// Arcseconds → radians
pub const RADSEC: f64 = std::f64::consts::PI / 648_000.0;

/// Maximum number of light-time iterations performed by the analytic ephemeris
pub const MAX_LIGHT_TIME_ITERATIONS: usize = 10;

// -------------------------------------------------------------------------------------------------
// Well-known names
// -------------------------------------------------------------------------------------------------

/// Name of the Sun in ephemeris kernels
pub const SUN_NAME: &str = "SUN";

/// Name of the Earth in ephemeris kernels
pub const EARTH_NAME: &str = "EARTH";

/// Inertial frame used as the intermediary of every two-step rotation
pub const INERTIAL_FRAME_NAME: &str = "J2000";

/// Default FOV class spec when `INS<id>_FOV_CLASS_SPEC` is absent
pub const DEFAULT_FOV_CLASS_SPEC: &str = "CORNERS";

/// Default angle units when `INS<id>_FOV_ANGLE_UNITS` is absent
pub const DEFAULT_FOV_ANGLE_UNITS: &str = "DEGREES";

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Ephemeris time, TDB seconds past J2000
pub type EphemerisTime = f64;
/// Angle in radians
pub type Radian = f64;
/// Duration in seconds
pub type Second = f64;
/// NAIF integer code of an instrument
pub type InstrumentCode = i32;
