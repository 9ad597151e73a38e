//! # Instrument pointing
//!
//! The query façade of the crate:
//!
//! * [`InstrumentPointing`] – the geometry of one instrument at one instant, every
//!   vector expressed in the target body-fixed frame.
//! * [`PointingProvider`] – answers "what is the pointing of instrument *I* at time *t*?".
//!
//! The kernel-backed implementations live in the sub-modules:
//!
//! * [`builder::SpicePointingProviderBuilder`] discovers instruments from the kernel
//!   pool, binds the identifiers the ephemeris toolkit needs and builds a provider.
//! * [`provider::SpicePointingProvider`] memoizes one snapshot per
//!   (time, instrument frame, target frame).
//! * [`snapshot::SpiceInstrumentPointing`] computes each derived quantity lazily, once.
//!
//! ## Example
//!
//! ```rust,ignore
//! use spice_pointing::pointing::{InstrumentPointing, PointingProvider};
//!
//! let pointing = provider.provide("DART_DRACO", et)?;
//! let boresight = pointing.boresight()?;
//! let sun = pointing.position(&provider.sun_id())?;
//! ```
pub mod builder;
pub mod provider;
pub mod snapshot;

use std::sync::Arc;

use nalgebra::{Matrix3, Vector3};

use crate::{constants::EphemerisTime, ids::EphemerisId, pointing_errors::PointingError};

/// Geometry of one instrument at one instant.
///
/// Positions are relative to the target body; all vectors and the rotation target the
/// body-fixed frame of the target.
pub trait InstrumentPointing {
    /// Query time (ET) at the spacecraft.
    fn time(&self) -> EphemerisTime;

    fn sc_position(&self) -> Result<Vector3<f64>, PointingError>;

    fn sc_velocity(&self) -> Result<Vector3<f64>, PointingError>;

    /// Spacecraft frame → target frame.
    fn sc_rotation(&self) -> Result<Matrix3<f64>, PointingError>;

    /// Position of `body` relative to the target, when the light left the target.
    fn position(&self, body: &EphemerisId) -> Result<Vector3<f64>, PointingError>;

    /// Unit boresight.
    fn boresight(&self) -> Result<Vector3<f64>, PointingError>;

    /// Unit up direction.
    fn up_direction(&self) -> Result<Vector3<f64>, PointingError>;

    /// The four unit frustum corners.
    fn frustum(&self) -> Result<[Vector3<f64>; 4], PointingError>;
}

impl<T: InstrumentPointing + ?Sized> InstrumentPointing for Arc<T> {
    fn time(&self) -> EphemerisTime {
        (**self).time()
    }

    fn sc_position(&self) -> Result<Vector3<f64>, PointingError> {
        (**self).sc_position()
    }

    fn sc_velocity(&self) -> Result<Vector3<f64>, PointingError> {
        (**self).sc_velocity()
    }

    fn sc_rotation(&self) -> Result<Matrix3<f64>, PointingError> {
        (**self).sc_rotation()
    }

    fn position(&self, body: &EphemerisId) -> Result<Vector3<f64>, PointingError> {
        (**self).position(body)
    }

    fn boresight(&self) -> Result<Vector3<f64>, PointingError> {
        (**self).boresight()
    }

    fn up_direction(&self) -> Result<Vector3<f64>, PointingError> {
        (**self).up_direction()
    }

    fn frustum(&self) -> Result<[Vector3<f64>; 4], PointingError> {
        (**self).frustum()
    }
}

/// Source of [`InstrumentPointing`]s for a fixed set of instruments.
pub trait PointingProvider {
    type Pointing: InstrumentPointing;

    /// Pointing of `instrument` at `time`.
    ///
    /// Fails with [`PointingError::UnknownInstrument`] for an instrument the provider
    /// does not expose and [`PointingError::NonFiniteTime`] for a NaN or infinite time.
    fn provide(&self, instrument: &str, time: EphemerisTime) -> Result<Self::Pointing, PointingError>;

    /// Names of the exposed instruments, sorted.
    fn instrument_names(&self) -> Vec<String>;

    fn current_instrument_name(&self) -> Option<&str>;

    /// Fails with [`PointingError::UnknownInstrument`], leaving the current instrument
    /// unchanged, if `name` is not exposed by the provider.
    fn set_current_instrument_name(&mut self, name: &str) -> Result<(), PointingError>;

    /// Pointing of the current instrument at `time`.
    fn provide_current(&self, time: EphemerisTime) -> Result<Self::Pointing, PointingError> {
        let name = self
            .current_instrument_name()
            .ok_or(PointingError::NoCurrentInstrument)?;
        self.provide(name, time)
    }
}

/// Scale `vector` to unit length.
///
/// Vectors whose length is exactly 0 or exactly 1 are returned unchanged, so a zero
/// vector stays zero instead of turning into NaNs. The unit length is only guaranteed
/// for finite input: a vector with a NaN or infinite component comes back with NaN
/// components.
pub fn normalize(vector: Vector3<f64>) -> Vector3<f64> {
    let norm = vector.norm();
    if norm == 0.0 || norm == 1.0 {
        vector
    } else {
        vector / norm
    }
}

#[cfg(test)]
mod pointing_test {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Vector3::zeros()), Vector3::zeros());
        assert_eq!(normalize(Vector3::x()), Vector3::x());

        let v = normalize(Vector3::new(3.0, 4.0, 0.0));
        assert_eq!(v, Vector3::new(0.6, 0.8, 0.0));
    }

    #[test]
    fn test_normalize_non_finite() {
        assert!(normalize(Vector3::new(f64::NAN, 1.0, 0.0)).iter().all(|c| c.is_nan()));

        let v = normalize(Vector3::new(f64::INFINITY, 1.0, 0.0));
        assert!(v.x.is_nan());
        assert_eq!(v.y, 0.0);
    }
}
