//! # Lazily computed pointing snapshot
//!
//! A [`SpiceInstrumentPointing`] is fixed to one instrument and one ephemeris time. The
//! instrument-frame boresight, up direction and frustum are captured at construction;
//! everything else is computed on first access and cached for the lifetime of the
//! snapshot:
//!
//! 1. **Spacecraft state.** The light-time and stellar-aberration corrected state of
//!    the target seen from the spacecraft is negated to give the spacecraft relative
//!    to the target, in the target frame, at the query time `t`. The one-way light
//!    time gives `time_at_target = t - lt`, the epoch at which the light now reaching
//!    the spacecraft left the target.
//! 2. **Rotations.** A frame is rotated into the target frame in two steps through
//!    `J2000`: `from → J2000` at `t`, then `J2000 → target` at `time_at_target`. The
//!    spacecraft frame and the instrument frame rotations are cached separately.
//! 3. **Body positions.** The position of any bound body relative to the target is
//!    evaluated at `time_at_target`, and cached per body.
//!
//! Boresight, up direction and frustum corners are rotated with the instrument
//! rotation and renormalized.
//!
//! Every cache only ever goes from empty to filled, so a snapshot can be shared freely
//! between threads behind an [`Arc`](std::sync::Arc).
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use nalgebra::{Matrix3, Vector3};
use once_cell::sync::OnceCell;
use tracing::debug;

use super::{normalize, InstrumentPointing};
use crate::{
    constants::EphemerisTime,
    ephemeris::{AberratedEphemerisProvider, AberratedStateFunction, AberrationCorrection},
    fov::InstrumentFov,
    ids::{EphemerisId, FrameId},
    pointing_errors::PointingError,
};

/// Identifiers shared by every snapshot of one provider.
#[derive(Debug, Clone, PartialEq)]
pub struct PointingFrames {
    pub target: EphemerisId,
    pub target_frame: FrameId,
    pub spacecraft: EphemerisId,
    pub spacecraft_frame: FrameId,
    /// Intermediate frame of the two-step rotations, `J2000`.
    pub inertial_frame: FrameId,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct SpacecraftState {
    position: Vector3<f64>,
    velocity: Vector3<f64>,
    time_at_target: EphemerisTime,
}

#[derive(Debug)]
pub struct SpiceInstrumentPointing {
    provider: Arc<dyn AberratedEphemerisProvider>,
    frames: PointingFrames,
    instrument_frame: FrameId,
    boresight: Vector3<f64>,
    up: Vector3<f64>,
    frustum: [Vector3<f64>; 4],
    time: EphemerisTime,

    spacecraft_state: OnceCell<SpacecraftState>,
    sc_rotation: OnceCell<Matrix3<f64>>,
    instrument_rotation: OnceCell<Matrix3<f64>>,
    body_positions: Mutex<HashMap<EphemerisId, Vector3<f64>>>,
}

impl SpiceInstrumentPointing {
    /// Snapshot of the instrument whose field of view is `fov` (instrument frame) at `time`.
    pub fn new(
        provider: Arc<dyn AberratedEphemerisProvider>,
        frames: PointingFrames,
        instrument_frame: FrameId,
        fov: &InstrumentFov,
        time: EphemerisTime,
    ) -> Self {
        SpiceInstrumentPointing {
            provider,
            frames,
            instrument_frame,
            boresight: normalize(fov.boresight),
            up: normalize(fov.up),
            frustum: fov.frustum,
            time,
            spacecraft_state: OnceCell::new(),
            sc_rotation: OnceCell::new(),
            instrument_rotation: OnceCell::new(),
            body_positions: Mutex::new(HashMap::new()),
        }
    }

    pub fn frames(&self) -> &PointingFrames {
        &self.frames
    }

    pub fn instrument_frame(&self) -> &FrameId {
        &self.instrument_frame
    }

    fn spacecraft_state(&self) -> Result<&SpacecraftState, PointingError> {
        self.spacecraft_state.get_or_try_init(|| {
            let target_from_sc = AberratedStateFunction::new(
                Arc::clone(&self.provider),
                self.frames.target.clone(),
                self.frames.spacecraft.clone(),
                self.frames.target_frame.clone(),
                AberrationCorrection::LtS,
            );
            let sc_from_target = target_from_sc.negate().evaluate(self.time)?;

            let state = SpacecraftState {
                position: sc_from_target.state.position,
                velocity: sc_from_target.state.velocity,
                time_at_target: self.time - sc_from_target.light_time,
            };
            debug!(
                time = self.time,
                light_time = sc_from_target.light_time,
                "computed spacecraft pointing"
            );
            Ok(state)
        })
    }

    /// Epoch at which the light reaching the spacecraft at [`InstrumentPointing::time`]
    /// left the target.
    pub fn time_at_target(&self) -> Result<EphemerisTime, PointingError> {
        Ok(self.spacecraft_state()?.time_at_target)
    }

    /// `from → J2000` at the query time, then `J2000 → target frame` at the time at target.
    fn rotation_to_target_frame(&self, from: &FrameId) -> Result<Matrix3<f64>, PointingError> {
        let to_inertial = self
            .provider
            .frame_transform(from, &self.frames.inertial_frame, self.time)?;
        let to_target = self.provider.frame_transform(
            &self.frames.inertial_frame,
            &self.frames.target_frame,
            self.time_at_target()?,
        )?;
        Ok(to_target * to_inertial)
    }

    /// Instrument frame → target frame.
    pub fn instrument_rotation(&self) -> Result<Matrix3<f64>, PointingError> {
        self.instrument_rotation
            .get_or_try_init(|| self.rotation_to_target_frame(&self.instrument_frame))
            .copied()
    }
}

impl InstrumentPointing for SpiceInstrumentPointing {
    fn time(&self) -> EphemerisTime {
        self.time
    }

    fn sc_position(&self) -> Result<Vector3<f64>, PointingError> {
        Ok(self.spacecraft_state()?.position)
    }

    fn sc_velocity(&self) -> Result<Vector3<f64>, PointingError> {
        Ok(self.spacecraft_state()?.velocity)
    }

    fn sc_rotation(&self) -> Result<Matrix3<f64>, PointingError> {
        self.sc_rotation
            .get_or_try_init(|| self.rotation_to_target_frame(&self.frames.spacecraft_frame))
            .copied()
    }

    fn position(&self, body: &EphemerisId) -> Result<Vector3<f64>, PointingError> {
        let mut positions = self
            .body_positions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(position) = positions.get(body) {
            return Ok(*position);
        }

        let position = AberratedStateFunction::new(
            Arc::clone(&self.provider),
            body.clone(),
            self.frames.target.clone(),
            self.frames.target_frame.clone(),
            AberrationCorrection::LtS,
        )
        .state(self.time_at_target()?)?
        .position;

        positions.insert(body.clone(), position);
        Ok(position)
    }

    fn boresight(&self) -> Result<Vector3<f64>, PointingError> {
        Ok(normalize(self.instrument_rotation()? * self.boresight))
    }

    fn up_direction(&self) -> Result<Vector3<f64>, PointingError> {
        Ok(normalize(self.instrument_rotation()? * self.up))
    }

    fn frustum(&self) -> Result<[Vector3<f64>; 4], PointingError> {
        let rotation = self.instrument_rotation()?;
        Ok(self.frustum.map(|corner| normalize(rotation * corner)))
    }
}

#[cfg(test)]
mod snapshot_test {
    use super::*;
    use crate::{
        constants::{RADEG, VLIGHT},
        ephemeris::EnvironmentBuilder,
        ids::IdRegistry,
        unit_test_global::{dart_environment, OMEGA, T0},
    };
    use approx::assert_relative_eq;

    fn snapshot(ids: &mut IdRegistry, time: EphemerisTime) -> SpiceInstrumentPointing {
        let env = dart_environment().build().unwrap();
        let frames = PointingFrames {
            target: ids.ephemeris_id("DIDYMOS"),
            target_frame: ids.frame_id("DIDYMOS_SYSTEM_BARYCENTER"),
            spacecraft: ids.ephemeris_id("DART_SPACECRAFT"),
            spacecraft_frame: ids.frame_id("DART_SPACECRAFT"),
            inertial_frame: ids.frame_id("J2000"),
        };
        let fov = crate::fov::extract_fov(&env.pool, -1234, "DART_DRACO").unwrap();
        SpiceInstrumentPointing::new(env.provider, frames, ids.frame_id("DART_DRACO"), &fov, time)
    }

    #[test]
    fn test_time_at_target() {
        let mut ids = IdRegistry::new();
        let pointing = snapshot(&mut ids, T0);
        let time_at_target = pointing.time_at_target().unwrap();
        assert!(time_at_target < T0);
        assert_relative_eq!(T0 - time_at_target, 1000.0 / VLIGHT, epsilon = 1e-12);
    }

    #[test]
    fn test_spacecraft_state() {
        let mut ids = IdRegistry::new();
        let pointing = snapshot(&mut ids, T0);
        let theta = OMEGA * pointing.time_at_target().unwrap();

        assert_relative_eq!(
            pointing.sc_position().unwrap(),
            Vector3::new(theta.cos(), -theta.sin(), 0.0) * 1000.0,
            epsilon = 1e-9
        );
        assert_relative_eq!(pointing.sc_velocity().unwrap().norm(), OMEGA * 1000.0, epsilon = 1e-12);
    }

    #[test]
    fn test_boresight_up_and_frustum() {
        let mut ids = IdRegistry::new();
        let pointing = snapshot(&mut ids, T0);
        let theta = OMEGA * pointing.time_at_target().unwrap();

        let boresight = pointing.boresight().unwrap();
        assert_relative_eq!(boresight, Vector3::new(theta.cos(), -theta.sin(), 0.0), epsilon = 1e-12);
        assert_relative_eq!(boresight.norm(), 1.0, epsilon = 1e-15);

        let up = pointing.up_direction().unwrap();
        assert_relative_eq!(up, Vector3::z(), epsilon = 1e-12);

        for corner in pointing.frustum().unwrap() {
            assert_relative_eq!(corner.norm(), 1.0, epsilon = 1e-15);
            assert_relative_eq!(corner.angle(&boresight), (0.15 * RADEG).tan().hypot((0.15 * RADEG).tan()).atan(), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_spacecraft_rotation_reproduces_boresight() {
        let mut ids = IdRegistry::new();
        let pointing = snapshot(&mut ids, T0);

        // DRACO looks along the spacecraft -Y axis
        let rotated = pointing.sc_rotation().unwrap() * Vector3::new(0.0, -1.0, 0.0);
        assert_relative_eq!(rotated, pointing.boresight().unwrap(), epsilon = 1e-12);
    }

    #[test]
    fn test_body_position_is_cached() {
        let mut ids = IdRegistry::new();
        let pointing = snapshot(&mut ids, T0);
        let sun = ids.ephemeris_id("SUN");

        let first = pointing.position(&sun).unwrap();
        let theta = OMEGA * pointing.time_at_target().unwrap();
        assert_relative_eq!(
            first,
            Vector3::new(theta.cos(), -theta.sin(), 0.0) * -1.0e8,
            max_relative = 1e-12
        );
        assert_eq!(pointing.position(&sun).unwrap(), first);
        assert_eq!(pointing.body_positions.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_unbound_body() {
        let mut ids = IdRegistry::new();
        let pointing = snapshot(&mut ids, T0);
        let err = pointing.position(&ids.ephemeris_id("PHOBOS")).unwrap_err();
        assert!(matches!(err, PointingError::EphemerisUnavailable { .. }));
        assert!(pointing.body_positions.lock().unwrap().is_empty());
    }

    #[test]
    fn test_zero_boresight_stays_zero() {
        let mut ids = IdRegistry::new();
        let env = dart_environment().build().unwrap();
        let frames = PointingFrames {
            target: ids.ephemeris_id("DIDYMOS"),
            target_frame: ids.frame_id("DIDYMOS_SYSTEM_BARYCENTER"),
            spacecraft: ids.ephemeris_id("DART_SPACECRAFT"),
            spacecraft_frame: ids.frame_id("DART_SPACECRAFT"),
            inertial_frame: ids.frame_id("J2000"),
        };
        let fov = InstrumentFov {
            boresight: Vector3::zeros(),
            up: Vector3::zeros(),
            frustum: [Vector3::zeros(); 4],
        };
        let pointing =
            SpiceInstrumentPointing::new(env.provider, frames, ids.frame_id("DART_DRACO"), &fov, T0);
        assert_eq!(pointing.boresight().unwrap(), Vector3::zeros());
        assert_eq!(pointing.up_direction().unwrap(), Vector3::zeros());
        assert_eq!(pointing.frustum().unwrap(), [Vector3::zeros(); 4]);
    }
}
