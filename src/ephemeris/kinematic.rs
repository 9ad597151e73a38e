//! # Analytic kinematic ephemeris
//!
//! A small, deterministic stand-in for a kernel-driven ephemeris toolkit:
//!
//! * every body moves in uniform straight-line motion relative to the solar system
//!   barycenter, expressed in `J2000` ([`KinematicBody`]);
//! * every frame rotates uniformly about a fixed `J2000` axis, starting from a fixed
//!   orientation at ET 0 ([`KinematicFrame`]).
//!
//! Light time is found by Newtonian iteration; stellar aberration is the first-order
//! (classical) correction for the observer's barycentric velocity. Frames centered on
//! the target of a state query are evaluated at the light-time corrected epoch, as
//! the toolkit does for body-fixed frames.
//!
//! The environment still loads real text kernels into its [`KernelPool`], so
//! instrument kernels and metakernels drive instrument discovery and FOV extraction
//! exactly as they would with kernel-backed ephemerides. Binary kernels are rejected;
//! use [`super::spice`] to evaluate them.
//!
//! ## Example
//!
//! ```rust
//! use nalgebra::Vector3;
//! use spice_pointing::ephemeris::{
//!     kinematic::{KinematicBody, KinematicEnvironmentBuilder, KinematicFrame},
//!     EnvironmentBuilder,
//! };
//!
//! let mut builder = KinematicEnvironmentBuilder::new()
//!     .with_body("DIDYMOS", KinematicBody::stationary(Vector3::new(1.0e8, 0.0, 0.0)))
//!     .with_frame("IAU_DIDYMOS", KinematicFrame::rotating("DIDYMOS", Vector3::z(), 1.0e-3));
//! builder.load_kernel_text("draco.ti", "\\begindata\nINS-1234_FOV_FRAME = 'DART_DRACO'\n").unwrap();
//! let env = builder.build().unwrap();
//! assert!(env.pool.contains_key("INS-1234_FOV_FRAME"));
//! ```
use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use camino::{Utf8Path, Utf8PathBuf};
use nalgebra::{Matrix3, Rotation3, Unit, Vector3};
use tracing::{debug, warn};

use super::{
    is_binary_kernel, AberratedEphemerisProvider, AberratedState, AberrationCorrection, EnvironmentBuilder,
    EphemerisEnvironment, StateVector,
};
use crate::{
    constants::{EphemerisTime, INERTIAL_FRAME_NAME, MAX_LIGHT_TIME_ITERATIONS, VLIGHT},
    ids::{EphemerisId, FrameId},
    kernel_pool::KernelPool,
    pointing_errors::PointingError,
};

/// Name of the implicit body sitting at the origin of every state.
pub const SOLAR_SYSTEM_BARYCENTER: &str = "SOLAR SYSTEM BARYCENTER";

/// Uniform straight-line motion relative to the solar system barycenter, in `J2000`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KinematicBody {
    /// Position at ET 0 (km)
    pub position: Vector3<f64>,
    /// Constant velocity (km/s)
    pub velocity: Vector3<f64>,
}

impl KinematicBody {
    pub fn new(position: Vector3<f64>, velocity: Vector3<f64>) -> Self {
        KinematicBody { position, velocity }
    }

    pub fn stationary(position: Vector3<f64>) -> Self {
        KinematicBody::new(position, Vector3::zeros())
    }

    pub fn position_at(&self, et: EphemerisTime) -> Vector3<f64> {
        self.position + self.velocity * et
    }
}

/// Frame rotating uniformly about a fixed `J2000` axis.
///
/// The frame → `J2000` rotation at `et` is `R(axis, rate·et) · orientation`.
#[derive(Debug, Clone, PartialEq)]
pub struct KinematicFrame {
    /// Body at the origin of the frame, if any.
    pub center: Option<String>,
    pub axis: Unit<Vector3<f64>>,
    /// Rotation rate (rad/s)
    pub rate: f64,
    /// Frame → `J2000` rotation at ET 0.
    pub orientation: Rotation3<f64>,
}

impl KinematicFrame {
    pub fn inertial() -> Self {
        KinematicFrame {
            center: None,
            axis: Vector3::z_axis(),
            rate: 0.0,
            orientation: Rotation3::identity(),
        }
    }

    /// A frame with a constant orientation relative to `J2000`.
    pub fn fixed(orientation: Rotation3<f64>) -> Self {
        KinematicFrame {
            orientation,
            ..KinematicFrame::inertial()
        }
    }

    /// A body-fixed frame aligned with `J2000` at ET 0, spinning about `axis`.
    pub fn rotating(center: &str, axis: Vector3<f64>, rate: f64) -> Self {
        KinematicFrame {
            center: Some(center.to_string()),
            axis: Unit::new_normalize(axis),
            rate,
            orientation: Rotation3::identity(),
        }
    }

    pub fn with_orientation(self, orientation: Rotation3<f64>) -> Self {
        KinematicFrame {
            orientation,
            ..self
        }
    }

    /// Frame → `J2000` rotation matrix at `et`.
    pub fn to_inertial(&self, et: EphemerisTime) -> Matrix3<f64> {
        (Rotation3::from_axis_angle(&self.axis, self.rate * et) * self.orientation).into_inner()
    }

    /// Angular velocity of the frame relative to `J2000`, in `J2000` components.
    pub fn angular_velocity(&self) -> Vector3<f64> {
        self.axis.into_inner() * self.rate
    }
}

/// Analytic [`AberratedEphemerisProvider`].
#[derive(Debug, Clone, Default)]
pub struct KinematicEphemeris {
    bodies: HashMap<String, KinematicBody>,
    frames: HashMap<String, KinematicFrame>,
}

impl KinematicEphemeris {
    fn body(
        &self,
        name: &str,
        target: &EphemerisId,
        observer: &EphemerisId,
        frame: &FrameId,
    ) -> Result<KinematicBody, PointingError> {
        if name == SOLAR_SYSTEM_BARYCENTER {
            return Ok(KinematicBody::stationary(Vector3::zeros()));
        }
        self.bodies
            .get(name)
            .copied()
            .ok_or_else(|| PointingError::EphemerisUnavailable {
                target: target.name().to_string(),
                observer: observer.name().to_string(),
                frame: frame.name().to_string(),
            })
    }

    fn frame(&self, name: &str) -> Option<KinematicFrame> {
        if name == INERTIAL_FRAME_NAME {
            return Some(KinematicFrame::inertial());
        }
        self.frames.get(name).cloned()
    }

    /// Light-time corrected `J2000` state of `target` relative to `observer`.
    fn corrected_inertial_state(
        target: &KinematicBody,
        observer: &KinematicBody,
        et: EphemerisTime,
        correction: AberrationCorrection,
    ) -> AberratedState {
        let observer_position = observer.position_at(et);

        if correction == AberrationCorrection::None {
            let position = target.position_at(et) - observer_position;
            return AberratedState {
                state: StateVector::new(position, target.velocity - observer.velocity),
                light_time: position.norm() / VLIGHT,
            };
        }

        let mut light_time = 0.0;
        let mut position = target.position_at(et) - observer_position;
        for _ in 0..MAX_LIGHT_TIME_ITERATIONS {
            let next = position.norm() / VLIGHT;
            let converged = (next - light_time).abs() <= f64::EPSILON * next.max(1.0);
            light_time = next;
            position = target.position_at(et - light_time) - observer_position;
            if converged {
                break;
            }
        }

        let range = position.norm();
        let direction = if range > 0.0 { position / range } else { position };
        let light_time_rate = direction.dot(&(target.velocity - observer.velocity))
            / (VLIGHT + direction.dot(&target.velocity));
        let velocity = target.velocity * (1.0 - light_time_rate) - observer.velocity;

        let position = if correction == AberrationCorrection::LtS && range > 0.0 {
            let beta = observer.velocity / VLIGHT;
            let apparent = direction + beta - direction * direction.dot(&beta);
            apparent.normalize() * range
        } else {
            position
        };

        AberratedState {
            state: StateVector::new(position, velocity),
            light_time,
        }
    }
}

impl AberratedEphemerisProvider for KinematicEphemeris {
    fn aberrated_state(
        &self,
        target: &EphemerisId,
        observer: &EphemerisId,
        frame: &FrameId,
        et: EphemerisTime,
        correction: AberrationCorrection,
    ) -> Result<AberratedState, PointingError> {
        let target_body = self.body(target.name(), target, observer, frame)?;
        let observer_body = self.body(observer.name(), target, observer, frame)?;
        let output_frame = self
            .frame(frame.name())
            .ok_or_else(|| PointingError::FrameUnavailable {
                from: INERTIAL_FRAME_NAME.to_string(),
                to: frame.name().to_string(),
            })?;

        let inertial = Self::corrected_inertial_state(&target_body, &observer_body, et, correction);

        // frames centered on the target are seen as they were when the light left it
        let frame_epoch = match output_frame.center.as_deref() {
            Some(center) if center == target.name() && correction != AberrationCorrection::None => {
                et - inertial.light_time
            }
            _ => et,
        };
        let to_frame = output_frame.to_inertial(frame_epoch).transpose();
        let omega = output_frame.angular_velocity();
        let position = inertial.state.position;
        let velocity = inertial.state.velocity - omega.cross(&position);

        Ok(AberratedState {
            state: StateVector::new(to_frame * position, to_frame * velocity),
            light_time: inertial.light_time,
        })
    }

    fn frame_transform(
        &self,
        from: &FrameId,
        to: &FrameId,
        et: EphemerisTime,
    ) -> Result<Matrix3<f64>, PointingError> {
        let unavailable = || PointingError::FrameUnavailable {
            from: from.name().to_string(),
            to: to.name().to_string(),
        };
        let from_frame = self.frame(from.name()).ok_or_else(unavailable)?;
        let to_frame = self.frame(to.name()).ok_or_else(unavailable)?;
        Ok(to_frame.to_inertial(et).transpose() * from_frame.to_inertial(et))
    }
}

/// [`EnvironmentBuilder`] for the [`KinematicEphemeris`].
#[derive(Debug, Clone, Default)]
pub struct KinematicEnvironmentBuilder {
    pool: KernelPool,
    kernels: Vec<Utf8PathBuf>,
    model: KinematicEphemeris,
    bound_ephemerides: BTreeSet<String>,
    bound_frames: BTreeSet<String>,
}

impl KinematicEnvironmentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(mut self, name: &str, body: KinematicBody) -> Self {
        self.model.bodies.insert(name.to_string(), body);
        self
    }

    pub fn with_frame(mut self, name: &str, frame: KinematicFrame) -> Self {
        self.model.frames.insert(name.to_string(), frame);
        self
    }

    /// Load an in-memory text kernel; `name` stands in for its path.
    pub fn load_kernel_text(&mut self, name: &str, text: &str) -> Result<(), PointingError> {
        self.pool.merge_text(name, text)?;
        self.kernels.push(Utf8PathBuf::from(name));
        Ok(())
    }

    pub fn kernels(&self) -> &[Utf8PathBuf] {
        &self.kernels
    }

    pub fn bound_ephemerides(&self) -> impl Iterator<Item = &str> {
        self.bound_ephemerides.iter().map(String::as_str)
    }

    pub fn bound_frames(&self) -> impl Iterator<Item = &str> {
        self.bound_frames.iter().map(String::as_str)
    }
}

impl EnvironmentBuilder for KinematicEnvironmentBuilder {
    fn load_kernel(&mut self, path: &Utf8Path) -> Result<(), PointingError> {
        if is_binary_kernel(path) {
            return Err(PointingError::UnsupportedKernel(path.to_string()));
        }

        self.pool.load_text_kernel(path)?;
        self.kernels.push(path.to_path_buf());
        debug!(kernel = %path, loaded = self.kernels.len(), "loaded text kernel");
        Ok(())
    }

    fn bind_ephemeris(&mut self, id: &EphemerisId) {
        self.bound_ephemerides.insert(id.name().to_string());
    }

    fn bind_frame(&mut self, id: &FrameId) {
        self.bound_frames.insert(id.name().to_string());
    }

    fn kernel_count(&self) -> usize {
        self.kernels.len()
    }

    fn build(&self) -> Result<EphemerisEnvironment, PointingError> {
        for name in &self.bound_ephemerides {
            if name != SOLAR_SYSTEM_BARYCENTER && !self.model.bodies.contains_key(name) {
                warn!(body = %name, "bound body has no kinematic ephemeris");
            }
        }
        for name in &self.bound_frames {
            if self.model.frame(name).is_none() {
                warn!(frame = %name, "bound frame has no kinematic definition");
            }
        }

        debug!(
            kernels = self.kernels.len(),
            keywords = self.pool.len(),
            bodies = self.model.bodies.len(),
            frames = self.model.frames.len(),
            "built kinematic ephemeris environment"
        );

        Ok(EphemerisEnvironment {
            pool: Arc::new(self.pool.clone()),
            provider: Arc::new(self.model.clone()),
        })
    }
}

#[cfg(test)]
mod kinematic_test {
    use super::*;
    use crate::ids::IdRegistry;
    use approx::assert_relative_eq;

    const OMEGA: f64 = 1.0e-3;

    fn model() -> KinematicEphemeris {
        let mut model = KinematicEphemeris::default();
        model.bodies.insert(
            "DIDYMOS".into(),
            KinematicBody::stationary(Vector3::new(1.0e8, 0.0, 0.0)),
        );
        model.bodies.insert(
            "DART_SPACECRAFT".into(),
            KinematicBody::new(Vector3::new(1.0e8 + 1000.0, 0.0, 0.0), Vector3::new(0.0, 5.0, 0.0)),
        );
        model.frames.insert(
            "IAU_DIDYMOS".into(),
            KinematicFrame::rotating("DIDYMOS", Vector3::z(), OMEGA),
        );
        model
    }

    #[test]
    fn test_geometric_state() {
        let mut ids = IdRegistry::new();
        let state = model()
            .aberrated_state(
                &ids.ephemeris_id("DIDYMOS"),
                &ids.ephemeris_id("DART_SPACECRAFT"),
                &ids.frame_id("J2000"),
                10.0,
                AberrationCorrection::None,
            )
            .unwrap();
        assert_relative_eq!(state.state.position, Vector3::new(-1000.0, -50.0, 0.0));
        assert_relative_eq!(state.state.velocity, Vector3::new(0.0, -5.0, 0.0));
        assert_relative_eq!(state.light_time, 1000.0_f64.hypot(50.0) / VLIGHT);
    }

    #[test]
    fn test_light_time_converges() {
        let target = KinematicBody::new(Vector3::new(1.0e6, 0.0, 0.0), Vector3::new(0.0, 30.0, 0.0));
        let observer = KinematicBody::stationary(Vector3::zeros());
        let corrected =
            KinematicEphemeris::corrected_inertial_state(&target, &observer, 0.0, AberrationCorrection::Lt);

        // the emission epoch is consistent with the light time found
        let emitted = target.position_at(-corrected.light_time);
        assert_relative_eq!(corrected.state.position, emitted, epsilon = 1e-9);
        assert_relative_eq!(corrected.light_time, emitted.norm() / VLIGHT, epsilon = 1e-12);
    }

    #[test]
    fn test_stellar_aberration_tilts_toward_motion() {
        let target = KinematicBody::stationary(Vector3::new(1.0e6, 0.0, 0.0));
        let observer = KinematicBody::new(Vector3::zeros(), Vector3::new(0.0, 30.0, 0.0));
        let lt = KinematicEphemeris::corrected_inertial_state(&target, &observer, 0.0, AberrationCorrection::Lt);
        let lts = KinematicEphemeris::corrected_inertial_state(&target, &observer, 0.0, AberrationCorrection::LtS);

        assert_relative_eq!(lts.state.position.norm(), lt.state.position.norm(), epsilon = 1e-6);
        assert_relative_eq!(lts.state.position.y / 1.0e6, 30.0 / VLIGHT, epsilon = 1e-9);
        assert_eq!(lts.light_time, lt.light_time);
    }

    #[test]
    fn test_rotating_frame_state() {
        let mut ids = IdRegistry::new();
        let et = 1000.0;
        let state = model()
            .aberrated_state(
                &ids.ephemeris_id("DART_SPACECRAFT"),
                &ids.ephemeris_id("DIDYMOS"),
                &ids.frame_id("IAU_DIDYMOS"),
                et,
                AberrationCorrection::None,
            )
            .unwrap();

        let theta = OMEGA * et;
        let inertial = Vector3::new(1000.0, 5000.0, 0.0);
        let expected = Rotation3::from_axis_angle(&Vector3::z_axis(), -theta) * inertial;
        assert_relative_eq!(state.state.position, expected, epsilon = 1e-9);

        let relative_velocity = Vector3::new(0.0, 5.0, 0.0) - Vector3::new(0.0, 0.0, OMEGA).cross(&inertial);
        let expected_velocity = Rotation3::from_axis_angle(&Vector3::z_axis(), -theta) * relative_velocity;
        assert_relative_eq!(state.state.velocity, expected_velocity, epsilon = 1e-12);
    }

    #[test]
    fn test_frame_transform() {
        let mut ids = IdRegistry::new();
        let model = model();
        let j2000 = ids.frame_id("J2000");
        let body = ids.frame_id("IAU_DIDYMOS");
        let quarter_turn = std::f64::consts::FRAC_PI_2 / OMEGA;

        let to_body = model.frame_transform(&j2000, &body, quarter_turn).unwrap();
        assert_relative_eq!(to_body * Vector3::y(), Vector3::x(), epsilon = 1e-12);

        let back = model.frame_transform(&body, &j2000, quarter_turn).unwrap();
        assert_relative_eq!(back * to_body, Matrix3::identity(), epsilon = 1e-12);

        assert_eq!(
            model.frame_transform(&j2000, &ids.frame_id("NOPE"), 0.0),
            Err(PointingError::FrameUnavailable {
                from: "J2000".into(),
                to: "NOPE".into()
            })
        );
    }

    #[test]
    fn test_unknown_body() {
        let mut ids = IdRegistry::new();
        let err = model()
            .aberrated_state(
                &ids.ephemeris_id("PHOBOS"),
                &ids.ephemeris_id("DIDYMOS"),
                &ids.frame_id("J2000"),
                0.0,
                AberrationCorrection::LtS,
            )
            .unwrap_err();
        assert_eq!(
            err,
            PointingError::EphemerisUnavailable {
                target: "PHOBOS".into(),
                observer: "DIDYMOS".into(),
                frame: "J2000".into()
            }
        );
    }

    #[test]
    fn test_builder_rejects_binary_kernels() {
        let mut builder = KinematicEnvironmentBuilder::new();
        assert_eq!(
            builder.load_kernel(Utf8Path::new("/data/de440.bsp")),
            Err(PointingError::UnsupportedKernel("/data/de440.bsp".into()))
        );
        assert_eq!(builder.kernel_count(), 0);

        builder
            .load_kernel_text("inline.ti", "\\begindata\nINS-1_FOV_FRAME = 'F'\n")
            .unwrap();
        assert_eq!(builder.kernel_count(), 1);
        assert!(builder.build().unwrap().pool.contains_key("INS-1_FOV_FRAME"));
    }
}
