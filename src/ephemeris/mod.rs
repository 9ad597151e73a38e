//! # Ephemeris and frame provider seam
//!
//! The pointing code never evaluates kernels itself. It consumes two primitives from
//! an external ephemeris toolkit, expressed here as the [`AberratedEphemerisProvider`]
//! trait:
//!
//! * the state (position and velocity) of a target relative to an observer, in a
//!   given frame, at a given ephemeris time, corrected for light time and optionally
//!   stellar aberration;
//! * the rotation matrix between two frames at a given ephemeris time.
//!
//! Environments are assembled by an [`EnvironmentBuilder`]: kernels are loaded, the
//! names of the bodies and frames of interest are bound, and [`EnvironmentBuilder::build`]
//! produces an [`EphemerisEnvironment`] holding the kernel pool and the provider.
//! `build` borrows the builder so that a temporary environment can be built for
//! instrument discovery before more names are bound.
//!
//! Two implementations ship with the crate:
//!
//! * [`spice`] evaluates SPK, CK and frame kernels with the SPICE toolkit;
//! * [`kinematic`] is an analytic model used for simulations, benchmarks and tests.
pub mod kinematic;
pub mod spice;

use std::{fmt, ops::Neg, sync::Arc};

use camino::Utf8Path;
use nalgebra::{Matrix3, Vector3};

use crate::{
    constants::{EphemerisTime, Second},
    ids::{EphemerisId, FrameId},
    kernel_pool::KernelPool,
    metakernel::read_metakernel,
    pointing_errors::PointingError,
};

const BINARY_KERNEL_EXTENSIONS: [&str; 4] = ["bsp", "bc", "bpc", "bds"];

/// `true` for SPK, CK, binary PCK and DSK files, judged by extension.
pub fn is_binary_kernel(path: &Utf8Path) -> bool {
    path.extension()
        .map(|ext| ext.to_ascii_lowercase())
        .is_some_and(|ext| BINARY_KERNEL_EXTENSIONS.contains(&ext.as_str()))
}

/// Position (km) and velocity (km/s) of one body relative to another.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateVector {
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
}

impl StateVector {
    pub fn new(position: Vector3<f64>, velocity: Vector3<f64>) -> Self {
        StateVector { position, velocity }
    }
}

impl Neg for StateVector {
    type Output = StateVector;

    fn neg(self) -> Self::Output {
        StateVector {
            position: -self.position,
            velocity: -self.velocity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AberrationCorrection {
    /// Geometric state.
    None,
    /// One-way light time.
    Lt,
    /// One-way light time and stellar aberration.
    LtS,
}

/// A corrected state together with the one-way light time between the two bodies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AberratedState {
    pub state: StateVector,
    pub light_time: Second,
}

/// The two primitives consumed from the ephemeris toolkit.
///
/// Implementations are pure functions of their inputs and must be shareable between
/// threads.
pub trait AberratedEphemerisProvider: Send + Sync + fmt::Debug {
    /// State of `target` relative to `observer`, expressed in `frame`, at `et`.
    fn aberrated_state(
        &self,
        target: &EphemerisId,
        observer: &EphemerisId,
        frame: &FrameId,
        et: EphemerisTime,
        correction: AberrationCorrection,
    ) -> Result<AberratedState, PointingError>;

    /// Matrix rotating vectors expressed in `from` into `to`, at `et`.
    fn frame_transform(
        &self,
        from: &FrameId,
        to: &FrameId,
        et: EphemerisTime,
    ) -> Result<Matrix3<f64>, PointingError>;
}

/// A target/observer/frame/correction tuple bound to a provider, evaluated on demand.
#[derive(Debug, Clone)]
pub struct AberratedStateFunction {
    provider: Arc<dyn AberratedEphemerisProvider>,
    target: EphemerisId,
    observer: EphemerisId,
    frame: FrameId,
    correction: AberrationCorrection,
    negated: bool,
}

impl AberratedStateFunction {
    pub fn new(
        provider: Arc<dyn AberratedEphemerisProvider>,
        target: EphemerisId,
        observer: EphemerisId,
        frame: FrameId,
        correction: AberrationCorrection,
    ) -> Self {
        AberratedStateFunction {
            provider,
            target,
            observer,
            frame,
            correction,
            negated: false,
        }
    }

    /// Same function with target and observer roles swapped in the output: every
    /// state returned is the negation of the original one, the light time is unchanged.
    pub fn negate(self) -> Self {
        AberratedStateFunction {
            negated: !self.negated,
            ..self
        }
    }

    pub fn evaluate(&self, et: EphemerisTime) -> Result<AberratedState, PointingError> {
        let aberrated = self.provider.aberrated_state(
            &self.target,
            &self.observer,
            &self.frame,
            et,
            self.correction,
        )?;
        Ok(if self.negated {
            AberratedState {
                state: -aberrated.state,
                ..aberrated
            }
        } else {
            aberrated
        })
    }

    pub fn state(&self, et: EphemerisTime) -> Result<StateVector, PointingError> {
        Ok(self.evaluate(et)?.state)
    }

    pub fn light_time(&self, et: EphemerisTime) -> Result<Second, PointingError> {
        Ok(self.evaluate(et)?.light_time)
    }
}

/// Kernel pool and provider produced by an [`EnvironmentBuilder`].
#[derive(Debug, Clone)]
pub struct EphemerisEnvironment {
    pub pool: Arc<KernelPool>,
    pub provider: Arc<dyn AberratedEphemerisProvider>,
}

/// Accumulates kernels and bound names, then builds an [`EphemerisEnvironment`].
pub trait EnvironmentBuilder {
    /// Load one kernel file.
    fn load_kernel(&mut self, path: &Utf8Path) -> Result<(), PointingError>;

    /// Declare a body the built provider must be able to evaluate.
    fn bind_ephemeris(&mut self, id: &EphemerisId);

    /// Declare a frame the built provider must be able to evaluate.
    fn bind_frame(&mut self, id: &FrameId);

    /// Number of kernels loaded so far.
    fn kernel_count(&self) -> usize;

    fn build(&self) -> Result<EphemerisEnvironment, PointingError>;

    /// Load every kernel listed by a metakernel, in order.
    ///
    /// Return
    /// ----------
    /// * The number of kernels loaded from this metakernel.
    fn load_metakernel(&mut self, path: &Utf8Path) -> Result<usize, PointingError> {
        let kernels = read_metakernel(path)?;
        for kernel in &kernels {
            self.load_kernel(kernel)?;
        }
        Ok(kernels.len())
    }
}
