//! # SPICE toolkit ephemeris
//!
//! Kernel-driven [`AberratedEphemerisProvider`] backed by `rsspice`, a pure Rust port of
//! the SPICE Toolkit. Any kernel the toolkit reads can be loaded: SPK, CK, PCK, frame,
//! clock, leapseconds and instrument kernels. States come from `spkezr`, frame
//! transforms from `pxform`.
//!
//! Text kernels are also merged into the [`KernelPool`] in load order, so instrument
//! discovery and FOV extraction read the same assignments the toolkit holds.
//!
//! A toolkit context is not shareable between threads. Each built [`SpiceEphemeris`]
//! keeps the list of its kernels and lazily furnishes one context per thread that
//! queries it.
//!
//! ## Example
//!
//! ```rust,ignore
//! use camino::Utf8Path;
//! use spice_pointing::ephemeris::{spice::SpiceEnvironmentBuilder, EnvironmentBuilder};
//!
//! let mut builder = SpiceEnvironmentBuilder::new();
//! builder.load_metakernel(Utf8Path::new("/data/dart/mk/d520_v01.tm"))?;
//! let env = builder.build()?;
//! ```
use std::{
    cell::RefCell,
    collections::{hash_map::Entry, BTreeSet, HashMap},
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use camino::{Utf8Path, Utf8PathBuf};
use nalgebra::{Matrix3, Vector3};
use rsspice::SpiceContext;
use tracing::debug;

use super::{
    is_binary_kernel, AberratedEphemerisProvider, AberratedState, AberrationCorrection,
    EnvironmentBuilder, EphemerisEnvironment, StateVector,
};
use crate::{
    constants::EphemerisTime,
    ids::{EphemerisId, FrameId},
    kernel_pool::KernelPool,
    pointing_errors::PointingError,
};

thread_local! {
    static CONTEXTS: RefCell<HashMap<u64, SpiceContext<'static>>> = RefCell::new(HashMap::new());
}

static NEXT_EPHEMERIS_KEY: AtomicU64 = AtomicU64::new(0);

impl AberrationCorrection {
    /// Correction flag understood by `spkezr`.
    pub fn toolkit_flag(self) -> &'static str {
        match self {
            AberrationCorrection::None => "NONE",
            AberrationCorrection::Lt => "LT",
            AberrationCorrection::LtS => "LT+S",
        }
    }
}

fn furnish(context: &mut SpiceContext<'static>, kernel: &Utf8Path) -> Result<(), PointingError> {
    context
        .furnsh(kernel.as_str())
        .map_err(|error| PointingError::KernelLoad {
            path: kernel.to_string(),
            reason: error.to_string(),
        })
}

fn furnished_context(kernels: &[Utf8PathBuf]) -> Result<SpiceContext<'static>, PointingError> {
    let mut context = SpiceContext::new();
    for kernel in kernels {
        furnish(&mut context, kernel)?;
    }
    Ok(context)
}

/// [`AberratedEphemerisProvider`] evaluated by the SPICE toolkit.
pub struct SpiceEphemeris {
    key: u64,
    kernels: Arc<[Utf8PathBuf]>,
}

impl SpiceEphemeris {
    fn new(kernels: &[Utf8PathBuf]) -> Self {
        SpiceEphemeris {
            key: NEXT_EPHEMERIS_KEY.fetch_add(1, Ordering::Relaxed),
            kernels: Arc::from(kernels),
        }
    }

    pub fn kernels(&self) -> &[Utf8PathBuf] {
        &self.kernels
    }

    /// Run `query` against this thread's context, furnishing it on first use.
    fn with_context<T>(
        &self,
        query: impl FnOnce(&mut SpiceContext<'static>) -> Result<T, PointingError>,
    ) -> Result<T, PointingError> {
        CONTEXTS.with(|contexts| {
            let mut contexts = contexts.borrow_mut();
            let context = match contexts.entry(self.key) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    debug!(kernels = self.kernels.len(), "furnishing SPICE context for this thread");
                    entry.insert(furnished_context(&self.kernels)?)
                }
            };
            query(context)
        })
    }
}

impl Drop for SpiceEphemeris {
    fn drop(&mut self) {
        // contexts furnished by other threads are released when those threads exit
        let key = self.key;
        let released = CONTEXTS.try_with(|contexts| {
            if let Ok(mut contexts) = contexts.try_borrow_mut() {
                contexts.remove(&key);
            }
        });
        if released.is_err() {
            debug!(key, "thread-local SPICE contexts already torn down");
        }
    }
}

impl fmt::Debug for SpiceEphemeris {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpiceEphemeris")
            .field("key", &self.key)
            .field("kernels", &self.kernels)
            .finish()
    }
}

impl AberratedEphemerisProvider for SpiceEphemeris {
    fn aberrated_state(
        &self,
        target: &EphemerisId,
        observer: &EphemerisId,
        frame: &FrameId,
        et: EphemerisTime,
        correction: AberrationCorrection,
    ) -> Result<AberratedState, PointingError> {
        let (state, light_time) = self.with_context(|context| {
            context
                .spkezr(
                    target.name(),
                    et,
                    frame.name(),
                    correction.toolkit_flag(),
                    observer.name(),
                )
                .map_err(|error| {
                    debug!(%target, %observer, %frame, et, %error, "spkezr failed");
                    PointingError::EphemerisUnavailable {
                        target: target.name().to_string(),
                        observer: observer.name().to_string(),
                        frame: frame.name().to_string(),
                    }
                })
        })?;

        Ok(AberratedState {
            state: StateVector::new(
                Vector3::new(state[0], state[1], state[2]),
                Vector3::new(state[3], state[4], state[5]),
            ),
            light_time,
        })
    }

    fn frame_transform(
        &self,
        from: &FrameId,
        to: &FrameId,
        et: EphemerisTime,
    ) -> Result<Matrix3<f64>, PointingError> {
        let rotate = self.with_context(|context| {
            context
                .pxform(from.name(), to.name(), et)
                .map_err(|error| {
                    debug!(%from, %to, et, %error, "pxform failed");
                    PointingError::FrameUnavailable {
                        from: from.name().to_string(),
                        to: to.name().to_string(),
                    }
                })
        })?;

        // the toolkit stores matrices column by column
        Ok(Matrix3::from(rotate))
    }
}

/// [`EnvironmentBuilder`] for the [`SpiceEphemeris`].
///
/// Every kernel is furnished to a validation context when loaded, so unreadable or
/// malformed kernels are reported by [`EnvironmentBuilder::load_kernel`] rather than
/// at the first query.
pub struct SpiceEnvironmentBuilder {
    context: SpiceContext<'static>,
    pool: KernelPool,
    kernels: Vec<Utf8PathBuf>,
    bound_ephemerides: BTreeSet<String>,
    bound_frames: BTreeSet<String>,
}

impl SpiceEnvironmentBuilder {
    pub fn new() -> Self {
        SpiceEnvironmentBuilder {
            context: SpiceContext::new(),
            pool: KernelPool::new(),
            kernels: Vec::new(),
            bound_ephemerides: BTreeSet::new(),
            bound_frames: BTreeSet::new(),
        }
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

impl Default for SpiceEnvironmentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SpiceEnvironmentBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpiceEnvironmentBuilder")
            .field("kernels", &self.kernels)
            .field("keywords", &self.pool.len())
            .field("bound_ephemerides", &self.bound_ephemerides)
            .field("bound_frames", &self.bound_frames)
            .finish()
    }
}

impl EnvironmentBuilder for SpiceEnvironmentBuilder {
    fn load_kernel(&mut self, path: &Utf8Path) -> Result<(), PointingError> {
        let binary = is_binary_kernel(path);
        let mut pool = self.pool.clone();
        if !binary {
            pool.load_text_kernel(path)?;
        }
        furnish(&mut self.context, path)?;

        self.pool = pool;
        self.kernels.push(path.to_path_buf());
        debug!(kernel = %path, binary, loaded = self.kernels.len(), "furnished kernel");
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
        debug!(
            kernels = self.kernels.len(),
            keywords = self.pool.len(),
            bodies = self.bound_ephemerides.len(),
            frames = self.bound_frames.len(),
            "built SPICE ephemeris environment"
        );

        Ok(EphemerisEnvironment {
            pool: Arc::new(self.pool.clone()),
            provider: Arc::new(SpiceEphemeris::new(&self.kernels)),
        })
    }
}
