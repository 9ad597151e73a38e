//! # Memoizing pointing provider
//!
//! [`SpicePointingProvider`] is the immutable product of
//! [`SpicePointingProviderBuilder::build`](super::builder::SpicePointingProviderBuilder::build).
//! It holds the ephemeris provider, the kernel pool, the target and spacecraft
//! identifiers, and the frozen map of exposed instruments.
//!
//! Queries are memoized per provider:
//!
//! * one [`SpiceInstrumentPointing`] per `(time, instrument frame, target frame)` key,
//!   returned as the same [`Arc`] on every repeated query;
//! * one [`InstrumentFov`] per instrument code, since boresight and field of view do
//!   not depend on time.
//!
//! Cache keys compare times **exactly** (bit for bit through [`OrderedFloat`]): a time
//! re-derived through a different computation that rounds differently is a new key.
//!
//! Both caches sit behind a [`Mutex`], so a provider can be shared between threads.
use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, PoisonError},
};

use hifitime::Epoch;
use nalgebra::Matrix3;
use ordered_float::OrderedFloat;
use tracing::debug;

use super::{
    snapshot::{PointingFrames, SpiceInstrumentPointing},
    PointingProvider,
};
use crate::{
    constants::{EphemerisTime, InstrumentCode},
    ephemeris::AberratedEphemerisProvider,
    fov::{extract_fov, InstrumentFov},
    ids::{EphemerisId, FrameId, IdRegistry},
    kernel_pool::KernelPool,
    pointing_errors::PointingError,
    time::epoch_to_et,
};

/// NAIF code and FOV frame of one exposed instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentBinding {
    pub code: InstrumentCode,
    pub frame: FrameId,
}

type PointingKey = (OrderedFloat<f64>, FrameId, FrameId);

#[derive(Debug)]
pub struct SpicePointingProvider {
    ephemeris: Arc<dyn AberratedEphemerisProvider>,
    pool: Arc<KernelPool>,
    frames: PointingFrames,
    sun: EphemerisId,
    earth: EphemerisId,
    ids: IdRegistry,
    instruments: BTreeMap<String, InstrumentBinding>,
    current_instrument: Option<String>,

    pointings: Mutex<HashMap<PointingKey, Arc<SpiceInstrumentPointing>>>,
    fovs: Mutex<HashMap<InstrumentCode, InstrumentFov>>,
}

/// Everything a builder hands over to a new provider.
#[derive(Debug)]
pub(crate) struct ProviderParts {
    pub ephemeris: Arc<dyn AberratedEphemerisProvider>,
    pub pool: Arc<KernelPool>,
    pub frames: PointingFrames,
    pub sun: EphemerisId,
    pub earth: EphemerisId,
    pub ids: IdRegistry,
    pub instruments: BTreeMap<String, InstrumentBinding>,
}

impl SpicePointingProvider {
    pub(crate) fn new(parts: ProviderParts) -> Self {
        let current_instrument = if parts.instruments.len() == 1 {
            parts.instruments.keys().next().cloned()
        } else {
            None
        };

        SpicePointingProvider {
            ephemeris: parts.ephemeris,
            pool: parts.pool,
            frames: parts.frames,
            sun: parts.sun,
            earth: parts.earth,
            ids: parts.ids,
            instruments: parts.instruments,
            current_instrument,
            pointings: Mutex::new(HashMap::new()),
            fovs: Mutex::new(HashMap::new()),
        }
    }

    fn binding(&self, instrument: &str) -> Result<&InstrumentBinding, PointingError> {
        self.instruments
            .get(instrument)
            .ok_or_else(|| PointingError::UnknownInstrument(instrument.to_string()))
    }

    /// Field of view of an exposed instrument, extracted from the kernel pool once.
    pub fn instrument_fov(&self, instrument: &str) -> Result<InstrumentFov, PointingError> {
        let binding = self.binding(instrument)?;
        self.fov(binding)
    }

    fn fov(&self, binding: &InstrumentBinding) -> Result<InstrumentFov, PointingError> {
        let mut fovs = self.fovs.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(fov) = fovs.get(&binding.code) {
            return Ok(*fov);
        }
        let fov = extract_fov(&self.pool, binding.code, binding.frame.name())?;
        fovs.insert(binding.code, fov);
        Ok(fov)
    }

    /// Pointing of `instrument` at ephemeris time `time`.
    ///
    /// Arguments
    /// -----------------
    /// * `instrument`: one of [`PointingProvider::instrument_names`].
    /// * `time`: ephemeris time (TDB seconds past J2000) at the spacecraft.
    ///
    /// Return
    /// ----------
    /// * The memoized snapshot for `(time, instrument frame, target frame)`. Repeated
    ///   queries with the same key return the same [`Arc`].
    ///
    /// Errors
    /// ----------
    /// * [`PointingError::NonFiniteTime`] if `time` is NaN or infinite.
    /// * [`PointingError::UnknownInstrument`] if the instrument is not exposed.
    /// * Kernel pool and FOV errors from [`extract_fov`] on the first query of an instrument.
    pub fn provide(
        &self,
        instrument: &str,
        time: EphemerisTime,
    ) -> Result<Arc<SpiceInstrumentPointing>, PointingError> {
        if !time.is_finite() {
            return Err(PointingError::NonFiniteTime(time));
        }
        let binding = self.binding(instrument)?;

        let key = (
            OrderedFloat(time),
            binding.frame.clone(),
            self.frames.target_frame.clone(),
        );
        if let Some(pointing) = self
            .pointings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(Arc::clone(pointing));
        }

        let fov = self.fov(binding)?;
        let pointing = Arc::new(SpiceInstrumentPointing::new(
            Arc::clone(&self.ephemeris),
            self.frames.clone(),
            binding.frame.clone(),
            &fov,
            time,
        ));

        let mut pointings = self.pointings.lock().unwrap_or_else(PoisonError::into_inner);
        // another thread may have filled the slot in the meantime
        let pointing = Arc::clone(pointings.entry(key).or_insert(pointing));
        debug!(
            instrument,
            time,
            cached = pointings.len(),
            "created instrument pointing"
        );
        Ok(pointing)
    }

    /// [`SpicePointingProvider::provide`] with the time given as an [`Epoch`].
    pub fn provide_at_epoch(
        &self,
        instrument: &str,
        epoch: Epoch,
    ) -> Result<Arc<SpiceInstrumentPointing>, PointingError> {
        self.provide(instrument, epoch_to_et(epoch))
    }

    /// Rotation from frame `from` to frame `to` at `time`, for orienting bodies.
    ///
    /// Both frames must have been bound by the builder.
    pub fn body_orientation(
        &self,
        from: &str,
        to: &str,
        time: EphemerisTime,
    ) -> Result<Matrix3<f64>, PointingError> {
        if !time.is_finite() {
            return Err(PointingError::NonFiniteTime(time));
        }
        let from = self.frame_id(from)?;
        let to = self.frame_id(to)?;
        self.ephemeris.frame_transform(from, to, time)
    }

    /// Identifier of a body bound by the builder.
    pub fn ephemeris_id(&self, name: &str) -> Option<&EphemerisId> {
        self.ids.get_ephemeris_id(name)
    }

    /// Identifier of a frame bound by the builder.
    pub fn frame_id(&self, name: &str) -> Result<&FrameId, PointingError> {
        self.ids
            .get_frame_id(name)
            .ok_or_else(|| PointingError::UnknownFrame(name.to_string()))
    }

    pub fn instrument(&self, name: &str) -> Option<&InstrumentBinding> {
        self.instruments.get(name)
    }

    pub fn sun_id(&self) -> &EphemerisId {
        &self.sun
    }

    pub fn earth_id(&self) -> &EphemerisId {
        &self.earth
    }

    pub fn target_id(&self) -> &EphemerisId {
        &self.frames.target
    }

    pub fn target_frame(&self) -> &FrameId {
        &self.frames.target_frame
    }

    pub fn spacecraft_id(&self) -> &EphemerisId {
        &self.frames.spacecraft
    }

    pub fn spacecraft_frame(&self) -> &FrameId {
        &self.frames.spacecraft_frame
    }

    pub fn kernel_pool(&self) -> &KernelPool {
        &self.pool
    }

    pub fn ephemeris_provider(&self) -> &Arc<dyn AberratedEphemerisProvider> {
        &self.ephemeris
    }

    /// Number of distinct snapshots computed so far.
    pub fn cached_pointing_count(&self) -> usize {
        self.pointings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl PointingProvider for SpicePointingProvider {
    type Pointing = Arc<SpiceInstrumentPointing>;

    fn provide(&self, instrument: &str, time: EphemerisTime) -> Result<Self::Pointing, PointingError> {
        SpicePointingProvider::provide(self, instrument, time)
    }

    fn instrument_names(&self) -> Vec<String> {
        self.instruments.keys().cloned().collect()
    }

    fn current_instrument_name(&self) -> Option<&str> {
        self.current_instrument.as_deref()
    }

    fn set_current_instrument_name(&mut self, name: &str) -> Result<(), PointingError> {
        self.binding(name)?;
        self.current_instrument = Some(name.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod provider_test {
    use super::*;
    use crate::{
        pointing::InstrumentPointing,
        unit_test_global::{dart_provider, T0},
    };
    use approx::assert_relative_eq;

    #[test]
    fn test_repeated_query_returns_same_snapshot() {
        let provider = dart_provider(&["DART_DRACO"]);
        let first = provider.provide("DART_DRACO", T0).unwrap();
        let second = provider.provide("DART_DRACO", T0).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(provider.cached_pointing_count(), 1);

        let later = provider.provide("DART_DRACO", T0 + 1.0).unwrap();
        assert!(!Arc::ptr_eq(&first, &later));
        assert_eq!(provider.cached_pointing_count(), 2);
    }

    #[test]
    fn test_cache_key_is_exact() {
        let provider = dart_provider(&["DART_DRACO"]);
        let a = provider.provide("DART_DRACO", 0.3).unwrap();
        let b = provider.provide("DART_DRACO", 0.1 + 0.2).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_rejects_bad_queries() {
        let provider = dart_provider(&["DART_DRACO"]);
        assert_eq!(
            provider.provide("bogus", T0).unwrap_err(),
            PointingError::UnknownInstrument("bogus".into())
        );
        assert!(matches!(
            provider.provide("DART_DRACO", f64::NAN),
            Err(PointingError::NonFiniteTime(_))
        ));
        assert_eq!(
            provider.provide("DART_DRACO", f64::INFINITY).unwrap_err(),
            PointingError::NonFiniteTime(f64::INFINITY)
        );
        assert_eq!(provider.cached_pointing_count(), 0);
    }

    #[test]
    fn test_current_instrument() {
        let mut provider = dart_provider(&["DART_DRACO"]);
        assert_eq!(provider.current_instrument_name(), Some("DART_DRACO"));

        assert_eq!(
            provider.set_current_instrument_name("bogus"),
            Err(PointingError::UnknownInstrument("bogus".into()))
        );
        assert_eq!(provider.current_instrument_name(), Some("DART_DRACO"));

        let current = provider.provide_current(T0).unwrap();
        let named = provider.provide("DART_DRACO", T0).unwrap();
        assert!(Arc::ptr_eq(&current, &named));
    }

    #[test]
    fn test_no_current_instrument() {
        let mut provider = dart_provider(&["DART_DRACO", "DART_STAR_TRACKER"]);
        assert_eq!(provider.current_instrument_name(), None);
        assert_eq!(
            provider.provide_current(T0).unwrap_err(),
            PointingError::NoCurrentInstrument
        );

        provider.set_current_instrument_name("DART_STAR_TRACKER").unwrap();
        assert_eq!(provider.provide_current(T0).unwrap().instrument_frame().name(), "DART_SPACECRAFT");
    }

    #[test]
    fn test_corners_instrument_fails_on_query() {
        let provider = dart_provider(&["DART_CORNERS_CAM"]);
        assert_eq!(
            provider.provide("DART_CORNERS_CAM", T0).unwrap_err(),
            PointingError::CornersFovNotSupported("DART_CORNERS_CAM".into())
        );
    }

    #[test]
    fn test_fov_is_cached_per_instrument() {
        let provider = dart_provider(&["DART_DRACO"]);
        let fov = provider.instrument_fov("DART_DRACO").unwrap();
        provider.provide("DART_DRACO", T0).unwrap();
        provider.provide("DART_DRACO", T0 + 10.0).unwrap();
        assert_eq!(provider.fovs.lock().unwrap().len(), 1);
        assert_eq!(provider.instrument_fov("DART_DRACO").unwrap(), fov);
    }

    #[test]
    fn test_body_orientation() {
        let provider = dart_provider(&["DART_DRACO"]);
        let rotation = provider
            .body_orientation("J2000", "DIDYMOS_SYSTEM_BARYCENTER", T0)
            .unwrap();
        let theta = crate::unit_test_global::OMEGA * T0;
        assert_relative_eq!(
            rotation * nalgebra::Vector3::x(),
            nalgebra::Vector3::new(theta.cos(), -theta.sin(), 0.0),
            epsilon = 1e-12
        );
        assert_eq!(
            provider.body_orientation("IAU_PHOBOS", "J2000", T0),
            Err(PointingError::UnknownFrame("IAU_PHOBOS".into()))
        );
    }

    #[test]
    fn test_provider_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SpicePointingProvider>();
        assert_send_sync::<SpiceInstrumentPointing>();
    }

    #[test]
    fn test_concurrent_queries_share_snapshots() {
        let provider = Arc::new(dart_provider(&["DART_DRACO"]));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let provider = Arc::clone(&provider);
                std::thread::spawn(move || {
                    let pointing = provider.provide("DART_DRACO", T0).unwrap();
                    pointing.boresight().unwrap();
                    pointing
                })
            })
            .collect();
        let pointings: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(pointings.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(provider.cached_pointing_count(), 1);
    }
}
