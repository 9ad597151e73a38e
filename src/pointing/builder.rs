//! # Instrument discovery and provider construction
//!
//! [`SpicePointingProviderBuilder`] turns a list of metakernels plus a target and
//! spacecraft description into a [`SpicePointingProvider`].
//!
//! Construction loads every metakernel into an [`EnvironmentBuilder`] and binds the
//! identifiers every provider needs: target body and frame, spacecraft and spacecraft
//! frame, `SUN`, `EARTH` and the inertial frame `J2000`. Each builder owns a fresh
//! [`IdRegistry`], so providers built in the same process never share identifiers.
//!
//! Instruments are discovered from the kernel pool by scanning for `INS<id>_FOV_FRAME`
//! keywords. Discovery needs a built environment, which is the most expensive step of
//! the whole subsystem: it runs at most once per builder and is memoized.
//!
//! An instrument is named, in order of preference, by:
//!
//! 1. its `INS<id>_NAME` keyword,
//! 2. the `NAIF_BODY_NAME` entry paired with `<id>` in `NAIF_BODY_CODE`,
//! 3. its FOV frame name, or `INS<id>` when several unnamed instruments share that frame.
//!
//! Two instruments carrying the same name are a configuration error.
//!
//! ## Example
//!
//! ```rust,ignore
//! let provider = SpicePointingProviderBuilder::new(
//!     env_builder,
//!     &[Utf8PathBuf::from("kernels/dart.tm")],
//!     "DIDYMOS",
//!     "DIDYMOS_SYSTEM_BARYCENTER",
//!     "DART_SPACECRAFT",
//!     "DART_SPACECRAFT",
//! )?
//! .include_instrument(&["DART_DRACO"])?
//! .build()?;
//! ```
use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use itertools::Itertools;
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use tracing::{debug, info};

use super::{
    provider::{InstrumentBinding, ProviderParts, SpicePointingProvider},
    snapshot::PointingFrames,
};
use crate::{
    config::SpiceInfo,
    constants::{InstrumentCode, EARTH_NAME, INERTIAL_FRAME_NAME, SUN_NAME},
    ephemeris::{EnvironmentBuilder, EphemerisEnvironment},
    ids::{EphemerisId, FrameId, IdRegistry},
    kernel_pool::KernelPool,
    pointing_errors::PointingError,
};

static FOV_FRAME_KEYWORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"^INS(-?\d+)_FOV_FRAME$").unwrap());

/// An instrument found in the kernel pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredInstrument {
    pub name: String,
    pub code: InstrumentCode,
    pub frame_name: String,
}

/// `INS<id>_NAME`, or the `NAIF_BODY_NAME` paired with `code`.
fn declared_name(pool: &KernelPool, code: InstrumentCode) -> Option<String> {
    if let Some(name) = pool.strings(&format!("INS{code}_NAME")).and_then(|names| names.first()) {
        return Some(name.clone());
    }

    // NAIF_BODY_NAME / NAIF_BODY_CODE are parallel arrays
    pool.integers("NAIF_BODY_CODE")
        .zip(pool.strings("NAIF_BODY_NAME"))
        .and_then(|(codes, names)| {
            codes
                .iter()
                .position(|c| *c == code)
                .and_then(|i| names.get(i).cloned())
        })
}

/// Every instrument declared in `pool`, sorted by name.
///
/// Instruments without a declared name take their FOV frame name. When several of
/// them share a frame, each is named `INS<id>` instead.
///
/// Errors
/// ----------
/// * [`PointingError::DuplicateInstrumentName`] if two instruments still end up with
///   the same name.
pub fn discover_instruments(pool: &KernelPool) -> Result<Vec<DiscoveredInstrument>, PointingError> {
    let mut declared = Vec::new();
    for keyword in pool.keywords() {
        let Some(code) = FOV_FRAME_KEYWORD
            .captures(keyword)
            .and_then(|captures| captures[1].parse::<InstrumentCode>().ok())
        else {
            continue;
        };
        let frame_name = pool.require_string(keyword)?.to_string();
        declared.push((declared_name(pool, code), code, frame_name));
    }

    let frame_fallbacks = declared
        .iter()
        .filter(|(name, ..)| name.is_none())
        .counts_by(|(_, _, frame_name)| frame_name.clone());

    let instruments = declared
        .into_iter()
        .map(|(name, code, frame_name)| {
            let name = name.unwrap_or_else(|| {
                if frame_fallbacks.get(&frame_name).copied().unwrap_or(0) > 1 {
                    format!("INS{code}")
                } else {
                    frame_name.clone()
                }
            });
            DiscoveredInstrument {
                name,
                code,
                frame_name,
            }
        })
        .sorted_by(|a, b| a.name.cmp(&b.name).then(a.code.cmp(&b.code)))
        .collect_vec();

    if let Some((first, second)) = instruments.iter().tuple_windows().find(|(a, b)| a.name == b.name) {
        return Err(PointingError::DuplicateInstrumentName {
            name: first.name.clone(),
            first: first.code,
            second: second.code,
        });
    }
    Ok(instruments)
}

#[derive(Debug)]
pub struct SpicePointingProviderBuilder<B: EnvironmentBuilder> {
    env_builder: B,
    ids: IdRegistry,
    frames: PointingFrames,
    sun: EphemerisId,
    earth: EphemerisId,
    discovered: OnceCell<Vec<DiscoveredInstrument>>,
    included: BTreeMap<String, DiscoveredInstrument>,
}

impl<B: EnvironmentBuilder> SpicePointingProviderBuilder<B> {
    /// Load the metakernels and bind the identifiers every provider needs.
    ///
    /// Arguments
    /// -----------------
    /// * `env_builder`: environment to load the kernels into.
    /// * `metakernels`: metakernel paths, loaded in order.
    /// * `target_name`, `target_frame_name`: target body and its body-fixed frame.
    /// * `spacecraft_name`, `spacecraft_frame_name`: spacecraft and its frame.
    ///
    /// Errors
    /// ----------
    /// * [`PointingError::NoKernelsLoaded`] if the metakernels list no kernel at all.
    /// * Any error raised while reading a metakernel or loading a kernel.
    pub fn new(
        mut env_builder: B,
        metakernels: &[Utf8PathBuf],
        target_name: &str,
        target_frame_name: &str,
        spacecraft_name: &str,
        spacecraft_frame_name: &str,
    ) -> Result<Self, PointingError> {
        for metakernel in metakernels {
            let loaded = env_builder.load_metakernel(metakernel)?;
            debug!(metakernel = %metakernel, kernels = loaded, "loaded metakernel");
        }
        if env_builder.kernel_count() == 0 {
            return Err(PointingError::NoKernelsLoaded);
        }

        let mut ids = IdRegistry::new();
        let frames = PointingFrames {
            target: ids.ephemeris_id(target_name),
            target_frame: ids.frame_id(target_frame_name),
            spacecraft: ids.ephemeris_id(spacecraft_name),
            spacecraft_frame: ids.frame_id(spacecraft_frame_name),
            inertial_frame: ids.frame_id(INERTIAL_FRAME_NAME),
        };
        let sun = ids.ephemeris_id(SUN_NAME);
        let earth = ids.ephemeris_id(EARTH_NAME);

        for body in [&frames.target, &frames.spacecraft, &sun, &earth] {
            env_builder.bind_ephemeris(body);
        }
        for frame in [&frames.target_frame, &frames.spacecraft_frame, &frames.inertial_frame] {
            env_builder.bind_frame(frame);
        }

        Ok(SpicePointingProviderBuilder {
            env_builder,
            ids,
            frames,
            sun,
            earth,
            discovered: OnceCell::new(),
            included: BTreeMap::new(),
        })
    }

    /// Builder configured from a [`SpiceInfo`]: binds every listed body and frame, then
    /// includes the listed instruments and every instrument of the listed frames.
    pub fn from_spice_info(
        env_builder: B,
        metakernels: &[Utf8PathBuf],
        info: &SpiceInfo,
    ) -> Result<Self, PointingError> {
        let mut builder = Self::new(
            env_builder,
            metakernels,
            &info.body_name,
            &info.body_frame_name,
            &info.sc_id,
            &info.sc_frame_name,
        )?;

        for body in &info.body_names_to_bind {
            builder.bind_ephemeris(body);
        }
        for frame in &info.body_frames_to_bind {
            builder.bind_frame(frame);
        }

        let names = info.instrument_names_to_bind.iter().map(String::as_str).collect_vec();
        builder = builder.include_instrument(&names)?;
        for frame in &info.instrument_frame_names_to_bind {
            builder = builder.include_all_instruments_with_frame(frame)?;
        }
        Ok(builder)
    }

    /// Bind an auxiliary body whose position will be queried from the snapshots.
    pub fn bind_ephemeris(&mut self, name: &str) -> EphemerisId {
        let id = self.ids.ephemeris_id(name);
        self.env_builder.bind_ephemeris(&id);
        id
    }

    /// Bind an auxiliary frame.
    pub fn bind_frame(&mut self, name: &str) -> FrameId {
        let id = self.ids.frame_id(name);
        self.env_builder.bind_frame(&id);
        id
    }

    pub fn env_builder(&self) -> &B {
        &self.env_builder
    }

    pub fn frames(&self) -> &PointingFrames {
        &self.frames
    }

    /// Instruments declared by the loaded kernels, discovered on first call.
    pub fn discovered_instruments(&self) -> Result<&[DiscoveredInstrument], PointingError> {
        self.discovered
            .get_or_try_init(|| {
                let EphemerisEnvironment { pool, .. } = self.env_builder.build()?;
                let instruments = discover_instruments(&pool)?;
                info!(
                    instruments = %instruments.iter().map(|i| i.name.as_str()).join(", "),
                    "discovered instruments"
                );
                Ok(instruments)
            })
            .map(Vec::as_slice)
    }

    /// Names of the discovered instruments, sorted.
    pub fn instrument_names(&self) -> Result<Vec<String>, PointingError> {
        Ok(self
            .discovered_instruments()?
            .iter()
            .map(|i| i.name.clone())
            .collect_vec())
    }

    /// Names of the instruments included so far.
    pub fn included_instrument_names(&self) -> Vec<String> {
        self.included.keys().cloned().collect()
    }

    /// Include the named instruments.
    ///
    /// Either every name is known and all are included, or the first unknown name is
    /// reported with [`PointingError::UnknownInstrument`] and nothing is included.
    pub fn include_instrument(mut self, names: &[&str]) -> Result<Self, PointingError> {
        let selected = {
            let discovered = self.discovered_instruments()?;
            names
                .iter()
                .map(|name| {
                    discovered
                        .iter()
                        .find(|i| i.name == *name)
                        .cloned()
                        .ok_or_else(|| PointingError::UnknownInstrument(name.to_string()))
                })
                .collect::<Result<Vec<_>, _>>()?
        };
        for instrument in selected {
            self.included.insert(instrument.name.clone(), instrument);
        }
        Ok(self)
    }

    /// Include every discovered instrument.
    pub fn include_all_instruments(mut self) -> Result<Self, PointingError> {
        let all = self.discovered_instruments()?.to_vec();
        for instrument in all {
            self.included.insert(instrument.name.clone(), instrument);
        }
        Ok(self)
    }

    fn instruments_with_frame(&self, frame_name: &str) -> Result<Vec<DiscoveredInstrument>, PointingError> {
        let matching = self
            .discovered_instruments()?
            .iter()
            .filter(|i| i.frame_name == frame_name)
            .cloned()
            .collect_vec();
        if matching.is_empty() {
            return Err(PointingError::UnknownFrame(frame_name.to_string()));
        }
        Ok(matching)
    }

    /// Include every instrument whose FOV frame is `frame_name`.
    ///
    /// Fails with [`PointingError::UnknownFrame`] if no instrument uses that frame.
    pub fn include_all_instruments_with_frame(mut self, frame_name: &str) -> Result<Self, PointingError> {
        for instrument in self.instruments_with_frame(frame_name)? {
            self.included.insert(instrument.name.clone(), instrument);
        }
        Ok(self)
    }

    /// Include the first instrument, by name, whose FOV frame is `frame_name`.
    pub fn include_first_instrument_with_frame(mut self, frame_name: &str) -> Result<Self, PointingError> {
        let first = self.instruments_with_frame(frame_name)?.swap_remove(0);
        self.included.insert(first.name.clone(), first);
        Ok(self)
    }

    /// Bind the FOV frames of the included instruments and build the provider.
    ///
    /// The provider defaults its current instrument when exactly one is included.
    pub fn build(mut self) -> Result<SpicePointingProvider, PointingError> {
        let mut instruments = BTreeMap::new();
        for (name, instrument) in &self.included {
            let frame = self.ids.frame_id(&instrument.frame_name);
            self.env_builder.bind_frame(&frame);
            instruments.insert(
                name.clone(),
                InstrumentBinding {
                    code: instrument.code,
                    frame,
                },
            );
        }

        let EphemerisEnvironment { pool, provider } = self.env_builder.build()?;
        info!(
            target = %self.frames.target,
            spacecraft = %self.frames.spacecraft,
            instruments = %instruments.keys().join(", "),
            "built pointing provider"
        );

        Ok(SpicePointingProvider::new(ProviderParts {
            ephemeris: provider,
            pool,
            frames: self.frames,
            sun: self.sun,
            earth: self.earth,
            ids: self.ids,
            instruments,
        }))
    }
}

#[cfg(test)]
mod builder_test {
    use super::*;
    use crate::{
        ephemeris::kinematic::KinematicEnvironmentBuilder,
        pointing::PointingProvider,
        unit_test_global::{dart_builder, dart_environment},
    };

    #[test]
    fn test_discovery_and_naming() {
        let builder = dart_builder();
        let discovered = builder.discovered_instruments().unwrap();
        assert_eq!(
            discovered
                .iter()
                .map(|i| (i.name.as_str(), i.code, i.frame_name.as_str()))
                .collect_vec(),
            vec![
                ("DART_CORNERS_CAM", -1236, "DART_CORNERS_CAM"),
                ("DART_DRACO", -1234, "DART_DRACO"),
                ("DART_STAR_TRACKER", -1235, "DART_SPACECRAFT"),
            ]
        );
    }

    #[test]
    fn test_discovery_is_memoized() {
        let builder = dart_builder();
        let first = builder.discovered_instruments().unwrap().as_ptr();
        let second = builder.discovered_instruments().unwrap().as_ptr();
        assert_eq!(first, second);
    }

    #[test]
    fn test_no_kernels() {
        let err = SpicePointingProviderBuilder::new(
            KinematicEnvironmentBuilder::new(),
            &[],
            "DIDYMOS",
            "DIDYMOS_SYSTEM_BARYCENTER",
            "DART_SPACECRAFT",
            "DART_SPACECRAFT",
        )
        .unwrap_err();
        assert_eq!(err, PointingError::NoKernelsLoaded);
    }

    #[test]
    fn test_standard_bindings() {
        let builder = dart_builder();
        let bound = builder.env_builder().bound_ephemerides().collect_vec();
        assert_eq!(bound, vec!["DART_SPACECRAFT", "DIDYMOS", "EARTH", "SUN"]);
        let frames = builder.env_builder().bound_frames().collect_vec();
        assert_eq!(frames, vec!["DART_SPACECRAFT", "DIDYMOS_SYSTEM_BARYCENTER", "J2000"]);
    }

    #[test]
    fn test_include_is_all_or_nothing() {
        let err = dart_builder()
            .include_instrument(&["DART_DRACO", "bogus"])
            .unwrap_err();
        assert_eq!(err, PointingError::UnknownInstrument("bogus".into()));

        let builder = dart_builder().include_instrument(&["DART_DRACO"]).unwrap();
        assert_eq!(builder.included_instrument_names(), vec!["DART_DRACO"]);
    }

    #[test]
    fn test_include_by_frame() {
        let builder = dart_builder()
            .include_all_instruments_with_frame("DART_SPACECRAFT")
            .unwrap();
        assert_eq!(builder.included_instrument_names(), vec!["DART_STAR_TRACKER"]);

        assert_eq!(
            dart_builder().include_all_instruments_with_frame("IAU_PHOBOS").unwrap_err(),
            PointingError::UnknownFrame("IAU_PHOBOS".into())
        );
        assert_eq!(
            dart_builder().include_first_instrument_with_frame("IAU_PHOBOS").unwrap_err(),
            PointingError::UnknownFrame("IAU_PHOBOS".into())
        );

        let builder = dart_builder().include_first_instrument_with_frame("DART_DRACO").unwrap();
        assert_eq!(builder.included_instrument_names(), vec!["DART_DRACO"]);
    }

    #[test]
    fn test_build_binds_instrument_frames() {
        let mut builder = dart_builder().include_all_instruments().unwrap();
        let phobos = builder.bind_ephemeris("PHOBOS");
        let provider = builder.build().unwrap();

        assert_eq!(
            provider.instrument_names(),
            vec!["DART_CORNERS_CAM", "DART_DRACO", "DART_STAR_TRACKER"]
        );
        assert_eq!(provider.current_instrument_name(), None);
        assert!(provider.ephemeris_id("PHOBOS").unwrap().same_handle(&phobos));
        assert_eq!(provider.frame_id("DART_DRACO").unwrap().name(), "DART_DRACO");
        assert_eq!(provider.instrument("DART_STAR_TRACKER").unwrap().code, -1235);
    }

    #[test]
    fn test_zero_instruments() {
        let provider = dart_builder().build().unwrap();
        assert!(provider.instrument_names().is_empty());
        assert_eq!(provider.current_instrument_name(), None);
    }

    #[test]
    fn test_fresh_registry_per_builder() {
        let first = dart_builder().build().unwrap();
        let second = dart_builder().build().unwrap();
        assert_eq!(first.sun_id(), second.sun_id());
        assert!(!first.sun_id().same_handle(second.sun_id()));
    }

    #[test]
    fn test_unnamed_instruments_sharing_a_frame() {
        let mut env = dart_environment();
        env.load_kernel_text(
            "cam.ti",
            "\\begindata\nINS-1_FOV_FRAME = 'CAM'\nINS-2_FOV_FRAME = 'CAM'\n",
        )
        .unwrap();
        let builder = SpicePointingProviderBuilder::new(
            env,
            &[],
            "DIDYMOS",
            "DIDYMOS_SYSTEM_BARYCENTER",
            "DART_SPACECRAFT",
            "DART_SPACECRAFT",
        )
        .unwrap();

        let cams = builder
            .discovered_instruments()
            .unwrap()
            .iter()
            .filter(|i| i.frame_name == "CAM")
            .map(|i| (i.name.as_str(), i.code))
            .collect_vec();
        assert_eq!(cams, vec![("INS-1", -1), ("INS-2", -2)]);

        let provider = builder.include_all_instruments_with_frame("CAM").unwrap().build().unwrap();
        assert_eq!(provider.instrument_names(), vec!["INS-1", "INS-2"]);
        assert_eq!(provider.instrument("INS-1").unwrap().code, -1);
        assert_eq!(provider.instrument("INS-2").unwrap().code, -2);
    }

    #[test]
    fn test_duplicate_declared_names() {
        let mut pool = KernelPool::new();
        pool.merge_text(
            "twins.ti",
            "\\begindata\nINS-1_FOV_FRAME = 'CAM_A'\nINS-1_NAME = 'CAM'\nINS-2_FOV_FRAME = 'CAM_B'\nINS-2_NAME = 'CAM'\n",
        )
        .unwrap();
        assert_eq!(
            discover_instruments(&pool),
            Err(PointingError::DuplicateInstrumentName {
                name: "CAM".into(),
                first: -2,
                second: -1
            })
        );

        // a declared name may not collide with a frame-name fallback either
        let mut pool = KernelPool::new();
        pool.merge_text(
            "clash.ti",
            "\\begindata\nINS-1_FOV_FRAME = 'CAM'\nINS-2_FOV_FRAME = 'OTHER'\nINS-2_NAME = 'CAM'\n",
        )
        .unwrap();
        assert!(matches!(
            discover_instruments(&pool),
            Err(PointingError::DuplicateInstrumentName { .. })
        ));
    }

    #[test]
    fn test_discover_without_name_keywords() {
        let mut env = dart_environment();
        env.load_kernel_text("extra.ti", "\\begindata\nINS-77_FOV_FRAME = 'LONELY_FRAME'\n")
            .unwrap();
        let pool = env.build().unwrap().pool;
        let lonely = discover_instruments(&pool)
            .unwrap()
            .into_iter()
            .find(|i| i.code == -77)
            .unwrap();
        assert_eq!(lonely.name, "LONELY_FRAME");
    }
}
