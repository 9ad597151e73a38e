mod common;

use approx::assert_relative_eq;
use camino::Utf8PathBuf;
use nalgebra::Vector3;
use spice_pointing::{
    ephemeris::{spice::SpiceEnvironmentBuilder, EnvironmentBuilder},
    metakernel::write_metakernel,
    pointing::{builder::SpicePointingProviderBuilder, InstrumentPointing, PointingProvider},
    pointing_errors::PointingError,
    time::utc_to_et,
};

use crate::common::{assert_unit, write_kernel_set, IMPACT_UTC};

const DRACO_FK: &str = r"
DRACO frame, turned half a revolution about J2000 +Z

\begindata

   FRAME_DART_DRACO            = -135101
   FRAME_-135101_NAME          = 'DART_DRACO'
   FRAME_-135101_CLASS         = 4
   FRAME_-135101_CLASS_ID      = -135101
   FRAME_-135101_CENTER        = -135
   TKFRAME_-135101_RELATIVE    = 'J2000'
   TKFRAME_-135101_SPEC        = 'ANGLES'
   TKFRAME_-135101_UNITS       = 'DEGREES'
   TKFRAME_-135101_AXES        = ( 3, 2, 1 )
   TKFRAME_-135101_ANGLES      = ( 180.0, 0.0, 0.0 )

\begintext
";

#[test]
fn test_toolkit_environment_from_metakernels() {
    let kernels = write_kernel_set();
    let fk = kernels.root().join("dart_draco.tf");
    std::fs::write(&fk, DRACO_FK).unwrap();
    let frames = kernels.root().join("frames.tm");
    write_metakernel(&frames, &[fk]).unwrap();

    let builder = SpicePointingProviderBuilder::new(
        SpiceEnvironmentBuilder::new(),
        &[kernels.metakernel.clone(), frames],
        "DIDYMOS",
        "DIDYMOS_SYSTEM_BARYCENTER",
        "DART_SPACECRAFT",
        "DART_SPACECRAFT",
    )
    .unwrap();
    assert_eq!(builder.env_builder().kernel_count(), 3);
    assert_eq!(
        builder.instrument_names().unwrap(),
        vec!["DART_DRACO", "DART_SMARTNAV_A", "DART_SMARTNAV_B"]
    );

    let provider = builder.include_instrument(&["DART_DRACO"]).unwrap().build().unwrap();

    let to_draco = provider.body_orientation("J2000", "DART_DRACO", 0.0).unwrap();
    assert_relative_eq!(to_draco * Vector3::x(), -Vector3::x(), epsilon = 1e-12);
    assert_relative_eq!(to_draco * Vector3::z(), Vector3::z(), epsilon = 1e-12);

    // no SPK loaded: the snapshot is built, evaluating it fails
    let pointing = provider.provide("DART_DRACO", 0.0).unwrap();
    assert!(matches!(
        pointing.boresight(),
        Err(PointingError::EphemerisUnavailable { .. })
    ));
}

/// DART approach with the mission kernels; `DART_METAKERNEL` names a metakernel
/// listing the SPK, CK, FK, SCLK, LSK and DRACO IK.
#[test]
#[ignore]
fn test_dart_draco_with_mission_kernels() {
    let metakernel = Utf8PathBuf::from(
        std::env::var("DART_METAKERNEL").expect("DART_METAKERNEL must name the mission metakernel"),
    );
    let provider = SpicePointingProviderBuilder::new(
        SpiceEnvironmentBuilder::new(),
        &[metakernel],
        "DIDYMOS",
        "DIDYMOS_SYSTEM_BARYCENTER",
        "DART_SPACECRAFT",
        "DART_SPACECRAFT",
    )
    .unwrap()
    .include_instrument(&["DART_DRACO"])
    .unwrap()
    .build()
    .unwrap();

    let t0 = utc_to_et(IMPACT_UTC).unwrap() - 60.0;
    let pointing = provider.provide("DART_DRACO", t0).unwrap();

    assert!(pointing.time_at_target().unwrap() < t0);
    assert_unit(&pointing.boresight().unwrap());
    assert_unit(&pointing.up_direction().unwrap());
    for corner in pointing.frustum().unwrap() {
        assert_unit(&corner);
    }

    // a minute before impact DRACO is locked on the Didymos system
    let to_target = -pointing.sc_position().unwrap().normalize();
    assert!(pointing.boresight().unwrap().angle(&to_target) < 1.0_f64.to_radians());

    let again = provider.provide_current(t0).unwrap();
    assert!(std::sync::Arc::ptr_eq(&pointing, &again));
}
