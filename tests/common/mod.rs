#![allow(dead_code)]

use std::f64::consts::FRAC_PI_2;

use approx::assert_relative_eq;
use camino::{Utf8Path, Utf8PathBuf};
use nalgebra::{Rotation3, Vector3};
use spice_pointing::{
    ephemeris::kinematic::{KinematicBody, KinematicEnvironmentBuilder, KinematicFrame},
    metakernel::write_metakernel,
};
use tempfile::TempDir;

/// DART impact, 2022-09-26T23:14:24.183 UTC.
pub const IMPACT_UTC: &str = "2022-09-26T23:14:24.183";

/// Didymos rotation rate (rad/s), one turn in about 2.26 h.
pub const DIDYMOS_RATE: f64 = 7.72e-4;

/// Spacecraft range to Didymos (km).
pub const RANGE: f64 = 1000.0;

pub fn didymos_position() -> Vector3<f64> {
    Vector3::new(1.0e8, 0.0, 0.0)
}

pub const DRACO_IK: &str = r"
DRACO instrument kernel

\begindata

   INS-1234_NAME             = 'DART_DRACO'
   INS-1234_FOV_FRAME        = 'DART_DRACO'
   INS-1234_FOV_SHAPE        = 'RECTANGLE'
   INS-1234_FOV_CLASS_SPEC   = 'ANGLES'
   INS-1234_BORESIGHT        = ( 1.0, 0.0, 0.0 )
   INS-1234_FOV_REF_VECTOR   = ( 0.0, 0.0, 1.0 )
   INS-1234_FOV_REF_ANGLE    = 0.145
   INS-1234_FOV_CROSS_ANGLE  = 0.145
   INS-1234_FOV_ANGLE_UNITS  = 'DEGREES'

\begintext
";

pub const SMART_NAV_IK: &str = r"
SMART Nav cameras, two instruments sharing one frame

\begindata

   NAIF_BODY_NAME += ( 'DART_SMARTNAV_A', 'DART_SMARTNAV_B' )
   NAIF_BODY_CODE += ( -1301, -1302 )

   INS-1301_FOV_FRAME        = 'DART_SMARTNAV'
   INS-1301_FOV_SHAPE        = 'RECTANGLE'
   INS-1301_FOV_CLASS_SPEC   = 'ANGLES'
   INS-1301_BORESIGHT        = ( 0.0 0.0 1.0 )
   INS-1301_FOV_REF_VECTOR   = ( 1.0 0.0 0.0 )
   INS-1301_FOV_REF_ANGLE    = 1.0

   INS-1302_FOV_FRAME        = 'DART_SMARTNAV'
   INS-1302_FOV_SHAPE        = 'RECTANGLE'
   INS-1302_FOV_CLASS_SPEC   = 'ANGLES'
   INS-1302_BORESIGHT        = ( 0.0 0.0 1.0 )
   INS-1302_FOV_REF_VECTOR   = ( 0.0 1.0 0.0 )
   INS-1302_FOV_REF_ANGLE    = 60.0
   INS-1302_FOV_CROSS_ANGLE  = 30.0
   INS-1302_FOV_ANGLE_UNITS  = 'ARCMINUTES'

\begintext
";

/// Kernels written to a temporary directory, with a metakernel listing them.
pub struct KernelSet {
    pub dir: TempDir,
    pub metakernel: Utf8PathBuf,
}

impl KernelSet {
    pub fn root(&self) -> &Utf8Path {
        self.metakernel.parent().unwrap()
    }
}

pub fn write_kernel_set() -> KernelSet {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    std::fs::create_dir_all(root.join("ik")).unwrap();

    let draco = root.join("ik/dart_draco.ti");
    let smart_nav = root.join("ik/dart_smartnav.ti");
    std::fs::write(&draco, DRACO_IK).unwrap();
    std::fs::write(&smart_nav, SMART_NAV_IK).unwrap();

    let metakernel = root.join("dart.tm");
    write_metakernel(&metakernel, &[draco, smart_nav]).unwrap();

    KernelSet { dir, metakernel }
}

/// Didymos at rest, DART `RANGE` km further from the Sun on the same line, Didymos
/// body-fixed frame spinning about J2000 +Z, DRACO boresight along spacecraft -Y.
pub fn dart_kinematics() -> KinematicEnvironmentBuilder {
    KinematicEnvironmentBuilder::new()
        .with_body("SUN", KinematicBody::stationary(Vector3::zeros()))
        .with_body("EARTH", KinematicBody::stationary(Vector3::new(0.0, 1.496e8, 0.0)))
        .with_body("DIDYMOS", KinematicBody::stationary(didymos_position()))
        .with_body(
            "DART_SPACECRAFT",
            KinematicBody::stationary(didymos_position() + Vector3::x() * RANGE),
        )
        .with_frame(
            "DIDYMOS_SYSTEM_BARYCENTER",
            KinematicFrame::rotating("DIDYMOS", Vector3::z(), DIDYMOS_RATE),
        )
        .with_frame(
            "DART_SPACECRAFT",
            KinematicFrame::fixed(Rotation3::from_axis_angle(&Vector3::z_axis(), FRAC_PI_2)),
        )
        .with_frame("DART_DRACO", KinematicFrame::inertial())
        .with_frame("DART_SMARTNAV", KinematicFrame::inertial())
}

/// Unit vector of the J2000 +X axis seen from the Didymos frame at `time_at_target`.
pub fn j2000_x_in_didymos_frame(time_at_target: f64) -> Vector3<f64> {
    let theta = DIDYMOS_RATE * time_at_target;
    Vector3::new(theta.cos(), -theta.sin(), 0.0)
}

pub fn assert_unit(v: &Vector3<f64>) {
    assert_relative_eq!(v.norm(), 1.0, epsilon = 1e-14);
}
