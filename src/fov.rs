//! # Instrument field of view extraction
//!
//! Reads an instrument's boresight and field of view from the kernel pool, following
//! the keyword conventions of the toolkit's `getfov` routine:
//!
//! | Keyword                    | Content                                         |
//! |----------------------------|-------------------------------------------------|
//! | `INS<id>_BORESIGHT`        | boresight, three doubles, instrument frame      |
//! | `INS<id>_FOV_SHAPE`        | `RECTANGLE`, `CIRCLE`, `ELLIPSE`, `POLYGON`     |
//! | `INS<id>_FOV_CLASS_SPEC`   | `ANGLES` or `CORNERS` (default `CORNERS`)       |
//! | `INS<id>_FOV_REF_VECTOR`   | reference vector, three doubles (`ANGLES`)      |
//! | `INS<id>_FOV_REF_ANGLE`    | half angle in the reference plane (`ANGLES`)    |
//! | `INS<id>_FOV_CROSS_ANGLE`  | half angle in the cross plane, default ref angle|
//! | `INS<id>_FOV_ANGLE_UNITS`  | `DEGREES` (default), `RADIANS`, `ARCMINUTES`, `ARCSECONDS` |
//!
//! Both half angles must lie strictly between 0 and 90 degrees.
//!
//! `ANGLES` fields of view become a [`RectangularCone`] whose four corner rays are
//! re-ordered with [`CORNER_ORDER`] before being exported. `CORNERS` fields of view are
//! rejected: rectangles with [`PointingError::CornersFovNotSupported`], any other shape
//! with [`PointingError::UnsupportedFovShape`].
//!
//! The instrument "up" direction is the component of the cone's vertex ray
//! perpendicular to the boresight, `b × (v × b)`.
use std::f64::consts::FRAC_PI_2;

use nalgebra::Vector3;
use tracing::debug;

use crate::{
    constants::{InstrumentCode, Radian, DEFAULT_FOV_ANGLE_UNITS, DEFAULT_FOV_CLASS_SPEC, RADEG, RADMIN, RADSEC},
    kernel_pool::KernelPool,
    pointing_errors::PointingError,
};

/// Exported corner `i` is native cone corner `CORNER_ORDER[i]`.
pub const CORNER_ORDER: [usize; 4] = [0, 1, 3, 2];

/// Four-sided cone around a boresight, described by two half angles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RectangularCone {
    boresight: Vector3<f64>,
    vertex: Vector3<f64>,
    corners: [Vector3<f64>; 4],
}

impl RectangularCone {
    /// Build the cone spanned around `boresight`.
    ///
    /// Arguments
    /// -----------------
    /// * `ref_vector`: vector fixing the reference plane (with the boresight).
    /// * `boresight`: cone axis.
    /// * `cross_angle`: half angle measured in the plane perpendicular to the reference plane.
    /// * `ref_angle`: half angle measured in the reference plane.
    ///
    /// Return
    /// ----------
    /// * `None` if the boresight is zero or the reference vector is parallel to it.
    ///   Native corners are the unit rays `b ± tan(ref)·r ± tan(cross)·c`, in the order
    ///   `(+r, +c)`, `(-r, +c)`, `(+r, -c)`, `(-r, -c)`, where `r` is the unit component
    ///   of the reference vector perpendicular to the boresight and `c = b × r`.
    pub fn new(
        ref_vector: Vector3<f64>,
        boresight: Vector3<f64>,
        cross_angle: Radian,
        ref_angle: Radian,
    ) -> Option<Self> {
        let axis = boresight.try_normalize(0.0)?;
        let reference = (ref_vector - axis * ref_vector.dot(&axis)).try_normalize(f64::EPSILON)?;
        let cross = axis.cross(&reference);

        let r = reference * ref_angle.tan();
        let c = cross * cross_angle.tan();
        let corners = [
            (axis + r + c).normalize(),
            (axis - r + c).normalize(),
            (axis + r - c).normalize(),
            (axis - r - c).normalize(),
        ];

        Some(RectangularCone {
            boresight: axis,
            vertex: ref_vector.normalize(),
            corners,
        })
    }

    /// Unit boresight of the cone.
    pub fn boresight(&self) -> Vector3<f64> {
        self.boresight
    }

    /// Unit reference ray the cone was built from.
    pub fn vertex(&self) -> Vector3<f64> {
        self.vertex
    }

    /// Corner rays in native order.
    pub fn corners(&self) -> &[Vector3<f64>; 4] {
        &self.corners
    }
}

/// Re-order native cone corners into the exported frustum order.
pub fn reorder_corners(native: &[Vector3<f64>; 4]) -> [Vector3<f64>; 4] {
    CORNER_ORDER.map(|i| native[i])
}

/// Boresight, up direction and frustum of one instrument, in its own frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstrumentFov {
    pub boresight: Vector3<f64>,
    pub up: Vector3<f64>,
    pub frustum: [Vector3<f64>; 4],
}

fn to_vector(values: &[f64]) -> Vector3<f64> {
    Vector3::new(values[0], values[1], values[2])
}

fn angle_scale(units: &str, frame_name: &str) -> Result<f64, PointingError> {
    match units {
        "DEGREES" => Ok(RADEG),
        "RADIANS" => Ok(1.0),
        "ARCMINUTES" => Ok(RADMIN),
        "ARCSECONDS" => Ok(RADSEC),
        other => Err(PointingError::UnsupportedFovAngleUnits {
            units: other.to_string(),
            frame: frame_name.to_string(),
        }),
    }
}

/// Half angle stored under `key`, in radians. Must lie strictly between 0 and 90 degrees.
fn half_angle(key: &str, value: f64, scale: f64) -> Result<Radian, PointingError> {
    let angle = value * scale;
    if angle > 0.0 && angle < FRAC_PI_2 {
        Ok(angle)
    } else {
        Err(PointingError::InvalidFovAngle {
            key: key.to_string(),
            value,
        })
    }
}

/// `INS<code>_BORESIGHT` as a vector.
pub fn read_boresight(pool: &KernelPool, code: InstrumentCode) -> Result<Vector3<f64>, PointingError> {
    Ok(to_vector(pool.require_doubles(&format!("INS{code}_BORESIGHT"), 3)?))
}

/// Read the `INS<code>_FOV_*` keywords and build the instrument's cone.
pub fn read_cone(
    pool: &KernelPool,
    code: InstrumentCode,
    frame_name: &str,
    boresight: Vector3<f64>,
) -> Result<RectangularCone, PointingError> {
    let prefix = format!("INS{code}_");

    let shape = pool.require_string(&format!("{prefix}FOV_SHAPE"))?;
    let class_spec = pool
        .optional_string(&format!("{prefix}FOV_CLASS_SPEC"))?
        .unwrap_or(DEFAULT_FOV_CLASS_SPEC);

    match class_spec {
        "CORNERS" if shape == "RECTANGLE" => {
            Err(PointingError::CornersFovNotSupported(frame_name.to_string()))
        }
        "CORNERS" => Err(PointingError::UnsupportedFovShape {
            shape: shape.to_string(),
            frame: frame_name.to_string(),
        }),
        "ANGLES" => {
            let ref_vector = to_vector(pool.require_doubles(&format!("{prefix}FOV_REF_VECTOR"), 3)?);
            let ref_key = format!("{prefix}FOV_REF_ANGLE");
            let cross_key = format!("{prefix}FOV_CROSS_ANGLE");
            let ref_angle = pool.require_double(&ref_key)?;
            let (cross_key, cross_angle) = match pool.optional_double(&cross_key)? {
                Some(angle) => (cross_key, angle),
                None => (ref_key.clone(), ref_angle),
            };
            let units = pool
                .optional_string(&format!("{prefix}FOV_ANGLE_UNITS"))?
                .unwrap_or(DEFAULT_FOV_ANGLE_UNITS);
            let scale = angle_scale(units, frame_name)?;

            let ref_angle = half_angle(&ref_key, ref_angle, scale)?;
            let cross_angle = half_angle(&cross_key, cross_angle, scale)?;

            RectangularCone::new(ref_vector, boresight, cross_angle, ref_angle)
                .ok_or_else(|| PointingError::DegenerateFovReference(frame_name.to_string()))
        }
        other => Err(PointingError::InvalidFovClassSpec {
            class_spec: other.to_string(),
            frame: frame_name.to_string(),
        }),
    }
}

/// Extract the boresight, up direction and frustum of instrument `code`.
///
/// Arguments
/// -----------------
/// * `pool`: kernel pool holding the instrument kernel.
/// * `code`: NAIF code of the instrument.
/// * `frame_name`: FOV frame of the instrument, used in error messages.
///
/// Return
/// ----------
/// * The field of view, with the boresight as found in the kernel, the up direction
///   `b × (v × b)` and the four frustum corners in exported order.
///
/// See also
/// ------------
/// * [`RectangularCone::new`] – native corner order.
/// * [`CORNER_ORDER`] – the permutation applied to it.
pub fn extract_fov(
    pool: &KernelPool,
    code: InstrumentCode,
    frame_name: &str,
) -> Result<InstrumentFov, PointingError> {
    let boresight = read_boresight(pool, code)?;
    let cone = read_cone(pool, code, frame_name, boresight)?;
    let up = boresight.cross(&cone.vertex().cross(&boresight));

    debug!(instrument = code, frame = frame_name, "extracted instrument field of view");

    Ok(InstrumentFov {
        boresight,
        up,
        frustum: reorder_corners(cone.corners()),
    })
}
