//! # Flat `KEY = value` pointing records
//!
//! The image-info layout consumed by the rendering and back-projection tools:
//!
//! ```text
//! START_TIME            = 2022-09-26T23:14:24.183
//! STOP_TIME             = 2022-09-26T23:14:24.183
//! SPACECRAFT_POSITION   = ( 9.9999999999999989e+02 , -1.0000000000000000e+00 , 0.0000000000000000e+00 )
//! BORESIGHT_DIRECTION   = ( ... )
//! UP_DIRECTION          = ( ... )
//! FRUSTUM1              = ( ... )
//! FRUSTUM2              = ( ... )
//! FRUSTUM3              = ( ... )
//! FRUSTUM4              = ( ... )
//! SUN_POSITION_LT       = ( ... )
//! ```
//!
//! Keys are left-aligned on 22 columns and numbers use 16 fractional digits with a
//! signed, at least two-digit exponent.
//!
//! On read, `FRUSTUMn`, `BORESIGHT_DIRECTION` and `UP_DIRECTION` are matched by suffix,
//! since some instruments prefix them (`MSI_FRUSTUM1`). Frustum corners are
//! renormalized; other keys are ignored.
use std::{fmt, fs};

use camino::Utf8Path;
use nalgebra::Vector3;
use nom::{
    character::complete::{char, multispace0},
    number::complete::double,
    sequence::{delimited, preceded, terminated},
    IResult, Parser,
};

use crate::{
    constants::EphemerisTime,
    ids::EphemerisId,
    pointing::{normalize, InstrumentPointing},
    pointing_errors::PointingError,
    time::et_to_utc_string,
};

pub const START_TIME: &str = "START_TIME";
pub const STOP_TIME: &str = "STOP_TIME";
pub const SPACECRAFT_POSITION: &str = "SPACECRAFT_POSITION";
pub const BORESIGHT_DIRECTION: &str = "BORESIGHT_DIRECTION";
pub const UP_DIRECTION: &str = "UP_DIRECTION";
pub const FRUSTUM: [&str; 4] = ["FRUSTUM1", "FRUSTUM2", "FRUSTUM3", "FRUSTUM4"];
pub const SUN_POSITION_LT: &str = "SUN_POSITION_LT";

#[derive(Debug, Clone, PartialEq)]
pub struct PointingRecord {
    pub start_time: String,
    pub stop_time: String,
    pub spacecraft_position: Vector3<f64>,
    pub boresight_direction: Vector3<f64>,
    pub up_direction: Vector3<f64>,
    pub frustum: [Vector3<f64>; 4],
    /// Sun position relative to the target, light-time corrected.
    pub sun_position_lt: Vector3<f64>,
}

/// `%1.16e`: mantissa with 16 fractional digits, exponent with sign and two digits.
fn format_scientific(value: f64) -> String {
    let formatted = format!("{value:.16e}");
    match formatted.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        // NaN and infinities
        None => formatted,
    }
}

fn component(input: &str) -> IResult<&str, f64> {
    delimited(multispace0, double, multispace0).parse(input)
}

fn vector(input: &str) -> IResult<&str, Vector3<f64>> {
    let (input, _) = preceded(multispace0, char('(')).parse(input)?;
    let (input, x) = terminated(component, char(',')).parse(input)?;
    let (input, y) = terminated(component, char(',')).parse(input)?;
    let (input, z) = terminated(component, char(')')).parse(input)?;
    Ok((input, Vector3::new(x, y, z)))
}

fn parse_vector(key: &str, value: &str) -> Result<Vector3<f64>, PointingError> {
    match vector(value) {
        Ok((rest, v)) if rest.trim().is_empty() => Ok(v),
        Ok((rest, _)) => Err(PointingError::PointingRecordParse {
            key: key.to_string(),
            reason: format!("trailing input {:?}", rest.trim()),
        }),
        Err(err) => Err(PointingError::PointingRecordParse {
            key: key.to_string(),
            reason: err.to_string(),
        }),
    }
}

fn missing(key: &str) -> PointingError {
    PointingError::PointingRecordParse {
        key: key.to_string(),
        reason: "missing".to_string(),
    }
}

impl PointingRecord {
    /// Fill every field from one snapshot.
    ///
    /// Arguments
    /// -----------------
    /// * `pointing`: snapshot providing the geometry.
    /// * `sun`: identifier of the Sun, bound in the provider that produced `pointing`.
    /// * `start`, `stop`: exposure bounds, written as UTC strings.
    pub fn from_pointing<P: InstrumentPointing>(
        pointing: &P,
        sun: &EphemerisId,
        start: EphemerisTime,
        stop: EphemerisTime,
    ) -> Result<Self, PointingError> {
        Ok(PointingRecord {
            start_time: et_to_utc_string(start),
            stop_time: et_to_utc_string(stop),
            spacecraft_position: pointing.sc_position()?,
            boresight_direction: pointing.boresight()?,
            up_direction: pointing.up_direction()?,
            frustum: pointing.frustum()?,
            sun_position_lt: pointing.position(sun)?,
        })
    }

    /// Parse a record. Every field must be present.
    pub fn parse(text: &str) -> Result<Self, PointingError> {
        let mut start_time = None;
        let mut stop_time = None;
        let mut spacecraft_position = None;
        let mut boresight_direction = None;
        let mut up_direction = None;
        let mut frustum = [None; 4];
        let mut sun_position_lt = None;

        for line in text.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();

            if key == START_TIME {
                start_time = Some(value.trim().to_string());
            } else if key == STOP_TIME {
                stop_time = Some(value.trim().to_string());
            } else if key == SPACECRAFT_POSITION {
                spacecraft_position = Some(parse_vector(key, value)?);
            } else if key == SUN_POSITION_LT {
                sun_position_lt = Some(parse_vector(key, value)?);
            } else if key.ends_with(BORESIGHT_DIRECTION) {
                boresight_direction = Some(parse_vector(key, value)?);
            } else if key.ends_with(UP_DIRECTION) {
                up_direction = Some(parse_vector(key, value)?);
            } else if let Some(i) = FRUSTUM.iter().position(|suffix| key.ends_with(suffix)) {
                frustum[i] = Some(normalize(parse_vector(key, value)?));
            }
        }

        let mut corners = [Vector3::zeros(); 4];
        for (i, corner) in frustum.into_iter().enumerate() {
            corners[i] = corner.ok_or_else(|| missing(FRUSTUM[i]))?;
        }

        Ok(PointingRecord {
            start_time: start_time.ok_or_else(|| missing(START_TIME))?,
            stop_time: stop_time.ok_or_else(|| missing(STOP_TIME))?,
            spacecraft_position: spacecraft_position.ok_or_else(|| missing(SPACECRAFT_POSITION))?,
            boresight_direction: boresight_direction.ok_or_else(|| missing(BORESIGHT_DIRECTION))?,
            up_direction: up_direction.ok_or_else(|| missing(UP_DIRECTION))?,
            frustum: corners,
            sun_position_lt: sun_position_lt.ok_or_else(|| missing(SUN_POSITION_LT))?,
        })
    }

    pub fn read(path: &Utf8Path) -> Result<Self, PointingError> {
        Self::parse(&fs::read_to_string(path)?)
    }

    pub fn write(&self, path: &Utf8Path) -> Result<(), PointingError> {
        fs::write(path, self.to_string())?;
        Ok(())
    }
}

fn write_vector(f: &mut fmt::Formatter<'_>, key: &str, v: &Vector3<f64>) -> fmt::Result {
    writeln!(
        f,
        "{key:<22}= ( {} , {} , {} )",
        format_scientific(v.x),
        format_scientific(v.y),
        format_scientific(v.z)
    )
}

impl fmt::Display for PointingRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{START_TIME:<22}= {}", self.start_time)?;
        writeln!(f, "{STOP_TIME:<22}= {}", self.stop_time)?;
        write_vector(f, SPACECRAFT_POSITION, &self.spacecraft_position)?;
        write_vector(f, BORESIGHT_DIRECTION, &self.boresight_direction)?;
        write_vector(f, UP_DIRECTION, &self.up_direction)?;
        for (key, corner) in FRUSTUM.iter().zip(&self.frustum) {
            write_vector(f, key, corner)?;
        }
        write_vector(f, SUN_POSITION_LT, &self.sun_position_lt)
    }
}
