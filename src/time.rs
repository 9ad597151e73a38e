//! # UTC parsing and ephemeris time conversions
//!
//! Pointing queries are made in **ephemeris time** (ET, TDB seconds past the J2000
//! epoch). Image labels and kernels carry UTC strings in a handful of layouts, all
//! accepted by [`parse_utc`]:
//!
//! | Layout                            | Example                       |
//! |-----------------------------------|-------------------------------|
//! | year, month, day, h, m, s         | `2022-09-26T23:14:24.183`     |
//! | year, day-of-year, h, m, s        | `2022-269T23:14:24.183`       |
//! | `yyyydddhhmmss`                   | `2022269231424`               |
//! | `yyyymmddhhmmss`                  | `20220926231424`              |
//! | `yyyy.mm.dd.hh.mm.ss`             | `2022.09.26.23.14.24`         |
//! | kernel calendar date              | `2022-SEP-26/23:14:24.183`    |
//!
//! In the first two layouts any non-digit character separates the fields, and the
//! last field (seconds) may carry a fraction.
//!
//! See also
//! ------------
//! * [`crate::kernel_pool::text_kernel`] – `@` date literals go through [`utc_to_et`].
//! * [`crate::pointing::provider::SpicePointingProvider::provide_at_epoch`].
use hifitime::{Epoch, TimeScale, Unit};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::{constants::EphemerisTime, pointing_errors::PointingError};

static FIELD_SEPARATOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[^\d.]+").unwrap()
});

static DOTTED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4})\.(\d{2})\.(\d{2})\.(\d{2})\.(\d{2})\.(\d{2}(?:\.\d*)?)$").unwrap()
});

static MONTH_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(\d{4})-([A-Za-z]{3})-(\d{1,2})(?:[T/ ](\d{1,2}):(\d{2})(?::(\d{2}(?:\.\d*)?))?)?$",
    )
    .unwrap()
});

const MONTHS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

fn invalid(utc: &str) -> PointingError {
    PointingError::InvalidUtcString(utc.to_string())
}

fn int_field<T: std::str::FromStr>(utc: &str, field: &str) -> Result<T, PointingError> {
    field.parse::<T>().map_err(|_| invalid(utc))
}

fn seconds_field(utc: &str, field: &str) -> Result<(u8, u32), PointingError> {
    let seconds: f64 = field.parse().map_err(|_| invalid(utc))?;
    if !(0.0..61.0).contains(&seconds) {
        return Err(invalid(utc));
    }
    let whole = seconds.trunc();
    let nanos = ((seconds - whole) * 1e9).round().min(999_999_999.0);
    Ok((whole as u8, nanos as u32))
}

fn from_ymd(
    utc: &str,
    ymd: (i32, u8, u8),
    hour: u8,
    minute: u8,
    (second, nanos): (u8, u32),
) -> Result<Epoch, PointingError> {
    Epoch::maybe_from_gregorian_utc(ymd.0, ymd.1, ymd.2, hour, minute, second, nanos)
        .map_err(|_| invalid(utc))
}

fn from_doy(
    utc: &str,
    year: i32,
    doy: u16,
    hour: u8,
    minute: u8,
    seconds: (u8, u32),
) -> Result<Epoch, PointingError> {
    let max_doy = if is_leap_year(year) { 366 } else { 365 };
    if doy == 0 || doy > max_doy {
        return Err(invalid(utc));
    }
    let start = from_ymd(utc, (year, 1, 1), hour, minute, seconds)?;
    Ok(start + Unit::Day * i64::from(doy - 1))
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Parse a UTC string in any of the layouts listed in the module documentation.
///
/// Arguments
/// -----------------
/// * `utc`: the UTC string.
///
/// Return
/// ----------
/// * The corresponding [`Epoch`], or [`PointingError::InvalidUtcString`].
pub fn parse_utc(utc: &str) -> Result<Epoch, PointingError> {
    let utc = utc.trim();

    if let Some(caps) = MONTH_NAME.captures(utc) {
        let month_name = caps[2].to_ascii_uppercase();
        let month = MONTHS
            .iter()
            .position(|m| *m == month_name)
            .ok_or_else(|| invalid(utc))? as u8
            + 1;
        let hour = caps.get(4).map_or(Ok(0), |m| int_field(utc, m.as_str()))?;
        let minute = caps.get(5).map_or(Ok(0), |m| int_field(utc, m.as_str()))?;
        let seconds = caps
            .get(6)
            .map_or(Ok((0, 0)), |m| seconds_field(utc, m.as_str()))?;
        let ymd = (int_field(utc, &caps[1])?, month, int_field(utc, &caps[3])?);
        return from_ymd(utc, ymd, hour, minute, seconds);
    }

    if let Some(caps) = DOTTED.captures(utc) {
        let ymd = (
            int_field(utc, &caps[1])?,
            int_field(utc, &caps[2])?,
            int_field(utc, &caps[3])?,
        );
        return from_ymd(
            utc,
            ymd,
            int_field(utc, &caps[4])?,
            int_field(utc, &caps[5])?,
            seconds_field(utc, &caps[6])?,
        );
    }

    let fields: Vec<&str> = FIELD_SEPARATOR
        .split(utc)
        .filter(|f| !f.is_empty())
        .collect();

    match fields.as_slice() {
        [year, doy, hour, minute, second] => from_doy(
            utc,
            int_field(utc, year)?,
            int_field(utc, doy)?,
            int_field(utc, hour)?,
            int_field(utc, minute)?,
            seconds_field(utc, second)?,
        ),
        [year, month, day, hour, minute, second] => from_ymd(
            utc,
            (
                int_field(utc, year)?,
                int_field(utc, month)?,
                int_field(utc, day)?,
            ),
            int_field(utc, hour)?,
            int_field(utc, minute)?,
            seconds_field(utc, second)?,
        ),
        [packed] if packed.len() == 13 && packed.bytes().all(|b| b.is_ascii_digit()) => from_doy(
            utc,
            int_field(utc, &packed[0..4])?,
            int_field(utc, &packed[4..7])?,
            int_field(utc, &packed[7..9])?,
            int_field(utc, &packed[9..11])?,
            seconds_field(utc, &packed[11..13])?,
        ),
        [packed] if packed.len() == 14 && packed.bytes().all(|b| b.is_ascii_digit()) => from_ymd(
            utc,
            (
                int_field(utc, &packed[0..4])?,
                int_field(utc, &packed[4..6])?,
                int_field(utc, &packed[6..8])?,
            ),
            int_field(utc, &packed[8..10])?,
            int_field(utc, &packed[10..12])?,
            seconds_field(utc, &packed[12..14])?,
        ),
        _ => Err(invalid(utc)),
    }
}

/// Parse a UTC string and convert it to ephemeris time.
pub fn utc_to_et(utc: &str) -> Result<EphemerisTime, PointingError> {
    Ok(parse_utc(utc)?.to_et_seconds())
}

pub fn epoch_to_et(epoch: Epoch) -> EphemerisTime {
    epoch.to_et_seconds()
}

pub fn et_to_epoch(et: EphemerisTime) -> Epoch {
    Epoch::from_et_seconds(et)
}

/// ISO-8601 UTC rendering of an ephemeris time, as written in pointing records.
pub fn et_to_utc_string(et: EphemerisTime) -> String {
    let (y, m, d, h, min, s, ns) = et_to_epoch(et)
        .to_time_scale(TimeScale::UTC)
        .round(Unit::Millisecond * 1)
        .to_gregorian_utc();
    format!(
        "{y:04}-{m:02}-{d:02}T{h:02}:{min:02}:{s:02}.{:03}",
        ns / 1_000_000
    )
}
