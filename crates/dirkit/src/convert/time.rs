//! Directory timestamp syntaxes.
//!
//! Generalized time (`YYYYMMDDHHMMSS.0±ZZZZ` or `...Z`) is the attribute
//! syntax for values such as `whenCreated`. Windows file time is a count of
//! 100-nanosecond intervals since 1601-01-01 UTC, used by `accountExpires`,
//! `pwdLastSet` and friends.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};

use super::{AttributeConverter, ConversionContext};
use crate::error::{DirectoryError, DirectoryResult};
use crate::record::AttributeValue;

/// Seconds between 1601-01-01 and the Unix epoch.
const FILETIME_EPOCH_OFFSET_SECS: i64 = 11_644_473_600;
const FILETIME_TICKS_PER_SEC: i64 = 10_000_000;
/// File time values that mean "never".
const FILETIME_NEVER: [i64; 2] = [0, i64::MAX];

/// Format a timestamp as generalized time, keeping its offset.
pub fn format_generalized_time(value: &DateTime<FixedOffset>) -> String {
    let offset_secs = value.offset().local_minus_utc();
    let base = value.format("%Y%m%d%H%M%S.0");
    if offset_secs == 0 {
        return format!("{base}Z");
    }
    let sign = if offset_secs < 0 { '-' } else { '+' };
    let minutes = offset_secs.abs() / 60;
    format!("{base}{sign}{:02}{:02}", minutes / 60, minutes % 60)
}

/// Parse a generalized time value.
///
/// Accepts an optional fraction (`.` or `,`) and a `Z`, `±HH` or `±HHMM`
/// zone designator. Values without a zone are taken as UTC.
pub fn parse_generalized_time(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    if !value.is_ascii() || value.len() < 14 {
        return None;
    }
    let (stamp, rest) = value.split_at(14);
    let naive = NaiveDateTime::parse_from_str(stamp, "%Y%m%d%H%M%S").ok()?;

    let rest = match rest.strip_prefix(['.', ',']) {
        Some(fraction) => {
            let digits = fraction.bytes().take_while(u8::is_ascii_digit).count();
            if digits == 0 {
                return None;
            }
            &fraction[digits..]
        }
        None => rest,
    };

    let offset = match rest {
        "" | "Z" | "z" => FixedOffset::east_opt(0)?,
        zone => {
            let (sign, digits) = match zone.split_at(1) {
                ("+", digits) => (1, digits),
                ("-", digits) => (-1, digits),
                _ => return None,
            };
            if !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            let (hours, minutes) = match digits.len() {
                2 => (digits.parse::<i32>().ok()?, 0),
                4 => (digits[..2].parse::<i32>().ok()?, digits[2..].parse::<i32>().ok()?),
                _ => return None,
            };
            FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))?
        }
    };

    offset.from_local_datetime(&naive).single()
}

fn timestamp_from_value(
    value: &AttributeValue,
    ctx: &ConversionContext<'_>,
) -> DirectoryResult<DateTime<FixedOffset>> {
    match value.first() {
        Some(AttributeValue::DateTime(dt)) => Ok(*dt),
        Some(AttributeValue::String(s)) => DateTime::parse_from_rfc3339(s)
            .ok()
            .or_else(|| parse_generalized_time(s))
            .ok_or_else(|| {
                DirectoryError::conversion(ctx.attribute(), format!("'{s}' is not a timestamp"))
            }),
        _ => Err(DirectoryError::conversion(
            ctx.attribute(),
            "expected a date/time value",
        )),
    }
}

/// Converts timestamps to and from generalized time.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeneralizedTimeConverter;

impl AttributeConverter for GeneralizedTimeConverter {
    fn to_directory(
        &self,
        value: &AttributeValue,
        ctx: &mut ConversionContext<'_>,
    ) -> DirectoryResult<String> {
        Ok(format_generalized_time(&timestamp_from_value(value, ctx)?))
    }

    fn from_directory(
        &self,
        value: &str,
        ctx: &ConversionContext<'_>,
    ) -> DirectoryResult<AttributeValue> {
        parse_generalized_time(value)
            .map(AttributeValue::DateTime)
            .ok_or_else(|| {
                DirectoryError::conversion(
                    ctx.attribute(),
                    format!("'{value}' is not a generalized time value"),
                )
            })
    }
}

/// Converts timestamps to and from Windows file time.
///
/// Null converts to `0`; both `0` and `9223372036854775807` read back as null.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsTimeConverter;

impl AttributeConverter for WindowsTimeConverter {
    fn to_directory(
        &self,
        value: &AttributeValue,
        ctx: &mut ConversionContext<'_>,
    ) -> DirectoryResult<String> {
        if value.first().is_none() {
            return Ok("0".to_string());
        }
        let timestamp = timestamp_from_value(value, ctx)?.with_timezone(&Utc);
        let ticks = (timestamp.timestamp() + FILETIME_EPOCH_OFFSET_SECS)
            .checked_mul(FILETIME_TICKS_PER_SEC)
            .and_then(|t| t.checked_add(i64::from(timestamp.timestamp_subsec_nanos() / 100)))
            .filter(|t| *t > 0)
            .ok_or_else(|| {
                DirectoryError::conversion(ctx.attribute(), "timestamp outside file time range")
            })?;
        Ok(ticks.to_string())
    }

    fn from_directory(
        &self,
        value: &str,
        ctx: &ConversionContext<'_>,
    ) -> DirectoryResult<AttributeValue> {
        let ticks: i64 = value.trim().parse().map_err(|_| {
            DirectoryError::conversion(ctx.attribute(), format!("'{value}' is not a file time"))
        })?;
        if FILETIME_NEVER.contains(&ticks) {
            return Ok(AttributeValue::Null);
        }

        let secs = ticks.div_euclid(FILETIME_TICKS_PER_SEC) - FILETIME_EPOCH_OFFSET_SECS;
        let nanos = (ticks.rem_euclid(FILETIME_TICKS_PER_SEC) * 100) as u32;
        Utc.timestamp_opt(secs, nanos)
            .single()
            .map(|dt| AttributeValue::DateTime(dt.fixed_offset()))
            .ok_or_else(|| {
                DirectoryError::conversion(ctx.attribute(), format!("'{value}' is out of range"))
            })
    }
}
