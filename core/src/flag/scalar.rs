use std::fmt;
use std::time::Duration;

use serde_json::{Value, json};

use super::{BaseFlag, FlagCore, FlagKind};
use crate::error::Result;

/// A single value that can be parsed from one token.
pub trait Scalar: Clone + PartialOrd + fmt::Debug + Send + Sync + 'static {
    const KIND: FlagKind;
    /// Kind of a [`SliceFlag`](super::SliceFlag) holding this scalar.
    const SLICE_KIND: FlagKind;

    fn parse_scalar(raw: &str) -> std::result::Result<Self, String>;
    fn render(&self) -> String;
    fn to_json(&self) -> Value;
}

impl Scalar for bool {
    const KIND: FlagKind = FlagKind::Bool;
    const SLICE_KIND: FlagKind = FlagKind::BoolSlice;

    fn parse_scalar(raw: &str) -> std::result::Result<Self, String> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "t" | "true" | "yes" | "y" | "on" => Ok(true),
            "0" | "f" | "false" | "no" | "n" | "off" => Ok(false),
            _ => Err("expected a boolean".to_string()),
        }
    }

    fn render(&self) -> String {
        self.to_string()
    }

    fn to_json(&self) -> Value {
        Value::Bool(*self)
    }
}

impl Scalar for i64 {
    const KIND: FlagKind = FlagKind::Int;
    const SLICE_KIND: FlagKind = FlagKind::IntSlice;

    fn parse_scalar(raw: &str) -> std::result::Result<Self, String> {
        raw.trim()
            .parse()
            .map_err(|err| format!("expected an integer ({err})"))
    }

    fn render(&self) -> String {
        self.to_string()
    }

    fn to_json(&self) -> Value {
        json!(self)
    }
}

impl Scalar for u64 {
    const KIND: FlagKind = FlagKind::Uint;
    const SLICE_KIND: FlagKind = FlagKind::UintSlice;

    fn parse_scalar(raw: &str) -> std::result::Result<Self, String> {
        raw.trim()
            .parse()
            .map_err(|err| format!("expected an unsigned integer ({err})"))
    }

    fn render(&self) -> String {
        self.to_string()
    }

    fn to_json(&self) -> Value {
        json!(self)
    }
}

impl Scalar for f64 {
    const KIND: FlagKind = FlagKind::Float;
    const SLICE_KIND: FlagKind = FlagKind::FloatSlice;

    fn parse_scalar(raw: &str) -> std::result::Result<Self, String> {
        let value: f64 = raw
            .trim()
            .parse()
            .map_err(|err| format!("expected a number ({err})"))?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err("expected a finite number".to_string())
        }
    }

    fn render(&self) -> String {
        self.to_string()
    }

    fn to_json(&self) -> Value {
        json!(self)
    }
}

impl Scalar for String {
    const KIND: FlagKind = FlagKind::String;
    const SLICE_KIND: FlagKind = FlagKind::StringSlice;

    fn parse_scalar(raw: &str) -> std::result::Result<Self, String> {
        Ok(raw.to_string())
    }

    fn render(&self) -> String {
        self.clone()
    }

    fn to_json(&self) -> Value {
        Value::String(self.clone())
    }
}

impl Scalar for Duration {
    const KIND: FlagKind = FlagKind::Duration;
    const SLICE_KIND: FlagKind = FlagKind::DurationSlice;

    fn parse_scalar(raw: &str) -> std::result::Result<Self, String> {
        parse_duration(raw)
    }

    fn render(&self) -> String {
        format_duration(*self)
    }

    fn to_json(&self) -> Value {
        Value::String(format_duration(*self))
    }
}

const UNITS: &[(&str, u128)] = &[
    ("ns", 1),
    ("us", 1_000),
    ("µs", 1_000),
    ("ms", 1_000_000),
    ("s", 1_000_000_000),
    ("m", 60_000_000_000),
    ("h", 3_600_000_000_000),
];

/// Parses durations such as `1h30m`, `250ms` or `1.5s`.
///
/// Every number needs a unit; a bare `0` is the only exception.
pub fn parse_duration(raw: &str) -> std::result::Result<Duration, String> {
    let input = raw.trim();
    if input.is_empty() {
        return Err("empty duration".to_string());
    }
    if input == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total_nanos: u128 = 0;
    let mut rest = input;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return Err(format!("expected a number in duration {input:?}"));
        }
        let (number, tail) = rest.split_at(number_len);
        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        let scale = UNITS
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, scale)| *scale)
            .ok_or_else(|| {
                if unit.is_empty() {
                    format!("missing unit in duration {input:?}")
                } else {
                    format!("unknown unit {unit:?} in duration {input:?}")
                }
            })?;
        total_nanos = total_nanos
            .checked_add(scaled(number, scale).ok_or_else(|| {
                format!("invalid number {number:?} in duration {input:?}")
            })?)
            .ok_or_else(|| format!("duration {input:?} overflows"))?;
        rest = tail;
    }

    let secs = u64::try_from(total_nanos / 1_000_000_000)
        .map_err(|_| format!("duration {input:?} overflows"))?;
    Ok(Duration::new(secs, (total_nanos % 1_000_000_000) as u32))
}

fn scaled(number: &str, scale: u128) -> Option<u128> {
    let (whole, frac) = number.split_once('.').unwrap_or((number, ""));
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut nanos = whole.checked_mul(scale)?;
    let mut divisor = 1u128;
    for digit in frac.chars() {
        divisor = divisor.checked_mul(10)?;
        let digit = u128::from(digit.to_digit(10)?);
        nanos = nanos.checked_add(digit * scale / divisor)?;
    }
    Some(nanos)
}

/// Renders a duration in the form [`parse_duration`] accepts.
pub fn format_duration(duration: Duration) -> String {
    let nanos = duration.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }
    if nanos < 1_000_000_000 {
        return if nanos % 1_000_000 == 0 {
            format!("{}ms", nanos / 1_000_000)
        } else if nanos % 1_000 == 0 {
            format!("{}µs", nanos / 1_000)
        } else {
            format!("{nanos}ns")
        };
    }

    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    let subsec = duration.subsec_nanos();

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if hours > 0 || minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    if subsec == 0 {
        out.push_str(&format!("{seconds}s"));
    } else {
        let frac = format!("{subsec:09}");
        out.push_str(&format!("{seconds}.{}s", frac.trim_end_matches('0')));
    }
    out
}

/// Flag holding one [`Scalar`].
pub struct ScalarFlag<T> {
    base: BaseFlag<T>,
    range: Option<(T, T)>,
}

/// `--verbose`, `--dry-run=false`.
pub type BoolFlag = ScalarFlag<bool>;
pub type IntFlag = ScalarFlag<i64>;
pub type UintFlag = ScalarFlag<u64>;
pub type FloatFlag = ScalarFlag<f64>;
pub type StringFlag = ScalarFlag<String>;
pub type DurationFlag = ScalarFlag<Duration>;

impl<T: Scalar> fmt::Debug for ScalarFlag<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScalarFlag")
            .field("kind", &T::KIND)
            .field("base", &self.base)
            .field("range", &self.range)
            .finish()
    }
}

impl<T: Scalar> ScalarFlag<T> {
    /// Creates an initialized flag.
    pub fn new(long: &str, short: &str, default: T, usage: &str) -> Result<Self> {
        let flag = Self::uninit(default);
        flag.base.init(long, short, usage)?;
        Ok(flag)
    }

    /// Creates a flag without names; [`FlagCore::init`] must follow.
    pub fn uninit(default: T) -> Self {
        Self {
            base: BaseFlag::new(default),
            range: None,
        }
    }

    /// Restricts accepted values to `min..=max`.
    pub fn with_range(mut self, min: T, max: T) -> Self {
        self.range = Some((min, max));
        self
    }

    pub fn with_env(self, name: &str) -> Self {
        self.base.bind_env(name);
        self
    }

    pub fn with_validator<F>(self, validator: F) -> Self
    where
        F: Fn(&T) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        self.set_validator(validator);
        self
    }
}

impl<T: Scalar> FlagCore for ScalarFlag<T> {
    type Value = T;

    const KIND: FlagKind = T::KIND;

    fn base(&self) -> &BaseFlag<T> {
        &self.base
    }

    fn parse_value(&self, raw: &str) -> std::result::Result<T, String> {
        T::parse_scalar(raw)
    }

    fn render(&self, value: &T) -> String {
        value.render()
    }

    fn value_to_json(&self, value: &T) -> Value {
        value.to_json()
    }

    fn check_value(&self, value: &T) -> std::result::Result<(), String> {
        match &self.range {
            Some((min, max)) if value < min || value > max => Err(format!(
                "must be between {} and {}",
                min.render(),
                max.render()
            )),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::flag::Flag;

    #[test]
    fn test_bool_spellings() {
        let flag = BoolFlag::new("verbose", "v", false, "").unwrap();
        for raw in ["true", "T", "1", "yes", "on"] {
            flag.set_str(raw).unwrap();
            assert!(flag.get(), "{raw}");
        }
        flag.set_str("off").unwrap();
        assert!(!flag.get());
        assert!(flag.set_str("maybe").is_err());
        assert!(!flag.get());
    }

    #[test]
    fn test_malformed_input_keeps_state() {
        let flag = IntFlag::new("retries", "r", 3, "").unwrap();
        flag.set_str("5").unwrap();

        let err = flag.set_str("five").unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationFailed);
        assert!(err.to_string().contains("retries"));
        assert_eq!(flag.get(), 5);
    }

    #[test]
    fn test_range_applies_to_typed_and_raw_sets() {
        let flag = UintFlag::new("workers", "", 4, "").unwrap().with_range(1, 64);
        assert!(flag.set_str("0").is_err());
        assert!(flag.set(65).is_err());
        assert!(!flag.is_set());
        flag.set(64).unwrap();
        assert_eq!(flag.get(), 64);
    }

    #[test]
    fn test_float_rejects_non_finite() {
        let flag = FloatFlag::new("ratio", "", 0.5, "").unwrap();
        assert!(flag.set_str("NaN").is_err());
        assert!(flag.set_str("inf").is_err());
        flag.set_str("0.25").unwrap();
        assert_eq!(flag.get(), 0.25);
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration("10µs").unwrap(), Duration::from_micros(10));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
        assert!(parse_duration("90").is_err());
        assert!(parse_duration("5d").is_err());
        assert!(parse_duration("").is_err());
        assert!(parse_duration("m").is_err());
    }

    #[test]
    fn test_format_duration_parses_back() {
        for duration in [
            Duration::ZERO,
            Duration::from_millis(250),
            Duration::from_micros(7),
            Duration::from_nanos(42),
            Duration::from_secs(5400),
            Duration::from_millis(61_500),
        ] {
            let rendered = format_duration(duration);
            assert_eq!(parse_duration(&rendered).unwrap(), duration, "{rendered}");
        }
        assert_eq!(format_duration(Duration::from_secs(3661)), "1h1m1s");
    }

    #[test]
    fn test_string_flag_with_validator() {
        let flag = StringFlag::new("name", "n", "anon".to_string(), "")
            .unwrap()
            .with_validator(|v: &String| {
                if v.is_empty() {
                    Err("must not be empty".to_string())
                } else {
                    Ok(())
                }
            });
        assert!(flag.set_str("").is_err());
        assert!(!flag.is_set());
        flag.set_str("bob").unwrap();
        assert_eq!(flag.value_string(), "bob");
        assert_eq!(flag.default_string(), "anon");
    }

    #[test]
    fn test_uninit_flag_requires_init() {
        let flag = DurationFlag::uninit(Duration::from_secs(1));
        assert_eq!(flag.long_name(), "");
        flag.init("timeout", "t", "request timeout").unwrap();
        assert!(flag.init("timeout", "t", "again").is_err());
        assert_eq!(flag.kind(), FlagKind::Duration);
        assert_eq!(flag.value_json(), serde_json::json!("1s"));
    }
}
