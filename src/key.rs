//! Canonical keys for parameter sets.
//!
//! A key addresses the model cache: two parameter sets that agree on every
//! name and on every float value to the configured number of significant
//! digits encode to the same key. The layout is the tuple form already
//! used by study directories on disk, so keys generated here match keys
//! generated for models created before:
//!
//! ```
//! use simrun::{KeyCodec, ParameterSet};
//!
//! let p: ParameterSet = [("vf1", 1.234_56), ("ent", 0.5)].into_iter().collect();
//! let key = KeyCodec::default().encode(&p);
//! assert_eq!(key.as_str(), "('ent', '0.5', 'vf1', '1.235')");
//! ```

use core::fmt::Write as _;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::param::{ParamValue, ParameterSet};

/// Default number of significant digits kept for float parameters.
pub const DEFAULT_PRECISION: usize = 4;

/// The canonical string encoding of a [`ParameterSet`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Key(String);

impl Key {
    /// The encoded key text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Key {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Encodes parameter sets into [`Key`]s.
///
/// Changing the precision changes every key it produces, so a study must
/// keep the same precision for its whole life.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyCodec {
    precision: usize,
}

impl Default for KeyCodec {
    fn default() -> Self {
        Self {
            precision: DEFAULT_PRECISION,
        }
    }
}

impl KeyCodec {
    /// Creates a codec keeping `precision` significant digits (at least one).
    #[must_use]
    pub fn with_precision(precision: usize) -> Self {
        Self {
            precision: precision.max(1),
        }
    }

    /// The number of significant digits kept for floats.
    #[must_use]
    pub fn precision(&self) -> usize {
        self.precision
    }

    /// Encodes `parameters` into a key.
    #[must_use]
    pub fn encode(&self, parameters: &ParameterSet) -> Key {
        let mut parts = Vec::with_capacity(parameters.len() * 2);
        for (name, value) in parameters.iter() {
            parts.push(quote(name));
            let text = match value {
                ParamValue::Float(v) => format_g(*v, self.precision),
                ParamValue::Int(v) => v.to_string(),
                ParamValue::Bool(true) => "True".to_owned(),
                ParamValue::Bool(false) => "False".to_owned(),
                ParamValue::Text(s) => quote(s),
            };
            parts.push(quote(&text));
        }

        let mut out = String::from("(");
        out.push_str(&parts.join(", "));
        if parts.len() == 1 {
            out.push(',');
        }
        out.push(')');
        Key(out)
    }
}

/// Formats `value` like printf `%.{precision}g`.
pub(crate) fn format_g(value: f64, precision: usize) -> String {
    if value.is_nan() {
        return "nan".to_owned();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_owned();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0" } else { "0" }.to_owned();
    }

    let precision = precision.max(1);
    let sci = format!("{:.*e}", precision - 1, value);
    let Some((mantissa, exponent)) = sci.split_once('e') else {
        return sci;
    };
    let Ok(exponent) = exponent.parse::<i32>() else {
        return sci;
    };

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    let p = precision as i32;
    if exponent < -4 || exponent >= p {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!(
            "{}e{sign}{:02}",
            trim_fraction(mantissa),
            exponent.unsigned_abs()
        )
    } else {
        #[allow(clippy::cast_sign_loss)]
        let decimals = (p - 1 - exponent) as usize;
        trim_fraction(&format!("{value:.decimals$}")).to_owned()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

/// Quotes `s` the way the tuple layout quotes its string elements.
fn quote(s: &str) -> String {
    let delim = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(delim);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == delim => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_control() => {
                let _ = write!(out, "\\x{:02x}", u32::from(c));
            }
            c => out.push(c),
        }
    }
    out.push(delim);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_g_fixed_range() {
        assert_eq!(format_g(1.234_56, 4), "1.235");
        assert_eq!(format_g(2.0, 4), "2");
        assert_eq!(format_g(0.5, 4), "0.5");
        assert_eq!(format_g(-12.5, 4), "-12.5");
        assert_eq!(format_g(1234.0, 4), "1234");
        assert_eq!(format_g(0.000_123_456, 4), "0.0001235");
        assert_eq!(format_g(9.9996, 4), "10");
    }

    #[test]
    fn format_g_exponent_form() {
        assert_eq!(format_g(12346.0, 4), "1.235e+04");
        assert_eq!(format_g(1e-5, 4), "1e-05");
        assert_eq!(format_g(1.5e10, 4), "1.5e+10");
        assert_eq!(format_g(-2.5e-7, 4), "-2.5e-07");
        assert_eq!(format_g(1e100, 4), "1e+100");
    }

    #[test]
    fn format_g_special_values() {
        assert_eq!(format_g(0.0, 4), "0");
        assert_eq!(format_g(-0.0, 4), "-0");
        assert_eq!(format_g(f64::NAN, 4), "nan");
        assert_eq!(format_g(f64::INFINITY, 4), "inf");
        assert_eq!(format_g(f64::NEG_INFINITY, 4), "-inf");
    }

    #[test]
    fn format_g_precision() {
        assert_eq!(format_g(1.234_56, 2), "1.2");
        assert_eq!(format_g(1.234_56, 6), "1.23456");
        assert_eq!(format_g(123.0, 1), "1e+02");
    }

    #[test]
    fn quoting() {
        assert_eq!(quote("abc"), "'abc'");
        assert_eq!(quote("it's"), "\"it's\"");
        assert_eq!(quote("'x'"), "\"'x'\"");
        assert_eq!(quote("a\\b"), "'a\\\\b'");
    }

    #[test]
    fn encodes_mixed_values() {
        let mut p = ParameterSet::new();
        p.insert("ensembleMember", 2_i64);
        p.insert("scheme", "fast");
        p.insert("flag", false);
        p.insert("x", 0.1);
        let key = KeyCodec::default().encode(&p);
        assert_eq!(
            key.as_str(),
            "('ensembleMember', '2', 'flag', 'False', 'scheme', \"'fast'\", 'x', '0.1')"
        );
    }

    #[test]
    fn empty_set_encodes_to_empty_tuple() {
        assert_eq!(KeyCodec::default().encode(&ParameterSet::new()).as_str(), "()");
    }

    #[test]
    fn precision_floor_is_one() {
        assert_eq!(KeyCodec::with_precision(0).precision(), 1);
    }
}
