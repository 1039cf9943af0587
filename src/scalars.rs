//! Typed access to scalar payloads, plus the text-side coercion helpers.
//!
//! Converters pull scalars off the cursor and ask for a concrete type; the
//! accessors here apply the safe conversions (integer widening, integral
//! floats, base64 text as binary) and refuse the lossy ones.

use std::borrow::Cow;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::error::Error;
use crate::tokens::Scalar;

impl Scalar {
    /// Short human phrase naming the payload type, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Scalar::Text(_) => "text",
            Scalar::Bool(_) => "boolean",
            Scalar::Int(_) | Scalar::UInt(_) => "integer",
            Scalar::Float(_) => "float",
            Scalar::Binary(_) => "binary",
            Scalar::Opaque(_) => "opaque value",
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Scalar::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Strict boolean access: only a boolean payload qualifies.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Signed integer access. Unsigned payloads that fit and floats with an
    /// exact integral value qualify.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Int(i) => Some(*i),
            Scalar::UInt(u) => num_traits::cast(*u),
            Scalar::Float(f) => {
                let i = *f as i64;
                if i as f64 == *f { Some(i) } else { None }
            }
            _ => None,
        }
    }

    /// Unsigned integer access; negative values never qualify.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Scalar::Int(i) => num_traits::cast(*i),
            Scalar::UInt(u) => Some(*u),
            Scalar::Float(f) => {
                if *f < 0.0 {
                    return None;
                }
                let u = *f as u64;
                if u as f64 == *f { Some(u) } else { None }
            }
            _ => None,
        }
    }

    /// Float access, widening from either integer payload.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(i) => num_traits::cast(*i),
            Scalar::UInt(u) => num_traits::cast(*u),
            Scalar::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Binary access. Text payloads are accepted as base64 and decoded;
    /// binary payloads are borrowed as-is.
    pub fn as_binary(&self) -> Result<Cow<'_, [u8]>, Error> {
        match self {
            Scalar::Binary(data) => Ok(Cow::Borrowed(data)),
            Scalar::Text(text) => decode_binary_text(text).map(Cow::Owned),
            other => Err(Error::malformed("binary data", other.type_name())),
        }
    }

    pub fn as_opaque(&self) -> Option<&crate::node::Opaque> {
        match self {
            Scalar::Opaque(opaque) => Some(opaque),
            _ => None,
        }
    }
}

/// Parse a lenient boolean literal from text (handles config-style spellings).
///
/// Accepted TRUE literals (case-insensitive): "true", "yes", "y", "on"
/// Accepted FALSE literals (case-insensitive): "false", "no", "n", "off"
///
/// With `strict` set, only the exact literals `true` and `false` qualify.
pub fn parse_bool_text(s: &str, strict: bool) -> Option<bool> {
    let t = s.trim();
    if strict {
        return match t {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        };
    }
    if t.eq_ignore_ascii_case("true")
        || t.eq_ignore_ascii_case("yes")
        || t.eq_ignore_ascii_case("y")
        || t.eq_ignore_ascii_case("on")
    {
        Some(true)
    } else if t.eq_ignore_ascii_case("false")
        || t.eq_ignore_ascii_case("no")
        || t.eq_ignore_ascii_case("n")
        || t.eq_ignore_ascii_case("off")
    {
        Some(false)
    } else {
        None
    }
}

/// Parse a signed integer from text, tolerating `_` digit separators.
pub fn parse_int_text(s: &str) -> Option<i64> {
    let t = s.trim();
    if t.is_empty() {
        return None;
    }
    let cleaned: String = t.chars().filter(|c| *c != '_').collect();
    cleaned.parse::<i64>().ok()
}

/// Parse a float from text, tolerating `_` digit separators.
pub fn parse_float_text(s: &str) -> Option<f64> {
    let t = s.trim();
    if t.is_empty() {
        return None;
    }
    let cleaned: String = t.chars().filter(|c| *c != '_').collect();
    cleaned.parse::<f64>().ok()
}

/// Decode base64 text into bytes. ASCII whitespace inside the text is
/// allowed, as producers commonly wrap long payloads.
pub fn decode_binary_text(s: &str) -> Result<Vec<u8>, Error> {
    let cleaned: Vec<u8> = s.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    BASE64
        .decode(&cleaned)
        .map_err(|err| Error::msg(format!("invalid base64 binary payload: {err}")))
}

/// True when the text is empty or contains only whitespace.
pub(crate) fn is_blank(s: &str) -> bool {
    s.chars().all(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_widening_is_checked() {
        assert_eq!(Scalar::UInt(7).as_i64(), Some(7));
        assert_eq!(Scalar::UInt(u64::MAX).as_i64(), None);
        assert_eq!(Scalar::Int(-1).as_u64(), None);
        assert_eq!(Scalar::Int(5).as_f64(), Some(5.0));
    }

    #[test]
    fn integral_floats_convert_exactly() {
        assert_eq!(Scalar::Float(12.0).as_i64(), Some(12));
        assert_eq!(Scalar::Float(12.5).as_i64(), None);
        assert_eq!(Scalar::Float(-1.0).as_u64(), None);
    }

    #[test]
    fn lenient_bools_accept_config_spellings() {
        assert_eq!(parse_bool_text("Yes", false), Some(true));
        assert_eq!(parse_bool_text("off", false), Some(false));
        assert_eq!(parse_bool_text("yes", true), None);
        assert_eq!(parse_bool_text("true", true), Some(true));
        assert_eq!(parse_bool_text("maybe", false), None);
    }

    #[test]
    fn numeric_text_tolerates_separators() {
        assert_eq!(parse_int_text("1_000_000"), Some(1_000_000));
        assert_eq!(parse_int_text("  -42 "), Some(-42));
        assert_eq!(parse_int_text(""), None);
        assert_eq!(parse_float_text("1_0.5"), Some(10.5));
    }

    #[test]
    fn text_decodes_as_base64_binary() {
        let scalar = Scalar::Text("SG Vs\nbG8h".to_owned());
        assert_eq!(scalar.as_binary().unwrap().as_ref(), b"Hello!");
        assert!(Scalar::Text("not base64!".to_owned()).as_binary().is_err());
        assert_eq!(
            Scalar::Binary(vec![1, 2]).as_binary().unwrap().as_ref(),
            [1, 2]
        );
    }

    #[test]
    fn blank_detection() {
        assert!(is_blank(""));
        assert!(is_blank(" \t\n"));
        assert!(!is_blank(" x "));
    }
}
