//! Scalar payloads carried by primitive attributes.
//!
//! A `Scalar` is tagged with its `PrimitiveKind`. Values arriving from callers
//! or from the persistence layer are brought to the kind a schema declares via
//! [`Scalar::coerce_to`]; entity identity is compared through
//! [`Scalar::identity`] so that e.g. `Long(7)` and `Integer(7)` name the same
//! entity.

use crate::error::ConversionError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveKind {
    String,
    Boolean,
    Integer,
    Long,
    Short,
    Float,
    Double,
    Currency,
    Date,
    Url,
    ImageUrl,
    Array,
}

impl PrimitiveKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Long => "long",
            Self::Short => "short",
            Self::Float => "float",
            Self::Double => "double",
            Self::Currency => "currency",
            Self::Date => "date",
            Self::Url => "url",
            Self::ImageUrl => "image_url",
            Self::Array => "array",
        }
    }

    pub const fn is_integral(self) -> bool {
        matches!(self, Self::Short | Self::Integer | Self::Long)
    }

    pub const fn is_textual(self) -> bool {
        matches!(self, Self::String | Self::Url | Self::ImageUrl)
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed scalar value, one variant per [`PrimitiveKind`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Scalar {
    String(String),
    Boolean(bool),
    Integer(i32),
    Long(i64),
    Short(i16),
    Float(f32),
    Double(f64),
    Currency(f64),
    Date(DateTime<Utc>),
    Url(String),
    ImageUrl(String),
    Array(Vec<Scalar>),
}

/// Normalized form of an identifier used for set reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdentityKey {
    Integer(i64),
    Text(String),
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl Scalar {
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            Self::String(_) => PrimitiveKind::String,
            Self::Boolean(_) => PrimitiveKind::Boolean,
            Self::Integer(_) => PrimitiveKind::Integer,
            Self::Long(_) => PrimitiveKind::Long,
            Self::Short(_) => PrimitiveKind::Short,
            Self::Float(_) => PrimitiveKind::Float,
            Self::Double(_) => PrimitiveKind::Double,
            Self::Currency(_) => PrimitiveKind::Currency,
            Self::Date(_) => PrimitiveKind::Date,
            Self::Url(_) => PrimitiveKind::Url,
            Self::ImageUrl(_) => PrimitiveKind::ImageUrl,
            Self::Array(_) => PrimitiveKind::Array,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::String(v) | Self::Url(v) | Self::ImageUrl(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Short(v) => Some(i64::from(*v)),
            Self::Integer(v) => Some(i64::from(*v)),
            Self::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(f64::from(*v)),
            Self::Double(v) | Self::Currency(v) => Some(*v),
            other => other.as_i64().map(|v| v as f64),
        }
    }

    /// Identity used when matching incoming association values against
    /// existing entities. Empty text and arrays carry no identity.
    pub fn identity(&self) -> Option<IdentityKey> {
        match self {
            Self::Short(_) | Self::Integer(_) | Self::Long(_) => {
                self.as_i64().map(IdentityKey::Integer)
            }
            Self::String(v) | Self::Url(v) | Self::ImageUrl(v) => {
                (!v.is_empty()).then(|| IdentityKey::Text(v.clone()))
            }
            Self::Float(_) | Self::Double(_) | Self::Currency(_) => {
                let v = self.as_f64()?;
                if v.is_finite() && v.fract() == 0.0 && v.abs() < 9.0e15 {
                    Some(IdentityKey::Integer(v as i64))
                } else {
                    Some(IdentityKey::Text(v.to_string()))
                }
            }
            Self::Boolean(v) => Some(IdentityKey::Text(v.to_string())),
            Self::Date(v) => Some(IdentityKey::Text(v.to_rfc3339())),
            Self::Array(_) => None,
        }
    }

    /// Convert into the representation `target` declares.
    ///
    /// Same-kind values pass through untouched. Integers widen freely and
    /// narrow only when in range; fractional values never narrow to integers.
    pub fn coerce_to(self, target: PrimitiveKind) -> Result<Self, ConversionError> {
        if self.kind() == target {
            return Ok(self);
        }

        let converted = match target {
            PrimitiveKind::String => self.render_text().map(Self::String),
            PrimitiveKind::Url => self.owned_text().map(Self::Url),
            PrimitiveKind::ImageUrl => self.owned_text().map(Self::ImageUrl),
            PrimitiveKind::Boolean => self.to_bool().map(Self::Boolean),
            PrimitiveKind::Long => self.to_i64().map(Self::Long),
            PrimitiveKind::Integer => self
                .to_i64()
                .and_then(|v| i32::try_from(v).map_err(|_| "out of range for integer"))
                .map(Self::Integer),
            PrimitiveKind::Short => self
                .to_i64()
                .and_then(|v| i16::try_from(v).map_err(|_| "out of range for short"))
                .map(Self::Short),
            PrimitiveKind::Float => self.to_f64().map(|v| Self::Float(v as f32)),
            PrimitiveKind::Double => self.to_f64().map(Self::Double),
            PrimitiveKind::Currency => self.to_f64().map(Self::Currency),
            PrimitiveKind::Date => self.to_date().map(Self::Date),
            PrimitiveKind::Array => Err("only arrays convert to array"),
        };

        converted.map_err(|reason| ConversionError {
            from: self.kind(),
            to: target,
            value: self.to_string(),
            reason: reason.to_string(),
        })
    }

    fn owned_text(&self) -> Result<String, &'static str> {
        self.as_text().map(str::to_owned).ok_or("not a text value")
    }

    fn render_text(&self) -> Result<String, &'static str> {
        match self {
            Self::Array(_) => Err("arrays have no text form"),
            Self::Date(v) => Ok(v.to_rfc3339()),
            other => Ok(other.to_string()),
        }
    }

    fn to_bool(&self) -> Result<bool, &'static str> {
        match self {
            Self::Boolean(v) => Ok(*v),
            Self::String(v) if v.eq_ignore_ascii_case("true") => Ok(true),
            Self::String(v) if v.eq_ignore_ascii_case("false") => Ok(false),
            _ => Err("not a boolean"),
        }
    }

    fn to_i64(&self) -> Result<i64, &'static str> {
        match self {
            Self::String(v) => v.trim().parse::<i64>().map_err(|_| "not an integer"),
            Self::Float(_) | Self::Double(_) | Self::Currency(_) => {
                Err("fractional values do not narrow to integers")
            }
            other => other.as_i64().ok_or("not a number"),
        }
    }

    fn to_f64(&self) -> Result<f64, &'static str> {
        match self {
            Self::String(v) => v.trim().parse::<f64>().map_err(|_| "not a number"),
            other => other.as_f64().ok_or("not a number"),
        }
    }

    fn to_date(&self) -> Result<DateTime<Utc>, &'static str> {
        match self {
            Self::Date(v) => Ok(*v),
            Self::String(v) => DateTime::parse_from_rfc3339(v.trim())
                .map(|parsed| parsed.with_timezone(&Utc))
                .map_err(|_| "not an RFC 3339 timestamp"),
            _ => Err("not a date"),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(v) | Self::Url(v) | Self::ImageUrl(v) => f.write_str(v),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}"),
            Self::Short(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Double(v) | Self::Currency(v) => write!(f, "{v}"),
            Self::Date(v) => f.write_str(&v.to_rfc3339()),
            Self::Array(items) => {
                f.write_str("[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Long(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}
