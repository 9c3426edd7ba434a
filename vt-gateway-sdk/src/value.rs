use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;

/// A raw value as read from or written to the device.
///
/// Arrays are homogeneous on the wire; the adapter rejects mixed arrays.
#[derive(Clone, Debug, PartialEq)]
pub enum DeviceValue {
    Null,
    Boolean(bool),
    SByte(i8),
    Byte(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float(f32),
    Double(f64),
    String(String),
    DateTime(DateTime<Utc>),
    Array(Vec<DeviceValue>),
}

impl DeviceValue {
    /// Type name as reported alongside decoded parameters, e.g. `Int16` or `Boolean[]`.
    ///
    /// Returns `None` for `Null`. Empty arrays report `Array`.
    pub fn type_name(&self) -> Option<String> {
        let name = match self {
            DeviceValue::Null => return None,
            DeviceValue::Boolean(_) => "Boolean",
            DeviceValue::SByte(_) => "SByte",
            DeviceValue::Byte(_) => "Byte",
            DeviceValue::Int16(_) => "Int16",
            DeviceValue::UInt16(_) => "UInt16",
            DeviceValue::Int32(_) => "Int32",
            DeviceValue::UInt32(_) => "UInt32",
            DeviceValue::Int64(_) => "Int64",
            DeviceValue::UInt64(_) => "UInt64",
            DeviceValue::Float(_) => "Float",
            DeviceValue::Double(_) => "Double",
            DeviceValue::String(_) => "String",
            DeviceValue::DateTime(_) => "DateTime",
            DeviceValue::Array(items) => {
                return Some(match items.first().and_then(DeviceValue::type_name) {
                    Some(inner) => format!("{inner}[]"),
                    None => "Array".to_string(),
                })
            }
        };
        Some(name.to_string())
    }

    #[inline]
    pub fn is_array(&self) -> bool {
        matches!(self, DeviceValue::Array(_))
    }

    /// Numeric view used by pollers that only care about magnitudes.
    ///
    /// Booleans map to 0/1, strings are parsed leniently, everything else is `None`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DeviceValue::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            DeviceValue::SByte(v) => Some(*v as f64),
            DeviceValue::Byte(v) => Some(*v as f64),
            DeviceValue::Int16(v) => Some(*v as f64),
            DeviceValue::UInt16(v) => Some(*v as f64),
            DeviceValue::Int32(v) => Some(*v as f64),
            DeviceValue::UInt32(v) => Some(*v as f64),
            DeviceValue::Int64(v) => Some(*v as f64),
            DeviceValue::UInt64(v) => Some(*v as f64),
            DeviceValue::Float(v) => Some(*v as f64),
            DeviceValue::Double(v) => Some(*v),
            DeviceValue::String(s) => s.trim().parse::<f64>().ok(),
            DeviceValue::Null | DeviceValue::DateTime(_) | DeviceValue::Array(_) => None,
        }
    }
}

impl fmt::Display for DeviceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceValue::Null => Ok(()),
            DeviceValue::Boolean(v) => write!(f, "{v}"),
            DeviceValue::SByte(v) => write!(f, "{v}"),
            DeviceValue::Byte(v) => write!(f, "{v}"),
            DeviceValue::Int16(v) => write!(f, "{v}"),
            DeviceValue::UInt16(v) => write!(f, "{v}"),
            DeviceValue::Int32(v) => write!(f, "{v}"),
            DeviceValue::UInt32(v) => write!(f, "{v}"),
            DeviceValue::Int64(v) => write!(f, "{v}"),
            DeviceValue::UInt64(v) => write!(f, "{v}"),
            DeviceValue::Float(v) => write!(f, "{v}"),
            DeviceValue::Double(v) => write!(f, "{v}"),
            DeviceValue::String(v) => f.write_str(v),
            DeviceValue::DateTime(v) => {
                f.write_str(&v.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            DeviceValue::Array(items) => {
                let mut first = true;
                for item in items {
                    if !first {
                        f.write_str(",")?;
                    }
                    first = false;
                    write!(f, "{item}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<bool> for DeviceValue {
    fn from(v: bool) -> Self {
        DeviceValue::Boolean(v)
    }
}

impl From<i32> for DeviceValue {
    fn from(v: i32) -> Self {
        DeviceValue::Int32(v)
    }
}

impl From<&str> for DeviceValue {
    fn from(v: &str) -> Self {
        DeviceValue::String(v.to_string())
    }
}

impl From<String> for DeviceValue {
    fn from(v: String) -> Self {
        DeviceValue::String(v)
    }
}
