//! Conversion between raw device values and the canonical string form.

use crate::tagmap::TagEntry;
use std::str::FromStr;
use vt_gateway_sdk::DeviceValue;

/// OPC UA built-in type ids as they appear in `DataTypeId`.
mod type_id {
    pub const BOOLEAN: i32 = 1;
    pub const SBYTE: i32 = 2;
    pub const BYTE: i32 = 3;
    pub const INT16: i32 = 4;
    pub const UINT16: i32 = 5;
    pub const INT32: i32 = 6;
    pub const UINT32: i32 = 7;
    pub const INT64: i32 = 8;
    pub const UINT64: i32 = 9;
    pub const FLOAT: i32 = 10;
    pub const DOUBLE: i32 = 11;
    pub const STRING: i32 = 12;
}

pub struct ValueCodec;

impl ValueCodec {
    /// Device value to canonical text.
    ///
    /// Arrays become a JSON array of their stringified elements. Never fails.
    pub fn decode(value: &DeviceValue) -> String {
        match value {
            DeviceValue::Array(items) => {
                let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
                serde_json::to_string(&parts).unwrap_or_else(|_| parts.join(","))
            }
            other => other.to_string(),
        }
    }

    /// Canonical text to device value, guided by the entry's type metadata.
    ///
    /// Without metadata, or when the text does not parse as the declared type,
    /// the raw text is passed through and the device gets to coerce it.
    pub fn encode(raw: &str, meta: Option<&TagEntry>) -> DeviceValue {
        let Some(meta) = meta else {
            return DeviceValue::String(raw.to_string());
        };
        if meta.is_array() {
            return encode_array(raw, meta.data_type_id);
        }
        meta.data_type_id
            .and_then(|id| encode_scalar(raw, id))
            .unwrap_or_else(|| DeviceValue::String(raw.to_string()))
    }
}

fn encode_array(raw: &str, data_type_id: Option<i32>) -> DeviceValue {
    let parts: Vec<&str> = if raw.trim().is_empty() {
        Vec::new()
    } else {
        raw.split(',').map(str::trim).collect()
    };
    let typed: Option<Vec<DeviceValue>> = match data_type_id {
        Some(id) => parts.iter().map(|p| encode_scalar(p, id)).collect(),
        None => None,
    };
    DeviceValue::Array(typed.unwrap_or_else(|| {
        parts
            .into_iter()
            .map(|p| DeviceValue::String(p.to_string()))
            .collect()
    }))
}

/// `None` when `raw` does not parse as the type `id` names.
fn encode_scalar(raw: &str, id: i32) -> Option<DeviceValue> {
    let text = raw.trim();
    let value = match id {
        type_id::BOOLEAN => DeviceValue::Boolean(parse_bool(text)?),
        type_id::SBYTE => DeviceValue::SByte(parse_int(text)?),
        type_id::BYTE => DeviceValue::Byte(parse_int(text)?),
        type_id::INT16 => DeviceValue::Int16(parse_int(text)?),
        type_id::UINT16 => DeviceValue::UInt16(parse_int(text)?),
        type_id::INT32 => DeviceValue::Int32(parse_int(text)?),
        type_id::UINT32 => DeviceValue::UInt32(parse_int(text)?),
        type_id::INT64 => DeviceValue::Int64(parse_int(text)?),
        type_id::UINT64 => DeviceValue::UInt64(parse_int(text)?),
        type_id::FLOAT => DeviceValue::Float(text.parse().ok()?),
        type_id::DOUBLE => DeviceValue::Double(text.parse().ok()?),
        type_id::STRING => DeviceValue::String(raw.to_string()),
        _ => return None,
    };
    Some(value)
}

/// `0`/`1` or `true`/`false` in any case.
pub(crate) fn parse_bool(text: &str) -> Option<bool> {
    match text {
        "1" => Some(true),
        "0" => Some(false),
        t if t.eq_ignore_ascii_case("true") => Some(true),
        t if t.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

/// Integer text, or decimal text with no fractional part that fits the target.
pub(crate) fn parse_int<T>(text: &str) -> Option<T>
where
    T: FromStr + TryFrom<i128>,
{
    let text = text.strip_prefix('+').unwrap_or(text);
    if let Ok(v) = text.parse::<T>() {
        return Some(v);
    }
    let f = text.parse::<f64>().ok()?;
    if !f.is_finite() || f.fract() != 0.0 {
        return None;
    }
    T::try_from(f as i128).ok()
}
