use opcua::types::{Array, UAString, Variant, VariantScalarTypeId};
use vt_gateway_sdk::{DeviceError, DeviceResult, DeviceValue};

/// Conversion between OPC UA variants and the protocol-neutral [`DeviceValue`].
pub struct VariantCodec;

impl VariantCodec {
    /// Convert a UA variant into a device value.
    ///
    /// Variant kinds without a direct counterpart (node ids, guids, byte strings and
    /// so on) are carried as their textual form.
    pub fn to_device_value(variant: &Variant) -> DeviceValue {
        match variant {
            Variant::Empty => DeviceValue::Null,
            Variant::Boolean(b) => DeviceValue::Boolean(*b),
            Variant::SByte(n) => DeviceValue::SByte(*n),
            Variant::Byte(n) => DeviceValue::Byte(*n),
            Variant::Int16(n) => DeviceValue::Int16(*n),
            Variant::UInt16(n) => DeviceValue::UInt16(*n),
            Variant::Int32(n) => DeviceValue::Int32(*n),
            Variant::UInt32(n) => DeviceValue::UInt32(*n),
            Variant::Int64(n) => DeviceValue::Int64(*n),
            Variant::UInt64(n) => DeviceValue::UInt64(*n),
            Variant::Float(f) => DeviceValue::Float(*f),
            Variant::Double(f) => DeviceValue::Double(*f),
            Variant::String(s) => DeviceValue::String(s.as_ref().to_string()),
            Variant::DateTime(dt) => DeviceValue::DateTime(dt.as_chrono()),
            Variant::Array(array) => {
                DeviceValue::Array(array.values.iter().map(Self::to_device_value).collect())
            }
            other => DeviceValue::String(other.to_string()),
        }
    }

    /// Convert a device value into a UA variant ready for a write request.
    ///
    /// Arrays must be homogeneous; the element type of the first item decides
    /// the array type.
    pub fn to_variant(value: &DeviceValue) -> DeviceResult<Variant> {
        let variant = match value {
            DeviceValue::Null => Variant::Empty,
            DeviceValue::Boolean(b) => Variant::Boolean(*b),
            DeviceValue::SByte(n) => Variant::SByte(*n),
            DeviceValue::Byte(n) => Variant::Byte(*n),
            DeviceValue::Int16(n) => Variant::Int16(*n),
            DeviceValue::UInt16(n) => Variant::UInt16(*n),
            DeviceValue::Int32(n) => Variant::Int32(*n),
            DeviceValue::UInt32(n) => Variant::UInt32(*n),
            DeviceValue::Int64(n) => Variant::Int64(*n),
            DeviceValue::UInt64(n) => Variant::UInt64(*n),
            DeviceValue::Float(f) => Variant::Float(*f),
            DeviceValue::Double(f) => Variant::Double(*f),
            DeviceValue::String(s) => Variant::String(UAString::from(s.as_str())),
            DeviceValue::DateTime(dt) => {
                Variant::DateTime(Box::new(opcua::types::DateTime::from(*dt)))
            }
            DeviceValue::Array(items) => return Self::array_to_variant(items),
        };
        Ok(variant)
    }

    fn array_to_variant(items: &[DeviceValue]) -> DeviceResult<Variant> {
        let element_type = match items.first() {
            Some(first) => Self::scalar_type(first)?,
            None => VariantScalarTypeId::String,
        };
        let mut values = Vec::with_capacity(items.len());
        for item in items {
            if Self::scalar_type(item)? != element_type {
                return Err(DeviceError::CodecError(format!(
                    "mixed array element {item:?}, expected {element_type:?}"
                )));
            }
            values.push(Self::to_variant(item)?);
        }
        let array = Array::new(element_type, values)
            .map_err(|e| DeviceError::CodecError(format!("array build error: {e:?}")))?;
        Ok(Variant::Array(Box::new(array)))
    }

    fn scalar_type(value: &DeviceValue) -> DeviceResult<VariantScalarTypeId> {
        let id = match value {
            DeviceValue::Boolean(_) => VariantScalarTypeId::Boolean,
            DeviceValue::SByte(_) => VariantScalarTypeId::SByte,
            DeviceValue::Byte(_) => VariantScalarTypeId::Byte,
            DeviceValue::Int16(_) => VariantScalarTypeId::Int16,
            DeviceValue::UInt16(_) => VariantScalarTypeId::UInt16,
            DeviceValue::Int32(_) => VariantScalarTypeId::Int32,
            DeviceValue::UInt32(_) => VariantScalarTypeId::UInt32,
            DeviceValue::Int64(_) => VariantScalarTypeId::Int64,
            DeviceValue::UInt64(_) => VariantScalarTypeId::UInt64,
            DeviceValue::Float(_) => VariantScalarTypeId::Float,
            DeviceValue::Double(_) => VariantScalarTypeId::Double,
            DeviceValue::String(_) => VariantScalarTypeId::String,
            DeviceValue::DateTime(_) => VariantScalarTypeId::DateTime,
            DeviceValue::Null | DeviceValue::Array(_) => {
                return Err(DeviceError::CodecError(format!(
                    "{value:?} cannot be an array element"
                )))
            }
        };
        Ok(id)
    }
}
