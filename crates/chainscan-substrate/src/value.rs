//! Conversion of decoded SCALE values into JSON.
//!
//! The registry is consulted so that byte containers render as `0x` hex,
//! `Option` collapses to `null`/inner, and single-field tuple structs are
//! unwrapped, which is how Substrate tooling displays event parameters.

use scale_info::{form::PortableForm, PortableRegistry, Type, TypeDef, TypeDefPrimitive};
use scale_value::{BitSequence, Composite, Primitive, Value, ValueDef, Variant};
use serde_json::{Map, Number, Value as Json};

/// Render a decoded value. `value.context` must be a type id in `types`.
pub fn to_json(value: &Value<u32>, types: &PortableRegistry) -> Json {
    match &value.value {
        ValueDef::Primitive(p) => primitive(p),
        ValueDef::BitSequence(bits) => bit_string(bits),
        ValueDef::Variant(v) => variant(v, value.context, types),
        ValueDef::Composite(c) => composite(c, value.context, types),
    }
}

fn primitive(p: &Primitive) -> Json {
    match p {
        Primitive::Bool(b) => Json::Bool(*b),
        Primitive::Char(c) => Json::String(c.to_string()),
        Primitive::String(s) => Json::String(s.clone()),
        Primitive::U128(n) => match u64::try_from(*n) {
            Ok(n) => Json::Number(n.into()),
            Err(_) => Json::String(n.to_string()),
        },
        Primitive::I128(n) => match i64::try_from(*n) {
            Ok(n) => Json::Number(Number::from(n)),
            Err(_) => Json::String(n.to_string()),
        },
        Primitive::U256(bytes) | Primitive::I256(bytes) => {
            Json::String(format!("0x{}", hex::encode(bytes)))
        }
    }
}

fn bit_string(bits: &BitSequence) -> Json {
    Json::String(bits.iter().map(|b| if b { '1' } else { '0' }).collect())
}

fn composite(c: &Composite<u32>, ty: u32, types: &PortableRegistry) -> Json {
    let resolved = types.resolve(ty);

    if resolved.is_some_and(|t| is_byte_container(t, types)) {
        if let Some(bytes) = as_bytes(c) {
            return Json::String(format!("0x{}", hex::encode(bytes)));
        }
    }

    match c {
        Composite::Named(fields) => {
            let mut map = Map::with_capacity(fields.len());
            for (name, v) in fields {
                map.insert(name.clone(), to_json(v, types));
            }
            Json::Object(map)
        }
        Composite::Unnamed(values) => {
            let newtype = matches!(resolved.map(|t| &t.type_def), Some(TypeDef::Composite(_)));
            if newtype && values.len() == 1 {
                to_json(&values[0], types)
            } else {
                Json::Array(values.iter().map(|v| to_json(v, types)).collect())
            }
        }
    }
}

fn variant(v: &Variant<u32>, ty: u32, types: &PortableRegistry) -> Json {
    let is_option = types
        .resolve(ty)
        .is_some_and(|t| t.path.segments.last().map(String::as_str) == Some("Option"));

    let inner = match &v.values {
        Composite::Named(fields) if fields.is_empty() => None,
        Composite::Unnamed(values) if values.is_empty() => None,
        Composite::Unnamed(values) if values.len() == 1 => Some(to_json(&values[0], types)),
        Composite::Named(fields) => {
            let mut map = Map::with_capacity(fields.len());
            for (name, value) in fields {
                map.insert(name.clone(), to_json(value, types));
            }
            Some(Json::Object(map))
        }
        Composite::Unnamed(values) => {
            Some(Json::Array(values.iter().map(|x| to_json(x, types)).collect()))
        }
    };

    match (is_option, inner) {
        (true, None) => Json::Null,
        (true, Some(inner)) => inner,
        (false, None) => Json::String(v.name.clone()),
        (false, Some(inner)) => {
            let mut map = Map::with_capacity(1);
            map.insert(v.name.clone(), inner);
            Json::Object(map)
        }
    }
}

fn is_u8(id: u32, types: &PortableRegistry) -> bool {
    types
        .resolve(id)
        .is_some_and(|t| matches!(t.type_def, TypeDef::Primitive(TypeDefPrimitive::U8)))
}

fn is_byte_container(ty: &Type<PortableForm>, types: &PortableRegistry) -> bool {
    match &ty.type_def {
        TypeDef::Sequence(seq) => is_u8(seq.type_param.id, types),
        TypeDef::Array(arr) => is_u8(arr.type_param.id, types),
        _ => false,
    }
}

fn as_bytes(c: &Composite<u32>) -> Option<Vec<u8>> {
    let Composite::Unnamed(values) = c else {
        return None;
    };
    values
        .iter()
        .map(|v| match &v.value {
            ValueDef::Primitive(Primitive::U128(n)) => u8::try_from(*n).ok(),
            _ => None,
        })
        .collect()
}
