//! Runtime metadata and `System.Events` decoding.
//!
//! A [`ChainMetadata`] is built once per runtime spec version from the bytes
//! returned by `state_getMetadata`. It owns the type registry and knows the
//! type id of the event-record vector stored under `System.Events`.

use frame_metadata::v14::{PalletStorageMetadata, StorageEntryType};
use frame_metadata::{RuntimeMetadata, RuntimeMetadataPrefixed, META_RESERVED};
use parity_scale_codec::Decode;
use scale_info::{form::PortableForm, PortableRegistry, TypeDef};
use scale_value::{Composite, Primitive, Value, ValueDef};

use chainscan_core::{FieldMeta, Phase, RawEventRecord};

use crate::error::SubstrateError;
use crate::value::to_json;

/// Storage key of `System.Events`: `twox128("System") ++ twox128("Events")`.
pub const SYSTEM_EVENTS_KEY: &str =
    "0x26aa394eea5630e07c48ae0c9558cef780d41e5e16056765bc8461851072c9d7";

/// Decoding context for one runtime version.
#[derive(Debug, Clone)]
pub struct ChainMetadata {
    spec_version: u32,
    version: u32,
    types: PortableRegistry,
    events_ty: u32,
}

impl ChainMetadata {
    /// Decode SCALE-encoded, magic-prefixed runtime metadata.
    ///
    /// Only V14 and V15 carry a portable type registry; older versions are
    /// rejected.
    pub fn from_bytes(spec_version: u32, bytes: &[u8]) -> Result<Self, SubstrateError> {
        let prefixed = RuntimeMetadataPrefixed::decode(&mut &bytes[..])
            .map_err(|e| SubstrateError::Metadata(e.to_string()))?;
        if prefixed.0 != META_RESERVED {
            return Err(SubstrateError::Metadata(format!(
                "bad magic number {:#x}",
                prefixed.0
            )));
        }

        let (version, types, events_ty) = match prefixed.1 {
            RuntimeMetadata::V14(m) => {
                let ty = find_events_ty(
                    m.pallets
                        .iter()
                        .map(|p| (p.name.as_str(), p.storage.as_ref())),
                )?;
                (14, m.types, ty)
            }
            RuntimeMetadata::V15(m) => {
                let ty = find_events_ty(
                    m.pallets
                        .iter()
                        .map(|p| (p.name.as_str(), p.storage.as_ref())),
                )?;
                (15, m.types, ty)
            }
            _ => {
                return Err(SubstrateError::Metadata(
                    "unsupported metadata version (expected V14 or V15)".into(),
                ))
            }
        };

        Ok(Self {
            spec_version,
            version,
            types,
            events_ty,
        })
    }

    pub fn spec_version(&self) -> u32 {
        self.spec_version
    }

    /// Metadata format version (14 or 15).
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn types(&self) -> &PortableRegistry {
        &self.types
    }

    /// Decode the raw `System.Events` storage value into event records,
    /// preserving emission order.
    pub fn decode_events(&self, bytes: &[u8]) -> Result<Vec<RawEventRecord>, SubstrateError> {
        let cursor = &mut &bytes[..];
        let value = scale_value::scale::decode_as_type(cursor, self.events_ty, &self.types)
            .map_err(|e| SubstrateError::Decode(e.to_string()))?;
        if !cursor.is_empty() {
            tracing::warn!(trailing = cursor.len(), "trailing bytes after event records");
        }

        match value.value {
            ValueDef::Composite(Composite::Unnamed(records)) => {
                records.iter().map(|r| self.record(r)).collect()
            }
            ValueDef::Composite(Composite::Named(records)) => {
                records.iter().map(|(_, r)| self.record(r)).collect()
            }
            _ => Err(SubstrateError::Decode(
                "System.Events is not a sequence".into(),
            )),
        }
    }

    fn record(&self, record: &Value<u32>) -> Result<RawEventRecord, SubstrateError> {
        let phase = field(record, "phase", 0)
            .ok_or_else(|| SubstrateError::Decode("event record without phase".into()))?;
        let event = field(record, "event", 1)
            .ok_or_else(|| SubstrateError::Decode("event record without event".into()))?;
        let (phase, extrinsic_index) = decode_phase(phase)?;

        let ValueDef::Variant(pallet) = &event.value else {
            return Err(SubstrateError::Decode("event is not an enum".into()));
        };
        let inner = first_value(&pallet.values).ok_or_else(|| {
            SubstrateError::Decode(format!("pallet {} event carries no value", pallet.name))
        })?;
        let ValueDef::Variant(ev) = &inner.value else {
            return Err(SubstrateError::Decode(format!(
                "{} event is not an enum",
                pallet.name
            )));
        };

        let values: Vec<serde_json::Value> = match &ev.values {
            Composite::Named(fields) => fields
                .iter()
                .map(|(_, v)| to_json(v, &self.types))
                .collect(),
            Composite::Unnamed(values) => {
                values.iter().map(|v| to_json(v, &self.types)).collect()
            }
        };
        let (fields, docs) = self.event_meta(inner.context, &ev.name).unwrap_or_else(|| {
            tracing::debug!(
                pallet = %pallet.name,
                event = %ev.name,
                "no type info for event variant"
            );
            (fallback_fields(&ev.values), Vec::new())
        });

        Ok(RawEventRecord {
            section: section_name(&pallet.name),
            method: ev.name.clone(),
            phase,
            extrinsic_index,
            values,
            fields,
            docs,
        })
    }

    /// Field metadata and docs of variant `name` of the pallet event enum `ty`.
    fn event_meta(&self, ty: u32, name: &str) -> Option<(Vec<FieldMeta>, Vec<String>)> {
        let TypeDef::Variant(def) = &self.types.resolve(ty)?.type_def else {
            return None;
        };
        let variant = def.variants.iter().find(|v| v.name == name)?;
        let fields = variant
            .fields
            .iter()
            .map(|f| FieldMeta {
                name: f.name.clone(),
                type_name: f.type_name.clone(),
                docs: f.docs.clone(),
            })
            .collect();
        Some((fields, variant.docs.clone()))
    }
}

fn find_events_ty<'a>(
    mut pallets: impl Iterator<Item = (&'a str, Option<&'a PalletStorageMetadata<PortableForm>>)>,
) -> Result<u32, SubstrateError> {
    let (_, storage) = pallets
        .find(|(name, _)| *name == "System")
        .ok_or_else(|| SubstrateError::Metadata("runtime has no System pallet".into()))?;
    let entry = storage
        .and_then(|s| s.entries.iter().find(|e| e.name == "Events"))
        .ok_or_else(|| SubstrateError::Metadata("System pallet has no Events storage".into()))?;
    match &entry.ty {
        StorageEntryType::Plain(ty) => Ok(ty.id),
        StorageEntryType::Map { .. } => Err(SubstrateError::Metadata(
            "System.Events is a map, expected a plain value".into(),
        )),
    }
}

/// Field `name` of a composite value, falling back to position `index`.
fn field<'v>(value: &'v Value<u32>, name: &str, index: usize) -> Option<&'v Value<u32>> {
    match &value.value {
        ValueDef::Composite(Composite::Named(fields)) => {
            fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
        }
        ValueDef::Composite(Composite::Unnamed(values)) => values.get(index),
        _ => None,
    }
}

fn first_value(c: &Composite<u32>) -> Option<&Value<u32>> {
    match c {
        Composite::Named(fields) => fields.first().map(|(_, v)| v),
        Composite::Unnamed(values) => values.first(),
    }
}

fn decode_phase(value: &Value<u32>) -> Result<(Phase, Option<u32>), SubstrateError> {
    let ValueDef::Variant(v) = &value.value else {
        return Err(SubstrateError::Decode("phase is not an enum".into()));
    };
    match v.name.as_str() {
        "ApplyExtrinsic" => {
            let index = first_value(&v.values).and_then(|i| match &i.value {
                ValueDef::Primitive(Primitive::U128(n)) => u32::try_from(*n).ok(),
                _ => None,
            });
            Ok((Phase::ApplyExtrinsic, index))
        }
        "Finalization" => Ok((Phase::Finalization, None)),
        "Initialization" => Ok((Phase::Initialization, None)),
        other => Err(SubstrateError::Decode(format!("unknown phase {other}"))),
    }
}

fn fallback_fields(values: &Composite<u32>) -> Vec<FieldMeta> {
    match values {
        Composite::Named(fields) => fields
            .iter()
            .map(|(name, _)| FieldMeta {
                name: Some(name.clone()),
                ..FieldMeta::default()
            })
            .collect(),
        Composite::Unnamed(values) => values.iter().map(|_| FieldMeta::default()).collect(),
    }
}

/// Pallet names are displayed lower-camel-cased (`Balances` → `balances`).
pub fn section_name(pallet: &str) -> String {
    let mut chars = pallet.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
