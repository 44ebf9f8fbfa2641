//! Metadata-driven event decoding.
//!
//! Turns a [`RawEventRecord`] into a [`DecodedEvent`] whose params are
//! labeled from the chain's declared field metadata. Event schemas differ
//! per chain and per runtime upgrade, so every field degrades to a fallback
//! label instead of failing when its metadata is incomplete.

use crate::types::{DecodedEvent, FieldMeta, Param, ParamValue, RawEventRecord};

/// Label of the leading documentation param.
pub const DOCS_LABEL: &str = "Docs";

/// Label used for fields that declare neither a name nor a type name.
pub const DISPATCH_INFO_LABEL: &str = "DispatchInfo: dispatch_info";

/// How a field's label is derived from its metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldLabel<'a> {
    /// Both a type name and a name: `"{type_name}: {name}"`.
    NamedTyped { type_name: &'a str, name: &'a str },
    /// Only a name: `"{name}"`.
    NamedOnly(&'a str),
    /// Only a type name: `"{type_name}"`.
    TypedOnly(&'a str),
    /// Neither; labeled as the system dispatch-info field.
    Untyped,
}

impl<'a> FieldLabel<'a> {
    /// Classify a field. Empty strings count as absent.
    pub fn classify(field: &'a FieldMeta) -> Self {
        let name = non_empty(field.name.as_deref());
        let type_name = non_empty(field.type_name.as_deref());
        match (type_name, name) {
            (Some(type_name), Some(name)) => Self::NamedTyped { type_name, name },
            (None, Some(name)) => Self::NamedOnly(name),
            (Some(type_name), None) => Self::TypedOnly(type_name),
            (None, None) => Self::Untyped,
        }
    }

    pub fn render(&self) -> String {
        match self {
            Self::NamedTyped { type_name, name } => format!("{type_name}: {name}"),
            Self::NamedOnly(name) => (*name).to_string(),
            Self::TypedOnly(type_name) => (*type_name).to_string(),
            Self::Untyped => DISPATCH_INFO_LABEL.to_string(),
        }
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.is_empty())
}

/// Join documentation lines into the single string held by the `Docs` param.
pub fn join_docs(lines: &[String]) -> String {
    lines.join(",")
}

/// Decode one raw event. Pure: the same input always yields the same output.
pub fn decode(raw: &RawEventRecord, block: u64, index_in_block: u32) -> DecodedEvent {
    let mut params = Vec::with_capacity(raw.fields.len() + 1);
    params.push(Param::new(
        DOCS_LABEL,
        ParamValue::Present(serde_json::Value::String(join_docs(&raw.docs))),
    ));

    for (i, field) in raw.fields.iter().enumerate() {
        let value = match raw.values.get(i) {
            Some(v) => ParamValue::Present(v.clone()),
            None => ParamValue::Absent,
        };
        params.push(Param::new(FieldLabel::classify(field).render(), value));
    }

    if raw.values.len() > raw.fields.len() {
        tracing::debug!(
            event = %format_args!("{}:{}", raw.section, raw.method),
            fields = raw.fields.len(),
            values = raw.values.len(),
            "dropping values without field metadata"
        );
    }

    DecodedEvent {
        block,
        id: index_in_block,
        name: format!("{}:{}", raw.section, raw.method),
        phase: raw.phase,
        params,
    }
}

/// Decode every event of one block, indexed by position within the block.
pub fn decode_block(records: &[RawEventRecord], block: u64) -> Vec<DecodedEvent> {
    records
        .iter()
        .enumerate()
        .map(|(i, raw)| decode(raw, block, i as u32))
        .collect()
}
