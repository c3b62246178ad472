//! Snapshot codec
//!
//! A [`Snapshot`] is the serialized state of one networked component
//! instance: an ordered map from field name to [`SnapshotValue`]. Components
//! implement [`NetworkedComponent`] to write themselves into a snapshot and to
//! read a received snapshot back.
//!
//! Entity references are written as the referenced entity's
//! [`NetworkEntityId`] and resolved against the receiver's registry on read.
//! Creation order across the wire is not guaranteed, so an id the receiver
//! does not know yet reads back as "no reference" instead of an error.

use crate::components::ComponentKind;
use crate::entity::NetworkEntityId;
use crate::math::{Rgb, Vec2};
use crate::registry::EntityResolver;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SnapshotValue {
    Bool(bool),
    Int(i64),
    /// Floats travel as f64 so f32 component state survives unchanged.
    Float(f64),
    Text(String),
    List(Vec<SnapshotValue>),
    Record(Snapshot),
    EntityRef(Option<NetworkEntityId>),
}

impl SnapshotValue {
    fn type_name(&self) -> &'static str {
        match self {
            SnapshotValue::Bool(_) => "bool",
            SnapshotValue::Int(_) => "int",
            SnapshotValue::Float(_) => "float",
            SnapshotValue::Text(_) => "text",
            SnapshotValue::List(_) => "list",
            SnapshotValue::Record(_) => "record",
            SnapshotValue::EntityRef(_) => "entity reference",
        }
    }
}

impl From<bool> for SnapshotValue {
    fn from(value: bool) -> Self {
        SnapshotValue::Bool(value)
    }
}

impl From<i64> for SnapshotValue {
    fn from(value: i64) -> Self {
        SnapshotValue::Int(value)
    }
}

impl From<u32> for SnapshotValue {
    fn from(value: u32) -> Self {
        SnapshotValue::Int(i64::from(value))
    }
}

impl From<f32> for SnapshotValue {
    fn from(value: f32) -> Self {
        SnapshotValue::Float(f64::from(value))
    }
}

impl From<f64> for SnapshotValue {
    fn from(value: f64) -> Self {
        SnapshotValue::Float(value)
    }
}

impl From<&str> for SnapshotValue {
    fn from(value: &str) -> Self {
        SnapshotValue::Text(value.to_string())
    }
}

impl From<String> for SnapshotValue {
    fn from(value: String) -> Self {
        SnapshotValue::Text(value)
    }
}

impl From<Vec2> for SnapshotValue {
    fn from(value: Vec2) -> Self {
        SnapshotValue::Record(Snapshot::new().with("x", value.x).with("y", value.y))
    }
}

impl From<Rgb> for SnapshotValue {
    fn from(value: Rgb) -> Self {
        SnapshotValue::List(
            value
                .iter()
                .map(|channel| SnapshotValue::Int(i64::from(*channel)))
                .collect(),
        )
    }
}

impl From<Option<NetworkEntityId>> for SnapshotValue {
    fn from(value: Option<NetworkEntityId>) -> Self {
        SnapshotValue::EntityRef(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("snapshot is missing field `{field}`")]
    MissingField { field: String },
    #[error("snapshot field `{field}` is a {found}, expected {expected}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("snapshot field `{field}` is out of range")]
    OutOfRange { field: String },
    #[error("snapshot field `{field}` has unknown value `{value}`")]
    UnknownVariant { field: String, value: String },
    #[error("entity has no {0:?} component to apply a snapshot to")]
    MissingComponent(ComponentKind),
}

/// Serialized state of one component instance.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    fields: BTreeMap<String, SnapshotValue>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, field: &str, value: impl Into<SnapshotValue>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: &str, value: impl Into<SnapshotValue>) {
        self.fields.insert(field.to_string(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&SnapshotValue> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> + '_ {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn require(&self, field: &str) -> Result<&SnapshotValue, SnapshotError> {
        self.fields
            .get(field)
            .ok_or_else(|| SnapshotError::MissingField {
                field: field.to_string(),
            })
    }

    fn mismatch(field: &str, expected: &'static str, found: &SnapshotValue) -> SnapshotError {
        SnapshotError::TypeMismatch {
            field: field.to_string(),
            expected,
            found: found.type_name(),
        }
    }

    pub fn read_bool(&self, field: &str) -> Result<bool, SnapshotError> {
        match self.require(field)? {
            SnapshotValue::Bool(value) => Ok(*value),
            other => Err(Self::mismatch(field, "bool", other)),
        }
    }

    pub fn read_int(&self, field: &str) -> Result<i64, SnapshotError> {
        match self.require(field)? {
            SnapshotValue::Int(value) => Ok(*value),
            other => Err(Self::mismatch(field, "int", other)),
        }
    }

    pub fn read_u32(&self, field: &str) -> Result<u32, SnapshotError> {
        u32::try_from(self.read_int(field)?).map_err(|_| SnapshotError::OutOfRange {
            field: field.to_string(),
        })
    }

    pub fn read_float(&self, field: &str) -> Result<f64, SnapshotError> {
        match self.require(field)? {
            SnapshotValue::Float(value) => Ok(*value),
            SnapshotValue::Int(value) => Ok(*value as f64),
            other => Err(Self::mismatch(field, "float", other)),
        }
    }

    pub fn read_f32(&self, field: &str) -> Result<f32, SnapshotError> {
        Ok(self.read_float(field)? as f32)
    }

    pub fn read_text(&self, field: &str) -> Result<&str, SnapshotError> {
        match self.require(field)? {
            SnapshotValue::Text(value) => Ok(value),
            other => Err(Self::mismatch(field, "text", other)),
        }
    }

    pub fn read_record(&self, field: &str) -> Result<&Snapshot, SnapshotError> {
        match self.require(field)? {
            SnapshotValue::Record(record) => Ok(record),
            other => Err(Self::mismatch(field, "record", other)),
        }
    }

    pub fn read_vec2(&self, field: &str) -> Result<Vec2, SnapshotError> {
        let record = self.read_record(field)?;
        Ok(Vec2::new(record.read_f32("x")?, record.read_f32("y")?))
    }

    pub fn read_rgb(&self, field: &str) -> Result<Rgb, SnapshotError> {
        let channels = match self.require(field)? {
            SnapshotValue::List(items) if items.len() == 3 => items,
            SnapshotValue::List(_) => {
                return Err(SnapshotError::OutOfRange {
                    field: field.to_string(),
                })
            }
            other => return Err(Self::mismatch(field, "list", other)),
        };

        let mut rgb = [0u8; 3];
        for (slot, channel) in rgb.iter_mut().zip(channels) {
            *slot = match channel {
                SnapshotValue::Int(value) => {
                    u8::try_from(*value).map_err(|_| SnapshotError::OutOfRange {
                        field: field.to_string(),
                    })?
                }
                other => return Err(Self::mismatch(field, "int", other)),
            };
        }
        Ok(rgb)
    }

    /// Reads an entity reference field as a raw id, without resolving it.
    pub fn read_entity_ref(&self, field: &str) -> Result<Option<NetworkEntityId>, SnapshotError> {
        match self.require(field)? {
            SnapshotValue::EntityRef(id) => Ok(*id),
            other => Err(Self::mismatch(field, "entity reference", other)),
        }
    }
}

/// A component whose state is replicated from host to clients.
///
/// `serialize` and `deserialize` must be symmetric: every field written is
/// read back, and a field the reader needs but cannot find is an error.
pub trait NetworkedComponent {
    const KIND: ComponentKind;

    fn serialize(&self, resolver: &dyn EntityResolver) -> Snapshot;

    fn deserialize(
        &mut self,
        snapshot: &Snapshot,
        resolver: &dyn EntityResolver,
    ) -> Result<(), SnapshotError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_builder_and_reads() {
        let snapshot = Snapshot::new()
            .with("alive", true)
            .with("score", 3u32)
            .with("vel", Vec2::new(0.5, -0.25))
            .with("color", [255u8, 0, 144])
            .with("name", "ball")
            .with("target", Some(NetworkEntityId(9)));

        assert_eq!(snapshot.len(), 6);
        assert!(snapshot.read_bool("alive").unwrap());
        assert_eq!(snapshot.read_u32("score").unwrap(), 3);
        let vel = snapshot.read_vec2("vel").unwrap();
        assert_approx_eq!(vel.x, 0.5);
        assert_approx_eq!(vel.y, -0.25);
        assert_eq!(snapshot.read_rgb("color").unwrap(), [255, 0, 144]);
        assert_eq!(snapshot.read_text("name").unwrap(), "ball");
        assert_eq!(
            snapshot.read_entity_ref("target").unwrap(),
            Some(NetworkEntityId(9))
        );
    }

    #[test]
    fn test_missing_field_is_error() {
        let snapshot = Snapshot::new();
        assert_eq!(
            snapshot.read_bool("alive"),
            Err(SnapshotError::MissingField {
                field: "alive".to_string()
            })
        );
    }

    #[test]
    fn test_type_mismatch_is_error() {
        let snapshot = Snapshot::new().with("score", "lots");
        match snapshot.read_int("score") {
            Err(SnapshotError::TypeMismatch {
                expected, found, ..
            }) => {
                assert_eq!(expected, "int");
                assert_eq!(found, "text");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_out_of_range_color_channel() {
        let snapshot = Snapshot::new().with(
            "color",
            SnapshotValue::List(vec![
                SnapshotValue::Int(0),
                SnapshotValue::Int(300),
                SnapshotValue::Int(0),
            ]),
        );
        assert!(matches!(
            snapshot.read_rgb("color"),
            Err(SnapshotError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_float_keeps_f32_precision_over_bincode() {
        let value = 0.1f32 + 0.2f32;
        let snapshot = Snapshot::new().with("v", value);

        let bytes = bincode::serialize(&snapshot).unwrap();
        let decoded: Snapshot = bincode::deserialize(&bytes).unwrap();

        assert_eq!(decoded.read_f32("v").unwrap(), value);
    }
}
