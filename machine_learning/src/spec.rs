//! JSON specifications shared by the trainer and the inference server.
//!
//! Nested `Params` objects are accepted either inline or string-encoded.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{MlErr, Result};

/// Decodes `value` into `T`, first parsing it when it holds a JSON string.
/// A `null` decodes like an empty object so all-default records may be omitted.
pub fn decode<T: DeserializeOwned>(value: Value) -> serde_json::Result<T> {
    match value {
        Value::String(s) => serde_json::from_str(&s),
        Value::Null => serde_json::from_value(Value::Object(Default::default())),
        other => serde_json::from_value(other),
    }
}

/// `deserialize_with` adapter over [`decode`].
pub fn inline_or_string<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    decode(value).map_err(serde::de::Error::custom)
}

/// A string-tagged operation: `{"Op": ..., "Params": ...}`.
#[derive(Debug, Clone, Deserialize)]
pub struct OpSpec {
    #[serde(rename = "Op")]
    pub op: String,
    #[serde(rename = "Params", default)]
    pub params: Value,
}

impl OpSpec {
    /// Decodes this op's parameters into `T`.
    ///
    /// # Arguments
    /// * `what` - The op family, used in the error message.
    pub fn params<T: DeserializeOwned>(&self, what: &str) -> Result<T> {
        decode(self.params.clone()).map_err(|e| {
            MlErr::InvalidSpec(format!("{what} {:?} params: {e}", self.op))
        })
    }
}

/// Reference to one component of the architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentRef {
    #[serde(rename = "ID")]
    pub id: u32,
}

/// The architecture: input count and the components it is made of.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchSpec {
    #[serde(rename = "NumInputs")]
    pub num_inputs: usize,
    #[serde(rename = "Components", default)]
    pub components: Vec<ComponentRef>,
}

fn default_amp() -> f32 {
    1.0
}

/// The specification of a network component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "Type", rename_all = "snake_case")]
pub enum ComponentSpec {
    /// A shared dense encoder over both crops and a logistic head on the
    /// absolute embedding difference.
    Siamese {
        #[serde(rename = "Hidden", default)]
        hidden: Vec<usize>,
        #[serde(rename = "Embedding")]
        embedding: usize,
        #[serde(rename = "Amp", default = "default_amp")]
        amp: f32,
        #[serde(rename = "Seed", default)]
        seed: Option<u64>,
    },
}

/// Component specifications keyed by component id.
pub type ComponentSpecs = BTreeMap<u32, ComponentSpec>;

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn string_encoded_params_match_inline_ones() {
        let inline: ArchSpec = decode(json!({"NumInputs": 2, "Components": [{"ID": 1}]})).unwrap();
        let encoded: ArchSpec =
            decode(json!("{\"NumInputs\": 2, \"Components\": [{\"ID\": 1}]}")).unwrap();

        assert_eq!(inline, encoded);
        assert_eq!(inline.components[0].id, 1);
    }

    #[test]
    fn component_specs_are_keyed_by_integer_ids() {
        let comps: ComponentSpecs = serde_json::from_value(json!({
            "3": {"Type": "siamese", "Hidden": [16], "Embedding": 8}
        }))
        .unwrap();

        assert_eq!(
            comps[&3],
            ComponentSpec::Siamese {
                hidden: vec![16],
                embedding: 8,
                amp: 1.0,
                seed: None,
            }
        );
    }

    #[test]
    fn unknown_component_type_fails() {
        let res: serde_json::Result<ComponentSpec> =
            serde_json::from_value(json!({"Type": "yolo", "Embedding": 8}));
        assert!(res.is_err());
    }

    #[test]
    fn op_params_default_to_an_empty_object() {
        #[derive(Deserialize)]
        struct P {
            #[serde(default)]
            x: u32,
        }

        let op: OpSpec = serde_json::from_value(json!({"Op": "scale"})).unwrap();
        assert_eq!(op.params::<P>("augmentation").unwrap().x, 0);
    }
}
