//! Tool descriptors and argument validation.
//!
//! A [`ToolDescriptor`] declares a tool's name, its argument schema and the
//! shape of the text it returns. Descriptors are built once at startup and
//! never change. Arguments proposed by the model are checked against the
//! descriptor with [`ToolDescriptor::validate`] before anything is dispatched.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// Primitive parameter types understood by the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    String,
    Integer,
    /// The string `"all"` or a list of season numbers.
    SeasonSelection,
}

/// One named parameter of a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamType,
    pub required: bool,
    pub description: String,
}

impl ParamSpec {
    pub fn required(name: &str, kind: ParamType, description: &str) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            description: description.into(),
        }
    }

    pub fn optional(name: &str, kind: ParamType, description: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind, description)
        }
    }

    fn json_schema(&self) -> serde_json::Value {
        let mut schema = match self.kind {
            ParamType::String => serde_json::json!({ "type": "string" }),
            ParamType::Integer => serde_json::json!({ "type": "integer", "minimum": 0 }),
            ParamType::SeasonSelection => serde_json::json!({
                "anyOf": [
                    { "type": "string", "enum": ["all"] },
                    { "type": "array", "items": { "type": "integer", "minimum": 0 } }
                ]
            }),
        };
        schema["description"] = serde_json::Value::String(self.description.clone());
        schema
    }
}

/// Static description of a tool the decision engine may choose.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ParamSpec>,
    /// Human-readable shape of the observation text.
    pub result_contract: String,
    /// Selecting a terminal tool ends the cycle instead of producing an observation.
    #[serde(default)]
    pub terminal: bool,
}

impl ToolDescriptor {
    /// JSON Schema of the arguments object.
    pub fn json_schema(&self) -> serde_json::Value {
        let properties: serde_json::Map<String, serde_json::Value> = self
            .parameters
            .iter()
            .map(|p| (p.name.clone(), p.json_schema()))
            .collect();
        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Convert into a definition for sending to the model backend.
    pub fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: format!("{}\nReturns: {}", self.description, self.result_contract),
            parameters: self.json_schema(),
        }
    }

    /// Check `arguments` against the declared parameters.
    ///
    /// Integers are accepted as JSON numbers or as strings holding a number;
    /// anything else is rejected with [`ToolError::InvalidArguments`].
    /// Keys that are not declared are ignored.
    pub fn validate(&self, arguments: &serde_json::Value) -> Result<ValidatedArgs, ToolError> {
        let empty = serde_json::Map::new();
        let object = match arguments {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => &empty,
            serde_json::Value::String(s) if s.trim().is_empty() => &empty,
            other => {
                return Err(ToolError::invalid(
                    &self.name,
                    format!("arguments must be a JSON object, got {}", json_type(other)),
                ));
            }
        };

        let mut values = BTreeMap::new();
        for param in &self.parameters {
            match object.get(&param.name) {
                None | Some(serde_json::Value::Null) => {
                    if param.required {
                        return Err(ToolError::invalid(
                            &self.name,
                            format!("missing parameter '{}'", param.name),
                        ));
                    }
                }
                Some(raw) => {
                    let value = coerce(param, raw).map_err(|reason| ToolError::invalid(&self.name, reason))?;
                    values.insert(param.name.clone(), value);
                }
            }
        }

        Ok(ValidatedArgs { values })
    }
}

fn coerce(param: &ParamSpec, raw: &serde_json::Value) -> Result<ArgValue, String> {
    match param.kind {
        ParamType::String => match raw {
            serde_json::Value::String(s) if !s.trim().is_empty() => Ok(ArgValue::Text(s.trim().to_string())),
            serde_json::Value::String(_) => Err(format!("parameter '{}' must not be empty", param.name)),
            other => Err(format!(
                "parameter '{}' must be a string, got {}",
                param.name,
                json_type(other)
            )),
        },
        ParamType::Integer => coerce_integer(raw)
            .map(ArgValue::Integer)
            .ok_or_else(|| format!("parameter '{}' must be a non-negative integer, got {raw}", param.name)),
        ParamType::SeasonSelection => coerce_seasons(raw)
            .map(ArgValue::Seasons)
            .map_err(|reason| format!("parameter '{}' {reason}", param.name)),
    }
}

fn coerce_integer(raw: &serde_json::Value) -> Option<u64> {
    match raw {
        serde_json::Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64)),
        serde_json::Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

fn coerce_seasons(raw: &serde_json::Value) -> Result<SeasonSelection, String> {
    match raw {
        serde_json::Value::String(s) if s.trim().eq_ignore_ascii_case("all") => Ok(SeasonSelection::All),
        serde_json::Value::Array(items) => {
            if items.is_empty() {
                return Err("must list at least one season".into());
            }
            let mut seasons = Vec::with_capacity(items.len());
            for item in items {
                let n = coerce_integer(item)
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(|| format!("contains a non-integer season: {item}"))?;
                seasons.push(n);
            }
            Ok(SeasonSelection::only(seasons))
        }
        other => coerce_integer(other)
            .and_then(|n| u32::try_from(n).ok())
            .map(|n| SeasonSelection::only(vec![n]))
            .ok_or_else(|| format!("must be \"all\" or a list of season numbers, got {other}")),
    }
}

fn json_type(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Which seasons of a series to download. Season 0 holds the specials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeasonSelection {
    All,
    Only(Vec<u32>),
}

impl SeasonSelection {
    /// Sorted and de-duplicated selection.
    pub fn only(mut seasons: Vec<u32>) -> Self {
        seasons.sort_unstable();
        seasons.dedup();
        Self::Only(seasons)
    }

    pub fn includes(&self, season: u32) -> bool {
        match self {
            Self::All => true,
            Self::Only(list) => list.contains(&season),
        }
    }
}

impl std::fmt::Display for SeasonSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Only(list) => {
                let parts: Vec<String> = list.iter().map(|n| n.to_string()).collect();
                write!(f, "{}", parts.join(", "))
            }
        }
    }
}

/// A validated argument value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    Text(String),
    Integer(u64),
    Seasons(SeasonSelection),
}

/// Arguments that passed [`ToolDescriptor::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatedArgs {
    values: BTreeMap<String, ArgValue>,
}

impl ValidatedArgs {
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(ArgValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn integer(&self, name: &str) -> Option<u64> {
        match self.values.get(name) {
            Some(ArgValue::Integer(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn seasons(&self, name: &str) -> Option<&SeasonSelection> {
        match self.values.get(name) {
            Some(ArgValue::Seasons(s)) => Some(s),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
