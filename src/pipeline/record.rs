use super::token::{AssignKey, Token};
use crate::error::{StepchainError, StepchainResult};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Field layout of a dynamically shaped record token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenShape {
    fields: Vec<String>,
    halted_field: String,
    assigns_field: String,
}

impl TokenShape {
    /// Derive a shape from the record's declared fields.
    ///
    /// Fails with [`StepchainError::MissingField`] when the halted or assigns
    /// field is not among `declared_fields`.
    pub fn derive<I, S>(declared_fields: I, halted_field: &str, assigns_field: &str) -> StepchainResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = declared_fields.into_iter().map(Into::into).collect();

        for required in [halted_field, assigns_field] {
            if !fields.iter().any(|f| f == required) {
                return Err(StepchainError::MissingField {
                    field: required.to_string(),
                });
            }
        }

        Ok(Self {
            fields,
            halted_field: halted_field.to_string(),
            assigns_field: assigns_field.to_string(),
        })
    }

    /// Shape using the conventional `halted` and `assigns` names
    pub fn conventional<I, S>(declared_fields: I) -> StepchainResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::derive(declared_fields, "halted", "assigns")
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn halted_field(&self) -> &str {
        &self.halted_field
    }

    pub fn assigns_field(&self) -> &str {
        &self.assigns_field
    }
}

/// A token backed by a JSON object laid out according to a [`TokenShape`]
///
/// Unlike struct tokens, a record can be malformed: [`RecordToken::raw`]
/// wraps any value, and the pipeline reports such a value as a contract
/// violation by the step that returned it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordToken {
    shape: Arc<TokenShape>,
    value: Value,
}

impl RecordToken {
    /// New record with every declared field present, not halted and no assigns
    pub fn new(shape: Arc<TokenShape>) -> Self {
        let mut object = Map::new();
        for field in shape.fields() {
            object.insert(field.clone(), Value::Null);
        }
        object.insert(shape.halted_field().to_string(), Value::Bool(false));
        object.insert(shape.assigns_field().to_string(), Value::Object(Map::new()));

        Self {
            shape,
            value: Value::Object(object),
        }
    }

    /// Wrap an existing record, verifying it against the shape
    pub fn from_value(shape: Arc<TokenShape>, value: Value) -> StepchainResult<Self> {
        let token = Self::raw(shape, value);
        if let Value::Object(object) = &token.value {
            for field in token.shape.fields() {
                if !object.contains_key(field) {
                    return Err(StepchainError::MissingField {
                        field: field.clone(),
                    });
                }
            }
        }
        token
            .check_contract()
            .map_err(|detail| StepchainError::contract_violation("RecordToken::from_value", detail))?;
        Ok(token)
    }

    /// Wrap any value without validation
    pub fn raw(shape: Arc<TokenShape>, value: Value) -> Self {
        Self { shape, value }
    }

    pub fn shape(&self) -> &Arc<TokenShape> {
        &self.shape
    }

    /// Read a non-token field of the record
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.value.get(name)
    }

    /// Replace a non-token field of the record
    pub fn set_field(mut self, name: &str, field_value: Value) -> Self {
        if let Value::Object(object) = &mut self.value {
            object.insert(name.to_string(), field_value);
        }
        self
    }

    pub fn as_value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    fn assigns_mut(&mut self) -> Option<&mut Map<String, Value>> {
        self.value
            .get_mut(self.shape.assigns_field.as_str())
            .and_then(Value::as_object_mut)
    }
}

impl Token for RecordToken {
    fn is_halted(&self) -> bool {
        self.value
            .get(self.shape.halted_field())
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    fn halt(mut self) -> Self {
        if let Value::Object(object) = &mut self.value {
            object.insert(self.shape.halted_field.clone(), Value::Bool(true));
        }
        self
    }

    fn assign(mut self, key: &str, value: Value) -> StepchainResult<Self> {
        let key = AssignKey::parse(key)?;
        let assigns_field = self.shape.assigns_field.clone();
        let Some(assigns) = self.assigns_mut() else {
            return Err(StepchainError::MissingField {
                field: assigns_field,
            });
        };
        assigns.insert(key.into(), value);
        Ok(self)
    }

    fn assigned(&self, key: &str) -> Option<&Value> {
        self.value
            .get(self.shape.assigns_field())
            .and_then(|assigns| assigns.get(key))
    }

    fn check_contract(&self) -> Result<(), String> {
        let object = self
            .value
            .as_object()
            .ok_or_else(|| format!("expected a record, got {}", self.value))?;

        match object.get(self.shape.halted_field()) {
            Some(Value::Bool(_)) => {}
            Some(other) => {
                return Err(format!(
                    "field '{}' must be a boolean, got {}",
                    self.shape.halted_field(),
                    other
                ))
            }
            None => return Err(format!("missing field '{}' in {}", self.shape.halted_field(), self.value)),
        }

        match object.get(self.shape.assigns_field()) {
            Some(Value::Object(_)) => Ok(()),
            Some(other) => Err(format!(
                "field '{}' must be a mapping, got {}",
                self.shape.assigns_field(),
                other
            )),
            None => Err(format!("missing field '{}' in {}", self.shape.assigns_field(), self.value)),
        }
    }
}
