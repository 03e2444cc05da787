use super::token::{AssignKey, Assigns, Token};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// General-purpose token for pipelines that have no payload of their own
///
/// Steps communicate through `assigns`; `metadata` is a private string map
/// for hosts (request ids, tenant names) that steps may read.
///
/// # Example
/// ```
/// use stepchain::{Context, Token};
///
/// let context = Context::new().assign("status", "processing".into()).unwrap();
/// assert_eq!(context.get_str("status"), Some("processing"));
/// assert!(!context.is_halted());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Context {
    /// Identifier of this token, for correlating log records
    id: String,

    /// Whether the current run must stop
    halted: bool,

    /// Shared step data
    assigns: Assigns,

    /// Host-provided metadata
    metadata: HashMap<String, String>,
}

crate::impl_token!(Context);

impl Context {
    /// Create a context with a fresh random id
    pub fn new() -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string())
    }

    /// Create a context with a caller-chosen id
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            halted: false,
            assigns: Assigns::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// All assigns
    pub fn assigns(&self) -> &Assigns {
        &self.assigns
    }

    /// Check if a key has been assigned
    pub fn has(&self, key: &str) -> bool {
        self.assigns.contains_key(key)
    }

    /// Get a string assign
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.assigned(key).and_then(Value::as_str)
    }

    /// Get a boolean assign
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.assigned(key).and_then(Value::as_bool)
    }

    /// Get a number assign
    pub fn get_number(&self, key: &str) -> Option<f64> {
        self.assigned(key).and_then(Value::as_f64)
    }

    /// Remove an assign, returning the token and the removed value
    pub fn unassign(mut self, key: &str) -> (Self, Option<Value>) {
        let removed = self.assigns.remove(key);
        (self, removed)
    }

    /// Assign several values at once; fails on the first invalid key
    pub fn merge_assigns<I, K>(mut self, values: I) -> crate::StepchainResult<Self>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        for (key, value) in values {
            self.assigns.insert(AssignKey::parse(key.as_ref())?, value);
        }
        Ok(self)
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn get_metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(|s| s.as_str())
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StepchainError;
    use serde_json::json;

    #[test]
    fn test_context_creation() {
        let context = Context::with_id("session-123");
        assert_eq!(context.id(), "session-123");
        assert!(context.assigns().is_empty());
        assert!(!context.is_halted());
    }

    #[test]
    fn test_random_ids_differ() {
        assert_ne!(Context::new().id(), Context::new().id());
    }

    #[test]
    fn test_typed_getters() {
        let context = Context::new()
            .assign("name", json!("value1"))
            .unwrap()
            .assign("encrypted", json!(true))
            .unwrap()
            .assign("duration", json!(60.5))
            .unwrap();

        assert!(context.has("name"));
        assert_eq!(context.get_str("name"), Some("value1"));
        assert_eq!(context.get_bool("encrypted"), Some(true));
        assert_eq!(context.get_number("duration"), Some(60.5));
    }

    #[test]
    fn test_wrong_type() {
        let context = Context::new().assign("key1", json!("value1")).unwrap();
        assert_eq!(context.get_bool("key1"), None);
        assert_eq!(context.get_str("missing"), None);
    }

    #[test]
    fn test_unassign() {
        let context = Context::new().assign("key1", json!(1)).unwrap();
        let (context, removed) = context.unassign("key1");
        assert_eq!(removed, Some(json!(1)));
        assert!(!context.has("key1"));
    }

    #[test]
    fn test_merge_assigns() {
        let context = Context::new()
            .merge_assigns(vec![("a", json!(1)), ("b", json!(2))])
            .unwrap();
        assert_eq!(context.assigns().len(), 2);

        let result = Context::new().merge_assigns(vec![("ok", json!(1)), ("not ok", json!(2))]);
        assert!(matches!(result, Err(StepchainError::InvalidKey { .. })));
    }

    #[test]
    fn test_metadata_survives_halt() {
        let context = Context::with_id("s")
            .with_metadata("tenant", "acme")
            .halt();
        assert!(context.is_halted());
        assert_eq!(context.get_metadata("tenant"), Some("acme"));
        assert_eq!(context.metadata().len(), 1);
    }

    #[test]
    fn test_serde_roundtrip_keeps_halted() {
        let context = Context::with_id("s").assign("k", json!([1, 2])).unwrap().halt();
        let value = serde_json::to_value(&context).unwrap();
        assert_eq!(value["halted"], json!(true));
        assert_eq!(value["assigns"]["k"], json!([1, 2]));
    }
}
