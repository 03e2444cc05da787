use crate::error::{StepchainError, StepchainResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;

/// Shared user data carried by a token, keyed by symbolic identifiers
pub type Assigns = HashMap<AssignKey, Value>;

/// A validated symbolic identifier used as an assigns key
///
/// Accepted keys start with an ASCII letter or `_`, continue with ASCII
/// alphanumerics or `_`, and may end with a single `?` or `!`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AssignKey(String);

impl AssignKey {
    pub fn parse(key: &str) -> StepchainResult<Self> {
        let invalid = |reason: &str| StepchainError::InvalidKey {
            key: key.to_string(),
            reason: reason.to_string(),
        };

        let body = key
            .strip_suffix('?')
            .or_else(|| key.strip_suffix('!'))
            .unwrap_or(key);

        let mut chars = body.chars();
        match chars.next() {
            None => return Err(invalid("key must not be empty")),
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
            Some(_) => return Err(invalid("key must start with a letter or underscore")),
        }
        if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(invalid(
                "key may only contain letters, digits and underscores",
            ));
        }

        Ok(Self(key.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for AssignKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssignKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for AssignKey {
    type Error = StepchainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        AssignKey::parse(&value)
    }
}

impl From<AssignKey> for String {
    fn from(key: AssignKey) -> Self {
        key.0
    }
}

/// Capabilities every value threaded through a pipeline must provide
///
/// Operations consume the token and hand back the updated one; steps never
/// mutate state outside of the token they were given.
///
/// # Example
/// ```
/// use stepchain::{impl_token, Assigns, Token};
///
/// #[derive(Debug, Default)]
/// struct Request {
///     path: String,
///     stopped: bool,
///     data: Assigns,
/// }
///
/// impl_token!(Request, halted: stopped, assigns: data);
///
/// let request = Request::default().assign("user", "ada".into()).unwrap();
/// assert_eq!(request.assigned("user"), Some(&"ada".into()));
/// assert!(request.halt().is_halted());
/// ```
pub trait Token: Sized {
    /// Whether the current run must stop after the step that produced this token
    fn is_halted(&self) -> bool;

    /// Returns the token with `halted` set; nothing else changes
    fn halt(self) -> Self;

    /// Returns the token with `assigns[key] = value`
    ///
    /// Fails with [`StepchainError::InvalidKey`] when `key` is not a symbolic
    /// identifier.
    fn assign(self, key: &str, value: Value) -> StepchainResult<Self>;

    /// Read back a previously assigned value
    fn assigned(&self, key: &str) -> Option<&Value>;

    /// Verify the token is well formed
    ///
    /// Statically shaped tokens always are. Dynamically shaped tokens report
    /// what is wrong so the pipeline can name the step that produced them.
    fn check_contract(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Derive [`Token`] for a struct with a `bool` halted field and an [`Assigns`] field.
///
/// Field names default to `halted` and `assigns`. A struct lacking either
/// field is rejected when the implementation is compiled.
#[macro_export]
macro_rules! impl_token {
    ($ty:ty) => {
        $crate::impl_token!($ty, halted: halted, assigns: assigns);
    };
    ($ty:ty, halted: $halted:ident, assigns: $assigns:ident) => {
        impl $crate::Token for $ty {
            fn is_halted(&self) -> bool {
                self.$halted
            }

            fn halt(mut self) -> Self {
                self.$halted = true;
                self
            }

            fn assign(
                mut self,
                key: &str,
                value: $crate::Value,
            ) -> $crate::StepchainResult<Self> {
                let key = $crate::AssignKey::parse(key)?;
                self.$assigns.insert(key, value);
                Ok(self)
            }

            fn assigned(&self, key: &str) -> Option<&$crate::Value> {
                self.$assigns.get(key)
            }
        }
    };
}
