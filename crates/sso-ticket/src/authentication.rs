//! Authentication payload carried on ticket-granting tickets.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The resolved identity bound to a ticket-granting or proxy-granting
/// ticket.
///
/// Produced by the authentication-handler chain upstream of the registry;
/// the registry treats it as an opaque payload and never inspects the
/// attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Authentication {
    /// Resolved principal identifier.
    pub principal: String,
    /// Released principal attributes.
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
    /// Whether the originating login requested a long-lived session.
    #[serde(default)]
    pub remember_me: bool,
}

impl Authentication {
    /// Creates an authentication for the given principal.
    #[must_use]
    pub fn new(principal: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            attributes: HashMap::new(),
            remember_me: false,
        }
    }

    /// Sets the remember-me flag.
    #[must_use]
    pub const fn with_remember_me(mut self, remember_me: bool) -> Self {
        self.remember_me = remember_me;
        self
    }

    /// Adds a principal attribute.
    #[must_use]
    pub fn with_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Gets a principal attribute.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&serde_json::Value> {
        self.attributes.get(key)
    }
}
