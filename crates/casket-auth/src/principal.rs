//! Authenticated identities and the factories that build them.
//!
//! An [`AttributePrincipal`] is immutable once constructed. Handlers never build one
//! directly from raw credential material; they go through an
//! [`AttributePrincipalFactory`] so attribute resolution stays pluggable.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A resolved user identity plus its attributes.
///
/// Attribute values are one-or-many; a single value is stored as a one-element list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributePrincipal {
    name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    attributes: BTreeMap<String, Vec<Value>>,
}

impl AttributePrincipal {
    /// Creates a principal with no attributes.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Creates a principal with the given attributes.
    #[must_use]
    pub fn with_attributes(
        name: impl Into<String>,
        attributes: BTreeMap<String, Vec<Value>>,
    ) -> Self {
        Self {
            name: name.into(),
            attributes,
        }
    }

    /// Returns the unique principal name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns all attributes.
    #[must_use]
    pub fn attributes(&self) -> &BTreeMap<String, Vec<Value>> {
        &self.attributes
    }

    /// Returns every value of an attribute.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&[Value]> {
        self.attributes.get(name).map(Vec::as_slice)
    }

    /// Returns the first value of an attribute.
    #[must_use]
    pub fn first_attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name).and_then(|values| values.first())
    }
}

/// Errors raised by attribute resolution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionError {
    /// The directory has no entry for this name.
    #[error("No principal named '{0}'")]
    NotFound(String),

    /// The attribute source could not be queried.
    #[error("Attribute source unavailable: {0}")]
    Unavailable(String),
}

/// Constructs principals compatible with the backing attribute source.
///
/// Implementations must never return a principal with an empty name and must report
/// unknown names as [`ResolutionError::NotFound`] rather than inventing a principal.
#[async_trait]
pub trait AttributePrincipalFactory: Send + Sync {
    /// Builds the principal for `name`, resolving its attributes.
    async fn get_attribute_principal(
        &self,
        name: &str,
    ) -> Result<AttributePrincipal, ResolutionError>;
}

/// Factory producing attribute-less principals.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleAttributePrincipalFactory;

#[async_trait]
impl AttributePrincipalFactory for SimpleAttributePrincipalFactory {
    async fn get_attribute_principal(
        &self,
        name: &str,
    ) -> Result<AttributePrincipal, ResolutionError> {
        if name.is_empty() {
            return Err(ResolutionError::NotFound(String::new()));
        }
        Ok(AttributePrincipal::new(name))
    }
}

/// Factory backed by an in-memory attribute directory.
///
/// In lenient mode (the default) names missing from the directory resolve to a
/// principal without attributes; in strict mode they are `NotFound`.
#[derive(Debug, Clone, Default)]
pub struct StaticAttributePrincipalFactory {
    directory: HashMap<String, BTreeMap<String, Vec<Value>>>,
    strict: bool,
}

impl StaticAttributePrincipalFactory {
    /// Creates a lenient factory over `directory`.
    #[must_use]
    pub fn new(directory: HashMap<String, BTreeMap<String, Vec<Value>>>) -> Self {
        Self {
            directory,
            strict: false,
        }
    }

    /// Sets whether unknown names are rejected.
    #[must_use]
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

#[async_trait]
impl AttributePrincipalFactory for StaticAttributePrincipalFactory {
    async fn get_attribute_principal(
        &self,
        name: &str,
    ) -> Result<AttributePrincipal, ResolutionError> {
        if name.is_empty() {
            return Err(ResolutionError::NotFound(String::new()));
        }
        match self.directory.get(name) {
            Some(attributes) => Ok(AttributePrincipal::with_attributes(
                name,
                attributes.clone(),
            )),
            None if self.strict => Err(ResolutionError::NotFound(name.to_string())),
            None => Ok(AttributePrincipal::new(name)),
        }
    }
}
