//! Values cached by the once-per-type `configure` hook.
//!
//! A [`ConfigStore`] is the process-wide state for configuration. The
//! caller creates it (empty or from a previous run's JSON), hands it to
//! the environment, and takes it back with
//! [`Environment::into_config`](crate::Environment::into_config) to
//! persist it.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::command::{CommandError, CommandType};

/// Free-form values a node type wants to keep between runs.
pub type ConfigBag = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigStore {
    #[serde(default)]
    bags: BTreeMap<String, ConfigBag>,
    /// Types configured during this process. Not persisted.
    #[serde(skip)]
    configured: BTreeSet<String>,
}

impl ConfigStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    #[must_use]
    pub fn is_configured(&self, name: &str) -> bool {
        self.configured.contains(name)
    }

    #[must_use]
    pub fn bag(&self, name: &str) -> Option<&ConfigBag> {
        self.bags.get(name)
    }

    /// Run `ty.configure` unless `name` was already configured.
    pub fn configure(&mut self, name: &str, ty: &dyn CommandType) -> Result<(), CommandError> {
        if self.configured.contains(name) {
            return Ok(());
        }
        let previous = self.bags.remove(name);
        debug!(node = name, cached = previous.is_some(), "configuring node type");
        if let Some(values) = ty.configure(previous)? {
            self.bags.insert(name.to_string(), values);
        }
        self.configured.insert(name.to_string());
        Ok(())
    }
}
