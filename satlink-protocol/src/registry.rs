//! Extension handler registry
//!
//! Handlers are looked up by H-Type within their partition (mandatory or
//! optional). A separate ordered list names the handlers applied, in order,
//! when building outbound SNDUs.

use crate::config::ExtensionSpec;
use crate::extension::{extension_by_name, UleExtension, MANDATORY_HLEN, MAX_OPTIONAL_HLEN};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Registry errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Extension 0x{ext_type:02x} already registered as {}", partition_name(.mandatory))]
    Duplicate { ext_type: u8, mandatory: bool },

    #[error("Unknown extension: {0}")]
    UnknownExtension(String),
}

fn partition_name(mandatory: &bool) -> &'static str {
    if *mandatory {
        "mandatory"
    } else {
        "optional"
    }
}

/// Registered extension handlers
#[derive(Debug, Default, Clone)]
pub struct ExtensionRegistry {
    /// Mandatory extensions by H-Type
    mandatory: HashMap<u8, Arc<dyn UleExtension>>,
    /// Optional extensions by H-Type
    optional: HashMap<u8, Arc<dyn UleExtension>>,
    /// Handlers applied when building, in order
    build_order: Vec<Arc<dyn UleExtension>>,
}

impl ExtensionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in extension registered and none active
    pub fn with_defaults() -> Self {
        Self::from_config(&ExtensionSpec::defaults()).unwrap_or_default()
    }

    /// Build a registry from configuration entries
    pub fn from_config(specs: &[ExtensionSpec]) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for spec in specs {
            let handler = extension_by_name(&spec.name)
                .ok_or_else(|| RegistryError::UnknownExtension(spec.name.clone()))?;
            registry.add_extension(handler, spec.activate)?;
        }
        tracing::info!(
            mandatory = registry.mandatory.len(),
            optional = registry.optional.len(),
            active = registry.build_order.len(),
            "ULE extension registry ready"
        );
        Ok(registry)
    }

    /// Register a handler, optionally activating it for outbound building
    ///
    /// A second handler with the same H-Type in the same partition is
    /// rejected and the registry is left untouched.
    pub fn add_extension(
        &mut self,
        handler: Arc<dyn UleExtension>,
        activate: bool,
    ) -> Result<(), RegistryError> {
        let ext_type = handler.ext_type();
        let mandatory = handler.is_mandatory();
        let partition = if mandatory {
            &mut self.mandatory
        } else {
            &mut self.optional
        };

        if partition.contains_key(&ext_type) {
            return Err(RegistryError::Duplicate {
                ext_type,
                mandatory,
            });
        }
        partition.insert(ext_type, Arc::clone(&handler));

        tracing::debug!(
            name = handler.name(),
            ext_type,
            mandatory,
            activate,
            "registered ULE extension"
        );
        if activate {
            self.build_order.push(handler);
        }
        Ok(())
    }

    /// Mandatory handler for an H-Type
    pub fn mandatory(&self, ext_type: u8) -> Option<&Arc<dyn UleExtension>> {
        self.mandatory.get(&ext_type)
    }

    /// Optional handler for an H-Type
    pub fn optional(&self, ext_type: u8) -> Option<&Arc<dyn UleExtension>> {
        self.optional.get(&ext_type)
    }

    /// Handler selected by H-LEN and H-Type
    ///
    /// H-LEN 0 searches mandatory handlers, 1 to 5 optional ones; reserved
    /// H-LEN values never match.
    pub fn lookup(&self, hlen: u8, ext_type: u8) -> Option<&Arc<dyn UleExtension>> {
        match hlen {
            MANDATORY_HLEN => self.mandatory(ext_type),
            1..=MAX_OPTIONAL_HLEN => self.optional(ext_type),
            _ => None,
        }
    }

    /// Handlers applied when building, in order
    pub fn build_order(&self) -> &[Arc<dyn UleExtension>] {
        &self.build_order
    }

    /// Number of registered handlers
    pub fn len(&self) -> usize {
        self.mandatory.len() + self.optional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
