//! Instance type parsing
//!
//! Turns an identifier such as `n4-highmem-32` into an `InstanceSpec`
//! (family, vCPUs, RAM, catalog search terms) using the machine spec table.

use crate::error::InstanceParseError;
use crate::machine_specs::MachineSpecTable;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// Resolved specification of an instance type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceSpec {
    pub family: String,
    pub vcpus: u32,
    pub ram_gb: f64,
    pub search_cpu: String,
    pub search_ram: String,
}

/// Parser bound to one machine spec table
#[derive(Debug, Clone)]
pub struct InstanceParser {
    specs: Arc<MachineSpecTable>,
}

impl InstanceParser {
    pub fn new(specs: Arc<MachineSpecTable>) -> Self {
        Self { specs }
    }

    pub fn specs(&self) -> &MachineSpecTable {
        &self.specs
    }

    /// Parse `instance_type`, reporting why it failed.
    ///
    /// Matching is case-insensitive. Tokens past the vCPU count are ignored.
    pub fn try_parse(&self, instance_type: &str) -> Result<InstanceSpec, InstanceParseError> {
        let lowered = instance_type.trim().to_lowercase();
        let parts: Vec<&str> = lowered.split('-').collect();
        if parts.len() < 3 {
            return Err(InstanceParseError::Malformed(instance_type.to_string()));
        }

        let (family, shape, count) = (parts[0], parts[1], parts[2]);
        let vcpus = match count.parse::<u32>() {
            Ok(n) if n > 0 => n,
            _ => {
                return Err(InstanceParseError::InvalidVcpus {
                    instance_type: instance_type.to_string(),
                    count: count.to_string(),
                })
            }
        };

        let spec = self
            .specs
            .family(family)
            .ok_or_else(|| InstanceParseError::UnknownFamily(family.to_string()))?;

        let ratio = spec
            .ratio(shape)
            .ok_or_else(|| InstanceParseError::UnknownShape {
                family: family.to_string(),
                shape: shape.to_string(),
            })?;

        Ok(InstanceSpec {
            family: family.to_string(),
            vcpus,
            ram_gb: vcpus as f64 * ratio,
            search_cpu: spec.search_cpu.clone(),
            search_ram: spec.search_ram.clone(),
        })
    }

    /// Parse `instance_type`, logging the diagnostic and returning `None` on failure.
    pub fn parse(&self, instance_type: &str) -> Option<InstanceSpec> {
        match self.try_parse(instance_type) {
            Ok(spec) => Some(spec),
            Err(e) => {
                warn!("{}", e);
                None
            }
        }
    }
}
