//! Machine family specification table
//!
//! Maps a machine family (`n4`, `m3`, ...) to its RAM-per-vCPU ratio for each
//! shape and to the catalog description substrings used to find its CPU and
//! RAM SKUs. The table is built once and handed to the parser explicitly.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

const BUILTIN_SPECS: &str = include_str!("../config/machine_specs.json");

/// Specification of one machine family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilySpec {
    /// Shape name -> GB of RAM per vCPU
    pub ratios: BTreeMap<String, f64>,
    /// Substring of the lower-cased SKU description for the per-vCPU price
    pub search_cpu: String,
    /// Substring of the lower-cased SKU description for the per-GB RAM price
    pub search_ram: String,
}

impl FamilySpec {
    pub fn ratio(&self, shape: &str) -> Option<f64> {
        self.ratios.get(shape).copied()
    }
}

/// Immutable family -> spec table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MachineSpecTable {
    families: BTreeMap<String, FamilySpec>,
}

impl MachineSpecTable {
    /// The table shipped with the binary.
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_SPECS)
    }

    /// Load a replacement table from `path`, or the built-in table when `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigError::NotFound(p.display().to_string()).into());
                }
                let content = std::fs::read_to_string(p)?;
                Self::from_json(&content)
            }
            None => Self::builtin(),
        }
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let table: MachineSpecTable = serde_json::from_str(content)
            .map_err(|e| ConfigError::ParseError(format!("machine specs: {}", e)))?;
        table.validate()?;
        Ok(table)
    }

    pub fn family(&self, name: &str) -> Option<&FamilySpec> {
        self.families.get(name)
    }

    pub fn families(&self) -> impl Iterator<Item = (&str, &FamilySpec)> {
        self.families.iter().map(|(name, spec)| (name.as_str(), spec))
    }

    fn validate(&self) -> Result<()> {
        for (name, spec) in &self.families {
            if spec.search_cpu.is_empty() || spec.search_ram.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("{}.search_cpu/search_ram", name),
                    reason: "search terms must not be empty".to_string(),
                }
                .into());
            }
            for (shape, ratio) in &spec.ratios {
                if !ratio.is_finite() || *ratio <= 0.0 {
                    return Err(ConfigError::InvalidValue {
                        field: format!("{}.ratios.{}", name, shape),
                        reason: format!("ratio must be a positive number, got {}", ratio),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }
}
