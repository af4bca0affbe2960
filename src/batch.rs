//! Instance list input
//!
//! A list file holds one instance type per line. Surrounding whitespace is
//! stripped; blank lines and lines starting with `#` are skipped.

use crate::error::{CostError, Result};
use std::path::Path;

pub fn parse_instance_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

pub fn read_instance_list(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Err(CostError::Validation {
            field: "file".to_string(),
            reason: format!("File '{}' not found.", path.display()),
        });
    }
    let content = std::fs::read_to_string(path)?;
    Ok(parse_instance_list(&content))
}

/// Instances to process: file entries first, then the positional one.
pub fn collect_instances(instance_type: Option<&str>, file: Option<&Path>) -> Result<Vec<String>> {
    let mut instances = match file {
        Some(path) => read_instance_list(path)?,
        None => Vec::new(),
    };
    if let Some(instance) = instance_type {
        instances.push(instance.to_string());
    }
    Ok(instances)
}
