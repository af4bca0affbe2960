//! gcpcost library
//!
//! Estimates the monthly cost of Compute Engine instance types from the Cloud
//! Billing catalog: parse the instance type, resolve per-vCPU and per-GB unit
//! prices for its family and region through a two-tier file cache, and
//! multiply out.

pub mod batch;
pub mod billing;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod estimate;
pub mod exit_codes;
pub mod machine_specs;
pub mod parser;
pub mod pricing;
pub mod report;
pub mod utils;

pub use error::{CostError, Result};
pub use estimate::{CostEstimate, CostEstimator};
pub use parser::{InstanceParser, InstanceSpec};
pub use pricing::{PriceResolver, UnitPrices};
