//! Cost calculation
//!
//! Ties the parser and the price resolver together:
//! `hourly = cpu_price * vcpus + ram_price * ram_gb`, `monthly = hourly * 730`.

use crate::error::Result;
use crate::parser::{InstanceParser, InstanceSpec};
use crate::pricing::{PriceResolver, UnitPrices};
use serde::Serialize;
use tracing::{debug, warn};

/// Billing hours in a month
pub const HOURS_PER_MONTH: f64 = 730.0;

/// Cost of one instance type in one region
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostEstimate {
    pub instance_type: String,
    pub region: String,
    pub spec: InstanceSpec,
    pub prices: UnitPrices,
    pub hourly: f64,
    pub monthly: f64,
}

impl CostEstimate {
    pub fn compute(
        instance_type: &str,
        region: &str,
        spec: InstanceSpec,
        prices: UnitPrices,
    ) -> Self {
        let hourly = prices.cpu_price * spec.vcpus as f64 + prices.ram_price * spec.ram_gb;
        Self {
            instance_type: instance_type.to_string(),
            region: region.to_string(),
            spec,
            prices,
            hourly,
            monthly: hourly * HOURS_PER_MONTH,
        }
    }
}

pub struct CostEstimator {
    parser: InstanceParser,
    resolver: PriceResolver,
    default_region: String,
}

impl CostEstimator {
    pub fn new(parser: InstanceParser, resolver: PriceResolver, default_region: &str) -> Self {
        Self {
            parser,
            resolver,
            default_region: default_region.to_string(),
        }
    }

    pub fn default_region(&self) -> &str {
        &self.default_region
    }

    /// Estimate the cost of `instance_type` in `region` (or the default region).
    ///
    /// `Ok(None)` when the instance type does not parse or no unit prices were
    /// found; both cases have already been logged. Billing API failures are
    /// returned as errors.
    pub async fn calculate_cost(
        &self,
        instance_type: &str,
        region: Option<&str>,
    ) -> Result<Option<CostEstimate>> {
        let region = region.unwrap_or(&self.default_region);

        let Some(spec) = self.parser.parse(instance_type) else {
            return Ok(None);
        };
        debug!(
            "{}: {} vCPUs, {} GB RAM ({})",
            instance_type, spec.vcpus, spec.ram_gb, spec.family
        );

        let prices = self.resolver.get_pricing(&spec, region).await?;
        if prices.is_empty() {
            warn!(
                "Could not find pricing SKUs for family '{}' in region '{}'.",
                spec.family, region
            );
            return Ok(None);
        }

        Ok(Some(CostEstimate::compute(instance_type, region, spec, prices)))
    }
}
