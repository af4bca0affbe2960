//! SKU catalog cache
//!
//! Flattens the raw billing catalog into `SimplifiedSku`s (description,
//! regions, first tiered unit price) and keeps the result in a day-long
//! snapshot file so repeated lookups do not hit the API.

use crate::billing::{CatalogSource, RawSku};
use crate::cache::{Cacheable, SnapshotFile, TtlCache, CACHE_TTL};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

pub const CATALOG_CACHE_FILE: &str = "sku_cache.json";

/// A priced catalog entry reduced to what the resolver needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimplifiedSku {
    pub description: String,
    pub service_regions: Vec<String>,
    pub units: i64,
    pub nanos: i64,
}

impl SimplifiedSku {
    /// Price per unit-resource-hour
    pub fn price(&self) -> f64 {
        self.units as f64 + self.nanos as f64 / 1e9
    }

    pub fn serves(&self, region: &str) -> bool {
        self.service_regions.iter().any(|r| r == region)
    }
}

/// Why a raw SKU has no usable price
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnpricedSku {
    NoPricingInfo,
    NoTieredRate,
}

impl TryFrom<RawSku> for SimplifiedSku {
    type Error = UnpricedSku;

    fn try_from(sku: RawSku) -> std::result::Result<Self, Self::Error> {
        let info = sku.pricing_info.first().ok_or(UnpricedSku::NoPricingInfo)?;
        let rate = info
            .pricing_expression
            .tiered_rates
            .first()
            .ok_or(UnpricedSku::NoTieredRate)?;
        let price = rate.unit_price;

        Ok(SimplifiedSku {
            description: sku.description,
            service_regions: sku.service_regions,
            units: price.units,
            nanos: price.nanos,
        })
    }
}

/// Keep SKUs with a first tiered price, in catalog order.
pub fn simplify_catalog(raw: Vec<RawSku>) -> Vec<SimplifiedSku> {
    let total = raw.len();
    let mut no_pricing = 0usize;
    let mut no_rate = 0usize;

    let skus: Vec<SimplifiedSku> = raw
        .into_iter()
        .filter_map(|sku| match SimplifiedSku::try_from(sku) {
            Ok(simple) => Some(simple),
            Err(UnpricedSku::NoPricingInfo) => {
                no_pricing += 1;
                None
            }
            Err(UnpricedSku::NoTieredRate) => {
                no_rate += 1;
                None
            }
        })
        .collect();

    debug!(
        "Kept {} of {} SKUs ({} without pricing info, {} without tiered rates)",
        skus.len(),
        total,
        no_pricing,
        no_rate
    );
    skus
}

/// Contents of the catalog cache file besides its timestamp
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    #[serde(default)]
    pub skus: Vec<SimplifiedSku>,
}

impl Cacheable for CatalogSnapshot {}

/// Catalog for one billing service, cached on disk
pub struct CatalogCache {
    source: Arc<dyn CatalogSource>,
    service_id: String,
    cache: TtlCache<SnapshotFile<CatalogSnapshot>>,
}

impl CatalogCache {
    pub fn new(source: Arc<dyn CatalogSource>, cache_dir: &Path, service_id: &str) -> Self {
        Self {
            source,
            service_id: service_id.to_string(),
            cache: TtlCache::new(
                "SKU catalog",
                SnapshotFile::new(cache_dir.join(CATALOG_CACHE_FILE)),
                CACHE_TTL,
            ),
        }
    }

    /// Full simplified catalog, from cache when fresh.
    ///
    /// An API failure is returned as an error. A failure to persist the
    /// fetched catalog is only logged.
    pub async fn get_catalog(&self) -> Result<Vec<SimplifiedSku>> {
        let snapshot = self
            .cache
            .get_or_populate(&(), || async move {
                let raw = self.source.list_skus(&self.service_id).await?;
                let skus = simplify_catalog(raw);
                info!("Fetched {} priced SKUs", skus.len());
                Ok(CatalogSnapshot { skus })
            })
            .await?;
        Ok(snapshot.skus)
    }
}
