//! Unit price resolution
//!
//! Finds the on-demand per-vCPU and per-GB-RAM hourly prices for a machine
//! family in a region by substring matching over the SKU catalog.
//!
//! Matching rules, applied to each SKU in catalog order:
//!
//! 1. The SKU must list the target region.
//! 2. Descriptions naming a non-standard tier (spot, commitment, ...) are
//!    skipped before anything else is checked.
//! 3. Descriptions containing `<family>d` or `<family>a` are skipped so that
//!    `n2` never picks up `n2d`/`n2a` SKUs.
//! 4. The first description containing the family's CPU search term sets the
//!    CPU price, the first containing the RAM term sets the RAM price.
//!
//! Resolved pairs are cached per `<family>_<region>` for a day, but only when
//! both prices were found. A partial or failed lookup is retried next time.

use crate::cache::{Cacheable, KeyedFile, TtlCache, CACHE_TTL};
use crate::catalog::{CatalogCache, SimplifiedSku};
use crate::error::Result;
use crate::parser::InstanceSpec;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

pub const PRICE_CACHE_FILE: &str = "pricing_cache.json";

/// Substrings marking SKUs that must never satisfy an on-demand lookup
const EXCLUDED_TERMS: [&str; 5] = ["spot", "preemptible", "sole tenancy", "premium", "commitment"];

/// Suffixes of sibling families sharing a family's prefix
const SIBLING_SUFFIXES: [char; 2] = ['d', 'a'];

/// Hourly price per vCPU and per GB of RAM; `0.0` means not found
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitPrices {
    #[serde(default)]
    pub cpu_price: f64,
    #[serde(default)]
    pub ram_price: f64,
}

impl UnitPrices {
    pub fn new(cpu_price: f64, ram_price: f64) -> Self {
        Self {
            cpu_price,
            ram_price,
        }
    }

    /// Both prices found
    pub fn is_complete(&self) -> bool {
        self.cpu_price > 0.0 && self.ram_price > 0.0
    }

    /// Neither price found
    pub fn is_empty(&self) -> bool {
        self.cpu_price == 0.0 && self.ram_price == 0.0
    }
}

impl Cacheable for UnitPrices {
    fn is_cacheable(&self) -> bool {
        self.is_complete()
    }
}

pub fn price_cache_key(family: &str, region: &str) -> String {
    format!("{}_{}", family, region)
}

fn is_excluded(description: &str) -> bool {
    EXCLUDED_TERMS.iter().any(|term| description.contains(term))
}

fn sibling_guards(family: &str) -> [String; 2] {
    SIBLING_SUFFIXES.map(|suffix| format!("{}{}", family, suffix))
}

/// Scan `skus` for the CPU and RAM prices of `spec` in `region`.
pub fn match_unit_prices(skus: &[SimplifiedSku], spec: &InstanceSpec, region: &str) -> UnitPrices {
    let guards = sibling_guards(&spec.family);
    let mut prices = UnitPrices::default();
    let mut found_cpu = false;
    let mut found_ram = false;

    for sku in skus {
        if found_cpu && found_ram {
            break;
        }
        if !sku.serves(region) {
            continue;
        }

        let description = sku.description.to_lowercase();
        if is_excluded(&description) {
            continue;
        }
        if guards.iter().any(|guard| description.contains(guard.as_str())) {
            continue;
        }

        if !found_cpu && description.contains(&spec.search_cpu) {
            prices.cpu_price = sku.price();
            found_cpu = true;
            info!("Found CPU SKU: {}", sku.description);
        }
        if !found_ram && description.contains(&spec.search_ram) {
            prices.ram_price = sku.price();
            found_ram = true;
            info!("Found RAM SKU: {}", sku.description);
        }
    }

    prices
}

/// Resolves unit prices through the price cache, then the catalog
pub struct PriceResolver {
    catalog: CatalogCache,
    cache: TtlCache<KeyedFile<UnitPrices>>,
}

impl PriceResolver {
    pub fn new(catalog: CatalogCache, cache_dir: &Path) -> Self {
        Self {
            catalog,
            cache: TtlCache::new(
                "unit prices",
                KeyedFile::new(cache_dir.join(PRICE_CACHE_FILE)),
                CACHE_TTL,
            ),
        }
    }

    /// Cached prices for `family` in `region`, if fresh.
    pub fn cached(&self, family: &str, region: &str) -> Option<UnitPrices> {
        self.cache
            .lookup(&price_cache_key(family, region))
            .into_fresh()
    }

    /// CPU and RAM unit prices for `spec` in `region`.
    ///
    /// Only catalog fetch failures are errors; prices that cannot be found
    /// come back as `0.0`.
    pub async fn get_pricing(&self, spec: &InstanceSpec, region: &str) -> Result<UnitPrices> {
        let key = price_cache_key(&spec.family, region);
        self.cache
            .get_or_populate(&key, || async move {
                let skus = self.catalog.get_catalog().await?;
                debug!(
                    "Searching {} SKUs in {} for '{}'",
                    skus.len(),
                    region,
                    spec.family
                );
                Ok(match_unit_prices(&skus, spec, region))
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::{MockCatalogSource, RawSku};
    use crate::cache::{EntryStore, Stamped};
    use crate::config::COMPUTE_ENGINE_SERVICE_ID;
    use crate::utils::epoch_seconds;
    use std::sync::Arc;
    use tempfile::TempDir;

    const REGION: &str = "europe-west2";

    fn n4_spec() -> InstanceSpec {
        InstanceSpec {
            family: "n4".to_string(),
            vcpus: 32,
            ram_gb: 256.0,
            search_cpu: "n4 instance core".to_string(),
            search_ram: "n4 instance ram".to_string(),
        }
    }

    fn n2_spec() -> InstanceSpec {
        InstanceSpec {
            family: "n2".to_string(),
            vcpus: 4,
            ram_gb: 16.0,
            search_cpu: "n2 instance core".to_string(),
            search_ram: "n2 instance ram".to_string(),
        }
    }

    fn sku(description: &str, regions: &[&str], units: i64, nanos: i64) -> SimplifiedSku {
        SimplifiedSku {
            description: description.to_string(),
            service_regions: regions.iter().map(|r| r.to_string()).collect(),
            units,
            nanos,
        }
    }

    fn london_n4() -> Vec<SimplifiedSku> {
        vec![
            sku("N4 Instance Core running in London", &[REGION], 0, 150_000_000),
            sku("N4 Instance Ram running in London", &[REGION], 0, 50_000_000),
        ]
    }

    fn resolver(mock: MockCatalogSource, dir: &TempDir) -> PriceResolver {
        let catalog = CatalogCache::new(Arc::new(mock), dir.path(), COMPUTE_ENGINE_SERVICE_ID);
        PriceResolver::new(catalog, dir.path())
    }

    #[test]
    fn test_matches_cpu_and_ram() {
        let prices = match_unit_prices(&london_n4(), &n4_spec(), REGION);
        assert_eq!(prices, UnitPrices::new(0.15, 0.05));
    }

    #[test]
    fn test_region_must_match() {
        let prices = match_unit_prices(&london_n4(), &n4_spec(), "us-central1");
        assert!(prices.is_empty());
    }

    #[test]
    fn test_sibling_family_never_matches() {
        let skus = vec![
            sku("N2D AMD Instance Core running in London", &[REGION], 0, 30_000_000),
            sku("N2A Instance Ram running in London n2 instance ram", &[REGION], 0, 4_000_000),
        ];
        // "n2d amd instance core" does not contain "n2 instance core", but the
        // second entry does contain the RAM term and must still be rejected.
        assert!(match_unit_prices(&skus, &n2_spec(), REGION).is_empty());

        let mut with_real = skus.clone();
        with_real.push(sku("N2 Instance Ram running in London", &[REGION], 0, 4_500_000));
        let prices = match_unit_prices(&with_real, &n2_spec(), REGION);
        assert_eq!(prices.ram_price, 0.0045);
        assert_eq!(prices.cpu_price, 0.0);
    }

    #[test]
    fn test_sibling_guard_uses_target_family() {
        let spec = InstanceSpec {
            family: "n2d".to_string(),
            vcpus: 2,
            ram_gb: 8.0,
            search_cpu: "n2d amd instance core".to_string(),
            search_ram: "n2d amd instance ram".to_string(),
        };
        let skus = vec![
            sku("N2D AMD Instance Core running in London", &[REGION], 0, 30_000_000),
            sku("N2D AMD Instance Ram running in London", &[REGION], 0, 4_000_000),
        ];
        assert!(match_unit_prices(&skus, &spec, REGION).is_complete());
    }

    #[test]
    fn test_excluded_tiers_never_match() {
        let skus = vec![
            sku("Spot Preemptible N4 Instance Core running in London", &[REGION], 0, 10_000_000),
            sku("Commitment v1: N4 Instance Core in London for 1 Year", &[REGION], 0, 90_000_000),
            sku("N4 Instance Ram running in London (Sole Tenancy premium)", &[REGION], 0, 1_000_000),
            sku("N4 Instance Core running in London", &[REGION], 0, 150_000_000),
            sku("N4 Instance Ram running in London", &[REGION], 0, 50_000_000),
        ];
        let prices = match_unit_prices(&skus, &n4_spec(), REGION);
        assert_eq!(prices, UnitPrices::new(0.15, 0.05));
    }

    #[test]
    fn test_first_match_wins() {
        let mut skus = london_n4();
        skus.push(sku("N4 Instance Core running in London (duplicate)", &[REGION], 9, 0));
        skus.insert(0, sku("N4 Instance Core running in London", &[REGION], 0, 140_000_000));

        let prices = match_unit_prices(&skus, &n4_spec(), REGION);
        assert_eq!(prices.cpu_price, 0.14);
        assert_eq!(prices.ram_price, 0.05);
    }

    #[test]
    fn test_cacheability_requires_both_prices() {
        assert!(UnitPrices::new(1.0, 0.5).is_cacheable());
        assert!(!UnitPrices::new(1.0, 0.0).is_cacheable());
        assert!(!UnitPrices::new(0.0, 0.5).is_cacheable());
        assert!(UnitPrices::default().is_empty());
    }

    #[tokio::test]
    async fn test_get_pricing_catalog_search_and_cache() {
        let dir = TempDir::new().unwrap();
        let mut mock = MockCatalogSource::new();
        mock.expect_list_skus().times(1).returning(|_| {
            Ok(vec![
                RawSku::priced("N4 Instance Core running in London", &[REGION], 0, 150_000_000),
                RawSku::priced("N4 Instance Ram running in London", &[REGION], 0, 50_000_000),
            ])
        });
        let resolver = resolver(mock, &dir);

        let prices = resolver.get_pricing(&n4_spec(), REGION).await.unwrap();
        assert_eq!(prices, UnitPrices::new(0.15, 0.05));
        assert_eq!(resolver.cached("n4", REGION), Some(prices));
        assert_eq!(resolver.cached("n4", "us-east1"), None);
    }

    #[tokio::test]
    async fn test_get_pricing_cache_hit_skips_catalog() {
        let dir = TempDir::new().unwrap();
        KeyedFile::<UnitPrices>::new(dir.path().join(PRICE_CACHE_FILE))
            .write(
                "n4_europe-west2",
                &Stamped::at(UnitPrices::new(1.5, 0.05), epoch_seconds()),
            )
            .unwrap();

        let mut mock = MockCatalogSource::new();
        mock.expect_list_skus().times(0);

        let prices = resolver(mock, &dir).get_pricing(&n4_spec(), REGION).await.unwrap();
        assert_eq!(prices, UnitPrices::new(1.5, 0.05));
        // No catalog was fetched, so no catalog cache file either
        assert!(!dir.path().join(crate::catalog::CATALOG_CACHE_FILE).exists());
    }

    #[tokio::test]
    async fn test_get_pricing_expired_entry_is_refreshed() {
        let dir = TempDir::new().unwrap();
        KeyedFile::<UnitPrices>::new(dir.path().join(PRICE_CACHE_FILE))
            .write(
                "n4_europe-west2",
                &Stamped::at(UnitPrices::new(9.0, 9.0), 0.0),
            )
            .unwrap();

        let mut mock = MockCatalogSource::new();
        mock.expect_list_skus().times(1).returning(|_| {
            Ok(vec![
                RawSku::priced("N4 Instance Core running in London", &[REGION], 0, 150_000_000),
                RawSku::priced("N4 Instance Ram running in London", &[REGION], 0, 50_000_000),
            ])
        });

        let prices = resolver(mock, &dir).get_pricing(&n4_spec(), REGION).await.unwrap();
        assert_eq!(prices, UnitPrices::new(0.15, 0.05));
    }

    #[tokio::test]
    async fn test_get_pricing_empty_catalog_is_not_cached() {
        let dir = TempDir::new().unwrap();
        // The catalog cache is populated on the first call, so later calls
        // read it from disk rather than the API.
        let mut mock = MockCatalogSource::new();
        mock.expect_list_skus().times(1).returning(|_| Ok(vec![]));
        let resolver = resolver(mock, &dir);

        let first = resolver.get_pricing(&n4_spec(), REGION).await.unwrap();
        assert!(first.is_empty());
        assert!(!dir.path().join(PRICE_CACHE_FILE).exists());
        assert_eq!(resolver.cached("n4", REGION), None);

        let second = resolver.get_pricing(&n4_spec(), REGION).await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_get_pricing_partial_match_is_not_cached() {
        let dir = TempDir::new().unwrap();
        let mut mock = MockCatalogSource::new();
        mock.expect_list_skus().times(1).returning(|_| {
            Ok(vec![RawSku::priced(
                "N4 Instance Core running in London",
                &[REGION],
                0,
                150_000_000,
            )])
        });
        let resolver = resolver(mock, &dir);

        let prices = resolver.get_pricing(&n4_spec(), REGION).await.unwrap();
        assert_eq!(prices, UnitPrices::new(0.15, 0.0));
        assert_eq!(resolver.cached("n4", REGION), None);
    }

    #[tokio::test]
    async fn test_get_pricing_preserves_other_cache_keys() {
        let dir = TempDir::new().unwrap();
        KeyedFile::<UnitPrices>::new(dir.path().join(PRICE_CACHE_FILE))
            .write(
                "m3_us-central1",
                &Stamped::at(UnitPrices::new(0.04, 0.005), epoch_seconds()),
            )
            .unwrap();

        let mut mock = MockCatalogSource::new();
        mock.expect_list_skus().times(1).returning(|_| {
            Ok(vec![
                RawSku::priced("N4 Instance Core running in London", &[REGION], 0, 150_000_000),
                RawSku::priced("N4 Instance Ram running in London", &[REGION], 0, 50_000_000),
            ])
        });
        let resolver = resolver(mock, &dir);
        resolver.get_pricing(&n4_spec(), REGION).await.unwrap();

        assert_eq!(
            resolver.cached("m3", "us-central1"),
            Some(UnitPrices::new(0.04, 0.005))
        );
        assert!(resolver.cached("n4", REGION).is_some());
    }
}
