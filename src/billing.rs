//! Cloud Billing Catalog API client
//!
//! `CatalogSource` is the seam between the catalog cache and the network.
//! `CloudBillingClient` implements it against the public REST endpoint
//! `GET /v1/services/{service}/skus`, following `nextPageToken` until the
//! listing is exhausted.
//!
//! Failures are not retried. A failed page fails the whole listing.

use crate::config::GcpConfig;
use crate::error::{ConfigError, CostError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use std::time::Duration;
use tracing::{debug, info};

/// Number of SKUs requested per page (the API maximum)
const PAGE_SIZE: u32 = 5000;

/// Source of raw SKU listings for a billing service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn list_skus(&self, service_id: &str) -> Result<Vec<RawSku>>;
}

/// One SKU as returned by the Cloud Billing Catalog API
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSku {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub service_regions: Vec<String>,
    #[serde(default)]
    pub pricing_info: Vec<PricingInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingInfo {
    #[serde(default)]
    pub pricing_expression: PricingExpression,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingExpression {
    #[serde(default)]
    pub tiered_rates: Vec<TierRate>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierRate {
    #[serde(default)]
    pub unit_price: Money,
}

/// `google.type.Money` without the currency code
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct Money {
    /// int64 fields are JSON strings in the REST encoding
    #[serde(default, deserialize_with = "int64")]
    pub units: i64,
    #[serde(default)]
    pub nanos: i64,
}

impl RawSku {
    /// Build a SKU with a single tiered price, as the API would return it.
    ///
    /// Test fixture constructor for `CatalogSource` fakes; SKUs from the API
    /// are always deserialized.
    pub fn priced(description: &str, regions: &[&str], units: i64, nanos: i64) -> Self {
        Self {
            description: description.to_string(),
            service_regions: regions.iter().map(|r| r.to_string()).collect(),
            pricing_info: vec![PricingInfo {
                pricing_expression: PricingExpression {
                    tiered_rates: vec![TierRate {
                        unit_price: Money { units, nanos },
                    }],
                },
            }],
        }
    }
}

fn int64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Int64 {
        Number(i64),
        Text(String),
    }

    match Int64::deserialize(deserializer)? {
        Int64::Number(n) => Ok(n),
        Int64::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListSkusResponse {
    #[serde(default)]
    skus: Vec<RawSku>,
    #[serde(default)]
    next_page_token: String,
}

/// How requests to the billing API are authorized
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// API key sent as the `key` query parameter
    ApiKey(String),
    /// OAuth2 access token sent as a bearer token
    AccessToken(String),
    /// Ask the gcloud CLI for an access token on first use
    Gcloud,
}

impl Credentials {
    pub fn from_config(gcp: &GcpConfig) -> Self {
        if let Some(key) = gcp.api_key.as_ref().filter(|k| !k.is_empty()) {
            Credentials::ApiKey(key.clone())
        } else if let Some(token) = gcp.access_token.as_ref().filter(|t| !t.is_empty()) {
            Credentials::AccessToken(token.clone())
        } else {
            Credentials::Gcloud
        }
    }
}

/// REST client for the Cloud Billing Catalog API
pub struct CloudBillingClient {
    http: reqwest::Client,
    endpoint: String,
    credentials: Credentials,
    quota_project: Option<String>,
}

impl CloudBillingClient {
    pub fn new(gcp: &GcpConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(gcp.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            endpoint: gcp.api_endpoint.trim_end_matches('/').to_string(),
            credentials: Credentials::from_config(gcp),
            quota_project: gcp.project_id.clone().filter(|p| !p.is_empty()),
        })
    }

    async fn bearer_token(&self) -> Result<Option<String>> {
        match &self.credentials {
            Credentials::ApiKey(_) => Ok(None),
            Credentials::AccessToken(token) => Ok(Some(token.clone())),
            Credentials::Gcloud => gcloud_access_token("gcloud").await.map(Some),
        }
    }

    async fn fetch_page(
        &self,
        service_id: &str,
        page_token: Option<&str>,
        bearer: Option<&str>,
    ) -> Result<ListSkusResponse> {
        let url = format!("{}/v1/services/{}/skus", self.endpoint, service_id);

        let mut request = self
            .http
            .get(&url)
            .query(&[("pageSize", PAGE_SIZE.to_string())]);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }
        if let Credentials::ApiKey(key) = &self.credentials {
            request = request.query(&[("key", key.as_str())]);
        }
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        if let Some(project) = &self.quota_project {
            request = request.header("x-goog-user-project", project.as_str());
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(CostError::BillingApi {
                message: format!("listing SKUs for {} returned {}: {}", service_id, status, body),
                status: Some(status.as_u16()),
                source: None,
            });
        }

        Ok(response.json::<ListSkusResponse>().await?)
    }
}

#[async_trait]
impl CatalogSource for CloudBillingClient {
    async fn list_skus(&self, service_id: &str) -> Result<Vec<RawSku>> {
        info!("Fetching complete SKU catalog for service {}", service_id);
        let bearer = self.bearer_token().await?;

        let mut skus = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0u32;
        loop {
            let page = self
                .fetch_page(service_id, page_token.as_deref(), bearer.as_deref())
                .await?;
            pages += 1;
            skus.extend(page.skus);

            if page.next_page_token.is_empty() {
                break;
            }
            page_token = Some(page.next_page_token);
        }

        debug!("Fetched {} SKUs in {} page(s)", skus.len(), pages);
        Ok(skus)
    }
}

/// Obtain an access token from the gcloud CLI's active account.
async fn gcloud_access_token(program: &str) -> Result<String> {
    if which::which(program).is_err() {
        return Err(ConfigError::MissingField(
            "gcp.api_key or gcp.access_token (gcloud not found on PATH)".to_string(),
        )
        .into());
    }

    let output = tokio::process::Command::new(program)
        .args(["auth", "print-access-token"])
        .output()
        .await
        .map_err(|e| CostError::BillingApi {
            message: format!("failed to execute {}", program),
            status: None,
            source: Some(Box::new(e)),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CostError::BillingApi {
            message: format!("gcloud auth print-access-token failed: {}", stderr.trim()),
            status: None,
            source: None,
        });
    }

    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        return Err(CostError::BillingApi {
            message: "gcloud returned an empty access token".to_string(),
            status: None,
            source: None,
        });
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn config_for(server: &mockito::ServerGuard) -> GcpConfig {
        GcpConfig {
            api_endpoint: server.url(),
            api_key: Some("test-key".to_string()),
            ..GcpConfig::default()
        }
    }

    #[test]
    fn test_raw_sku_deserializes_rest_encoding() {
        let json = r#"{
            "name": "services/6F81-5844-456A/skus/0000-0000-0000",
            "description": "N4 Instance Core running in London",
            "serviceRegions": ["europe-west2"],
            "pricingInfo": [{
                "pricingExpression": {
                    "usageUnit": "h",
                    "tieredRates": [{
                        "startUsageAmount": 0,
                        "unitPrice": {"currencyCode": "USD", "units": "1", "nanos": 500000000}
                    }]
                }
            }]
        }"#;

        let sku: RawSku = serde_json::from_str(json).unwrap();
        assert_eq!(
            sku,
            RawSku::priced("N4 Instance Core running in London", &["europe-west2"], 1, 500_000_000)
        );
    }

    #[test]
    fn test_money_accepts_numeric_units_and_missing_fields() {
        let money: Money = serde_json::from_str(r#"{"units": 2}"#).unwrap();
        assert_eq!(money, Money { units: 2, nanos: 0 });

        let money: Money = serde_json::from_str(r#"{"nanos": 7}"#).unwrap();
        assert_eq!(money, Money { units: 0, nanos: 7 });

        assert!(serde_json::from_str::<Money>(r#"{"units": "abc"}"#).is_err());
    }

    #[test]
    fn test_credentials_precedence() {
        let mut gcp = GcpConfig::default();
        assert_eq!(Credentials::from_config(&gcp), Credentials::Gcloud);

        gcp.access_token = Some("tok".to_string());
        assert_eq!(Credentials::from_config(&gcp), Credentials::AccessToken("tok".to_string()));

        gcp.api_key = Some("key".to_string());
        assert_eq!(Credentials::from_config(&gcp), Credentials::ApiKey("key".to_string()));

        gcp.api_key = Some(String::new());
        assert_eq!(Credentials::from_config(&gcp), Credentials::AccessToken("tok".to_string()));
    }

    #[tokio::test]
    async fn test_list_skus_follows_pagination() {
        let mut server = mockito::Server::new_async().await;

        let first = server
            .mock("GET", "/v1/services/6F81-5844-456A/skus")
            .match_query(Matcher::Regex("^pageSize=5000&key=test-key$".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"skus": [{"description": "N4 Instance Core", "serviceRegions": ["europe-west2"],
                    "pricingInfo": [{"pricingExpression": {"tieredRates": [{"unitPrice": {"units": "0", "nanos": 150000000}}]}}]}],
                    "nextPageToken": "page-2"}"#,
            )
            .create_async()
            .await;

        let second = server
            .mock("GET", "/v1/services/6F81-5844-456A/skus")
            .match_query(Matcher::UrlEncoded("pageToken".into(), "page-2".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"skus": [{"description": "Free tier thing", "serviceRegions": []}], "nextPageToken": ""}"#)
            .create_async()
            .await;

        let client = CloudBillingClient::new(&config_for(&server)).unwrap();
        let skus = client.list_skus("6F81-5844-456A").await.unwrap();

        assert_eq!(skus.len(), 2);
        assert_eq!(skus[0].description, "N4 Instance Core");
        let price = skus[0].pricing_info[0].pricing_expression.tiered_rates[0].unit_price;
        assert_eq!(price.nanos, 150_000_000);
        assert!(skus[1].pricing_info.is_empty());

        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_skus_sends_bearer_and_quota_project() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/services/svc/skus")
            .match_query(Matcher::Any)
            .match_header("authorization", "Bearer secret-token")
            .match_header("x-goog-user-project", "my-project")
            .with_status(200)
            .with_body(r#"{"skus": []}"#)
            .create_async()
            .await;

        let gcp = GcpConfig {
            api_endpoint: server.url(),
            access_token: Some("secret-token".to_string()),
            project_id: Some("my-project".to_string()),
            ..GcpConfig::default()
        };
        let client = CloudBillingClient::new(&gcp).unwrap();
        let skus = client.list_skus("svc").await.unwrap();

        assert!(skus.is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_skus_surfaces_http_errors() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/services/6F81-5844-456A/skus")
            .match_query(Matcher::Any)
            .with_status(403)
            .with_body("PERMISSION_DENIED")
            .create_async()
            .await;

        let client = CloudBillingClient::new(&config_for(&server)).unwrap();
        let err = client.list_skus("6F81-5844-456A").await.unwrap_err();

        match err {
            CostError::BillingApi { status, message, .. } => {
                assert_eq!(status, Some(403));
                assert!(message.contains("PERMISSION_DENIED"));
            }
            other => panic!("expected BillingApi error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_gcloud_missing_is_config_error() {
        let err = gcloud_access_token("gcpcost-no-such-gcloud").await.unwrap_err();
        assert!(matches!(err, CostError::Config(ConfigError::MissingField(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_gcloud_token_from_cli() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let script = |name: &str, body: &str| {
            let path = dir.path().join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path.display().to_string()
        };
        let ok = script("gcloud-ok", "echo \"  ya29.token  \"");
        let denied = script("gcloud-denied", "echo 'not logged in' >&2; exit 1");
        let empty = script("gcloud-empty", "exit 0");

        assert_eq!(gcloud_access_token(&ok).await.unwrap(), "ya29.token");

        match gcloud_access_token(&denied).await.unwrap_err() {
            CostError::BillingApi { message, .. } => assert!(message.contains("not logged in")),
            other => panic!("expected BillingApi error, got {:?}", other),
        }
        assert!(matches!(
            gcloud_access_token(&empty).await,
            Err(CostError::BillingApi { .. })
        ));
    }
}
