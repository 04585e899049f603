//! Public size and template catalogs.
//!
//! Both catalogs are served by unauthenticated endpoints and change rarely,
//! so each is fetched at most once per process. A refresh replaces the whole
//! list.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::api::{ApiError, ApiFuture};
use crate::wire;

/// Endpoint listing purchasable server sizes.
pub const SIZES_ENDPOINT: &str = "/api/servers/getServerSizes";

/// Endpoint listing deployable software templates.
pub const TEMPLATES_ENDPOINT: &str = "/api/servers/getTemplates";

const TEMPLATE_ALIASES: &[(&str, &str)] = &[
    ("cicd", "CI-CD-Target"),
    ("ci-cd", "CI-CD-Target"),
    ("postgres", "PostgreSQL"),
    ("pg", "PostgreSQL"),
    ("mysql", "MySQL"),
    ("mariadb", "MariaDB"),
    ("mongo", "MongoDB"),
    ("mongodb", "MongoDB"),
    ("elastic", "Elasticsearch"),
    ("elasticsearch", "Elasticsearch"),
    ("wp", "Wordpress"),
    ("wordpress", "Wordpress"),
    ("k8s", "K3S"),
    ("kubernetes", "K3S"),
];

/// One purchasable size in one provider region.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct SizeEntry {
    /// Size title, for example `MEDIUM-2C-4G`.
    #[serde(default, deserialize_with = "wire::string")]
    pub title: String,
    /// Hosting provider.
    #[serde(rename = "providerName", default, deserialize_with = "wire::string")]
    pub provider: String,
    /// Region (datacenter) identifier.
    #[serde(rename = "regionID", default, deserialize_with = "wire::string")]
    pub region: String,
    /// Virtual CPU count.
    #[serde(rename = "vCPU", default, deserialize_with = "wire::opt_u32")]
    pub cpu: Option<u32>,
    /// Memory in gigabytes.
    #[serde(rename = "ramGB", default, deserialize_with = "wire::opt_f64")]
    pub ram_gb: Option<f64>,
    /// City hosting the region.
    #[serde(rename = "City", default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    /// Country hosting the region.
    #[serde(rename = "Country", default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    /// ISO country code.
    #[serde(rename = "CountryCode", default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    /// Disk size in gigabytes.
    #[serde(rename = "storageSizeGB", default, deserialize_with = "wire::opt_u32")]
    pub storage_gb: Option<u32>,
    /// Disk technology.
    #[serde(rename = "storageType", default, skip_serializing_if = "Option::is_none")]
    pub storage_type: Option<String>,
    /// Hourly price in USD.
    #[serde(rename = "pricePerHour", default, deserialize_with = "wire::opt_f64")]
    pub price_per_hour: Option<f64>,
}

impl SizeEntry {
    /// Returns `true` when the entry belongs to `provider` (case-insensitive).
    #[must_use]
    pub fn is_offered_by(&self, provider: &str) -> bool {
        self.provider.eq_ignore_ascii_case(provider)
    }

    /// Returns `true` when the entry is located in `country`, matched as a
    /// substring of the country name or as an exact country code.
    #[must_use]
    pub fn is_located_in(&self, country: &str) -> bool {
        let needle = country.to_lowercase();
        self.country
            .as_deref()
            .is_some_and(|name| name.to_lowercase().contains(&needle))
            || self
                .country_code
                .as_deref()
                .is_some_and(|code| code.eq_ignore_ascii_case(country))
    }
}

/// A deployable software template.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Template {
    /// Template identifier.
    #[serde(default, deserialize_with = "wire::string")]
    pub id: String,
    /// Display title, for example `PostgreSQL`.
    #[serde(default, deserialize_with = "wire::string")]
    pub title: String,
    /// Catalog category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Short description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Default software version.
    #[serde(
        default,
        deserialize_with = "wire::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub version: Option<String>,
    /// Docker tag deployed when no version is requested.
    #[serde(
        default,
        deserialize_with = "wire::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub dockerhub_default_tag: Option<String>,
}

impl Template {
    /// Returns `true` for the CI/CD target template.
    #[must_use]
    pub fn is_cicd(&self) -> bool {
        self.title.to_lowercase().contains("ci-cd")
    }
}

/// Source of the size catalog.
pub trait SizeCatalog: Send + Sync {
    /// Returns every known size, fetching the catalog on first use.
    fn sizes(&self) -> ApiFuture<'_, Arc<Vec<SizeEntry>>>;
}

/// Source of the template catalog.
pub trait TemplateCatalog: Send + Sync {
    /// Returns every known template, fetching the catalog on first use.
    fn templates(&self) -> ApiFuture<'_, Arc<Vec<Template>>>;
}

/// Process-lifetime cache for one catalog.
#[derive(Debug)]
pub struct CatalogCache<T> {
    entries: Mutex<Option<Arc<Vec<T>>>>,
}

impl<T> Default for CatalogCache<T> {
    fn default() -> Self {
        Self {
            entries: Mutex::const_new(None),
        }
    }
}

impl<T> CatalogCache<T> {
    /// Returns the cached catalog or populates it with `fetch`.
    ///
    /// Concurrent callers wait for the first fetch instead of issuing their
    /// own.
    ///
    /// # Errors
    ///
    /// Propagates the error from `fetch`; nothing is cached in that case.
    pub async fn get_or_fetch<F, Fut>(&self, fetch: F) -> Result<Arc<Vec<T>>, ApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<T>, ApiError>>,
    {
        let mut entries = self.entries.lock().await;
        if let Some(cached) = entries.as_ref() {
            return Ok(Arc::clone(cached));
        }
        let fetched = Arc::new(fetch().await?);
        *entries = Some(Arc::clone(&fetched));
        Ok(fetched)
    }

    /// Replaces the cached catalog wholesale.
    pub async fn replace(&self, fresh: Vec<T>) -> Arc<Vec<T>> {
        let fresh_entries = Arc::new(fresh);
        *self.entries.lock().await = Some(Arc::clone(&fresh_entries));
        fresh_entries
    }
}

/// Decodes the `instances` array of a catalog response.
///
/// # Errors
///
/// Returns [`ApiError::Decode`] when an entry does not have the expected
/// shape. A missing `instances` field decodes as an empty catalog.
pub fn decode_instances<T>(endpoint: &str, body: &Value) -> Result<Vec<T>, ApiError>
where
    T: for<'de> Deserialize<'de>,
{
    let Some(instances) = body.get("instances") else {
        debug!(endpoint, "catalog response carries no instances");
        return Ok(Vec::new());
    };
    serde_json::from_value(instances.clone()).map_err(|err| ApiError::Decode {
        endpoint: endpoint.to_owned(),
        message: err.to_string(),
    })
}

/// Filters `sizes` by provider and country; `None` disables a filter.
#[must_use]
pub fn filter_sizes<'a>(
    sizes: &'a [SizeEntry],
    provider: Option<&str>,
    country: Option<&str>,
) -> Vec<&'a SizeEntry> {
    sizes
        .iter()
        .filter(|size| provider.is_none_or(|name| size.is_offered_by(name)))
        .filter(|size| country.is_none_or(|name| size.is_located_in(name)))
        .collect()
}

/// Resolves a template by id, alias, exact title, then title substring.
#[must_use]
pub fn find_template<'a>(templates: &'a [Template], name_or_id: &str) -> Option<&'a Template> {
    let wanted = name_or_id.trim();
    if wanted.is_empty() {
        return None;
    }
    let lowered = wanted.to_lowercase();

    if let Some(by_id) = templates.iter().find(|template| template.id == wanted) {
        return Some(by_id);
    }
    let alias = TEMPLATE_ALIASES
        .iter()
        .find(|(alias, _)| *alias == lowered)
        .map(|(_, title)| *title);
    if let Some(by_alias) = alias.and_then(|title| {
        templates
            .iter()
            .find(|template| template.title.eq_ignore_ascii_case(title))
    }) {
        return Some(by_alias);
    }
    if let Some(by_title) = templates
        .iter()
        .find(|template| template.title.to_lowercase() == lowered)
    {
        return Some(by_title);
    }
    templates
        .iter()
        .find(|template| template.title.to_lowercase().contains(&lowered))
}

/// Filters templates whose title or description contains `query` and whose
/// category contains `category`.
#[must_use]
pub fn search_templates<'a>(
    templates: &'a [Template],
    query: Option<&str>,
    category: Option<&str>,
) -> Vec<&'a Template> {
    let query_needle = query.map(str::to_lowercase);
    let category_needle = category.map(str::to_lowercase);
    templates
        .iter()
        .filter(|template| {
            query_needle.as_deref().is_none_or(|needle| {
                template.title.to_lowercase().contains(needle)
                    || template
                        .description
                        .as_deref()
                        .is_some_and(|text| text.to_lowercase().contains(needle))
            })
        })
        .filter(|template| {
            category_needle.as_deref().is_none_or(|needle| {
                template
                    .category
                    .as_deref()
                    .is_some_and(|text| text.to_lowercase().contains(needle))
            })
        })
        .collect()
}
