//! Bugzilla REST client.
//!
//! Authenticates with an API key sent in the `X-BUGZILLA-API-KEY` header.

use chrono::Utc;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::{IssueFields, IssueUpdate, RemoteError, TrackerApi, TrackerFilter};
use crate::models::{Bug, TrackerSnapshot};
use crate::reconcile::TrackerVocabulary;

/// Production Bugzilla instance
pub const DEFAULT_BUGZILLA_URL: &str = "https://bugzilla.mozilla.org";

pub const DEFAULT_PRODUCT: &str = "Enterprise Information Security";
pub const DEFAULT_COMPONENT: &str = "Rapid Risk Analysis";

const API_KEY_HEADER: &str = "X-BUGZILLA-API-KEY";

const BUG_FIELDS: &str = "id,status,resolution,version,target_milestone,url,summary";

const USER_AGENT: &str = concat!("trellosa/", env!("CARGO_PKG_VERSION"));

const SERVICE: &str = "Bugzilla";

/// Bugzilla API keys are alphanumeric, longer than 30 and shorter than 50 characters.
pub fn is_plausible_api_key(key: &str) -> bool {
    (31..50).contains(&key.len()) && key.chars().all(|c| c.is_ascii_alphanumeric())
}

/// URL where the user creates a new API key.
pub fn api_key_url(base_url: &str) -> String {
    format!("{}/userprefs.cgi?tab=apikey", base_url.trim_end_matches('/'))
}

#[derive(Debug, Deserialize)]
struct BugList {
    bugs: Vec<Bug>,
}

#[derive(Debug, Deserialize)]
struct Created {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct ProductList {
    products: Vec<Product>,
}

#[derive(Debug, Deserialize)]
struct Product {
    name: String,
    #[serde(default)]
    versions: Vec<NamedValue>,
    #[serde(default)]
    milestones: Vec<NamedValue>,
    #[serde(default)]
    components: Vec<NamedValue>,
}

#[derive(Debug, Deserialize)]
struct NamedValue {
    name: String,
    #[serde(default = "default_active")]
    is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Who the configured API key belongs to.
#[derive(Debug, Clone, Deserialize)]
pub struct WhoAmI {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub real_name: String,
}

fn vocabulary_from(
    products: ProductList,
    filter: &TrackerFilter,
) -> Result<TrackerVocabulary, RemoteError> {
    let product = products
        .products
        .into_iter()
        .find(|p| p.name == filter.product)
        .ok_or_else(|| RemoteError::NotFound(SERVICE, format!("product {}", filter.product)))?;
    if !product.components.iter().any(|c| c.name == filter.component) {
        return Err(RemoteError::NotFound(
            SERVICE,
            format!("component {}", filter.component),
        ));
    }
    let active = |values: Vec<NamedValue>| -> Vec<String> {
        values
            .into_iter()
            .filter(|v| v.is_active)
            .map(|v| v.name)
            .collect()
    };
    TrackerVocabulary::new(
        &filter.product,
        &filter.component,
        active(product.versions),
        active(product.milestones),
    )
    .map_err(|e| RemoteError::Parse(SERVICE, e.to_string()))
}

/// Blocking client for one Bugzilla instance.
pub struct BugzillaClient {
    agent: ureq::Agent,
    base_url: String,
    api_key: String,
}

impl BugzillaClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(60))
            .user_agent(USER_AGENT)
            .build();
        Self {
            agent,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/rest/{}", self.base_url, path)
    }

    fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, RemoteError> {
        let mut request = self
            .agent
            .get(&self.url(path))
            .set(API_KEY_HEADER, &self.api_key)
            .set("Accept", "application/json");
        for (k, v) in params {
            request = request.query(k, v);
        }
        let response = request
            .call()
            .map_err(|e| RemoteError::from_ureq(SERVICE, path, e))?;
        response
            .into_json()
            .map_err(|e| RemoteError::Parse(SERVICE, e.to_string()))
    }

    /// Identify the owner of the API key.
    pub fn whoami(&self) -> Result<WhoAmI, RemoteError> {
        self.get("whoami", &[])
    }

    /// Check that the API key is well-formed and accepted by the server.
    pub fn check_api_key(&self) -> Result<bool, RemoteError> {
        if !is_plausible_api_key(&self.api_key) {
            return Ok(false);
        }
        match self.whoami() {
            Ok(_) => Ok(true),
            Err(RemoteError::Unauthorized(_)) | Err(RemoteError::Forbidden(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl TrackerApi for BugzillaClient {
    fn fetch_tracker_snapshot(
        &self,
        filter: &TrackerFilter,
    ) -> Result<TrackerSnapshot, RemoteError> {
        let captured_at = Utc::now();
        let list: BugList = self.get(
            "bug",
            &[
                ("product", filter.product.as_str()),
                ("component", filter.component.as_str()),
                ("include_fields", BUG_FIELDS),
            ],
        )?;
        let mut snapshot = TrackerSnapshot::new(captured_at);
        for bug in list.bugs {
            snapshot.add_bug(bug);
        }
        Ok(snapshot)
    }

    fn fetch_vocabulary(&self, filter: &TrackerFilter) -> Result<TrackerVocabulary, RemoteError> {
        let products: ProductList = self.get(
            "product",
            &[
                ("names", filter.product.as_str()),
                ("include_fields", "name,versions,milestones,components.name"),
            ],
        )?;
        vocabulary_from(products, filter)
    }

    fn create_issue(&self, fields: &IssueFields) -> Result<u64, RemoteError> {
        let response = self
            .agent
            .post(&self.url("bug"))
            .set(API_KEY_HEADER, &self.api_key)
            .send_json(fields)
            .map_err(|e| RemoteError::from_ureq(SERVICE, "new bug", e))?;
        let created: Created = response
            .into_json()
            .map_err(|e| RemoteError::Parse(SERVICE, e.to_string()))?;
        Ok(created.id)
    }

    fn update_issue(&self, id: u64, update: &IssueUpdate) -> Result<(), RemoteError> {
        let path = format!("bug/{}", id);
        self.agent
            .put(&self.url(&path))
            .set(API_KEY_HEADER, &self.api_key)
            .send_json(update)
            .map_err(|e| RemoteError::from_ureq(SERVICE, &format!("bug {}", id), e))?;
        Ok(())
    }
}
