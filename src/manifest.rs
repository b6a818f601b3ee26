//! Application manifest (`app.yaml`).
//!
//! Each application root declares its routing host, its actions and their
//! interceptor chains, its resource roots, and session tuning. The manifest
//! is the application's only metadata surface; handlers and interceptors it
//! names are resolved through the application's loader at start.
//!
//! ```yaml
//! host: shop.example.com
//! session:
//!   expiration_minutes: 30
//! resources:
//!   - public
//! actions:
//!   - route: /
//!     handler: home
//!   - route: /cart/{id}
//!     handler: show_cart
//!     method: GET
//!     content_type: application/json
//!     interceptors: [request_log, require_auth]
//! ```

use crate::error::StartError;
use serde::Deserialize;
use std::path::Path;

pub const MANIFEST_FILE: &str = "app.yaml";

/// Default content type for actions that do not declare one.
pub const DEFAULT_CONTENT_TYPE: &str = "text/html";

fn default_method() -> String {
    "GET".to_string()
}

fn default_resources() -> Vec<String> {
    vec!["public".to_string()]
}

fn default_expiration_minutes() -> u64 {
    30
}

/// One declared entry point.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionSpec {
    /// Route pattern, `/path` or `/path/{param}`
    pub route: String,
    /// Handler name, resolved child-first through the loader
    pub handler: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub content_type: Option<String>,
    /// Interceptor names, run in this order before the handler
    #[serde(default)]
    pub interceptors: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionSettings {
    pub expiration_minutes: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            expiration_minutes: default_expiration_minutes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppManifest {
    /// Routing key; defaults to the application directory name
    pub host: Option<String>,
    pub actions: Vec<ActionSpec>,
    /// Resource roots relative to the application directory
    pub resources: Vec<String>,
    pub session: SessionSettings,
}

impl Default for AppManifest {
    fn default() -> Self {
        Self {
            host: None,
            actions: Vec::new(),
            resources: default_resources(),
            session: SessionSettings::default(),
        }
    }
}

impl AppManifest {
    /// Read `app.yaml` from an application root.
    pub fn load(root: &Path) -> Result<Self, StartError> {
        let path = root.join(MANIFEST_FILE);
        let raw = std::fs::read_to_string(&path)
            .map_err(|_| StartError::MissingManifest(path.clone()))?;
        serde_yaml::from_str(&raw).map_err(|source| StartError::InvalidManifest { path, source })
    }
}
