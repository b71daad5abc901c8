//! Registry metadata client.
//!
//! The core only needs "the JSON metadata document for an ident". Everything
//! else (which version, which tarball, which repository) is read out of that
//! document with the helpers below.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use varia_schema::{Ident, IdentHash};

use crate::USER_AGENT;
use crate::error::{RegistryDataError, ResolveError};

#[async_trait]
pub trait Registry: Send + Sync {
    /// The full metadata document for `ident`.
    async fn metadata(&self, ident: &Ident) -> Result<Arc<Value>, ResolveError>;
}

/// npm-compatible HTTP registry. Documents are memoized per ident.
#[derive(Debug)]
pub struct HttpRegistry {
    base: String,
    client: Client,
    documents: Mutex<HashMap<IdentHash, Arc<Value>>>,
}

impl HttpRegistry {
    pub fn new(base: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self::with_client(base, client))
    }

    pub fn with_client(base: impl Into<String>, client: Client) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
            client,
            documents: Mutex::new(HashMap::new()),
        }
    }

    /// `<base>/name` or `<base>/@scope%2fname`.
    pub fn document_url(&self, ident: &Ident) -> String {
        match ident.scope() {
            Some(scope) => format!("{}/@{scope}%2f{}", self.base, ident.name()),
            None => format!("{}/{}", self.base, ident.name()),
        }
    }

    fn cached(&self, ident: &Ident) -> Option<Arc<Value>> {
        self.documents
            .lock()
            .ok()
            .and_then(|documents| documents.get(ident.hash()).cloned())
    }
}

#[async_trait]
impl Registry for HttpRegistry {
    async fn metadata(&self, ident: &Ident) -> Result<Arc<Value>, ResolveError> {
        if let Some(document) = self.cached(ident) {
            return Ok(document);
        }

        let url = self.document_url(ident);
        tracing::debug!(%ident, %url, "fetching registry metadata");

        let document: Value = self
            .client
            .get(&url)
            .header("accept", "application/json")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let document = Arc::new(document);

        if let Ok(mut documents) = self.documents.lock() {
            documents.insert(ident.hash().clone(), Arc::clone(&document));
        }
        Ok(document)
    }
}

/// `versions[version]` out of a metadata document.
pub fn version_manifest<'a>(
    document: &'a Value,
    ident: &Ident,
    version: &str,
) -> Result<&'a Value, RegistryDataError> {
    let versions = document
        .get("versions")
        .and_then(Value::as_object)
        .ok_or_else(|| RegistryDataError::Malformed {
            ident: ident.to_string(),
            field: "versions",
        })?;

    versions
        .get(version)
        .ok_or_else(|| RegistryDataError::NotFound {
            ident: ident.to_string(),
            version: version.to_string(),
        })
}

/// Every published version string.
pub fn published_versions<'a>(
    document: &'a Value,
    ident: &Ident,
) -> Result<impl Iterator<Item = &'a str>, RegistryDataError> {
    let versions = document
        .get("versions")
        .and_then(Value::as_object)
        .ok_or_else(|| RegistryDataError::Malformed {
            ident: ident.to_string(),
            field: "versions",
        })?;
    Ok(versions.keys().map(String::as_str))
}

/// The version a dist-tag such as `latest` points at.
pub fn dist_tag<'a>(document: &'a Value, tag: &str) -> Option<&'a str> {
    document.get("dist-tags")?.get(tag)?.as_str()
}

/// `repository` as a string or `{url}`.
pub fn repository_url(manifest: &Value) -> Option<&str> {
    match manifest.get("repository")? {
        Value::String(url) => Some(url.as_str()),
        Value::Object(fields) => fields.get("url")?.as_str(),
        _ => None,
    }
}

/// `dist.tarball` of a version manifest.
pub fn tarball_url<'a>(manifest: &'a Value, ident: &Ident) -> Result<&'a str, RegistryDataError> {
    manifest
        .get("dist")
        .and_then(|dist| dist.get("tarball"))
        .and_then(Value::as_str)
        .ok_or_else(|| RegistryDataError::Malformed {
            ident: ident.to_string(),
            field: "dist.tarball",
        })
}
