//! Azure Blob Storage backend over the REST API.
//!
//! Authenticates with a container-scoped SAS token appended to every request
//! URL, so no request signing is needed. Blob keys map 1:1 onto blob names
//! inside a single container.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use tracing::debug;

use crate::error::StorageError;
use crate::storage_traits::{validate_key, BlobMetadata, ObjectStore, StorageResult};

const API_VERSION: &str = "2021-08-06";
const META_PREFIX: &str = "x-ms-meta-";

/// Azure connection settings
#[derive(Debug, Clone)]
pub struct AzureBlobConfig {
    /// Storage account name
    pub account_name: String,
    /// Container holding manifests, logs and installers
    pub container: String,
    /// SAS token (with or without the leading `?`)
    pub sas_token: String,
    /// Override for the blob endpoint (Azurite, sovereign clouds)
    pub endpoint: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl AzureBlobConfig {
    pub fn new(account_name: &str, container: &str, sas_token: &str) -> Self {
        AzureBlobConfig {
            account_name: account_name.to_string(),
            container: container.to_string(),
            sas_token: sas_token.to_string(),
            endpoint: None,
            timeout: Duration::from_secs(60),
        }
    }

    /// Point at a non-default endpoint
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = Some(endpoint.to_string());
        self
    }

    /// Set the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| format!("https://{}.blob.core.windows.net", self.account_name))
    }
}

/// Object store backed by one Azure Blob container
pub struct AzureBlobStore {
    config: AzureBlobConfig,
    base: Url,
    http_client: reqwest::Client,
}

impl AzureBlobStore {
    pub fn new(config: AzureBlobConfig) -> StorageResult<Self> {
        if config.account_name.trim().is_empty() {
            return Err(StorageError::Credentials("account name is empty".to_string()));
        }
        if config.sas_token.trim().trim_start_matches('?').is_empty() {
            return Err(StorageError::Credentials("SAS token is empty".to_string()));
        }
        let endpoint = config.endpoint();
        let base = Url::parse(&endpoint)
            .map_err(|e| StorageError::Credentials(format!("invalid endpoint {endpoint}: {e}")))?;
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("stagepush/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()?;

        Ok(AzureBlobStore {
            config,
            base,
            http_client,
        })
    }

    fn url_for(&self, key: Option<&str>) -> StorageResult<Url> {
        let mut url = self.base.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|()| {
                StorageError::Credentials(format!("endpoint {} cannot hold a path", self.base))
            })?;
            segments.pop_if_empty().push(&self.config.container);
            if let Some(key) = key {
                for seg in key.split('/') {
                    segments.push(seg);
                }
            }
        }
        url.set_query(Some(self.config.sas_token.trim().trim_start_matches('?')));
        Ok(url)
    }

    fn blob_url(&self, key: &str) -> StorageResult<Url> {
        validate_key(key)?;
        self.url_for(Some(key))
    }

    fn container_url(&self) -> StorageResult<Url> {
        self.url_for(None)
    }
}

fn check_status(status: StatusCode, key: &str) -> StorageResult<()> {
    if status.is_success() {
        return Ok(());
    }
    match status {
        StatusCode::NOT_FOUND => Err(StorageError::NotFound {
            key: key.to_string(),
        }),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(StorageError::Credentials(
            format!("{status} for {key} (check the SAS token permissions and expiry)"),
        )),
        _ => Err(StorageError::Http {
            status: status.as_u16(),
            key: key.to_string(),
        }),
    }
}

fn metadata_from_headers(headers: &HeaderMap) -> BlobMetadata {
    let mut metadata = BlobMetadata {
        content_type: headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        ..Default::default()
    };
    for (name, value) in headers {
        if let Some(tag) = name.as_str().strip_prefix(META_PREFIX) {
            if let Ok(value) = value.to_str() {
                metadata.tags.insert(tag.to_string(), value.to_string());
            }
        }
    }
    metadata
}

#[derive(Debug, Deserialize)]
struct EnumerationResults {
    #[serde(rename = "Blobs", default)]
    blobs: BlobList,
    #[serde(rename = "NextMarker", default)]
    next_marker: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BlobList {
    #[serde(rename = "Blob", default)]
    items: Vec<BlobItem>,
}

#[derive(Debug, Deserialize)]
struct BlobItem {
    #[serde(rename = "Name")]
    name: String,
}

fn parse_list_page(body: &str) -> StorageResult<(Vec<String>, Option<String>)> {
    let page: EnumerationResults =
        quick_xml::de::from_str(body).map_err(|e| StorageError::Malformed(e.to_string()))?;
    let names = page.blobs.items.into_iter().map(|b| b.name).collect();
    let marker = page.next_marker.filter(|m| !m.trim().is_empty());
    Ok((names, marker))
}

#[async_trait]
impl ObjectStore for AzureBlobStore {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let response = self.http_client.head(self.blob_url(key)?).send().await?;
        match check_status(response.status(), key) {
            Ok(()) => Ok(true),
            Err(StorageError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn upload(&self, key: &str, data: &[u8], metadata: &BlobMetadata) -> StorageResult<()> {
        let content_type = metadata
            .content_type
            .as_deref()
            .unwrap_or("application/octet-stream");
        let mut request = self
            .http_client
            .put(self.blob_url(key)?)
            .header("x-ms-blob-type", "BlockBlob")
            .header("x-ms-version", API_VERSION)
            .header(CONTENT_TYPE, content_type)
            .header("x-ms-blob-content-type", content_type);
        for (tag, value) in &metadata.tags {
            request = request.header(format!("{META_PREFIX}{tag}"), value.as_str());
        }

        debug!(key = %key, bytes = data.len(), "uploading blob");
        let response = request.body(data.to_vec()).send().await?;
        check_status(response.status(), key)
    }

    async fn download(&self, key: &str) -> StorageResult<Vec<u8>> {
        let response = self
            .http_client
            .get(self.blob_url(key)?)
            .header("x-ms-version", API_VERSION)
            .send()
            .await?;
        check_status(response.status(), key)?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn metadata(&self, key: &str) -> StorageResult<Option<BlobMetadata>> {
        let response = self
            .http_client
            .head(self.blob_url(key)?)
            .header("x-ms-version", API_VERSION)
            .send()
            .await?;
        match check_status(response.status(), key) {
            Ok(()) => Ok(Some(metadata_from_headers(response.headers()))),
            Err(StorageError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let mut url = self.container_url()?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("restype", "container");
                query.append_pair("comp", "list");
                query.append_pair("prefix", prefix);
                if let Some(m) = &marker {
                    query.append_pair("marker", m);
                }
            }
            let response = self
                .http_client
                .get(url)
                .header("x-ms-version", API_VERSION)
                .send()
                .await?;
            check_status(response.status(), prefix)?;
            let body = response.text().await?;
            let (names, next) = parse_list_page(&body)?;
            keys.extend(names);
            match next {
                Some(m) => marker = Some(m),
                None => break,
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let response = self
            .http_client
            .delete(self.blob_url(key)?)
            .header("x-ms-version", API_VERSION)
            .send()
            .await?;
        match check_status(response.status(), key) {
            Ok(()) | Err(StorageError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
