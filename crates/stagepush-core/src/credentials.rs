//! Local storage credentials and object-store construction.
//!
//! A credential file at `storage.local_credential_path` overrides the
//! inline Azure settings so secrets stay out of the checked-in config.
//! `STAGEPUSH_SAS_TOKEN` is consulted last.

use std::path::Path;

use blobstate::{AzureBlobConfig, AzureBlobStore, FsObjectStore, ObjectStore};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{PublishConfig, StorageBackend};
use crate::domain::{DeliverError, Result};

/// Environment variable holding the SAS token fallback.
pub const SAS_TOKEN_ENV: &str = "STAGEPUSH_SAS_TOKEN";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageCredentials {
    pub account_name: String,
    pub sas_token: String,
}

impl StorageCredentials {
    /// `Ok(None)` when no credential file exists.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map(Some).map_err(|e| {
            DeliverError::Configuration(format!("invalid credential file {}: {e}", path.display()))
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string(self)
            .map_err(|e| DeliverError::Configuration(format!("cannot encode credentials: {e}")))?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

/// Work out the Azure connection settings for `config`, given the
/// environment's SAS token (if any).
pub fn resolve_azure(config: &PublishConfig, env_token: Option<String>) -> Result<AzureBlobConfig> {
    let StorageBackend::Azure {
        account_name,
        container,
        sas_token,
        endpoint,
    } = &config.storage.backend
    else {
        return Err(DeliverError::Configuration(
            "storage backend is not azure".to_string(),
        ));
    };

    let file_creds = match &config.storage.local_credential_path {
        Some(path) => StorageCredentials::load(path)?,
        None => None,
    };

    let (account, token) = match file_creds {
        Some(creds) => {
            debug!("using local credential file");
            (creds.account_name, Some(creds.sas_token))
        }
        None => (
            account_name.clone(),
            sas_token.clone().or(env_token.filter(|t| !t.trim().is_empty())),
        ),
    };

    let token = token.ok_or_else(|| {
        DeliverError::Configuration(format!(
            "no SAS token: set storage.backend.sas_token, a credential file, or {SAS_TOKEN_ENV}"
        ))
    })?;

    let mut azure = AzureBlobConfig::new(&account, container, &token);
    if !config.storage_timeout().is_zero() {
        azure = azure.with_timeout(config.storage_timeout());
    }
    if let Some(endpoint) = endpoint {
        azure = azure.with_endpoint(endpoint);
    }
    Ok(azure)
}

/// Open the object store named by the config.
pub fn open_store(config: &PublishConfig) -> Result<Box<dyn ObjectStore>> {
    let store: Box<dyn ObjectStore> = match &config.storage.backend {
        StorageBackend::Filesystem { root } => Box::new(
            FsObjectStore::new(root).map_err(|e| DeliverError::transport("open_store", e))?,
        ),
        StorageBackend::Azure { .. } => {
            let azure = resolve_azure(config, std::env::var(SAS_TOKEN_ENV).ok())?;
            Box::new(AzureBlobStore::new(azure).map_err(|e| DeliverError::transport("open_store", e))?)
        }
    };
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn azure_config(sas_token: Option<&str>, credential_path: Option<&Path>) -> PublishConfig {
        let mut text = String::from(
            r#"
            product_name = "Acme"
            staging_path = "/stage"
            product_version_file = "Acme.exe"

            [installer]
            kind = "zip_file"
            output = "/out/Acme.zip"

            [storage]
            "#,
        );
        if let Some(path) = credential_path {
            text.push_str(&format!("local_credential_path = {:?}\n", path.display().to_string()));
        }
        text.push_str("[storage.backend]\ntype = \"azure\"\naccount_name = \"inline\"\ncontainer = \"releases\"\n");
        if let Some(token) = sas_token {
            text.push_str(&format!("sas_token = \"{token}\"\n"));
        }
        PublishConfig::from_toml_str(&text).unwrap()
    }

    #[test]
    fn test_credentials_roundtrip_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/creds.toml");
        let creds = StorageCredentials {
            account_name: "acct".to_string(),
            sas_token: "sv=2021&sig=abc".to_string(),
        };
        creds.save(&path).unwrap();
        assert_eq!(StorageCredentials::load(&path).unwrap(), Some(creds));
    }

    #[test]
    fn test_missing_credential_file_is_none() {
        assert_eq!(
            StorageCredentials::load(Path::new("/no/creds.toml")).unwrap(),
            None
        );
    }

    #[test]
    fn test_inline_token_used() {
        let azure = resolve_azure(&azure_config(Some("sig=inline"), None), None).unwrap();
        assert_eq!(azure.account_name, "inline");
        assert_eq!(azure.sas_token, "sig=inline");
    }

    #[test]
    fn test_env_token_is_fallback() {
        let azure = resolve_azure(&azure_config(None, None), Some("sig=env".to_string())).unwrap();
        assert_eq!(azure.sas_token, "sig=env");

        let azure =
            resolve_azure(&azure_config(Some("sig=inline"), None), Some("sig=env".to_string()))
                .unwrap();
        assert_eq!(azure.sas_token, "sig=inline");
    }

    #[test]
    fn test_credential_file_overrides_inline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.toml");
        StorageCredentials {
            account_name: "from-file".to_string(),
            sas_token: "sig=file".to_string(),
        }
        .save(&path)
        .unwrap();

        let azure = resolve_azure(&azure_config(Some("sig=inline"), Some(&path)), None).unwrap();
        assert_eq!(azure.account_name, "from-file");
        assert_eq!(azure.sas_token, "sig=file");
        assert_eq!(azure.container, "releases");
    }

    #[test]
    fn test_no_token_anywhere_is_configuration_error() {
        let err = resolve_azure(&azure_config(None, None), None).unwrap_err();
        assert!(matches!(err, DeliverError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_open_filesystem_store() {
        let dir = tempfile::tempdir().unwrap();
        let text = crate::config::SAMPLE_CONFIG.replace(
            "root = \"publish\"",
            &format!("root = {:?}", dir.path().join("publish").display().to_string()),
        );
        let config = PublishConfig::from_toml_str(&text).unwrap();
        let store = open_store(&config).unwrap();
        assert!(!store.exists("MyProduct.VersionInfo.xml").await.unwrap());
    }
}
