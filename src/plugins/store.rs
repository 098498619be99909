use std::fs;
use std::path::PathBuf;

use log::{debug, info};
use thiserror::Error;

use crate::settings::Settings;
use crate::storage::InventoryStore;
use crate::types::{CertificateInfo, ScheduledRenewal};

/// Errors produced by certificate store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("certificate not found: {0}")]
    NotFound(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store error: {0}")]
    Store(String),
}

/// Keeps issued certificates, addressable by thumbprint.
pub trait StorePlugin: Send + Sync {
    fn name(&self) -> String;
    fn find_by_thumbprint(&self, thumbprint: &str) -> Result<Option<CertificateInfo>, StoreError>;
    /// Persists the certificate and stamps its store reference.
    fn save(&self, certificate: &mut CertificateInfo) -> Result<(), StoreError>;
    fn delete(&self, certificate: &CertificateInfo) -> Result<(), StoreError>;
}

/// Selects and builds the store for one renewal.
pub trait StorePluginFactory: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// Whether this factory serves the renewal's store-selection fields.
    fn handles(&self, renewal: &ScheduledRenewal) -> bool;
    fn create(
        &self,
        renewal: &ScheduledRenewal,
        settings: &Settings,
    ) -> Result<Box<dyn StorePlugin>, StoreError>;
}

/// PEM directory keyed by thumbprint, for web servers that read their
/// certificates straight off disk.
pub struct CentralSslStoreFactory;

impl StorePluginFactory for CentralSslStoreFactory {
    fn name(&self) -> &'static str {
        "centralssl"
    }

    fn description(&self) -> &'static str {
        "PEM files in a central SSL directory"
    }

    fn handles(&self, renewal: &ScheduledRenewal) -> bool {
        renewal.central_ssl_store.is_some()
    }

    fn create(
        &self,
        renewal: &ScheduledRenewal,
        _settings: &Settings,
    ) -> Result<Box<dyn StorePlugin>, StoreError> {
        let path = renewal
            .central_ssl_store
            .clone()
            .ok_or_else(|| StoreError::Unavailable("central SSL store path not set".into()))?;
        Ok(Box::new(CentralSslStore { path }))
    }
}

pub struct CentralSslStore {
    path: PathBuf,
}

impl CentralSslStore {
    fn pem_path(&self, thumbprint: &str) -> PathBuf {
        self.path.join(format!("{thumbprint}.pem"))
    }
}

impl StorePlugin for CentralSslStore {
    fn name(&self) -> String {
        format!("centralssl:{}", self.path.display())
    }

    fn find_by_thumbprint(&self, thumbprint: &str) -> Result<Option<CertificateInfo>, StoreError> {
        let path = self.pem_path(thumbprint);
        if !path.exists() {
            return Ok(None);
        }
        let pem = fs::read_to_string(&path)
            .map_err(|err| StoreError::Store(format!("failed to read {}: {err}", path.display())))?;
        Ok(Some(CertificateInfo {
            thumbprint: thumbprint.to_string(),
            pem,
            hosts: Vec::new(),
            store: Some(self.name()),
        }))
    }

    fn save(&self, certificate: &mut CertificateInfo) -> Result<(), StoreError> {
        fs::create_dir_all(&self.path).map_err(|err| {
            StoreError::Unavailable(format!("failed to create {}: {err}", self.path.display()))
        })?;
        let path = self.pem_path(&certificate.thumbprint);
        fs::write(&path, &certificate.pem)
            .map_err(|err| StoreError::Store(format!("failed to write {}: {err}", path.display())))?;
        certificate.store = Some(self.name());
        info!("[store] wrote certificate {} to {}", certificate.thumbprint, path.display());
        Ok(())
    }

    fn delete(&self, certificate: &CertificateInfo) -> Result<(), StoreError> {
        let path = self.pem_path(&certificate.thumbprint);
        if !path.exists() {
            return Err(StoreError::NotFound(certificate.thumbprint.clone()));
        }
        fs::remove_file(&path)
            .map_err(|err| StoreError::Store(format!("failed to remove {}: {err}", path.display())))?;
        debug!("[store] removed certificate file {}", path.display());
        Ok(())
    }
}

/// Named certificate store backed by the engine database, standing in for a
/// system certificate store.
pub struct SqliteStoreFactory {
    inventory: InventoryStore,
}

impl SqliteStoreFactory {
    pub fn new(inventory: InventoryStore) -> Self {
        Self { inventory }
    }
}

impl StorePluginFactory for SqliteStoreFactory {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn description(&self) -> &'static str {
        "Named certificate store in the engine database"
    }

    fn handles(&self, renewal: &ScheduledRenewal) -> bool {
        renewal.central_ssl_store.is_none()
    }

    fn create(
        &self,
        renewal: &ScheduledRenewal,
        settings: &Settings,
    ) -> Result<Box<dyn StorePlugin>, StoreError> {
        let store_name = renewal
            .certificate_store
            .clone()
            .unwrap_or_else(|| settings.default_certificate_store.clone());
        Ok(Box::new(SqliteCertificateStore {
            inventory: self.inventory.clone(),
            store_name,
        }))
    }
}

pub struct SqliteCertificateStore {
    inventory: InventoryStore,
    store_name: String,
}

impl StorePlugin for SqliteCertificateStore {
    fn name(&self) -> String {
        self.store_name.clone()
    }

    fn find_by_thumbprint(&self, thumbprint: &str) -> Result<Option<CertificateInfo>, StoreError> {
        self.inventory
            .find(&self.store_name, thumbprint)
            .map_err(|err| StoreError::Store(err.to_string()))
    }

    fn save(&self, certificate: &mut CertificateInfo) -> Result<(), StoreError> {
        self.inventory
            .insert(&self.store_name, certificate)
            .map_err(|err| StoreError::Store(err.to_string()))?;
        certificate.store = Some(self.store_name.clone());
        info!(
            "[store] saved certificate {} to store {}",
            certificate.thumbprint, self.store_name
        );
        Ok(())
    }

    fn delete(&self, certificate: &CertificateInfo) -> Result<(), StoreError> {
        let removed = self
            .inventory
            .delete(&self.store_name, &certificate.thumbprint)
            .map_err(|err| StoreError::Store(err.to_string()))?;
        if !removed {
            return Err(StoreError::NotFound(certificate.thumbprint.clone()));
        }
        Ok(())
    }
}
