//! Tenant resolution: gateway instance id or session name -> agency id.

use crate::config::TenantConfig;
use crate::model::AgencyId;
use crate::store::StoreError;
use async_trait::async_trait;

/// The identifier a gateway flavor uses for the tenant's account, decided once at parse time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantKey {
    /// Green API `idInstance`.
    Instance(String),
    /// WAHA session name.
    Session(String),
}

impl TenantKey {
    pub fn instance_id(&self) -> Option<&str> {
        match self {
            TenantKey::Instance(id) => Some(id),
            TenantKey::Session(_) => None,
        }
    }

    pub fn session_name(&self) -> Option<&str> {
        match self {
            TenantKey::Session(name) => Some(name),
            TenantKey::Instance(_) => None,
        }
    }
}

#[async_trait]
pub trait TenantResolver: Send + Sync {
    /// Instance id wins when both are given; `None` when neither is present or nothing matches.
    async fn resolve(
        &self,
        instance_id: Option<&str>,
        session_name: Option<&str>,
    ) -> Result<Option<AgencyId>, StoreError>;

    async fn resolve_key(&self, key: &TenantKey) -> Result<Option<AgencyId>, StoreError> {
        self.resolve(key.instance_id(), key.session_name()).await
    }
}

/// Tenant records from the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigTenants {
    tenants: Vec<TenantConfig>,
}

impl ConfigTenants {
    pub fn new(tenants: Vec<TenantConfig>) -> Self {
        Self { tenants }
    }

    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }
}

fn present(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

#[async_trait]
impl TenantResolver for ConfigTenants {
    async fn resolve(
        &self,
        instance_id: Option<&str>,
        session_name: Option<&str>,
    ) -> Result<Option<AgencyId>, StoreError> {
        let found = if let Some(id) = present(instance_id) {
            self.tenants
                .iter()
                .find(|t| t.gateway_instance_id.as_deref().map(str::trim) == Some(id))
        } else if let Some(name) = present(session_name) {
            self.tenants
                .iter()
                .find(|t| t.session_name.as_deref().map(str::trim) == Some(name))
        } else {
            None
        };
        Ok(found.map(|t| t.agency_id.clone()))
    }
}
