use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use modulerp_auth::ScopeFilter;
use modulerp_core::{ConfigurationError, Ownable, TenantId};

/// Tenant-isolated key/value store for module records.
///
/// Every read and write is keyed by tenant; there is no cross-tenant listing.
pub trait TenantStore<K, V>: Send + Sync {
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V>;
    fn upsert(&self, tenant_id: TenantId, key: K, value: V);

    /// Change one record atomically with respect to other writers.
    ///
    /// `apply` works on a copy; the copy replaces the stored value only when
    /// `apply` returns `Ok`. `None` if the record does not exist.
    fn update_with<R, E, F>(&self, tenant_id: TenantId, key: &K, apply: F) -> Option<Result<R, E>>
    where
        F: FnOnce(&mut V) -> Result<R, E>;

    fn list(&self, tenant_id: TenantId) -> Vec<V>;

    /// Rows selected by an authorization scope filter (tenant included).
    ///
    /// Every row of the filter's tenant must carry the ownership fields its
    /// entity type requires; the first one that does not fails the listing.
    fn list_scoped(&self, filter: &ScopeFilter) -> Result<Vec<V>, ConfigurationError>
    where
        V: Ownable;

    /// Remove all records of a tenant.
    fn clear_tenant(&self, tenant_id: TenantId);
}

impl<K, V, S> TenantStore<K, V> for Arc<S>
where
    S: TenantStore<K, V> + ?Sized,
{
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V> {
        (**self).get(tenant_id, key)
    }

    fn upsert(&self, tenant_id: TenantId, key: K, value: V) {
        (**self).upsert(tenant_id, key, value)
    }

    fn update_with<R, E, F>(&self, tenant_id: TenantId, key: &K, apply: F) -> Option<Result<R, E>>
    where
        F: FnOnce(&mut V) -> Result<R, E>,
    {
        (**self).update_with(tenant_id, key, apply)
    }

    fn list(&self, tenant_id: TenantId) -> Vec<V> {
        (**self).list(tenant_id)
    }

    fn list_scoped(&self, filter: &ScopeFilter) -> Result<Vec<V>, ConfigurationError>
    where
        V: Ownable,
    {
        (**self).list_scoped(filter)
    }

    fn clear_tenant(&self, tenant_id: TenantId) {
        (**self).clear_tenant(tenant_id)
    }
}

/// In-memory tenant-isolated store for tests/dev.
#[derive(Debug)]
pub struct InMemoryTenantStore<K, V> {
    inner: RwLock<HashMap<(TenantId, K), V>>,
}

impl<K, V> InMemoryTenantStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryTenantStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> TenantStore<K, V> for InMemoryTenantStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V> {
        let map = self.inner.read().ok()?;
        map.get(&(tenant_id, key.clone())).cloned()
    }

    fn upsert(&self, tenant_id: TenantId, key: K, value: V) {
        if let Ok(mut map) = self.inner.write() {
            map.insert((tenant_id, key), value);
        }
    }

    fn update_with<R, E, F>(&self, tenant_id: TenantId, key: &K, apply: F) -> Option<Result<R, E>>
    where
        F: FnOnce(&mut V) -> Result<R, E>,
    {
        let mut map = self.inner.write().ok()?;
        let slot = map.get_mut(&(tenant_id, key.clone()))?;

        let mut draft = slot.clone();
        let result = apply(&mut draft);
        if result.is_ok() {
            *slot = draft;
        }
        Some(result)
    }

    fn list(&self, tenant_id: TenantId) -> Vec<V> {
        let map = match self.inner.read() {
            Ok(m) => m,
            Err(_) => return vec![],
        };

        map.iter()
            .filter_map(|((t, _k), v)| if *t == tenant_id { Some(v.clone()) } else { None })
            .collect()
    }

    fn list_scoped(&self, filter: &ScopeFilter) -> Result<Vec<V>, ConfigurationError>
    where
        V: Ownable,
    {
        let map = match self.inner.read() {
            Ok(m) => m,
            Err(_) => return Ok(vec![]),
        };

        let mut rows = Vec::new();
        for ((t, _k), v) in map.iter() {
            if *t != filter.tenant_id() {
                continue;
            }
            v.ownership()
                .validate(v.entity_type(), v.ownership_requirements())?;
            if filter.matches(v.ownership()) {
                rows.push(v.clone());
            }
        }
        Ok(rows)
    }

    fn clear_tenant(&self, tenant_id: TenantId) {
        if let Ok(mut map) = self.inner.write() {
            map.retain(|(t, _k), _v| *t != tenant_id);
        }
    }
}
