//! Fixed Assets: equipment and vehicles that projects borrow.
//!
//! Consumes `projects.resource.assigned` / `projects.resource.released` and
//! keeps each asset's location and status in step with its project.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use modulerp_audit::AuditAction;
use modulerp_auth::{
    DataScope, Permission, PermissionRegistry, Principal, RegistryError, build_scope_filter,
    require,
};
use modulerp_core::{
    DomainError, Ownable, OwnershipMetadata, OwnershipRequirements, RecordId, TenantId,
};
use modulerp_events::{
    CancellationSignal, EventEnvelope, EventHandler, HandlerFailed, ProjectResourceAssignedEvent,
    ProjectResourceReleasedEvent,
};

use super::{Committed, ServiceError, SharedAuditRecorder, snapshot};
use crate::read_model::TenantStore;

pub const ENTITY_TYPE: &str = "fixed_assets.asset";

pub const ASSET_READ: &str = "fixed_assets.asset.read";
pub const ASSET_CREATE: &str = "fixed_assets.asset.create";
pub const ASSET_UPDATE: &str = "fixed_assets.asset.update";

pub const PERMISSIONS: [&str; 3] = [ASSET_READ, ASSET_CREATE, ASSET_UPDATE];

/// Name under which the module's project handler subscribes.
pub const PROJECT_HANDLER: &str = "fixed_assets.project_assignment";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    Available,
    Deployed,
    Retired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: RecordId,
    pub name: String,
    /// Where the asset currently is; `None` when it sits in its home yard.
    pub location: Option<String>,
    pub status: AssetStatus,
    pub ownership: OwnershipMetadata,
}

impl Ownable for Asset {
    fn entity_type(&self) -> &'static str {
        ENTITY_TYPE
    }

    fn ownership(&self) -> &OwnershipMetadata {
        &self.ownership
    }

    fn ownership_requirements(&self) -> OwnershipRequirements {
        OwnershipRequirements {
            department: true,
            ..OwnershipRequirements::TENANT_ONLY
        }
    }
}

pub struct FixedAssetsModule<S> {
    store: S,
    audit: SharedAuditRecorder,
    read: Permission,
    create: Permission,
    update: Permission,
}

impl<S> FixedAssetsModule<S>
where
    S: TenantStore<RecordId, Asset>,
{
    pub fn new(
        registry: &PermissionRegistry,
        store: S,
        audit: SharedAuditRecorder,
    ) -> Result<Self, RegistryError> {
        Ok(Self {
            store,
            audit,
            read: registry.resolve(ASSET_READ)?,
            create: registry.resolve(ASSET_CREATE)?,
            update: registry.resolve(ASSET_UPDATE)?,
        })
    }

    pub fn register_asset(
        &self,
        principal: &Principal,
        name: &str,
        ownership: OwnershipMetadata,
    ) -> Result<Committed<Asset>, ServiceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("asset name cannot be empty").into());
        }

        let asset = Asset {
            id: RecordId::new(),
            name: name.to_string(),
            location: None,
            status: AssetStatus::Available,
            ownership,
        };
        require(principal, &self.create, &asset)?;

        self.store.upsert(principal.tenant_id(), asset.id, asset.clone());
        let receipt = self.audit.record(
            AuditAction::Insert,
            ENTITY_TYPE,
            asset.id,
            principal,
            None,
            snapshot(&asset),
        );

        Ok(Committed {
            record: asset,
            audit_warning: receipt.warning,
        })
    }

    /// Read one asset. Records of other tenants are indistinguishable from
    /// missing ones.
    pub fn get(&self, principal: &Principal, asset_id: RecordId) -> Result<Asset, ServiceError> {
        let asset = self.load(principal.tenant_id(), asset_id)?;
        require(principal, &self.read, &asset)?;
        Ok(asset)
    }

    /// Assets the principal may read. A stored asset without the ownership
    /// fields it requires fails the whole listing.
    pub fn list(&self, principal: &Principal) -> Result<Vec<Asset>, ServiceError> {
        let filter = build_scope_filter(principal, &self.read);
        Ok(self.store.list_scoped(&filter)?)
    }

    /// Move the asset onto a project site. Repeating the same move is a no-op.
    pub fn deploy_to_project(
        &self,
        principal: &Principal,
        asset_id: RecordId,
        project_name: &str,
    ) -> Result<Committed<Asset>, ServiceError> {
        let location = format!("Project: {project_name}");
        self.update(principal, asset_id, |asset| {
            if asset.status == AssetStatus::Retired {
                return Err(DomainError::conflict(format!(
                    "asset {} is retired",
                    asset.id
                )));
            }
            asset.location = Some(location);
            asset.status = AssetStatus::Deployed;
            Ok(())
        })
    }

    /// Bring the asset back from its project. Releasing an available asset is
    /// a no-op.
    pub fn release(
        &self,
        principal: &Principal,
        asset_id: RecordId,
    ) -> Result<Committed<Asset>, ServiceError> {
        self.update(principal, asset_id, |asset| {
            if asset.status == AssetStatus::Deployed {
                asset.location = None;
                asset.status = AssetStatus::Available;
            }
            Ok(())
        })
    }

    pub fn retire(
        &self,
        principal: &Principal,
        asset_id: RecordId,
    ) -> Result<Committed<Asset>, ServiceError> {
        self.update(principal, asset_id, |asset| {
            if asset.status == AssetStatus::Deployed {
                return Err(DomainError::conflict(format!(
                    "asset {} is deployed and cannot be retired",
                    asset.id
                )));
            }
            asset.status = AssetStatus::Retired;
            Ok(())
        })
    }

    fn load(&self, tenant_id: TenantId, asset_id: RecordId) -> Result<Asset, ServiceError> {
        self.store
            .get(tenant_id, &asset_id)
            .ok_or_else(|| DomainError::not_found(format!("asset {asset_id}")).into())
    }

    fn update<F>(
        &self,
        principal: &Principal,
        asset_id: RecordId,
        apply: F,
    ) -> Result<Committed<Asset>, ServiceError>
    where
        F: FnOnce(&mut Asset) -> Result<(), DomainError>,
    {
        let (before, after) = self
            .store
            .update_with(principal.tenant_id(), &asset_id, |asset| {
                require(principal, &self.update, &*asset)?;
                let before = asset.clone();
                apply(&mut *asset)?;
                Ok::<_, ServiceError>((before, asset.clone()))
            })
            .ok_or_else(|| DomainError::not_found(format!("asset {asset_id}")))??;

        if after == before {
            return Ok(Committed {
                record: after,
                audit_warning: None,
            });
        }

        let receipt = self.audit.record(
            AuditAction::Update,
            ENTITY_TYPE,
            asset_id,
            principal,
            snapshot(&before),
            snapshot(&after),
        );

        Ok(Committed {
            record: after,
            audit_warning: receipt.warning,
        })
    }
}

/// Reacts to project resource events on behalf of Fixed Assets.
///
/// Acts as the module's service principal in the event's tenant, so every
/// update is authorized and audited like any other.
pub struct ProjectAssignmentHandler<S> {
    assets: Arc<FixedAssetsModule<S>>,
    registry: Arc<PermissionRegistry>,
}

impl<S> ProjectAssignmentHandler<S>
where
    S: TenantStore<RecordId, Asset>,
{
    pub fn new(assets: Arc<FixedAssetsModule<S>>, registry: Arc<PermissionRegistry>) -> Self {
        Self { assets, registry }
    }

    fn service_principal(&self, tenant_id: TenantId) -> Result<Principal, HandlerFailed> {
        Principal::service(
            tenant_id,
            "fixed_assets",
            &self.registry,
            &[(ASSET_UPDATE, DataScope::Global)],
        )
        .map_err(|e| HandlerFailed::reason(e.to_string()))
    }
}

#[async_trait]
impl<S> EventHandler<ProjectResourceAssignedEvent> for ProjectAssignmentHandler<S>
where
    S: TenantStore<RecordId, Asset> + 'static,
{
    fn name(&self) -> &str {
        PROJECT_HANDLER
    }

    async fn handle(
        &self,
        envelope: EventEnvelope<ProjectResourceAssignedEvent>,
        cancel: CancellationSignal,
    ) -> Result<(), HandlerFailed> {
        if cancel.is_cancelled() {
            return Err(HandlerFailed::Cancelled);
        }

        let service = self.service_principal(envelope.tenant_id())?;
        let event = envelope.payload();
        self.assets
            .deploy_to_project(&service, event.asset_id, &event.project_name)
            .map_err(|e| HandlerFailed::reason(e.to_string()))?;

        tracing::debug!(
            tenant_id = %event.tenant_id,
            asset_id = %event.asset_id,
            project_id = %event.project_id,
            "asset deployed to project"
        );
        Ok(())
    }
}

#[async_trait]
impl<S> EventHandler<ProjectResourceReleasedEvent> for ProjectAssignmentHandler<S>
where
    S: TenantStore<RecordId, Asset> + 'static,
{
    fn name(&self) -> &str {
        PROJECT_HANDLER
    }

    async fn handle(
        &self,
        envelope: EventEnvelope<ProjectResourceReleasedEvent>,
        cancel: CancellationSignal,
    ) -> Result<(), HandlerFailed> {
        if cancel.is_cancelled() {
            return Err(HandlerFailed::Cancelled);
        }

        let service = self.service_principal(envelope.tenant_id())?;
        let event = envelope.payload();
        self.assets
            .release(&service, event.asset_id)
            .map_err(|e| HandlerFailed::reason(e.to_string()))?;

        tracing::debug!(
            tenant_id = %event.tenant_id,
            asset_id = %event.asset_id,
            project_id = %event.project_id,
            "asset released from project"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use modulerp_audit::{
        AuditEntry, AuditFailurePolicy, AuditPersistFailure, AuditRecorder, AuditSink,
        InMemoryAuditLog,
    };
    use modulerp_auth::{AuthzError, DenyReason};
    use modulerp_core::{Clock, DepartmentId, SystemClock, UserId};

    use super::*;
    use crate::read_model::InMemoryTenantStore;

    type Store = Arc<InMemoryTenantStore<RecordId, Asset>>;

    struct FailingSink;

    impl AuditSink for FailingSink {
        fn append(&self, entry: &AuditEntry) -> Result<(), AuditPersistFailure> {
            Err(AuditPersistFailure::new(entry.entry_id(), "audit store offline"))
        }
    }

    fn registry() -> PermissionRegistry {
        PermissionRegistry::new().with_permissions(PERMISSIONS).unwrap()
    }

    fn module(
        sink: Arc<dyn AuditSink>,
        policy: AuditFailurePolicy,
    ) -> (FixedAssetsModule<Store>, Store) {
        let store: Store = Arc::new(InMemoryTenantStore::new());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let audit = Arc::new(AuditRecorder::with_clock(sink, clock).with_policy(policy));
        let module = FixedAssetsModule::new(&registry(), store.clone(), audit).unwrap();
        (module, store)
    }

    fn fleet_manager(tenant: TenantId, dept: DepartmentId) -> Principal {
        let registry = registry();
        let mut builder = Principal::builder(tenant, UserId::new()).department(dept);
        for key in PERMISSIONS {
            builder = builder.grant(&registry, key, DataScope::Department).unwrap();
        }
        builder.build()
    }

    #[test]
    fn register_then_deploy_is_audited() {
        let log = Arc::new(InMemoryAuditLog::new());
        let (assets, _) = module(log.clone(), AuditFailurePolicy::Log);
        let tenant = TenantId::new();
        let dept = DepartmentId::new();
        let manager = fleet_manager(tenant, dept);

        let excavator = assets
            .register_asset(&manager, "Excavator", OwnershipMetadata::new(tenant).in_department(dept))
            .unwrap()
            .record;
        let deployed = assets
            .deploy_to_project(&manager, excavator.id, "Downtown Build")
            .unwrap()
            .record;

        assert_eq!(deployed.location.as_deref(), Some("Project: Downtown Build"));
        assert_eq!(deployed.status, AssetStatus::Deployed);

        let history = log.entries_for_entity(tenant, ENTITY_TYPE, &excavator.id.to_string());
        assert_eq!(
            history.iter().map(|e| e.action()).collect::<Vec<_>>(),
            vec![AuditAction::Insert, AuditAction::Update]
        );
        assert_eq!(history[1].before().unwrap()["status"], "available");
        assert_eq!(history[1].after().unwrap()["status"], "deployed");
    }

    #[test]
    fn repeated_deploy_changes_nothing() {
        let log = Arc::new(InMemoryAuditLog::new());
        let (assets, _) = module(log.clone(), AuditFailurePolicy::Log);
        let tenant = TenantId::new();
        let dept = DepartmentId::new();
        let manager = fleet_manager(tenant, dept);
        let crane = assets
            .register_asset(&manager, "Crane", OwnershipMetadata::new(tenant).in_department(dept))
            .unwrap()
            .record;

        assets.deploy_to_project(&manager, crane.id, "Harbor").unwrap();
        assets.deploy_to_project(&manager, crane.id, "Harbor").unwrap();

        assert_eq!(log.len(), 2);
    }

    #[test]
    fn other_department_is_denied() {
        let (assets, _) = module(Arc::new(InMemoryAuditLog::new()), AuditFailurePolicy::Log);
        let tenant = TenantId::new();
        let owner_dept = DepartmentId::new();
        let owner = fleet_manager(tenant, owner_dept);
        let outsider = fleet_manager(tenant, DepartmentId::new());

        let truck = assets
            .register_asset(&owner, "Truck", OwnershipMetadata::new(tenant).in_department(owner_dept))
            .unwrap()
            .record;

        let err = assets.deploy_to_project(&outsider, truck.id, "Bridge").unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Authz(AuthzError::Denied {
                reason: DenyReason::InsufficientScope,
                ..
            })
        ));
        assert!(assets.list(&outsider).unwrap().is_empty());
        assert_eq!(assets.list(&owner).unwrap().len(), 1);
    }

    #[test]
    fn asset_without_department_is_a_configuration_error() {
        let (assets, _) = module(Arc::new(InMemoryAuditLog::new()), AuditFailurePolicy::Log);
        let tenant = TenantId::new();
        let manager = fleet_manager(tenant, DepartmentId::new());

        let err = assets
            .register_asset(&manager, "Forklift", OwnershipMetadata::new(tenant))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Authz(AuthzError::Configuration(_))));
    }

    #[test]
    fn stored_asset_without_department_fails_get_and_list_alike() {
        let (assets, store) = module(Arc::new(InMemoryAuditLog::new()), AuditFailurePolicy::Log);
        let tenant = TenantId::new();
        let orphan = Asset {
            id: RecordId::new(),
            name: "Compactor".into(),
            location: None,
            status: AssetStatus::Available,
            ownership: OwnershipMetadata::new(tenant),
        };
        store.upsert(tenant, orphan.id, orphan.clone());

        let registry = registry();
        let auditor = Principal::builder(tenant, UserId::new())
            .grant(&registry, ASSET_READ, DataScope::Global)
            .unwrap()
            .build();

        let from_get = assets.get(&auditor, orphan.id).unwrap_err();
        let from_list = assets.list(&auditor).unwrap_err();
        assert!(matches!(from_get, ServiceError::Authz(AuthzError::Configuration(_))));
        assert_eq!(from_list, from_get);
    }

    #[test]
    fn audit_failure_keeps_the_mutation() {
        let (assets, store) = module(Arc::new(FailingSink), AuditFailurePolicy::Surface);
        let tenant = TenantId::new();
        let dept = DepartmentId::new();
        let manager = fleet_manager(tenant, dept);

        let committed = assets
            .register_asset(&manager, "Generator", OwnershipMetadata::new(tenant).in_department(dept))
            .unwrap();

        assert!(committed.audit_warning.is_some());
        assert_eq!(store.get(tenant, &committed.record.id), Some(committed.record));
    }

    #[test]
    fn retired_assets_cannot_be_deployed() {
        let (assets, _) = module(Arc::new(InMemoryAuditLog::new()), AuditFailurePolicy::Log);
        let tenant = TenantId::new();
        let dept = DepartmentId::new();
        let manager = fleet_manager(tenant, dept);
        let roller = assets
            .register_asset(&manager, "Roller", OwnershipMetadata::new(tenant).in_department(dept))
            .unwrap()
            .record;

        assets.retire(&manager, roller.id).unwrap();
        let err = assets.deploy_to_project(&manager, roller.id, "Ring Road").unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::Conflict(_))));
    }

    #[test]
    fn other_tenants_assets_look_missing() {
        let (assets, _) = module(Arc::new(InMemoryAuditLog::new()), AuditFailurePolicy::Log);
        let dept = DepartmentId::new();
        let tenant_a = TenantId::new();
        let a = fleet_manager(tenant_a, dept);
        let b = fleet_manager(TenantId::new(), dept);

        let pump = assets
            .register_asset(&a, "Pump", OwnershipMetadata::new(tenant_a).in_department(dept))
            .unwrap()
            .record;

        assert!(matches!(
            assets.get(&b, pump.id),
            Err(ServiceError::Domain(DomainError::NotFound(_)))
        ));
    }
}
