//! Process wiring: registry, roles, audit, the event bus and the modules.
//!
//! The bus is built exactly once, here, and handed to modules as an
//! immutable `Arc<IntegrationEventBus>`.

use std::sync::Arc;

use anyhow::Context;

use modulerp_audit::{AuditRecorder, AuditSink, InMemoryAuditLog};
use modulerp_auth::{DataScope, PermissionRegistry, RolePolicy};
use modulerp_core::{Clock, RecordId, SystemClock};
use modulerp_events::{
    BusBuildError, EventBusBuilder, IntegrationEventBus, ProjectResourceAssignedEvent,
    ProjectResourceReleasedEvent,
};

use crate::config::CoreConfig;
use crate::modules::fixed_assets::{self, Asset, FixedAssetsModule, ProjectAssignmentHandler};
use crate::modules::projects::{self, Project, ProjectsModule};
use crate::read_model::InMemoryTenantStore;

pub type AssetStore = Arc<InMemoryTenantStore<RecordId, Asset>>;
pub type ProjectStore = Arc<InMemoryTenantStore<RecordId, Project>>;

pub const FLEET_MANAGER: &str = "fleet_manager";
pub const PROJECT_MANAGER: &str = "project_manager";
pub const ADMINISTRATOR: &str = "administrator";

pub struct Platform {
    pub config: CoreConfig,
    pub registry: Arc<PermissionRegistry>,
    pub roles: Arc<RolePolicy>,
    pub audit_log: Arc<InMemoryAuditLog>,
    pub asset_store: AssetStore,
    pub project_store: ProjectStore,
    pub bus: Arc<IntegrationEventBus>,
    pub fixed_assets: Arc<FixedAssetsModule<AssetStore>>,
    pub projects: ProjectsModule<ProjectStore>,
}

impl Platform {
    pub fn assemble(config: CoreConfig) -> anyhow::Result<Self> {
        Self::assemble_with(config, Arc::new(SystemClock), |_| Ok(()))
    }

    /// Like [`assemble`](Self::assemble), with an explicit clock and extra
    /// subscriptions registered after the built-in ones.
    pub fn assemble_with<F>(
        config: CoreConfig,
        clock: Arc<dyn Clock>,
        extra_subscriptions: F,
    ) -> anyhow::Result<Self>
    where
        F: FnOnce(&mut EventBusBuilder) -> Result<(), BusBuildError>,
    {
        let registry = Arc::new(permission_registry().context("registering permissions")?);
        let roles = Arc::new(role_policy(&registry).context("defining roles")?);

        let audit_log = Arc::new(InMemoryAuditLog::new());
        let sink: Arc<dyn AuditSink> = audit_log.clone();
        let audit = Arc::new(
            AuditRecorder::with_clock(sink, clock.clone()).with_policy(config.audit_failure_policy),
        );

        let asset_store: AssetStore = Arc::new(InMemoryTenantStore::new());
        let fixed_assets = Arc::new(
            FixedAssetsModule::new(&registry, asset_store.clone(), audit.clone())
                .context("building fixed assets module")?,
        );

        let mut builder = IntegrationEventBus::builder(config.bus_config());
        let assignments = Arc::new(ProjectAssignmentHandler::new(
            fixed_assets.clone(),
            registry.clone(),
        ));
        builder
            .subscribe::<ProjectResourceAssignedEvent, _>(assignments.clone())
            .and_then(|b| b.subscribe::<ProjectResourceReleasedEvent, _>(assignments))
            .context("subscribing fixed assets handlers")?;
        extra_subscriptions(&mut builder).context("registering extra subscriptions")?;
        let bus = Arc::new(builder.build());

        let project_store: ProjectStore = Arc::new(InMemoryTenantStore::new());
        let projects =
            ProjectsModule::new(&registry, project_store.clone(), audit, bus.clone(), clock)
            .context("building projects module")?;

        tracing::info!(
            permissions = registry.len(),
            subscriptions = bus.subscriptions().len(),
            dispatch_mode = ?config.dispatch_mode,
            audit_failure_policy = ?config.audit_failure_policy,
            "platform assembled"
        );

        Ok(Self {
            config,
            registry,
            roles,
            audit_log,
            asset_store,
            project_store,
            bus,
            fixed_assets,
            projects,
        })
    }

    /// Install the process-wide JSON subscriber using the configured filter.
    pub fn init_observability(&self) {
        modulerp_observability::init(&self.config.log_filter);
    }
}

fn permission_registry() -> Result<PermissionRegistry, modulerp_auth::RegistryError> {
    PermissionRegistry::new()
        .with_permissions(fixed_assets::PERMISSIONS.into_iter().chain(projects::PERMISSIONS))
}

fn role_policy(registry: &PermissionRegistry) -> Result<RolePolicy, modulerp_auth::RegistryError> {
    let mut policy = RolePolicy::new();
    policy.define(
        registry,
        FLEET_MANAGER,
        &[
            (fixed_assets::ASSET_READ, DataScope::Department),
            (fixed_assets::ASSET_CREATE, DataScope::Department),
            (fixed_assets::ASSET_UPDATE, DataScope::Department),
        ],
        Some("Manages the equipment of their department"),
    )?;
    policy.define(
        registry,
        PROJECT_MANAGER,
        &[
            (projects::PROJECT_READ, DataScope::Department),
            (projects::PROJECT_CREATE, DataScope::Department),
            (projects::PROJECT_UPDATE, DataScope::Department),
            (fixed_assets::ASSET_READ, DataScope::Branch),
        ],
        Some("Runs projects and borrows equipment"),
    )?;
    policy.define(
        registry,
        ADMINISTRATOR,
        &[("*", DataScope::Global)],
        Some("Full access within the tenant"),
    )?;
    Ok(policy)
}
