//! Projects: publisher of resource assignment events.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use modulerp_audit::{AuditAction, AuditPersistFailure};
use modulerp_auth::{Permission, PermissionRegistry, Principal, RegistryError, build_scope_filter, require};
use modulerp_core::{Clock, DomainError, Ownable, OwnershipMetadata, OwnershipRequirements, RecordId};
use modulerp_events::{
    CancellationSignal, IntegrationEventBus, ProjectResourceAssignedEvent,
    ProjectResourceReleasedEvent, PublishResult,
};

use super::{Committed, ServiceError, SharedAuditRecorder, snapshot};
use crate::read_model::TenantStore;

pub const ENTITY_TYPE: &str = "projects.project";

pub const PROJECT_READ: &str = "projects.project.read";
pub const PROJECT_CREATE: &str = "projects.project.create";
pub const PROJECT_UPDATE: &str = "projects.project.update";

pub const PERMISSIONS: [&str; 3] = [PROJECT_READ, PROJECT_CREATE, PROJECT_UPDATE];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: RecordId,
    pub name: String,
    /// Assets currently assigned, in assignment order.
    pub resources: Vec<RecordId>,
    pub ownership: OwnershipMetadata,
}

impl Ownable for Project {
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

/// Result of assigning or releasing a resource.
///
/// The project change is committed regardless of `publish`; handler failures
/// are reported there and never undo it.
#[derive(Debug, Clone)]
pub struct ResourceChange {
    pub project: Project,
    pub audit_warning: Option<AuditPersistFailure>,
    pub publish: PublishResult,
}

pub struct ProjectsModule<S> {
    store: S,
    audit: SharedAuditRecorder,
    bus: Arc<IntegrationEventBus>,
    clock: Arc<dyn Clock>,
    read: Permission,
    create: Permission,
    update: Permission,
}

impl<S> ProjectsModule<S>
where
    S: TenantStore<RecordId, Project>,
{
    pub fn new(
        registry: &PermissionRegistry,
        store: S,
        audit: SharedAuditRecorder,
        bus: Arc<IntegrationEventBus>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, RegistryError> {
        Ok(Self {
            store,
            audit,
            bus,
            clock,
            read: registry.resolve(PROJECT_READ)?,
            create: registry.resolve(PROJECT_CREATE)?,
            update: registry.resolve(PROJECT_UPDATE)?,
        })
    }

    pub fn create_project(
        &self,
        principal: &Principal,
        name: &str,
        ownership: OwnershipMetadata,
    ) -> Result<Committed<Project>, ServiceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("project name cannot be empty").into());
        }

        let project = Project {
            id: RecordId::new(),
            name: name.to_string(),
            resources: Vec::new(),
            ownership,
        };
        require(principal, &self.create, &project)?;

        self.store.upsert(principal.tenant_id(), project.id, project.clone());
        let receipt = self.audit.record(
            AuditAction::Insert,
            ENTITY_TYPE,
            project.id,
            principal,
            None,
            snapshot(&project),
        );

        Ok(Committed {
            record: project,
            audit_warning: receipt.warning,
        })
    }

    pub fn get(&self, principal: &Principal, project_id: RecordId) -> Result<Project, ServiceError> {
        let project = self
            .store
            .get(principal.tenant_id(), &project_id)
            .ok_or_else(|| DomainError::not_found(format!("project {project_id}")))?;
        require(principal, &self.read, &project)?;
        Ok(project)
    }

    pub fn list(&self, principal: &Principal) -> Result<Vec<Project>, ServiceError> {
        let filter = build_scope_filter(principal, &self.read);
        Ok(self.store.list_scoped(&filter)?)
    }

    /// Assign an asset to a project, then announce it.
    ///
    /// The assignment is committed and audited before
    /// `projects.resource.assigned` is published.
    pub async fn assign_resource(
        &self,
        principal: &Principal,
        project_id: RecordId,
        asset_id: RecordId,
        cancel: &CancellationSignal,
    ) -> Result<ResourceChange, ServiceError> {
        let (project, audit_warning) = self.change_resources(principal, project_id, |project| {
            if project.resources.contains(&asset_id) {
                return Err(DomainError::conflict(format!(
                    "asset {asset_id} is already assigned to project {}",
                    project.id
                )));
            }
            project.resources.push(asset_id);
            Ok(())
        })?;

        let event = ProjectResourceAssignedEvent {
            tenant_id: principal.tenant_id(),
            project_id,
            project_name: project.name.clone(),
            asset_id,
            assigned_by: principal.user_id(),
            occurred_at: self.clock.now(),
        };
        let publish = self.bus.publish_with_cancel(event, cancel).await;

        Ok(ResourceChange {
            project,
            audit_warning,
            publish,
        })
    }

    /// Release an asset from a project, then announce it.
    pub async fn release_resource(
        &self,
        principal: &Principal,
        project_id: RecordId,
        asset_id: RecordId,
        cancel: &CancellationSignal,
    ) -> Result<ResourceChange, ServiceError> {
        let (project, audit_warning) = self.change_resources(principal, project_id, |project| {
            let before = project.resources.len();
            project.resources.retain(|id| *id != asset_id);
            if project.resources.len() == before {
                return Err(DomainError::conflict(format!(
                    "asset {asset_id} is not assigned to project {}",
                    project.id
                )));
            }
            Ok(())
        })?;

        let event = ProjectResourceReleasedEvent {
            tenant_id: principal.tenant_id(),
            project_id,
            asset_id,
            released_by: principal.user_id(),
            occurred_at: self.clock.now(),
        };
        let publish = self.bus.publish_with_cancel(event, cancel).await;

        Ok(ResourceChange {
            project,
            audit_warning,
            publish,
        })
    }

    fn change_resources<F>(
        &self,
        principal: &Principal,
        project_id: RecordId,
        apply: F,
    ) -> Result<(Project, Option<AuditPersistFailure>), ServiceError>
    where
        F: FnOnce(&mut Project) -> Result<(), DomainError>,
    {
        let (before, after) = self
            .store
            .update_with(principal.tenant_id(), &project_id, |project| {
                require(principal, &self.update, &*project)?;
                let before = project.clone();
                apply(&mut *project)?;
                Ok::<_, ServiceError>((before, project.clone()))
            })
            .ok_or_else(|| DomainError::not_found(format!("project {project_id}")))??;

        let receipt = self.audit.record(
            AuditAction::Update,
            ENTITY_TYPE,
            project_id,
            principal,
            snapshot(&before),
            snapshot(&after),
        );

        Ok((after, receipt.warning))
    }
}
