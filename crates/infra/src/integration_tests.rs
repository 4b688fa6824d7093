//! End-to-end tests across modules.
//!
//! Tests: Projects → authorize → commit → audit → bus → Fixed Assets handler
//!
//! Verifies:
//! - Handler failures are isolated and never undo the publisher's commit
//! - Events are published only after the change is committed and audited
//! - Tenant isolation holds for listing, audit and event handling

#[cfg(test)]
mod tests {
    use std::sync::{Arc, OnceLock};
    use std::time::Duration;

    use modulerp_audit::AuditAction;
    use modulerp_auth::{AuthzError, Principal};
    use modulerp_core::{DepartmentId, OwnershipMetadata, RecordId, SystemClock, TenantId, UserId};
    use modulerp_events::{
        CancellationSignal, CancellationSource, DispatchMode, DispatchState, HandlerFailed,
        ProjectResourceAssignedEvent,
    };

    use crate::config::CoreConfig;
    use crate::modules::ServiceError;
    use crate::modules::fixed_assets::{self, Asset, AssetStatus, PROJECT_HANDLER};
    use crate::modules::projects::{self, Project};
    use crate::platform::{ADMINISTRATOR, FLEET_MANAGER, PROJECT_MANAGER, Platform, ProjectStore};
    use crate::read_model::TenantStore;

    struct Site {
        tenant: TenantId,
        fleet: Principal,
        pm: Principal,
        project: Project,
        excavator: Asset,
    }

    fn site(platform: &Platform, project_name: &str) -> Site {
        let tenant = TenantId::new();
        let dept = DepartmentId::new();
        let fleet = Principal::builder(tenant, UserId::new())
            .department(dept)
            .role(&platform.roles, FLEET_MANAGER)
            .unwrap()
            .build();
        let pm = Principal::builder(tenant, UserId::new())
            .department(dept)
            .role(&platform.roles, PROJECT_MANAGER)
            .unwrap()
            .build();

        let excavator = platform
            .fixed_assets
            .register_asset(&fleet, "Excavator", OwnershipMetadata::new(tenant).in_department(dept))
            .unwrap()
            .record;
        let project = platform
            .projects
            .create_project(&pm, project_name, OwnershipMetadata::new(tenant).in_department(dept))
            .unwrap()
            .record;

        Site {
            tenant,
            fleet,
            pm,
            project,
            excavator,
        }
    }

    fn platform_with_failing_notifier(config: CoreConfig) -> Platform {
        Platform::assemble_with(config, Arc::new(SystemClock), |bus| {
            bus.subscribe_fn::<ProjectResourceAssignedEvent, _, _>("notifications", |_, _| async {
                Err::<(), _>(HandlerFailed::reason("mail relay unreachable"))
            })?;
            Ok(())
        })
        .unwrap()
    }

    #[tokio::test]
    async fn assignment_deploys_asset_despite_failing_sibling() {
        let platform = platform_with_failing_notifier(CoreConfig::default());
        let site = site(&platform, "Downtown Build");

        let change = platform
            .projects
            .assign_resource(&site.pm, site.project.id, site.excavator.id, &CancellationSignal::never())
            .await
            .unwrap();

        assert_eq!(change.publish.state, DispatchState::PartiallyFailed);
        assert_eq!(change.publish.succeeded(), 1);
        assert_eq!(change.publish.failed(), 1);
        assert_eq!(change.publish.outcomes[0].handler, PROJECT_HANDLER);
        assert_eq!(
            change.publish.outcomes[1].result,
            Err(HandlerFailed::reason("mail relay unreachable"))
        );

        let asset = platform.fixed_assets.get(&site.fleet, site.excavator.id).unwrap();
        assert_eq!(asset.location.as_deref(), Some("Project: Downtown Build"));
        assert_eq!(asset.status, AssetStatus::Deployed);

        let project = platform.projects.get(&site.pm, site.project.id).unwrap();
        assert_eq!(project.resources, vec![site.excavator.id]);

        // The handler's update is audited under the module's service identity.
        let history = platform.audit_log.entries_for_entity(
            site.tenant,
            fixed_assets::ENTITY_TYPE,
            &site.excavator.id.to_string(),
        );
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].action(), AuditAction::Update);
        assert_eq!(
            history[1].user_id(),
            Principal::service_user_id("fixed_assets")
        );
    }

    #[tokio::test]
    async fn release_brings_asset_back() {
        let platform = Platform::assemble(CoreConfig::default()).unwrap();
        let site = site(&platform, "Harbor Wall");
        let never = CancellationSignal::never();

        platform
            .projects
            .assign_resource(&site.pm, site.project.id, site.excavator.id, &never)
            .await
            .unwrap();
        let change = platform
            .projects
            .release_resource(&site.pm, site.project.id, site.excavator.id, &never)
            .await
            .unwrap();

        assert!(change.publish.is_delivered());
        assert!(change.project.resources.is_empty());
        let asset = platform.fixed_assets.get(&site.fleet, site.excavator.id).unwrap();
        assert_eq!(asset.location, None);
        assert_eq!(asset.status, AssetStatus::Available);
    }

    #[tokio::test]
    async fn handlers_read_back_the_committed_project() {
        let store_slot: Arc<OnceLock<ProjectStore>> = Arc::new(OnceLock::new());
        let slot = store_slot.clone();

        let platform = Platform::assemble_with(CoreConfig::default(), Arc::new(SystemClock), move |bus| {
            bus.subscribe_fn::<ProjectResourceAssignedEvent, _, _>("read_back", move |env, _| {
                let slot = slot.clone();
                async move {
                    let Some(store) = OnceLock::get(&slot) else {
                        return Err(HandlerFailed::reason("store not wired"));
                    };
                    let event = env.payload();
                    match store.get(event.tenant_id, &event.project_id) {
                        Some(project) if project.resources.contains(&event.asset_id) => Ok(()),
                        Some(_) => Err(HandlerFailed::reason("assignment not committed yet")),
                        None => Err(HandlerFailed::reason("project missing")),
                    }
                }
            })?;
            Ok(())
        })
        .unwrap();
        store_slot.set(platform.project_store.clone()).unwrap();

        let site = site(&platform, "Ring Road");
        let change = platform
            .projects
            .assign_resource(&site.pm, site.project.id, site.excavator.id, &CancellationSignal::never())
            .await
            .unwrap();

        assert!(change.publish.is_delivered(), "{:?}", change.publish.outcomes);

        // The audit entry for the change is in place too.
        let updates = platform
            .audit_log
            .entries_for_entity(site.tenant, projects::ENTITY_TYPE, &site.project.id.to_string())
            .into_iter()
            .filter(|e| e.action() == AuditAction::Update)
            .count();
        assert_eq!(updates, 1);
    }

    #[tokio::test]
    async fn listing_refuses_records_missing_required_ownership() {
        let platform = Platform::assemble(CoreConfig::default()).unwrap();
        let site = site(&platform, "Viaduct");
        let orphan = Asset {
            id: RecordId::new(),
            name: "Loader".into(),
            location: None,
            status: AssetStatus::Available,
            ownership: OwnershipMetadata::new(site.tenant),
        };
        platform.asset_store.upsert(site.tenant, orphan.id, orphan.clone());

        let admin = Principal::builder(site.tenant, UserId::new())
            .role(&platform.roles, ADMINISTRATOR)
            .unwrap()
            .build();

        assert!(matches!(
            platform.fixed_assets.list(&admin),
            Err(ServiceError::Authz(AuthzError::Configuration(_)))
        ));
        assert!(matches!(
            platform.fixed_assets.get(&admin, orphan.id),
            Err(ServiceError::Authz(AuthzError::Configuration(_)))
        ));
    }

    #[tokio::test]
    async fn slow_handler_times_out_in_concurrent_mode() {
        let config = CoreConfig {
            handler_timeout: Duration::from_millis(50),
            dispatch_mode: DispatchMode::Concurrent,
            ..CoreConfig::default()
        };
        let platform = Platform::assemble_with(config, Arc::new(SystemClock), |bus| {
            bus.subscribe_fn::<ProjectResourceAssignedEvent, _, _>("slow_report", |_, _| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<(), HandlerFailed>(())
            })?;
            Ok(())
        })
        .unwrap();
        let site = site(&platform, "Depot");

        let change = platform
            .projects
            .assign_resource(&site.pm, site.project.id, site.excavator.id, &CancellationSignal::never())
            .await
            .unwrap();

        assert_eq!(change.publish.outcomes[0].result, Ok(()));
        assert_eq!(
            change.publish.outcomes[1].result,
            Err(HandlerFailed::Timeout(Duration::from_millis(50)))
        );
        let asset = platform.fixed_assets.get(&site.fleet, site.excavator.id).unwrap();
        assert_eq!(asset.status, AssetStatus::Deployed);
    }

    #[tokio::test]
    async fn cancelled_publish_keeps_the_commit() {
        let platform = Platform::assemble(CoreConfig::default()).unwrap();
        let site = site(&platform, "Bridge");
        let source = CancellationSource::new();
        source.cancel();

        let change = platform
            .projects
            .assign_resource(&site.pm, site.project.id, site.excavator.id, &source.signal())
            .await
            .unwrap();

        assert_eq!(
            change.publish.outcomes[0].result,
            Err(HandlerFailed::Cancelled)
        );
        let project = platform.projects.get(&site.pm, site.project.id).unwrap();
        assert_eq!(project.resources, vec![site.excavator.id]);
        let asset = platform.fixed_assets.get(&site.fleet, site.excavator.id).unwrap();
        assert_eq!(asset.status, AssetStatus::Available);
    }

    #[tokio::test]
    async fn tenants_never_see_each_other() {
        let platform = Platform::assemble(CoreConfig::default()).unwrap();
        let a = site(&platform, "Tower A");
        let b = site(&platform, "Tower B");
        let admin_a = Principal::builder(a.tenant, UserId::new())
            .role(&platform.roles, ADMINISTRATOR)
            .unwrap()
            .build();

        let assets: Vec<RecordId> = platform.fixed_assets.list(&admin_a).unwrap().iter().map(|x| x.id).collect();
        assert_eq!(assets, vec![a.excavator.id]);
        let projects: Vec<RecordId> = platform.projects.list(&admin_a).unwrap().iter().map(|p| p.id).collect();
        assert_eq!(projects, vec![a.project.id]);

        // Tenant A's administrator cannot touch tenant B's project.
        assert!(
            platform
                .projects
                .assign_resource(&admin_a, b.project.id, a.excavator.id, &CancellationSignal::never())
                .await
                .is_err()
        );

        assert!(
            platform
                .audit_log
                .entries_for_tenant(a.tenant)
                .iter()
                .all(|e| e.tenant_id() == a.tenant)
        );
        assert_eq!(platform.audit_log.entries_for_tenant(b.tenant).len(), 2);
    }

    #[tokio::test]
    async fn event_for_unknown_asset_fails_only_its_handler() {
        let platform = Platform::assemble(CoreConfig::default()).unwrap();
        let site = site(&platform, "Quay");

        // An asset id from another tenant is invisible to this tenant's handler.
        let foreign = site_asset_elsewhere(&platform);
        let change = platform
            .projects
            .assign_resource(&site.pm, site.project.id, foreign, &CancellationSignal::never())
            .await
            .unwrap();

        assert_eq!(change.publish.failed(), 1);
        assert!(matches!(
            &change.publish.outcomes[0].result,
            Err(HandlerFailed::Reason(reason)) if reason.contains("not found")
        ));
        assert_eq!(change.project.resources, vec![foreign]);
    }

    fn site_asset_elsewhere(platform: &Platform) -> RecordId {
        site(platform, "Elsewhere").excavator.id
    }

    #[test]
    fn assembly_registers_every_subscription_once() {
        let platform = Platform::assemble(
            CoreConfig::from_lookup(|key| match key {
                "MODULERP_DISPATCH_MODE" => Some("concurrent".to_string()),
                _ => None,
            })
            .unwrap(),
        )
        .unwrap();

        assert_eq!(platform.bus.config().mode, DispatchMode::Concurrent);
        let subs = platform.bus.subscriptions();
        assert_eq!(subs.len(), 2);
        assert!(subs.iter().all(|s| s.handler == PROJECT_HANDLER));
        assert_eq!(platform.bus.handler_count("projects.resource.assigned"), 1);
        assert_eq!(platform.bus.handler_count("projects.resource.released"), 1);
    }

    #[test]
    fn duplicate_extra_subscription_fails_assembly() {
        let result = Platform::assemble_with(CoreConfig::default(), Arc::new(SystemClock), |bus| {
            bus.subscribe_fn::<ProjectResourceAssignedEvent, _, _>(PROJECT_HANDLER, |_, _| async {
                Ok::<(), HandlerFailed>(())
            })?;
            Ok(())
        });
        assert!(result.is_err());
    }
}
