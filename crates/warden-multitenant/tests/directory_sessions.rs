//! Tenant isolation for sessions opened through the directory

use assert_matches::assert_matches;
use warden_authorization::{AuthorizationResult, ConstraintEngine, ResourceModel, ResourceRegistry};
use warden_core::{ProviderConfig, TenantId, WardenError};
use warden_identity::{IdentityManager, InMemoryDirectory};
use warden_multitenant::{TenantConstraintProvider, TENANT, TENANT_RESTRICTED};

struct Project {
    owner: TenantId,
}

#[test]
fn profile_tenancy_decides_access() {
    let directory = InMemoryDirectory::new();
    directory.initialize(&ProviderConfig::new()).unwrap();
    let acme = directory.create_tenant(TenantId::from("acme"), "Acme").unwrap();
    let globex = directory.create_tenant(TenantId::from("globex"), "Globex").unwrap();
    let alice = directory.create_subject("alice").unwrap();
    let at_acme = alice.create_membership(&acme).join().unwrap();
    let at_globex = alice.create_membership(&globex).join().unwrap();
    let session = alice.open_session("login").unwrap();

    let registry = ResourceRegistry::new();
    registry
        .register(
            ResourceModel::builder::<Project>()
                .named("Project")
                .accessor("owner", &[TENANT], |p| p.owner.clone())
                .action("archive", &[TENANT_RESTRICTED])
                .build()
                .unwrap(),
        )
        .unwrap();
    let archive = registry.action::<Project>("archive").unwrap();

    let engine = ConstraintEngine::new();
    engine.install(TenantConstraintProvider::new()).unwrap();
    engine.initialize(&ProviderConfig::new()).unwrap();

    let project = Project {
        owner: acme.id().clone(),
    };

    assert_eq!(
        engine.evaluate(&archive, &*session, &project).unwrap(),
        AuthorizationResult::Denied
    );

    session.change_profile(&at_acme).unwrap();
    assert!(engine.authorize(&archive, &*session, &project).is_ok());

    session.change_profile(&at_globex).unwrap();
    assert_matches!(
        engine.authorize(&archive, &*session, &project),
        Err(WardenError::AccessDenied { .. })
    );

    engine.shutdown();
    directory.shutdown();
}
