use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use warden_core::engine::{AuthzError, PermissionSpec, RoleProperties, SnapshotReader, Statement, TableRef};
use warden_core::permission::Permission;
use warden_core::resource::Resource;
use warden_core::role::Role;
use warden_core::validation::ValidationError;
use warden_server::cache::PermissionCache;
use warden_server::error::ApiError;
use warden_server::metrics::Metrics;
use warden_server::service::{AuthService, Outcome};
use warden_storage::{InMemoryStore, PermissionStore, StorageError};

const REFRESH_INTERVAL: Duration = Duration::from_millis(20);

struct Harness {
    service: Arc<AuthService<InMemoryStore>>,
    refresher: JoinHandle<()>,
}

impl Harness {
    async fn start() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let metrics = Arc::new(Metrics::new());
        let cache = Arc::new(PermissionCache::new(Arc::clone(&store)).with_metrics(Arc::clone(&metrics)));
        let service = Arc::new(AuthService::new(store, Arc::clone(&cache), metrics));
        service.ensure_superuser("root", Some("rootpw")).await.unwrap();
        let refresher = cache.spawn_refresh_task(REFRESH_INTERVAL);

        let harness = Self { service, refresher };
        harness.settle().await;
        harness
    }

    /// Waits until the cache has caught up with the store.
    async fn settle(&self) {
        let target = self.service.store().version().await.unwrap();
        for _ in 0..200 {
            if self
                .service
                .cache()
                .current()
                .is_some_and(|s| s.version() >= target)
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("cache did not reach store version {target}");
    }

    async fn root(&self, statement: Statement) {
        self.service.execute("root", &statement).await.unwrap();
        self.settle().await;
    }

    async fn run(&self, principal: &str, statement: Statement) -> Result<Outcome, ApiError> {
        self.service.execute(principal, &statement).await
    }

    async fn create_user(&self, name: &str) {
        self.root(Statement::CreateRole {
            role: name.to_string(),
            properties: RoleProperties {
                login: Some(true),
                superuser: None,
                password: Some(format!("{name}-pw")),
            },
        })
        .await;
    }

    async fn create_role(&self, name: &str, superuser: bool) {
        self.root(Statement::CreateRole {
            role: name.to_string(),
            properties: RoleProperties {
                superuser: Some(superuser),
                ..RoleProperties::default()
            },
        })
        .await;
    }

    async fn create_keyspace(&self, name: &str) {
        self.root(Statement::CreateKeyspace {
            keyspace: name.to_string(),
        })
        .await;
    }

    async fn create_table(&self, keyspace: &str, table: &str) {
        self.root(Statement::CreateTable(TableRef::new(keyspace, table)))
            .await;
    }

    async fn grant_role(&self, granted: &str, recipient: &str) {
        self.root(Statement::GrantRole {
            granted: granted.to_string(),
            recipient: recipient.to_string(),
        })
        .await;
    }

    async fn grant(&self, permissions: impl Into<PermissionSpec>, resource: Resource, grantee: &str) {
        self.root(Statement::GrantPermission {
            permissions: permissions.into(),
            resource,
            grantee: grantee.to_string(),
        })
        .await;
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.refresher.abort();
    }
}

fn select(keyspace: &str, table: &str) -> Statement {
    Statement::Select(TableRef::new(keyspace, table))
}

fn assert_unauthorized(result: Result<Outcome, ApiError>, expected: &str) {
    match result {
        Err(err @ ApiError::Authz(AuthzError::Unauthorized { .. })) => {
            assert_eq!(err.to_string(), expected)
        }
        other => panic!("expected Unauthorized, got {other:?}"),
    }
}

#[tokio::test]
async fn keyspace_grant_then_revoke_is_enforced_after_refresh() {
    let h = Harness::start().await;
    h.create_user("u").await;
    h.create_keyspace("ks").await;

    h.grant(Permission::Select, Resource::keyspace("ks"), "u").await;
    assert_eq!(h.run("u", select("ks", "t")).await.unwrap(), Outcome::Done);

    h.root(Statement::RevokePermission {
        permissions: Permission::Select.into(),
        resource: Resource::keyspace("ks"),
        revokee: "u".to_string(),
    })
    .await;

    assert_unauthorized(
        h.run("u", select("ks", "t")).await,
        "User u has no SELECT permission on <table ks.t> or any of its parents",
    );
}

#[tokio::test]
async fn revocation_is_visible_within_one_interval() {
    let h = Harness::start().await;
    h.create_user("u").await;
    h.create_keyspace("ks").await;
    h.grant(Permission::Select, Resource::keyspace("ks"), "u").await;

    h.service
        .store()
        .revoke("u", &Resource::keyspace("ks"), Permission::Select)
        .await
        .unwrap();
    tokio::time::sleep(REFRESH_INTERVAL * 5).await;

    assert!(h.run("u", select("ks", "t")).await.is_err());
}

#[tokio::test]
async fn all_keyspaces_grant_covers_keyspaces_created_later() {
    let h = Harness::start().await;
    h.create_user("u").await;
    h.grant(PermissionSpec::All, Resource::AllKeyspaces, "u").await;

    h.root(Statement::CreateKeyspace {
        keyspace: "later".to_string(),
    })
    .await;

    assert!(
        h.run("u", Statement::CreateTable(TableRef::new("later", "t")))
            .await
            .is_ok()
    );
    assert!(h.run("u", select("later", "t")).await.is_ok());
}

#[tokio::test]
async fn dropped_and_recreated_keyspace_carries_no_old_grants() {
    let h = Harness::start().await;
    h.create_user("alice").await;
    h.create_user("bob").await;
    h.grant(Permission::Create, Resource::AllKeyspaces, "alice").await;

    h.run(
        "alice",
        Statement::CreateKeyspace {
            keyspace: "ks".to_string(),
        },
    )
    .await
    .unwrap();
    h.run("alice", Statement::CreateTable(TableRef::new("ks", "t")))
        .await
        .unwrap();
    h.settle().await;
    h.run(
        "alice",
        Statement::GrantPermission {
            permissions: Permission::Select.into(),
            resource: Resource::table("ks", "t"),
            grantee: "bob".to_string(),
        },
    )
    .await
    .unwrap();
    h.settle().await;
    assert!(h.run("bob", select("ks", "t")).await.is_ok());

    h.run(
        "alice",
        Statement::DropKeyspace {
            keyspace: "ks".to_string(),
        },
    )
    .await
    .unwrap();
    h.root(Statement::CreateKeyspace {
        keyspace: "ks".to_string(),
    })
    .await;

    assert!(h.run("bob", select("ks", "t")).await.is_err());
    assert_unauthorized(
        h.run("alice", Statement::AlterTable(TableRef::new("ks", "t")))
            .await,
        "User alice has no ALTER permission on <table ks.t> or any of its parents",
    );
    assert!(
        h.service
            .store()
            .list_permissions(Some("bob"))
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn permissions_flow_through_role_membership() {
    let h = Harness::start().await;
    h.create_user("alice").await;
    h.create_keyspace("ks").await;
    h.root(Statement::CreateRole {
        role: "readers".to_string(),
        properties: RoleProperties::default(),
    })
    .await;
    h.grant(Permission::Select, Resource::keyspace("ks"), "readers")
        .await;
    assert!(h.run("alice", select("ks", "t")).await.is_err());

    h.root(Statement::GrantRole {
        granted: "readers".to_string(),
        recipient: "alice".to_string(),
    })
    .await;
    assert!(h.run("alice", select("ks", "t")).await.is_ok());

    h.root(Statement::RevokeRole {
        granted: "readers".to_string(),
        recipient: "alice".to_string(),
    })
    .await;
    assert!(h.run("alice", select("ks", "t")).await.is_err());
}

#[tokio::test]
async fn membership_cycles_are_rejected() {
    let h = Harness::start().await;
    for name in ["a", "b", "c"] {
        h.root(Statement::CreateRole {
            role: name.to_string(),
            properties: RoleProperties::default(),
        })
        .await;
    }
    h.root(Statement::GrantRole {
        granted: "a".to_string(),
        recipient: "b".to_string(),
    })
    .await;
    h.root(Statement::GrantRole {
        granted: "b".to_string(),
        recipient: "c".to_string(),
    })
    .await;

    let err = h
        .run(
            "root",
            Statement::GrantRole {
                granted: "c".to_string(),
                recipient: "a".to_string(),
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ApiError::Storage(StorageError::Validation(ValidationError::CyclicMembership { .. }))
    ));
    assert_eq!(err.to_string(), "storage error: c is a member of a");
}

#[tokio::test]
async fn users_cannot_change_their_own_superuser_status() {
    let h = Harness::start().await;
    h.create_user("alice").await;
    h.root(Statement::CreateRole {
        role: "admins".to_string(),
        properties: RoleProperties {
            superuser: Some(true),
            ..RoleProperties::default()
        },
    })
    .await;
    h.root(Statement::GrantRole {
        granted: "admins".to_string(),
        recipient: "alice".to_string(),
    })
    .await;

    let err = h
        .run(
            "alice",
            Statement::AlterRole {
                role: "admins".to_string(),
                properties: RoleProperties {
                    superuser: Some(false),
                    ..RoleProperties::default()
                },
            },
        )
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "Unauthorized. You aren't allowed to alter your own superuser status or that of a role granted to you"
    );

    let err = h
        .run(
            "root",
            Statement::AlterRole {
                role: "root".to_string(),
                properties: RoleProperties {
                    superuser: Some(false),
                    ..RoleProperties::default()
                },
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Authz(AuthzError::SelfEscalationDenied)));
}

#[tokio::test]
async fn non_superuser_cannot_create_superuser_even_with_create_permission() {
    let h = Harness::start().await;
    h.create_user("alice").await;
    h.grant(Permission::Create, Resource::AllRoles, "alice").await;

    let err = h
        .run(
            "alice",
            Statement::CreateRole {
                role: "sneaky".to_string(),
                properties: RoleProperties {
                    superuser: Some(true),
                    ..RoleProperties::default()
                },
            },
        )
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "Only superusers are allowed to create a role with superuser status"
    );
    assert!(h.service.store().get_role("sneaky").await.unwrap().is_none());
}

#[tokio::test]
async fn dropped_role_loses_everything() {
    let h = Harness::start().await;
    h.create_user("alice").await;
    h.grant(Permission::Select, Resource::AllKeyspaces, "alice").await;

    h.root(Statement::DropRole {
        role: "alice".to_string(),
    })
    .await;

    assert!(h.run("alice", select("ks", "t")).await.is_err());
    assert!(
        h.service
            .store()
            .list_permissions(None)
            .await
            .unwrap()
            .iter()
            .all(|g| g.role != "alice" && g.resource != Resource::role("alice"))
    );
}

#[tokio::test]
async fn prepared_statement_follows_current_grants() {
    let h = Harness::start().await;
    h.create_user("u").await;
    h.create_keyspace("ks").await;
    h.create_table("ks", "t").await;
    let prepared = h.service.prepare(select("ks", "t")).unwrap();

    assert!(h.service.execute_prepared("u", &prepared).await.is_err());

    h.grant(Permission::Select, Resource::table("ks", "t"), "u").await;
    assert!(h.service.execute_prepared("u", &prepared).await.is_ok());
}

#[tokio::test]
async fn login_uses_stored_password_hash() {
    let h = Harness::start().await;
    h.create_user("alice").await;

    assert!(h.service.login("alice", "alice-pw").await.is_ok());
    assert!(h.service.login("root", "rootpw").await.unwrap().is_superuser);

    let err = h.service.login("alice", "nope").await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "Provided username alice and/or password are incorrect"
    );
}

#[tokio::test]
async fn listing_requires_describe_unless_listing_own() {
    let h = Harness::start().await;
    h.create_user("alice").await;
    h.create_user("bob").await;

    assert!(
        h.run(
            "alice",
            Statement::ListPermissions {
                of: Some("alice".to_string()),
                resource: None,
            },
        )
        .await
        .is_ok()
    );
    assert_unauthorized(
        h.run(
            "alice",
            Statement::ListPermissions {
                of: Some("bob".to_string()),
                resource: None,
            },
        )
        .await,
        "User alice has no DESCRIBE permission on <all roles> or any of its parents",
    );

    h.grant(Permission::Describe, Resource::AllRoles, "alice").await;
    assert!(matches!(
        h.run("alice", Statement::ListRoles { of: None }).await,
        Ok(Outcome::Roles(roles)) if roles.len() == 3
    ));
}

#[tokio::test]
async fn create_on_all_keyspaces_does_not_take_over_existing_keyspace() {
    let h = Harness::start().await;
    h.create_user("bob").await;
    h.create_keyspace("payroll").await;
    h.grant(Permission::Create, Resource::AllKeyspaces, "bob").await;

    let err = h
        .run(
            "bob",
            Statement::CreateKeyspace {
                keyspace: "payroll".to_string(),
            },
        )
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "storage error: <keyspace payroll> already exists");
    h.settle().await;
    assert_unauthorized(
        h.run(
            "bob",
            Statement::DropKeyspace {
                keyspace: "payroll".to_string(),
            },
        )
        .await,
        "User bob has no DROP permission on <keyspace payroll> or any of its parents",
    );
    assert!(
        h.service
            .store()
            .permissions_of("bob", &Resource::keyspace("payroll"))
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn grants_on_unknown_objects_are_refused() {
    let h = Harness::start().await;
    h.create_user("bob").await;
    h.create_keyspace("ks").await;

    for resource in [Resource::keyspace("never_created"), Resource::table("ks", "missing")] {
        let err = h
            .run(
                "root",
                Statement::GrantPermission {
                    permissions: Permission::Select.into(),
                    resource: resource.clone(),
                    grantee: "bob".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApiError::Storage(StorageError::ObjectNotFound(ref r)) if *r == resource
        ));
    }
    assert!(
        h.service
            .store()
            .list_permissions(Some("bob"))
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn grant_all_on_table_includes_create() {
    let h = Harness::start().await;
    h.create_user("u").await;
    h.create_keyspace("ks").await;
    h.create_table("ks", "t").await;

    h.grant(PermissionSpec::All, Resource::table("ks", "t"), "u").await;

    let held = h
        .service
        .store()
        .permissions_of("u", &Resource::table("ks", "t"))
        .await
        .unwrap();
    assert_eq!(held.len(), 6);
    assert!(held.contains(Permission::Create));
}

#[tokio::test]
async fn superuser_status_of_transitively_granted_role_cannot_be_changed() {
    let h = Harness::start().await;
    h.create_user("alice").await;
    h.create_role("grandparent", true).await;
    h.create_role("parent", false).await;
    h.grant_role("grandparent", "parent").await;
    h.grant_role("parent", "alice").await;

    // alice is a superuser through grandparent, and still may not touch it
    for target in ["grandparent", "parent", "alice"] {
        let err = h
            .run(
                "alice",
                Statement::AlterRole {
                    role: target.to_string(),
                    properties: RoleProperties {
                        superuser: Some(false),
                        ..RoleProperties::default()
                    },
                },
            )
            .await
            .unwrap_err();
        assert!(
            matches!(err, ApiError::Authz(AuthzError::SelfEscalationDenied)),
            "{target}: {err}"
        );
    }
    assert!(
        h.service
            .store()
            .get_role("grandparent")
            .await
            .unwrap()
            .unwrap()
            .is_superuser
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_disjoint_grants_do_not_interfere() {
    let h = Harness::start().await;
    h.create_keyspace("ks").await;
    let names: Vec<String> = (0..12).map(|i| format!("user{i}")).collect();
    for name in &names {
        h.create_role(name, false).await;
    }

    let mut tasks = Vec::new();
    for (i, name) in names.iter().cloned().enumerate() {
        let service = Arc::clone(&h.service);
        let permission = if i % 2 == 0 {
            Permission::Select
        } else {
            Permission::Modify
        };
        tasks.push(tokio::spawn(async move {
            service
                .execute(
                    "root",
                    &Statement::GrantPermission {
                        permissions: permission.into(),
                        resource: Resource::keyspace("ks"),
                        grantee: name,
                    },
                )
                .await
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), Outcome::Done);
    }
    h.settle().await;

    for (i, name) in names.iter().enumerate() {
        let (allowed, denied) = if i % 2 == 0 {
            (select("ks", "t"), Statement::Insert(TableRef::new("ks", "t")))
        } else {
            (Statement::Insert(TableRef::new("ks", "t")), select("ks", "t"))
        };
        assert!(h.run(name, allowed).await.is_ok(), "{name}");
        assert!(h.run(name, denied).await.is_err(), "{name}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn decisions_stay_consistent_while_snapshots_swap() {
    let h = Harness::start().await;
    h.create_user("alice").await;
    h.create_keyspace("ks").await;
    h.grant(Permission::Select, Resource::keyspace("ks"), "alice").await;
    let start_generation = h.service.cache().current().unwrap().generation();

    let store = Arc::clone(h.service.store());
    let cache = Arc::clone(h.service.cache());
    let churn = tokio::spawn(async move {
        for i in 0..100 {
            let name = format!("churn{i}");
            store.create_role(Role::new(&name), None).await.unwrap();
            store
                .grant(&name, &Resource::keyspace("ks"), Permission::Modify)
                .await
                .unwrap();
            cache.refresh_once().await.unwrap();
            store.drop_role(&name).await.unwrap();
            cache.refresh_once().await.unwrap();
        }
    });

    for _ in 0..500 {
        assert!(h.run("alice", select("ks", "t")).await.is_ok());
        assert!(
            h.run("alice", Statement::Insert(TableRef::new("ks", "t")))
                .await
                .is_err()
        );
        tokio::task::yield_now().await;
    }
    churn.await.unwrap();

    assert!(h.service.cache().current().unwrap().generation() > start_generation);
    assert!(h.run("alice", select("ks", "t")).await.is_ok());
}
