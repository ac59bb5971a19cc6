use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};

use warden_core::engine::{Enforcer, Statement, TableRef};
use warden_core::graph::RoleGraph;
use warden_core::permission::{Permission, PermissionGrant};
use warden_core::resource::Resource;
use warden_core::role::Role;
use warden_core::snapshot::AuthSnapshot;

type StaticEnforcer = Enforcer<Option<Arc<AuthSnapshot>>>;

fn make_enforcer(roles: Vec<Role>, graph: RoleGraph, grants: Vec<PermissionGrant>) -> StaticEnforcer {
    let snapshot = AuthSnapshot::new(1, roles, graph, grants);
    Enforcer::new(Arc::new(Some(Arc::new(snapshot))))
}

fn direct_grant() -> StaticEnforcer {
    make_enforcer(
        vec![Role::new("alice")],
        RoleGraph::new(),
        vec![PermissionGrant::new(
            "alice",
            Resource::table("ks", "t"),
            Permission::Select.into(),
        )],
    )
}

fn wildcard_grant() -> StaticEnforcer {
    make_enforcer(
        vec![Role::new("alice")],
        RoleGraph::new(),
        vec![PermissionGrant::new(
            "alice",
            Resource::AllKeyspaces,
            Permission::Select.into(),
        )],
    )
}

// alice inherits from role0 through a chain of `depth` roles; only the last holds the grant.
fn role_chain(depth: usize) -> StaticEnforcer {
    let mut roles = vec![Role::new("alice")];
    let mut graph = RoleGraph::new();
    let mut previous = "alice".to_string();
    for i in 0..depth {
        let name = format!("role{i}");
        roles.push(Role::new(&name));
        graph.grant_role(&name, &previous).unwrap();
        previous = name;
    }

    make_enforcer(
        roles,
        graph,
        vec![PermissionGrant::new(
            previous,
            Resource::keyspace("ks"),
            Permission::Select.into(),
        )],
    )
}

fn wide_grants(tables: usize) -> StaticEnforcer {
    let grants = (0..tables)
        .map(|i| {
            PermissionGrant::new(
                "alice",
                Resource::table("ks", format!("t{i}")),
                Permission::Modify.into(),
            )
        })
        .collect();
    make_enforcer(vec![Role::new("alice")], RoleGraph::new(), grants)
}

fn bench_direct_grant(c: &mut Criterion) {
    let enforcer = direct_grant();
    let target = Resource::table("ks", "t");

    c.bench_function("authorize_direct_grant", |b| {
        b.iter(|| {
            assert!(enforcer.is_allowed("alice", Permission::Select, &target));
        });
    });
}

fn bench_wildcard_grant(c: &mut Criterion) {
    let enforcer = wildcard_grant();
    let target = Resource::table("ks", "t");

    c.bench_function("authorize_wildcard_grant", |b| {
        b.iter(|| {
            assert!(enforcer.is_allowed("alice", Permission::Select, &target));
        });
    });
}

fn bench_role_chain_8(c: &mut Criterion) {
    let enforcer = role_chain(8);
    let target = Resource::table("ks", "t");

    c.bench_function("authorize_role_chain_8", |b| {
        b.iter(|| {
            assert!(enforcer.is_allowed("alice", Permission::Select, &target));
        });
    });
}

fn bench_denial_with_1000_rows(c: &mut Criterion) {
    let enforcer = wide_grants(1000);
    let target = Resource::table("other", "t");

    c.bench_function("authorize_denial_1000_rows", |b| {
        b.iter(|| {
            assert!(!enforcer.is_allowed("alice", Permission::Modify, &target));
        });
    });
}

fn bench_statement(c: &mut Criterion) {
    let enforcer = wildcard_grant();
    let statement = Statement::Select(TableRef::new("ks", "t"));

    c.bench_function("authorize_statement_select", |b| {
        b.iter(|| {
            assert!(enforcer.authorize_statement("alice", &statement).is_ok());
        });
    });
}

criterion_group!(
    benches,
    bench_direct_grant,
    bench_wildcard_grant,
    bench_role_chain_8,
    bench_denial_with_1000_rows,
    bench_statement,
);
criterion_main!(benches);
