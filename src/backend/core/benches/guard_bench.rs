//! Benchmarks for access guard evaluation over in-memory stores.
use axum::http::Method;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use covenant_core::rbac::{
    AccessControlGuard, BuiltinRole, EndpointAccess, EndpointPolicy, GuardRequest, GuardSettings,
    GuardStores, InMemoryAuditSink, InMemoryCounterStore, InMemoryDirectory, MatterRecord,
    Membership, MembershipStatus, PolicyRegistry, Principal, RateLimitSettings,
};

fn guard(rate_limit: RateLimitSettings) -> AccessControlGuard {
    let directory = Arc::new(InMemoryDirectory::new());
    directory.add_membership(Membership::active("u1", "o1", BuiltinRole::Admin.to_role()));
    directory.add_matter(MatterRecord::new("m1", "o1").with_member("u1", MembershipStatus::Active));
    let stores = GuardStores::new(directory.clone(), directory, Arc::new(InMemoryCounterStore::new()), Arc::new(InMemoryAuditSink::new()));
    AccessControlGuard::new(stores, GuardSettings { rate_limit, ..Default::default() })
}

fn request() -> GuardRequest {
    GuardRequest::new(Method::GET, "/api/v1/orgs/o1/matters/m1")
        .with_principal(Principal::new("u1", "o1"))
        .with_path_param("orgId", "o1")
        .with_path_param("matterId", "m1")
}

fn bench_guard_policies(c: &mut Criterion) {
    let mut group = c.benchmark_group("guard_evaluate");
    let rt = tokio::runtime::Runtime::new().unwrap();
    let guard = guard(RateLimitSettings { enabled: false, ..Default::default() });
    let req = request();
    let policies = [
        ("empty", EndpointPolicy::default()),
        ("roles", EndpointPolicy::builder().roles(["ADMIN", "MANAGER"]).build()),
        ("org", EndpointPolicy::builder().roles(["ADMIN"]).org_required().build()),
        ("matter", EndpointPolicy::builder().org_required().matter_required().build()),
        ("audited", EndpointPolicy::builder().roles(["ADMIN"]).org_required().matter_required().audit().build()),
    ];
    for (label, policy) in policies {
        let access = EndpointAccess::Protected(policy);
        group.bench_with_input(BenchmarkId::from_parameter(label), &access, |b, access| {
            b.to_async(&rt).iter(|| async { black_box(guard.evaluate(&req, Some(access)).await.is_ok()) });
        });
    }
    group.finish();
}

fn bench_guard_rate_limited(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let guard = guard(RateLimitSettings { requests_per_window: u64::MAX, ..Default::default() });
    let req = request();
    let access = EndpointAccess::Protected(EndpointPolicy::builder().roles(["ADMIN"]).build());
    c.bench_function("guard_evaluate_with_counter", |b| {
        b.to_async(&rt).iter(|| async { black_box(guard.evaluate(&req, Some(&access)).await.is_ok()) });
    });
}

fn bench_registry_lookup(c: &mut Criterion) {
    let mut registry = PolicyRegistry::new();
    for i in 0..200 {
        registry = registry.protected(Method::GET, format!("/api/v1/resource{i}/:id"), EndpointPolicy::default());
    }
    c.bench_function("registry_lookup", |b| { b.iter(|| black_box(registry.lookup(&Method::GET, "/api/v1/resource150/:id").is_some())); });
}

criterion_group!(benches, bench_guard_policies, bench_guard_rate_limited, bench_registry_lookup);
criterion_main!(benches);
