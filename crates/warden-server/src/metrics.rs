use std::fmt::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;

#[derive(Debug, Default)]
pub struct Metrics {
    authz_checks: AtomicU64,
    authz_allowed: AtomicU64,
    authz_denied: AtomicU64,
    cache_refreshes: AtomicU64,
    cache_refresh_failures: AtomicU64,
    cache_generation: AtomicU64,
    cache_version: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_check(&self, allowed: bool) {
        self.authz_checks.fetch_add(1, Ordering::Relaxed);
        if allowed {
            self.authz_allowed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.authz_denied.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// A swap that installed a new snapshot.
    pub fn record_refresh(&self, generation: u64, version: u64) {
        self.cache_refreshes.fetch_add(1, Ordering::Relaxed);
        self.cache_generation.store(generation, Ordering::Relaxed);
        self.cache_version.store(version, Ordering::Relaxed);
    }

    pub fn record_refresh_failure(&self) {
        self.cache_refresh_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn authz_checks(&self) -> u64 {
        self.authz_checks.load(Ordering::Relaxed)
    }

    pub fn authz_allowed(&self) -> u64 {
        self.authz_allowed.load(Ordering::Relaxed)
    }

    pub fn authz_denied(&self) -> u64 {
        self.authz_denied.load(Ordering::Relaxed)
    }

    pub fn cache_refreshes(&self) -> u64 {
        self.cache_refreshes.load(Ordering::Relaxed)
    }

    pub fn cache_refresh_failures(&self) -> u64 {
        self.cache_refresh_failures.load(Ordering::Relaxed)
    }

    pub fn cache_generation(&self) -> u64 {
        self.cache_generation.load(Ordering::Relaxed)
    }

    pub fn render_prometheus(&self) -> String {
        let series = [
            (
                "warden_authz_checks_total",
                "counter",
                "Authorization decisions made.",
                self.authz_checks(),
            ),
            (
                "warden_authz_allowed_total",
                "counter",
                "Authorization decisions that allowed the action.",
                self.authz_allowed(),
            ),
            (
                "warden_authz_denied_total",
                "counter",
                "Authorization decisions that denied the action.",
                self.authz_denied(),
            ),
            (
                "warden_cache_refreshes_total",
                "counter",
                "Permission snapshots installed by the cache.",
                self.cache_refreshes(),
            ),
            (
                "warden_cache_refresh_failures_total",
                "counter",
                "Permission cache refreshes that failed to load.",
                self.cache_refresh_failures(),
            ),
            (
                "warden_cache_generation",
                "gauge",
                "Generation of the current permission snapshot.",
                self.cache_generation(),
            ),
            (
                "warden_cache_store_version",
                "gauge",
                "Store version of the current permission snapshot.",
                self.cache_version.load(Ordering::Relaxed),
            ),
        ];

        let mut output = String::new();
        for (name, kind, help, value) in series {
            let _ = writeln!(output, "# HELP {name} {help}");
            let _ = writeln!(output, "# TYPE {name} {kind}");
            let _ = writeln!(output, "{name} {value}");
        }
        output
    }
}

pub async fn metrics_handler(State(metrics): State<Arc<Metrics>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        metrics.render_prometheus(),
    )
}
