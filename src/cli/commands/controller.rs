//! Controller command: runs the cluster-resident certificate controller
//! (C3/C4/C6/C8) against the in-process fake resource stores, for local
//! development and demos. A real deployment would back `ResourceStore`/
//! `SecretStore` with an actual cluster API client instead.
use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio_util::sync::CancellationToken;

use crate::challenge::dns01::MockDnsProvider;
use crate::challenge::driver::{ChallengeDriverRegistry, Dns01Driver, Http01Driver};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::controller::certificate_reconciler::CertificateReconciler;
use crate::controller::order_reconciler::OrderReconciler;
use crate::controller::webhook_bootstrap::WebhookBootstrap;
use crate::controller::{ControllerRuntime, KeyLister};
use crate::error::Result;
use crate::issuer::{IssuerDeps, IssuerFactory, IssuerRegistry};
use crate::metrics::MetricsRegistry;
use crate::queue::RateLimitedQueue;
use crate::resource::{Certificate, Challenge, Issuer, Order};
use crate::scheduler::scheduled_queue::{Scheduler, ScheduledWorkQueue};
use crate::store::{FakeResourceStore, FakeSecretStore, ResourceStore, TracingEventRecorder, Versioned};

/// Re-lists every key a [`FakeResourceStore`] currently holds, for
/// `ControllerRuntime::spawn_resync`.
struct FakeStoreLister<T> {
    store: Arc<FakeResourceStore<T>>,
}

impl<T: Versioned + Send + Sync> KeyLister for FakeStoreLister<T> {
    fn list_keys(&self) -> Vec<String> {
        self.store.keys()
    }
}

/// Re-lists a single fixed key, for the webhook bootstrap's own resync
/// (there is exactly one CA/serving secret pair to reconcile).
struct FixedKeyLister(String);

impl KeyLister for FixedKeyLister {
    fn list_keys(&self) -> Vec<String> {
        vec![self.0.clone()]
    }
}

pub async fn handle_controller(workers: usize, config_path: Option<String>) -> Result<()> {
    let mut config = Config::default();
    if let Some(path) = config_path {
        tracing::info!("Loading controller configuration from: {}", path);
        config = Config::from_file(std::path::Path::new(&path))?;
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let metrics = Arc::new(MetricsRegistry::new());
    let events = Arc::new(TracingEventRecorder);

    let certificates_store = Arc::new(FakeResourceStore::<Certificate>::new());
    let issuers_store = Arc::new(FakeResourceStore::<Issuer>::new());
    let cluster_issuers_store = Arc::new(FakeResourceStore::<Issuer>::new());
    let orders_store = Arc::new(FakeResourceStore::<Order>::new());
    let challenges_store = Arc::new(FakeResourceStore::<Challenge>::new());
    let secrets: Arc<dyn crate::store::SecretStore> = Arc::new(FakeSecretStore::new());

    let certificates: Arc<dyn ResourceStore<Certificate>> = certificates_store.clone();
    let issuers: Arc<dyn ResourceStore<Issuer>> = issuers_store.clone();
    let cluster_issuers: Arc<dyn ResourceStore<Issuer>> = cluster_issuers_store.clone();
    let orders: Arc<dyn ResourceStore<Order>> = orders_store.clone();
    let challenges: Arc<dyn ResourceStore<Challenge>> = challenges_store.clone();

    let issuer_deps = IssuerDeps {
        secrets: secrets.clone(),
        orders: orders.clone(),
        clock: clock.clone(),
        http_client: reqwest::Client::new(),
    };
    let issuer_factory = Arc::new(IssuerFactory::new(IssuerRegistry::with_defaults(), issuer_deps));

    let http01_addr: std::net::SocketAddr = config
        .challenge
        .http01
        .as_ref()
        .map(|c| c.listen_addr.clone())
        .unwrap_or_else(|| "0.0.0.0:5002".to_string())
        .parse()
        .map_err(|e| crate::error::AcmeError::configuration(format!("invalid HTTP-01 listen address: {e}")))?;

    let mut driver_registry = ChallengeDriverRegistry::new();
    driver_registry.register(Arc::new(Http01Driver::bind(http01_addr).await?));
    driver_registry.register(Arc::new(Dns01Driver::new(Arc::new(MockDnsProvider::new()), None)));
    let driver_registry = Arc::new(driver_registry);

    let cert_queue = RateLimitedQueue::new(clock.clone());
    let renewal_requeue = {
        let cert_queue = cert_queue.clone();
        ScheduledWorkQueue::new(clock.clone(), move |key: String| {
            let cert_queue = cert_queue.clone();
            tokio::spawn(async move { cert_queue.add(key).await });
        })
    };
    let renewals: Arc<dyn Scheduler<String>> = renewal_requeue;

    let cert_reconciler = Arc::new(CertificateReconciler::new(
        certificates.clone(),
        issuers.clone(),
        cluster_issuers.clone(),
        secrets.clone(),
        issuer_factory,
        clock.clone(),
        events.clone(),
        renewals,
    ));
    let cert_runtime = Arc::new(ControllerRuntime::new(
        "certificates",
        cert_queue.clone(),
        cert_reconciler,
        workers,
        metrics.clone(),
    ));

    let order_queue = RateLimitedQueue::new(clock.clone());
    let order_reconciler = Arc::new(OrderReconciler::new(
        orders.clone(),
        challenges.clone(),
        issuers.clone(),
        cluster_issuers.clone(),
        secrets.clone(),
        driver_registry,
        reqwest::Client::new(),
        clock.clone(),
        events.clone(),
    ));
    let order_runtime = Arc::new(ControllerRuntime::new(
        "orders",
        order_queue.clone(),
        order_reconciler,
        workers,
        metrics.clone(),
    ));

    let webhook_bootstrap = Arc::new(WebhookBootstrap::new(
        secrets,
        clock,
        events,
        "cert-manager",
        "cert-manager-webhook-ca",
        "cert-manager-webhook-tls",
        vec!["cert-manager-webhook.cert-manager.svc".to_string()],
    ));
    let webhook_queue = RateLimitedQueue::new(Arc::new(SystemClock));
    webhook_queue.add(webhook_bootstrap.key()).await;
    let webhook_runtime = Arc::new(ControllerRuntime::new(
        "webhook-bootstrap",
        webhook_queue.clone(),
        webhook_bootstrap.clone(),
        1,
        metrics,
    ));

    let shutdown = CancellationToken::new();
    let resync_period = Duration::from_secs(config.controller.resync_period_secs);

    let mut handles = Vec::new();
    handles.extend(cert_runtime.spawn(shutdown.clone()));
    handles.extend(order_runtime.spawn(shutdown.clone()));
    handles.extend(webhook_runtime.spawn(shutdown.clone()));

    let cert_resync = cert_runtime.spawn_resync(
        Arc::new(FakeStoreLister { store: certificates_store }),
        resync_period,
        shutdown.clone(),
    );
    let order_resync = order_runtime.spawn_resync(
        Arc::new(FakeStoreLister { store: orders_store }),
        resync_period,
        shutdown.clone(),
    );
    let webhook_resync = webhook_runtime.spawn_resync(
        Arc::new(FixedKeyLister(webhook_bootstrap.key())),
        resync_period,
        shutdown.clone(),
    );

    tracing::info!(workers, resync_period_secs = config.controller.resync_period_secs, "controller started");

    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    tokio::select! {
        _ = sigterm.recv() => tracing::info!("controller received SIGTERM, shutting down"),
        _ = sigint.recv() => tracing::info!("controller received SIGINT, shutting down"),
    }

    shutdown.cancel();
    cert_queue.shutdown().await;
    order_queue.shutdown().await;
    webhook_queue.shutdown().await;
    for handle in handles.into_iter().chain([cert_resync, order_resync, webhook_resync]) {
        let _ = handle.await;
    }

    tracing::info!("controller shutdown complete");
    Ok(())
}
