//! MPA Operator Service
//!
//! Kubernetes operator that scales workloads along two dimensions.
//! Watches MultidimensionalPodAutoscaler CRDs, raises container resource
//! requests when CPU or memory runs hot, and delegates replica scaling to an
//! owned HorizontalPodAutoscaler when request rate or latency does.
//!
//! Required RBAC: get/list/watch on multidimensionalpodautoscalers and
//! patch on their status; get/update on the scale targets; get/list/watch/
//! create/update on horizontalpodautoscalers.

mod config;
mod crd;
mod engine;
mod hpa;
mod load_metrics;
mod metrics;
mod reconciler;
mod status;
mod store;
mod telemetry;
mod workload;

use crate::config::ControllerConfig;
use crate::crd::MultidimensionalPodAutoscaler;
use crate::engine::{Policy, ReplicaDefaults};
use crate::load_metrics::{MetricQueries, PrometheusMetrics};
use crate::reconciler::{error_policy, reconcile, Context};
use crate::store::KubeStore;
use clap::Parser;
use futures::StreamExt;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use kube::{
    api::Api,
    runtime::{controller, watcher, Controller},
    Client, CustomResourceExt,
};
use mpa_common::config::{parse_flag, validate_replica_defaults};
use mpa_common::TelemetrySettings;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

fn flag(value: &str) -> Result<bool, String> {
    Ok(parse_flag(value))
}

#[derive(Parser, Debug)]
#[command(name = "mpa-operator")]
#[command(about = "Multidimensional Pod Autoscaler operator")]
struct Args {
    /// Namespace to watch (all namespaces when unset)
    #[arg(long, env = "NAMESPACE")]
    namespace: Option<String>,

    /// Prometheus base URL for workload metrics
    #[arg(long, env = "PROMETHEUS_URL", default_value = "http://prometheus-server.monitoring.svc:80")]
    prometheus_url: String,

    /// Metrics port
    #[arg(long, env = "METRICS_PORT", default_value = "8080")]
    metrics_port: u16,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit JSON logs
    #[arg(long, env = "JSON_LOGS", default_value = "false", num_args = 0..=1, default_missing_value = "true", value_parser = flag)]
    json_logs: bool,

    /// Autoscalers reconciled in parallel
    #[arg(long, env = "WORKERS", default_value = "4")]
    workers: u16,

    /// Seconds between passes for a settled autoscaler
    #[arg(long, env = "RECONCILE_INTERVAL_SECS", default_value = "30")]
    reconcile_interval_secs: u64,

    /// Seconds before re-checking an incomplete scaleTargetRef
    #[arg(long, env = "INVALID_TARGET_BACKOFF_SECS", default_value = "10")]
    invalid_target_backoff_secs: u64,

    /// Seconds before retrying after an API server or metrics failure
    #[arg(long, env = "ERROR_BACKOFF_SECS", default_value = "10")]
    error_backoff_secs: u64,

    #[arg(long, env = "DEFAULT_MIN_REPLICAS", default_value = "1")]
    default_min_replicas: i32,

    #[arg(long, env = "DEFAULT_MAX_REPLICAS", default_value = "3")]
    default_max_replicas: i32,

    /// CPU utilization percentage that triggers vertical scaling
    #[arg(long, env = "CPU_UPPER_THRESHOLD", default_value = "80")]
    cpu_upper_threshold: f64,

    /// Memory utilization percentage that triggers vertical scaling (off when unset)
    #[arg(long, env = "MEMORY_UPPER_THRESHOLD")]
    memory_upper_threshold: Option<f64>,

    /// Requests per second that trigger horizontal scaling
    #[arg(long, env = "QPS_UPPER_THRESHOLD", default_value = "100")]
    qps_upper_threshold: f64,

    /// p99 latency in milliseconds that triggers horizontal scaling (off when unset)
    #[arg(long, env = "LATENCY_UPPER_THRESHOLD_MS")]
    latency_upper_threshold_ms: Option<f64>,

    /// CPU request (millicores) applied on vertical scale-up
    #[arg(long, env = "MAX_VERTICAL_CPU", default_value = "2000")]
    max_vertical_cpu: i64,

    /// Memory request (MiB) applied on vertical scale-up
    #[arg(long, env = "MAX_VERTICAL_MEMORY", default_value = "4096")]
    max_vertical_memory: i64,

    /// PromQL overrides; `{namespace}` and `{name}` are substituted
    #[arg(long, env = "CPU_QUERY")]
    cpu_query: Option<String>,

    #[arg(long, env = "MEMORY_QUERY")]
    memory_query: Option<String>,

    #[arg(long, env = "QPS_QUERY")]
    qps_query: Option<String>,

    #[arg(long, env = "LATENCY_QUERY")]
    latency_query: Option<String>,

    /// Timeout for Kubernetes API round trips in seconds
    #[arg(long, env = "API_TIMEOUT_SECS", default_value = "10")]
    api_timeout_secs: u64,

    /// Timeout for Prometheus queries in seconds
    #[arg(long, env = "METRICS_TIMEOUT_SECS", default_value = "5")]
    metrics_timeout_secs: u64,

    /// Field manager recorded on writes
    #[arg(long, env = "FIELD_MANAGER", default_value = "mpa-operator")]
    field_manager: String,

    /// Print the CustomResourceDefinition as JSON and exit
    #[arg(long)]
    print_crd: bool,
}

impl Args {
    fn controller_config(&self) -> anyhow::Result<ControllerConfig> {
        validate_replica_defaults(self.default_min_replicas, self.default_max_replicas)
            .map_err(anyhow::Error::msg)?;

        Ok(ControllerConfig {
            reconcile_interval: Duration::from_secs(self.reconcile_interval_secs),
            invalid_target_backoff: Duration::from_secs(self.invalid_target_backoff_secs),
            error_backoff: Duration::from_secs(self.error_backoff_secs),
            replica_defaults: ReplicaDefaults {
                min_replicas: self.default_min_replicas,
                max_replicas: self.default_max_replicas,
            },
            policy: Policy {
                cpu_upper_threshold: self.cpu_upper_threshold,
                memory_upper_threshold: self.memory_upper_threshold,
                qps_upper_threshold: self.qps_upper_threshold,
                latency_upper_threshold_ms: self.latency_upper_threshold_ms,
                max_vertical_cpu: self.max_vertical_cpu,
                max_vertical_memory: self.max_vertical_memory,
            },
            field_manager: self.field_manager.clone(),
        })
    }

    fn metric_queries(&self) -> MetricQueries {
        let defaults = MetricQueries::default();
        MetricQueries {
            cpu_utilization: self.cpu_query.clone().unwrap_or(defaults.cpu_utilization),
            memory_utilization: self.memory_query.clone().unwrap_or(defaults.memory_utilization),
            qps: self.qps_query.clone().unwrap_or(defaults.qps),
            latency_p99: self.latency_query.clone().unwrap_or(defaults.latency_p99),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    if args.print_crd {
        println!("{}", serde_json::to_string_pretty(&MultidimensionalPodAutoscaler::crd())?);
        return Ok(());
    }

    // Install rustls crypto provider
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    telemetry::init(&TelemetrySettings {
        log_level: args.log_level.clone(),
        json_logs: args.json_logs,
        ..Default::default()
    })?;

    let config = args.controller_config()?;

    info!("Starting MPA Operator");
    info!("  Namespace: {}", args.namespace.as_deref().unwrap_or("<all>"));
    info!("  Prometheus: {}", args.prometheus_url);
    info!("  Workers: {}", args.workers);
    info!(
        "  Defaults: min={} max={}",
        config.replica_defaults.min_replicas, config.replica_defaults.max_replicas
    );

    // Initialize Kubernetes client
    let api_timeout = Duration::from_secs(args.api_timeout_secs);
    let mut kube_config = kube::Config::infer().await?;
    kube_config.connect_timeout = Some(api_timeout);
    kube_config.read_timeout = Some(api_timeout);
    let client = Client::try_from(kube_config)?;
    info!("Connected to Kubernetes cluster");

    metrics::init_metrics();
    let metrics_port = args.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = metrics::serve(metrics_port).await {
            error!("Metrics server failed: {}", e);
        }
    });

    let (autoscalers, hpas): (Api<MultidimensionalPodAutoscaler>, Api<HorizontalPodAutoscaler>) =
        match &args.namespace {
            Some(ns) => (Api::namespaced(client.clone(), ns), Api::namespaced(client.clone(), ns)),
            None => (Api::all(client.clone()), Api::all(client.clone())),
        };

    let provider = PrometheusMetrics::new(
        args.prometheus_url.clone(),
        args.metric_queries(),
        Duration::from_secs(args.metrics_timeout_secs),
    )?;

    let ctx = Arc::new(Context {
        store: Arc::new(KubeStore::new(client.clone(), config.field_manager.clone())),
        metrics: Arc::new(provider),
        config,
    });

    info!("Starting controller for MultidimensionalPodAutoscaler resources");

    Controller::new(autoscalers, watcher::Config::default())
        .owns(hpas, watcher::Config::default())
        .with_config(controller::Config::default().concurrency(args.workers))
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, action)) => {
                    debug!("Reconciled {}: {:?}", obj.name, action);
                }
                Err(e) => {
                    warn!("Reconciliation error: {}", e);
                }
            }
        })
        .await;

    info!("MPA Operator shutting down");

    Ok(())
}
