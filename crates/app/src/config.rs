use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use ray_queue::RetryPolicy;

/// Longest wait between two attempts of the same unit.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(name = "ray-controller", version, about = "Ray operator: reconciles Ray clusters and their pods")]
pub struct Cli {
    /// Kubernetes API server URL (overrides the kubeconfig cluster)
    #[arg(short = 'u', long = "master-url", env = "RAY_MASTER_URL", global = true)]
    pub master_url: Option<String>,

    /// Path to a kubeconfig file (default: in-cluster or ~/.kube/config)
    #[arg(short = 'c', long = "kube-config-path", env = "RAY_KUBE_CONFIG_PATH", global = true)]
    pub kube_config_path: Option<PathBuf>,

    /// Watch a single namespace instead of the whole cluster
    #[arg(long = "namespace", env = "RAY_NAMESPACE", global = true)]
    pub namespace: Option<String>,

    /// Pending units each controller queue holds before watch delivery blocks
    #[arg(long = "queue-capacity", env = "RAY_QUEUE_CAP", default_value_t = 1024, global = true)]
    pub queue_capacity: usize,

    /// Attempts per unit of work, first one included (1 = never retry)
    #[arg(long = "retry-limit", env = "RAY_RETRY_LIMIT", default_value_t = 1, global = true)]
    pub retry_limit: u32,

    /// Base delay between attempts, doubled per retry (0 = retry immediately)
    #[arg(long = "retry-backoff-ms", env = "RAY_RETRY_BACKOFF_MS", default_value_t = 0, global = true)]
    pub retry_backoff_ms: u64,

    /// Re-deliver cached objects this often (0 disables)
    #[arg(long = "resync-secs", env = "RAY_RESYNC_SECS", default_value_t = 30, global = true)]
    pub resync_secs: u64,

    /// Give up if watch caches have not synced in time (default: wait forever)
    #[arg(long = "sync-timeout-secs", env = "RAY_SYNC_TIMEOUT_SECS", global = true)]
    pub sync_timeout_secs: Option<u64>,

    /// Serve Prometheus metrics on this host:port
    #[arg(long = "metrics-addr", env = "RAY_METRICS_ADDR", global = true)]
    pub metrics_addr: Option<SocketAddr>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Run the controllers (default)
    Run,
    /// Print the Ray CustomResourceDefinition as YAML
    Crd,
}

/// Runtime settings derived from the command line.
#[derive(Debug, Clone)]
pub struct Settings {
    pub master_url: Option<String>,
    pub kube_config_path: Option<PathBuf>,
    pub namespace: Option<String>,
    pub queue_capacity: usize,
    pub retry: RetryPolicy,
    pub resync: Duration,
    pub sync_timeout: Option<Duration>,
}

impl Cli {
    pub fn command(&self) -> Commands { self.command.unwrap_or(Commands::Run) }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::limit(self.retry_limit).with_backoff(Duration::from_millis(self.retry_backoff_ms), MAX_BACKOFF)
    }

    pub fn settings(&self) -> Settings {
        Settings {
            master_url: self.master_url.clone(),
            kube_config_path: self.kube_config_path.clone(),
            namespace: self.namespace.clone().filter(|ns| !ns.is_empty()),
            queue_capacity: self.queue_capacity,
            retry: self.retry_policy(),
            resync: Duration::from_secs(self.resync_secs),
            sync_timeout: self.sync_timeout_secs.map(Duration::from_secs),
        }
    }
}
