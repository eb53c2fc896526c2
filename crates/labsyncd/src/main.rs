// # labsyncd - Homelab Convergence Daemon
//
// This binary is a thin integration layer:
// 1. Reading configuration from environment variables
// 2. Initializing tracing and the tokio runtime
// 3. Wiring collaborators (NetBox, Technitium, nmap, caddy) to the
//    reconcilers in labsync-core
// 4. Running the schedulers until SIGTERM/SIGINT
//
// All convergence logic lives in labsync-core; nothing here retries,
// renders, or makes rollback decisions.
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Identity
// - `LABSYNC_DOMAIN`: Base domain appended to unqualified hostnames (required)
//
// ### Inventory (NetBox)
// - `LABSYNC_NETBOX_URL`: NetBox instance root URL (required)
// - `LABSYNC_NETBOX_TOKEN`: NetBox API token (required)
//
// ### Name service (Technitium), optional as a group
// - `LABSYNC_DNS_URL`: Technitium instance root URL
// - `LABSYNC_DNS_TOKEN`: Technitium API token
// - `LABSYNC_DNS_ZONE`: Zone for propagated records (defaults to LABSYNC_DOMAIN)
// - `LABSYNC_DNS_TTL`: Record TTL in seconds (default 300)
//
// ### Proxy
// - `LABSYNC_CADDYFILE`: Active configuration path (default /etc/caddy/Caddyfile)
// - `LABSYNC_BACKUP_DIR`: Backup directory (default <caddyfile dir>/backups)
// - `LABSYNC_BACKUP_KEEP`: Backups retained, oldest evicted first (default 20)
// - `LABSYNC_CADDY_BINARY`: Proxy binary (default caddy)
//
// ### Discovery
// - `LABSYNC_NETWORKS`: Comma-separated CIDR targets (empty disables discovery)
// - `LABSYNC_SERVICE_SCAN_HOSTS`: Comma-separated IPs that get a deep service scan
//
// ### Scheduling
// - `LABSYNC_PROXY_INTERVAL_SECS`: Proxy sync interval (default 300)
// - `LABSYNC_DISCOVERY_INTERVAL_SECS`: Discovery interval (default 3600)
//
// ### Logging
// - `LABSYNC_LOG_LEVEL`: trace, debug, info, warn, error (default info)
//
// ## Example
//
// ```bash
// export LABSYNC_DOMAIN=lab.example
// export LABSYNC_NETBOX_URL=http://netbox.lab.example:8080
// export LABSYNC_NETBOX_TOKEN=your_netbox_token_here
// export LABSYNC_NETWORKS=192.168.1.0/24
//
// labsyncd run
// ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::env;
use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

use labsync_core::classifier::ServiceCategory;
use labsync_core::config::{DiscoveryConfig, ProxyConfig, SyncConfig};
use labsync_core::discovery::DiscoveryReconciler;
use labsync_core::proxy::CommandProxy;
use labsync_core::reconciler::{CycleStatus, ProxyReconciler, ReconcilerEvent};
use labsync_core::scheduler::RecurringTask;
use labsync_core::traits::{InventoryStore, NameService, NetworkProber, ProxyRuntime};
use labsync_dns_technitium::TechnitiumService;
use labsync_inventory_netbox::NetBoxStore;
use labsync_probe_nmap::NmapProber;

/// Exit codes following systemd conventions
#[derive(Debug, Clone, Copy)]
enum SyncExitCode {
    /// Clean shutdown or successful one-shot command
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error, or a one-shot command that did not converge
    RuntimeError = 2,
}

impl From<SyncExitCode> for ExitCode {
    fn from(code: SyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

#[derive(Parser)]
#[command(name = "labsyncd", about = "Converges homelab inventory, DNS, and proxy configuration")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run both reconciliation loops until SIGTERM/SIGINT (default)
    Run,
    /// Run one proxy reconciliation cycle and exit
    Sync,
    /// Add one service and converge immediately
    Add {
        /// Service hostname (unqualified names get the base domain appended)
        hostname: String,
        /// Upstream address
        address: IpAddr,
        /// Upstream port
        port: u16,
        /// Service category (web, api, monitoring, docs, secure-admin, ...)
        category: ServiceCategory,
    },
    /// Validate the currently active configuration file
    Check,
}

/// Daemon configuration from environment variables
struct Config {
    domain: String,
    netbox_url: String,
    netbox_token: String,
    dns_url: Option<String>,
    dns_token: Option<String>,
    dns_zone: String,
    dns_ttl: u32,
    caddyfile: PathBuf,
    backup_dir: PathBuf,
    backup_keep: usize,
    caddy_binary: String,
    networks: Vec<String>,
    service_scan_hosts: Vec<IpAddr>,
    proxy_interval_secs: u64,
    discovery_interval_secs: u64,
    log_level: String,
}

impl Config {
    fn from_env() -> Result<Self> {
        let domain = env::var("LABSYNC_DOMAIN").unwrap_or_default();

        let caddyfile = PathBuf::from(
            env::var("LABSYNC_CADDYFILE").unwrap_or_else(|_| "/etc/caddy/Caddyfile".to_string()),
        );
        let backup_dir = match env::var("LABSYNC_BACKUP_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => caddyfile
                .parent()
                .map(|p| p.join("backups"))
                .unwrap_or_else(|| PathBuf::from("backups")),
        };

        Ok(Self {
            dns_zone: env::var("LABSYNC_DNS_ZONE").unwrap_or_else(|_| domain.clone()),
            domain,
            netbox_url: env::var("LABSYNC_NETBOX_URL").unwrap_or_default(),
            netbox_token: env::var("LABSYNC_NETBOX_TOKEN").unwrap_or_default(),
            dns_url: env::var("LABSYNC_DNS_URL").ok(),
            dns_token: env::var("LABSYNC_DNS_TOKEN").ok(),
            dns_ttl: parse_env("LABSYNC_DNS_TTL", 300)?,
            caddyfile,
            backup_dir,
            backup_keep: parse_env("LABSYNC_BACKUP_KEEP", 20)?,
            caddy_binary: env::var("LABSYNC_CADDY_BINARY").unwrap_or_else(|_| "caddy".to_string()),
            networks: split_list(&env::var("LABSYNC_NETWORKS").unwrap_or_default()),
            service_scan_hosts: parse_scan_hosts(
                &env::var("LABSYNC_SERVICE_SCAN_HOSTS").unwrap_or_default(),
            )?,
            proxy_interval_secs: parse_env("LABSYNC_PROXY_INTERVAL_SECS", 300)?,
            discovery_interval_secs: parse_env("LABSYNC_DISCOVERY_INTERVAL_SECS", 3600)?,
            log_level: env::var("LABSYNC_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    fn validate(&self) -> Result<()> {
        if self.domain.is_empty() {
            anyhow::bail!(
                "LABSYNC_DOMAIN is required. \
                Set it via: export LABSYNC_DOMAIN=lab.example"
            );
        }
        validate_domain_name(&self.domain)?;

        if self.netbox_url.is_empty() {
            anyhow::bail!(
                "LABSYNC_NETBOX_URL is required. \
                Set it via: export LABSYNC_NETBOX_URL=http://netbox.lab.example:8080"
            );
        }
        validate_url("LABSYNC_NETBOX_URL", &self.netbox_url)?;

        if self.netbox_token.is_empty() {
            anyhow::bail!(
                "LABSYNC_NETBOX_TOKEN is required. \
                Set it via: export LABSYNC_NETBOX_TOKEN=your_token"
            );
        }
        validate_token("LABSYNC_NETBOX_TOKEN", &self.netbox_token)?;

        // DNS propagation is optional, but partial settings are a mistake
        match (&self.dns_url, &self.dns_token) {
            (Some(url), Some(token)) => {
                validate_url("LABSYNC_DNS_URL", url)?;
                validate_token("LABSYNC_DNS_TOKEN", token)?;
                validate_domain_name(&self.dns_zone)?;
            }
            (None, None) => {}
            _ => anyhow::bail!(
                "LABSYNC_DNS_URL and LABSYNC_DNS_TOKEN must be set together \
                (or both left unset to disable DNS propagation)"
            ),
        }

        if self.backup_keep == 0 || self.backup_keep > 1000 {
            anyhow::bail!(
                "LABSYNC_BACKUP_KEEP must be between 1 and 1000. Got: {}",
                self.backup_keep
            );
        }

        if !(30..=86400).contains(&self.dns_ttl) {
            anyhow::bail!(
                "LABSYNC_DNS_TTL must be between 30 and 86400 seconds. Got: {}",
                self.dns_ttl
            );
        }

        if !(10..=86400).contains(&self.proxy_interval_secs) {
            anyhow::bail!(
                "LABSYNC_PROXY_INTERVAL_SECS must be between 10 and 86400. Got: {}",
                self.proxy_interval_secs
            );
        }

        if !(60..=604800).contains(&self.discovery_interval_secs) {
            anyhow::bail!(
                "LABSYNC_DISCOVERY_INTERVAL_SECS must be between 60 and 604800. Got: {}",
                self.discovery_interval_secs
            );
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "LABSYNC_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    fn to_sync_config(&self) -> SyncConfig {
        SyncConfig {
            base_domain: self.domain.clone(),
            proxy: ProxyConfig {
                active_config_path: self.caddyfile.clone(),
                backup_dir: self.backup_dir.clone(),
                backup_keep: self.backup_keep,
                validate_timeout_secs: 30,
                reload_timeout_secs: 30,
            },
            discovery: DiscoveryConfig {
                networks: self.networks.clone(),
                zone: self.dns_zone.clone(),
                record_ttl: self.dns_ttl,
                service_scan_hosts: self.service_scan_hosts.clone(),
                scan_timeout_secs: 120,
            },
            engine: Default::default(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| anyhow::anyhow!("{} is not a valid number: {}", name, value)),
        Err(_) => Ok(default),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_scan_hosts(value: &str) -> Result<Vec<IpAddr>> {
    split_list(value)
        .iter()
        .map(|s| {
            s.parse()
                .map_err(|_| anyhow::anyhow!("LABSYNC_SERVICE_SCAN_HOSTS entry is not an IP: {}", s))
        })
        .collect()
}

/// Basic DNS domain name validation per RFC 1035 label rules
fn validate_domain_name(domain: &str) -> Result<()> {
    if domain.is_empty() {
        anyhow::bail!("Domain name cannot be empty");
    }

    if domain.len() > 253 {
        anyhow::bail!(
            "Domain name too long: {} chars (max 253). Got: {}",
            domain.len(),
            domain
        );
    }

    for label in domain.split('.') {
        if label.is_empty() {
            anyhow::bail!("Domain name has empty label: '{}'", domain);
        }
        if label.len() > 63 {
            anyhow::bail!(
                "Domain label too long: {} chars (max 63). Label: '{}'",
                label.len(),
                label
            );
        }
        if !label.chars().all(|c| c.is_alphanumeric() || c == '-') {
            anyhow::bail!(
                "Domain label contains invalid characters. Label: '{}'. \
                Valid: alphanumeric and hyphen only.",
                label
            );
        }
        if label.starts_with('-') || label.ends_with('-') {
            anyhow::bail!(
                "Domain label cannot start or end with hyphen. Label: '{}'",
                label
            );
        }
    }

    Ok(())
}

fn validate_url(name: &str, url: &str) -> Result<()> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        anyhow::bail!("{} must use HTTP or HTTPS scheme. Got: {}", name, url);
    }
    Ok(())
}

/// Catch obvious placeholder tokens before they hit a live API
fn validate_token(name: &str, token: &str) -> Result<()> {
    let token_lower = token.to_lowercase();
    if token_lower.contains("your_token")
        || token_lower.contains("replace_me")
        || token_lower.contains("example")
        || token_lower == "token"
    {
        anyhow::bail!(
            "{} appears to be a placeholder. \
            Use an actual API token from the service.",
            name
        );
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return SyncExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return SyncExitCode::ConfigError.into();
    }

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return SyncExitCode::ConfigError.into();
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return SyncExitCode::RuntimeError.into();
        }
    };

    let code = rt.block_on(async {
        let result = match cli.command.unwrap_or(Command::Run) {
            Command::Run => run_daemon(&config).await,
            Command::Sync => run_sync_once(&config).await,
            Command::Add {
                hostname,
                address,
                port,
                category,
            } => run_add(&config, &hostname, address, port, category).await,
            Command::Check => run_check(&config).await,
        };

        match result {
            Ok(code) => code,
            Err(e) => {
                error!("{}", e);
                SyncExitCode::RuntimeError
            }
        }
    });

    code.into()
}

/// Build the shared collaborators from the daemon configuration
struct Collaborators {
    inventory: Arc<dyn InventoryStore>,
    runtime: Arc<dyn ProxyRuntime>,
    names: Option<Arc<dyn NameService>>,
    prober: Arc<dyn NetworkProber>,
}

fn build_collaborators(config: &Config) -> Result<Collaborators> {
    let inventory: Arc<dyn InventoryStore> =
        Arc::new(NetBoxStore::new(&config.netbox_url, &config.netbox_token)?);
    let runtime: Arc<dyn ProxyRuntime> = Arc::new(CommandProxy::new(&config.caddy_binary));

    let names: Option<Arc<dyn NameService>> = match (&config.dns_url, &config.dns_token) {
        (Some(url), Some(token)) => Some(Arc::new(TechnitiumService::new(url, token)?)),
        _ => None,
    };

    let prober: Arc<dyn NetworkProber> = Arc::new(NmapProber::new());

    Ok(Collaborators {
        inventory,
        runtime,
        names,
        prober,
    })
}

/// Run both reconciliation loops until a shutdown signal
async fn run_daemon(config: &Config) -> Result<SyncExitCode> {
    info!("Starting labsyncd");
    info!(
        domain = config.domain,
        caddyfile = %config.caddyfile.display(),
        networks = config.networks.len(),
        dns = config.dns_url.is_some(),
        "configuration loaded"
    );

    let sync_config = config.to_sync_config();
    let collaborators = build_collaborators(config)?;

    let (proxy_reconciler, events) = ProxyReconciler::new(
        collaborators.inventory.clone(),
        collaborators.runtime,
        &sync_config,
    )?;
    let proxy_reconciler = Arc::new(proxy_reconciler);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    // Drain and log reconciler events
    let event_task = tokio::spawn(drain_events(events));

    let proxy_task = {
        let reconciler = proxy_reconciler.clone();
        let task = RecurringTask::new(
            "proxy-sync",
            Duration::from_secs(config.proxy_interval_secs),
            shutdown_rx.clone(),
        );
        tokio::spawn(async move {
            task.run(move |shutdown| {
                let reconciler = reconciler.clone();
                async move {
                    reconciler
                        .run_cycle_with_shutdown(Some(&shutdown))
                        .await
                        .map(|_| ())
                }
            })
            .await
        })
    };

    // Discovery only runs when target networks are configured
    let discovery_task = if config.networks.is_empty() {
        warn!("LABSYNC_NETWORKS is empty, discovery loop disabled");
        None
    } else {
        let reconciler = Arc::new(DiscoveryReconciler::new(
            collaborators.prober,
            collaborators.inventory,
            collaborators.names,
            sync_config.discovery.clone(),
        ));
        let task = RecurringTask::new(
            "discovery",
            Duration::from_secs(config.discovery_interval_secs),
            shutdown_rx.clone(),
        );
        Some(tokio::spawn(async move {
            task.run(move |_| {
                let reconciler = reconciler.clone();
                async move { reconciler.run_cycle().await.map(|_| ()) }
            })
            .await
        }))
    };

    let signal_name = wait_for_shutdown().await?;
    info!("Received {}, shutting down", signal_name);
    shutdown_tx.send(true).ok();

    let mut exit = SyncExitCode::CleanShutdown;
    if let Err(e) = proxy_task.await? {
        error!("proxy-sync scheduler stopped with error: {}", e);
        exit = SyncExitCode::RuntimeError;
    }
    if let Some(task) = discovery_task {
        if let Err(e) = task.await? {
            error!("discovery scheduler stopped with error: {}", e);
            exit = SyncExitCode::RuntimeError;
        }
    }
    // Dropping the last reconciler handle closes the event channel, so the
    // drain task logs every emitted event before exiting.
    drop(proxy_reconciler);
    event_task.await.ok();

    info!("labsyncd stopped");
    Ok(exit)
}

/// Run one proxy reconciliation cycle
async fn run_sync_once(config: &Config) -> Result<SyncExitCode> {
    let sync_config = config.to_sync_config();
    let collaborators = build_collaborators(config)?;
    let (reconciler, events) = ProxyReconciler::new(
        collaborators.inventory,
        collaborators.runtime,
        &sync_config,
    )?;
    let event_task = tokio::spawn(drain_events(events));

    let result = reconciler.run_cycle().await?;
    drop(reconciler);
    event_task.await.ok();

    info!(
        status = ?result.status,
        services = result.service_count,
        duration_ms = result.duration_ms,
        "sync finished"
    );

    Ok(match result.status {
        CycleStatus::Applied | CycleStatus::NoServices => SyncExitCode::CleanShutdown,
        _ => SyncExitCode::RuntimeError,
    })
}

/// Add one service and converge immediately
async fn run_add(
    config: &Config,
    hostname: &str,
    address: IpAddr,
    port: u16,
    category: ServiceCategory,
) -> Result<SyncExitCode> {
    let sync_config = config.to_sync_config();
    let collaborators = build_collaborators(config)?;
    let (reconciler, events) = ProxyReconciler::new(
        collaborators.inventory,
        collaborators.runtime,
        &sync_config,
    )?;
    let event_task = tokio::spawn(drain_events(events));

    let result = reconciler.add_service(hostname, address, port, category).await?;
    drop(reconciler);
    event_task.await.ok();

    info!(status = ?result.status, "add finished");

    Ok(match result.status {
        CycleStatus::Applied => SyncExitCode::CleanShutdown,
        _ => SyncExitCode::RuntimeError,
    })
}

/// Validate the currently active configuration file
async fn run_check(config: &Config) -> Result<SyncExitCode> {
    let runtime = CommandProxy::new(&config.caddy_binary);
    let output = runtime.check_config(&config.caddyfile).await?;

    if output.success {
        info!(config = %config.caddyfile.display(), "configuration is valid");
        Ok(SyncExitCode::CleanShutdown)
    } else {
        error!(
            config = %config.caddyfile.display(),
            "configuration is invalid: {}",
            output.diagnostics
        );
        Ok(SyncExitCode::RuntimeError)
    }
}

async fn drain_events(mut events: tokio::sync::mpsc::Receiver<ReconcilerEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            ReconcilerEvent::CycleStarted => info!("reconciliation cycle started"),
            ReconcilerEvent::Applied { service_count } => {
                info!(services = service_count, "configuration applied")
            }
            ReconcilerEvent::ValidationRejected { diagnostics } => {
                warn!("candidate rejected: {}", diagnostics)
            }
            ReconcilerEvent::RolledBack { reason } => {
                warn!("rolled back to previous configuration: {}", reason)
            }
            ReconcilerEvent::NoServices => info!("no services to reconcile"),
        }
    }
}

/// Wait for SIGTERM or SIGINT
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let name = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(name)
}

/// Fallback for non-Unix platforms (CTRL-C only)
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
