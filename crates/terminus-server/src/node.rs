//! Terminus node - the main application entry point.
//!
//! Architecture:
//! - Single process, all reservation state in one in-memory coordinator
//! - HTTP API + WebSocket feed for clients
//! - Unix admin socket for local operator commands (terminus-admin CLI)
//! - Optional background sweep of expired claim budgets

use crate::admin_socket::AdminSocket;
use crate::api;
use crate::error::{Error, Result};
use std::fmt::Display;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use terminus_core::{
    AddressResolver, AdminToken, Catalog, Coordinator, CoordinatorConfig, RateGuardConfig,
};

/// How callers without a logged-in handle are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdentityMode {
    /// Callers must register or log in with a handle.
    #[default]
    Registered,
    /// The caller's address is an identity on its own.
    Anonymous,
}

impl FromStr for IdentityMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "registered" => Ok(Self::Registered),
            "anonymous" => Ok(Self::Anonymous),
            other => Err(Error::Config(format!("unknown identity mode: {other}"))),
        }
    }
}

/// Configuration for a terminus node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// HTTP API listen address
    pub api_addr: SocketAddr,

    /// Admin socket path (for terminus-admin CLI)
    pub admin_socket: PathBuf,

    /// Shared secret for force-release and reset-all
    pub admin_token: AdminToken,

    pub identity_mode: IdentityMode,

    /// Take the caller address from X-Forwarded-For / X-Real-IP
    pub trust_proxy: bool,

    /// Claim budget per identity
    pub rate: RateGuardConfig,

    /// Catalog file; the built-in Paris metro list when unset
    pub catalog_path: Option<PathBuf>,

    /// Interval between feed heartbeats
    pub heartbeat_interval: Duration,

    /// Interval between expired-budget sweeps; `None` disables the sweep
    pub sweep_interval: Option<Duration>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            api_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            admin_socket: PathBuf::from("./terminus.sock"),
            admin_token: AdminToken::new("reset123"),
            identity_mode: IdentityMode::Registered,
            trust_proxy: false,
            rate: RateGuardConfig::default(),
            catalog_path: None,
            heartbeat_interval: Duration::from_secs(30),
            sweep_interval: Some(Duration::from_secs(600)),
        }
    }
}

impl NodeConfig {
    /// Create config from environment variables with sensible defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let rate = RateGuardConfig {
            points: parse_var(&lookup, "TERMINUS_RATE_POINTS", defaults.rate.points)?,
            window: Duration::from_secs(parse_var(
                &lookup,
                "TERMINUS_RATE_WINDOW_SECS",
                defaults.rate.window.as_secs(),
            )?),
        };
        if rate.points == 0 || rate.window.is_zero() {
            return Err(Error::Config(
                "rate points and window must be positive".to_string(),
            ));
        }

        let heartbeat_secs: u64 = parse_var(&lookup, "TERMINUS_HEARTBEAT_SECS", 30)?;
        if heartbeat_secs == 0 {
            return Err(Error::Config("heartbeat interval must be positive".to_string()));
        }
        let sweep_secs: u64 = parse_var(&lookup, "TERMINUS_SWEEP_SECS", 600)?;

        Ok(Self {
            api_addr: parse_var(&lookup, "TERMINUS_API_ADDR", defaults.api_addr)?,
            admin_socket: lookup("TERMINUS_ADMIN_SOCKET")
                .map(PathBuf::from)
                .unwrap_or(defaults.admin_socket),
            admin_token: lookup("TERMINUS_ADMIN_TOKEN")
                .map(AdminToken::new)
                .unwrap_or(defaults.admin_token),
            identity_mode: parse_var(&lookup, "TERMINUS_IDENTITY_MODE", defaults.identity_mode)?,
            trust_proxy: match lookup("TERMINUS_TRUST_PROXY") {
                Some(value) => parse_flag("TERMINUS_TRUST_PROXY", &value)?,
                None => defaults.trust_proxy,
            },
            rate,
            catalog_path: lookup("TERMINUS_CATALOG").map(PathBuf::from),
            heartbeat_interval: Duration::from_secs(heartbeat_secs),
            sweep_interval: (sweep_secs > 0).then(|| Duration::from_secs(sweep_secs)),
        })
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("invalid {name}: {e}"))),
        None => Ok(default),
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(Error::Config(format!("invalid {name}: {other}"))),
    }
}

/// Load the catalog from `path`, or the built-in one.
pub fn load_catalog(path: Option<&Path>) -> Result<Catalog> {
    let catalog = match path {
        Some(path) => Catalog::parse(&std::fs::read_to_string(path)?)?,
        None => Catalog::paris_metro()?,
    };
    Ok(catalog)
}

/// Shared state for request handlers.
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub trust_proxy: bool,
    pub heartbeat_interval: Duration,
}

/// A terminus node instance.
pub struct TerminusNode {
    state: Arc<AppState>,
    config: NodeConfig,
}

impl TerminusNode {
    /// Create a new node: load the catalog and build the coordinator.
    pub fn new(config: NodeConfig) -> Result<Self> {
        let catalog = load_catalog(config.catalog_path.as_deref())?;
        tracing::info!("Catalog loaded: {} items", catalog.len());

        let coordinator_config = CoordinatorConfig {
            admin_token: config.admin_token.clone(),
            rate: config.rate,
            ..CoordinatorConfig::default()
        };
        let resolver = match config.identity_mode {
            IdentityMode::Registered => AddressResolver::registered(),
            IdentityMode::Anonymous => AddressResolver::anonymous(),
        };
        let coordinator = Arc::new(Coordinator::with_resolver(
            catalog,
            coordinator_config,
            resolver,
        ));

        let state = Arc::new(AppState {
            coordinator,
            trust_proxy: config.trust_proxy,
            heartbeat_interval: config.heartbeat_interval,
        });

        Ok(Self { state, config })
    }

    /// Get the shared state (for API handlers).
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Run the node (starts admin socket, budget sweep and HTTP server).
    pub async fn run(self) -> Result<()> {
        tracing::info!("Terminus node starting");
        tracing::info!("  API: http://{}", self.config.api_addr);
        tracing::info!("  Admin: {:?}", self.config.admin_socket);
        tracing::info!("  Identity mode: {:?}", self.config.identity_mode);

        let admin_socket = AdminSocket::new(
            Arc::clone(&self.state.coordinator),
            self.config.admin_socket.clone(),
        );
        tokio::spawn(async move {
            if let Err(e) = admin_socket.run().await {
                tracing::error!("Admin socket error: {}", e);
            }
        });

        if let Some(every) = self.config.sweep_interval {
            let coordinator = Arc::clone(&self.state.coordinator);
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(every);
                interval.tick().await;
                loop {
                    interval.tick().await;
                    let dropped = coordinator.sweep_budgets().await;
                    if dropped > 0 {
                        tracing::debug!("Swept {} expired budgets", dropped);
                    }
                }
            });
        }

        let app = api::build_router(Arc::clone(&self.state));

        let listener = tokio::net::TcpListener::bind(self.config.api_addr).await?;
        tracing::info!("HTTP server listening on {}", self.config.api_addr);

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        tracing::info!("Terminus node stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
