//! Unix socket server for admin commands.
//!
//! Provides a local IPC interface for inspecting claims and running the
//! administrative transitions. Mutating commands carry the admin token and go
//! through the coordinator like their HTTP counterparts.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use terminus_core::{ClaimRecord, Coordinator};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

/// Admin command sent over the socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum AdminCommand {
    /// Health check
    Ping,
    /// List current claims with their claimants
    ListClaims,
    /// Release an item whoever holds it
    ForceRelease { item: String, admin_token: String },
    /// Release everything and reset all budgets
    ResetAll { admin_token: String },
    /// Cross-check internal indexes
    Audit,
}

/// Response from admin command.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdminResponse {
    Ok { message: String },
    Error { error: String },
    Claims { claims: Vec<ClaimRecord> },
    Audit { problems: Vec<String> },
    Pong,
}

/// Admin socket server.
pub struct AdminSocket {
    coordinator: Arc<Coordinator>,
    socket_path: PathBuf,
}

impl AdminSocket {
    /// Create a new admin socket server.
    pub fn new(coordinator: Arc<Coordinator>, socket_path: impl Into<PathBuf>) -> Self {
        Self {
            coordinator,
            socket_path: socket_path.into(),
        }
    }

    /// Bind the socket, replacing a stale socket file.
    pub fn bind(&self) -> Result<UnixListener> {
        let _ = std::fs::remove_file(&self.socket_path);
        let listener = UnixListener::bind(&self.socket_path)?;
        tracing::info!("Admin socket listening on {:?}", self.socket_path);
        Ok(listener)
    }

    /// Run the admin socket server.
    pub async fn run(self) -> Result<()> {
        let listener = self.bind()?;
        self.serve(listener).await
    }

    /// Accept connections on an already bound listener.
    pub async fn serve(self, listener: UnixListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let coordinator = Arc::clone(&self.coordinator);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, coordinator).await {
                            tracing::error!("Admin connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to accept admin connection: {}", e);
                }
            }
        }
    }

    /// Get the socket path.
    pub fn socket_path(&self) -> &PathBuf {
        &self.socket_path
    }
}

async fn handle_connection(stream: UnixStream, coordinator: Arc<Coordinator>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let response = match serde_json::from_str::<AdminCommand>(&line) {
            Ok(cmd) => execute_command(cmd, &coordinator).await,
            Err(e) => AdminResponse::Error {
                error: format!("Invalid command: {}", e),
            },
        };

        let response_json = serde_json::to_string(&response)? + "\n";
        writer.write_all(response_json.as_bytes()).await?;
        line.clear();
    }

    Ok(())
}

async fn execute_command(cmd: AdminCommand, coordinator: &Coordinator) -> AdminResponse {
    match cmd {
        AdminCommand::Ping => AdminResponse::Pong,

        AdminCommand::ListClaims => AdminResponse::Claims {
            claims: coordinator.claims().await,
        },

        AdminCommand::ForceRelease { item, admin_token } => {
            match coordinator.force_release(&item, &admin_token).await {
                Ok(()) => AdminResponse::Ok {
                    message: format!("Released {}", item),
                },
                Err(e) => AdminResponse::Error {
                    error: e.to_string(),
                },
            }
        }

        AdminCommand::ResetAll { admin_token } => match coordinator.reset_all(&admin_token).await {
            Ok(released) => AdminResponse::Ok {
                message: format!("Released {} claims", released),
            },
            Err(e) => AdminResponse::Error {
                error: e.to_string(),
            },
        },

        AdminCommand::Audit => {
            let problems = coordinator.audit().await;
            if !problems.is_empty() {
                tracing::warn!("Audit found {} inconsistencies", problems.len());
            }
            AdminResponse::Audit { problems }
        }
    }
}
