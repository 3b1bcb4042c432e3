//! terminus-admin CLI tool
//!
//! Inspects and administers claims on a running terminus node.
//!
//! Usage:
//!   terminus-admin ping
//!   terminus-admin list
//!   terminus-admin release <item>
//!   terminus-admin reset-all
//!   terminus-admin audit

use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;

/// Admin command sent over the socket.
#[derive(Debug, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum AdminCommand {
    Ping,
    ListClaims,
    ForceRelease { item: String, admin_token: String },
    ResetAll { admin_token: String },
    Audit,
}

#[derive(Debug, Deserialize)]
struct Claim {
    item: String,
    handle: Option<String>,
    claimant: Option<String>,
}

/// Response from admin command.
#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum AdminResponse {
    Ok { message: String },
    Error { error: String },
    Claims { claims: Vec<Claim> },
    Audit { problems: Vec<String> },
    Pong,
}

fn print_usage() {
    eprintln!("terminus-admin - Administer claims on a terminus node");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  terminus-admin ping              Check if the node is running");
    eprintln!("  terminus-admin list              List current claims");
    eprintln!("  terminus-admin release <item>    Force-release an item");
    eprintln!("  terminus-admin reset-all         Release every claim and reset budgets");
    eprintln!("  terminus-admin audit             Check internal consistency");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  TERMINUS_ADMIN_SOCKET  Path to admin socket (default: ./terminus.sock)");
    eprintln!("  TERMINUS_ADMIN_TOKEN   Admin token for release and reset-all");
}

fn get_socket_path() -> PathBuf {
    std::env::var("TERMINUS_ADMIN_SOCKET")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./terminus.sock"))
}

fn get_admin_token() -> Result<String, String> {
    std::env::var("TERMINUS_ADMIN_TOKEN")
        .map_err(|_| "TERMINUS_ADMIN_TOKEN is not set".to_string())
}

fn send_command(cmd: AdminCommand) -> Result<AdminResponse, String> {
    let socket_path = get_socket_path();

    let mut stream = UnixStream::connect(&socket_path).map_err(|e| {
        format!(
            "Failed to connect to terminus-node at {:?}: {}\n\
             Is the terminus-node running?",
            socket_path, e
        )
    })?;

    let cmd_json = serde_json::to_string(&cmd).map_err(|e| e.to_string())?;
    writeln!(stream, "{}", cmd_json).map_err(|e| e.to_string())?;

    let mut reader = BufReader::new(&stream);
    let mut response_line = String::new();
    reader
        .read_line(&mut response_line)
        .map_err(|e| e.to_string())?;

    serde_json::from_str(&response_line).map_err(|e| format!("Invalid response: {}", e))
}

fn parse_command(args: &[String]) -> Result<AdminCommand, String> {
    match args.first().map(String::as_str) {
        Some("ping") => Ok(AdminCommand::Ping),
        Some("list") => Ok(AdminCommand::ListClaims),
        Some("release") => {
            // Station names contain spaces; accept them unquoted.
            let item = args[1..].join(" ");
            if item.trim().is_empty() {
                return Err("release requires an item argument".to_string());
            }
            Ok(AdminCommand::ForceRelease {
                item,
                admin_token: get_admin_token()?,
            })
        }
        Some("reset-all") => Ok(AdminCommand::ResetAll {
            admin_token: get_admin_token()?,
        }),
        Some("audit") => Ok(AdminCommand::Audit),
        Some(other) => Err(format!("Unknown command: {}", other)),
        None => Err("Missing command".to_string()),
    }
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if matches!(args.first().map(String::as_str), Some("-h" | "--help" | "help")) {
        print_usage();
        std::process::exit(0);
    }

    let cmd = match parse_command(&args) {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_usage();
            std::process::exit(1);
        }
    };

    match send_command(cmd) {
        Ok(response) => match response {
            AdminResponse::Ok { message } => {
                println!("{}", message);
            }
            AdminResponse::Error { error } => {
                eprintln!("Error: {}", error);
                std::process::exit(1);
            }
            AdminResponse::Claims { claims } => {
                if claims.is_empty() {
                    println!("(none)");
                }
                for claim in claims {
                    let who = claim
                        .handle
                        .or(claim.claimant)
                        .unwrap_or_else(|| "?".to_string());
                    println!("{}\t{}", claim.item, who);
                }
            }
            AdminResponse::Audit { problems } => {
                if problems.is_empty() {
                    println!("consistent");
                } else {
                    for problem in &problems {
                        println!("{}", problem);
                    }
                    std::process::exit(1);
                }
            }
            AdminResponse::Pong => {
                println!("pong - terminus-node is running");
            }
        },
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}
