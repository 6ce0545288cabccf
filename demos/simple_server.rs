//! Simple hub server
//!
//! Run with: cargo run --example simple_server [BIND_ADDR] [SERVER_NAME]
//!
//! Examples:
//!   cargo run --example simple_server                        # binds to 0.0.0.0:8080
//!   cargo run --example simple_server localhost              # binds to 127.0.0.1:8080
//!   cargo run --example simple_server 127.0.0.1:9000 hub1    # custom address and name
//!
//! ## Talking to it
//!
//! With websocat:
//!   websocat ws://localhost:8080/room1
//!   ["REGISTER", "Alice"]
//!   ["LOCATION", 48.85, 2.35]
//!
//! Reconnect and present the token from the REGISTER reply to take the
//! name back from the old connection:
//!   ["REGISTER", "Alice", "<token>"]
//!
//! Log level is controlled with RUST_LOG (default: info).

use std::net::SocketAddr;

use sigame_rs::{HubServer, ServerConfig};
use tracing_subscriber::EnvFilter;

fn parse_bind_addr(arg: Option<String>) -> Result<SocketAddr, String> {
    match arg.as_deref() {
        None => Ok(ServerConfig::default().bind_addr),
        Some("localhost") => Ok(SocketAddr::from(([127, 0, 0, 1], 8080))),
        Some(addr) => addr
            .parse()
            .map_err(|e| format!("invalid bind address {:?}: {}", addr, e)),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let bind_addr = parse_bind_addr(args.next())?;

    let mut config = ServerConfig::with_addr(bind_addr);
    if let Some(name) = args.next() {
        config = config.server_name(name);
    }

    let server = HubServer::new(config);
    println!("Hub server on ws://{}/<channel>", server.bind_addr());
    println!("Press Ctrl+C to stop");

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    let channels = server.registry().channel_count().await;
    println!("Stopped after serving {} channel(s)", channels);

    Ok(())
}
