use std::io::ErrorKind;

use anyhow::{Context, Result};
use axum::Router;
use colored::Colorize;
use tokio::net::TcpListener;

/// Ports tried after the configured one is busy.
const PORT_ATTEMPTS: u16 = 10;

/// Bind `host:port`, moving to the next port while the address is in use.
pub async fn bind(host: &str, port: u16) -> Result<TcpListener> {
    let mut last_err = None;

    for offset in 0..PORT_ATTEMPTS {
        let Some(candidate) = port.checked_add(offset) else {
            break;
        };
        let addr = format!("{}:{}", host, candidate);
        match TcpListener::bind(&addr).await {
            Ok(listener) => {
                if offset > 0 {
                    tracing::info!("Port {} in use, bound {} instead", port, candidate);
                }
                return Ok(listener);
            }
            Err(e) if e.kind() == ErrorKind::AddrInUse => {
                tracing::debug!("{} in use", addr);
                last_err = Some(e);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to bind server to {}", addr));
            }
        }
    }

    let err = last_err.unwrap_or_else(|| ErrorKind::AddrInUse.into());
    Err(err).with_context(|| {
        format!(
            "No free port in {}..{} on {}",
            port,
            port.saturating_add(PORT_ATTEMPTS - 1),
            host
        )
    })
}

/// Serve `router` until Ctrl+C.
pub async fn run(listener: TcpListener, router: Router, base_path: &str) -> Result<()> {
    let addr = listener
        .local_addr()
        .context("Failed to read bound address")?;

    eprintln!();
    eprintln!(
        "  {} {}",
        "->".bright_green(),
        format!("Serving on http://{}{}/", addr, base_path).bold()
    );
    eprintln!("  {} Press {} to stop", "->".dimmed(), "Ctrl+C".bold());
    eprintln!();

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    eprintln!("\nShutting down...");
}
