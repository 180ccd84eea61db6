//! Process-level assembly: the sync ticker and the admin channel, started
//! together and stopped together on SIGTERM/SIGINT.

use std::sync::Arc;

use crate::admin::AdminServer;
use crate::app::{AppContext, EstuaryError, Result};
use crate::config::Config;
use crate::sync::Synchronizer;

pub struct Service {
    sync: Synchronizer,
    admin: AdminServer,
}

impl Service {
    pub fn new(ctx: Arc<AppContext>, config: &Config) -> Self {
        Self {
            sync: Synchronizer::new(ctx.store.clone(), ctx.puller.clone(), &config.sync),
            admin: AdminServer::new(ctx.users.clone(), &config.admin),
        }
    }

    pub fn synchronizer(&self) -> &Synchronizer {
        &self.sync
    }

    /// Bind the admin socket, then start ticking. A bind failure is returned
    /// before any background work begins.
    pub fn start(&self) -> Result<()> {
        self.admin.start()?;
        if let Err(e) = self.sync.start() {
            tracing::error!(error = %e, "Failed to start synchronizer");
            return Err(e);
        }
        tracing::info!(pid = std::process::id(), "Estuary started");
        Ok(())
    }

    pub async fn stop(&self) {
        tracing::info!("Shutting down");
        tokio::join!(self.admin.stop(), self.sync.stop());
    }

    /// Start, wait for a termination signal, then stop gracefully.
    pub async fn run(&self) -> Result<()> {
        if let Err(e) = self.start() {
            self.stop().await;
            return Err(e);
        }
        let signal = shutdown_signal().await;
        self.stop().await;
        signal
    }
}

#[cfg(unix)]
async fn shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| EstuaryError::Other(format!("failed to set up SIGTERM handler: {}", e)))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| EstuaryError::Other(format!("failed to set up SIGINT handler: {}", e)))?;

    tokio::select! {
        _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
        _ = sigint.recv() => tracing::info!("Received SIGINT"),
    }
    Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
