use std::net::SocketAddr;
use std::sync::Arc;

use log::{error, info};

use crate::config::{Config, ServerConfig, TcpConfig};
use crate::error::{Error, Result};
use crate::socks5::{DirectConnector, SessionContext, Socks5Listener, TargetConnector, WorkerPool};

/// A listen address together with the worker pool serving it.
pub struct Server {
    listener: Socks5Listener,
    pool: WorkerPool,
    tcp: TcpConfig,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let connector = DirectConnector::new(&config);
        Self::bind_with(config, connector).await
    }

    pub async fn bind_with<C: TargetConnector>(config: ServerConfig, connector: C) -> Result<Self> {
        let listener = Socks5Listener::listen(config.bind.as_str()).await?;
        let tcp = config.tcp.clone();
        let pool = WorkerPool::spawn(Arc::new(SessionContext::new(config, connector)));

        Ok(Self {
            listener,
            pool,
            tcp,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self) -> Result<()> {
        self.listener.dispatch(self.pool, &self.tcp).await
    }
}

/// Binds every configured server up front, so a bad address fails
/// startup, then serves them all until one stops.
pub async fn run_all(config: &Config) -> Result<()> {
    let mut servers = Vec::with_capacity(config.servers.len());
    for c in &config.servers {
        let server = Server::bind(c.clone())
            .await
            .map_err(|e| Error::Config(format!("listen on {}: {}", c.bind, e)))?;
        info!(
            "socks5 server listening on {} with {} workers",
            server.local_addr()?,
            c.max_connections
        );
        servers.push(tokio::spawn(server.run()));
    }

    for server in servers {
        match server.await {
            Ok(r) => r?,
            Err(e) => error!("server task failed: {}", e),
        }
    }

    Ok(())
}
