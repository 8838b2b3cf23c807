use super::*;

pub struct Socks5Listener {
    listener: TcpListener,
}

impl Socks5Listener {
    pub async fn listen<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        Ok(Self {
            listener: TcpListener::bind(addr).await?,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections forever, handing each one to `pool`. The loop
    /// waits at most the pool's wait timeout per connection.
    pub async fn dispatch(self, mut pool: WorkerPool, tcp: &TcpConfig) -> Result<()> {
        let mut incoming = TcpListenerStream::new(self.listener);

        while let Some(stream) = incoming.next().await {
            let stream = match stream {
                Ok(s) => s,
                Err(e) => {
                    warn!("accept failed: {}", e);
                    // usually out of descriptors, give workers a moment
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            };
            let peer = match stream.peer_addr() {
                Ok(p) => p,
                Err(e) => {
                    debug!("peer gone before dispatch: {}", e);
                    continue;
                }
            };
            info!("accepted connection from {}", peer);

            if let Err(e) = tune_stream(&stream, tcp) {
                debug!("{} socket options not applied: {}", peer, e);
            }
            if let Err(e) = pool.offer(stream, peer).await {
                warn!("{} closed while waiting for a worker: {}", peer, e);
            }
        }

        Ok(())
    }
}
