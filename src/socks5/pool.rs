use super::*;

type Claimed = (TcpStream, SocketAddr);
type Slot = oneshot::Sender<Claimed>;

/// A fixed set of workers, each running one session at a time.
///
/// An idle worker parks a slot on the bounded `ready` queue; `offer` hands
/// a connection straight to such a slot, so a connection is only ever
/// accepted by the pool when a worker is free to run it.
pub struct WorkerPool {
    ready: mpsc::Receiver<Slot>,
    wait: Duration,
}

impl WorkerPool {
    /// Spawns `max_connections` workers. They exit once the pool is
    /// dropped.
    pub fn spawn<C: TargetConnector>(ctx: Arc<SessionContext<C>>) -> Self {
        let size = ctx.config.max_connections;
        let wait = ctx.config.wait_timeout();
        let (tx, ready) = mpsc::channel(size);

        for id in 0..size {
            tokio::spawn(work(id, tx.clone(), ctx.clone()));
        }

        Self { ready, wait }
    }

    /// Gives `stream` to an idle worker. If none frees up within the wait
    /// timeout the stream is dropped, closing it.
    pub async fn offer(&mut self, stream: TcpStream, peer: SocketAddr) -> Result<()> {
        let slot = match timeout(self.wait, self.ready.recv()).await {
            Ok(Some(slot)) => slot,
            Ok(None) | Err(_) => return Err(Error::QueueSaturated),
        };

        slot.send((stream, peer)).map_err(|_| Error::QueueSaturated)
    }
}

async fn work<C: TargetConnector>(
    id: usize,
    ready: mpsc::Sender<Slot>,
    ctx: Arc<SessionContext<C>>,
) {
    loop {
        let (slot, claimed) = oneshot::channel();
        if ready.send(slot).await.is_err() {
            break;
        }
        let (stream, peer) = match claimed.await {
            Ok(c) => c,
            Err(_) => continue,
        };

        debug!("worker {} serving {}", id, peer);
        // a panicking session only takes its own task down
        let session = tokio::spawn(Session::new(stream, peer, ctx.clone()).run());
        let result = match session.await {
            Ok(r) => r,
            Err(e) if e.is_panic() => Err(Error::protocol("session panicked")),
            Err(e) => Err(Error::protocol(e.to_string())),
        };

        match result {
            Ok(()) => info!("{} closed", peer),
            Err(e @ Error::Protocol(_)) | Err(e @ Error::Io(_)) => {
                warn!("{} dropped: {}", peer, e)
            }
            Err(e) => info!("{} closed: {}", peer, e),
        }
    }
    debug!("worker {} stopped", id);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Refuse;

    #[async_trait]
    impl TargetConnector for Refuse {
        type Stream = TcpStream;

        async fn resolve(&self, target: &Socks5Target) -> Result<SocketAddr> {
            Err(Error::Unreachable(target.to_string()))
        }

        async fn connect(&self, addr: SocketAddr) -> Result<TcpStream> {
            Err(Error::Unreachable(addr.to_string()))
        }
    }

    /// Blows up the session that asks it to resolve anything.
    struct Explode;

    #[async_trait]
    impl TargetConnector for Explode {
        type Stream = TcpStream;

        async fn resolve(&self, target: &Socks5Target) -> Result<SocketAddr> {
            panic!("resolving {}", target);
        }

        async fn connect(&self, addr: SocketAddr) -> Result<TcpStream> {
            Err(Error::Unreachable(addr.to_string()))
        }
    }

    fn context<C: TargetConnector>(connector: C, workers: usize, wait: u64) -> Arc<SessionContext<C>> {
        let config = ServerConfig {
            bind: "127.0.0.1:0".into(),
            max_connections: workers,
            user: None,
            password: None,
            flow_timeout: 1000,
            read_timeout: 2000,
            write_timeout: 500,
            wait_timeout: wait,
            connect_timeout: None,
            resolve_timeout: None,
            tcp: TcpConfig::default(),
        };
        Arc::new(SessionContext::new(config, connector))
    }

    async fn pair(listener: &TcpListener) -> (TcpStream, TcpStream, SocketAddr) {
        let addr = listener.local_addr().unwrap();
        let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        let (accepted, peer) = accepted.unwrap();
        (client.unwrap(), accepted, peer)
    }

    #[tokio::test]
    async fn saturated_pool_drops_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut pool = WorkerPool::spawn(context(Refuse, 1, 100));

        // the only worker sits in a handshake read that never completes
        let (mut first, accepted, peer) = pair(&listener).await;
        pool.offer(accepted, peer).await.unwrap();

        let (mut second, accepted, peer) = pair(&listener).await;
        assert!(matches!(
            pool.offer(accepted, peer).await,
            Err(Error::QueueSaturated)
        ));
        let mut buf = [0; 2];
        assert_eq!(second.read(&mut buf).await.unwrap(), 0);

        first.write_all(b"\x05\x01\x00").await.unwrap();
        first.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"\x05\x00");
    }

    #[tokio::test]
    async fn worker_is_reused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut pool = WorkerPool::spawn(context(Refuse, 1, 1000));

        for _ in 0..3 {
            let (mut client, accepted, peer) = pair(&listener).await;
            pool.offer(accepted, peer).await.unwrap();
            client.write_all(b"\x05\x01\x00").await.unwrap();
            let mut buf = [0; 2];
            client.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"\x05\x00");
            drop(client);
        }
    }

    #[tokio::test]
    async fn worker_survives_panicking_session() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut pool = WorkerPool::spawn(context(Explode, 1, 1000));

        let (mut client, accepted, peer) = pair(&listener).await;
        pool.offer(accepted, peer).await.unwrap();
        client.write_all(b"\x05\x01\x00").await.unwrap();
        let mut buf = [0; 2];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"\x05\x00");

        client
            .write_all(b"\x05\x01\x00\x01\x7f\x00\x00\x01\x1f\x90")
            .await
            .unwrap();
        let mut rest = Vec::new();
        // closed without a reply, a reset counts too
        if client.read_to_end(&mut rest).await.is_ok() {
            assert!(rest.is_empty());
        }

        let (mut client, accepted, peer) = pair(&listener).await;
        pool.offer(accepted, peer).await.unwrap();
        client.write_all(b"\x05\x01\x00").await.unwrap();
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"\x05\x00");
    }
}
