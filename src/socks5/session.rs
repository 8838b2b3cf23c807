use super::codec::{self, BUFFER_SIZE};
use super::*;

/// Everything a session needs from its server, shared by all workers of
/// one listener.
pub struct SessionContext<C> {
    pub config: ServerConfig,
    pub credentials: Option<Credentials>,
    pub connector: C,
}

impl<C: TargetConnector> SessionContext<C> {
    pub fn new(config: ServerConfig, connector: C) -> Self {
        Self {
            credentials: config.credentials(),
            config,
            connector,
        }
    }
}

/// One client connection and, once the CONNECT succeeded, its
/// destination. Both sockets close when the session is dropped.
pub struct Session<C: TargetConnector, S> {
    ctx: Arc<SessionContext<C>>,
    peer: SocketAddr,
    client: S,
    upstream: Option<C::Stream>,
    stage: Stage,
    buf: Vec<u8>,
}

impl<C, S> Session<C, S>
where
    C: TargetConnector,
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(client: S, peer: SocketAddr, ctx: Arc<SessionContext<C>>) -> Self {
        Self {
            ctx,
            peer,
            client,
            upstream: None,
            stage: Stage::Accept,
            buf: vec![0; BUFFER_SIZE],
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Drives the handshake and then the relay. Consumes the session so
    /// it can only be run once.
    pub async fn run(mut self) -> Result<()> {
        loop {
            match self.stage {
                Stage::Flow => return self.relay().await,
                Stage::Finished => return Ok(()),
                _ => self.step().await?,
            }
        }
    }

    /// Runs exactly one handshake round.
    pub async fn step(&mut self) -> Result<()> {
        let n = timeout(self.ctx.config.read_timeout(), self.client.read(&mut self.buf)).await??;
        if n == 0 {
            return Err(Error::protocol(format!(
                "closed by client in {:?} stage",
                self.stage
            )));
        }
        debug!("{} [{:?}] <- {:02x?}", self.peer, self.stage, &self.buf[..n]);

        match codec::handle(self.stage, self.ctx.credentials.as_ref(), &self.buf[..n])? {
            Action::Reply { reply, next } => {
                self.reply(&reply).await?;
                if self.stage == Stage::Auth {
                    info!("{} authenticated", self.peer);
                }
                self.advance(next);
                Ok(())
            }
            Action::Reject { reply, error } => {
                self.reply(&reply).await?;
                self.advance(Stage::Finished);
                Err(error)
            }
            Action::Connect(target) => self.connect(target).await,
        }
    }

    async fn connect(&mut self, target: Socks5Target) -> Result<()> {
        let connector = &self.ctx.connector;
        let dialed = match connector.resolve(&target).await {
            Ok(addr) => {
                info!("{} -> {} ({})", self.peer, target, addr);
                connector
                    .connect(addr)
                    .await
                    .map_err(|e| (ReplyCode::NetworkUnreachable, e))
            }
            Err(e) => Err((ReplyCode::HostUnreachable, e)),
        };

        match dialed {
            Ok(stream) => {
                self.upstream = Some(stream);
                self.reply(&ReplyCode::Succeeded.to_bytes()).await?;
                self.advance(Stage::Flow);
                Ok(())
            }
            Err((code, e)) => {
                self.reply(&code.to_bytes()).await?;
                self.advance(Stage::Finished);
                Err(e)
            }
        }
    }

    async fn reply(&mut self, reply: &[u8]) -> Result<()> {
        timeout(self.ctx.config.write_timeout(), self.client.write_all(reply)).await??;
        debug!("{} [{:?}] -> {:02x?}", self.peer, self.stage, reply);
        Ok(())
    }

    fn advance(&mut self, next: Stage) {
        debug_assert!(next > self.stage, "{:?} -> {:?}", self.stage, next);
        debug!("{} {:?} -> {:?}", self.peer, self.stage, next);
        self.stage = next;
    }

    async fn relay(&mut self) -> Result<()> {
        let upstream = match self.upstream.as_mut() {
            Some(s) => s,
            None => return Err(Error::protocol("flow stage without destination")),
        };

        info!("{} relay started", self.peer);
        let result = link_stream(&mut self.client, upstream, self.ctx.config.flow_timeout()).await;
        self.advance(Stage::Finished);

        let (sent, received) = result?;
        info!(
            "{} relay finished, {} bytes sent, {} bytes received",
            self.peer, sent, received
        );
        Ok(())
    }
}
