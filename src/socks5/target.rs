use super::*;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Socks5Target {
    V4(SocketAddrV4),
    Domain(String, u16),
}

impl Display for Socks5Target {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::V4(s) => s.fmt(f),
            Self::Domain(d, p) => write!(f, "{}:{}", d, p),
        }
    }
}

/// Resolves and dials the destination of a CONNECT request.
#[async_trait]
pub trait TargetConnector: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Any failure maps to a "host unreachable" reply.
    async fn resolve(&self, target: &Socks5Target) -> Result<SocketAddr>;

    /// Any failure maps to a "network unreachable" reply.
    async fn connect(&self, addr: SocketAddr) -> Result<Self::Stream>;
}

/// Dials destinations straight from this host.
#[derive(Clone, Debug)]
pub struct DirectConnector {
    resolve_timeout: Duration,
    connect_timeout: Duration,
    tcp: TcpConfig,
}

impl DirectConnector {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            resolve_timeout: config.resolve_timeout(),
            connect_timeout: config.connect_timeout(),
            tcp: config.tcp.clone(),
        }
    }
}

#[async_trait]
impl TargetConnector for DirectConnector {
    type Stream = TcpStream;

    async fn resolve(&self, target: &Socks5Target) -> Result<SocketAddr> {
        let (domain, port) = match target {
            Socks5Target::V4(s) => return Ok((*s).into()),
            Socks5Target::Domain(d, p) => (d.as_str(), *p),
        };
        if domain.is_empty() {
            return Err(Error::Unreachable("empty domain".into()));
        }

        let unreachable = |e: String| Error::Unreachable(format!("{}: {}", target, e));
        let mut addrs = timeout(self.resolve_timeout, lookup_host((domain, port)))
            .await
            .map_err(|e| unreachable(e.to_string()))?
            .map_err(|e| unreachable(e.to_string()))?;

        addrs
            .next()
            .ok_or_else(|| unreachable("no address found".into()))
    }

    async fn connect(&self, addr: SocketAddr) -> Result<TcpStream> {
        let unreachable = |e: String| Error::Unreachable(format!("{}: {}", addr, e));
        let stream = timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|e| unreachable(e.to_string()))?
            .map_err(|e| unreachable(e.to_string()))?;

        tune_stream(&stream, &self.tcp)?;
        Ok(stream)
    }
}
