use std::fmt::{Display, Formatter};
use std::net::{SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{lookup_host, TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_stream::{wrappers::TcpListenerStream, StreamExt};

use crate::config::{Credentials, ServerConfig, TcpConfig};
use crate::error::{Error, Result};
use crate::util::{link_stream, tune_stream};

pub use self::{
    codec::{Action, ReplyCode, Stage},
    listener::Socks5Listener,
    pool::WorkerPool,
    session::{Session, SessionContext},
    target::{DirectConnector, Socks5Target, TargetConnector},
};

pub mod codec;
mod listener;
mod pool;
mod session;
mod target;
