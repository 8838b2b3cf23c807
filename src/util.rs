#[cfg(target_family = "unix")]
use std::mem::ManuallyDrop;
#[cfg(target_family = "unix")]
use std::os::unix::io::{AsRawFd, FromRawFd};
use std::time::Duration;

#[cfg(target_family = "unix")]
use mio::net::TcpSocket;
use tokio::io::{self, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::config::TcpConfig;
use crate::error::Result;

const RELAY_BUFFER_SIZE: usize = 8192;

/// Copies both directions between `a` and `b` until one of them reaches
/// end-of-stream, fails, or sits idle longer than `idle`. The other
/// direction is abandoned at that point.
///
/// Returns the bytes copied `a -> b` and `b -> a`.
pub async fn link_stream<A: AsyncRead + AsyncWrite, B: AsyncRead + AsyncWrite>(
    a: A,
    b: B,
    idle: Duration,
) -> Result<(u64, u64)> {
    let (ar, aw) = &mut io::split(a);
    let (br, bw) = &mut io::split(b);
    let (mut sent, mut received) = (0, 0);

    let r = tokio::select! {
        r1 = copy_idle(ar, bw, idle, &mut sent) => r1,
        r2 = copy_idle(br, aw, idle, &mut received) => r2,
    };

    r.map(|_| (sent, received))
}

async fn copy_idle<R, W>(reader: &mut R, writer: &mut W, idle: Duration, total: &mut u64) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0; RELAY_BUFFER_SIZE];

    loop {
        let n = timeout(idle, reader.read(&mut buf)).await??;
        if n == 0 {
            return Ok(());
        }
        timeout(idle, writer.write_all(&buf[..n])).await??;
        *total += n as u64;
    }
}

pub fn tune_stream(stream: &TcpStream, tcp: &TcpConfig) -> Result<()> {
    if tcp.no_delay {
        stream.set_nodelay(true)?;
    }
    #[cfg(target_family = "unix")]
    if tcp.keep_alive {
        enable_keepalive(stream)?;
    }
    Ok(())
}

/// tokio has no keepalive knob, so the option is set through a mio socket
/// borrowing the same descriptor.
#[cfg(target_family = "unix")]
fn enable_keepalive(stream: &TcpStream) -> io::Result<()> {
    let socket = ManuallyDrop::new(unsafe { TcpSocket::from_raw_fd(stream.as_raw_fd()) });
    socket.set_keepalive(true)
}

/// Raises the soft RLIMIT_NOFILE towards `wanted`, capped by the hard
/// limit. Returns the soft limit in effect afterwards.
#[cfg(target_family = "unix")]
pub fn raise_nofile_limit(wanted: u64) -> Result<u64> {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    if unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) } != 0 {
        return Err(io::Error::last_os_error().into());
    }

    let wanted = (wanted as libc::rlim_t).min(limit.rlim_max);
    if limit.rlim_cur >= wanted {
        return Ok(limit.rlim_cur as u64);
    }

    limit.rlim_cur = wanted;
    if unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, &limit) } != 0 {
        return Err(io::Error::last_os_error().into());
    }
    Ok(wanted as u64)
}
