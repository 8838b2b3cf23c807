//! Stage-indexed SOCKS5 request parsing.
//!
//! Every handshake round is a single read of at most [`BUFFER_SIZE`]
//! bytes. The functions here only look at that window and the configured
//! credentials, so they never touch a socket.
use std::net::{Ipv4Addr, SocketAddrV4};

use super::Socks5Target;
use crate::config::Credentials;
use crate::error::{Error, Result};

pub const BUFFER_SIZE: usize = 2048;

pub const SOCKS_VERSION: u8 = 0x05;
pub const AUTH_VERSION: u8 = 0x01;

pub const METHOD_NONE: u8 = 0x00;
pub const METHOD_PASSWORD: u8 = 0x02;
pub const METHOD_UNACCEPTABLE: u8 = 0xff;

pub const CMD_CONNECT: u8 = 0x01;

pub const ATYP_IPV4: u8 = 0x01;
pub const ATYP_DOMAIN: u8 = 0x03;

pub const AUTH_SUCCESS: &[u8] = b"\x01\x00";
pub const AUTH_FAILURE: &[u8] = b"\x01\x01";

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Accept,
    Auth,
    Command,
    Flow,
    Finished,
}

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReplyCode {
    Succeeded = 0x00,
    NetworkUnreachable = 0x03,
    HostUnreachable = 0x04,
    CommandNotSupported = 0x07,
    AddressTypeNotSupported = 0x08,
}

impl ReplyCode {
    /// The command reply always carries an all-zero IPv4 bind address.
    pub fn to_bytes(self) -> [u8; 10] {
        [SOCKS_VERSION, self as u8, 0x00, ATYP_IPV4, 0, 0, 0, 0, 0, 0]
    }
}

#[derive(Debug)]
pub enum Action {
    /// Send `reply`, then continue at `next`.
    Reply { reply: Vec<u8>, next: Stage },
    /// Send `reply`, then end the session with `error`.
    Reject { reply: Vec<u8>, error: Error },
    /// A CONNECT request was parsed; the driver resolves and dials it.
    Connect(Socks5Target),
}

impl Action {
    fn reject(reply: &[u8], error: Error) -> Self {
        Self::Reject {
            reply: reply.to_vec(),
            error,
        }
    }
}

/// Parses one handshake round for `stage`.
///
/// `Err` means the input can't be answered and the connection should be
/// dropped without a reply.
pub fn handle(stage: Stage, credentials: Option<&Credentials>, buf: &[u8]) -> Result<Action> {
    match stage {
        Stage::Accept => accept(credentials, buf),
        Stage::Auth => match credentials {
            Some(c) => authenticate(c, buf),
            None => Err(Error::protocol("unexpected auth stage")),
        },
        Stage::Command => command(buf),
        Stage::Flow | Stage::Finished => {
            Err(Error::protocol(format!("no request expected in {:?} stage", stage)))
        }
    }
}

pub fn accept(credentials: Option<&Credentials>, buf: &[u8]) -> Result<Action> {
    if buf.len() < 3 {
        return Err(Error::protocol("method selection too short"));
    }
    if buf[0] != SOCKS_VERSION {
        return Err(Error::protocol(format!("unsupported version {}", buf[0])));
    }
    let end = 2 + buf[1] as usize;
    let methods = buf
        .get(2..end)
        .ok_or_else(|| Error::protocol("method list truncated"))?;

    let (wanted, next) = match credentials {
        Some(_) => (METHOD_PASSWORD, Stage::Auth),
        None => (METHOD_NONE, Stage::Command),
    };

    if methods.contains(&wanted) {
        Ok(Action::Reply {
            reply: vec![SOCKS_VERSION, wanted],
            next,
        })
    } else {
        Ok(Action::reject(
            &[SOCKS_VERSION, METHOD_UNACCEPTABLE],
            Error::Unsupported(format!("no acceptable method in {:02x?}", methods)),
        ))
    }
}

pub fn authenticate(credentials: &Credentials, buf: &[u8]) -> Result<Action> {
    if buf.len() < 5 {
        return Err(Error::protocol("auth request too short"));
    }
    if buf[0] != AUTH_VERSION {
        return Err(Error::protocol(format!(
            "unsupported auth version {}",
            buf[0]
        )));
    }

    let truncated = || Error::protocol("auth request truncated");
    let ulen = buf[1] as usize;
    let user = buf.get(2..2 + ulen).ok_or_else(truncated)?;
    let plen = *buf.get(2 + ulen).ok_or_else(truncated)? as usize;
    let password = buf.get(3 + ulen..3 + ulen + plen).ok_or_else(truncated)?;

    // both halves are compared so a wrong user and a wrong password take
    // the same path
    let matched = (user == credentials.user.as_bytes())
        & (password == credentials.password.as_bytes());

    if matched {
        Ok(Action::Reply {
            reply: AUTH_SUCCESS.to_vec(),
            next: Stage::Command,
        })
    } else {
        Ok(Action::reject(
            AUTH_FAILURE,
            Error::AuthRejected(String::from_utf8_lossy(user).into_owned()),
        ))
    }
}

pub fn command(buf: &[u8]) -> Result<Action> {
    let n = buf.len();
    if n < 7 {
        return Err(Error::protocol("command request too short"));
    }
    if buf[0] != SOCKS_VERSION {
        return Err(Error::protocol(format!("unsupported version {}", buf[0])));
    }
    if buf[1] != CMD_CONNECT {
        return Ok(Action::reject(
            &ReplyCode::CommandNotSupported.to_bytes(),
            Error::Unsupported(format!("command {:#04x}", buf[1])),
        ));
    }

    let target = match buf[3] {
        ATYP_IPV4 => {
            if n != 10 {
                return Err(Error::protocol(format!("ipv4 request of {} bytes", n)));
            }
            Socks5Target::parse_ipv4(&buf[4..])
        }
        // the length octet at [4] is not trusted, the domain runs up to
        // the trailing port
        ATYP_DOMAIN => match Socks5Target::try_parse_domain(&buf[5..]) {
            Ok(target) => target,
            Err(e @ Error::Unreachable(_)) => {
                return Ok(Action::reject(&ReplyCode::HostUnreachable.to_bytes(), e))
            }
            Err(e) => return Err(e),
        },
        atyp => {
            return Ok(Action::reject(
                &ReplyCode::AddressTypeNotSupported.to_bytes(),
                Error::Unsupported(format!("address type {:#04x}", atyp)),
            ))
        }
    };

    Ok(Action::Connect(target))
}

impl Socks5Target {
    /// `data` holds the 4 address octets followed by the port.
    pub(super) fn parse_ipv4(data: &[u8]) -> Self {
        Self::V4(SocketAddrV4::new(
            Ipv4Addr::new(data[0], data[1], data[2], data[3]),
            u16::from_be_bytes([data[4], data[5]]),
        ))
    }

    /// `data` holds the domain followed by the port.
    pub(super) fn try_parse_domain(data: &[u8]) -> Result<Self> {
        let len = data.len();
        if len < 2 {
            return Err(Error::protocol("domain request truncated"));
        }
        let domain = match std::str::from_utf8(&data[..len - 2]) {
            Ok(s) => s.to_owned(),
            // no name can resolve from these bytes
            Err(e) => return Err(Error::Unreachable(format!("invalid domain: {}", e))),
        };
        let port = u16::from_be_bytes([data[len - 2], data[len - 1]]);
        Ok(Self::Domain(domain, port))
    }
}
