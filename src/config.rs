use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use log::LevelFilter;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const DEFAULT_CONNECT_TIMEOUT: u64 = 1000;

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    pub log_level: u8,
    pub servers: Vec<ServerConfig>,
}

/// One listen address and the worker pool behind it. Timeouts are in
/// milliseconds.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ServerConfig {
    pub bind: String,
    pub max_connections: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub flow_timeout: u64,
    pub read_timeout: u64,
    pub write_timeout: u64,
    pub wait_timeout: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolve_timeout: Option<u64>,
    #[serde(default)]
    pub tcp: TcpConfig,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct TcpConfig {
    pub no_delay: bool,
    pub keep_alive: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let config: Config = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.servers.is_empty() {
            return Err(Error::Config("no server configured".into()));
        }
        self.servers.iter().try_for_each(ServerConfig::validate)
    }

    pub fn level_filter(&self) -> LevelFilter {
        match self.log_level {
            0 => LevelFilter::Trace,
            1 => LevelFilter::Info,
            2 => LevelFilter::Warn,
            3 | 4 => LevelFilter::Error,
            _ => LevelFilter::Off,
        }
    }

    /// Descriptors needed when every worker holds a client and a
    /// destination socket at once.
    pub fn max_open_files(&self) -> u64 {
        self.servers
            .iter()
            .map(|s| s.max_connections as u64 * 2 + 1)
            .sum::<u64>()
            + 64
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        let invalid = |desc: &str| Err(Error::Config(format!("{}: {}", self.bind, desc)));

        if self.max_connections == 0 {
            return invalid("max_connections must be at least 1");
        }
        if [
            self.flow_timeout,
            self.read_timeout,
            self.write_timeout,
            self.wait_timeout,
        ]
        .contains(&0)
            || self.connect_timeout == Some(0)
            || self.resolve_timeout == Some(0)
        {
            return invalid("timeouts must be non-zero");
        }
        if self.user.is_some() != self.password.is_some() {
            return invalid("user and password must be set together");
        }

        Ok(())
    }

    /// Username/password authentication is only enabled when both halves
    /// are present and non-empty.
    pub fn credentials(&self) -> Option<Credentials> {
        match (&self.user, &self.password) {
            (Some(user), Some(password)) if !user.is_empty() && !password.is_empty() => {
                Some(Credentials {
                    user: user.clone(),
                    password: password.clone(),
                })
            }
            _ => None,
        }
    }

    pub fn flow_timeout(&self) -> Duration {
        Duration::from_millis(self.flow_timeout)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT))
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.resolve_timeout.unwrap_or(self.read_timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> ServerConfig {
        ServerConfig {
            bind: "127.0.0.1:1080".into(),
            max_connections: 4,
            user: None,
            password: None,
            flow_timeout: 60_000,
            read_timeout: 3000,
            write_timeout: 3000,
            wait_timeout: 500,
            connect_timeout: None,
            resolve_timeout: None,
            tcp: TcpConfig::default(),
        }
    }

    #[test]
    fn credentials_need_both_halves() {
        let mut c = server();
        assert_eq!(c.credentials(), None);

        c.user = Some("abc".into());
        c.password = Some("".into());
        assert_eq!(c.credentials(), None);

        c.password = Some("xyz".into());
        assert_eq!(
            c.credentials(),
            Some(Credentials {
                user: "abc".into(),
                password: "xyz".into()
            })
        );
    }

    #[test]
    fn optional_timeouts_fall_back() {
        let mut c = server();
        assert_eq!(c.connect_timeout(), Duration::from_secs(1));
        assert_eq!(c.resolve_timeout(), Duration::from_millis(3000));

        c.resolve_timeout = Some(250);
        assert_eq!(c.resolve_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn rejects_bad_values() {
        let mut c = server();
        assert!(c.validate().is_ok());

        c.max_connections = 0;
        assert!(c.validate().is_err());

        let mut c = server();
        c.wait_timeout = 0;
        assert!(c.validate().is_err());

        let mut c = server();
        c.user = Some("abc".into());
        assert!(c.validate().is_err());

        let empty = Config {
            log_level: 1,
            servers: vec![],
        };
        assert!(empty.validate().is_err());
    }

    #[test]
    fn open_file_budget_covers_workers() {
        let config = Config {
            log_level: 1,
            servers: vec![server(), server()],
        };
        assert_eq!(config.max_open_files(), 2 * (4 * 2 + 1) + 64);
    }
}
