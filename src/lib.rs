pub mod config;
pub mod error;
pub mod server;
pub mod socks5;
pub mod util;
