use clap::{App, Arg};
use log::{info, warn};

use socks5d::config::Config;
use socks5d::error::Result;
use socks5d::server::run_all;

#[tokio::main]
async fn main() -> Result<()> {
    let matches = App::new("socks5d")
        .version(env!("CARGO_PKG_VERSION"))
        .author("南浦月 <nanpuyue@gmail.com>")
        .about("SOCKS5 proxy server with a bounded worker pool")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("CONFIG")
                .help("Specify the config file")
                .takes_value(true)
                .required(true),
        )
        .arg(
            Arg::with_name("check")
                .long("check")
                .help("Validate the config file and exit")
                .takes_value(false),
        )
        .get_matches();

    let config_path = matches.value_of("config").unwrap();
    let config = Config::load(config_path)?;
    if matches.is_present("check") {
        println!("{}: ok", config_path);
        return Ok(());
    }

    env_logger::Builder::new()
        .filter_level(config.level_filter())
        .parse_default_env()
        .init();

    #[cfg(target_family = "unix")]
    match socks5d::util::raise_nofile_limit(config.max_open_files()) {
        Ok(limit) => info!("open file limit is {}", limit),
        Err(e) => warn!("failed to raise open file limit: {}", e),
    }

    info!("loaded {} server(s) from {}", config.servers.len(), config_path);
    run_all(&config).await
}
