use std::process;

use clap::Parser;
use log::info;

use hopline_proxy::{ListenConfig, ProxyConfig, SimpleServer};

#[derive(Debug, Parser)]
#[command(name = "hopline-proxy-cli", version, about = "SOCKS4/4a proxy server")]
struct Cli {
    #[arg(
        short = 'a',
        long = "address",
        default_value = "0.0.0.0:1080",
        help = "Listen on the address",
        value_name = "ADDRESS"
    )]
    address: String,

    #[arg(
        short = 'u',
        long = "username",
        help = "Require this username on every request",
        value_name = "USERNAME"
    )]
    username: Option<String>,
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let (host, port) = cli.address.rsplit_once(':').unwrap_or_else(|| {
        eprintln!("error: invalid listen address '{}'", cli.address);
        process::exit(1);
    });
    let port: u16 = port.parse().unwrap_or_else(|_| {
        eprintln!("error: invalid listen port '{port}'");
        process::exit(1);
    });
    let host = if host.is_empty() { "0.0.0.0" } else { host };

    let config = ProxyConfig {
        listen: ListenConfig {
            host: host.to_string(),
            port,
        },
        username: cli.username,
    };
    let mut server = SimpleServer::from_config(config);
    info!("serving SOCKS4 on {host}:{port}");
    if let Err(err) = server.run().await {
        eprintln!("error: {err}");
        process::exit(1);
    }
}
