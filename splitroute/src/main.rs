mod cover;
mod hostsfile;
mod learner;
mod proxy;
mod supervisor;

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use sr_dns::HostnameSet;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::proxy::{DnsProxy, ProxyConfig};

/// Split-horizon DNS proxy: forwards queries to an upstream resolver and
/// installs routes through a policy gateway for allowlisted hostnames.
#[derive(Parser, Debug)]
#[command(name = "splitroute", version)]
struct Args {
    /// Gateway IP for learned IPv4 routes
    gateway: Ipv4Addr,

    /// gzip-compressed host list, one hostname per line
    hostsfile: Option<PathBuf>,

    /// Listening address
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// Listening port
    #[arg(long, default_value_t = 8053)]
    port: u16,

    /// Gateway IP for learned IPv6 routes
    #[arg(long = "ipv6-gateway")]
    ipv6_gateway: Option<Ipv6Addr>,

    /// Remote DNS address
    #[arg(long = "dns-host", default_value = "127.0.0.1")]
    dns_host: IpAddr,

    /// Remote DNS port
    #[arg(long = "dns-port", default_value_t = 65053)]
    dns_port: u16,

    /// DNS queries timeout in seconds
    #[arg(long, default_value_t = 5)]
    timeout: u64,

    /// Log verbosity
    #[arg(long = "log-level", value_enum, default_value = "info")]
    log_level: LogLevel,

    /// Service name reported in startup logs
    #[arg(long = "log-name", default_value = "DNS")]
    log_name: String,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Critical,
    Error,
    Warning,
    Info,
    Debug,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            // tracing has no critical level; both map to error.
            Self::Critical | Self::Error => "error",
            Self::Warning => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(args.log_level.directive()))
        .init();

    info!("{} proxy starting", args.log_name);

    let hostnames = match &args.hostsfile {
        Some(path) => {
            info!("reading hostnames from {}", path.display());
            let hostnames = hostsfile::load(path)?;
            info!("{} hostnames were added to the proxying list", hostnames.len());
            hostnames
        }
        None => HostnameSet::new(),
    };

    let config = ProxyConfig {
        listen_addr: SocketAddr::new(args.host, args.port),
        upstream_addr: SocketAddr::new(args.dns_host, args.dns_port),
        gateway_v4: args.gateway,
        gateway_v6: args.ipv6_gateway,
        timeout: Duration::from_secs(args.timeout),
        buffer_size: ProxyConfig::DEFAULT_BUFFER_SIZE,
    };

    let service = supervisor::spawn_supervised("dns-proxy", move || {
        let config = config.clone();
        let hostnames = hostnames.clone();
        async move {
            let (routes, events) = sr_routes::connect()?;
            let mut proxy = DnsProxy::new(config, hostnames, routes, events).await?;
            proxy.run().await
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
        }
        _ = service => {}
    }

    Ok(())
}
