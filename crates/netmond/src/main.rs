//! netmond — the per-node network health agent.
//!
//! Runs on every node of a Kubernetes cluster (typically as a DaemonSet),
//! continuously pinging every other ready node and exporting reachability,
//! latency and packet counters for Prometheus to scrape.
//!
//! # Usage
//!
//! ```text
//! netmond --self-node-name worker-1 --interval 5s
//! SELF_NODE_NAME=worker-1 netmond --config /etc/netmon/netmon.toml
//! ```

mod agent;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use netmon_core::{FileConfig, MonitorConfig};

#[derive(Parser)]
#[command(name = "netmond", about = "Cluster network health monitor", version)]
struct Cli {
    /// Name of the node this agent runs on.
    #[arg(long, env = "SELF_NODE_NAME")]
    self_node_name: Option<String>,

    /// Pause between probe cycles, e.g. `5s` or `500ms`.
    #[arg(long, env = "INTERVAL")]
    interval: Option<String>,

    /// Optional TOML config file. Flags and environment take precedence.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Exporter bind address.
    #[arg(long)]
    listen_addr: Option<String>,

    /// Enable debug logging for the agent.
    #[arg(short, long)]
    verbose: bool,

    /// Log as JSON lines.
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    /// Layer flag and environment values over the config file.
    fn into_config(self) -> anyhow::Result<MonitorConfig> {
        let mut file = match &self.config {
            Some(path) => FileConfig::from_file(path)
                .with_context(|| format!("unable to load config from {}", path.display()))?,
            None => FileConfig::default(),
        };

        if self.self_node_name.is_some() {
            file.self_node_name = self.self_node_name;
        }
        if self.interval.is_some() {
            file.interval = self.interval;
        }
        if self.listen_addr.is_some() {
            file.listen_addr = self.listen_addr;
        }

        file.into_config().context("invalid configuration")
    }
}

fn init_tracing(verbose: bool, json: bool) {
    let default_directive = if verbose { "info,netmon=debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let config = cli.into_config()?;
    agent::run(config).await
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::Duration;

    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("netmond").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn flags_build_config() {
        let config = parse(&["--self-node-name", "worker-1", "--interval", "2s"])
            .into_config()
            .unwrap();
        assert_eq!(config.self_node_name, "worker-1");
        assert_eq!(config.interval, Duration::from_secs(2));
        assert_eq!(config.listen_addr.port(), 1024);
    }

    #[test]
    fn missing_node_name_is_rejected() {
        // Built directly so a SELF_NODE_NAME in the test environment
        // cannot fill the field in.
        let cli = Cli {
            self_node_name: None,
            interval: Some("5s".into()),
            config: None,
            listen_addr: None,
            verbose: false,
            log_json: false,
        };
        let err = cli.into_config().unwrap_err();
        assert!(format!("{err:#}").contains("self-node-name is required"));
    }

    #[test]
    fn flags_override_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "self_node_name = \"from-file\"\ninterval = \"30s\"\nprobe_count = 3"
        )
        .unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let config = parse(&["--config", &path, "--self-node-name", "from-flag"])
            .into_config()
            .unwrap();
        assert_eq!(config.self_node_name, "from-flag");
        assert_eq!(config.probe_count, 3);
        if std::env::var_os("INTERVAL").is_none() {
            assert_eq!(config.interval, Duration::from_secs(30));
        }
    }

    #[test]
    fn bad_interval_is_rejected() {
        let cli = parse(&["--self-node-name", "a", "--interval", "soon"]);
        assert!(cli.into_config().is_err());
    }

    #[test]
    fn verbose_flag() {
        assert!(parse(&["-v"]).verbose);
        assert!(parse(&["--log-json"]).log_json);
    }
}
