//! EMQX Admission Webhook
//!
//! Serves the defaulting and validation webhooks for EMQX custom resources.

use anyhow::{Context, Result};
use clap::Parser;
use emqx_webhook::crd::{EmqxBroker, EmqxEnterprise};
use emqx_webhook::server::{self, WebhookConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

/// EMQX Admission Webhook
#[derive(Parser, Debug)]
#[command(name = "emqx-webhook")]
#[command(about = "Defaulting and validation webhooks for EMQX clusters")]
#[command(version)]
struct Args {
    /// Webhook listen address
    #[arg(long, env = "WEBHOOK_ADDR", default_value = "0.0.0.0:9443")]
    webhook_addr: SocketAddr,

    /// TLS certificate (PEM). Serves plain HTTP when unset.
    #[arg(long, env = "TLS_CERT_FILE", requires = "tls_key")]
    tls_cert: Option<PathBuf>,

    /// TLS private key (PEM)
    #[arg(long, env = "TLS_KEY_FILE", requires = "tls_cert")]
    tls_key: Option<PathBuf>,

    /// Metrics server address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: SocketAddr,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: Level,

    /// Enable JSON log format
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    log_json: bool,

    /// Print CRD YAML and exit
    #[arg(long)]
    print_crd: bool,
}

impl Args {
    fn webhook_config(&self) -> WebhookConfig {
        let config = WebhookConfig::default().with_addr(self.webhook_addr);
        match (&self.tls_cert, &self.tls_key) {
            (Some(cert), Some(key)) => config.with_tls(cert.clone(), key.clone()),
            _ => config,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_crd {
        print_crd()?;
        return Ok(());
    }

    init_logging(&args)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting EMQX admission webhook"
    );

    install_metrics_exporter(args.metrics_addr)?;

    server::run(args.webhook_config())
        .await
        .context("Webhook server failed")?;

    Ok(())
}

/// Initialize logging subsystem
fn init_logging(args: &Args) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_thread_ids(false)
        .with_line_number(false);

    if args.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}

/// Install the Prometheus exporter with its own HTTP listener
fn install_metrics_exporter(addr: SocketAddr) -> Result<()> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    info!(address = %addr, "Starting metrics server");

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    Ok(())
}

/// Print the CRD YAML for installation
fn print_crd() -> Result<()> {
    use kube::CustomResourceExt;

    for crd in [EmqxBroker::crd(), EmqxEnterprise::crd()] {
        let yaml = serde_yaml::to_string(&crd)?;
        println!("---\n{}", yaml);
    }

    Ok(())
}
