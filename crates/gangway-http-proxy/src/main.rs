use clap::Parser;
use gangway_http_proxy::config::Config;
use gangway_http_proxy::proxy::ProxyServer;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "gangway-http-proxy")]
struct Args {
    /// Path to the YAML route configuration
    #[arg(short, long, env = "GANGWAY_CONFIG", default_value = "gangway.yaml")]
    config: String,
    /// Override the configured listen port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut config = Config::from_file(&args.config)?;
    if let Some(port) = args.port {
        config.listen.port = port;
    }

    ProxyServer::new(config)?.run().await
}
