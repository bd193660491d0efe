use std::io::Read;

use docgate::config::GatewayConfig;
use docgate::pipeline::Gateway;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout must stay clean for the mail pipe.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = GatewayConfig::from_args(std::env::args().skip(1))?;

    let mut raw = Vec::new();
    std::io::stdin().read_to_end(&mut raw)?;

    let gateway = Gateway::new(config);
    let reply = gateway.process(&raw).await?;
    gateway.send(&reply)?;

    Ok(())
}
