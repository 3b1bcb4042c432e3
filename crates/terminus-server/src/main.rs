//! Terminus node binary
//!
//! Claim server for the metro station catalog.

use terminus_server::{NodeConfig, TerminusNode};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "terminus_node=info,terminus_server=info,terminus_core=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting terminus node");

    let config = NodeConfig::from_env()?;

    let node = TerminusNode::new(config)?;
    node.run().await?;

    Ok(())
}
