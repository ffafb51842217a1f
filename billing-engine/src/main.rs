//! Billing engine entry point.
//!
//! Coordinates the complete lifecycle of the billing platform: load
//! configuration, build every service, start the scheduler, wait for a
//! shutdown signal, and stop cleanly.

use anyhow::Result;
use tokio::signal;
use tracing::{error, info};

use billing_engine::app::BillingEngine;
use billing_engine::config::EngineConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let config = EngineConfig::load()?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.filter.clone()));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if config.logging.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!("starting billing engine");

    let mut engine = match BillingEngine::build(config).await {
        Ok(engine) => {
            info!("billing engine initialized");
            engine
        }
        Err(e) => {
            error!("failed to initialize billing engine: {e}");
            return Err(e);
        }
    };

    if let Err(e) = engine.start().await {
        error!("failed to start scheduler: {e}");
        return Err(e);
    }
    info!("billing engine started; scheduler jobs are ticking");

    match signal::ctrl_c().await {
        Ok(()) => info!("received shutdown signal, stopping billing engine..."),
        Err(err) => error!("unable to listen for shutdown signal: {err}"),
    }

    if let Err(e) = engine.stop().await {
        error!("error during billing engine shutdown: {e}");
        return Err(e);
    }

    info!("billing engine stopped");
    Ok(())
}
