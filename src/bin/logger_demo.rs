use storefront::logger::*;

fn main() -> anyhow::Result<()> {
    let logger = Logger::new_bootstrap();
    trace!("bootstrap trace log");
    debug!("bootstrap debug log");
    info!("bootstrap info log");

    let config = LogConfig {
        filter: "storefront=debug,warp=info".to_string(),
    };
    logger.reload_from_config(&config)?;
    trace!("application trace log");
    debug!(target: "storefront::cart", "application debug log");
    info!(client = "3f2a9c", "application info log");
    debug!(target: "warp::server", "filtered out below info");

    Ok(())
}
