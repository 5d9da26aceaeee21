use market_insights_analyst::{
    analyst::Analyst, api::start_server, config::AnalystConfig, logging::init_tracing,
};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = match AnalystConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Refusing to start");
            eprintln!("{}", e);
            eprintln!("See .env.example for setup instructions");
            return Err(e.into());
        }
    };

    info!("Market Insights Analyst - API Server");
    info!(port = config.api_port, model = %config.gemini_model, "Configuration loaded");

    let analyst = Arc::new(Analyst::from_config(&config).await?);

    info!("Analyst initialized; starting API server");

    start_server(analyst, config.api_port, config.max_concurrent_queries).await?;

    Ok(())
}
