use stowplan::config::AppConfig;
use stowplan::{Engine, api, logging};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let dotenv_result = dotenvy::dotenv();
    logging::init();
    if let Err(err) = dotenv_result {
        if !matches!(err, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            warn!("Could not load .env: {}", err);
        }
    }

    let app_config = AppConfig::from_env();
    let start_date = app_config.simulation.start_date();
    let engine = Engine::new(app_config.planner, start_date);

    info!(%start_date, "stowage service starting");
    if let Err(err) = api::start_api_server(app_config.api, engine).await {
        error!("Server stopped: {}", err);
        std::process::exit(1);
    }
}
