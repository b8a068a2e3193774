// src/main.rs
use std::process::ExitCode;

use load_planner::api::{self, ApiState};
use load_planner::board::{self, BoardService};
use load_planner::config::{AppConfig, LoggingConfig, StorageConfig};
use load_planner::logging;
use load_planner::projects::{self, ProjectService};
use load_planner::store::{Collection, Document, StoreError};

#[tokio::main]
async fn main() -> ExitCode {
    let dotenv_result = dotenvy::dotenv();
    logging::init(&LoggingConfig::from_env());
    if let Err(err) = dotenv_result {
        if !matches!(err, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            tracing::warn!("Could not load .env: {}", err);
        }
    }

    let app_config = AppConfig::from_env();
    tracing::info!("Load planner starting...");

    let state = match open_state(&app_config).await {
        Ok(state) => state,
        Err(err) => {
            tracing::error!("Could not open data store: {}", err);
            return ExitCode::FAILURE;
        }
    };

    match api::start_api_server(app_config.api.clone(), state).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("API server terminated with an error: {}", err);
            ExitCode::FAILURE
        }
    }
}

async fn open_state(config: &AppConfig) -> Result<ApiState, StoreError> {
    let projects = open_collection(&config.storage, projects::COLLECTION_NAME).await?;
    let board = open_collection(&config.storage, board::COLLECTION_NAME).await?;
    Ok(ApiState::new(
        config.planner.planning_config(),
        ProjectService::new(projects),
        BoardService::new(board),
    ))
}

async fn open_collection<T: Document>(
    storage: &StorageConfig,
    name: &str,
) -> Result<Collection<T>, StoreError> {
    if storage.persist() {
        Collection::open(storage.data_dir(), name).await
    } else {
        tracing::info!(collection = name, "persistence disabled, keeping data in memory");
        Ok(Collection::in_memory(name))
    }
}
