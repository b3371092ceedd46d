use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use starboard::auth::RemoteIdentityProvider;
use starboard::config::{Cli, Config, default_config_dir, default_config_path};
use starboard::db::Database;
use starboard::github::GithubSearch;
use starboard::handler::AppState;
use starboard::{app, cors_layer, error};
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let args = Cli::parse();

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    tracing::info!("starboard.svc starting");

    // An explicit --config wins, then ~/.starboard/config.yaml, then the
    // environment alone. Local database files live next to the config.
    let (cfg, data_dir) = match args.config_path.map(PathBuf::from) {
        Some(path) => {
            let dir = path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from("."));
            (load_file(&path), dir)
        }
        None if default_config_path().exists() => (load_file(&default_config_path()), default_config_dir()),
        None => {
            let cfg = Config::from_env().unwrap_or_else(|e| {
                tracing::error!(error = %e, "failed to load config from environment");
                std::process::exit(1);
            });
            (cfg, PathBuf::from("."))
        }
    };

    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(error = %e, path = ?data_dir, "failed to create data directory");
        std::process::exit(1);
    }

    error::expose_details(!cfg.app.is_production());

    let db = Arc::new(Database::new(&cfg, &data_dir).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to setup database");
        std::process::exit(1);
    }));
    let search = Arc::new(GithubSearch::new(&cfg.github).unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to setup github client");
        std::process::exit(1);
    }));
    let identity = Arc::new(RemoteIdentityProvider::new(&cfg.identity));

    let state = AppState { db, search, identity };
    let router = app(state, cors_layer(&cfg.cors));

    let address = format!("0.0.0.0:{}", cfg.app.get_port());
    let listener = tokio::net::TcpListener::bind(&address).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to setup tcp listener");
        std::process::exit(1);
    });

    tracing::info!(environment = %cfg.app.environment, "starboard.svc running on {}", &address);
    tokio::select! {
        result = axum::serve(listener, router) => {
            if let Err(err) = result {
                tracing::error!(error = %err, "server exited with error");
                std::process::exit(1);
            }
        }
        _ = signal::ctrl_c() => {
            tracing::info!("ctrl+c signal received, shutting down");
        }
    }

    tracing::info!("starboard.svc going off");
}

fn load_file(path: &PathBuf) -> Config {
    let path_str = path.to_string_lossy();
    Config::new(&path_str).unwrap_or_else(|e| {
        tracing::error!(error = %e, path = ?path, "failed to load config file");
        std::process::exit(1);
    })
}
