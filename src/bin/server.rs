use log::{error, info, warn};
use std::sync::Arc;
use tokio::io::BufReader;

use tchat_relay::config::ServerConfig;
use tchat_relay::core::server::ChatServer;
use tchat_relay::handlers::admin::run_console;

#[tokio::main]
async fn main() {
    // Initialize env
    let dotenv_result = dotenvy::dotenv();

    // Initialize logging
    env_logger::init();

    match dotenv_result {
        Ok(path) => info!("Environment variables loaded from {}", path.display()),
        Err(e) => warn!("Failed to load .env file: {}", e),
    }

    // Load config file, then let the environment override it
    let config_path = ServerConfig::path_from_env();
    let mut config = match ServerConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    config.apply_env_overrides();

    if let Err(e) = config.validate() {
        error!("Invalid server configuration: {}", e);
        error!("Please fix {} and try again.", config_path);
        std::process::exit(1);
    }

    info!(
        "Configuration: host={}, port={}, name='{}', password protected={}",
        config.host, config.port, config.server_name, config.password_protected
    );

    let server = Arc::new(ChatServer::new(config));
    server.security_logger().clone().start_cleanup_task();

    let listener = match server.bind().await {
        Ok(listener) => listener,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    // Operator console on stdin
    let console_server = server.clone();
    tokio::spawn(async move {
        run_console(&console_server, BufReader::new(tokio::io::stdin())).await;
    });

    server.run(listener).await;
}
