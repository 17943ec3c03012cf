use anyhow::anyhow;
use clusterdeck_api::{config::ApiConfig, startup::Application};
use clusterdeck_config::{load_config, shared::PgConnectionConfig};
use clusterdeck_telemetry::tracing::init_tracing;
use std::env;
use tracing::{error, info};

fn main() -> anyhow::Result<()> {
    // Initialize tracing from the binary name
    let _log_flusher = init_tracing(env!("CARGO_BIN_NAME"))?;

    // Both ring and aws-lc-rs end up in the dependency graph, so rustls
    // cannot pick a provider on its own.
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow!("failed to install default crypto provider"))?;

    actix_web::rt::System::new().block_on(async_main())?;

    Ok(())
}

async fn async_main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    match args.as_slice() {
        // Run the application server
        [] => {
            let config = load_config::<ApiConfig>()?;
            log_pg_connection_config(&config.database);
            let application = Application::build(config).await?;
            application.run_until_stopped().await?;
        }
        [command] if command == "migrate" => {
            let config = load_config::<ApiConfig>()?;
            log_pg_connection_config(&config.database);
            Application::migrate_database(config.database).await?;
            info!("database migrated successfully");
        }
        [command] => {
            let message = format!("invalid command: {command}");
            error!("{message}");
            return Err(anyhow!(message));
        }
        _ => {
            let message = "invalid number of command line arguments";
            error!("{message}");
            return Err(anyhow!(message));
        }
    }

    Ok(())
}

fn log_pg_connection_config(config: &PgConnectionConfig) {
    info!(
        host = config.host,
        port = config.port,
        dbname = config.name,
        username = config.username,
        tls_enabled = config.tls.enabled,
        "pg database options",
    );
}
