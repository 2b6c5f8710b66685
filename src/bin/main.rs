use anyhow::Result;
use auth_gateway::{
    DatabaseConfig, Environment, GatewayConfig, ProviderConfig, create_connection, ensure_schema,
};
use clap::{Parser, Subcommand};
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser)]
#[command(name = "auth-gateway")]
#[command(about = "Authentication and session coordination gateway")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway HTTP server
    Serve {
        /// Bind address, e.g. 0.0.0.0:8080
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: String,
        #[arg(long, default_value = "memory")]
        db_url: String,
        /// Base URL of the identity provider's auth API
        #[arg(long, env = "AUTH_PROVIDER_URL")]
        provider_url: Url,
        /// Service-level API key for the identity provider
        #[arg(long, env = "AUTH_PROVIDER_SERVICE_KEY", hide_env_values = true)]
        service_key: String,
        /// Run with production cookie policy (Secure, SameSite=None)
        #[arg(long, default_value_t = false)]
        production: bool,
    },
    /// Initialize the database schema
    Init {
        #[arg(long, default_value = "memory")]
        db_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("auth_gateway=info".parse()?),
        )
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            bind,
            db_url,
            provider_url,
            service_key,
            production,
        } => {
            let environment = if production {
                Environment::Production
            } else {
                Environment::from_env()
            };

            let config = GatewayConfig::new(
                bind,
                environment,
                ProviderConfig::new(provider_url, service_key),
                DatabaseConfig {
                    url: db_url,
                    ..Default::default()
                },
            );

            auth_gateway::run(config).await
        }
        Commands::Init { db_url } => {
            let db = create_connection(DatabaseConfig {
                url: db_url,
                ..Default::default()
            })
            .await?;
            ensure_schema(&db).await?;
            info!("database schema initialized");
            Ok(())
        }
    }
}
