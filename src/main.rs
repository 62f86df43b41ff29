use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use webproxy::app::ProxyContext;
use webproxy::auth::ManualCredentials;
use webproxy::cli::{commands, Cli, Commands};
use webproxy::config::Config;
use webproxy::domain::Method;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => path,
        None => Config::default_config_path()?,
    };
    let config = if config_path.exists() {
        Config::load_from(&config_path)?
    } else {
        Config::default()
    };
    let ctx = ProxyContext::new(config)?;

    match cli.command {
        Commands::Render {
            caller,
            post,
            params,
            user,
            password,
            login_values,
        } => {
            let mut caller = caller.to_caller();
            if post {
                caller.method = Method::Post;
            }
            caller.form_params = params;

            if user.is_some() || password.is_some() || !login_values.is_empty() {
                let submitted = ManualCredentials {
                    user_name: user,
                    password,
                    dynamic_values: login_values.into_iter().map(Some).collect(),
                };
                commands::submit_credentials(&ctx, &caller, submitted, &config_path)?;
            }

            commands::render(&ctx, &caller).await?;
        }
        Commands::Probe { caller } => {
            commands::probe(&ctx, &caller.to_caller()).await?;
        }
        Commands::CachePurge => {
            commands::purge_cache(&ctx)?;
        }
    }

    Ok(())
}
