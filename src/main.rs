use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rythm::app::AppContext;
use rythm::cli::{commands, Cli, Commands, TodoAction, UserAction};
use rythm::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    if let Commands::Serve { bind, db } = &cli.command {
        if let Some(bind) = bind {
            config.server.bind = bind.clone();
        }
        if let Some(db) = db {
            config.database.path = Some(db.clone());
        }
    }

    let ctx = AppContext::new(config)?;

    match cli.command {
        Commands::Serve { .. } => {
            let bind = ctx.config.server.bind.clone();
            commands::serve(Arc::new(ctx), &bind).await?;
        }
        Commands::User {
            action:
                UserAction::Add {
                    email,
                    username,
                    password,
                    role,
                },
        } => {
            commands::add_user(&ctx, &email, &username, &password, &role).await?;
        }
        Commands::Todo {
            action: TodoAction::Import { owner, path },
        } => {
            commands::import_todos(&ctx, &owner, &path).await?;
        }
        Commands::Audit => {
            commands::audit(&ctx).await?;
        }
    }

    Ok(())
}
