//! # Idea Board Binary
//!
//! Assembles the stores selected by compile-time features, loads settings
//! and runs one command.

mod cli;
mod commands;
mod logging;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use ib_config::{Settings, StoreSettings};
use ib_core::models::{AuthenticatedUser, IdentityClaims};
use ib_core::traits::{EngagementRepo, IdeaRepo};
use ib_sync::{IdeaService, MutationCoordinator, SyncOptions};
use tracing::{debug, info};

#[cfg(feature = "store-groq")]
use ib_store_groq::{GroqConfig, GroqStore};

#[cfg(feature = "store-memory")]
use ib_store_memory::InMemoryStore;

use cli::{Cli, Identity};
use commands::App;

struct Stores {
    ideas: Arc<dyn IdeaRepo>,
    engagement: Arc<dyn EngagementRepo>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let Settings { store, sync, log } = Settings::load().context("loading settings")?;
    logging::init(&log);

    let viewer = resolve_viewer(&cli.identity)?;
    let stores = build_stores(store).await?;

    let options = SyncOptions {
        comment_dedup_window: chrono::Duration::from_std(sync.comment_dedup_window())
            .context("sync.comment_dedup_window_secs is out of range")?,
        ..SyncOptions::default()
    };
    let app = App {
        ideas: IdeaService::new(stores.ideas),
        board: MutationCoordinator::new(stores.engagement, options),
        page_size: sync.page_size,
        viewer,
    };

    match app.run(cli.command).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err) => {
            debug!(error = %err, "command failed");
            eprintln!("{}", err.user_message());
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Signed out unless a user id is given.
fn resolve_viewer(identity: &Identity) -> anyhow::Result<Option<AuthenticatedUser>> {
    if identity.user_id.is_none() {
        return Ok(None);
    }
    let user = AuthenticatedUser::from_claims(IdentityClaims {
        id: identity.user_id.clone(),
        name: identity.user_name.clone(),
        email: identity.user_email.clone(),
    })
    .context("resolving --user-id")?;
    Ok(Some(user))
}

async fn build_stores(mut settings: StoreSettings) -> anyhow::Result<Stores> {
    #[cfg(feature = "store-groq")]
    {
        if let Some(project) = settings.remote_project().map(str::to_string) {
            let config = GroqConfig {
                project_id: project,
                dataset: settings.dataset.clone(),
                api_version: settings.api_version.clone(),
                token: settings.token.take(),
                use_cdn: settings.use_cdn,
                timeout: settings.timeout(),
            };
            info!(project = %config.project_id, dataset = %config.dataset, "using hosted document store");
            let store = Arc::new(GroqStore::new(config).context("building document store client")?);
            return Ok(Stores {
                ideas: store.clone(),
                engagement: store,
            });
        }
    }
    local_stores(&settings).await
}

#[cfg(feature = "store-memory")]
async fn local_stores(_settings: &StoreSettings) -> anyhow::Result<Stores> {
    info!("no store.project_id configured; using in-memory store with demo ideas");
    let store = Arc::new(InMemoryStore::new());
    seed_demo(&store).await?;
    Ok(Stores {
        ideas: store.clone(),
        engagement: store,
    })
}

#[cfg(not(feature = "store-memory"))]
async fn local_stores(_settings: &StoreSettings) -> anyhow::Result<Stores> {
    anyhow::bail!("store.project_id is required when built without the in-memory store")
}

#[cfg(feature = "store-memory")]
async fn seed_demo(store: &InMemoryStore) -> anyhow::Result<()> {
    use ib_core::models::{Author, Category, IdeaDraft, UserId};

    let demo = Author {
        id: UserId::from("demo"),
        name: "Demo Author".into(),
    };
    for (title, body, category) in [
        ("Neighbourhood tool library", "Lend and borrow tools instead of buying them.", Category::Business),
        ("Solar bus shelters", "Shelters that light themselves and charge phones.", Category::Technology),
        ("Community mural week", "One week, one wall, everyone paints.", Category::Creative),
    ] {
        store
            .create_idea(
                IdeaDraft {
                    title: title.into(),
                    body: body.into(),
                    category,
                    notes: None,
                },
                demo.clone(),
            )
            .await?;
    }
    Ok(())
}
