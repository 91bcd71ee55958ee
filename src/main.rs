// This is the entry point of the comment moderator.
//
// **Architecture Overview:**
// - `core/` = Business logic (the moderation pipeline and its ports)
// - `infra/` = Implementations of core traits (detector APIs, SQLite, env config)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Run the requested command, then wait for the moderation queue to drain

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with several mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "infra/infra_layer.rs"]
mod infra;

use crate::core::moderation::{
    Comment, CommentStore, ModerationJob, ModerationQueue, RequestMeta, Site,
};
use crate::infra::config::AppConfig;
use crate::infra::moderation::{build_service, SqliteCommentStore};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "comment_moderator", version, about = "Spam moderation for stored comments", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create or update a site and its comma separated URL list
    Site {
        /// Site name
        name: String,

        /// Comma separated site URLs, the first one is reported to detectors
        urls: String,
    },

    /// Store a new comment and queue it for moderation
    Add(AddArgs),

    /// Re-moderate stored comments
    Check {
        /// Comment ids
        #[arg(required = true)]
        ids: Vec<u64>,
    },
}

#[derive(Debug, Args)]
struct AddArgs {
    /// Comment text
    content: String,

    /// Author name
    #[arg(long)]
    name: String,

    /// Author email
    #[arg(long, default_value = "")]
    email: String,

    /// Site the comment belongs to
    #[arg(long, default_value = "")]
    site: String,

    /// Page the comment was posted on
    #[arg(long, default_value = "")]
    page: String,

    /// Client IP of the submitting request
    #[arg(long)]
    ip: Option<String>,

    /// User agent of the submitting request
    #[arg(long)]
    user_agent: Option<String>,

    /// Referer of the submitting request
    #[arg(long)]
    referer: Option<String>,

    /// Submit as an admin (never moderated, never pending)
    #[arg(long)]
    admin: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    let config = infra::config::from_env().context("Invalid moderator configuration")?;
    tracing::debug!(
        config = %serde_json::to_string(&config.moderator).unwrap_or_default(),
        "Loaded configuration"
    );

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================

    let store = Arc::new(open_store(&config).await?);

    let service = build_service(Arc::clone(&store), &config.moderator)
        .context("Failed to set up spam detectors")?;
    tracing::info!(
        detectors = ?service.detector_names(),
        keywords = config.moderator.keywords.enabled,
        fail_closed = config.moderator.api_fail_block,
        "Moderation pipeline ready"
    );

    let queue = ModerationQueue::start(
        Arc::new(service),
        config.moderator.workers,
        config.moderator.queue_capacity,
    );

    // ========================================================================
    // COMMANDS
    // ========================================================================

    let outcome = match cli.command {
        Commands::Site { name, urls } => store
            .save_site(&Site { name, urls })
            .await
            .context("Failed to save site"),
        Commands::Add(args) => add_comment(&store, &queue, &config, args).await,
        Commands::Check { ids } => recheck_comments(&store, &queue, ids).await,
    };

    // Drain whatever was queued even if the command itself failed.
    queue.shutdown().await;
    outcome
}

async fn open_store(config: &AppConfig) -> Result<SqliteCommentStore> {
    if let Some(parent) = config.database_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).context("Failed to create data directory")?;
        }
    }

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .connect(&format!(
            "sqlite://{}?mode=rwc",
            config.database_path.display()
        ))
        .await
        .context("Failed to connect to comment DB")?;

    let store = SqliteCommentStore::new(pool);
    store.migrate().await.context("Failed to migrate comment DB")?;
    Ok(store)
}

async fn add_comment(
    store: &SqliteCommentStore,
    queue: &ModerationQueue,
    config: &AppConfig,
    args: AddArgs,
) -> Result<()> {
    let user = store
        .find_or_create_user(&args.name, &args.email)
        .await
        .context("Failed to save comment author")?;

    let request = RequestMeta {
        ip: args.ip,
        user_agent: args.user_agent,
        referer: args.referer,
    };

    let mut comment = Comment {
        content: args.content,
        is_pending: config.moderator.initial_pending(args.admin),
        user_id: user.id,
        site_name: args.site,
        page_key: args.page,
        ip: request.ip.clone().unwrap_or_default(),
        user_agent: request.user_agent.clone().unwrap_or_default(),
        ..Default::default()
    };
    store
        .create_comment(&mut comment)
        .await
        .context("Failed to save comment")?;
    tracing::info!(comment_id = comment.id, pending = comment.is_pending, "Comment created");

    // Creation has already succeeded; a rejected job only costs the spam check.
    let comment_id = comment.id;
    let job = ModerationJob {
        comment,
        request,
        is_admin: args.admin,
    };
    if let Err(e) = queue.submit(job) {
        tracing::error!(comment_id, "Failed to queue comment for moderation: {}", e);
    }

    Ok(())
}

async fn recheck_comments(
    store: &SqliteCommentStore,
    queue: &ModerationQueue,
    ids: Vec<u64>,
) -> Result<()> {
    for id in ids {
        let comment = match store.find_comment(id).await {
            Ok(Some(comment)) => comment,
            Ok(None) => {
                tracing::warn!(comment_id = id, "Comment not found");
                continue;
            }
            Err(e) => {
                tracing::error!(comment_id = id, "Failed to load comment: {}", e);
                continue;
            }
        };

        let job = ModerationJob {
            comment,
            request: RequestMeta::default(),
            is_admin: false,
        };
        queue
            .enqueue(job)
            .await
            .with_context(|| format!("Failed to queue comment {}", id))?;
    }

    Ok(())
}
