//! GroupWarden Telegram Bot
//!
//! Main application entry point

use std::sync::Arc;
use teloxide::{prelude::*, types::Update};
use teloxide::dispatching::UpdateHandler;
use tracing::{error, info, warn};

use GroupWarden::{
    config::Settings,
    handlers::{handle_message, BotIdentity},
    moderation::Moderator,
    services::{TelegramTransport, Transport},
    utils::logging,
};

type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    // Load configuration
    let settings = Settings::new()?;
    settings.validate()?;

    // Initialize logging
    let _guard = logging::init_logging(&settings.logging)?;

    info!("Starting {}...", GroupWarden::info());

    // Initialize bot
    let mut bot = Bot::new(&settings.bot.token);
    if let Some(api_url) = &settings.bot.api_url {
        info!("Using Bot API server at {}", api_url);
        bot = bot.set_api_url(url::Url::parse(api_url)?);
    }

    let me = bot.get_me().await?;
    let identity = BotIdentity(me.user.id);
    info!(bot_id = me.user.id.0, username = ?me.user.username, "Authorized");

    // Load moderation modules and their policy files
    info!("Loading moderation modules from {}", settings.moderation.settings_dir.display());
    let transport: Arc<dyn Transport> = Arc::new(TelegramTransport::new(bot.clone()));
    let moderator = Arc::new(Moderator::from_config(&settings.moderation, transport).await);
    info!(modules = ?moderator.module_names(), "Moderation modules loaded");

    let mut dispatcher = Dispatcher::builder(bot, create_handler())
        .dependencies(dptree::deps![moderator, identity])
        .default_handler(|upd| async move {
            warn!(update_id = ?upd.id, "Unhandled update");
        })
        .enable_ctrlc_handler()
        .build();

    info!("Starting bot with polling mode...");
    dispatcher.dispatch().await;

    info!("GroupWarden has been shut down.");

    Ok(())
}

/// Create the main update handler
fn create_handler() -> UpdateHandler<Box<dyn std::error::Error + Send + Sync + 'static>> {
    dptree::entry()
        .branch(Update::filter_message().endpoint(handle_messages))
}

/// Handle group messages
async fn handle_messages(msg: Message, identity: BotIdentity, moderator: Arc<Moderator>) -> HandlerResult {
    if let Err(e) = handle_message(msg, identity, moderator).await {
        error!(error = %e, "Error handling message");
        return Err(e.into());
    }

    Ok(())
}
