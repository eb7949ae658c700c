// ABOUTME: Reply templating for incoming Telegram messages.
// ABOUTME: Maps a tenant's templates and the message text to the reply to send.

use botfleet_core::TenantConfig;
use teloxide::prelude::*;
use teloxide::types::InputFile;
use tracing::{debug, warn};
use url::Url;

const START_COMMAND: &str = "/start";

/// What a worker sends back for one incoming text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Photo { url: Url, caption: String },
}

/// True for `/start`, `/start payload`, and `/start@SomeBot`.
pub fn is_start_command(text: &str) -> bool {
    let Some(command) = text.split_whitespace().next() else {
        return false;
    };
    match command.strip_prefix(START_COMMAND) {
        Some("") => true,
        Some(rest) => rest.starts_with('@'),
        None => false,
    }
}

/// Build the reply for a text message using the tenant's templates.
pub fn reply_for(config: &TenantConfig, text: &str) -> Reply {
    if !is_start_command(text) {
        return Reply::Text(format!(
            "[{}]: Your message '{}' was received.\n(Tenant ID: {})",
            config.display_name, text, config.tenant_id
        ));
    }

    let welcome = config.templates.welcome_message.clone();
    match config.templates.image_url.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => match Url::parse(raw) {
            Ok(url) => Reply::Photo {
                url,
                caption: welcome,
            },
            Err(e) => {
                warn!(tenant_id = %config.tenant_id, error = %e, "Ignoring invalid welcome image URL");
                Reply::Text(welcome)
            }
        },
        _ => Reply::Text(welcome),
    }
}

/// Answer one incoming message. Non-text messages are ignored.
pub async fn handle_message(
    bot: &Bot,
    config: &TenantConfig,
    msg: &Message,
) -> Result<(), teloxide::RequestError> {
    let Some(text) = msg.text() else {
        return Ok(());
    };

    debug!(
        tenant_id = %config.tenant_id,
        chat_id = msg.chat.id.0,
        user_id = ?msg.from.as_ref().map(|u| u.id.0),
        "Received Telegram message"
    );

    match reply_for(config, text) {
        Reply::Text(text) => {
            bot.send_message(msg.chat.id, text).await?;
        }
        Reply::Photo { url, caption } => {
            bot.send_photo(msg.chat.id, InputFile::url(url))
                .caption(caption)
                .await?;
        }
    }
    Ok(())
}
