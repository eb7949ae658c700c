// ABOUTME: Per-tenant Telegram Long Polling worker and its factory.
// ABOUTME: Each tenant gets its own Bot client, poll loop, and session handle.

use crate::handlers;
use anyhow::anyhow;
use async_trait::async_trait;
use botfleet_core::{Launch, LaunchError, Session, TenantConfig, WorkerFactory};
use futures::FutureExt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::requests::{Request, Requester};
use teloxide::types::UpdateKind;
use teloxide::{ApiError, RequestError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Pause after a failed poll before trying again.
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Extra HTTP headroom over the long poll hold time.
const HTTP_TIMEOUT_MARGIN: Duration = Duration::from_secs(10);

/// Launches Long Polling workers against the Telegram Bot API.
#[derive(Debug, Clone)]
pub struct TelegramWorkerFactory {
    poll_timeout_secs: u32,
}

impl TelegramWorkerFactory {
    pub fn new(poll_timeout_secs: u32) -> Self {
        Self { poll_timeout_secs }
    }

    fn build_bot(&self, token: &str) -> Result<Bot, LaunchError> {
        let http_timeout = Duration::from_secs(self.poll_timeout_secs.into()) + HTTP_TIMEOUT_MARGIN;
        let client = teloxide::net::default_reqwest_settings()
            .timeout(http_timeout)
            .build()
            .map_err(|e| LaunchError::Session(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Bot::with_client(token, client))
    }
}

impl WorkerFactory for TelegramWorkerFactory {
    fn launch(&self, config: Arc<TenantConfig>, stop: CancellationToken) -> Result<Launch, LaunchError> {
        let token = config
            .usable_token()
            .ok_or_else(|| LaunchError::InvalidConfig("secret token is empty".into()))?;
        let bot = self.build_bot(token)?;

        let worker = poll_updates(bot.clone(), config, stop, self.poll_timeout_secs).boxed();
        Ok(Launch {
            session: Box::new(TelegramSession::new(bot)),
            worker,
        })
    }
}

/// The tenant's HTTP client. Closing drops it and its connection pool.
pub struct TelegramSession {
    bot: Mutex<Option<Bot>>,
}

impl TelegramSession {
    fn new(bot: Bot) -> Self {
        Self {
            bot: Mutex::new(Some(bot)),
        }
    }
}

#[async_trait]
impl Session for TelegramSession {
    async fn close(&self) -> anyhow::Result<()> {
        let bot = self
            .bot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if bot.is_some() {
            debug!("Telegram client released");
        }
        Ok(())
    }
}

/// Offset that acknowledges `update` and everything before it.
pub fn next_offset(update: &Update) -> i32 {
    update.id.0 as i32 + 1
}

/// Long Polling loop for one tenant. Returns when `stop` fires or the token is rejected.
async fn poll_updates(
    bot: Bot,
    config: Arc<TenantConfig>,
    stop: CancellationToken,
    poll_timeout_secs: u32,
) -> anyhow::Result<()> {
    let tenant_id = config.tenant_id.clone();

    let me = tokio::select! {
        biased;
        _ = stop.cancelled() => return Ok(()),
        me = bot.get_me().send() => me.map_err(|e| anyhow!("Failed to authenticate with Telegram: {}", e))?,
    };
    info!(
        tenant_id = %tenant_id,
        bot_username = %me.username(),
        "Telegram authentication successful"
    );

    let mut offset = 0;
    loop {
        let request = bot
            .get_updates()
            .offset(offset)
            .timeout(poll_timeout_secs)
            .send();

        let result = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            result = request => result,
        };

        match result {
            Ok(updates) => {
                for update in updates {
                    offset = next_offset(&update);
                    if let UpdateKind::Message(msg) = &update.kind {
                        if let Err(e) = handlers::handle_message(&bot, &config, msg).await {
                            warn!(tenant_id = %tenant_id, error = %e, "Failed to send reply");
                        }
                    }
                }
            }
            Err(RequestError::Api(ApiError::InvalidToken)) => {
                return Err(anyhow!("Telegram rejected the bot token"));
            }
            Err(e) => {
                warn!(tenant_id = %tenant_id, error = %e, "Polling failed, retrying");
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = tokio::time::sleep(RETRY_DELAY) => {}
                }
            }
        }
    }

    info!(tenant_id = %tenant_id, "Polling stopped");
    Ok(())
}
