// ABOUTME: Tenant administration commands for the botfleet binary.
// ABOUTME: Supports show, set, and list against the tenant config store.

use crate::error::Result;
use botfleet_core::{ConfigStore, TenantId, TenantUpdate};
use clap::Subcommand;
use tracing::info;

/// `botfleet tenant ...` subcommands.
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum TenantCommand {
    /// Print a tenant's stored config as JSON (token redacted)
    Show {
        /// Tenant identifier
        tenant_id: String,
    },
    /// Create or edit a tenant's config
    Set {
        /// Tenant identifier
        tenant_id: String,
        /// Whether the bot runs at boot
        #[arg(long)]
        enabled: Option<bool>,
        /// Display name used in replies
        #[arg(long)]
        name: Option<String>,
        /// Bot token from @BotFather; an empty value clears it
        #[arg(long)]
        token: Option<String>,
        /// Reply to /start
        #[arg(long)]
        welcome: Option<String>,
        /// Photo sent with the welcome message; an empty value clears it
        #[arg(long)]
        image: Option<String>,
    },
    /// List tenants whose bots run at boot
    List,
}

/// Clearable text flag: absent leaves the field, empty clears it.
fn clearable(value: Option<String>) -> Option<Option<String>> {
    value.map(|v| if v.trim().is_empty() { None } else { Some(v) })
}

impl TenantCommand {
    /// The store edit a `set` command describes.
    pub fn to_update(&self) -> Option<TenantUpdate> {
        match self {
            TenantCommand::Set {
                enabled,
                name,
                token,
                welcome,
                image,
                ..
            } => Some(TenantUpdate {
                is_enabled: *enabled,
                display_name: name.clone(),
                secret_token: clearable(token.clone()),
                welcome_message: clearable(welcome.clone()),
                image_url: clearable(image.clone()),
            }),
            _ => None,
        }
    }
}

/// Run a tenant command and return the text to print.
pub async fn execute(command: TenantCommand, store: &dyn ConfigStore) -> Result<String> {
    match &command {
        TenantCommand::Show { tenant_id } => {
            match store.get(&TenantId::from(tenant_id.as_str())).await? {
                Some(config) => Ok(serde_json::to_string_pretty(&config)?),
                None => Ok(format!("No config stored for tenant {}", tenant_id)),
            }
        }
        TenantCommand::Set { tenant_id, .. } => {
            let update = command.to_update().unwrap_or_default();
            let id = TenantId::from(tenant_id.as_str());
            let config = store.upsert(&id, update).await?;
            info!(tenant_id = %id, enabled = config.is_enabled, "Tenant config saved");
            Ok(serde_json::to_string_pretty(&config)?)
        }
        TenantCommand::List => {
            let configs = store.list_enabled().await?;
            if configs.is_empty() {
                return Ok("No enabled tenants".to_string());
            }
            Ok(configs
                .iter()
                .map(|c| {
                    let token = if c.usable_token().is_some() { "token set" } else { "no token" };
                    format!("{}\t{}\t{}", c.tenant_id, c.display_name, token)
                })
                .collect::<Vec<_>>()
                .join("\n"))
        }
    }
}
