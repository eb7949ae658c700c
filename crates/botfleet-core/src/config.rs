// ABOUTME: Tenant configuration value types shared by the store and the supervisor.
// ABOUTME: TenantConfig is an immutable snapshot; TenantUpdate carries partial edits.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Display name given to a tenant's bot when none was configured.
pub const DEFAULT_DISPLAY_NAME: &str = "Bot";

/// Welcome text sent on `/start` when none was configured.
pub const DEFAULT_WELCOME_MESSAGE: &str = "Hello! 👋";

/// Opaque, stable identifier of a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TenantId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Free-form message templates a tenant's bot answers with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Templates {
    pub welcome_message: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl Default for Templates {
    fn default() -> Self {
        Self {
            welcome_message: DEFAULT_WELCOME_MESSAGE.to_string(),
            image_url: None,
        }
    }
}

/// Immutable snapshot of one tenant's bot configuration.
///
/// A worker run is always tied to exactly one snapshot. Changing the
/// configuration of a running bot means restarting it with a new snapshot.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantConfig {
    pub tenant_id: TenantId,
    pub is_enabled: bool,
    pub display_name: String,
    #[serde(default, skip_serializing)]
    pub secret_token: Option<String>,
    #[serde(flatten)]
    pub templates: Templates,
}

impl TenantConfig {
    /// Default configuration for a tenant that has never been configured.
    pub fn new(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            is_enabled: false,
            display_name: DEFAULT_DISPLAY_NAME.to_string(),
            secret_token: None,
            templates: Templates::default(),
        }
    }

    /// The credential, if it is present and not blank.
    pub fn usable_token(&self) -> Option<&str> {
        self.secret_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }

    /// Apply a partial update, leaving absent fields untouched.
    pub fn apply(&mut self, update: TenantUpdate) {
        if let Some(is_enabled) = update.is_enabled {
            self.is_enabled = is_enabled;
        }
        if let Some(display_name) = update.display_name {
            self.display_name = display_name;
        }
        if let Some(secret_token) = update.secret_token {
            self.secret_token = secret_token;
        }
        if let Some(welcome_message) = update.welcome_message {
            self.templates.welcome_message =
                welcome_message.unwrap_or_else(|| DEFAULT_WELCOME_MESSAGE.to_string());
        }
        if let Some(image_url) = update.image_url {
            self.templates.image_url = image_url;
        }
    }
}

impl fmt::Debug for TenantConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantConfig")
            .field("tenant_id", &self.tenant_id)
            .field("is_enabled", &self.is_enabled)
            .field("display_name", &self.display_name)
            .field("secret_token", &self.secret_token.as_ref().map(|_| "[REDACTED]"))
            .field("templates", &self.templates)
            .finish()
    }
}

/// Partial edit of a tenant's configuration.
///
/// `None` leaves a field as stored. For clearable fields the inner `None`
/// clears the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TenantUpdate {
    pub is_enabled: Option<bool>,
    pub display_name: Option<String>,
    pub secret_token: Option<Option<String>>,
    pub welcome_message: Option<Option<String>>,
    pub image_url: Option<Option<String>>,
}

impl TenantUpdate {
    pub fn enabled(mut self, is_enabled: bool) -> Self {
        self.is_enabled = Some(is_enabled);
        self
    }

    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn secret_token(mut self, token: impl Into<String>) -> Self {
        self.secret_token = Some(Some(token.into()));
        self
    }

    pub fn welcome_message(mut self, text: impl Into<String>) -> Self {
        self.welcome_message = Some(Some(text.into()));
        self
    }

    pub fn image_url(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(Some(url.into()));
        self
    }
}
