//! Session configuration for a Worker instance
//!
//! The [`Configuration`] is the single place mutable session state lives:
//! the bearer token is swapped atomically through [`Configuration::update_token`]
//! and read through [`Configuration::token`]; it is never exposed for
//! field-by-field mutation.

use crate::error::{Result, TaskRouterError};
use parking_lot::RwLock;

/// Default signaling endpoint.
pub const DEFAULT_WS_SERVER: &str = "wss://event-bridge.taskrouter.dev/v1/wschannels";

/// Default event-bridge REST endpoint.
pub const DEFAULT_EB_SERVER: &str = "https://event-bridge.taskrouter.dev/v1/wschannels";

/// Options accepted when constructing a [`Configuration`].
///
/// Workspace and worker identity are supplied explicitly; credential
/// parsing is a collaborator concern and is not performed here.
#[derive(Debug, Clone)]
pub struct ConfigurationOptions {
    /// Workspace the worker belongs to.
    pub workspace_sid: String,
    /// The worker's own sid.
    pub worker_sid: String,
    /// Signaling endpoint.
    pub ws_server: String,
    /// Event-bridge REST endpoint.
    pub eb_server: String,
}

impl Default for ConfigurationOptions {
    fn default() -> Self {
        Self {
            workspace_sid: String::new(),
            worker_sid: String::new(),
            ws_server: DEFAULT_WS_SERVER.to_string(),
            eb_server: DEFAULT_EB_SERVER.to_string(),
        }
    }
}

/// Per-worker session configuration.
///
/// Process-wide per Worker instance; the token is the only mutable field.
#[derive(Debug)]
pub struct Configuration {
    token: RwLock<String>,
    workspace_sid: String,
    worker_sid: String,
    ws_server: String,
    eb_server: String,
}

impl Configuration {
    /// Creates a new configuration, validating the token and identity sids.
    pub fn new(token: &str, options: ConfigurationOptions) -> Result<Self> {
        if token.is_empty() {
            return Err(TaskRouterError::MissingParameter { name: "token" });
        }
        if options.workspace_sid.is_empty() {
            return Err(TaskRouterError::InvalidConfiguration(
                "workspace_sid must not be empty".to_string(),
            ));
        }
        if options.worker_sid.is_empty() {
            return Err(TaskRouterError::InvalidConfiguration(
                "worker_sid must not be empty".to_string(),
            ));
        }

        Ok(Self {
            token: RwLock::new(token.to_string()),
            workspace_sid: options.workspace_sid,
            worker_sid: options.worker_sid,
            ws_server: options.ws_server,
            eb_server: options.eb_server,
        })
    }

    /// Returns a copy of the current token.
    pub fn token(&self) -> String {
        self.token.read().clone()
    }

    /// Replaces the held token.
    ///
    /// The whole credential is swapped in one operation; no partial update
    /// is observable. The only validation is non-emptiness.
    pub fn update_token(&self, new_token: &str) -> Result<()> {
        if new_token.is_empty() {
            return Err(TaskRouterError::MissingParameter { name: "newToken" });
        }
        *self.token.write() = new_token.to_string();
        Ok(())
    }

    /// Workspace sid this session is scoped to.
    pub fn workspace_sid(&self) -> &str {
        &self.workspace_sid
    }

    /// Worker sid this session is scoped to.
    pub fn worker_sid(&self) -> &str {
        &self.worker_sid
    }

    /// Signaling endpoint URL.
    pub fn ws_server(&self) -> &str {
        &self.ws_server
    }

    /// Event-bridge REST endpoint URL.
    pub fn eb_server(&self) -> &str {
        &self.eb_server
    }
}
