//! Outbound mail seam.
//!
//! Handlers build an [`EmailMessage`] and hand it to a [`Mailer`] from a
//! background task. The default [`LogMailer`] only logs the recipient and
//! template; payload fields may carry tokens and are never written out.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::info;

pub const TEMPLATE_USER_WELCOME: &str = "user_welcome.tmpl";
pub const TEMPLATE_USER_ACTIVATED: &str = "user_successful_activation.tmpl";

#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to_email: String,
    pub template: &'static str,
    pub data: Map<String, Value>,
}

impl EmailMessage {
    #[must_use]
    pub fn new(to_email: impl Into<String>, template: &'static str) -> Self {
        Self {
            to_email: to_email.into(),
            template,
            data: Map::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// # Errors
    /// Returns an error when delivery fails.
    async fn send(&self, message: EmailMessage) -> anyhow::Result<()>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: EmailMessage) -> anyhow::Result<()> {
        let fields: Vec<&str> = message.data.keys().map(String::as_str).collect();
        info!(
            to_email = %message.to_email,
            template = message.template,
            ?fields,
            "mail send stub"
        );
        Ok(())
    }
}
