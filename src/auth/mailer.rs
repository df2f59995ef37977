use async_trait::async_trait;
use tracing::info;

use crate::app::Result;

/// Outgoing account mail.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_activation(&self, to: &str, link: &str) -> Result<()>;
}

/// Writes activation links to the log instead of sending mail.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_activation(&self, to: &str, link: &str) -> Result<()> {
        info!(to, link, "Activation link issued");
        Ok(())
    }
}
