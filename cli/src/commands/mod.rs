pub mod cli;
pub mod history;
pub mod init;
pub mod plan;
pub mod run;
pub mod status;

use autodev_core::api::AppConfig;
use tokio_util::sync::CancellationToken;

/// Shared state handed to every command handler.
pub struct CommandContext {
    pub config: AppConfig,
    pub cancel: CancellationToken,
}
