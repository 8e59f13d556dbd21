//! Shared application state.

use crate::config::Config;
use webterm_core::CommandRunner;

/// Shared application state. The server is stateless between requests: the
/// runner holds only configuration, never session data.
pub struct AppState {
    pub runner: CommandRunner,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let runner = CommandRunner::new(config.shell_path.clone())
            .with_read_buffer_size(config.read_buffer_size);
        Self { runner, config }
    }
}
