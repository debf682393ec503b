//! Settings write-back on shutdown.

use std::path::Path;

use tictactoe_link_core::{ClientConfig, Result};
use tictactoe_link_session::SessionClient;
use tracing::info;

/// Close the link and store the session's mode and baud rate in `settings`,
/// then save them to `path`. Blocks while the link is torn down.
pub fn write_back(client: &SessionClient, settings: &mut ClientConfig, path: &Path) -> Result<()> {
    client.disconnect();
    settings.game.default_mode = client.state().mode;
    settings.serial.baud_rate = client.last_baud_rate();
    settings.save_to_file(path)?;
    info!(
        "Saved settings to {} (mode {}, {} baud)",
        path.display(),
        settings.game.default_mode,
        settings.serial.baud_rate
    );
    Ok(())
}
