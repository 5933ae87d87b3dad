//! Command handlers: bridge CLI args to the reconciliation core and output.

pub mod show;
pub mod sync;

use std::path::Path;

use tasconf_core::DesiredConfig;

use crate::error::CliError;

/// Load the desired-state document, logging where it came from.
fn load_desired(path: &Path) -> Result<DesiredConfig, CliError> {
    tracing::debug!(path = %path.display(), "reading desired state");
    Ok(tasconf_config::load_desired_state(path)?)
}
