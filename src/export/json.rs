//! JSON export of raw API records.

use std::path::Path;

use tracing::info;

use crate::error::{MailError, Result};
use crate::model::message::ApiRecord;

/// Write records as a pretty-printed JSON array, keeping each record's field order.
pub fn export_json(records: &[ApiRecord], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| MailError::io(parent, e))?;
    }
    let contents = serde_json::to_string_pretty(records)?;
    std::fs::write(path, contents).map_err(|e| MailError::io(path, e))?;
    info!(path = %path.display(), count = records.len(), "Exported records");
    Ok(())
}
