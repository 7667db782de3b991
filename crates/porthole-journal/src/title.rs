use std::io::Write;
use std::path::Path;

/// Append a custom-title event to a journal file.
///
/// The CLI picks the line up as the session's display name on resume; the
/// watcher re-ingests it as a debug-only item. Callers are responsible for
/// only appending while no subprocess is writing the same file.
pub fn append_custom_title(path: &Path, title: &str) -> std::io::Result<()> {
    let line = serde_json::json!({
        "type": "custom-title",
        "customTitle": title,
    });

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "{line}")?;

    Ok(())
}
