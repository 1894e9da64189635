//! INI serialization logic for converting `ConfigFile` → INI string.

use std::path::Path;

use super::settings::ConfigFile;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let base_url = config.remote.base_url.as_deref().unwrap_or("");
    let manifest_format = config
        .remote
        .manifest_format
        .map(|f| f.to_string())
        .unwrap_or_else(|| "auto".to_string());

    format!(
        r#"[remote]
; Base URL packages and the remote manifest are served from
; Example: base_url = https://cdn.example.com/content
base_url = {}
; Remote manifest file name, relative to base_url
manifest = {}
; Manifest encoding: auto (detect from payload), json, binary
manifest_format = {}

[storage]
; Read-only directory with packages shipped in the build
bundled_dir = {}
; Manifest file describing the bundled packages, inside bundled_dir
bundled_manifest = {}
; Writable directory downloaded packages are stored in
package_dir = {}
; Directory holding the per-player download ledger
ledger_dir = {}
; Ledger encoding: json, binary
ledger_format = {}

[download]
; Request timeout in seconds (default: 30)
timeout = {}
; Remote manifest fetch retries after the first failure (default: 3)
max_retries = {}
; Delay between manifest fetch attempts in milliseconds (default: 2000)
retry_delay_ms = {}
; Maximum concurrent package downloads during an update (default: 4)
parallel = {}
; Stage downloads in <file>.temp so interrupted transfers resume (default: true)
; When false, packages are downloaded and verified in memory
staging = {}
; How a verified download replaces the old file: rename, copy
promote = {}

[update]
; Reset changed packages to not-present as soon as an update is detected
auto_update = {}
; Player id; each player keeps its own download ledger
player = {}

[logging]
; Log file path (cleared at the start of each session)
file = {}
"#,
        base_url,
        config.remote.manifest_name,
        manifest_format,
        path_to_string(&config.storage.bundled_dir),
        config.storage.bundled_manifest,
        path_to_string(&config.storage.package_dir),
        path_to_string(&config.storage.ledger_dir),
        config.storage.ledger_format,
        config.download.timeout,
        config.download.max_retries,
        config.download.retry_delay_ms,
        config.download.parallel,
        config.download.staging,
        config.download.promote,
        config.update.auto_update,
        config.update.player,
        path_to_string(&config.logging.file),
    )
}

/// Convert a path to string, using ~ for home directory.
fn path_to_string(path: &Path) -> String {
    if let Some(home) = dirs::home_dir() {
        if let Ok(stripped) = path.strip_prefix(&home) {
            return format!("~/{}", stripped.display());
        }
    }
    path.display().to_string()
}
