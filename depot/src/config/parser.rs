//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This is the single place where INI key names are mapped to struct fields.

use ini::Ini;
use std::path::PathBuf;

use super::file::ConfigFileError;
use super::settings::ConfigFile;

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [remote] section
    if let Some(section) = ini.section(Some("remote")) {
        if let Some(v) = section.get("base_url") {
            let v = v.trim().trim_end_matches('/');
            if !v.is_empty() {
                if !(v.starts_with("http://") || v.starts_with("https://")) {
                    return Err(invalid(
                        "remote",
                        "base_url",
                        v,
                        "must start with http:// or https://",
                    ));
                }
                config.remote.base_url = Some(v.to_string());
            }
        }
        if let Some(v) = section.get("manifest") {
            let v = v.trim();
            if !v.is_empty() {
                config.remote.manifest_name = v.to_string();
            }
        }
        if let Some(v) = section.get("manifest_format") {
            let v = v.trim().to_lowercase();
            config.remote.manifest_format = match v.as_str() {
                "" | "auto" => None,
                other => Some(other.parse().map_err(|_| {
                    invalid(
                        "remote",
                        "manifest_format",
                        other,
                        "must be one of: auto, json, binary",
                    )
                })?),
            };
        }
    }

    // [storage] section
    if let Some(section) = ini.section(Some("storage")) {
        if let Some(v) = non_empty(section.get("bundled_dir")) {
            config.storage.bundled_dir = expand_tilde(v);
        }
        if let Some(v) = non_empty(section.get("bundled_manifest")) {
            config.storage.bundled_manifest = v.to_string();
        }
        if let Some(v) = non_empty(section.get("package_dir")) {
            config.storage.package_dir = expand_tilde(v);
        }
        if let Some(v) = non_empty(section.get("ledger_dir")) {
            config.storage.ledger_dir = expand_tilde(v);
        }
        if let Some(v) = non_empty(section.get("ledger_format")) {
            config.storage.ledger_format = v.parse().map_err(|_| {
                invalid("storage", "ledger_format", v, "must be 'json' or 'binary'")
            })?;
        }
    }

    // [download] section
    if let Some(section) = ini.section(Some("download")) {
        if let Some(v) = section.get("timeout") {
            config.download.timeout = match v.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    return Err(invalid(
                        "download",
                        "timeout",
                        v,
                        "must be a positive integer (seconds)",
                    ))
                }
            };
        }
        if let Some(v) = section.get("max_retries") {
            config.download.max_retries = v.trim().parse().map_err(|_| {
                invalid("download", "max_retries", v, "must be a non-negative integer")
            })?;
        }
        if let Some(v) = section.get("retry_delay_ms") {
            config.download.retry_delay_ms = v.trim().parse().map_err(|_| {
                invalid(
                    "download",
                    "retry_delay_ms",
                    v,
                    "must be a non-negative integer (milliseconds)",
                )
            })?;
        }
        if let Some(v) = section.get("parallel") {
            config.download.parallel = match v.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(invalid(
                        "download",
                        "parallel",
                        v,
                        "must be a positive integer",
                    ))
                }
            };
        }
        if let Some(v) = section.get("staging") {
            config.download.staging = parse_bool(v);
        }
        if let Some(v) = section.get("promote") {
            config.download.promote = v
                .parse()
                .map_err(|_| invalid("download", "promote", v, "must be 'rename' or 'copy'"))?;
        }
    }

    // [update] section
    if let Some(section) = ini.section(Some("update")) {
        if let Some(v) = section.get("auto_update") {
            config.update.auto_update = parse_bool(v);
        }
        if let Some(v) = section.get("player") {
            let v = v.trim();
            if v.is_empty() || v.contains(['/', '\\']) || v == "." || v == ".." {
                return Err(invalid(
                    "update",
                    "player",
                    v,
                    "must be a non-empty name without path separators",
                ));
            }
            config.update.player = v.to_string();
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = non_empty(section.get("file")) {
            config.logging.file = expand_tilde(v);
        }
    }

    Ok(config)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Parse a boolean from common string representations.
pub(super) fn parse_bool(value: &str) -> bool {
    let v = value.trim().to_lowercase();
    v == "true" || v == "1" || v == "yes" || v == "on"
}

/// Expand ~ to home directory in paths.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::defaults::*;
    use crate::download::PromoteStrategy;
    use crate::package::ManifestFormat;

    fn parse(content: &str) -> Result<ConfigFile, ConfigFileError> {
        let ini = Ini::load_from_str(content).unwrap();
        parse_ini(&ini)
    }

    #[test]
    fn test_empty_ini_gives_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_parse_remote() {
        let config = parse(
            "[remote]\nbase_url = https://cdn.example.com/content/\nmanifest = manifest.bin\nmanifest_format = binary\n",
        )
        .unwrap();
        assert_eq!(
            config.remote.base_url.as_deref(),
            Some("https://cdn.example.com/content")
        );
        assert_eq!(config.remote.manifest_name, "manifest.bin");
        assert_eq!(config.remote.manifest_format, Some(ManifestFormat::Binary));
    }

    #[test]
    fn test_manifest_format_auto() {
        let config = parse("[remote]\nmanifest_format = auto\n").unwrap();
        assert!(config.remote.manifest_format.is_none());
    }

    #[test]
    fn test_invalid_base_url() {
        let err = parse("[remote]\nbase_url = ftp://example.com\n").unwrap_err();
        assert!(matches!(err, ConfigFileError::InvalidValue { ref key, .. } if key == "base_url"));
    }

    #[test]
    fn test_parse_storage() {
        let config = parse(
            "[storage]\nbundled_dir = /opt/game/bundled\npackage_dir = /var/depot/packages\nledger_dir = /var/depot/ledger\nledger_format = binary\n",
        )
        .unwrap();
        assert_eq!(config.storage.bundled_dir, PathBuf::from("/opt/game/bundled"));
        assert_eq!(config.storage.package_dir, PathBuf::from("/var/depot/packages"));
        assert_eq!(config.storage.ledger_dir, PathBuf::from("/var/depot/ledger"));
        assert_eq!(config.storage.ledger_format, ManifestFormat::Binary);
        assert_eq!(config.storage.bundled_manifest, DEFAULT_BUNDLED_MANIFEST);
    }

    #[test]
    fn test_parse_download() {
        let config = parse(
            "[download]\ntimeout = 60\nmax_retries = 0\nretry_delay_ms = 250\nparallel = 8\nstaging = false\npromote = copy\n",
        )
        .unwrap();
        assert_eq!(config.download.timeout, 60);
        assert_eq!(config.download.max_retries, 0);
        assert_eq!(config.download.retry_delay_ms, 250);
        assert_eq!(config.download.parallel, 8);
        assert!(!config.download.staging);
        assert_eq!(config.download.promote, PromoteStrategy::Copy);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        assert!(parse("[download]\ntimeout = 0\n").is_err());
        assert!(parse("[download]\ntimeout = soon\n").is_err());
    }

    #[test]
    fn test_zero_parallel_rejected() {
        assert!(parse("[download]\nparallel = 0\n").is_err());
    }

    #[test]
    fn test_invalid_promote() {
        let err = parse("[download]\npromote = move\n").unwrap_err();
        assert!(err.to_string().contains("promote"));
    }

    #[test]
    fn test_parse_update() {
        let config = parse("[update]\nauto_update = no\nplayer = alice\n").unwrap();
        assert!(!config.update.auto_update);
        assert_eq!(config.update.player, "alice");
    }

    #[test]
    fn test_player_with_separator_rejected() {
        assert!(parse("[update]\nplayer = ../evil\n").is_err());
        assert!(parse("[update]\nplayer = \n").is_err());
    }

    #[test]
    fn test_parse_bool_variants() {
        assert!(parse_bool("true"));
        assert!(parse_bool(" YES "));
        assert!(parse_bool("1"));
        assert!(parse_bool("on"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool("maybe"));
    }

    #[test]
    fn test_expand_tilde_absolute_untouched() {
        assert_eq!(expand_tilde("/var/log/depot.log"), PathBuf::from("/var/log/depot.log"));
    }
}
