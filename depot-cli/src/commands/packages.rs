//! Package commands: `status`, `check`, `update` and `get`.
//!
//! Handlers take the service and an [`Output`], so they can be exercised
//! against an in-memory transport in tests.

use depot::pool::PackageLoader;
use depot::service::ContentService;
use depot::tracker::RemoteView;

use super::output::{format_size, Output};
use crate::error::CliError;

/// Show local packages and ledger state without contacting the remote.
pub async fn status<L: PackageLoader>(
    service: &ContentService<L>,
    output: &dyn Output,
) -> Result<(), CliError> {
    let tracker = service.tracker();
    tracker.initialize().await;
    let stats = tracker.stats();

    output.header("Depot Status");
    output.indented(&format!("Player: {}", tracker.config().player()));
    output.indented(&format!(
        "Remote: {}",
        tracker.config().base_url().unwrap_or("(not configured)")
    ));
    output.indented(&format!("Bundled packages: {}", stats.bundled));
    output.indented(&format!("Downloaded packages: {}", stats.downloaded));
    output.indented(&format!("Resources: {}", stats.local_resources));
    output.newline();

    let mut records = tracker.local_records();
    records.sort_by(|a, b| a.logical_path.cmp(&b.logical_path));
    for record in &records {
        output.println(&format!(
            "  {} v{} [{:08x}] {} ({})",
            record.logical_path,
            record.version,
            record.checksum,
            format_size(record.size_bytes.max(0) as u64),
            record.lifecycle_state
        ));
    }

    let duplicates = tracker.duplicate_resources();
    if !duplicates.is_empty() {
        output.newline();
        for duplicate in &duplicates {
            output.warning(&format!(
                "{} is provided by {} and {}; using {}",
                duplicate.resource, duplicate.kept, duplicate.ignored, duplicate.kept
            ));
        }
    }
    Ok(())
}

/// Fetch the remote manifest and list pending updates without changing
/// anything.
pub async fn check<L: PackageLoader>(
    service: &ContentService<L>,
    output: &dyn Output,
) -> Result<(), CliError> {
    let tracker = service.tracker();
    tracker.initialize().await;
    let remote = service.fetch_remote().await.map_err(CliError::Remote)?;
    let set = tracker.compute_update_set();

    output.println(&format!("Remote manifest: {} package(s)", remote));
    if set.is_empty() {
        output.success("All packages are up to date.");
    } else {
        output.header(&format!(
            "Updates available ({}, {})",
            set.len(),
            format_size(set.total_bytes())
        ));
        for update in set.updates() {
            output.indented(&format!(
                "{}: {:08x} -> {:08x} (v{})",
                update.local_path,
                update.local_checksum,
                update.remote.checksum,
                update.remote.version
            ));
        }
    }
    if !set.remote_only().is_empty() {
        output.newline();
        output.println(&format!(
            "{} package(s) available on demand",
            set.remote_only().len()
        ));
    }
    Ok(())
}

/// Download every pending update.
pub async fn update<L: PackageLoader>(
    service: &ContentService<L>,
    output: &dyn Output,
) -> Result<(), CliError> {
    let startup = service.start().await;
    startup.remote.map_err(CliError::Remote)?;

    if startup.updates.is_empty() {
        output.success("All packages are up to date.");
        return Ok(());
    }

    output.println(&format!(
        "Downloading {} update(s) ({})...",
        startup.updates.len(),
        format_size(startup.updates.total_bytes())
    ));
    let report = service.update_all(&startup.updates).await?;

    for record in &report.installed {
        output.indented(&format!("Updated {} (v{})", record.logical_path, record.version));
    }
    for (path, error) in &report.failed {
        output.error(&format!("{}: {}", path, error));
    }
    service.shutdown().await?;

    if report.is_complete() {
        output.success(&format!(
            "{} package(s) updated ({})",
            report.installed.len(),
            format_size(report.installed_bytes())
        ));
        Ok(())
    } else {
        Err(CliError::Update {
            failed: report.failed.len(),
            total: startup.updates.len(),
        })
    }
}

/// Load the packages owning `paths`, downloading them if needed.
pub async fn get<L: PackageLoader>(
    service: &ContentService<L>,
    paths: &[String],
    output: &dyn Output,
) -> Result<(), CliError> {
    let startup = service.start().await;
    if let Err(e) = &startup.remote {
        output.warning(&format!("{}", e));
    }
    if service.tracker().stats().remote_view == RemoteView::LedgerFallback {
        output.warning("Serving local packages only.");
    }

    let mut result = Ok(());
    for path in paths {
        match service.get(path).await {
            Ok(handle) => {
                let record = handle.record();
                output.println(&format!(
                    "{} -> {} v{} [{:08x}] ({})",
                    path,
                    record.logical_path,
                    record.version,
                    record.checksum,
                    record.lifecycle_state
                ));
                for dependency in handle.dependencies() {
                    output.indented(&format!("depends on {}", dependency.logical_path()));
                }
            }
            Err(error) => {
                output.error(&format!("{}: {}", path, error));
                if result.is_ok() {
                    result = Err(CliError::Load {
                        path: path.clone(),
                        error,
                    });
                }
            }
        }
    }

    service.shutdown().await?;
    result
}
