//! `arbor prune` command implementation.

use super::fail;
use arbor_core::pkg::{
    prune, DepClass, PruneResult, ReconcileReport, RemovedPackage, SyncReport,
};
use arbor_core::{Config, PruneOverrides};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PruneSummary<'a> {
    root: String,
    dry_run: bool,
    omit: Vec<&'static str>,
    workspaces: bool,
    removed: &'a [RemovedPackage],
    targets: &'a [PathBuf],
    #[serde(skip_serializing_if = "Option::is_none")]
    reconcile: Option<&'a ReconcileReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    lockfile: Option<&'a SyncReport>,
    hidden_lockfile_written: bool,
}

#[derive(Serialize)]
struct PruneOutput<'a> {
    ok: bool,
    prune: PruneSummary<'a>,
}

/// Run `arbor prune`.
pub fn run(config: Config, overrides: &PruneOverrides, dry_run: bool) -> Result<()> {
    let json = config.json_logs;
    let config = match config.load(overrides) {
        Ok(config) => config,
        Err(e) => return fail(json, e),
    };
    let opts = config.prune_options(dry_run);

    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
    let result = match runtime.block_on(prune(&config.cwd, &opts)) {
        Ok(result) => result,
        Err(e) => return fail(json, e.into()),
    };

    let summary = PruneSummary {
        root: config.cwd.display().to_string(),
        dry_run,
        omit: opts.omit.iter().map(DepClass::as_str).collect(),
        workspaces: opts.workspaces_enabled,
        removed: &result.removed,
        targets: &result.targets,
        reconcile: result.reconcile.as_ref(),
        lockfile: result.lockfile.as_ref(),
        hidden_lockfile_written: result.hidden_lockfile_written,
    };

    if json {
        let output = PruneOutput {
            ok: true,
            prune: summary,
        };
        println!("{}", serde_json::to_string_pretty(&output).into_diagnostic()?);
    } else {
        print_human(&result, dry_run);
    }
    Ok(())
}

fn print_human(result: &PruneResult, dry_run: bool) {
    if result.removed.is_empty() {
        println!("up to date, nothing to prune");
    } else {
        let verb = if dry_run { "would remove" } else { "removed" };
        let noun = if result.removed.len() == 1 { "package" } else { "packages" };
        println!("{verb} {} {noun}", result.removed.len());
        for pkg in &result.removed {
            let version = pkg.version.as_deref().unwrap_or("?");
            let link = if pkg.link { " (link)" } else { "" };
            println!("  - {}@{version} {}{link}", pkg.name, pkg.location);
        }
    }

    if let Some(lock) = &result.lockfile {
        let state = if dry_run {
            "lockfile would keep"
        } else if lock.written {
            "lockfile updated:"
        } else {
            "lockfile unchanged:"
        };
        println!(
            "{state} {} entries ({} omitted from disk), {} dropped",
            lock.kept,
            lock.retained_omitted.len(),
            lock.removed.len()
        );
    }
}
