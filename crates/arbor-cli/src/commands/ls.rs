//! `arbor ls` command implementation.

use super::fail;
use arbor_core::pkg::{load_actual, DepFlags, GraphErrorInfo, Tree};
use arbor_core::{Config, PruneOverrides};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LsPackage {
    location: String,
    name: String,
    version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    link_target: Option<String>,
    workspace: bool,
    flags: DepFlags,
}

#[derive(Serialize)]
struct LsOutput<'a> {
    ok: bool,
    root: String,
    packages: Vec<LsPackage>,
    errors: &'a [GraphErrorInfo],
}

/// Run `arbor ls`.
pub fn run(config: Config, all: bool) -> Result<()> {
    let json = config.json_logs;
    let config = match config.load(&PruneOverrides::default()) {
        Ok(config) => config,
        Err(e) => return fail(json, e),
    };
    let tree = match load_actual(&config.cwd) {
        Ok(tree) => tree,
        Err(e) => return fail(json, e.into()),
    };

    if json {
        let output = LsOutput {
            ok: true,
            root: config.cwd.display().to_string(),
            packages: packages(&tree),
            errors: &tree.errors,
        };
        println!("{}", serde_json::to_string_pretty(&output).into_diagnostic()?);
        return Ok(());
    }

    print!("{}", tree.render());
    if all {
        for err in &tree.errors {
            eprintln!("! {} {}: {}", err.code, err.path, err.message);
        }
    }
    Ok(())
}

fn packages(tree: &Tree) -> Vec<LsPackage> {
    tree.walk_depth_first()
        .into_iter()
        .skip(1)
        .filter_map(|id| tree.node(id))
        .map(|node| LsPackage {
            location: tree.location(node.id),
            name: node.name.clone(),
            version: node.version.clone(),
            link_target: node.link_target.map(|t| tree.location(t)),
            workspace: node.is_workspace,
            flags: node.flags,
        })
        .collect()
}
