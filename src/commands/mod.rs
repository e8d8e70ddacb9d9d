//! Command implementations
//!
//! Every command follows the same pipeline up to the point where it stops:
//! load the declarative state, read the gateway, reconcile identities, diff.

pub mod diff;
pub mod dump;
pub mod sync;
pub mod validate;

use crate::config::Settings;
use crate::paths;
use crate::ui;
use crate::Context;
use anyhow::{Context as _, Result, bail};
use declarative::{ChangeSet, Content, Differ, IdentityReconciler, fetch_current};
use entitystore::Store;
use gateway::GatewayApi;
use std::path::Path;

/// Load declarative state from a file or directory.
pub(crate) fn load_content(path: &Path) -> Result<Content> {
    let path = paths::expand(&path.to_string_lossy());
    let content = Content::load(&path)
        .with_context(|| format!("Could not load state from {}", path.display()))?;
    log::info!(
        "Loaded {} entities from {}",
        content.entity_count(),
        path.display()
    );
    Ok(content)
}

/// Tags scoping this run: configured ones plus the state's own.
pub(crate) fn select_tags(settings: &Settings, content: &Content) -> Vec<String> {
    let mut tags = settings.select_tags.clone();
    for tag in &content.select_tags {
        if !tags.contains(tag) {
            tags.push(tag.clone());
        }
    }
    tags
}

/// Build the target store, printing every invalid entity.
pub(crate) fn reconcile(current: &Store, content: &Content, tags: &[String]) -> Result<Store> {
    match IdentityReconciler::new(current)
        .with_select_tags(tags)
        .reconcile(content)
    {
        Ok(target) => Ok(target),
        Err(errors) => {
            for err in &errors {
                ui::error(&err.to_string());
            }
            bail!("{} invalid entities in declarative state", errors.len());
        }
    }
}

/// Compute the changes that would bring the gateway in line with `state`.
pub(crate) fn plan_changes(
    settings: &Settings,
    api: &dyn GatewayApi,
    state: &Path,
) -> Result<ChangeSet> {
    let content = load_content(state)?;
    let tags = select_tags(settings, &content);
    let current = fetch_current(api, &tags).context("Could not read current gateway state")?;
    let target = reconcile(&current, &content, &tags)?;
    Ok(Differ::new(&current, &target).diff()?)
}

/// Print a change set, or a note that there is nothing to do.
pub(crate) fn print_changes(ctx: &Context, changes: &ChangeSet) {
    if changes.is_empty() {
        ui::success("Gateway is in sync");
        return;
    }
    if !ctx.quiet {
        ui::header("Changes");
    }
    for event in changes.iter() {
        ui::change(event);
    }
    if !ctx.quiet {
        println!();
        ui::summary(&changes.summary());
    }
}
