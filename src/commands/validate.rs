use super::{load_content, reconcile, select_tags};
use crate::Context;
use crate::cli::StateArgs;
use crate::config::Settings;
use crate::ui;
use anyhow::Result;
use declarative::{Differ, build_graphs};
use entitystore::Store;

/// Check declarative state offline: identities, references, uniqueness and
/// the dependency graph.
pub fn run(ctx: &Context, settings: &Settings, args: &StateArgs) -> Result<()> {
    let content = load_content(&args.state)?;
    let tags = select_tags(settings, &content);
    let empty = Store::new();
    let target = reconcile(&empty, &content, &tags)?;

    let changes = Differ::new(&empty, &target).diff()?;
    let plan = build_graphs(&changes)?;
    log::debug!("validated plan with {} changes", plan.len());

    if !ctx.quiet {
        ui::success(&format!("{} entities are valid", target.len()));
    }
    Ok(())
}
