use super::{plan_changes, print_changes};
use crate::Context;
use crate::cli::SyncArgs;
use crate::config::Settings;
use crate::progress::BarProgress;
use crate::ui;
use anyhow::{Result, bail};
use colored::Colorize;
use declarative::{CancelToken, ExecuteOptions, HandlerRegistry, build_graphs, execute};
use std::sync::Arc;

pub fn run(ctx: &Context, settings: &Settings, args: &SyncArgs) -> Result<()> {
    let api = Arc::new(settings.gateway());
    let changes = plan_changes(settings, api.as_ref(), &args.state.state)?;
    print_changes(ctx, &changes);
    if changes.is_empty() {
        return Ok(());
    }

    if !args.yes && !confirm_proceed()? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(());
    }

    let plan = build_graphs(&changes)?;
    let handlers = HandlerRegistry::for_gateway(api);
    let opts = ExecuteOptions {
        jobs: settings.jobs,
    };
    let cancel = settings
        .timeout
        .map_or_else(CancelToken::new, CancelToken::with_timeout);
    let mut progress = BarProgress::new(ctx.quiet);

    let report = execute(plan, &handlers, &opts, &cancel, &mut progress)?;
    ui::report(&report);

    if !report.is_success() {
        bail!("{} changes were not applied", report.failures().count());
    }
    Ok(())
}

/// Confirm with user
fn confirm_proceed() -> Result<bool> {
    use dialoguer::Confirm;

    println!();
    let confirmed = Confirm::new()
        .with_prompt("Apply these changes?")
        .default(false)
        .interact()?;

    Ok(confirmed)
}
