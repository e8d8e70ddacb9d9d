use super::{plan_changes, print_changes};
use crate::Context;
use crate::cli::StateArgs;
use crate::config::Settings;
use anyhow::Result;

/// Print the changes a sync would make. Only reads from the gateway.
pub fn run(ctx: &Context, settings: &Settings, args: &StateArgs) -> Result<()> {
    let api = settings.gateway();
    let changes = plan_changes(settings, &api, &args.state)?;
    print_changes(ctx, &changes);
    Ok(())
}
