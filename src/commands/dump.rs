use crate::Context;
use crate::config::Settings;
use crate::paths;
use crate::ui;
use anyhow::{Context as _, Result, bail};
use declarative::{Content, Format, fetch_current};
use std::fs;
use std::path::Path;

/// Write the current gateway state as declarative content.
pub fn run(ctx: &Context, settings: &Settings, output: &Path) -> Result<()> {
    let output = paths::expand(&output.to_string_lossy());
    let Some(format) = Format::from_path(&output) else {
        bail!(
            "Unsupported output format for {}: use .json or .toml",
            output.display()
        );
    };

    let api = settings.gateway();
    let current = fetch_current(&api, &settings.select_tags)
        .context("Could not read current gateway state")?;
    let mut content = Content::from_store(&current);
    content.select_tags = settings.select_tags.clone();

    let text = content.render(format)?;
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Could not create {}", parent.display()))?;
    }
    fs::write(&output, text).with_context(|| format!("Could not write {}", output.display()))?;

    if !ctx.quiet {
        ui::success(&format!(
            "Wrote {} entities to {}",
            content.entity_count(),
            output.display()
        ));
    }
    Ok(())
}
