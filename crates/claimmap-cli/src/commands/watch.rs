use std::path::Path;

use anyhow::{Context, Result};
use claimmap_config::{ProviderFileWatcher, ProviderRegistry, ReloadEvent};
use colored::Colorize;
use tokio::sync::mpsc;

use crate::output::{print_error, print_success};

pub async fn watch(path: &Path) -> Result<()> {
    let registry = ProviderRegistry::load(path)
        .with_context(|| format!("Invalid provider file {}", path.display()))?;
    print_success(&format!(
        "Loaded {} providers from {}",
        registry.snapshot().len(),
        path.display()
    ));

    let (tx, mut rx) = mpsc::channel(16);
    let handle = ProviderFileWatcher::for_registry(&registry)?.watch(registry.clone(), Some(tx))?;
    println!("{}", "Watching for changes, press Ctrl-C to stop".dimmed());

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(ReloadEvent::Reloaded { providers }) => {
                    print_success(&format!("Reloaded {providers} providers"));
                }
                Some(ReloadEvent::Failed { error }) => {
                    print_error(&format!("Reload rejected, keeping previous providers: {error}"));
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    handle.stop().await;
    Ok(())
}
