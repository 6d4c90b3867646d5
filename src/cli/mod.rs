//! Command-line front end: processes the pending queue once.

mod progress;

use std::sync::Arc;

use crate::passwords::PasswordList;
use crate::{AppConfig, Engine};

pub use progress::{IndicatifProgress, print_library, print_summary};

fn load_passwords(config: &AppConfig) -> PasswordList {
    let path = &config.paths.password_file;
    PasswordList::load(path).unwrap_or_else(|e| {
        log::warn!("Could not read password list {}: {e}", path.display());
        PasswordList::default()
    })
}

/// Runs every pending descriptor once, or lists the library with `list`.
///
/// # Errors
///
/// Returns an error if the descriptor directory cannot be read or another
/// run already holds the engine.
pub async fn run(config: AppConfig, list: bool) -> crate::Result<()> {
    let passwords = load_passwords(&config);
    let engine = Engine::new(config, passwords).with_progress(Arc::new(IndicatifProgress::new()));

    if list {
        print_library(&engine.library().list()?);
        return Ok(());
    }

    let outcomes = engine.run().await?;
    if outcomes.is_empty() {
        println!(
            "No descriptors in {}",
            engine.config().paths.files_dir.display()
        );
        return Ok(());
    }

    for outcome in &outcomes {
        print_summary(outcome);
    }

    let failed = outcomes.iter().filter(|o| !o.is_success()).count();
    if failed > 0 {
        log::warn!("{failed} of {} descriptor(s) failed", outcomes.len());
    }
    Ok(())
}
