//! `docdex remove`.

use super::AppContext;
use crate::cli::RemoveArgs;
use anyhow::Result;

/// Removes one indexed version (and the library when it was the last).
pub fn run(context: &AppContext, args: RemoveArgs) -> Result<()> {
    let store = context.open_store()?;
    store.remove_version(&args.library, args.version.as_deref())?;
    println!(
        "Removed {}@{}",
        args.library,
        args.version.as_deref().unwrap_or("unversioned")
    );
    Ok(())
}
