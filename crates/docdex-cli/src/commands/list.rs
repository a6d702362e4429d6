//! `docdex list`.

use super::AppContext;
use anyhow::Result;

/// Lists indexed libraries with their versions and statuses.
pub fn run(context: &AppContext) -> Result<()> {
    let store = context.open_store()?;
    let libraries = store.list_libraries()?;

    if libraries.is_empty() {
        println!("Nothing indexed yet.");
        return Ok(());
    }

    for library in libraries {
        println!("{}", library.library);
        for version in library.versions {
            let name = version.version.as_deref().unwrap_or("unversioned");
            let mut line = format!(
                "  {name}: {:?}, {} page(s)",
                version.status, version.pages
            );
            if let Some(error) = &version.error {
                line.push_str(&format!(" ({error})"));
            }
            println!("{line}");
        }
    }
    Ok(())
}
