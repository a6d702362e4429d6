//! `docdex search`.

use super::AppContext;
use crate::cli::SearchArgs;
use anyhow::Result;
use docdex_core::Retriever;

/// Runs a hybrid search and prints the assembled regions.
pub async fn run(context: &AppContext, args: SearchArgs) -> Result<()> {
    let store = context.open_store()?;
    let retriever = Retriever::new(store);
    let matches = retriever
        .search(
            &args.library,
            args.version.as_deref(),
            &args.query,
            args.limit,
        )
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&matches)?);
        return Ok(());
    }

    if matches.is_empty() {
        println!("No matches.");
        return Ok(());
    }
    for (rank, result) in matches.iter().enumerate() {
        println!(
            "{}. {} (score {:.4})",
            rank + 1,
            result.title.as_deref().unwrap_or(&result.url),
            result.score
        );
        println!("   {}", result.url);
        for line in result.content.lines().take(12) {
            println!("   | {line}");
        }
        println!();
    }
    Ok(())
}
