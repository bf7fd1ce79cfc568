//! Show the version history of the linked project.

use anyhow::Result;
use envsync_client::Relay;
use envsync_types::HistoryEntry;

use crate::commands::{explain, open_client, Ctx};

/// Options for [`run`].
#[derive(Debug, Clone, Default)]
pub struct HistoryArgs {
    /// Fetch every page.
    pub all: bool,
    /// 1-based page to show.
    pub page: Option<u32>,
    /// Page size; defaults to the configured `history_page_size`.
    pub limit: Option<u32>,
}

/// Run the history command.
pub async fn run<R: Relay>(ctx: &Ctx, relay: R, args: HistoryArgs) -> Result<Vec<HistoryEntry>> {
    let (client, link) = open_client(ctx, relay).await?;
    let limit = args.limit.unwrap_or(ctx.settings.history_page_size).max(1);

    let (entries, total) = if args.all {
        let entries = client.history_all(limit).await.map_err(explain)?;
        let total = entries.len() as u64;
        (entries, total)
    } else {
        let page = client
            .history(args.page.unwrap_or(1).max(1), limit)
            .await
            .map_err(explain)?;
        (page.entries, page.total)
    };

    if entries.is_empty() {
        println!("No versions pushed yet.");
        return Ok(entries);
    }

    println!("History of {} ({} version(s)):", client.project(), total);
    for entry in &entries {
        let marker = if entry.version == link.last_pushed_version {
            "*"
        } else {
            " "
        };
        println!(
            "{} v{:<5} {:<12} {:<24} {}",
            marker,
            entry.version,
            format_timestamp(entry.created_at),
            entry.author.as_deref().unwrap_or("-"),
            entry.message.as_deref().unwrap_or("")
        );
    }
    if !args.all && (entries.len() as u64) < total {
        println!();
        println!("Showing {} of {}. Use --all or --page to see more.", entries.len(), total);
    }
    Ok(entries)
}

/// Format a Unix timestamp as a relative time string.
fn format_timestamp(timestamp: u64) -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    if timestamp == 0 {
        return "-".to_string();
    }
    let diff = now.saturating_sub(timestamp);
    if diff < 60 {
        format!("{}s ago", diff)
    } else if diff < 3600 {
        format!("{}m ago", diff / 60)
    } else if diff < 86400 {
        format!("{}h ago", diff / 3600)
    } else {
        format!("{}d ago", diff / 86400)
    }
}
