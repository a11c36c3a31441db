//! Per-request fan-out over scrape targets.

use std::time::Instant;

use shelly_common::DeviceAddress;
use tokio::task::JoinError;
use tracing::{debug, info};

use crate::fetcher::Fetcher;
use crate::translate::translate;

/// Fetch and translate one device.
///
/// A fetch failure yields a single `# Error:` comment line instead of the
/// device's metric block.
pub async fn scrape_target(fetcher: &Fetcher, address: &DeviceAddress) -> String {
    match fetcher.fetch(address).await {
        Ok(documents) => {
            let lines = translate(&documents.status, &documents.settings, address);
            debug!(device = %address, lines = lines.len(), "Translated device documents");
            lines.join("\n")
        }
        Err(e) => e.to_comment(),
    }
}

/// Scrape all targets concurrently, one task per target.
///
/// Blocks are returned in target order. Every task is awaited before
/// returning; the first task that panicked or was cancelled is reported.
pub async fn scrape_targets(fetcher: &Fetcher, targets: &[String]) -> Result<Vec<String>, JoinError> {
    let started = Instant::now();
    info!(targets = ?targets, "Fetching metrics from targets");

    let handles: Vec<_> = targets
        .iter()
        .map(|raw| {
            let fetcher = fetcher.clone();
            let address = DeviceAddress::new(raw);
            tokio::spawn(async move { scrape_target(&fetcher, &address).await })
        })
        .collect();

    let mut blocks = Vec::with_capacity(handles.len());
    let mut failure = None;
    for handle in handles {
        match handle.await {
            Ok(block) => blocks.push(block),
            Err(e) => {
                failure.get_or_insert(e);
            }
        }
    }

    if let Some(e) = failure {
        return Err(e);
    }

    debug!(
        targets = targets.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Scrape finished"
    );
    Ok(blocks)
}

/// Join per-target blocks into one exposition body.
pub fn render_body(blocks: &[String]) -> String {
    let mut body = blocks.join("\n");
    body.push('\n');
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn closed_address() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr.to_string()
    }

    #[test]
    fn test_render_body() {
        let blocks = vec!["a 1".to_string(), "# Error: x".to_string()];
        assert_eq!(render_body(&blocks), "a 1\n# Error: x\n");
    }

    #[tokio::test]
    async fn test_unreachable_target_becomes_comment() {
        let fetcher = Fetcher::from_client(reqwest::Client::new(), Duration::from_secs(2));
        let unreachable = closed_address().await;
        let address = DeviceAddress::new(&unreachable);

        let block = scrape_target(&fetcher, &address).await;
        assert!(block.starts_with("# Error: "), "got: {}", block);
        assert!(block.contains(&format!("http://{}", unreachable)));
        assert!(!block.contains('\n'));
    }

    #[tokio::test]
    async fn test_no_targets_yields_no_blocks() {
        let fetcher = Fetcher::from_client(reqwest::Client::new(), Duration::from_secs(1));
        let blocks = scrape_targets(&fetcher, &[]).await.unwrap();
        assert!(blocks.is_empty());
    }
}
