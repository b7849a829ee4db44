//! Per-item scan stage: resolve metadata, classify, build the filename.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::download::filename::{FilenameParts, build_filename};
use crate::download::transfer::TransferOptions;
use crate::queue::{ItemOutcome, ItemRecord, ItemState};
use crate::resolver::{ItemMetadata, ResolveOutcome, Resolver};
use crate::scenario::{Classification, Classifier};

/// Re-resolution settings for items whose payload section is missing.
#[derive(Debug, Clone, Copy)]
pub(super) struct NoPayloadRetry {
    pub(super) retries: u32,
    pub(super) delay: Duration,
}

/// Resolves and classifies `item`.
///
/// On success the item is `Scanned` with subfolder, quality, link and
/// filename set. Otherwise the terminal outcome is returned.
pub(super) async fn scan_item(
    item: &mut ItemRecord,
    resolver: &dyn Resolver,
    classifier: &Classifier,
    transfer: &TransferOptions,
    retry: NoPayloadRetry,
    interrupt: &CancellationToken,
) -> Result<(), ItemOutcome> {
    item.set_state(ItemState::Scanning);
    let meta = resolve_with_retries(item, resolver, retry, interrupt).await?;

    item.title.clone_from(&meta.title);
    item.score = meta.score;
    item.rating = meta.rating;
    item.tags_extracted = meta.tags.is_some();
    if let Some(tags) = &meta.tags {
        item.set_tags(tags.iter().cloned());
    } else {
        warn!(item_id = item.id, "unable to extract tags");
    }

    let (subfolder, quality) = match classifier.classify(item) {
        Classification::Accept { subfolder, quality } => (subfolder, quality),
        Classification::Reject(reason) => {
            info!(item_id = item.id, %reason, "filtered out");
            return Err(ItemOutcome::FilteredOut);
        }
    };
    item.subfolder = subfolder;

    let Some((chosen, fallback)) = meta.select_quality(&quality) else {
        return Err(ItemOutcome::Failed {
            reason: "no qualities available".to_string(),
        });
    };
    if fallback {
        warn!(
            item_id = item.id,
            wanted = %quality,
            using = %chosen.label,
            "cannot find proper quality, using best available"
        );
    }
    item.quality.clone_from(&chosen.label);
    item.link = Some(chosen.link.clone());

    let folder = item.folder(&transfer.base);
    let filename = build_filename(
        &FilenameParts {
            id: item.id,
            title: &item.title,
            tags: &item.tags,
            score: item.score,
            rating: item.rating,
            quality: &item.quality,
            link: &chosen.link,
        },
        &folder,
        transfer.naming,
        &transfer.prefix,
    );
    debug!(item_id = item.id, filename = %filename, "scanned");
    item.filename = Some(filename);
    item.set_state(ItemState::Scanned);
    Ok(())
}

async fn resolve_with_retries(
    item: &ItemRecord,
    resolver: &dyn Resolver,
    retry: NoPayloadRetry,
    interrupt: &CancellationToken,
) -> Result<ItemMetadata, ItemOutcome> {
    let interrupted = || ItemOutcome::Failed {
        reason: "interrupted".to_string(),
    };
    let mut attempt = 0u32;
    loop {
        let resolved = tokio::select! {
            () = interrupt.cancelled() => return Err(interrupted()),
            resolved = resolver.resolve(item.id) => resolved,
        };
        match resolved {
            Ok(ResolveOutcome::Found(meta)) => return Ok(meta),
            Ok(ResolveOutcome::NotFound) => {
                warn!(item_id = item.id, "got 404, not found");
                return Err(ItemOutcome::NotFound);
            }
            Ok(ResolveOutcome::Unavailable { reason }) => {
                warn!(item_id = item.id, %reason, "payload unavailable, skipped");
                return Err(ItemOutcome::Skipped);
            }
            Ok(ResolveOutcome::NoPayloadYet) if attempt < retry.retries => {
                attempt += 1;
                debug!(item_id = item.id, attempt, "no payload yet, retrying");
                tokio::select! {
                    () = interrupt.cancelled() => return Err(interrupted()),
                    () = tokio::time::sleep(retry.delay) => {}
                }
            }
            Ok(ResolveOutcome::NoPayloadYet) => {
                warn!(item_id = item.id, attempts = attempt + 1, "no payload section, giving up");
                return Err(ItemOutcome::Failed {
                    reason: "no payload after retries".to_string(),
                });
            }
            Err(e) => {
                warn!(item_id = item.id, resolver = resolver.name(), error = %e, "unable to resolve");
                return Err(ItemOutcome::Failed {
                    reason: e.to_string(),
                });
            }
        }
    }
}
