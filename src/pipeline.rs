use crate::ai::Summarizer;
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::ItemStatus;
use crate::services::Extractor;

/// Extract and summarize a stored item, recording the outcome on it.
///
/// Extraction and summarization failures are stored on the item and reported
/// as `Ok(ItemStatus::Failed)`. Only storage failures are returned as errors.
pub async fn process_item(
    repository: &Repository,
    extractor: &dyn Extractor,
    summarizer: &Summarizer,
    id: i64,
) -> Result<ItemStatus> {
    let item = repository
        .get_item(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("content item {}", id)))?;

    repository.mark_processing(id).await?;
    tracing::info!("Processing item {} ({})", id, item.original_url);

    let extracted = match extractor.extract(&item.original_url).await {
        Ok(extracted) => extracted,
        Err(e) => {
            tracing::warn!("Extraction failed for item {}: {}", id, e);
            repository.mark_failed(id, e.code(), &e.to_string()).await?;
            return Ok(ItemStatus::Failed);
        }
    };

    let content = extracted.content;
    repository
        .record_extraction(id, extracted.title, content.clone(), extracted.channel_or_site)
        .await?;

    match summarizer.summarize(&content, None).await {
        Ok(result) => {
            repository
                .record_summary(id, result.summary, result.provider_used)
                .await?;
            tracing::info!("Item {} completed", id);
            Ok(ItemStatus::Completed)
        }
        Err(e) => {
            tracing::warn!("Summarization failed for item {}: {}", id, e);
            repository.mark_failed(id, e.code(), &e.to_string()).await?;
            Ok(ItemStatus::Failed)
        }
    }
}

/// Fire-and-forget variant used after a submission is accepted.
pub fn spawn_processing(
    repository: Repository,
    extractor: std::sync::Arc<dyn Extractor>,
    summarizer: std::sync::Arc<Summarizer>,
    id: i64,
) {
    tokio::spawn(async move {
        if let Err(e) = process_item(&repository, extractor.as_ref(), &summarizer, id).await {
            tracing::error!("Processing item {} failed: {}", id, e);
        }
    });
}
