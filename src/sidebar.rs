use std::collections::HashMap;

use crate::error::ApiError;
use crate::models::{Id, PostSummary, Section, SeriesSidebar};
use crate::repo::Repo;

/// Sort key for series members without a stored position.
const POSITION_UNKNOWN: i32 = 9999;

/// The first series of the post with its published siblings in series order.
/// A post outside any series yields an empty sidebar, not an error.
pub async fn series_sidebar(repo: &dyn Repo, section: Section, slug: &str, limit: i64) -> Result<SeriesSidebar, ApiError> {
    let post_id = repo.find_published_post_id(section, slug).await?.ok_or(ApiError::PostNotFound)?;

    let Some(series_id) = repo.first_series_id(post_id).await? else {
        return Ok(SeriesSidebar::none());
    };
    let Some(series) = repo.get_series(series_id).await? else {
        return Ok(SeriesSidebar::none());
    };

    let entries = repo.series_entries(series_id, limit).await?;
    if entries.is_empty() {
        return Ok(SeriesSidebar { series: Some(series), items: Vec::new(), current_post_id: None });
    }
    let positions: HashMap<Id, i32> = entries
        .iter()
        .map(|e| (e.post_id, e.position.unwrap_or(POSITION_UNKNOWN)))
        .collect();
    let ids: Vec<Id> = entries.iter().map(|e| e.post_id).collect();

    let mut items: Vec<PostSummary> = repo.published_summaries_by_ids(&ids, section).await?;
    items.sort_by_key(|p| positions.get(&p.id).copied().unwrap_or(POSITION_UNKNOWN));

    Ok(SeriesSidebar { series: Some(series), items, current_post_id: Some(post_id) })
}
