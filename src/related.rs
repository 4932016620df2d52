//! "Related posts" ranking: same series first, then shared tags, then recency.

use std::collections::HashSet;

use futures_util::future::try_join;

use crate::error::ApiError;
use crate::models::{Id, PostSummary, Section};
use crate::posts::attach_tags;
use crate::repo::{dedup_ids, Repo};

/// Upper bound on candidates loaded and scored per request.
pub const CANDIDATE_CAP: usize = 60;

#[derive(Debug, Clone)]
pub struct Candidate {
    pub post: PostSummary,
    pub same_series: bool,
    pub shared_tags: usize,
}

/// Order by series membership, then shared tag count, then `published_at` (missing = epoch).
/// Stable, so equal keys keep their incoming order.
pub fn rank(mut candidates: Vec<Candidate>, limit: usize) -> Vec<PostSummary> {
    let published = |c: &Candidate| c.post.published_at.map_or(0, |t| t.timestamp_millis());
    candidates.sort_by(|a, b| {
        b.same_series
            .cmp(&a.same_series)
            .then(b.shared_tags.cmp(&a.shared_tags))
            .then(published(b).cmp(&published(a)))
    });
    candidates.into_iter().take(limit).map(|c| c.post).collect()
}

/// Ids worth scoring for one source post.
#[derive(Debug, Clone, Default)]
pub struct Candidates {
    /// Same-series ids first, then shared-tag ids; at most [`CANDIDATE_CAP`].
    pub ids: Vec<Id>,
    pub same_series: HashSet<Id>,
    pub source_tags: Vec<Id>,
}

/// Published posts of `section` sharing a series or a tag with `source`, source excluded.
pub async fn collect_candidates(repo: &dyn Repo, section: Section, source: Id) -> Result<Candidates, ApiError> {
    let (tag_ids, series_ids) = try_join(repo.tag_ids_for_post(source), repo.series_ids_for_post(source)).await?;

    let (by_tag, by_series) = try_join(repo.post_ids_with_tags(&tag_ids), repo.post_ids_in_series(&series_ids)).await?;
    let without_source = |ids: Vec<Id>| ids.into_iter().filter(|id| *id != source).collect::<Vec<_>>();
    let (by_tag, by_series) = try_join(
        repo.published_ids_in(&without_source(by_tag), section),
        repo.published_ids_in(&without_source(by_series), section),
    )
    .await?;

    let ids = dedup_ids(by_series.iter().chain(by_tag.iter()).copied())
        .into_iter()
        .take(CANDIDATE_CAP)
        .collect();
    Ok(Candidates { ids, same_series: by_series.into_iter().collect(), source_tags: tag_ids })
}

pub async fn related_posts(repo: &dyn Repo, section: Section, slug: &str, limit: usize) -> Result<Vec<PostSummary>, ApiError> {
    let source = repo.find_published_post_id(section, slug).await?.ok_or(ApiError::PostNotFound)?;

    let candidates = collect_candidates(repo, section, source).await?;
    if candidates.ids.is_empty() {
        return Ok(Vec::new());
    }

    let (shared, posts) = try_join(
        repo.shared_tag_counts(&candidates.source_tags, &candidates.ids),
        repo.published_summaries_by_ids(&candidates.ids, section),
    )
    .await?;

    let scored = posts
        .into_iter()
        .map(|post| Candidate {
            same_series: candidates.same_series.contains(&post.id),
            shared_tags: shared.get(&post.id).copied().unwrap_or(0),
            post,
        })
        .collect();
    let mut items = rank(scored, limit);
    attach_tags(repo, &mut items).await?;
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PostStatus;
    use chrono::{DateTime, TimeZone, Utc};
    use uuid::Uuid;

    fn post(title: &str, published_at: Option<DateTime<Utc>>) -> PostSummary {
        let now = Utc::now();
        PostSummary {
            id: Uuid::new_v4(),
            section: Section::Tech,
            status: PostStatus::Published,
            title: title.into(),
            slug: title.into(),
            excerpt: None,
            reading_time: 1,
            published_at,
            created_at: now,
            updated_at: now,
            cover_image_url: None,
            tags: Vec::new(),
        }
    }

    fn cand(title: &str, same_series: bool, shared_tags: usize, day: Option<u32>) -> Candidate {
        let at = day.map(|d| Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap());
        Candidate { post: post(title, at), same_series, shared_tags }
    }

    fn titles(items: &[PostSummary]) -> Vec<&str> {
        items.iter().map(|p| p.title.as_str()).collect()
    }

    #[test]
    fn series_membership_dominates_tag_overlap() {
        let ranked = rank(vec![cand("b", false, 3, Some(9)), cand("a", true, 1, Some(1))], 10);
        assert_eq!(titles(&ranked), ["a", "b"]);
    }

    #[test]
    fn ties_fall_back_to_recency_with_missing_dates_last() {
        let ranked = rank(
            vec![
                cand("undated", false, 2, None),
                cand("old", false, 2, Some(1)),
                cand("new", false, 2, Some(20)),
                cand("more-tags", false, 3, Some(2)),
            ],
            10,
        );
        assert_eq!(titles(&ranked), ["more-tags", "new", "old", "undated"]);
    }

    #[test]
    fn truncates_to_limit() {
        let ranked = rank((1..=5).map(|d| cand("p", false, 1, Some(d))).collect(), 2);
        assert_eq!(ranked.len(), 2);
        assert!(rank(Vec::new(), 6).is_empty());
    }
}
