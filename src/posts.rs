//! Post queries and admin post orchestration.

use std::collections::HashMap;

use chrono::Utc;
use futures_util::future::try_join;

use crate::error::ApiError;
use crate::models::*;
use crate::repo::{dedup_ids, Repo};

/// Tags visible under `section`, as public references.
fn visible_tags(tags: Option<&Vec<Tag>>, section: Section) -> Vec<TagRef> {
    tags.into_iter().flatten().filter(|t| t.visible_in(section)).map(TagRef::from).collect()
}

/// One batched load for the whole slice.
pub(crate) async fn attach_tags(repo: &dyn Repo, items: &mut [PostSummary]) -> Result<(), ApiError> {
    if items.is_empty() {
        return Ok(());
    }
    let ids: Vec<Id> = items.iter().map(|p| p.id).collect();
    let tags = repo.tags_for_posts(&ids).await?;
    for item in items.iter_mut() {
        item.tags = visible_tags(tags.get(&item.id), item.section);
    }
    Ok(())
}

/// Row offset of a 1-based page, or `None` when the page starts past `total`.
/// An offset too large for `i64` is past the end of any table.
fn page_offset(page: i64, limit: i64, total: i64) -> Option<i64> {
    page.checked_sub(1)?.checked_mul(limit).filter(|offset| *offset < total)
}

pub async fn list_published(repo: &dyn Repo, q: ListPostsQuery) -> Result<Page<PostSummary>, ApiError> {
    let (page, limit) = (q.page, q.limit);
    let mut filter = PostFilter {
        section: q.section,
        status: Some(PostStatus::Published),
        q: q.q,
        post_ids: None,
        search_content: true,
    };

    if let Some(tag) = q.tag.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        // a slug may name both a global and a section tag; either matches
        let tag_ids = repo.tag_ids_by_slug(tag, q.section).await?;
        let post_ids = repo.post_ids_with_tags(&tag_ids).await?;
        if post_ids.is_empty() {
            return Ok(Page::empty(page, limit, 0));
        }
        filter.post_ids = Some(post_ids);
    }

    let total = repo.count_posts(&filter).await?;
    let Some(offset) = page_offset(page, limit, total) else {
        return Ok(Page::empty(page, limit, total));
    };

    let mut items = repo.list_post_summaries(&filter, offset, limit).await?;
    attach_tags(repo, &mut items).await?;
    Ok(Page { items, page, limit, total })
}

pub async fn get_published_detail(repo: &dyn Repo, section: Section, slug: &str) -> Result<Post, ApiError> {
    let mut post = repo.get_published_post(section, slug).await?.ok_or(ApiError::PostNotFound)?;
    let tags = repo.tags_for_posts(&[post.id]).await?;
    post.tags = visible_tags(tags.get(&post.id), post.section);
    Ok(post)
}

/// Drafts included; newest edits first; each row carries its first series and every tag.
pub async fn list_admin(repo: &dyn Repo, q: AdminListPostsQuery) -> Result<Page<AdminPostListItem>, ApiError> {
    let (page, limit) = (q.page, q.limit);
    let filter = PostFilter { section: q.section, status: q.status, q: q.q, post_ids: None, search_content: false };

    let total = repo.count_posts(&filter).await?;
    let Some(offset) = page_offset(page, limit, total) else {
        return Ok(Page::empty(page, limit, total));
    };

    let mut items = repo.list_admin_posts(&filter, offset, limit).await?;
    let ids: Vec<Id> = items.iter().map(|p| p.id).collect();
    let (mut series, mut tags): (HashMap<Id, SeriesRef>, HashMap<Id, Vec<Tag>>) =
        try_join(repo.series_for_posts(&ids), repo.tags_for_posts(&ids)).await?;
    for item in items.iter_mut() {
        item.series = series.remove(&item.id);
        item.tags = tags.remove(&item.id).unwrap_or_default();
    }
    Ok(Page { items, page, limit, total })
}

pub async fn get_admin_post(repo: &dyn Repo, id: Id) -> Result<Post, ApiError> {
    let mut post = repo.get_post(id).await?.ok_or(ApiError::PostNotFound)?;
    let tags = repo.tags_for_posts(&[id]).await?;
    post.tags = tags.get(&id).into_iter().flatten().map(TagRef::from).collect();
    Ok(post)
}

/// Always starts as a draft.
pub async fn create_post(repo: &dyn Repo, new: NewPost) -> Result<PostHead, ApiError> {
    let head = repo.create_post(new.into_record()).await?;
    tracing::info!(post_id = %head.id, section = %head.section, "post created");
    Ok(head)
}

pub async fn update_post(repo: &dyn Repo, id: Id, upd: UpdatePost) -> Result<PostHead, ApiError> {
    Ok(repo.update_post(id, upd.with_derived_fields()).await?)
}

/// Re-publishing keeps the status and moves `published_at` to now.
pub async fn publish(repo: &dyn Repo, id: Id) -> Result<PublishState, ApiError> {
    let state = repo.publish_post(id, Utc::now()).await?;
    tracing::info!(post_id = %id, "post published");
    Ok(state)
}

pub async fn unpublish(repo: &dyn Repo, id: Id) -> Result<PublishState, ApiError> {
    let state = repo.unpublish_post(id).await?;
    tracing::info!(post_id = %id, "post unpublished");
    Ok(state)
}

async fn ensure_post(repo: &dyn Repo, id: Id) -> Result<(), ApiError> {
    repo.get_post(id).await?.map(|_| ()).ok_or(ApiError::PostNotFound)
}

/// Full replacement: afterwards the post has exactly `tag_ids`.
pub async fn replace_tags(repo: &dyn Repo, post_id: Id, input: ReplaceTags) -> Result<TagsReplaced, ApiError> {
    ensure_post(repo, post_id).await?;
    let tag_ids = dedup_ids(input.tag_ids);
    repo.replace_post_tags(post_id, &tag_ids).await?;
    Ok(TagsReplaced { ok: true, post_id, tag_ids })
}

pub async fn get_series(repo: &dyn Repo, post_id: Id) -> Result<PostSeries, ApiError> {
    ensure_post(repo, post_id).await?;
    Ok(PostSeries { series_id: repo.first_series_id(post_id).await? })
}

/// `None` detaches the post; otherwise it becomes the only member row, at position 1.
pub async fn set_series(repo: &dyn Repo, post_id: Id, input: SetSeries) -> Result<SeriesAssigned, ApiError> {
    ensure_post(repo, post_id).await?;
    repo.set_post_series(post_id, input.series_id).await?;
    Ok(SeriesAssigned { ok: true, post_id, series_id: input.series_id })
}

pub async fn list_series(repo: &dyn Repo, section: Section) -> Result<Items<Series>, ApiError> {
    Ok(Items { items: repo.list_series(section).await? })
}

pub async fn create_series(repo: &dyn Repo, new: NewSeries) -> Result<Series, ApiError> {
    Ok(repo.create_series(new).await?)
}
