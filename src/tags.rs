use crate::content::{normalize_tag_slug, slugify};
use crate::error::ApiError;
use crate::models::{Ack, Id, Items, NewTag, Section, Tag, UpdateTag};
use crate::repo::{RepoError, Repo};

pub async fn list_tags(repo: &dyn Repo, section: Option<Section>) -> Result<Items<Tag>, ApiError> {
    Ok(Items { items: repo.list_tags(section).await? })
}

/// Name is trimmed; a missing slug is derived from the name.
pub async fn create_tag(repo: &dyn Repo, input: NewTag) -> Result<Tag, ApiError> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_body("name must not be blank"));
    }
    let slug = match input.slug.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(given) => normalize_tag_slug(given),
        None => slugify(name),
    };
    if slug.is_empty() {
        return Err(ApiError::bad_body("slug must not be blank"));
    }
    Ok(repo.create_tag(name, &slug, input.section).await?)
}

pub async fn update_tag(repo: &dyn Repo, id: Id, patch: UpdateTag) -> Result<Tag, ApiError> {
    let patch = UpdateTag {
        name: patch.name.map(|n| n.trim().to_string()),
        slug: patch.slug.map(|s| s.trim().to_lowercase()),
        section: patch.section,
    };
    if patch.name.as_deref() == Some("") || patch.slug.as_deref() == Some("") {
        return Err(ApiError::bad_body("name and slug must not be blank"));
    }
    repo.update_tag(id, patch).await.map_err(|e| match e {
        RepoError::NotFound => ApiError::TagNotFound,
        other => other.into(),
    })
}

/// Refused while any post still references the tag.
pub async fn delete_tag(repo: &dyn Repo, id: Id) -> Result<Ack, ApiError> {
    if repo.count_tag_usage(id).await? > 0 {
        return Err(ApiError::TagInUse);
    }
    repo.delete_tag(id).await?;
    tracing::info!(tag_id = %id, "tag deleted");
    Ok(Ack { ok: true })
}
