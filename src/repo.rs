use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("store error: {0}")] Store(String),
}

impl From<sqlx::Error> for RepoError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            other => RepoError::Store(other.to_string()),
        }
    }
}

pub type RepoResult<T> = Result<T, RepoError>;

#[async_trait]
pub trait PostRepo: Send + Sync {
    async fn count_posts(&self, filter: &PostFilter) -> RepoResult<i64>;
    /// Newest `published_at` first.
    async fn list_post_summaries(&self, filter: &PostFilter, offset: i64, limit: i64) -> RepoResult<Vec<PostSummary>>;
    /// Most recently updated first.
    async fn list_admin_posts(&self, filter: &PostFilter, offset: i64, limit: i64) -> RepoResult<Vec<AdminPostListItem>>;
    async fn get_published_post(&self, section: Section, slug: &str) -> RepoResult<Option<Post>>;
    /// Published only; resolves the source of related/sidebar lookups.
    async fn find_published_post_id(&self, section: Section, slug: &str) -> RepoResult<Option<Id>>;
    async fn get_post(&self, id: Id) -> RepoResult<Option<Post>>;
    async fn published_ids_in(&self, ids: &[Id], section: Section) -> RepoResult<Vec<Id>>;
    async fn published_summaries_by_ids(&self, ids: &[Id], section: Section) -> RepoResult<Vec<PostSummary>>;
    async fn create_post(&self, new: PostRecord) -> RepoResult<PostHead>;
    async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<PostHead>;
    async fn publish_post(&self, id: Id, at: DateTime<Utc>) -> RepoResult<PublishState>;
    async fn unpublish_post(&self, id: Id) -> RepoResult<PublishState>;
}

#[async_trait]
pub trait TagRepo: Send + Sync {
    /// Global tags plus, when given, the section's own tags. Ordered by name.
    async fn list_tags(&self, section: Option<Section>) -> RepoResult<Vec<Tag>>;
    async fn tags_for_posts(&self, post_ids: &[Id]) -> RepoResult<HashMap<Id, Vec<Tag>>>;
    async fn tag_ids_by_slug(&self, slug: &str, section: Option<Section>) -> RepoResult<Vec<Id>>;
    async fn post_ids_with_tags(&self, tag_ids: &[Id]) -> RepoResult<Vec<Id>>;
    async fn tag_ids_for_post(&self, post_id: Id) -> RepoResult<Vec<Id>>;
    async fn shared_tag_counts(&self, tag_ids: &[Id], post_ids: &[Id]) -> RepoResult<HashMap<Id, usize>>;
    /// Delete every association of the post, then insert one per tag id.
    async fn replace_post_tags(&self, post_id: Id, tag_ids: &[Id]) -> RepoResult<()>;
    async fn create_tag(&self, name: &str, slug: &str, section: Option<Section>) -> RepoResult<Tag>;
    async fn update_tag(&self, id: Id, upd: UpdateTag) -> RepoResult<Tag>;
    async fn count_tag_usage(&self, id: Id) -> RepoResult<i64>;
    async fn delete_tag(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait SeriesRepo: Send + Sync {
    async fn series_ids_for_post(&self, post_id: Id) -> RepoResult<Vec<Id>>;
    async fn post_ids_in_series(&self, series_ids: &[Id]) -> RepoResult<Vec<Id>>;
    /// Lowest position wins.
    async fn first_series_id(&self, post_id: Id) -> RepoResult<Option<Id>>;
    async fn get_series(&self, id: Id) -> RepoResult<Option<Series>>;
    async fn series_entries(&self, series_id: Id, limit: i64) -> RepoResult<Vec<SeriesEntry>>;
    async fn list_series(&self, section: Section) -> RepoResult<Vec<Series>>;
    async fn create_series(&self, new: NewSeries) -> RepoResult<Series>;
    async fn series_for_posts(&self, post_ids: &[Id]) -> RepoResult<HashMap<Id, SeriesRef>>;
    /// Delete every membership of the post, then insert at most one at position 1.
    async fn set_post_series(&self, post_id: Id, series_id: Option<Id>) -> RepoResult<()>;
}

pub trait Repo: PostRepo + TagRepo + SeriesRepo {}

impl<T> Repo for T where T: PostRepo + TagRepo + SeriesRepo {}

/// Drop repeated ids, keeping first-seen order.
pub fn dedup_ids(ids: impl IntoIterator<Item = Id>) -> Vec<Id> {
    let mut seen = std::collections::HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use std::cmp::Reverse;
    use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
    use uuid::Uuid;

    #[derive(Clone)]
    struct SeriesPostRow {
        series_id: Id,
        post_id: Id,
        position: Option<i32>,
    }

    #[derive(Default)]
    struct State {
        posts: HashMap<Id, Post>,
        tags: HashMap<Id, Tag>,
        post_tags: Vec<(Id, Id)>, // (post_id, tag_id)
        series: HashMap<Id, Series>,
        series_posts: Vec<SeriesPostRow>,
    }

    /// Process-local store behind the same traits as Postgres; each call holds the lock for its whole effect.
    #[derive(Clone, Default)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
    }

    fn unique_violation(what: &str) -> RepoError {
        RepoError::Store(format!("duplicate key value violates unique constraint \"{what}\""))
    }

    fn fk_violation(what: &str) -> RepoError {
        RepoError::Store(format!("insert violates foreign key constraint \"{what}\""))
    }

    fn matches(post: &Post, f: &PostFilter) -> bool {
        if f.section.is_some_and(|s| s != post.section) { return false; }
        if f.status.is_some_and(|s| s != post.status) { return false; }
        if let Some(ids) = &f.post_ids {
            if !ids.contains(&post.id) { return false; }
        }
        if let Some(term) = f.search_term() {
            let needle = term.to_lowercase();
            let hit = |s: &str| s.to_lowercase().contains(&needle);
            let found = hit(&post.title)
                || hit(&post.slug)
                || post.excerpt.as_deref().is_some_and(hit)
                || (f.search_content && hit(&post.content_text));
            if !found { return false; }
        }
        true
    }

    fn summary(p: &Post) -> PostSummary {
        PostSummary {
            id: p.id,
            section: p.section,
            status: p.status,
            title: p.title.clone(),
            slug: p.slug.clone(),
            excerpt: p.excerpt.clone(),
            reading_time: p.reading_time,
            published_at: p.published_at,
            created_at: p.created_at,
            updated_at: p.updated_at,
            cover_image_url: p.cover_image_url.clone(),
            tags: Vec::new(),
        }
    }

    fn head(p: &Post) -> PostHead {
        PostHead { id: p.id, section: p.section, status: p.status, title: p.title.clone(), slug: p.slug.clone() }
    }

    fn window<T>(items: Vec<T>, offset: i64, limit: i64) -> Vec<T> {
        items.into_iter().skip(offset.max(0) as usize).take(limit.max(0) as usize).collect()
    }

    impl InMemRepo {
        pub fn new() -> Self { Self::default() }

        fn read(&self) -> RwLockReadGuard<'_, State> {
            self.state.read().unwrap_or_else(PoisonError::into_inner)
        }

        fn write(&self) -> RwLockWriteGuard<'_, State> {
            self.state.write().unwrap_or_else(PoisonError::into_inner)
        }

        /// Seed a raw `series_posts` row (arbitrary position), bypassing the one-series rule.
        pub fn insert_series_entry(&self, series_id: Id, post_id: Id, position: Option<i32>) {
            self.write().series_posts.push(SeriesPostRow { series_id, post_id, position });
        }

        /// Snapshot of the `(series_id, position)` rows for a post.
        pub fn series_rows_for_post(&self, post_id: Id) -> Vec<(Id, Option<i32>)> {
            self.read()
                .series_posts
                .iter()
                .filter(|r| r.post_id == post_id)
                .map(|r| (r.series_id, r.position))
                .collect()
        }
    }

    #[async_trait]
    impl PostRepo for InMemRepo {
        async fn count_posts(&self, filter: &PostFilter) -> RepoResult<i64> {
            let s = self.read();
            Ok(s.posts.values().filter(|p| matches(p, filter)).count() as i64)
        }

        async fn list_post_summaries(&self, filter: &PostFilter, offset: i64, limit: i64) -> RepoResult<Vec<PostSummary>> {
            let s = self.read();
            let mut v: Vec<_> = s.posts.values().filter(|p| matches(p, filter)).map(summary).collect();
            v.sort_by_key(|p| (Reverse(p.published_at), p.id));
            Ok(window(v, offset, limit))
        }

        async fn list_admin_posts(&self, filter: &PostFilter, offset: i64, limit: i64) -> RepoResult<Vec<AdminPostListItem>> {
            let s = self.read();
            let mut v: Vec<_> = s.posts.values().filter(|p| matches(p, filter)).collect();
            v.sort_by_key(|p| (Reverse(p.updated_at), p.id));
            let items = v
                .into_iter()
                .map(|p| AdminPostListItem {
                    id: p.id,
                    section: p.section,
                    status: p.status,
                    title: p.title.clone(),
                    slug: p.slug.clone(),
                    excerpt: p.excerpt.clone(),
                    published_at: p.published_at,
                    updated_at: p.updated_at,
                    cover_image_url: p.cover_image_url.clone(),
                    series: None,
                    tags: Vec::new(),
                })
                .collect();
            Ok(window(items, offset, limit))
        }

        async fn get_published_post(&self, section: Section, slug: &str) -> RepoResult<Option<Post>> {
            let s = self.read();
            Ok(s.posts
                .values()
                .find(|p| p.section == section && p.slug == slug && p.status == PostStatus::Published)
                .cloned())
        }

        async fn find_published_post_id(&self, section: Section, slug: &str) -> RepoResult<Option<Id>> {
            let s = self.read();
            Ok(s.posts
                .values()
                .find(|p| p.section == section && p.slug == slug && p.status == PostStatus::Published)
                .map(|p| p.id))
        }

        async fn get_post(&self, id: Id) -> RepoResult<Option<Post>> {
            Ok(self.read().posts.get(&id).cloned())
        }

        async fn published_ids_in(&self, ids: &[Id], section: Section) -> RepoResult<Vec<Id>> {
            let s = self.read();
            Ok(ids
                .iter()
                .filter(|id| {
                    s.posts.get(id).is_some_and(|p| p.section == section && p.status == PostStatus::Published)
                })
                .copied()
                .collect())
        }

        async fn published_summaries_by_ids(&self, ids: &[Id], section: Section) -> RepoResult<Vec<PostSummary>> {
            let s = self.read();
            let mut v: Vec<_> = dedup_ids(ids.iter().copied())
                .into_iter()
                .filter_map(|id| s.posts.get(&id))
                .filter(|p| p.section == section && p.status == PostStatus::Published)
                .map(summary)
                .collect();
            v.sort_by_key(|p| Reverse(p.published_at));
            Ok(v)
        }

        async fn create_post(&self, new: PostRecord) -> RepoResult<PostHead> {
            let mut s = self.write();
            if s.posts.values().any(|p| p.section == new.section && p.slug == new.slug) {
                return Err(unique_violation("posts_section_slug_key"));
            }
            let now = Utc::now();
            let post = Post {
                id: Uuid::new_v4(),
                section: new.section,
                status: PostStatus::Draft,
                title: new.title,
                slug: new.slug,
                excerpt: new.excerpt,
                content_json: new.content_json,
                content_text: new.content_text,
                reading_time: new.reading_time,
                published_at: None,
                cover_image_url: new.cover_image_url,
                category_id: new.category_id,
                created_at: now,
                updated_at: now,
                tags: Vec::new(),
            };
            let out = head(&post);
            s.posts.insert(post.id, post);
            Ok(out)
        }

        async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<PostHead> {
            let mut s = self.write();
            let current = s.posts.get(&id).ok_or(RepoError::NotFound)?;
            let section = upd.section.unwrap_or(current.section);
            let slug = upd.slug.clone().unwrap_or_else(|| current.slug.clone());
            if s.posts.values().any(|p| p.id != id && p.section == section && p.slug == slug) {
                return Err(unique_violation("posts_section_slug_key"));
            }
            let post = s.posts.get_mut(&id).ok_or(RepoError::NotFound)?;
            post.section = section;
            post.slug = slug;
            if let Some(title) = upd.title { post.title = title; }
            if let Some(excerpt) = upd.excerpt { post.excerpt = excerpt; }
            if let Some(doc) = upd.content_json { post.content_json = doc; }
            if let Some(text) = upd.content_text { post.content_text = text; }
            if let Some(minutes) = upd.reading_time { post.reading_time = minutes; }
            if let Some(url) = upd.cover_image_url { post.cover_image_url = url; }
            if let Some(category) = upd.category_id { post.category_id = category; }
            post.updated_at = Utc::now();
            Ok(head(post))
        }

        async fn publish_post(&self, id: Id, at: DateTime<Utc>) -> RepoResult<PublishState> {
            let mut s = self.write();
            let post = s.posts.get_mut(&id).ok_or(RepoError::NotFound)?;
            post.status = PostStatus::Published;
            post.published_at = Some(at);
            post.updated_at = Utc::now();
            Ok(PublishState { id, status: post.status, published_at: post.published_at })
        }

        async fn unpublish_post(&self, id: Id) -> RepoResult<PublishState> {
            let mut s = self.write();
            let post = s.posts.get_mut(&id).ok_or(RepoError::NotFound)?;
            post.status = PostStatus::Draft;
            post.published_at = None;
            post.updated_at = Utc::now();
            Ok(PublishState { id, status: post.status, published_at: None })
        }
    }

    #[async_trait]
    impl TagRepo for InMemRepo {
        async fn list_tags(&self, section: Option<Section>) -> RepoResult<Vec<Tag>> {
            let s = self.read();
            let mut v: Vec<_> = s
                .tags
                .values()
                .filter(|t| section.map_or(true, |sec| t.visible_in(sec)))
                .cloned()
                .collect();
            v.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
            Ok(v)
        }

        async fn tags_for_posts(&self, post_ids: &[Id]) -> RepoResult<HashMap<Id, Vec<Tag>>> {
            let s = self.read();
            let mut map: HashMap<Id, Vec<Tag>> = HashMap::new();
            for (post_id, tag_id) in s.post_tags.iter().filter(|(p, _)| post_ids.contains(p)) {
                if let Some(tag) = s.tags.get(tag_id) {
                    map.entry(*post_id).or_default().push(tag.clone());
                }
            }
            for tags in map.values_mut() {
                tags.sort_by(|a, b| a.name.cmp(&b.name));
            }
            Ok(map)
        }

        async fn tag_ids_by_slug(&self, slug: &str, section: Option<Section>) -> RepoResult<Vec<Id>> {
            let s = self.read();
            Ok(s.tags
                .values()
                .filter(|t| t.slug == slug && section.map_or(true, |sec| t.visible_in(sec)))
                .map(|t| t.id)
                .collect())
        }

        async fn post_ids_with_tags(&self, tag_ids: &[Id]) -> RepoResult<Vec<Id>> {
            let s = self.read();
            Ok(dedup_ids(s.post_tags.iter().filter(|(_, t)| tag_ids.contains(t)).map(|(p, _)| *p)))
        }

        async fn tag_ids_for_post(&self, post_id: Id) -> RepoResult<Vec<Id>> {
            let s = self.read();
            Ok(s.post_tags.iter().filter(|(p, _)| *p == post_id).map(|(_, t)| *t).collect())
        }

        async fn shared_tag_counts(&self, tag_ids: &[Id], post_ids: &[Id]) -> RepoResult<HashMap<Id, usize>> {
            let s = self.read();
            let mut counts = HashMap::new();
            for (post_id, _) in s
                .post_tags
                .iter()
                .filter(|(p, t)| post_ids.contains(p) && tag_ids.contains(t))
            {
                *counts.entry(*post_id).or_insert(0) += 1;
            }
            Ok(counts)
        }

        async fn replace_post_tags(&self, post_id: Id, tag_ids: &[Id]) -> RepoResult<()> {
            let mut s = self.write();
            if !s.posts.contains_key(&post_id) && !tag_ids.is_empty() {
                return Err(fk_violation("post_tags_post_id_fkey"));
            }
            if tag_ids.iter().any(|t| !s.tags.contains_key(t)) {
                return Err(fk_violation("post_tags_tag_id_fkey"));
            }
            s.post_tags.retain(|(p, _)| *p != post_id);
            s.post_tags.extend(tag_ids.iter().map(|t| (post_id, *t)));
            Ok(())
        }

        async fn create_tag(&self, name: &str, slug: &str, section: Option<Section>) -> RepoResult<Tag> {
            let mut s = self.write();
            if s.tags.values().any(|t| t.slug == slug && t.section == section) {
                return Err(unique_violation("tags_slug_section_key"));
            }
            let tag = Tag { id: Uuid::new_v4(), section, name: name.to_string(), slug: slug.to_string(), created_at: Utc::now() };
            s.tags.insert(tag.id, tag.clone());
            Ok(tag)
        }

        async fn update_tag(&self, id: Id, upd: UpdateTag) -> RepoResult<Tag> {
            let mut s = self.write();
            let current = s.tags.get(&id).ok_or(RepoError::NotFound)?;
            let slug = upd.slug.unwrap_or_else(|| current.slug.clone());
            let section = upd.section.unwrap_or(current.section);
            if s.tags.values().any(|t| t.id != id && t.slug == slug && t.section == section) {
                return Err(unique_violation("tags_slug_section_key"));
            }
            let tag = s.tags.get_mut(&id).ok_or(RepoError::NotFound)?;
            if let Some(name) = upd.name { tag.name = name; }
            tag.slug = slug;
            tag.section = section;
            Ok(tag.clone())
        }

        async fn count_tag_usage(&self, id: Id) -> RepoResult<i64> {
            Ok(self.read().post_tags.iter().filter(|(_, t)| *t == id).count() as i64)
        }

        async fn delete_tag(&self, id: Id) -> RepoResult<()> {
            self.write().tags.remove(&id);
            Ok(())
        }
    }

    #[async_trait]
    impl SeriesRepo for InMemRepo {
        async fn series_ids_for_post(&self, post_id: Id) -> RepoResult<Vec<Id>> {
            let s = self.read();
            Ok(dedup_ids(s.series_posts.iter().filter(|r| r.post_id == post_id).map(|r| r.series_id)))
        }

        async fn post_ids_in_series(&self, series_ids: &[Id]) -> RepoResult<Vec<Id>> {
            let s = self.read();
            Ok(dedup_ids(s.series_posts.iter().filter(|r| series_ids.contains(&r.series_id)).map(|r| r.post_id)))
        }

        async fn first_series_id(&self, post_id: Id) -> RepoResult<Option<Id>> {
            let s = self.read();
            Ok(s.series_posts
                .iter()
                .filter(|r| r.post_id == post_id)
                .min_by_key(|r| r.position.unwrap_or(i32::MAX))
                .map(|r| r.series_id))
        }

        async fn get_series(&self, id: Id) -> RepoResult<Option<Series>> {
            Ok(self.read().series.get(&id).cloned())
        }

        async fn series_entries(&self, series_id: Id, limit: i64) -> RepoResult<Vec<SeriesEntry>> {
            let s = self.read();
            let mut v: Vec<_> = s
                .series_posts
                .iter()
                .filter(|r| r.series_id == series_id)
                .map(|r| SeriesEntry { post_id: r.post_id, position: r.position })
                .collect();
            v.sort_by_key(|e| e.position.unwrap_or(i32::MAX));
            Ok(window(v, 0, limit))
        }

        async fn list_series(&self, section: Section) -> RepoResult<Vec<Series>> {
            let s = self.read();
            let mut v: Vec<_> = s.series.values().filter(|x| x.section == section).cloned().collect();
            v.sort_by(|a, b| a.title.cmp(&b.title));
            Ok(v)
        }

        async fn create_series(&self, new: NewSeries) -> RepoResult<Series> {
            let mut s = self.write();
            if s.series.values().any(|x| x.section == new.section && x.slug == new.slug) {
                return Err(unique_violation("series_section_slug_key"));
            }
            let series = Series {
                id: Uuid::new_v4(),
                section: new.section,
                title: new.title,
                slug: new.slug,
                description: new.description,
            };
            s.series.insert(series.id, series.clone());
            Ok(series)
        }

        async fn series_for_posts(&self, post_ids: &[Id]) -> RepoResult<HashMap<Id, SeriesRef>> {
            let s = self.read();
            let mut rows: Vec<_> = s.series_posts.iter().filter(|r| post_ids.contains(&r.post_id)).collect();
            rows.sort_by_key(|r| r.position.unwrap_or(i32::MAX));
            let mut map = HashMap::new();
            for r in rows {
                if let Some(series) = s.series.get(&r.series_id) {
                    map.entry(r.post_id).or_insert_with(|| SeriesRef {
                        id: series.id,
                        title: series.title.clone(),
                        slug: series.slug.clone(),
                    });
                }
            }
            Ok(map)
        }

        async fn set_post_series(&self, post_id: Id, series_id: Option<Id>) -> RepoResult<()> {
            let mut s = self.write();
            if let Some(series_id) = series_id {
                if !s.series.contains_key(&series_id) {
                    return Err(fk_violation("series_posts_series_id_fkey"));
                }
                if !s.posts.contains_key(&post_id) {
                    return Err(fk_violation("series_posts_post_id_fkey"));
                }
            }
            s.series_posts.retain(|r| r.post_id != post_id);
            if let Some(series_id) = series_id {
                s.series_posts.push(SeriesPostRow { series_id, post_id, position: Some(1) });
            }
            Ok(())
        }
    }
}

#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use sqlx::{FromRow, Pool, Postgres, QueryBuilder};

    const SUMMARY_COLUMNS: &str =
        "id, section, status, title, slug, excerpt, reading_time, published_at, created_at, updated_at, cover_image_url";
    const POST_COLUMNS: &str = "id, section, status, title, slug, excerpt, content_json, content_text, reading_time, \
        published_at, cover_image_url, category_id, created_at, updated_at";
    const TAG_COLUMNS: &str = "id, section, name, slug, created_at";
    const SERIES_COLUMNS: &str = "id, section, title, slug, description";

    #[derive(FromRow)]
    struct PostTagRow {
        post_id: Id,
        #[sqlx(flatten)]
        tag: Tag,
    }

    #[derive(FromRow)]
    struct PostSeriesRow {
        post_id: Id,
        #[sqlx(flatten)]
        series: SeriesRef,
    }

    #[derive(Clone)]
    pub struct PgRepo { pool: Pool<Postgres> }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }
    }

    /// `ILIKE` pattern matching `term` literally anywhere in the value.
    pub(crate) fn contains_pattern(term: &str) -> String {
        let mut pattern = String::with_capacity(term.len() + 2);
        pattern.push('%');
        for c in term.chars() {
            if matches!(c, '\\' | '%' | '_') {
                pattern.push('\\');
            }
            pattern.push(c);
        }
        pattern.push('%');
        pattern
    }

    fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, f: &PostFilter) {
        qb.push(" WHERE TRUE");
        if let Some(section) = f.section {
            qb.push(" AND section = ").push_bind(section);
        }
        if let Some(status) = f.status {
            qb.push(" AND status = ").push_bind(status);
        }
        if let Some(term) = f.search_term() {
            let pattern = contains_pattern(term);
            qb.push(" AND (title ILIKE ").push_bind(pattern.clone()).push(r" ESCAPE '\'");
            qb.push(" OR slug ILIKE ").push_bind(pattern.clone()).push(r" ESCAPE '\'");
            qb.push(" OR excerpt ILIKE ").push_bind(pattern.clone()).push(r" ESCAPE '\'");
            if f.search_content {
                qb.push(" OR content_text ILIKE ").push_bind(pattern).push(r" ESCAPE '\'");
            }
            qb.push(")");
        }
        if let Some(ids) = &f.post_ids {
            qb.push(" AND id = ANY(").push_bind(ids.clone()).push(")");
        }
    }

    #[async_trait]
    impl PostRepo for PgRepo {
        async fn count_posts(&self, filter: &PostFilter) -> RepoResult<i64> {
            let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM posts");
            push_filter(&mut qb, filter);
            Ok(qb.build_query_scalar::<i64>().fetch_one(&self.pool).await?)
        }

        async fn list_post_summaries(&self, filter: &PostFilter, offset: i64, limit: i64) -> RepoResult<Vec<PostSummary>> {
            let mut qb = QueryBuilder::new(format!("SELECT {SUMMARY_COLUMNS} FROM posts"));
            push_filter(&mut qb, filter);
            qb.push(" ORDER BY published_at DESC NULLS LAST, id OFFSET ").push_bind(offset);
            qb.push(" LIMIT ").push_bind(limit);
            Ok(qb.build_query_as::<PostSummary>().fetch_all(&self.pool).await?)
        }

        async fn list_admin_posts(&self, filter: &PostFilter, offset: i64, limit: i64) -> RepoResult<Vec<AdminPostListItem>> {
            let mut qb = QueryBuilder::new(
                "SELECT id, section, status, title, slug, excerpt, published_at, updated_at, cover_image_url FROM posts",
            );
            push_filter(&mut qb, filter);
            qb.push(" ORDER BY updated_at DESC, id OFFSET ").push_bind(offset);
            qb.push(" LIMIT ").push_bind(limit);
            Ok(qb.build_query_as::<AdminPostListItem>().fetch_all(&self.pool).await?)
        }

        async fn get_published_post(&self, section: Section, slug: &str) -> RepoResult<Option<Post>> {
            let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE status = 'PUBLISHED' AND section = $1 AND slug = $2");
            Ok(sqlx::query_as::<_, Post>(&sql).bind(section).bind(slug).fetch_optional(&self.pool).await?)
        }

        async fn find_published_post_id(&self, section: Section, slug: &str) -> RepoResult<Option<Id>> {
            Ok(sqlx::query_scalar::<_, Id>(
                "SELECT id FROM posts WHERE status = 'PUBLISHED' AND section = $1 AND slug = $2",
            )
            .bind(section)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?)
        }

        async fn get_post(&self, id: Id) -> RepoResult<Option<Post>> {
            let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1");
            Ok(sqlx::query_as::<_, Post>(&sql).bind(id).fetch_optional(&self.pool).await?)
        }

        async fn published_ids_in(&self, ids: &[Id], section: Section) -> RepoResult<Vec<Id>> {
            if ids.is_empty() { return Ok(Vec::new()); }
            Ok(sqlx::query_scalar::<_, Id>(
                "SELECT id FROM posts WHERE id = ANY($1) AND section = $2 AND status = 'PUBLISHED'",
            )
            .bind(ids)
            .bind(section)
            .fetch_all(&self.pool)
            .await?)
        }

        async fn published_summaries_by_ids(&self, ids: &[Id], section: Section) -> RepoResult<Vec<PostSummary>> {
            if ids.is_empty() { return Ok(Vec::new()); }
            let sql = format!(
                "SELECT {SUMMARY_COLUMNS} FROM posts WHERE id = ANY($1) AND section = $2 AND status = 'PUBLISHED' \
                 ORDER BY published_at DESC NULLS LAST"
            );
            Ok(sqlx::query_as::<_, PostSummary>(&sql).bind(ids).bind(section).fetch_all(&self.pool).await?)
        }

        async fn create_post(&self, new: PostRecord) -> RepoResult<PostHead> {
            let rec = sqlx::query_as::<_, PostHead>(
                "INSERT INTO posts (section, status, title, slug, excerpt, content_json, content_text, reading_time, \
                 published_at, cover_image_url, category_id) \
                 VALUES ($1, 'DRAFT', $2, $3, $4, $5, $6, $7, NULL, $8, $9) \
                 RETURNING id, section, status, title, slug",
            )
            .bind(new.section)
            .bind(&new.title)
            .bind(&new.slug)
            .bind(&new.excerpt)
            .bind(&new.content_json)
            .bind(&new.content_text)
            .bind(new.reading_time)
            .bind(&new.cover_image_url)
            .bind(new.category_id)
            .fetch_one(&self.pool)
            .await?;
            Ok(rec)
        }

        async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<PostHead> {
            let mut qb = QueryBuilder::new("UPDATE posts SET ");
            {
                let mut set = qb.separated(", ");
                set.push("updated_at = now()");
                if let Some(section) = upd.section { set.push("section = ").push_bind_unseparated(section); }
                if let Some(title) = upd.title { set.push("title = ").push_bind_unseparated(title); }
                if let Some(slug) = upd.slug { set.push("slug = ").push_bind_unseparated(slug); }
                if let Some(excerpt) = upd.excerpt { set.push("excerpt = ").push_bind_unseparated(excerpt); }
                if let Some(doc) = upd.content_json { set.push("content_json = ").push_bind_unseparated(doc); }
                if let Some(text) = upd.content_text { set.push("content_text = ").push_bind_unseparated(text); }
                if let Some(minutes) = upd.reading_time { set.push("reading_time = ").push_bind_unseparated(minutes); }
                if let Some(url) = upd.cover_image_url { set.push("cover_image_url = ").push_bind_unseparated(url); }
                if let Some(category) = upd.category_id { set.push("category_id = ").push_bind_unseparated(category); }
            }
            qb.push(" WHERE id = ").push_bind(id);
            qb.push(" RETURNING id, section, status, title, slug");
            qb.build_query_as::<PostHead>()
                .fetch_optional(&self.pool)
                .await?
                .ok_or(RepoError::NotFound)
        }

        async fn publish_post(&self, id: Id, at: DateTime<Utc>) -> RepoResult<PublishState> {
            sqlx::query_as::<_, PublishState>(
                "UPDATE posts SET status = 'PUBLISHED', published_at = $2, updated_at = now() WHERE id = $1 \
                 RETURNING id, status, published_at",
            )
            .bind(id)
            .bind(at)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepoError::NotFound)
        }

        async fn unpublish_post(&self, id: Id) -> RepoResult<PublishState> {
            sqlx::query_as::<_, PublishState>(
                "UPDATE posts SET status = 'DRAFT', published_at = NULL, updated_at = now() WHERE id = $1 \
                 RETURNING id, status, published_at",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepoError::NotFound)
        }
    }

    #[async_trait]
    impl TagRepo for PgRepo {
        async fn list_tags(&self, section: Option<Section>) -> RepoResult<Vec<Tag>> {
            let sql = format!(
                "SELECT {TAG_COLUMNS} FROM tags WHERE ($1::text IS NULL OR section IS NULL OR section = $1) ORDER BY name ASC"
            );
            Ok(sqlx::query_as::<_, Tag>(&sql).bind(section).fetch_all(&self.pool).await?)
        }

        async fn tags_for_posts(&self, post_ids: &[Id]) -> RepoResult<HashMap<Id, Vec<Tag>>> {
            let mut map: HashMap<Id, Vec<Tag>> = HashMap::new();
            if post_ids.is_empty() { return Ok(map); }
            let rows = sqlx::query_as::<_, PostTagRow>(
                "SELECT pt.post_id, t.id, t.section, t.name, t.slug, t.created_at \
                 FROM post_tags pt JOIN tags t ON t.id = pt.tag_id \
                 WHERE pt.post_id = ANY($1) ORDER BY t.name",
            )
            .bind(post_ids)
            .fetch_all(&self.pool)
            .await?;
            for row in rows {
                map.entry(row.post_id).or_default().push(row.tag);
            }
            Ok(map)
        }

        async fn tag_ids_by_slug(&self, slug: &str, section: Option<Section>) -> RepoResult<Vec<Id>> {
            Ok(sqlx::query_scalar::<_, Id>(
                "SELECT id FROM tags WHERE slug = $1 AND ($2::text IS NULL OR section IS NULL OR section = $2)",
            )
            .bind(slug)
            .bind(section)
            .fetch_all(&self.pool)
            .await?)
        }

        async fn post_ids_with_tags(&self, tag_ids: &[Id]) -> RepoResult<Vec<Id>> {
            if tag_ids.is_empty() { return Ok(Vec::new()); }
            Ok(sqlx::query_scalar::<_, Id>("SELECT DISTINCT post_id FROM post_tags WHERE tag_id = ANY($1)")
                .bind(tag_ids)
                .fetch_all(&self.pool)
                .await?)
        }

        async fn tag_ids_for_post(&self, post_id: Id) -> RepoResult<Vec<Id>> {
            Ok(sqlx::query_scalar::<_, Id>("SELECT tag_id FROM post_tags WHERE post_id = $1")
                .bind(post_id)
                .fetch_all(&self.pool)
                .await?)
        }

        async fn shared_tag_counts(&self, tag_ids: &[Id], post_ids: &[Id]) -> RepoResult<HashMap<Id, usize>> {
            if tag_ids.is_empty() || post_ids.is_empty() { return Ok(HashMap::new()); }
            let rows = sqlx::query_as::<_, (Id, i64)>(
                "SELECT post_id, COUNT(*) FROM post_tags WHERE post_id = ANY($1) AND tag_id = ANY($2) GROUP BY post_id",
            )
            .bind(post_ids)
            .bind(tag_ids)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows.into_iter().map(|(id, n)| (id, n as usize)).collect())
        }

        async fn replace_post_tags(&self, post_id: Id, tag_ids: &[Id]) -> RepoResult<()> {
            let mut tx = self.pool.begin().await?;
            sqlx::query("DELETE FROM post_tags WHERE post_id = $1")
                .bind(post_id)
                .execute(&mut *tx)
                .await?;
            if !tag_ids.is_empty() {
                sqlx::query("INSERT INTO post_tags (post_id, tag_id) SELECT $1, unnest($2::uuid[])")
                    .bind(post_id)
                    .bind(tag_ids)
                    .execute(&mut *tx)
                    .await?;
            }
            tx.commit().await?;
            Ok(())
        }

        async fn create_tag(&self, name: &str, slug: &str, section: Option<Section>) -> RepoResult<Tag> {
            let sql = format!("INSERT INTO tags (name, slug, section) VALUES ($1, $2, $3) RETURNING {TAG_COLUMNS}");
            Ok(sqlx::query_as::<_, Tag>(&sql).bind(name).bind(slug).bind(section).fetch_one(&self.pool).await?)
        }

        async fn update_tag(&self, id: Id, upd: UpdateTag) -> RepoResult<Tag> {
            let mut qb = QueryBuilder::new("UPDATE tags SET ");
            {
                let mut set = qb.separated(", ");
                set.push("id = id");
                if let Some(name) = upd.name { set.push("name = ").push_bind_unseparated(name); }
                if let Some(slug) = upd.slug { set.push("slug = ").push_bind_unseparated(slug); }
                if let Some(section) = upd.section { set.push("section = ").push_bind_unseparated(section); }
            }
            qb.push(" WHERE id = ").push_bind(id);
            qb.push(format!(" RETURNING {TAG_COLUMNS}"));
            qb.build_query_as::<Tag>()
                .fetch_optional(&self.pool)
                .await?
                .ok_or(RepoError::NotFound)
        }

        async fn count_tag_usage(&self, id: Id) -> RepoResult<i64> {
            Ok(sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM post_tags WHERE tag_id = $1")
                .bind(id)
                .fetch_one(&self.pool)
                .await?)
        }

        async fn delete_tag(&self, id: Id) -> RepoResult<()> {
            sqlx::query("DELETE FROM tags WHERE id = $1").bind(id).execute(&self.pool).await?;
            Ok(())
        }
    }

    #[async_trait]
    impl SeriesRepo for PgRepo {
        async fn series_ids_for_post(&self, post_id: Id) -> RepoResult<Vec<Id>> {
            Ok(sqlx::query_scalar::<_, Id>("SELECT DISTINCT series_id FROM series_posts WHERE post_id = $1")
                .bind(post_id)
                .fetch_all(&self.pool)
                .await?)
        }

        async fn post_ids_in_series(&self, series_ids: &[Id]) -> RepoResult<Vec<Id>> {
            if series_ids.is_empty() { return Ok(Vec::new()); }
            Ok(sqlx::query_scalar::<_, Id>("SELECT DISTINCT post_id FROM series_posts WHERE series_id = ANY($1)")
                .bind(series_ids)
                .fetch_all(&self.pool)
                .await?)
        }

        async fn first_series_id(&self, post_id: Id) -> RepoResult<Option<Id>> {
            Ok(sqlx::query_scalar::<_, Id>(
                "SELECT series_id FROM series_posts WHERE post_id = $1 ORDER BY position ASC NULLS LAST LIMIT 1",
            )
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await?)
        }

        async fn get_series(&self, id: Id) -> RepoResult<Option<Series>> {
            let sql = format!("SELECT {SERIES_COLUMNS} FROM series WHERE id = $1");
            Ok(sqlx::query_as::<_, Series>(&sql).bind(id).fetch_optional(&self.pool).await?)
        }

        async fn series_entries(&self, series_id: Id, limit: i64) -> RepoResult<Vec<SeriesEntry>> {
            Ok(sqlx::query_as::<_, SeriesEntry>(
                "SELECT post_id, position FROM series_posts WHERE series_id = $1 ORDER BY position ASC NULLS LAST LIMIT $2",
            )
            .bind(series_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?)
        }

        async fn list_series(&self, section: Section) -> RepoResult<Vec<Series>> {
            let sql = format!("SELECT {SERIES_COLUMNS} FROM series WHERE section = $1 ORDER BY title ASC");
            Ok(sqlx::query_as::<_, Series>(&sql).bind(section).fetch_all(&self.pool).await?)
        }

        async fn create_series(&self, new: NewSeries) -> RepoResult<Series> {
            let sql = format!(
                "INSERT INTO series (section, title, slug, description) VALUES ($1, $2, $3, $4) RETURNING {SERIES_COLUMNS}"
            );
            Ok(sqlx::query_as::<_, Series>(&sql)
                .bind(new.section)
                .bind(&new.title)
                .bind(&new.slug)
                .bind(&new.description)
                .fetch_one(&self.pool)
                .await?)
        }

        async fn series_for_posts(&self, post_ids: &[Id]) -> RepoResult<HashMap<Id, SeriesRef>> {
            let mut map = HashMap::new();
            if post_ids.is_empty() { return Ok(map); }
            let rows = sqlx::query_as::<_, PostSeriesRow>(
                "SELECT sp.post_id, s.id, s.title, s.slug FROM series_posts sp JOIN series s ON s.id = sp.series_id \
                 WHERE sp.post_id = ANY($1) ORDER BY sp.position ASC NULLS LAST",
            )
            .bind(post_ids)
            .fetch_all(&self.pool)
            .await?;
            for row in rows {
                map.entry(row.post_id).or_insert(row.series);
            }
            Ok(map)
        }

        async fn set_post_series(&self, post_id: Id, series_id: Option<Id>) -> RepoResult<()> {
            let mut tx = self.pool.begin().await?;
            sqlx::query("DELETE FROM series_posts WHERE post_id = $1")
                .bind(post_id)
                .execute(&mut *tx)
                .await?;
            if let Some(series_id) = series_id {
                sqlx::query("INSERT INTO series_posts (series_id, post_id, position) VALUES ($1, $2, 1)")
                    .bind(series_id)
                    .bind(post_id)
                    .execute(&mut *tx)
                    .await?;
            }
            tx.commit().await?;
            Ok(())
        }
    }
}
