use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value; // rich-text document
use sqlx::postgres::{PgArgumentBuffer, PgTypeInfo, PgValueRef};
use sqlx::Postgres;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

pub type Id = Uuid;

#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

/// Top level content category. Stored as text in the `section` columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Section {
    Tech,
    Fasec,
}

impl Section {
    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Tech => "TECH",
            Section::Fasec => "FASEC",
        }
    }
}

impl FromStr for Section {
    type Err = ParseEnumError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TECH" => Ok(Section::Tech),
            "FASEC" => Ok(Section::Fasec),
            _ => Err(ParseEnumError { kind: "section", value: s.to_string() }),
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum PostStatus {
    Draft,
    Published,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "DRAFT",
            PostStatus::Published => "PUBLISHED",
        }
    }
}

impl FromStr for PostStatus {
    type Err = ParseEnumError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(PostStatus::Draft),
            "PUBLISHED" => Ok(PostStatus::Published),
            _ => Err(ParseEnumError { kind: "status", value: s.to_string() }),
        }
    }
}

// Both enums live in TEXT columns; decode through &str and parse.
macro_rules! text_enum_sqlx {
    ($ty:ty) => {
        impl sqlx::Type<Postgres> for $ty {
            fn type_info() -> PgTypeInfo {
                <String as sqlx::Type<Postgres>>::type_info()
            }
            fn compatible(ty: &PgTypeInfo) -> bool {
                <String as sqlx::Type<Postgres>>::compatible(ty)
            }
        }

        impl<'r> sqlx::Decode<'r, Postgres> for $ty {
            fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
                let s = <&str as sqlx::Decode<Postgres>>::decode(value)?;
                Ok(s.parse::<$ty>()?)
            }
        }

        impl<'q> sqlx::Encode<'q, Postgres> for $ty {
            fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> sqlx::encode::IsNull {
                <&str as sqlx::Encode<Postgres>>::encode(self.as_str(), buf)
            }
        }
    };
}

text_enum_sqlx!(Section);
text_enum_sqlx!(PostStatus);

/// Tag as attached to posts in public responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TagRef {
    pub id: Id,
    pub name: String,
    pub slug: String,
    pub section: Option<Section>, // null = global
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Tag {
    pub id: Id,
    pub section: Option<Section>,
    pub name: String,
    pub slug: String,
    pub created_at: DateTime<Utc>,
}

impl Tag {
    /// Global tags apply everywhere; scoped tags only within their own section.
    pub fn visible_in(&self, section: Section) -> bool {
        self.section.map_or(true, |s| s == section)
    }
}

impl From<&Tag> for TagRef {
    fn from(t: &Tag) -> Self {
        TagRef { id: t.id, name: t.name.clone(), slug: t.slug.clone(), section: t.section }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Post {
    pub id: Id,
    pub section: Section,
    pub status: PostStatus,
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    #[schema(value_type = Object)]
    pub content_json: Value,
    pub content_text: String,
    pub reading_time: i32,
    pub published_at: Option<DateTime<Utc>>,
    pub cover_image_url: Option<String>,
    pub category_id: Option<Id>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    #[serde(default)]
    pub tags: Vec<TagRef>,
}

/// Listing projection shared by the public list, related posts and the series sidebar.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct PostSummary {
    pub id: Id,
    pub section: Section,
    pub status: PostStatus,
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub reading_time: i32,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub cover_image_url: Option<String>,
    #[sqlx(skip)]
    #[serde(default)]
    pub tags: Vec<TagRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct AdminPostListItem {
    pub id: Id,
    pub section: Section,
    pub status: PostStatus,
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub cover_image_url: Option<String>,
    #[sqlx(skip)]
    #[serde(default)]
    pub series: Option<SeriesRef>,
    #[sqlx(skip)]
    #[serde(default)]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct PostHead {
    pub id: Id,
    pub section: Section,
    pub status: PostStatus,
    pub title: String,
    pub slug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct PublishState {
    pub id: Id,
    pub status: PostStatus,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Series {
    pub id: Id,
    pub section: Section,
    pub title: String,
    pub slug: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct SeriesRef {
    pub id: Id,
    pub title: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SeriesEntry {
    pub post_id: Id,
    pub position: Option<i32>,
}

// ---------------- inputs -----------------------------------------------

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
fn nullable<'de, D, T>(d: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(d).map(Some)
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct NewPost {
    pub section: Section,
    #[validate(length(min = 3))]
    pub title: String,
    #[validate(length(min = 3))]
    pub slug: String,
    pub excerpt: Option<String>,
    #[serde(default = "empty_object")]
    #[schema(value_type = Object)]
    pub content_json: Value,
    /// Derived from `content_json` when omitted.
    pub content_text: Option<String>,
    /// Derived from the plain text when omitted.
    #[validate(range(min = 0, max = 999))]
    pub reading_time: Option<i32>,
    #[validate(url)]
    pub cover_image_url: Option<String>,
    pub category_id: Option<Id>,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

/// Status and `published_at` only change through publish/unpublish, so they are rejected here.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, Validate)]
#[serde(deny_unknown_fields)]
pub struct UpdatePost {
    pub section: Option<Section>,
    #[validate(length(min = 3))]
    pub title: Option<String>,
    #[validate(length(min = 3))]
    pub slug: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>)]
    pub excerpt: Option<Option<String>>,
    #[schema(value_type = Option<Object>)]
    pub content_json: Option<Value>,
    pub content_text: Option<String>,
    #[validate(range(min = 0, max = 999))]
    pub reading_time: Option<i32>,
    #[serde(default, deserialize_with = "nullable")]
    #[validate(url)]
    #[schema(value_type = Option<String>)]
    pub cover_image_url: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<Id>)]
    pub category_id: Option<Option<Id>>,
}

/// Insert-ready post with derived fields filled in.
#[derive(Debug, Clone)]
pub struct PostRecord {
    pub section: Section,
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub content_json: Value,
    pub content_text: String,
    pub reading_time: i32,
    pub cover_image_url: Option<String>,
    pub category_id: Option<Id>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewTag {
    pub name: String,
    pub slug: Option<String>,
    #[serde(default)]
    pub section: Option<Section>, // null = global
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateTag {
    pub name: Option<String>,
    pub slug: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<Section>)]
    pub section: Option<Option<Section>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct NewSeries {
    pub section: Section,
    #[validate(length(min = 3))]
    pub title: String,
    #[validate(length(min = 3))]
    pub slug: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct ReplaceTags {
    #[validate(length(max = 3))]
    pub tag_ids: Vec<Id>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SetSeries {
    pub series_id: Option<Id>,
}

// ---------------- queries ----------------------------------------------

fn default_page() -> i64 { 1 }
fn default_public_limit() -> i64 { 10 }
fn default_admin_limit() -> i64 { 20 }
fn default_related_limit() -> i64 { 6 }
fn default_sidebar_limit() -> i64 { 12 }

#[derive(Debug, Clone, Deserialize, IntoParams, Validate)]
#[into_params(parameter_in = Query)]
pub struct ListPostsQuery {
    pub section: Option<Section>,
    pub q: Option<String>,
    pub tag: Option<String>,
    #[serde(default = "default_page")]
    #[validate(range(min = 1))]
    pub page: i64,
    #[serde(default = "default_public_limit")]
    #[validate(range(min = 1, max = 50))]
    pub limit: i64,
}

#[derive(Debug, Clone, Deserialize, IntoParams, Validate)]
#[into_params(parameter_in = Query)]
pub struct AdminListPostsQuery {
    pub section: Option<Section>,
    pub status: Option<PostStatus>,
    pub q: Option<String>,
    #[serde(default = "default_page")]
    #[validate(range(min = 1))]
    pub page: i64,
    #[serde(default = "default_admin_limit")]
    #[validate(range(min = 1, max = 50))]
    pub limit: i64,
}

#[derive(Debug, Clone, Deserialize, IntoParams, Validate)]
#[into_params(parameter_in = Query)]
pub struct RelatedQuery {
    #[serde(default = "default_related_limit")]
    #[validate(range(min = 1, max = 12))]
    pub limit: i64,
}

#[derive(Debug, Clone, Deserialize, IntoParams, Validate)]
#[into_params(parameter_in = Query)]
pub struct SeriesSidebarQuery {
    #[serde(default = "default_sidebar_limit")]
    #[validate(range(min = 1, max = 30))]
    pub limit: i64,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TagsQuery {
    pub section: Option<Section>,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SeriesListQuery {
    pub section: Section,
}

/// Filter shared by the count and page queries so `total` matches `items`.
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub section: Option<Section>,
    pub status: Option<PostStatus>,
    pub q: Option<String>,
    /// Restrict to these ids (already resolved from a tag filter).
    pub post_ids: Option<Vec<Id>>,
    /// Public search also scans `content_text`; the admin list does not.
    pub search_content: bool,
}

impl PostFilter {
    /// Trimmed, non-empty search term.
    pub fn search_term(&self) -> Option<&str> {
        self.q.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

// ---------------- responses --------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[aliases(PostPage = Page<PostSummary>, AdminPostPage = Page<AdminPostListItem>)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub limit: i64,
    pub total: i64,
}

impl<T> Page<T> {
    pub fn empty(page: i64, limit: i64, total: i64) -> Self {
        Page { items: Vec::new(), page, limit, total }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[aliases(PostItems = Items<PostSummary>, TagItems = Items<Tag>, SeriesItems = Items<Series>)]
pub struct Items<T> {
    pub items: Vec<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SeriesSidebar {
    pub series: Option<Series>,
    pub items: Vec<PostSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_post_id: Option<Id>,
}

impl SeriesSidebar {
    pub fn none() -> Self {
        SeriesSidebar { series: None, items: Vec::new(), current_post_id: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TagItem {
    pub item: Tag,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TagsReplaced {
    pub ok: bool,
    pub post_id: Id,
    pub tag_ids: Vec<Id>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SeriesAssigned {
    pub ok: bool,
    pub post_id: Id,
    pub series_id: Option<Id>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PostSeries {
    pub series_id: Option<Id>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Ack {
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Health {
    pub ok: bool,
    pub service: String,
    pub ts: DateTime<Utc>,
}
