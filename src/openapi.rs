use crate::error::{ApiErrorBody, ApiErrorDetail};
use crate::models::*;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).bearer_format("JWT").build()),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::health,
        crate::routes::list_posts,
        crate::routes::get_post,
        crate::routes::related_posts,
        crate::routes::series_sidebar,
        crate::routes::list_tags,
        crate::routes::admin_list_posts,
        crate::routes::admin_get_post,
        crate::routes::admin_create_post,
        crate::routes::admin_update_post,
        crate::routes::admin_publish_post,
        crate::routes::admin_unpublish_post,
        crate::routes::admin_replace_post_tags,
        crate::routes::admin_get_post_series,
        crate::routes::admin_set_post_series,
        crate::routes::admin_list_series,
        crate::routes::admin_create_series,
        crate::routes::admin_list_tags,
        crate::routes::admin_create_tag,
        crate::routes::admin_update_tag,
        crate::routes::admin_delete_tag,
    ),
    components(schemas(
        Section, PostStatus, Post, PostSummary, AdminPostListItem, PostHead, PublishState,
        Tag, TagRef, Series, SeriesRef, SeriesSidebar,
        NewPost, UpdatePost, NewTag, UpdateTag, NewSeries, ReplaceTags, SetSeries,
        PostPage, AdminPostPage, PostItems, TagItems, SeriesItems,
        TagItem, TagsReplaced, SeriesAssigned, PostSeries, Ack, Health,
        ApiErrorBody, ApiErrorDetail
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "posts", description = "Published posts, related posts and series"),
        (name = "admin", description = "Content management (admin role required)"),
    )
)]
pub struct ApiDoc;
