use std::sync::Arc;

use actix_web::{web, HttpResponse};
use chrono::Utc;
use validator::Validate;

use crate::auth::{AuthUser, IdentityProvider, RequireAdmin};
use crate::error::{ApiError, ApiErrorBody};
use crate::models::*;
use crate::rate_limit::{RateLimit, RateLimiterFacade};
use crate::repo::Repo;
use crate::{posts, related, security, sidebar, tags};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::QueryConfig::default().error_handler(|err, _| ApiError::bad_query(err.to_string()).into()))
        .app_data(web::PathConfig::default().error_handler(|err, _| ApiError::bad_params(err.to_string()).into()))
        .app_data(web::JsonConfig::default().error_handler(|err, _| ApiError::bad_body(err.to_string()).into()))
        .service(
            web::scope("/admin")
                .wrap(RequireAdmin)
                .wrap(RateLimit::admin())
                .wrap(security::no_store())
                .service(
                    web::resource("/posts")
                        .route(web::get().to(admin_list_posts))
                        .route(web::post().to(admin_create_post)),
                )
                .service(
                    web::resource("/posts/{id}")
                        .route(web::get().to(admin_get_post))
                        .route(web::put().to(admin_update_post)),
                )
                .service(web::resource("/posts/{id}/publish").route(web::post().to(admin_publish_post)))
                .service(web::resource("/posts/{id}/unpublish").route(web::post().to(admin_unpublish_post)))
                .service(web::resource("/posts/{id}/tags").route(web::put().to(admin_replace_post_tags)))
                .service(
                    web::resource("/posts/{id}/series")
                        .route(web::get().to(admin_get_post_series))
                        .route(web::put().to(admin_set_post_series)),
                )
                .service(
                    web::resource("/series")
                        .route(web::get().to(admin_list_series))
                        .route(web::post().to(admin_create_series)),
                )
                .service(
                    web::resource("/tags")
                        .route(web::get().to(admin_list_tags))
                        .route(web::post().to(admin_create_tag)),
                )
                .service(
                    web::resource("/tags/{id}")
                        .route(web::patch().to(admin_update_tag))
                        .route(web::delete().to(admin_delete_tag)),
                ),
        )
        .route("/health", web::get().to(health))
        .route("/tags", web::get().to(list_tags))
        .route("/posts", web::get().to(list_posts))
        .route("/posts/{section}/{slug}", web::get().to(get_post))
        .route("/posts/{section}/{slug}/related", web::get().to(related_posts))
        .route("/posts/{section}/{slug}/series", web::get().to(series_sidebar))
        .default_service(web::to(not_found));
}

/// `repo` runs with the anonymous credential; `admin_repo` with the service credential.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub admin_repo: Arc<dyn Repo>,
    pub identity: Arc<dyn IdentityProvider>,
    pub rate_limiter: RateLimiterFacade,
}

async fn not_found() -> Result<HttpResponse, ApiError> {
    Err(ApiError::NotFound)
}

// ---------------- public ------------------------------------------------

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Liveness probe", body = Health))
)]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(Health { ok: true, service: "yslids-api".into(), ts: Utc::now() })
}

#[utoipa::path(
    get,
    path = "/posts",
    tag = "posts",
    params(ListPostsQuery),
    responses(
        (status = 200, description = "Published posts, newest first", body = PostPage),
        (status = 400, description = "Invalid query", body = ApiErrorBody)
    )
)]
pub async fn list_posts(data: web::Data<AppState>, query: web::Query<ListPostsQuery>) -> Result<HttpResponse, ApiError> {
    let query = query.into_inner();
    query.validate().map_err(ApiError::bad_query)?;
    let page = posts::list_published(data.repo.as_ref(), query).await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/posts/{section}/{slug}",
    tag = "posts",
    params(("section" = Section, Path, description = "TECH or FASEC"), ("slug" = String, Path, description = "Post slug")),
    responses(
        (status = 200, description = "Published post with its tags", body = Post),
        (status = 404, description = "POST_NOT_FOUND", body = ApiErrorBody)
    )
)]
pub async fn get_post(data: web::Data<AppState>, path: web::Path<(Section, String)>) -> Result<HttpResponse, ApiError> {
    let (section, slug) = path.into_inner();
    let post = posts::get_published_detail(data.repo.as_ref(), section, &slug).await?;
    Ok(HttpResponse::Ok().json(post))
}

#[utoipa::path(
    get,
    path = "/posts/{section}/{slug}/related",
    tag = "posts",
    params(("section" = Section, Path, description = "TECH or FASEC"), ("slug" = String, Path, description = "Post slug"), RelatedQuery),
    responses(
        (status = 200, description = "Related published posts", body = PostItems),
        (status = 404, description = "POST_NOT_FOUND", body = ApiErrorBody)
    )
)]
pub async fn related_posts(
    data: web::Data<AppState>,
    path: web::Path<(Section, String)>,
    query: web::Query<RelatedQuery>,
) -> Result<HttpResponse, ApiError> {
    query.validate().map_err(ApiError::bad_query)?;
    let (section, slug) = path.into_inner();
    let items = related::related_posts(data.repo.as_ref(), section, &slug, query.limit as usize).await?;
    Ok(HttpResponse::Ok().json(Items { items }))
}

#[utoipa::path(
    get,
    path = "/posts/{section}/{slug}/series",
    tag = "posts",
    params(("section" = Section, Path, description = "TECH or FASEC"), ("slug" = String, Path, description = "Post slug"), SeriesSidebarQuery),
    responses(
        (status = 200, description = "Series of the post and its published siblings", body = SeriesSidebar),
        (status = 404, description = "POST_NOT_FOUND", body = ApiErrorBody)
    )
)]
pub async fn series_sidebar(
    data: web::Data<AppState>,
    path: web::Path<(Section, String)>,
    query: web::Query<SeriesSidebarQuery>,
) -> Result<HttpResponse, ApiError> {
    query.validate().map_err(ApiError::bad_query)?;
    let (section, slug) = path.into_inner();
    let sidebar = sidebar::series_sidebar(data.repo.as_ref(), section, &slug, query.limit).await?;
    Ok(HttpResponse::Ok().json(sidebar))
}

#[utoipa::path(
    get,
    path = "/tags",
    tag = "posts",
    params(TagsQuery),
    responses((status = 200, description = "Global tags plus those of the section", body = TagItems))
)]
pub async fn list_tags(data: web::Data<AppState>, query: web::Query<TagsQuery>) -> Result<HttpResponse, ApiError> {
    let items = tags::list_tags(data.repo.as_ref(), query.section).await?;
    Ok(HttpResponse::Ok().json(items))
}

// ---------------- admin -------------------------------------------------

#[utoipa::path(
    get,
    path = "/admin/posts",
    tag = "admin",
    params(AdminListPostsQuery),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Posts of any status, most recently updated first", body = AdminPostPage),
        (status = 401, description = "NO_TOKEN, EMPTY_TOKEN or INVALID_JWT", body = ApiErrorBody),
        (status = 403, description = "NOT_ADMIN", body = ApiErrorBody)
    )
)]
pub async fn admin_list_posts(data: web::Data<AppState>, query: web::Query<AdminListPostsQuery>) -> Result<HttpResponse, ApiError> {
    let query = query.into_inner();
    query.validate().map_err(ApiError::bad_query)?;
    let page = posts::list_admin(data.admin_repo.as_ref(), query).await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/admin/posts/{id}",
    tag = "admin",
    params(("id" = Id, Path, description = "Post id")),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Post with all its tags", body = Post),
        (status = 404, description = "POST_NOT_FOUND", body = ApiErrorBody)
    )
)]
pub async fn admin_get_post(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let post = posts::get_admin_post(data.admin_repo.as_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(post))
}

#[utoipa::path(
    post,
    path = "/admin/posts",
    tag = "admin",
    request_body = NewPost,
    security(("bearer" = [])),
    responses(
        (status = 201, description = "Draft created", body = PostHead),
        (status = 400, description = "BAD_BODY", body = ApiErrorBody)
    )
)]
pub async fn admin_create_post(user: AuthUser, data: web::Data<AppState>, payload: web::Json<NewPost>) -> Result<HttpResponse, ApiError> {
    let new = payload.into_inner();
    new.validate().map_err(ApiError::bad_body)?;
    tracing::debug!(actor = %user.user_id, slug = %new.slug, "create post");
    let head = posts::create_post(data.admin_repo.as_ref(), new).await?;
    Ok(HttpResponse::Created().json(head))
}

#[utoipa::path(
    put,
    path = "/admin/posts/{id}",
    tag = "admin",
    params(("id" = Id, Path, description = "Post id")),
    request_body = UpdatePost,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Post updated", body = PostHead),
        (status = 400, description = "BAD_BODY", body = ApiErrorBody),
        (status = 404, description = "POST_NOT_FOUND", body = ApiErrorBody)
    )
)]
pub async fn admin_update_post(
    user: AuthUser,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdatePost>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let upd = payload.into_inner();
    upd.validate().map_err(ApiError::bad_body)?;
    tracing::debug!(actor = %user.user_id, post_id = %id, "update post");
    let head = posts::update_post(data.admin_repo.as_ref(), id, upd).await?;
    Ok(HttpResponse::Ok().json(head))
}

#[utoipa::path(
    post,
    path = "/admin/posts/{id}/publish",
    tag = "admin",
    params(("id" = Id, Path, description = "Post id")),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Published now", body = PublishState),
        (status = 404, description = "POST_NOT_FOUND", body = ApiErrorBody)
    )
)]
pub async fn admin_publish_post(user: AuthUser, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    tracing::debug!(actor = %user.user_id, post_id = %id, "publish post");
    let state = posts::publish(data.admin_repo.as_ref(), id).await?;
    Ok(HttpResponse::Ok().json(state))
}

#[utoipa::path(
    post,
    path = "/admin/posts/{id}/unpublish",
    tag = "admin",
    params(("id" = Id, Path, description = "Post id")),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Back to draft", body = PublishState),
        (status = 404, description = "POST_NOT_FOUND", body = ApiErrorBody)
    )
)]
pub async fn admin_unpublish_post(user: AuthUser, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    tracing::debug!(actor = %user.user_id, post_id = %id, "unpublish post");
    let state = posts::unpublish(data.admin_repo.as_ref(), id).await?;
    Ok(HttpResponse::Ok().json(state))
}

#[utoipa::path(
    put,
    path = "/admin/posts/{id}/tags",
    tag = "admin",
    params(("id" = Id, Path, description = "Post id")),
    request_body = ReplaceTags,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Tags replaced", body = TagsReplaced),
        (status = 400, description = "BAD_BODY (more than 3 tags)", body = ApiErrorBody),
        (status = 404, description = "POST_NOT_FOUND", body = ApiErrorBody)
    )
)]
pub async fn admin_replace_post_tags(
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<ReplaceTags>,
) -> Result<HttpResponse, ApiError> {
    let input = payload.into_inner();
    input.validate().map_err(ApiError::bad_body)?;
    let res = posts::replace_tags(data.admin_repo.as_ref(), path.into_inner(), input).await?;
    Ok(HttpResponse::Ok().json(res))
}

#[utoipa::path(
    get,
    path = "/admin/posts/{id}/series",
    tag = "admin",
    params(("id" = Id, Path, description = "Post id")),
    security(("bearer" = [])),
    responses((status = 200, description = "Current series of the post", body = PostSeries))
)]
pub async fn admin_get_post_series(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let res = posts::get_series(data.admin_repo.as_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(res))
}

#[utoipa::path(
    put,
    path = "/admin/posts/{id}/series",
    tag = "admin",
    params(("id" = Id, Path, description = "Post id")),
    request_body = SetSeries,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Series assigned or cleared", body = SeriesAssigned),
        (status = 404, description = "POST_NOT_FOUND", body = ApiErrorBody)
    )
)]
pub async fn admin_set_post_series(
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<SetSeries>,
) -> Result<HttpResponse, ApiError> {
    let res = posts::set_series(data.admin_repo.as_ref(), path.into_inner(), payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(res))
}

#[utoipa::path(
    get,
    path = "/admin/series",
    tag = "admin",
    params(SeriesListQuery),
    security(("bearer" = [])),
    responses((status = 200, description = "Series of a section", body = SeriesItems))
)]
pub async fn admin_list_series(data: web::Data<AppState>, query: web::Query<SeriesListQuery>) -> Result<HttpResponse, ApiError> {
    let items = posts::list_series(data.admin_repo.as_ref(), query.section).await?;
    Ok(HttpResponse::Ok().json(items))
}

#[utoipa::path(
    post,
    path = "/admin/series",
    tag = "admin",
    request_body = NewSeries,
    security(("bearer" = [])),
    responses(
        (status = 201, description = "Series created", body = Series),
        (status = 400, description = "BAD_BODY", body = ApiErrorBody)
    )
)]
pub async fn admin_create_series(data: web::Data<AppState>, payload: web::Json<NewSeries>) -> Result<HttpResponse, ApiError> {
    let new = payload.into_inner();
    new.validate().map_err(ApiError::bad_body)?;
    let series = posts::create_series(data.admin_repo.as_ref(), new).await?;
    Ok(HttpResponse::Created().json(series))
}

#[utoipa::path(
    get,
    path = "/admin/tags",
    tag = "admin",
    params(TagsQuery),
    security(("bearer" = [])),
    responses((status = 200, description = "Global tags plus those of the section, or every tag", body = TagItems))
)]
pub async fn admin_list_tags(data: web::Data<AppState>, query: web::Query<TagsQuery>) -> Result<HttpResponse, ApiError> {
    let items = tags::list_tags(data.admin_repo.as_ref(), query.section).await?;
    Ok(HttpResponse::Ok().json(items))
}

#[utoipa::path(
    post,
    path = "/admin/tags",
    tag = "admin",
    request_body = NewTag,
    security(("bearer" = [])),
    responses(
        (status = 201, description = "Tag created", body = TagItem),
        (status = 400, description = "BAD_BODY", body = ApiErrorBody)
    )
)]
pub async fn admin_create_tag(data: web::Data<AppState>, payload: web::Json<NewTag>) -> Result<HttpResponse, ApiError> {
    let item = tags::create_tag(data.admin_repo.as_ref(), payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(TagItem { item }))
}

#[utoipa::path(
    patch,
    path = "/admin/tags/{id}",
    tag = "admin",
    params(("id" = Id, Path, description = "Tag id")),
    request_body = UpdateTag,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Tag updated", body = TagItem),
        (status = 404, description = "TAG_NOT_FOUND", body = ApiErrorBody)
    )
)]
pub async fn admin_update_tag(
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdateTag>,
) -> Result<HttpResponse, ApiError> {
    let item = tags::update_tag(data.admin_repo.as_ref(), path.into_inner(), payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(TagItem { item }))
}

#[utoipa::path(
    delete,
    path = "/admin/tags/{id}",
    tag = "admin",
    params(("id" = Id, Path, description = "Tag id")),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Tag deleted", body = Ack),
        (status = 409, description = "TAG_IN_USE", body = ApiErrorBody)
    )
)]
pub async fn admin_delete_tag(user: AuthUser, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    tracing::debug!(actor = %user.user_id, tag_id = %id, "delete tag");
    let ack = tags::delete_tag(data.admin_repo.as_ref(), id).await?;
    Ok(HttpResponse::Ok().json(ack))
}
