#![allow(dead_code, unused_macros)]

use std::sync::Arc;
use std::time::Duration;

use actix_web::dev::ServiceResponse;
use actix_web::test;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use corner::auth::{AuthUser, IdentityError, IdentityProvider, Role};
use corner::models::{Id, NewSeries, PostRecord, Section};
use corner::rate_limit::{InMemoryRateLimiter, RateLimitConfig, RateLimiterFacade};
use corner::repo::inmem::InMemRepo;
use corner::repo::{PostRepo, SeriesRepo, TagRepo};
use corner::AppState;

pub const ADMIN_TOKEN: &str = "admin-token";
pub const USER_TOKEN: &str = "user-token";

/// Fixed token table standing in for the identity service.
pub struct StaticIdentity;

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn verify_bearer_token(&self, token: &str) -> Result<AuthUser, IdentityError> {
        match token {
            ADMIN_TOKEN => Ok(AuthUser { user_id: "admin-1".into(), email: Some("yslid@example.com".into()), roles: vec![Role::Admin] }),
            USER_TOKEN => Ok(AuthUser { user_id: "user-1".into(), email: None, roles: vec![Role::User] }),
            _ => Err(IdentityError::Rejected(401)),
        }
    }
}

pub fn state_with_limiter(repo: InMemRepo, limiter: RateLimiterFacade) -> AppState {
    AppState {
        repo: Arc::new(repo.clone()),
        admin_repo: Arc::new(repo),
        identity: Arc::new(StaticIdentity),
        rate_limiter: limiter,
    }
}

/// Both credential tiers share one store; rate limiting off.
pub fn state(repo: InMemRepo) -> AppState {
    let limiter = RateLimiterFacade::new(InMemoryRateLimiter::new(false), RateLimitConfig::new(100, Duration::from_secs(60)));
    state_with_limiter(repo, limiter)
}

/// Full route table with security headers over the given state.
macro_rules! app {
    ($state:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .wrap(corner::SecurityHeaders::default())
                .app_data(actix_web::web::Data::new($state))
                .configure(corner::config),
        )
        .await
    };
}

pub fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, d, 12, 0, 0).unwrap()
}

pub fn record(section: Section, slug: &str) -> PostRecord {
    PostRecord {
        section,
        title: format!("Title {slug}"),
        slug: slug.into(),
        excerpt: Some(format!("About {slug}")),
        content_json: serde_json::json!({"type": "doc"}),
        content_text: format!("body of {slug}"),
        reading_time: 1,
        cover_image_url: None,
        category_id: None,
    }
}

/// Draft post.
pub async fn draft(repo: &InMemRepo, section: Section, slug: &str) -> Id {
    repo.create_post(record(section, slug)).await.unwrap().id
}

/// Post published at `at`.
pub async fn published(repo: &InMemRepo, section: Section, slug: &str, at: DateTime<Utc>) -> Id {
    let id = draft(repo, section, slug).await;
    repo.publish_post(id, at).await.unwrap();
    id
}

pub async fn tag(repo: &InMemRepo, slug: &str, section: Option<Section>) -> Id {
    repo.create_tag(&slug.to_uppercase(), slug, section).await.unwrap().id
}

pub async fn series(repo: &InMemRepo, section: Section, slug: &str) -> Id {
    repo.create_series(NewSeries { section, title: format!("Series {slug}"), slug: slug.into(), description: None })
        .await
        .unwrap()
        .id
}

pub async fn json<B: actix_web::body::MessageBody>(resp: ServiceResponse<B>) -> Value {
    let body = test::read_body(resp).await;
    serde_json::from_slice(&body).unwrap()
}

pub fn slugs(v: &Value) -> Vec<String> {
    v["items"].as_array().unwrap().iter().map(|p| p["slug"].as_str().unwrap().to_string()).collect()
}
