use std::collections::VecDeque;
use std::future::{ready, Ready};
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use actix_web::body::EitherBody;
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::{HeaderValue, RETRY_AFTER};
use actix_web::{web, Error, ResponseError};
use dashmap::DashMap;
use futures_util::future::LocalBoxFuture;

use crate::error::ApiError;
use crate::routes::AppState;

/// Sliding window in-memory rate limiter (process local).
#[derive(Clone)]
pub struct InMemoryRateLimiter {
    store: Arc<DashMap<String, VecDeque<Instant>>>,
    pub enabled: bool,
}

impl InMemoryRateLimiter {
    pub fn new(enabled: bool) -> Self {
        Self { store: Arc::new(DashMap::new()), enabled }
    }

    /// `Err` carries how long until the oldest hit leaves the window.
    pub fn check(&self, key: &str, limit: usize, window: Duration) -> Result<(), Duration> {
        if !self.enabled { return Ok(()); }
        let now = Instant::now();
        let mut entry = self.store.entry(key.to_string()).or_default();
        while let Some(front) = entry.front() {
            if now.duration_since(*front) >= window { entry.pop_front(); } else { break; }
        }
        if entry.len() < limit {
            entry.push_back(now);
            Ok(())
        } else {
            let oldest = entry.front().copied().unwrap_or(now);
            Err(window.saturating_sub(now.duration_since(oldest)))
        }
    }

    /// Drop clients whose newest hit is older than `max_window`.
    pub fn sweep(&self, max_window: Duration) {
        let now = Instant::now();
        self.store.retain(|_, hits| hits.back().is_some_and(|t| now.duration_since(*t) < max_window));
    }

    pub fn tracked_keys(&self) -> usize {
        self.store.len()
    }
}

#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub public_limit: usize,
    pub public_window: Duration,
    pub admin_limit: usize,
    pub admin_window: Duration,
}

impl RateLimitConfig {
    /// Public ceiling from configuration; the admin bucket is fixed at 30 per minute.
    pub fn new(public_limit: usize, public_window: Duration) -> Self {
        Self { public_limit, public_window, admin_limit: 30, admin_window: Duration::from_secs(60) }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bucket {
    Public,
    Admin,
}

#[derive(Clone)]
pub struct RateLimiterFacade {
    pub limiter: InMemoryRateLimiter,
    pub cfg: RateLimitConfig,
}

impl RateLimiterFacade {
    pub fn new(limiter: InMemoryRateLimiter, cfg: RateLimitConfig) -> Self { Self { limiter, cfg } }
    pub fn allow_public(&self, ip: &str) -> Result<(), Duration> { self.limiter.check(&format!("public:{ip}"), self.cfg.public_limit, self.cfg.public_window) }
    pub fn allow_admin(&self, ip: &str) -> Result<(), Duration> { self.limiter.check(&format!("admin:{ip}"), self.cfg.admin_limit, self.cfg.admin_window) }

    pub fn sweep(&self) { self.limiter.sweep(self.cfg.public_window.max(self.cfg.admin_window)) }

    pub fn allow(&self, bucket: Bucket, ip: &str) -> Result<(), Duration> {
        match bucket {
            Bucket::Public => self.allow_public(ip),
            Bucket::Admin => self.allow_admin(ip),
        }
    }
}

/// Middleware applying one bucket per client address, using the limiter in [`AppState`].
#[derive(Clone)]
pub struct RateLimit {
    bucket: Bucket,
}

impl RateLimit {
    pub fn public() -> Self { Self { bucket: Bucket::Public } }
    pub fn admin() -> Self { Self { bucket: Bucket::Admin } }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimit
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = RateLimitMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddleware { service: Rc::new(service), bucket: self.bucket }))
    }
}

pub struct RateLimitMiddleware<S> {
    service: Rc<S>,
    bucket: Bucket,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, ctx: &mut std::task::Context<'_>) -> std::task::Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let ip = req.connection_info().realip_remote_addr().unwrap_or("unknown").to_string();
        let bucket = self.bucket;
        let verdict = match req.app_data::<web::Data<AppState>>() {
            Some(state) => state.rate_limiter.allow(bucket, &ip),
            None => Ok(()),
        };
        let svc = self.service.clone();
        Box::pin(async move {
            match verdict {
                Ok(()) => Ok(svc.call(req).await?.map_into_left_body()),
                Err(wait) => {
                    tracing::warn!(%ip, ?bucket, "rate limit exceeded");
                    let mut res = ApiError::RateLimited.error_response();
                    let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
                    res.headers_mut().insert(RETRY_AFTER, HeaderValue::from(secs.max(1)));
                    Ok(req.into_response(res).map_into_right_body())
                }
            }
        })
    }
}
