use std::future::{ready, Ready};
use std::rc::Rc;
use std::sync::Arc;

use actix_web::body::EitherBody;
use actix_web::dev::{Payload, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::{Header, AUTHORIZATION};
use actix_web::{web, Error, FromRequest, HttpMessage, HttpRequest, ResponseError};
use actix_web_httpauth::headers::authorization::{Authorization, Bearer};
use async_trait::async_trait;
use futures_util::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::routes::AppState;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    /// Unknown role names carry no capability.
    pub fn parse(raw: &str) -> Option<Role> {
        match raw {
            "admin" => Some(Role::Admin),
            "user" | "authenticated" => Some(Role::User),
            _ => None,
        }
    }
}

/// Identity resolved from a bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: String,
    pub email: Option<String>,
    pub roles: Vec<Role>,
}

impl AuthUser {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum IdentityError {
    #[error("identity service rejected the token (status {0})")] Rejected(u16),
    #[error("identity service unreachable: {0}")] Transport(String),
    #[error("unexpected identity payload: {0}")] Malformed(String),
}

/// Exchanges a bearer token for the user it belongs to.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify_bearer_token(&self, token: &str) -> Result<AuthUser, IdentityError>;
}

#[derive(Deserialize)]
struct RemoteUser {
    id: String,
    email: Option<String>,
    #[serde(default)]
    app_metadata: AppMetadata,
}

#[derive(Deserialize, Default)]
struct AppMetadata {
    role: Option<String>,
}

/// GoTrue-compatible identity service (`GET {base}/auth/v1/user`).
#[derive(Clone)]
pub struct RemoteIdentity {
    client: reqwest::Client,
    base_url: String,
    anon_key: String,
}

impl RemoteIdentity {
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client: reqwest::Client::new(), base_url, anon_key: anon_key.into() }
    }
}

#[async_trait]
impl IdentityProvider for RemoteIdentity {
    async fn verify_bearer_token(&self, token: &str) -> Result<AuthUser, IdentityError> {
        let res = self
            .client
            .get(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| IdentityError::Transport(e.to_string()))?;
        if !res.status().is_success() {
            return Err(IdentityError::Rejected(res.status().as_u16()));
        }
        let user: RemoteUser = res.json().await.map_err(|e| IdentityError::Malformed(e.to_string()))?;
        let roles = user.app_metadata.role.as_deref().and_then(Role::parse).into_iter().collect();
        Ok(AuthUser { user_id: user.id, email: user.email, roles })
    }
}

/// `NO_TOKEN` unless the header uses the `Bearer` scheme; `EMPTY_TOKEN` when nothing follows it.
fn bearer_token(req: &ServiceRequest) -> Result<String, ApiError> {
    match Authorization::<Bearer>::parse(req) {
        Ok(auth) => {
            let token = auth.as_ref().token().trim();
            if token.is_empty() {
                Err(ApiError::EmptyToken)
            } else {
                Ok(token.to_string())
            }
        }
        Err(_) => {
            let raw = req.headers().get(AUTHORIZATION).and_then(|v| v.to_str().ok()).unwrap_or_default();
            if raw.trim_end() == "Bearer" {
                Err(ApiError::EmptyToken)
            } else {
                Err(ApiError::NoToken)
            }
        }
    }
}

/// Guards a scope: only callers whose token resolves to an admin get through.
/// The identity provider comes from the registered [`AppState`].
#[derive(Clone, Default)]
pub struct RequireAdmin;

impl<S, B> Transform<S, ServiceRequest> for RequireAdmin
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = RequireAdminMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequireAdminMiddleware { service: Rc::new(service) }))
    }
}

pub struct RequireAdminMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for RequireAdminMiddleware<S>
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
        let svc = self.service.clone();
        let identity: Option<Arc<dyn IdentityProvider>> =
            req.app_data::<web::Data<AppState>>().map(|state| state.identity.clone());
        Box::pin(async move {
            let verdict = match (bearer_token(&req), identity) {
                (Err(e), _) => Err(e),
                (Ok(_), None) => Err(ApiError::Internal("identity provider not configured".into())),
                (Ok(token), Some(identity)) => match identity.verify_bearer_token(&token).await {
                    Ok(user) if user.has_role(Role::Admin) => Ok(user),
                    Ok(user) => {
                        tracing::warn!(user_id = %user.user_id, "non-admin caller on admin route");
                        Err(ApiError::NotAdmin)
                    }
                    Err(e) => Err(ApiError::from(e)),
                },
            };
            match verdict {
                Ok(user) => {
                    req.extensions_mut().insert(user);
                    Ok(svc.call(req).await?.map_into_left_body())
                }
                Err(err) => {
                    let res = err.error_response();
                    Ok(req.into_response(res).map_into_right_body())
                }
            }
        })
    }
}

/// Extractor for the admin resolved by [`RequireAdmin`].
impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, ApiError>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(req.extensions().get::<AuthUser>().cloned().ok_or(ApiError::NoToken))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    fn token_of(header: Option<&str>) -> Result<String, &'static str> {
        let mut req = TestRequest::default();
        if let Some(h) = header {
            req = req.insert_header((AUTHORIZATION, h));
        }
        bearer_token(&req.to_srv_request()).map_err(|e| e.code())
    }

    #[test]
    fn header_shapes_map_to_distinct_codes() {
        assert_eq!(token_of(None), Err("NO_TOKEN"));
        assert_eq!(token_of(Some("Basic abc")), Err("NO_TOKEN"));
        assert_eq!(token_of(Some("Bearer ")), Err("EMPTY_TOKEN"));
        assert_eq!(token_of(Some("Bearer    ")), Err("EMPTY_TOKEN"));
        assert_eq!(token_of(Some("Bearer abc.def")), Ok("abc.def".to_string()));
    }

    #[test]
    fn role_parsing() {
        assert_eq!(Role::parse("admin"), Some(Role::Admin));
        assert_eq!(Role::parse("Admin"), None);
        let user = AuthUser { user_id: "u".into(), email: None, roles: vec![Role::User] };
        assert!(!user.has_role(Role::Admin));
    }
}
