use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    http::{header::AUTHORIZATION, Method},
    Error, FromRequest, HttpMessage, HttpRequest, ResponseError,
};
use futures::future::{ready, LocalBoxFuture, Ready};
use log::{debug, warn};
use std::sync::Arc;

use crate::auth::{AuthContext, AuthenticatedUser, PublicPaths, TokenError, TokenService};
use crate::error::ApiError;

pub const TOKEN_PREFIX: &str = "Bearer ";

/// 从 Authorization 头中取出 Bearer token
fn bearer_token(req: &ServiceRequest) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix(TOKEN_PREFIX))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// 令牌过滤器：每个请求执行一次，只负责建立身份，从不中断请求链
#[derive(Clone)]
pub struct JwtAuthorization {
    tokens: Arc<TokenService>,
}

impl JwtAuthorization {
    pub fn new(tokens: Arc<TokenService>) -> Self {
        Self { tokens }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtAuthorization
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = JwtAuthorizationService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(JwtAuthorizationService {
            service,
            tokens: self.tokens.clone(),
        }))
    }
}

pub struct JwtAuthorizationService<S> {
    service: S,
    tokens: Arc<TokenService>,
}

impl<S, B> Service<ServiceRequest> for JwtAuthorizationService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        // 预检请求直接放行
        if req.method() == Method::OPTIONS {
            return Box::pin(self.service.call(req));
        }

        let context = match bearer_token(&req) {
            None => AuthContext::NoToken,
            Some(token) => match self.tokens.verify(token) {
                Ok(user) => {
                    debug!("用户 {} 认证成功", user.username);
                    AuthContext::Verified(user)
                }
                Err(e) => {
                    warn!("Token 验证失败: {} ({})", e, req.path());
                    AuthContext::Rejected(e)
                }
            },
        };
        req.extensions_mut().insert(context);

        Box::pin(self.service.call(req))
    }
}

/// 访问决策：公开路径放行，其余路径要求已验证的身份
#[derive(Clone)]
pub struct AccessDecision {
    public_paths: Arc<PublicPaths>,
}

impl AccessDecision {
    pub fn new(public_paths: Arc<PublicPaths>) -> Self {
        Self { public_paths }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AccessDecision
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = AccessDecisionService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AccessDecisionService {
            service,
            public_paths: self.public_paths.clone(),
        }))
    }
}

pub struct AccessDecisionService<S> {
    service: S,
    public_paths: Arc<PublicPaths>,
}

impl<S> AccessDecisionService<S> {
    fn decide(&self, req: &ServiceRequest) -> Result<(), ApiError> {
        if req.method() == Method::OPTIONS || self.public_paths.is_public(req.path()) {
            return Ok(());
        }
        match req.extensions().get::<AuthContext>() {
            Some(AuthContext::Verified(_)) => Ok(()),
            Some(AuthContext::Rejected(TokenError::Expired)) => Err(ApiError::TokenExpired),
            _ => Err(ApiError::Unauthenticated),
        }
    }
}

impl<S, B> Service<ServiceRequest> for AccessDecisionService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        match self.decide(&req) {
            Ok(()) => {
                let fut = self.service.call(req);
                Box::pin(async move { fut.await.map(ServiceResponse::map_into_left_body) })
            }
            Err(e) => {
                warn!("拒绝未认证的请求: {} {}", req.method(), req.path());
                let (request, _) = req.into_parts();
                let response = e.error_response().map_into_right_body();
                Box::pin(ready(Ok::<_, Error>(ServiceResponse::new(request, response))))
            }
        }
    }
}

impl AuthenticatedUser {
    pub fn require_authority(&self, authority: &str) -> Result<(), ApiError> {
        if self.has_authority(authority) {
            Ok(())
        } else {
            warn!("用户 {} 缺少权限 {}", self.username, authority);
            Err(ApiError::AccessDenied)
        }
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthContext>()
                .and_then(AuthContext::user)
                .cloned()
                .ok_or(ApiError::Unauthenticated),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::roles::{USER_DELETE, USER_READ};
    use crate::config::JwtSettings;
    use crate::error::{LOGIN_REQUIRED, NOT_ENOUGH_PERMISSION, TOKEN_EXPIRED};
    use actix_web::{http::StatusCode, test, web, App, HttpResponse};
    use chrono::Duration;
    use serde_json::Value;

    const SECRET: &str = "middleware-test-secret";

    fn token_service(validity: Duration) -> Arc<TokenService> {
        Arc::new(TokenService::new(&JwtSettings {
            secret: SECRET.to_string(),
            validity,
            issuer: "Get Arrays, LLC".to_string(),
            audience: "User Management Portal".to_string(),
        }))
    }

    fn public_paths() -> Arc<PublicPaths> {
        Arc::new(PublicPaths::parse([
            "/user/login",
            "/user/register",
            "/user/image/**",
        ]))
    }

    async fn whoami(user: AuthenticatedUser) -> HttpResponse {
        HttpResponse::Ok().body(user.username)
    }

    async fn delete(user: AuthenticatedUser) -> Result<HttpResponse, ApiError> {
        user.require_authority(USER_DELETE)?;
        Ok(HttpResponse::Ok().finish())
    }

    async fn image() -> HttpResponse {
        HttpResponse::Ok().body("image")
    }

    async fn any() -> HttpResponse {
        HttpResponse::NoContent().finish()
    }

    macro_rules! app {
        () => {
            test::init_service(
                App::new()
                    .wrap(AccessDecision::new(public_paths()))
                    .wrap(JwtAuthorization::new(token_service(Duration::days(5))))
                    .route("/user/list", web::get().to(whoami))
                    .route("/user/delete/{id}", web::delete().to(delete))
                    .route("/user/image/{tail:.*}", web::get().to(image))
                    .route("/user/ping", web::route().to(any)),
            )
            .await
        };
    }

    fn bearer(authorities: &[&str]) -> String {
        let identity = AuthenticatedUser::new(
            "alice",
            authorities.iter().map(|a| a.to_string()).collect(),
        );
        let token = token_service(Duration::days(5)).issue(&identity).unwrap();
        format!("{}{}", TOKEN_PREFIX, token)
    }

    async fn message_of(resp: ServiceResponse<impl actix_web::body::MessageBody>) -> String {
        let body: Value = test::read_body_json(resp).await;
        body["message"].as_str().unwrap_or_default().to_string()
    }

    #[actix_web::test]
    async fn public_path_passes_without_token() {
        let app = app!();
        let req = test::TestRequest::get().uri("/user/image/anything").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn public_path_passes_with_bad_token() {
        let app = app!();
        let req = test::TestRequest::get()
            .uri("/user/image/alice/alice.jpg")
            .insert_header((AUTHORIZATION, "Bearer garbage"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn protected_path_requires_token() {
        let app = app!();
        let req = test::TestRequest::get().uri("/user/list").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(message_of(resp).await, LOGIN_REQUIRED.to_uppercase());
    }

    #[actix_web::test]
    async fn wrong_scheme_is_treated_as_missing() {
        let app = app!();
        let token = bearer(&[USER_READ]).replace(TOKEN_PREFIX, "Token ");
        let req = test::TestRequest::get()
            .uri("/user/list")
            .insert_header((AUTHORIZATION, token))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn garbage_token_on_protected_path_requires_login() {
        let app = app!();
        let req = test::TestRequest::get()
            .uri("/user/list")
            .insert_header((AUTHORIZATION, "Bearer garbage"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(message_of(resp).await, LOGIN_REQUIRED.to_uppercase());
    }

    #[actix_web::test]
    async fn token_signed_with_another_key_requires_login() {
        let app = app!();
        let foreign = TokenService::new(&JwtSettings {
            secret: "some-other-secret".to_string(),
            validity: Duration::days(5),
            issuer: "Get Arrays, LLC".to_string(),
            audience: "User Management Portal".to_string(),
        });
        let token = foreign
            .issue(&AuthenticatedUser::new("mallory", vec![USER_DELETE.to_string()]))
            .unwrap();
        let req = test::TestRequest::delete()
            .uri("/user/delete/7")
            .insert_header((AUTHORIZATION, format!("{}{}", TOKEN_PREFIX, token)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(message_of(resp).await, LOGIN_REQUIRED.to_uppercase());
    }

    #[actix_web::test]
    async fn verified_token_reaches_handler() {
        let app = app!();
        let req = test::TestRequest::get()
            .uri("/user/list")
            .insert_header((AUTHORIZATION, bearer(&[USER_READ])))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(test::read_body(resp).await, "alice");
    }

    #[actix_web::test]
    async fn expired_token_is_rejected_with_expiry_message() {
        let app = app!();
        let identity = AuthenticatedUser::new("alice", vec![USER_READ.to_string()]);
        let token = token_service(Duration::seconds(-30)).issue(&identity).unwrap();
        let req = test::TestRequest::get()
            .uri("/user/list")
            .insert_header((AUTHORIZATION, format!("{}{}", TOKEN_PREFIX, token)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(message_of(resp).await, TOKEN_EXPIRED.to_uppercase());
    }

    #[actix_web::test]
    async fn missing_authority_is_access_denied() {
        let app = app!();
        let req = test::TestRequest::delete()
            .uri("/user/delete/7")
            .insert_header((AUTHORIZATION, bearer(&[USER_READ])))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(message_of(resp).await, NOT_ENOUGH_PERMISSION.to_uppercase());
    }

    #[actix_web::test]
    async fn delete_authority_is_accepted() {
        let app = app!();
        let req = test::TestRequest::delete()
            .uri("/user/delete/7")
            .insert_header((AUTHORIZATION, bearer(&[USER_READ, USER_DELETE])))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn preflight_skips_authentication() {
        let app = app!();
        let req = test::TestRequest::default()
            .method(Method::OPTIONS)
            .uri("/user/ping")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }
}
