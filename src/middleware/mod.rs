//! Request-pipeline decorators.
//!
//! Each wrapper takes the rest of the pipeline as a closure, so a route reads
//! in execution order: admission, cache lookup, timing, handler, then cache
//! population or invalidation.

use crate::cache::CacheManager;
use crate::config::AuthSettings;
use crate::errors::GatewayError;
use crate::handlers::gateway_error_response;
use crate::models::{ApiResponse, AppState, Identity, Principal, SharedState};
use crate::rate_limit::Quota;
use http::header::{HeaderName, HeaderValue, AUTHORIZATION};
use http::{HeaderMap, Method};
use serde_json::{Map, Value};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use warp::Filter;

#[cfg(test)]
mod tests;

pub const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub const X_RESPONSE_TIME: &str = "x-response-time";
pub const X_CACHE: &str = "x-cache";

pub type HandlerResult = Result<ApiResponse, GatewayError>;

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    pub query: String,
    pub principal: Option<Principal>,
    pub client_addr: Option<String>,
}

impl RequestContext {
    pub fn new(method: Method, path: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: query.into(),
            principal: None,
            client_addr: None,
        }
    }

    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn with_client_addr(mut self, addr: impl Into<String>) -> Self {
        self.client_addr = Some(addr.into());
        self
    }

    /// Authenticated user id, else the client address.
    pub fn identity(&self) -> Identity {
        match (&self.principal, &self.client_addr) {
            (Some(principal), _) => Identity::User(principal.user_id.clone()),
            (None, Some(addr)) => Identity::Address(addr.clone()),
            (None, None) => Identity::Address("unknown".to_string()),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{} {}", self.method, self.path)
    }

    pub fn require_principal(&self) -> Result<&Principal, GatewayError> {
        self.principal.as_ref().ok_or(GatewayError::Unauthorized)
    }

    pub fn require_admin(&self) -> Result<&Principal, GatewayError> {
        let principal = self.require_principal()?;
        if !principal.is_admin() {
            return Err(GatewayError::Forbidden);
        }
        Ok(principal)
    }
}

/// Cache key groups; the prefix doubles as the invalidation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Attendance,
    Dashboard,
    Geofence,
}

impl Namespace {
    pub fn prefix(&self) -> &'static str {
        match self {
            Namespace::Attendance => "attendance",
            Namespace::Dashboard => "dashboard",
            Namespace::Geofence => "geofence",
        }
    }

    pub fn ttl(&self, state: &AppState) -> Duration {
        let settings = &state.config.cache;
        Duration::from_millis(match self {
            Namespace::Attendance => settings.attendance_ttl_ms,
            Namespace::Dashboard => settings.dashboard_ttl_ms,
            Namespace::Geofence => settings.geofence_ttl_ms,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CachePolicy {
    pub namespace: Namespace,
    pub user_scoped: bool,
}

impl CachePolicy {
    pub fn shared(namespace: Namespace) -> Self {
        Self {
            namespace,
            user_scoped: false,
        }
    }

    pub fn per_user(namespace: Namespace) -> Self {
        Self {
            namespace,
            user_scoped: true,
        }
    }
}

pub fn authenticate(headers: &HeaderMap, auth: &AuthSettings) -> Option<Principal> {
    let auth_str = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = auth_str.strip_prefix("Bearer ")?;
    auth.tokens.get(token.trim()).cloned()
}

pub fn client_addr(headers: &HeaderMap, remote: Option<SocketAddr>) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|hop| hop.trim().to_string())
        .filter(|hop| !hop.is_empty())
        .or_else(|| remote.map(|addr| addr.ip().to_string()))
}

/// Extracts a [`RequestContext`] from the incoming request.
pub fn with_context(
    state: SharedState,
) -> impl Filter<Extract = (RequestContext,), Error = Infallible> + Clone {
    warp::method()
        .and(warp::path::full())
        .and(
            warp::query::raw()
                .or(warp::any().map(String::new))
                .unify(),
        )
        .and(warp::header::headers_cloned())
        .and(warp::addr::remote())
        .map(
            move |method: Method,
                  path: warp::path::FullPath,
                  query: String,
                  headers: HeaderMap,
                  remote: Option<SocketAddr>| RequestContext {
                method,
                path: path.as_str().to_string(),
                query,
                principal: authenticate(&headers, &state.config.auth),
                client_addr: client_addr(&headers, remote),
            },
        )
}

pub fn with_state(state: SharedState) -> impl Filter<Extract = (SharedState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// Admission control against the limiter guarding `quota`.
pub async fn rate_limited<F, Fut>(
    state: &AppState,
    ctx: &RequestContext,
    quota: Quota,
    next: F,
) -> HandlerResult
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = HandlerResult>,
{
    let identity = ctx.identity();
    let (decision, limit) = {
        let mut limiter = state.limiter(quota).lock().await;
        (limiter.is_allowed(identity.as_str()), limiter.max_requests())
    };

    if !decision.allowed {
        let retry_after_secs = decision.retry_after_secs.unwrap_or(0);
        debug!(quota = %quota, identity = identity.as_str(), retry_after_secs, "Request rejected by rate limiter");
        return Err(GatewayError::RateLimitExceeded {
            quota,
            limit,
            retry_after_secs,
        });
    }

    // Admitted requests consumed quota, so failures still report it.
    let mut response = next().await.unwrap_or_else(|err| gateway_error_response(&err));
    add_rate_limit_headers(&mut response.headers, limit, decision.remaining);
    Ok(response)
}

/// Records handler latency and tags the response with it, error responses included.
pub async fn timed<F, Fut>(state: &AppState, ctx: &RequestContext, next: F) -> HandlerResult
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = HandlerResult>,
{
    let start = Instant::now();
    let result = next().await;
    let elapsed = start.elapsed();

    let endpoint = ctx.endpoint();
    state.tracker.lock().await.track_request(&endpoint, elapsed);

    if elapsed > state.config.performance.slow_request_threshold() {
        warn!(endpoint = %endpoint, elapsed_ms = elapsed.as_millis() as u64, "Slow request");
    }

    let mut response = result.unwrap_or_else(|err| gateway_error_response(&err));
    if let Ok(value) = HeaderValue::from_str(&format!("{}ms", elapsed.as_millis())) {
        response.headers.insert(HeaderName::from_static(X_RESPONSE_TIME), value);
    }
    Ok(response)
}

/// Read-through caching for GET requests.
pub async fn cached<F, Fut>(
    state: &AppState,
    ctx: &RequestContext,
    policy: CachePolicy,
    next: F,
) -> HandlerResult
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = HandlerResult>,
{
    if ctx.method != Method::GET {
        return next().await;
    }

    let key = cache_key(ctx, policy)?;
    if let Some(body) = state.cache.lock().await.get(&key) {
        return Ok(ApiResponse::ok(body).with_header(X_CACHE, HeaderValue::from_static("HIT")));
    }

    let mut response = next().await?;
    if response.status.is_success() && !response.body.is_null() {
        let ttl = policy.namespace.ttl(state);
        state
            .cache
            .lock()
            .await
            .set_with_ttl(key, response.body.clone(), ttl);
        response
            .headers
            .insert(HeaderName::from_static(X_CACHE), HeaderValue::from_static("MISS"));
    }
    Ok(response)
}

/// Drops every cached entry of `namespaces` once the write succeeded.
pub async fn invalidating<F, Fut>(state: &AppState, namespaces: &[Namespace], next: F) -> HandlerResult
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = HandlerResult>,
{
    let response = next().await?;
    if response.status.is_success() {
        let mut cache = state.cache.lock().await;
        for namespace in namespaces {
            let removed = cache.invalidate_prefix(namespace.prefix());
            debug!(namespace = namespace.prefix(), removed, "Invalidated cache namespace");
        }
    }
    Ok(response)
}

pub fn cache_key(ctx: &RequestContext, policy: CachePolicy) -> Result<String, GatewayError> {
    let mut params = Map::new();
    params.insert("path".to_string(), Value::String(ctx.path.clone()));
    params.insert("query".to_string(), Value::String(ctx.query.clone()));
    if policy.user_scoped {
        params.insert("user".to_string(), Value::String(ctx.identity().as_str().to_string()));
    }
    CacheManager::<Value>::generate_key(policy.namespace.prefix(), &params)
}

pub fn add_rate_limit_headers(headers: &mut HeaderMap, limit: usize, remaining: usize) {
    headers.insert(HeaderName::from_static(X_RATELIMIT_LIMIT), HeaderValue::from(limit));
    headers.insert(HeaderName::from_static(X_RATELIMIT_REMAINING), HeaderValue::from(remaining));
}

pub fn add_cors_headers(headers: &mut HeaderMap) {
    headers.insert(
        HeaderName::from_static("access-control-allow-origin"),
        HeaderValue::from_static("*"),
    );
    headers.insert(
        HeaderName::from_static("access-control-allow-methods"),
        HeaderValue::from_static("GET, POST, PUT, DELETE, PATCH, OPTIONS"),
    );
    headers.insert(
        HeaderName::from_static("access-control-allow-headers"),
        HeaderValue::from_static("Content-Type, Authorization"),
    );
}

pub fn cors_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    add_cors_headers(&mut headers);
    headers
}
