#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::errors::GatewayError;
    use crate::middleware::{
        add_cors_headers, authenticate, cache_key, cached, client_addr, invalidating, rate_limited,
        timed, CachePolicy, HandlerResult, Namespace, RequestContext,
    };
    use crate::models::{ApiResponse, AppState, Identity, Principal, Role};
    use crate::rate_limit::Quota;
    use http::header::AUTHORIZATION;
    use http::{HeaderMap, Method, StatusCode};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn state_with_limit(max_requests: usize) -> AppState {
        let mut config = Config::default();
        config.rate_limit.check_in.max_requests = max_requests;
        config.rate_limit.check_out.max_requests = max_requests;
        AppState::new(config)
    }

    fn employee_get(path: &str, query: &str, user: &str) -> RequestContext {
        RequestContext::new(Method::GET, path, query).with_principal(Principal::new(user, Role::Employee))
    }

    async fn ok_handler(calls: &AtomicUsize) -> HandlerResult {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(ApiResponse::ok(json!({ "success": true })))
    }

    #[test]
    fn test_add_cors_headers() {
        let mut headers = HeaderMap::new();
        add_cors_headers(&mut headers);

        assert_eq!(headers.get("access-control-allow-origin").unwrap(), "*");
        assert_eq!(
            headers.get("access-control-allow-methods").unwrap(),
            "GET, POST, PUT, DELETE, PATCH, OPTIONS"
        );
        assert_eq!(
            headers.get("access-control-allow-headers").unwrap(),
            "Content-Type, Authorization"
        );
    }

    #[test]
    fn test_authentication() {
        let config = Config::default();
        let mut headers = HeaderMap::new();
        assert!(authenticate(&headers, &config.auth).is_none());

        headers.insert(AUTHORIZATION, "Invalid".parse().unwrap());
        assert!(authenticate(&headers, &config.auth).is_none());

        headers.insert(AUTHORIZATION, "Bearer invalid-token".parse().unwrap());
        assert!(authenticate(&headers, &config.auth).is_none());

        headers.insert(AUTHORIZATION, "Bearer example-token".parse().unwrap());
        let principal = authenticate(&headers, &config.auth).unwrap();
        assert_eq!(principal.user_id, "example-user");
        assert_eq!(principal.role, Role::Employee);
    }

    #[test]
    fn test_client_addr_prefers_forwarded_for() {
        let remote = Some("192.168.1.7:5555".parse().unwrap());
        let mut headers = HeaderMap::new();
        assert_eq!(client_addr(&headers, remote), Some("192.168.1.7".to_string()));
        assert_eq!(client_addr(&headers, None), None);

        headers.insert("x-forwarded-for", "10.0.0.1, 172.16.0.1".parse().unwrap());
        assert_eq!(client_addr(&headers, remote), Some("10.0.0.1".to_string()));
    }

    #[test]
    fn test_identity_falls_back_to_address() {
        let anonymous = RequestContext::new(Method::POST, "/api/attendance/check-in", "");
        assert_eq!(anonymous.identity(), Identity::Address("unknown".to_string()));

        let addressed = anonymous.clone().with_client_addr("10.0.0.1");
        assert_eq!(addressed.identity(), Identity::Address("10.0.0.1".to_string()));

        let user = addressed.with_principal(Principal::new("u1", Role::Employee));
        assert_eq!(user.identity(), Identity::User("u1".to_string()));
    }

    #[test]
    fn test_admin_guard() {
        let ctx = RequestContext::new(Method::GET, "/api/performance/metrics", "");
        assert!(matches!(ctx.require_admin(), Err(GatewayError::Unauthorized)));

        let employee = ctx.clone().with_principal(Principal::new("u1", Role::Employee));
        assert!(matches!(employee.require_admin(), Err(GatewayError::Forbidden)));

        let admin = ctx.with_principal(Principal::new("boss", Role::Admin));
        assert!(admin.require_admin().is_ok());
    }

    #[test]
    fn test_cache_key_scoping() {
        let a = employee_get("/api/attendance/today", "", "u1");
        let b = employee_get("/api/attendance/today", "", "u2");

        let shared = CachePolicy::shared(Namespace::Attendance);
        let per_user = CachePolicy::per_user(Namespace::Attendance);

        assert_eq!(cache_key(&a, shared).unwrap(), cache_key(&b, shared).unwrap());
        assert_ne!(cache_key(&a, per_user).unwrap(), cache_key(&b, per_user).unwrap());
        assert!(cache_key(&a, per_user).unwrap().starts_with("attendance:"));
    }

    #[tokio::test]
    async fn test_rate_limited_sets_headers_and_rejects() {
        let state = state_with_limit(2);
        let ctx = RequestContext::new(Method::POST, "/api/attendance/check-in", "")
            .with_principal(Principal::new("u1", Role::Employee));
        let calls = AtomicUsize::new(0);

        let first = rate_limited(&state, &ctx, Quota::CheckIn, || ok_handler(&calls)).await.unwrap();
        assert_eq!(first.headers.get("x-ratelimit-limit").unwrap(), "2");
        assert_eq!(first.headers.get("x-ratelimit-remaining").unwrap(), "1");

        rate_limited(&state, &ctx, Quota::CheckIn, || ok_handler(&calls)).await.unwrap();

        let third = rate_limited(&state, &ctx, Quota::CheckIn, || ok_handler(&calls)).await;
        match third {
            Err(GatewayError::RateLimitExceeded {
                quota,
                limit,
                retry_after_secs,
            }) => {
                assert_eq!(quota, Quota::CheckIn);
                assert_eq!(limit, 2);
                assert!(retry_after_secs > 0 && retry_after_secs <= 60);
            }
            other => panic!("expected rate limit rejection, got {:?}", other),
        }
        // the handler never ran for the rejected attempt
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // the other quota is untouched
        assert!(rate_limited(&state, &ctx, Quota::CheckOut, || ok_handler(&calls)).await.is_ok());
    }

    #[tokio::test]
    async fn test_rate_limited_reports_quota_on_handler_failure() {
        let state = state_with_limit(5);
        let ctx = RequestContext::new(Method::POST, "/api/attendance/check-in", "")
            .with_principal(Principal::new("u1", Role::Employee));

        let response = rate_limited(&state, &ctx, Quota::CheckIn, || async {
            Err::<ApiResponse, _>(GatewayError::Conflict("Already checked in today".to_string()))
        })
        .await
        .unwrap();

        assert_eq!(response.status, StatusCode::CONFLICT);
        assert_eq!(response.body["message"], "Already checked in today");
        assert_eq!(response.headers.get("x-ratelimit-limit").unwrap(), "5");
        assert_eq!(response.headers.get("x-ratelimit-remaining").unwrap(), "4");
    }

    #[tokio::test]
    async fn test_cached_miss_then_hit() {
        let state = AppState::new(Config::default());
        let ctx = employee_get("/api/dashboard/stats", "", "u1");
        let policy = CachePolicy::shared(Namespace::Dashboard);
        let calls = AtomicUsize::new(0);

        let miss = cached(&state, &ctx, policy, || ok_handler(&calls)).await.unwrap();
        assert_eq!(miss.headers.get("x-cache").unwrap(), "MISS");

        let hit = cached(&state, &ctx, policy, || ok_handler(&calls)).await.unwrap();
        assert_eq!(hit.headers.get("x-cache").unwrap(), "HIT");
        assert_eq!(hit.body, json!({ "success": true }));
        assert_eq!(hit.status, StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cached_skips_failures_and_writes() {
        let state = AppState::new(Config::default());
        let policy = CachePolicy::shared(Namespace::Geofence);

        let get = employee_get("/api/geofences", "", "u1");
        let failed = cached(&state, &get, policy, || async {
            Ok::<_, GatewayError>(ApiResponse::new(StatusCode::NOT_FOUND, json!({ "success": false })))
        })
        .await
        .unwrap();
        assert!(failed.headers.get("x-cache").is_none());
        assert!(state.cache.lock().await.is_empty());

        let post = RequestContext::new(Method::POST, "/api/geofences", "");
        let calls = AtomicUsize::new(0);
        cached(&state, &post, policy, || ok_handler(&calls)).await.unwrap();
        cached(&state, &post, policy, || ok_handler(&calls)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(state.cache.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_invalidating_only_after_success() {
        let state = AppState::new(Config::default());
        {
            let mut cache = state.cache.lock().await;
            cache.set("attendance:path=/api/attendance:query=", json!(1));
            cache.set("geofence:path=/api/geofences:query=", json!(2));
        }

        let failed = invalidating(&state, &[Namespace::Attendance], || async {
            Err::<ApiResponse, _>(GatewayError::Conflict("Already checked in today".to_string()))
        })
        .await;
        assert!(failed.is_err());
        assert_eq!(state.cache.lock().await.len(), 2);

        let calls = AtomicUsize::new(0);
        invalidating(&state, &[Namespace::Attendance], || ok_handler(&calls))
            .await
            .unwrap();

        let mut cache = state.cache.lock().await;
        assert!(!cache.has("attendance:path=/api/attendance:query="));
        assert_eq!(cache.get("geofence:path=/api/geofences:query="), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_timed_records_samples_even_on_error() {
        let state = AppState::new(Config::default());
        let ctx = employee_get("/api/attendance", "page=1", "u1");
        let calls = AtomicUsize::new(0);

        let response = timed(&state, &ctx, || ok_handler(&calls)).await.unwrap();
        let header = response.headers.get("x-response-time").unwrap().to_str().unwrap();
        assert!(header.ends_with("ms"));

        let failed = timed(&state, &ctx, || async {
            Err::<ApiResponse, _>(GatewayError::Unauthorized)
        })
        .await
        .unwrap();
        assert_eq!(failed.status, StatusCode::UNAUTHORIZED);
        assert!(failed.headers.get("x-response-time").is_some());

        let stats = state.tracker.lock().await.stats("GET /api/attendance").unwrap();
        assert_eq!(stats.count, 2);
    }
}
