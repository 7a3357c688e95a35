use crate::errors::GatewayError;
use crate::middleware::{add_rate_limit_headers, HandlerResult, RequestContext};
use crate::models::{ApiResponse, AppState, AttendanceQuery, LocationRequest, NewGeofence};
use chrono::Utc;
use http::header::{HeaderValue, RETRY_AFTER};
use http::StatusCode;
use serde_json::json;
use std::convert::Infallible;
use tracing::{error, info};


pub async fn check_in(state: &AppState, ctx: &RequestContext, request: LocationRequest) -> HandlerResult {
    let principal = ctx.require_principal()?;
    let record = state
        .store
        .check_in(&principal.user_id, request.location, Utc::now())
        .await?;

    info!(user_id = %principal.user_id, "Checked in");
    Ok(ApiResponse::created(json!({
        "success": true,
        "message": "Checked in successfully",
        "data": record,
    })))
}

pub async fn check_out(state: &AppState, ctx: &RequestContext, request: LocationRequest) -> HandlerResult {
    let principal = ctx.require_principal()?;
    let record = state
        .store
        .check_out(&principal.user_id, request.location, Utc::now())
        .await?;

    info!(user_id = %principal.user_id, "Checked out");
    Ok(ApiResponse::ok(json!({
        "success": true,
        "message": "Checked out successfully",
        "data": record,
    })))
}

/// Employees only ever see their own records.
pub async fn list_attendance(state: &AppState, ctx: &RequestContext, mut query: AttendanceQuery) -> HandlerResult {
    let principal = ctx.require_principal()?;
    if !principal.is_admin() {
        query.user_id = Some(principal.user_id.clone());
    }

    let page = state.store.list(&query).await?;
    Ok(ApiResponse::ok(json!({ "success": true, "data": page })))
}

pub async fn today_attendance(state: &AppState, ctx: &RequestContext) -> HandlerResult {
    let principal = ctx.require_principal()?;
    let record = state
        .store
        .today(&principal.user_id, Utc::now().date_naive())
        .await?;

    Ok(ApiResponse::ok(json!({
        "success": true,
        "checkedIn": record.is_some(),
        "data": record,
    })))
}

pub async fn dashboard_stats(state: &AppState, ctx: &RequestContext) -> HandlerResult {
    ctx.require_principal()?;
    let summary = state.store.dashboard_summary(Utc::now().date_naive()).await?;
    Ok(ApiResponse::ok(json!({ "success": true, "data": summary })))
}

pub async fn list_geofences(state: &AppState, ctx: &RequestContext) -> HandlerResult {
    ctx.require_principal()?;
    let geofences = state.store.list_geofences().await?;
    Ok(ApiResponse::ok(json!({
        "success": true,
        "count": geofences.len(),
        "data": geofences,
    })))
}

pub async fn create_geofence(state: &AppState, ctx: &RequestContext, geofence: NewGeofence) -> HandlerResult {
    ctx.require_admin()?;
    let created = state.store.create_geofence(geofence).await?;
    Ok(ApiResponse::created(json!({ "success": true, "data": created })))
}

pub async fn metrics(state: &AppState, ctx: &RequestContext) -> HandlerResult {
    ctx.require_admin()?;

    let cache = state.cache.lock().await.stats();
    let check_in_limiter = state.check_in_limiter.lock().await.stats();
    let check_out_limiter = state.check_out_limiter.lock().await.stats();
    let performance = state.tracker.lock().await.all_stats();

    Ok(ApiResponse::ok(json!({
        "success": true,
        "data": {
            "cache": cache,
            "checkInLimiter": check_in_limiter,
            "checkOutLimiter": check_out_limiter,
            "performance": performance,
            "timestamp": Utc::now().to_rfc3339(),
        },
    })))
}

/// Wipes cache, limiter and latency state. Refused in production.
pub async fn reset(state: &AppState, ctx: &RequestContext) -> HandlerResult {
    let principal = ctx.require_admin()?;
    if state.config.environment.is_production() {
        return Err(GatewayError::ResetForbidden);
    }

    state.cache.lock().await.clear();
    state.check_in_limiter.lock().await.clear();
    state.check_out_limiter.lock().await.clear();
    state.tracker.lock().await.clear();

    info!(user_id = %principal.user_id, environment = %state.config.environment, "Performance state reset");
    Ok(ApiResponse::ok(json!({
        "success": true,
        "message": "Performance metrics and cache reset",
    })))
}

fn error_response(status: StatusCode, message: &str) -> ApiResponse {
    ApiResponse::new(status, json!({ "success": false, "message": message }))
}

pub fn gateway_error_response(err: &GatewayError) -> ApiResponse {
    match err {
        GatewayError::RateLimitExceeded {
            limit,
            retry_after_secs,
            ..
        } => {
            let mut response = ApiResponse::new(
                err.status_code(),
                json!({
                    "success": false,
                    "message": err.to_string(),
                    "retryAfter": retry_after_secs,
                }),
            );
            response.headers.insert(RETRY_AFTER, HeaderValue::from(*retry_after_secs));
            add_rate_limit_headers(&mut response.headers, *limit, 0);
            response
        }
        GatewayError::InvalidCacheKey(_) | GatewayError::Internal(_) => {
            error!(error = %err, "Request failed");
            error_response(err.status_code(), "Internal server error")
        }
        _ => error_response(err.status_code(), &err.to_string()),
    }
}

pub async fn handle_rejection(err: warp::Rejection) -> Result<ApiResponse, Infallible> {
    let response = if err.is_not_found() {
        error_response(StatusCode::NOT_FOUND, "Not Found")
    } else if let Some(e) = err.find::<GatewayError>() {
        gateway_error_response(e)
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        error_response(StatusCode::BAD_REQUEST, &e.to_string())
    } else if err.find::<warp::reject::InvalidQuery>().is_some() {
        error_response(StatusCode::BAD_REQUEST, "Invalid query string")
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        error_response(StatusCode::PAYLOAD_TOO_LARGE, "Payload too large")
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        error_response(StatusCode::UNSUPPORTED_MEDIA_TYPE, "Unsupported media type")
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        error_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
    } else {
        error!(rejection = ?err, "Unhandled rejection");
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    };

    Ok(response)
}
