//! Warp filter tree.

use crate::handlers::{self, handle_rejection};
use crate::middleware::{
    cached, cors_headers, invalidating, rate_limited, timed, with_context, with_state, CachePolicy,
    Namespace, RequestContext,
};
use crate::models::{ApiResponse, AttendanceQuery, LocationRequest, NewGeofence, SharedState};
use crate::rate_limit::Quota;
use serde::de::DeserializeOwned;
use std::convert::Infallible;
use tracing::info;
use warp::{Filter, Rejection, Reply};

const MAX_BODY_BYTES: u64 = 16 * 1024;

const ATTENDANCE_WRITES: &[Namespace] = &[Namespace::Attendance, Namespace::Dashboard];
const GEOFENCE_WRITES: &[Namespace] = &[Namespace::Geofence, Namespace::Dashboard];

fn json_body<T: DeserializeOwned + Send>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

pub fn routes(state: SharedState) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let health_check = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| "OK");

    let check_in = warp::path!("api" / "attendance" / "check-in")
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(with_context(state.clone()))
        .and(json_body::<LocationRequest>())
        .and_then(check_in_route);

    let check_out = warp::path!("api" / "attendance" / "check-out")
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(with_context(state.clone()))
        .and(json_body::<LocationRequest>())
        .and_then(check_out_route);

    let list_attendance = warp::path!("api" / "attendance")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and(with_context(state.clone()))
        .and(warp::query::<AttendanceQuery>())
        .and_then(list_attendance_route);

    let today = warp::path!("api" / "attendance" / "today")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and(with_context(state.clone()))
        .and_then(today_route);

    let dashboard = warp::path!("api" / "dashboard" / "stats")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and(with_context(state.clone()))
        .and_then(dashboard_route);

    let geofences = warp::path!("api" / "geofences")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and(with_context(state.clone()))
        .and_then(geofences_route);

    let create_geofence = warp::path!("api" / "geofences")
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(with_context(state.clone()))
        .and(json_body::<NewGeofence>())
        .and_then(create_geofence_route);

    let metrics = warp::path!("api" / "performance" / "metrics")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and(with_context(state.clone()))
        .and_then(metrics_route);

    let reset = warp::path!("api" / "performance" / "reset")
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(with_context(state))
        .and_then(reset_route);

    let api = check_in
        .or(check_out)
        .or(list_attendance)
        .or(today)
        .or(dashboard)
        .or(geofences)
        .or(create_geofence)
        .or(metrics)
        .or(reset);

    let access_log = warp::log::custom(|info| {
        info!(
            method = %info.method(),
            path = info.path(),
            status = info.status().as_u16(),
            elapsed_ms = info.elapsed().as_millis() as u64,
            "request"
        );
    });

    health_check
        .or(api)
        .recover(handle_rejection)
        .with(warp::reply::with::headers(cors_headers()))
        .with(access_log)
}

async fn check_in_route(
    state: SharedState,
    ctx: RequestContext,
    body: LocationRequest,
) -> Result<ApiResponse, Rejection> {
    ctx.require_principal().map_err(warp::reject::custom)?;
    rate_limited(&state, &ctx, Quota::CheckIn, || {
        timed(&state, &ctx, || {
            invalidating(&state, ATTENDANCE_WRITES, || handlers::check_in(&state, &ctx, body))
        })
    })
    .await
    .map_err(warp::reject::custom)
}

async fn check_out_route(
    state: SharedState,
    ctx: RequestContext,
    body: LocationRequest,
) -> Result<ApiResponse, Rejection> {
    ctx.require_principal().map_err(warp::reject::custom)?;
    rate_limited(&state, &ctx, Quota::CheckOut, || {
        timed(&state, &ctx, || {
            invalidating(&state, ATTENDANCE_WRITES, || handlers::check_out(&state, &ctx, body))
        })
    })
    .await
    .map_err(warp::reject::custom)
}

async fn list_attendance_route(
    state: SharedState,
    ctx: RequestContext,
    query: AttendanceQuery,
) -> Result<ApiResponse, Rejection> {
    ctx.require_principal().map_err(warp::reject::custom)?;
    let policy = CachePolicy::per_user(Namespace::Attendance);
    cached(&state, &ctx, policy, || {
        timed(&state, &ctx, || handlers::list_attendance(&state, &ctx, query))
    })
    .await
    .map_err(warp::reject::custom)
}

async fn today_route(state: SharedState, ctx: RequestContext) -> Result<ApiResponse, Rejection> {
    ctx.require_principal().map_err(warp::reject::custom)?;
    let policy = CachePolicy::per_user(Namespace::Attendance);
    cached(&state, &ctx, policy, || {
        timed(&state, &ctx, || handlers::today_attendance(&state, &ctx))
    })
    .await
    .map_err(warp::reject::custom)
}

async fn dashboard_route(state: SharedState, ctx: RequestContext) -> Result<ApiResponse, Rejection> {
    ctx.require_principal().map_err(warp::reject::custom)?;
    let policy = CachePolicy::shared(Namespace::Dashboard);
    cached(&state, &ctx, policy, || {
        timed(&state, &ctx, || handlers::dashboard_stats(&state, &ctx))
    })
    .await
    .map_err(warp::reject::custom)
}

async fn geofences_route(state: SharedState, ctx: RequestContext) -> Result<ApiResponse, Rejection> {
    ctx.require_principal().map_err(warp::reject::custom)?;
    let policy = CachePolicy::shared(Namespace::Geofence);
    cached(&state, &ctx, policy, || {
        timed(&state, &ctx, || handlers::list_geofences(&state, &ctx))
    })
    .await
    .map_err(warp::reject::custom)
}

async fn create_geofence_route(
    state: SharedState,
    ctx: RequestContext,
    body: NewGeofence,
) -> Result<ApiResponse, Rejection> {
    timed(&state, &ctx, || {
        invalidating(&state, GEOFENCE_WRITES, || handlers::create_geofence(&state, &ctx, body))
    })
    .await
    .map_err(warp::reject::custom)
}

async fn metrics_route(state: SharedState, ctx: RequestContext) -> Result<ApiResponse, Rejection> {
    timed(&state, &ctx, || handlers::metrics(&state, &ctx))
        .await
        .map_err(warp::reject::custom)
}

async fn reset_route(state: SharedState, ctx: RequestContext) -> Result<ApiResponse, Rejection> {
    handlers::reset(&state, &ctx).await.map_err(warp::reject::custom)
}
