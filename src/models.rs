use crate::cache::CacheManager;
use crate::config::Config;
use crate::performance::PerformanceTracker;
use crate::rate_limit::{Quota, RateLimiter};
use crate::services::{AttendanceStore, MemoryAttendanceStore};
use chrono::{DateTime, NaiveDate, Utc};
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, Response, StatusCode};
use hyper::Body;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Employee,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: String,
    pub role: Role,
}

impl Principal {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Who a request is attributed to for admission control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    User(String),
    Address(String),
}

impl Identity {
    pub fn as_str(&self) -> &str {
        match self {
            Identity::User(id) | Identity::Address(id) => id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttendanceStatus {
    Present,
    CheckedOut,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub user_id: String,
    pub date: NaiveDate,
    pub check_in_time: DateTime<Utc>,
    pub check_out_time: Option<DateTime<Utc>>,
    pub check_in_location: Option<Location>,
    pub check_out_location: Option<Location>,
    pub status: AttendanceStatus,
    pub work_hours: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationRequest {
    #[serde(default)]
    pub location: Option<Location>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceQuery {
    pub user_id: Option<String>,
    pub date: Option<NaiveDate>,
    pub status: Option<AttendanceStatus>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendancePage {
    pub records: Vec<AttendanceRecord>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub date: NaiveDate,
    pub present: usize,
    pub checked_out: usize,
    pub active_users: usize,
    pub total_records: usize,
    pub geofences: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Geofence {
    pub id: Uuid,
    pub name: String,
    pub center: Location,
    pub radius_meters: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGeofence {
    pub name: String,
    pub center: Location,
    pub radius_meters: f64,
}

/// Handler outcome before it is turned into a wire response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: Value) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body,
        }
    }

    pub fn ok(body: Value) -> Self {
        Self::new(StatusCode::OK, body)
    }

    pub fn created(body: Value) -> Self {
        Self::new(StatusCode::CREATED, body)
    }

    pub fn with_header(mut self, name: &'static str, value: HeaderValue) -> Self {
        self.headers.insert(HeaderName::from_static(name), value);
        self
    }
}

impl warp::Reply for ApiResponse {
    fn into_response(self) -> warp::reply::Response {
        let mut response = Response::new(Body::from(self.body.to_string()));
        *response.status_mut() = self.status;

        let headers = response.headers_mut();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (name, value) in self.headers.iter() {
            headers.insert(name, value.clone());
        }
        response
    }
}

pub struct AppState {
    pub config: Config,
    pub cache: Mutex<CacheManager<Value>>,
    pub check_in_limiter: Mutex<RateLimiter>,
    pub check_out_limiter: Mutex<RateLimiter>,
    pub tracker: Mutex<PerformanceTracker>,
    pub store: Arc<dyn AttendanceStore>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(config: Config) -> Self {
        Self::with_store(config, Arc::new(MemoryAttendanceStore::new()))
    }

    pub fn with_store(config: Config, store: Arc<dyn AttendanceStore>) -> Self {
        let cache = CacheManager::new(config.cache.max_entries, config.default_cache_ttl());
        let check_in = &config.rate_limit.check_in;
        let check_out = &config.rate_limit.check_out;

        Self {
            cache: Mutex::new(cache),
            check_in_limiter: Mutex::new(RateLimiter::new(check_in.max_requests, check_in.window())),
            check_out_limiter: Mutex::new(RateLimiter::new(check_out.max_requests, check_out.window())),
            tracker: Mutex::new(PerformanceTracker::new(config.performance.max_samples)),
            store,
            config,
        }
    }

    pub fn limiter(&self, quota: Quota) -> &Mutex<RateLimiter> {
        match quota {
            Quota::CheckIn => &self.check_in_limiter,
            Quota::CheckOut => &self.check_out_limiter,
        }
    }
}
