//! Attendance persistence.
//!
//! The service talks to storage through [`AttendanceStore`]; the in-memory
//! implementation backs the default binary and the tests.

use crate::errors::GatewayError;
use crate::models::{
    AttendancePage, AttendanceQuery, AttendanceRecord, AttendanceStatus, DashboardSummary,
    Geofence, Location, NewGeofence,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashSet;
use tokio::sync::RwLock;
use uuid::Uuid;


pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

#[async_trait]
pub trait AttendanceStore: Send + Sync {
    async fn check_in(
        &self,
        user_id: &str,
        location: Option<Location>,
        at: DateTime<Utc>,
    ) -> Result<AttendanceRecord, GatewayError>;

    async fn check_out(
        &self,
        user_id: &str,
        location: Option<Location>,
        at: DateTime<Utc>,
    ) -> Result<AttendanceRecord, GatewayError>;

    async fn list(&self, query: &AttendanceQuery) -> Result<AttendancePage, GatewayError>;

    async fn today(&self, user_id: &str, date: NaiveDate) -> Result<Option<AttendanceRecord>, GatewayError>;

    async fn dashboard_summary(&self, date: NaiveDate) -> Result<DashboardSummary, GatewayError>;

    async fn list_geofences(&self) -> Result<Vec<Geofence>, GatewayError>;

    async fn create_geofence(&self, geofence: NewGeofence) -> Result<Geofence, GatewayError>;
}

#[derive(Default)]
struct Inner {
    records: Vec<AttendanceRecord>,
    geofences: Vec<Geofence>,
}

#[derive(Default)]
pub struct MemoryAttendanceStore {
    inner: RwLock<Inner>,
}

impl MemoryAttendanceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AttendanceStore for MemoryAttendanceStore {
    async fn check_in(
        &self,
        user_id: &str,
        location: Option<Location>,
        at: DateTime<Utc>,
    ) -> Result<AttendanceRecord, GatewayError> {
        let mut inner = self.inner.write().await;
        let date = at.date_naive();

        if let Some(existing) = inner
            .records
            .iter()
            .find(|r| r.user_id == user_id && r.date == date)
        {
            let message = match existing.status {
                AttendanceStatus::Present => "Already checked in today",
                AttendanceStatus::CheckedOut => "Attendance already completed for today",
            };
            return Err(GatewayError::Conflict(message.to_string()));
        }

        let record = AttendanceRecord {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            date,
            check_in_time: at,
            check_out_time: None,
            check_in_location: location,
            check_out_location: None,
            status: AttendanceStatus::Present,
            work_hours: None,
        };
        inner.records.push(record.clone());
        Ok(record)
    }

    async fn check_out(
        &self,
        user_id: &str,
        location: Option<Location>,
        at: DateTime<Utc>,
    ) -> Result<AttendanceRecord, GatewayError> {
        let mut inner = self.inner.write().await;
        let date = at.date_naive();

        let record = inner
            .records
            .iter_mut()
            .find(|r| r.user_id == user_id && r.date == date && r.status == AttendanceStatus::Present)
            .ok_or_else(|| GatewayError::NotFound("No active check-in found for today".to_string()))?;

        let worked = at - record.check_in_time;
        record.check_out_time = Some(at);
        record.check_out_location = location;
        record.status = AttendanceStatus::CheckedOut;
        record.work_hours = Some(worked.num_seconds().max(0) as f64 / 3600.0);
        Ok(record.clone())
    }

    async fn list(&self, query: &AttendanceQuery) -> Result<AttendancePage, GatewayError> {
        let inner = self.inner.read().await;
        let page = query.page.unwrap_or(1).max(1);
        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

        let mut matching: Vec<&AttendanceRecord> = inner
            .records
            .iter()
            .filter(|r| query.user_id.as_deref().is_none_or(|id| r.user_id == id))
            .filter(|r| query.date.is_none_or(|d| r.date == d))
            .filter(|r| query.status.is_none_or(|s| r.status == s))
            .collect();
        matching.sort_by(|a, b| b.check_in_time.cmp(&a.check_in_time));

        // Pages past the end, however far, come back empty.
        let offset = (page - 1).saturating_mul(limit);
        let total = matching.len();
        let records = matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();

        Ok(AttendancePage {
            records,
            total,
            page,
            limit,
        })
    }

    async fn today(&self, user_id: &str, date: NaiveDate) -> Result<Option<AttendanceRecord>, GatewayError> {
        let inner = self.inner.read().await;
        Ok(inner
            .records
            .iter()
            .find(|r| r.user_id == user_id && r.date == date)
            .cloned())
    }

    async fn dashboard_summary(&self, date: NaiveDate) -> Result<DashboardSummary, GatewayError> {
        let inner = self.inner.read().await;
        let todays: Vec<&AttendanceRecord> = inner.records.iter().filter(|r| r.date == date).collect();

        Ok(DashboardSummary {
            date,
            present: todays.iter().filter(|r| r.status == AttendanceStatus::Present).count(),
            checked_out: todays
                .iter()
                .filter(|r| r.status == AttendanceStatus::CheckedOut)
                .count(),
            active_users: todays.iter().map(|r| r.user_id.as_str()).collect::<HashSet<_>>().len(),
            total_records: inner.records.len(),
            geofences: inner.geofences.len(),
        })
    }

    async fn list_geofences(&self) -> Result<Vec<Geofence>, GatewayError> {
        Ok(self.inner.read().await.geofences.clone())
    }

    async fn create_geofence(&self, geofence: NewGeofence) -> Result<Geofence, GatewayError> {
        let name = geofence.name.trim();
        if name.is_empty() {
            return Err(GatewayError::BadRequest("Geofence name is required".to_string()));
        }
        if !(geofence.radius_meters.is_finite() && geofence.radius_meters > 0.0) {
            return Err(GatewayError::BadRequest("Geofence radius must be positive".to_string()));
        }
        let Location { latitude, longitude } = geofence.center;
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(GatewayError::BadRequest("Geofence center is out of range".to_string()));
        }

        let mut inner = self.inner.write().await;
        if inner.geofences.iter().any(|g| g.name == name) {
            return Err(GatewayError::Conflict(format!("Geofence '{}' already exists", name)));
        }

        let created = Geofence {
            id: Uuid::new_v4(),
            name: name.to_string(),
            center: geofence.center,
            radius_meters: geofence.radius_meters,
            created_at: Utc::now(),
        };
        inner.geofences.push(created.clone());
        Ok(created)
    }
}
