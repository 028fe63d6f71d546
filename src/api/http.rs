//! reqwest-based client for the attendance REST API.

use super::{AttendanceBackend, CheckInRequest, CheckOutRequest, Confirmation, TokenProvider};
use crate::errors::{AppError, AppResult};
use crate::models::{AttendanceStatus, GeofenceRecord};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use log::debug;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeofencesResponse {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    geofences: Vec<GeofenceRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    status: Option<AttendanceStatus>,
}

/// Check-in / check-out reply. Some deployments nest the new status,
/// others return the interesting fields at the top level.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ActionResponse {
    #[serde(default = "default_success")]
    success: bool,
    message: Option<String>,
    status: Option<AttendanceStatus>,
    check_in_time: Option<DateTime<Local>>,
    check_out_time: Option<DateTime<Local>>,
    next_check_in_time: Option<DateTime<Local>>,
    location_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

fn default_success() -> bool {
    true
}

impl ActionResponse {
    fn into_confirmation(self, checkout: bool, manual: bool) -> Confirmation {
        if self.status.is_some() {
            return Confirmation {
                status: self.status,
            };
        }
        let any = self.check_in_time.is_some()
            || self.check_out_time.is_some()
            || self.next_check_in_time.is_some()
            || self.location_name.is_some();
        if !any {
            return Confirmation::default();
        }
        Confirmation {
            status: Some(AttendanceStatus {
                is_checked_in: !checkout,
                is_checked_out: checkout,
                is_manual_checkout: checkout && manual,
                check_in_time: self.check_in_time,
                check_out_time: self.check_out_time,
                next_check_in_time: self.next_check_in_time,
                location_name: self.location_name,
                ..AttendanceStatus::default()
            }),
        }
    }
}

pub struct HttpBackend {
    client: Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpBackend {
    pub fn new(base_url: &str, tokens: Arc<dyn TokenProvider>, timeout: Duration) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.tokens.bearer_token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send and classify: 2xx is decoded, everything else becomes the
    /// matching `AppError`.
    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> AppResult<T> {
        let response = self.authorized(builder).send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        debug!("backend replied {status} ({} bytes)", bytes.len());

        if status.is_success() {
            return serde_json::from_slice(&bytes)
                .map_err(|e| AppError::Protocol(format!("cannot decode response: {e}")));
        }

        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap_or_default();
        let message = body
            .message
            .or(body.error)
            .unwrap_or_else(|| status.to_string());

        Err(classify(status, message))
    }
}

fn classify(status: StatusCode, message: String) -> AppError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AppError::Unauthorized(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            AppError::NetworkFailure(message)
        }
        s if s.is_server_error() => AppError::NetworkFailure(format!("{s}: {message}")),
        _ => AppError::ServerConflict(message),
    }
}

fn rejected(message: Option<String>) -> AppError {
    AppError::ServerConflict(message.unwrap_or_else(|| "request rejected".into()))
}

#[async_trait]
impl AttendanceBackend for HttpBackend {
    async fn fetch_geofences(&self) -> AppResult<Vec<GeofenceRecord>> {
        let res: GeofencesResponse = self
            .send(self.client.get(self.url("/api/locations/geofences")))
            .await?;
        if !res.success {
            return Err(AppError::Protocol(
                res.message
                    .unwrap_or_else(|| "geofence listing failed".into()),
            ));
        }
        Ok(res.geofences)
    }

    async fn check_in(&self, request: &CheckInRequest) -> AppResult<Confirmation> {
        let res: ActionResponse = self
            .send(
                self.client
                    .post(self.url("/api/attendance/checkin"))
                    .json(request),
            )
            .await?;
        if !res.success {
            return Err(rejected(res.message));
        }
        Ok(res.into_confirmation(false, false))
    }

    async fn check_out(&self, request: &CheckOutRequest) -> AppResult<Confirmation> {
        let res: ActionResponse = self
            .send(
                self.client
                    .post(self.url("/api/attendance/checkout"))
                    .json(request),
            )
            .await?;
        if !res.success {
            return Err(rejected(res.message));
        }
        Ok(res.into_confirmation(true, request.manual))
    }

    async fn attendance_status(&self) -> AppResult<AttendanceStatus> {
        let res: StatusResponse = self
            .send(self.client.get(self.url("/api/attendance/status")))
            .await?;
        if !res.success {
            return Err(AppError::Protocol(
                res.message.unwrap_or_else(|| "status request failed".into()),
            ));
        }
        res.status
            .ok_or_else(|| AppError::Protocol("status missing from response".into()))
    }
}
