//! Request ids and the admin guard.
//!
//! Admin routes spend quota before the bearer check, so repeated bad tokens
//! are throttled like any other caller.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use kdeal_core::Environment;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::api::ApiError;

pub(crate) const REQUEST_ID_HEADER: &str = "x-request-id";

/// Newtype wrapping a request ID string, stored as a request extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Who may call the admin routes.
#[derive(Debug, Clone)]
pub enum AdminGate {
    /// Development without `KDEAL_API_KEYS`: every caller is admitted.
    Open,
    /// Any of these bearer tokens.
    Bearer(Arc<[String]>),
}

impl AdminGate {
    /// Gate for the configured keys. Blank entries are ignored.
    ///
    /// # Errors
    ///
    /// Fails when no key is left outside [`Environment::Development`].
    pub fn from_keys(keys: &[String], env: &Environment) -> anyhow::Result<Self> {
        let keys: Arc<[String]> = keys
            .iter()
            .map(|key| key.trim())
            .filter(|key| !key.is_empty())
            .map(str::to_string)
            .collect();

        if !keys.is_empty() {
            return Ok(Self::Bearer(keys));
        }
        if *env == Environment::Development {
            tracing::warn!("KDEAL_API_KEYS not set; admin routes are open in development");
            return Ok(Self::Open);
        }
        anyhow::bail!("KDEAL_API_KEYS is required in {env}; provide comma-separated bearer tokens")
    }

    fn admits(&self, headers: &HeaderMap) -> bool {
        match self {
            Self::Open => true,
            Self::Bearer(keys) => bearer_token(headers).is_some_and(|token| {
                keys.iter()
                    .any(|key| bool::from(key.as_bytes().ct_eq(token.as_bytes())))
            }),
        }
    }
}

/// Token bucket shared by the admin routes: `burst` requests at once,
/// refilled evenly so that `burst` more become available per `period`.
#[derive(Debug, Clone)]
pub struct AdminQuota {
    burst: f64,
    refill_per_sec: f64,
    bucket: Arc<Mutex<Bucket>>,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    refilled_at: Instant,
}

impl AdminQuota {
    #[must_use]
    pub fn new(burst: u32, period: Duration) -> Self {
        let burst = f64::from(burst.max(1));
        Self {
            burst,
            refill_per_sec: burst / period.as_secs_f64().max(1e-3),
            bucket: Arc::new(Mutex::new(Bucket {
                tokens: burst,
                refilled_at: Instant::now(),
            })),
        }
    }

    fn try_acquire(&self, now: Instant) -> bool {
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        let elapsed = now.saturating_duration_since(bucket.refilled_at);
        if !elapsed.is_zero() {
            bucket.tokens = self
                .burst
                .min(bucket.tokens + elapsed.as_secs_f64() * self.refill_per_sec);
            bucket.refilled_at = now;
        }
        if bucket.tokens < 1.0 {
            return false;
        }
        bucket.tokens -= 1.0;
        true
    }
}

/// State for [`guard_admin`].
#[derive(Debug, Clone)]
pub struct AdminGuard {
    pub gate: AdminGate,
    pub quota: AdminQuota,
}

/// Takes the caller's `x-request-id` or mints a UUID, exposes it as a
/// [`RequestId`] extension and echoes it on the response.
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map_or_else(|| Uuid::new_v4().to_string(), str::to_string);
    let echo = HeaderValue::from_str(&id).ok();
    req.extensions_mut().insert(RequestId(id));

    let mut response = next.run(req).await;
    if let Some(value) = echo {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

pub async fn guard_admin(State(guard): State<AdminGuard>, req: Request, next: Next) -> Response {
    let request_id = || {
        req.extensions()
            .get::<RequestId>()
            .map(|id| id.0.clone())
            .unwrap_or_default()
    };

    if !guard.quota.try_acquire(Instant::now()) {
        return ApiError::new(request_id(), "rate_limited", "rate limit exceeded").into_response();
    }
    if !guard.gate.admits(req.headers()) {
        return ApiError::new(request_id(), "unauthorized", "missing or invalid bearer token")
            .into_response();
    }
    next.run(req).await
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let (scheme, token) = headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
