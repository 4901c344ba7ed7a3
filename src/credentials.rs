// Copyright (c) 2025 - Cowboy AI, Inc.
//! Credential Fetch Contract
//!
//! Boundary toward the managed secret store. The deployed compute service
//! consumes this to reach its data store; the core never reads secrets
//! itself. Fetches are retryable with caller-controlled backoff - the
//! policy is explicit data, never an implicit loop, so tests can inject
//! failure/success sequences deterministically. Failures are never
//! cached.

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Credential fetch error
///
/// Both variants are retryable from the caller's point of view; a secret
/// that exists but is missing fields may be mid-rotation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialsError {
    /// The secret could not be fetched or its payload was unusable
    #[error("secret unavailable: {0}")]
    SecretUnavailable(String),

    /// The payload parsed but lacked a required field
    #[error("incomplete database credentials: missing {0}")]
    IncompleteCredentials(&'static str),
}

/// Reference to a stored secret
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretRef(String);

impl SecretRef {
    /// Create a secret reference
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    /// Get the reference as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SecretRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SecretRef {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Connection credentials for a data store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbCredentials {
    pub host: String,
    pub username: String,
    pub password: String,
    pub database: String,
    pub port: u16,
}

impl DbCredentials {
    /// Parse and validate a secret payload
    ///
    /// The payload is a JSON object; every field must be present and
    /// non-empty or the result is `IncompleteCredentials` naming the first
    /// missing field. Callers must not proceed to pool creation on error.
    pub fn from_secret_string(raw: &str) -> Result<Self, CredentialsError> {
        if raw.trim().is_empty() {
            return Err(CredentialsError::SecretUnavailable(
                "secret payload is empty".to_string(),
            ));
        }

        let payload: Value = serde_json::from_str(raw)
            .map_err(|e| CredentialsError::SecretUnavailable(e.to_string()))?;

        let text = |field: &'static str| {
            payload
                .get(field)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .ok_or(CredentialsError::IncompleteCredentials(field))
        };

        let port = match payload.get("port") {
            Some(Value::Number(n)) => n
                .as_u64()
                .and_then(|p| u16::try_from(p).ok())
                .ok_or(CredentialsError::IncompleteCredentials("port"))?,
            Some(Value::String(s)) => s
                .parse::<u16>()
                .map_err(|_| CredentialsError::IncompleteCredentials("port"))?,
            _ => return Err(CredentialsError::IncompleteCredentials("port")),
        };

        Ok(Self {
            host: text("host")?,
            username: text("username")?,
            password: text("password")?,
            database: text("dbname")?,
            port,
        })
    }
}

/// Boundary contract toward the secret store
#[async_trait]
pub trait SecretsProvider: Send + Sync {
    /// Fetch the raw secret payload
    async fn fetch(&self, secret: &SecretRef) -> Result<String, CredentialsError>;
}

/// Backoff policy for credential fetches
///
/// Explicit data instead of an implicit retry loop: max attempts, delay
/// schedule, and jitter are all caller-controlled.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,

    /// Delay before the second attempt
    pub initial_delay: Duration,

    /// Cap for the exponential growth
    pub max_delay: Duration,

    /// Growth factor between attempts
    pub multiplier: f64,

    /// Jitter fraction (0.0 - 1.0) added to each delay
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: 0.25,
        }
    }
}

impl BackoffPolicy {
    /// Override the attempt budget
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Disable jitter (deterministic tests)
    pub fn without_jitter(mut self) -> Self {
        self.jitter = 0.0;
        self
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let base = self
            .initial_delay
            .as_secs_f64()
            * self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let capped = base.min(self.max_delay.as_secs_f64());
        let jittered = if self.jitter > 0.0 {
            capped * (1.0 + rand::thread_rng().gen_range(0.0..self.jitter))
        } else {
            capped
        };
        Duration::from_secs_f64(jittered)
    }
}

/// Fetch and validate credentials, retrying under the given policy
///
/// Every error, including an incomplete payload, is retried until the
/// attempt budget runs out; the last error is returned.
pub async fn fetch_credentials(
    provider: &dyn SecretsProvider,
    secret: &SecretRef,
    policy: &BackoffPolicy,
) -> Result<DbCredentials, CredentialsError> {
    let mut attempt = 0;

    loop {
        attempt += 1;

        match provider.fetch(secret).await {
            Ok(raw) => match DbCredentials::from_secret_string(&raw) {
                Ok(credentials) => {
                    debug!(secret = %secret, attempt, "credentials fetched");
                    return Ok(credentials);
                }
                Err(error) => {
                    if attempt >= policy.max_attempts {
                        warn!(secret = %secret, attempt, error = %error, "giving up on credentials");
                        return Err(error);
                    }
                    warn!(secret = %secret, attempt, error = %error, "unusable credential payload, retrying");
                }
            },
            Err(error) => {
                if attempt >= policy.max_attempts {
                    warn!(secret = %secret, attempt, error = %error, "giving up on credentials");
                    return Err(error);
                }
                debug!(secret = %secret, attempt, error = %error, "credential fetch failed, retrying");
            }
        }

        tokio::time::sleep(policy.delay_for(attempt)).await;
    }
}
