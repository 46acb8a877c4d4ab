//! Application state shared across handlers

use std::sync::Arc;

use sqlx::PgPool;

use crate::auth::JwtKeys;
use crate::config::AppConfig;
use crate::http::rate_limit::RateLimiter;
use crate::mail::{LogMailer, MailError, Mailer, SmtpMailer};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    pool: PgPool,
    config: AppConfig,
    keys: JwtKeys,
    mailer: Arc<dyn Mailer>,
    limiter: RateLimiter,
}

impl AppState {
    /// State with the mailer picked from the configuration.
    pub fn new(pool: PgPool, config: AppConfig) -> Result<Self, MailError> {
        let mailer: Arc<dyn Mailer> = match &config.smtp {
            Some(smtp) => Arc::new(SmtpMailer::new(smtp, &config.email_from)?),
            None => {
                tracing::warn!("EMAIL_HOST not set, outgoing mail will only be logged");
                Arc::new(LogMailer)
            }
        };
        Ok(Self::with_mailer(pool, config, mailer))
    }

    pub fn with_mailer(pool: PgPool, config: AppConfig, mailer: Arc<dyn Mailer>) -> Self {
        let keys = JwtKeys::new(
            &config.jwt_secret,
            chrono::Duration::days(config.jwt_expires_in_days),
        );
        let limiter = RateLimiter::new(config.rate_limit.clone());
        Self {
            inner: Arc::new(AppStateInner {
                pool,
                config,
                keys,
                mailer,
                limiter,
            }),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    pub fn keys(&self) -> &JwtKeys {
        &self.inner.keys
    }

    pub fn mailer(&self) -> &dyn Mailer {
        self.inner.mailer.as_ref()
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.inner.limiter
    }

    /// Cookies carry `Secure` everywhere but development.
    pub fn secure_cookies(&self) -> bool {
        !self.inner.config.environment.is_development()
    }
}
