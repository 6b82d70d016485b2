//! Per-session sliding-window rate limiting and fixed quotas.
//!
//! One `RateLimiter` owns the usage map for every session it has seen;
//! entries are created lazily and pruned as their windows slide. All checks
//! run under a single map-level mutex; every operation is a handful of
//! comparisons, so contention is not worth sharding until profiles say so.

use crate::config::RateLimitConfig;
use crate::error::{Error, QuotaResource, RateLimitKind, Result};
use chrono::{NaiveDate, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

const MINUTE: Duration = Duration::from_secs(60);

/// Remaining headroom returned alongside a successful check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub remaining_minute: u32,
    pub remaining_hour: u32,
}

#[derive(Debug)]
struct SessionUsage {
    tool_calls: VecDeque<Instant>,
    cron_count: u32,
    webhook_count: u32,
    daily_spend_usd: f64,
    last_reset_date: NaiveDate,
    concurrent_executions: u32,
}

impl SessionUsage {
    fn new(today: NaiveDate) -> Self {
        SessionUsage {
            tool_calls: VecDeque::new(),
            cron_count: 0,
            webhook_count: 0,
            daily_spend_usd: 0.0,
            last_reset_date: today,
            concurrent_executions: 0,
        }
    }

    fn reset_daily_if_stale(&mut self, today: NaiveDate) {
        if self.last_reset_date != today {
            self.daily_spend_usd = 0.0;
            self.last_reset_date = today;
        }
    }

    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(front) = self.tool_calls.front() {
            if now.duration_since(*front) >= window {
                self.tool_calls.pop_front();
            } else {
                break;
            }
        }
    }

    fn calls_within(&self, now: Instant, window: Duration) -> u32 {
        self.tool_calls
            .iter()
            .filter(|t| now.duration_since(**t) < window)
            .count() as u32
    }

    /// Milliseconds until the oldest call inside `window` slides out.
    fn retry_after_ms(&self, now: Instant, window: Duration) -> u64 {
        self.tool_calls
            .iter()
            .find(|t| now.duration_since(**t) < window)
            .map(|t| (window - now.duration_since(*t)).as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Sliding-window rate limiter with per-session state.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    sessions: Mutex<HashMap<String, SessionUsage>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        RateLimiter::new(RateLimitConfig::default())
    }
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        RateLimiter {
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn hour_window(&self) -> Duration {
        Duration::from_millis(self.config.window_size_ms)
    }

    fn with_session<T>(&self, session_id: &str, f: impl FnOnce(&mut SessionUsage) -> T) -> T {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let usage = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionUsage::new(Utc::now().date_naive()));
        f(usage)
    }

    /// Check and record one tool call. The call is only recorded when both
    /// windows have headroom, so a rejected call does not consume budget.
    pub fn check_tool_call(&self, session_id: &str) -> Result<RateLimitStatus> {
        let window = self.hour_window();
        let minute_limit = self.config.max_tool_calls_per_minute;
        let hour_limit = self.config.max_tool_calls_per_hour;

        self.with_session(session_id, |usage| {
            let now = Instant::now();
            usage.prune(now, window);

            let minute_count = usage.calls_within(now, MINUTE);
            if minute_count >= minute_limit {
                return Err(Error::RateLimitExceeded {
                    kind: RateLimitKind::Minute,
                    limit: minute_limit,
                    current: minute_count,
                    retry_after_ms: usage.retry_after_ms(now, MINUTE),
                });
            }

            let hour_count = usage.tool_calls.len() as u32;
            if hour_count >= hour_limit {
                return Err(Error::RateLimitExceeded {
                    kind: RateLimitKind::Hourly,
                    limit: hour_limit,
                    current: hour_count,
                    retry_after_ms: usage.retry_after_ms(now, window),
                });
            }

            usage.tool_calls.push_back(now);
            Ok(RateLimitStatus {
                remaining_minute: minute_limit - minute_count - 1,
                remaining_hour: hour_limit - hour_count - 1,
            })
        })
    }

    /// Reserve one concurrent execution slot.
    pub fn begin_execution(&self, session_id: &str) -> Result<()> {
        let limit = self.config.max_concurrent_executions;
        self.with_session(session_id, |usage| {
            if usage.concurrent_executions >= limit {
                return Err(Error::RateLimitExceeded {
                    kind: RateLimitKind::Concurrent,
                    limit,
                    current: usage.concurrent_executions,
                    retry_after_ms: 0,
                });
            }
            usage.concurrent_executions += 1;
            Ok(())
        })
    }

    /// Release an execution slot taken by [`begin_execution`].
    pub fn end_execution(&self, session_id: &str) {
        self.with_session(session_id, |usage| {
            usage.concurrent_executions = usage.concurrent_executions.saturating_sub(1);
        });
    }

    /// Claim one cron-job slot for the session.
    pub fn reserve_cron_job(&self, session_id: &str) -> Result<u32> {
        let limit = self.config.max_cron_jobs_per_session;
        self.with_session(session_id, |usage| {
            if usage.cron_count >= limit {
                return Err(Error::QuotaExceeded {
                    resource: QuotaResource::Cron,
                    limit: limit as f64,
                    current: usage.cron_count as f64,
                });
            }
            usage.cron_count += 1;
            Ok(limit - usage.cron_count)
        })
    }

    pub fn release_cron_job(&self, session_id: &str) {
        self.with_session(session_id, |usage| {
            usage.cron_count = usage.cron_count.saturating_sub(1);
        });
    }

    /// Claim one webhook registration slot for the session.
    pub fn reserve_webhook(&self, session_id: &str) -> Result<u32> {
        let limit = self.config.max_webhooks_per_session;
        self.with_session(session_id, |usage| {
            if usage.webhook_count >= limit {
                return Err(Error::QuotaExceeded {
                    resource: QuotaResource::Webhook,
                    limit: limit as f64,
                    current: usage.webhook_count as f64,
                });
            }
            usage.webhook_count += 1;
            Ok(limit - usage.webhook_count)
        })
    }

    pub fn release_webhook(&self, session_id: &str) {
        self.with_session(session_id, |usage| {
            usage.webhook_count = usage.webhook_count.saturating_sub(1);
        });
    }

    /// Record token spend against the daily UTC budget.
    pub fn record_spend(&self, session_id: &str, usd: f64) -> Result<f64> {
        let budget = self.config.max_daily_token_budget_usd;
        self.with_session(session_id, |usage| {
            usage.reset_daily_if_stale(Utc::now().date_naive());
            if usage.daily_spend_usd + usd > budget {
                return Err(Error::QuotaExceeded {
                    resource: QuotaResource::Budget,
                    limit: budget,
                    current: usage.daily_spend_usd,
                });
            }
            usage.daily_spend_usd += usd;
            Ok(budget - usage.daily_spend_usd)
        })
    }

    /// Current spend for the session today, in USD.
    pub fn daily_spend(&self, session_id: &str) -> f64 {
        self.with_session(session_id, |usage| {
            usage.reset_daily_if_stale(Utc::now().date_naive());
            usage.daily_spend_usd
        })
    }

    /// Drop all state for a session (e.g. when its token is invalidated).
    pub fn forget_session(&self, session_id: &str) {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(session_id);
    }
}
