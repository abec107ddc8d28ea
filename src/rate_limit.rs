//! Per-user view quota over a fixed-length window.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::config::MatchSettings;
use crate::error::RateLimitError;
use crate::profile::UserProfile;

/// Window state after an admitted view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewWindow {
    pub start: DateTime<Utc>,
    pub views: u32,
}

#[derive(Debug, Clone)]
pub struct RateLimiter {
    limit: u32,
    window: TimeDelta,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window: TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX),
        }
    }

    pub fn from_settings(settings: &MatchSettings) -> Self {
        Self::new(settings.view_limit, settings.view_window)
    }

    /// Decide whether one more view is allowed.
    ///
    /// Pure: the caller persists the returned window together with the view.
    /// A missing or elapsed window restarts at `now`; a full window is rejected
    /// with the time left until it elapses.
    pub fn admit(
        &self,
        window_start: Option<DateTime<Utc>>,
        views: u32,
        now: DateTime<Utc>,
    ) -> Result<ViewWindow, RateLimitError> {
        let Some(start) = window_start else {
            return Ok(ViewWindow { start: now, views: 1 });
        };

        let elapsed = now.signed_duration_since(start);
        if elapsed >= self.window {
            return Ok(ViewWindow { start: now, views: 1 });
        }

        if views >= self.limit {
            let remaining = (self.window - elapsed.max(TimeDelta::zero()))
                .to_std()
                .unwrap_or_default();
            return Err(RateLimitError::Cooldown { remaining });
        }

        Ok(ViewWindow {
            start,
            views: views + 1,
        })
    }

    /// `admit` against the profile's stored counters.
    pub fn admit_profile(
        &self,
        profile: &UserProfile,
        now: DateTime<Utc>,
    ) -> Result<ViewWindow, RateLimitError> {
        self.admit(profile.view_window_start, profile.views_in_window, now)
    }
}

/// Render a cooldown as `"3h 20m"` style text.
pub fn format_remaining(remaining: Duration) -> String {
    let total_minutes = remaining.as_secs().div_ceil(60);
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;
    match (hours, minutes) {
        (0, m) => format!("{m}m"),
        (h, 0) => format!("{h}h"),
        (h, m) => format!("{h}h {m}m"),
    }
}
