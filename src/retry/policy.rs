//! Poll settings and retry policy derivation.

use std::time::Duration;

/// Multiplier applied to deadlines and fixed sleeps when running under CI.
pub const CI_TIMEOUT_MULTIPLIER: u32 = 3;

/// Upper bound for the polling interval, whatever the requested timeout.
pub const MAX_INTERVAL: Duration = Duration::from_secs(5);

/// Number of polling intervals that fit in the requested timeout.
pub const FAN_OUT: u32 = 10;

/// Environment variable that switches CI mode on when set to a non-empty value.
pub const CI_ENV_VAR: &str = "CI";

/// Process-level knobs that shape every [`RetryPolicy`].
///
/// Settings are plain data. The only place that touches the process
/// environment is [`PollSettings::from_env`]; everything else takes the
/// settings as an argument, so tests can simulate CI and local runs without
/// mutating real environment state.
///
/// # Examples
///
/// ```rust
/// use tryuntil::PollSettings;
/// use std::time::Duration;
///
/// let local = PollSettings::default();
/// assert!(!local.ci_mode());
/// assert_eq!(local.scale(Duration::from_secs(2)), Duration::from_secs(2));
///
/// let ci = PollSettings::default().with_ci_mode(true);
/// assert_eq!(ci.scale(Duration::from_secs(2)), Duration::from_secs(6));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "RawPollSettings")
)]
pub struct PollSettings {
    ci_mode: bool,
    ci_multiplier: u32,
    fan_out: u32,
    max_interval: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            ci_mode: false,
            ci_multiplier: CI_TIMEOUT_MULTIPLIER,
            fan_out: FAN_OUT,
            max_interval: MAX_INTERVAL,
        }
    }
}

/// Deserialized settings before the non-zero checks run.
#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
#[serde(default)]
struct RawPollSettings {
    ci_mode: bool,
    ci_multiplier: u32,
    fan_out: u32,
    max_interval: Duration,
}

#[cfg(feature = "serde")]
impl Default for RawPollSettings {
    fn default() -> Self {
        let defaults = PollSettings::default();
        Self {
            ci_mode: defaults.ci_mode,
            ci_multiplier: defaults.ci_multiplier,
            fan_out: defaults.fan_out,
            max_interval: defaults.max_interval,
        }
    }
}

#[cfg(feature = "serde")]
impl TryFrom<RawPollSettings> for PollSettings {
    type Error = InvalidSettings;

    fn try_from(raw: RawPollSettings) -> Result<Self, Self::Error> {
        if raw.ci_multiplier == 0 {
            return Err(InvalidSettings::new("ci_multiplier"));
        }
        if raw.fan_out == 0 {
            return Err(InvalidSettings::new("fan_out"));
        }
        if raw.max_interval.is_zero() {
            return Err(InvalidSettings::new("max_interval"));
        }
        Ok(Self {
            ci_mode: raw.ci_mode,
            ci_multiplier: raw.ci_multiplier,
            fan_out: raw.fan_out,
            max_interval: raw.max_interval,
        })
    }
}

/// A loaded [`PollSettings`] value would break the policy invariants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidSettings {
    field: &'static str,
}

impl InvalidSettings {
    #[cfg_attr(not(feature = "serde"), allow(dead_code))]
    fn new(field: &'static str) -> Self {
        Self { field }
    }

    /// Name of the offending field.
    pub fn field(&self) -> &'static str {
        self.field
    }
}

impl std::fmt::Display for InvalidSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} must be larger than zero", self.field)
    }
}

impl std::error::Error for InvalidSettings {}

impl PollSettings {
    /// Build settings from the process environment.
    ///
    /// CI mode is active when the `CI` variable is set to a non-empty value.
    /// No other variable is consulted.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| {
            std::env::var_os(key).map(|value| value.to_string_lossy().into_owned())
        })
    }

    /// Build settings from an arbitrary variable lookup.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use tryuntil::PollSettings;
    ///
    /// let settings = PollSettings::from_lookup(|key| {
    ///     (key == "CI").then(|| "true".to_string())
    /// });
    /// assert!(settings.ci_mode());
    ///
    /// let settings = PollSettings::from_lookup(|_| Some(String::new()));
    /// assert!(!settings.ci_mode());
    /// ```
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: FnOnce(&str) -> Option<String>,
    {
        let ci_mode = lookup(CI_ENV_VAR).is_some_and(|value| !value.is_empty());
        Self::default().with_ci_mode(ci_mode)
    }

    /// Force CI mode on or off.
    pub fn with_ci_mode(mut self, active: bool) -> Self {
        self.ci_mode = active;
        self
    }

    /// Set the multiplier applied in CI mode.
    ///
    /// # Panics
    ///
    /// Panics if `multiplier` is zero.
    pub fn with_ci_multiplier(mut self, multiplier: u32) -> Self {
        assert!(multiplier > 0, "CI multiplier must be at least 1");
        self.ci_multiplier = multiplier;
        self
    }

    /// Set how many intervals the requested timeout is divided into.
    ///
    /// # Panics
    ///
    /// Panics if `fan_out` is zero.
    pub fn with_fan_out(mut self, fan_out: u32) -> Self {
        assert!(fan_out > 0, "fan-out must be at least 1");
        self.fan_out = fan_out;
        self
    }

    /// Set the ceiling for the polling interval.
    ///
    /// # Panics
    ///
    /// Panics if `max_interval` is zero.
    pub fn with_max_interval(mut self, max_interval: Duration) -> Self {
        assert!(!max_interval.is_zero(), "max interval must be larger than zero");
        self.max_interval = max_interval;
        self
    }

    /// Whether CI mode is active.
    pub fn ci_mode(&self) -> bool {
        self.ci_mode
    }

    /// The configured CI multiplier, whether or not CI mode is active.
    pub fn ci_multiplier(&self) -> u32 {
        self.ci_multiplier
    }

    /// The configured fan-out.
    pub fn fan_out(&self) -> u32 {
        self.fan_out
    }

    /// The configured interval ceiling.
    pub fn max_interval(&self) -> Duration {
        self.max_interval
    }

    /// The multiplier currently in effect (1 outside CI mode).
    pub fn effective_multiplier(&self) -> u32 {
        if self.ci_mode {
            self.ci_multiplier
        } else {
            1
        }
    }

    /// Scale a deadline or fixed sleep by the effective multiplier.
    pub fn scale(&self, duration: Duration) -> Duration {
        duration.saturating_mul(self.effective_multiplier())
    }
}

/// Timing derived for a single poll call.
///
/// A policy is derived fresh for every call from the requested timeout and
/// the [`PollSettings`]. Only the deadline is scaled in CI mode; the interval
/// keeps the same cadence, so CI runs simply make more attempts within a
/// longer window.
///
/// # Examples
///
/// ```rust
/// use tryuntil::{PollSettings, RetryPolicy};
/// use std::time::Duration;
///
/// let policy = RetryPolicy::derive(Duration::from_secs(3), &PollSettings::default());
/// assert_eq!(policy.interval(), Duration::from_millis(300));
/// assert_eq!(policy.deadline(), Duration::from_secs(3));
///
/// let ci = PollSettings::default().with_ci_mode(true);
/// let policy = RetryPolicy::derive(Duration::from_secs(3), &ci);
/// assert_eq!(policy.interval(), Duration::from_millis(300));
/// assert_eq!(policy.deadline(), Duration::from_secs(9));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    requested_timeout: Duration,
    interval: Duration,
    multiplier: u32,
    multiplier_active: bool,
}

impl RetryPolicy {
    /// Derive the interval and effective deadline for `timeout`.
    ///
    /// # Panics
    ///
    /// Panics if `timeout` is zero. A zero budget is a programmer error, not
    /// something to retry.
    pub fn derive(timeout: Duration, settings: &PollSettings) -> Self {
        assert!(!timeout.is_zero(), "timeout must be larger than zero");

        let interval = div_ceil(timeout, settings.fan_out()).min(settings.max_interval());

        Self {
            requested_timeout: timeout,
            interval,
            multiplier: settings.effective_multiplier(),
            multiplier_active: settings.ci_mode(),
        }
    }

    /// The timeout the caller asked for.
    pub fn requested_timeout(&self) -> Duration {
        self.requested_timeout
    }

    /// Time between the start of consecutive attempts.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Multiplier applied to the deadline (1 when inactive).
    pub fn multiplier(&self) -> u32 {
        self.multiplier
    }

    /// Whether the CI multiplier is active for this policy.
    pub fn is_multiplier_active(&self) -> bool {
        self.multiplier_active
    }

    /// Elapsed time after which no further attempt is made.
    pub fn deadline(&self) -> Duration {
        self.requested_timeout.saturating_mul(self.multiplier)
    }
}

fn div_ceil(duration: Duration, parts: u32) -> Duration {
    let nanos = duration.as_nanos().div_ceil(u128::from(parts));
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod policy_tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = PollSettings::default();
        assert!(!settings.ci_mode());
        assert_eq!(settings.ci_multiplier(), 3);
        assert_eq!(settings.fan_out(), 10);
        assert_eq!(settings.max_interval(), Duration::from_secs(5));
        assert_eq!(settings.effective_multiplier(), 1);
    }

    #[test]
    fn test_from_lookup_reads_ci_only() {
        let mut asked = Vec::new();
        let settings = PollSettings::from_lookup(|key| {
            asked.push(key.to_string());
            Some("1".to_string())
        });
        assert!(settings.ci_mode());
        assert_eq!(asked, vec!["CI".to_string()]);
    }

    #[test]
    fn test_from_lookup_missing_or_empty() {
        assert!(!PollSettings::from_lookup(|_| None).ci_mode());
        assert!(!PollSettings::from_lookup(|_| Some(String::new())).ci_mode());
    }

    #[test]
    fn test_interval_is_ceiling_of_fan_out() {
        let policy = RetryPolicy::derive(Duration::from_nanos(15), &PollSettings::default());
        assert_eq!(policy.interval(), Duration::from_nanos(2));

        let policy = RetryPolicy::derive(Duration::from_nanos(1), &PollSettings::default());
        assert_eq!(policy.interval(), Duration::from_nanos(1));
    }

    #[test]
    fn test_interval_capped() {
        let policy = RetryPolicy::derive(Duration::from_secs(600), &PollSettings::default());
        assert_eq!(policy.interval(), MAX_INTERVAL);
        assert_eq!(policy.deadline(), Duration::from_secs(600));
    }

    #[test]
    fn test_ci_scales_deadline_only() {
        let settings = PollSettings::default().with_ci_mode(true);
        let policy = RetryPolicy::derive(Duration::from_secs(1), &settings);

        assert!(policy.is_multiplier_active());
        assert_eq!(policy.multiplier(), 3);
        assert_eq!(policy.interval(), Duration::from_millis(100));
        assert_eq!(policy.deadline(), Duration::from_secs(3));
        assert_eq!(policy.requested_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_custom_knobs() {
        let settings = PollSettings::default()
            .with_fan_out(15)
            .with_max_interval(Duration::from_secs(1))
            .with_ci_multiplier(2)
            .with_ci_mode(true);

        let policy = RetryPolicy::derive(Duration::from_secs(3), &settings);
        assert_eq!(policy.interval(), Duration::from_millis(200));
        assert_eq!(policy.deadline(), Duration::from_secs(6));

        let policy = RetryPolicy::derive(Duration::from_secs(60), &settings);
        assert_eq!(policy.interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_huge_timeout_saturates() {
        let settings = PollSettings::default().with_ci_mode(true);
        let policy = RetryPolicy::derive(Duration::MAX, &settings);
        assert_eq!(policy.deadline(), Duration::MAX);
        assert_eq!(policy.interval(), MAX_INTERVAL);
    }

    #[test]
    #[should_panic(expected = "timeout must be larger than zero")]
    fn test_zero_timeout_panics() {
        RetryPolicy::derive(Duration::ZERO, &PollSettings::default());
    }

    #[test]
    #[should_panic(expected = "fan-out must be at least 1")]
    fn test_zero_fan_out_panics() {
        let _ = PollSettings::default().with_fan_out(0);
    }

    #[test]
    #[should_panic(expected = "CI multiplier must be at least 1")]
    fn test_zero_multiplier_panics() {
        let _ = PollSettings::default().with_ci_multiplier(0);
    }

    #[test]
    fn test_policy_is_copy_and_debug() {
        let policy = RetryPolicy::derive(Duration::from_secs(1), &PollSettings::default());
        let copied = policy;
        assert_eq!(policy, copied);
        assert!(format!("{:?}", policy).contains("RetryPolicy"));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_settings_serde() {
        let settings = PollSettings::default().with_ci_mode(true);
        let json = serde_json::to_string(&settings).unwrap();
        let back: PollSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, settings);

        let partial: PollSettings = serde_json::from_str(r#"{"ci_mode": true}"#).unwrap();
        assert_eq!(partial, settings);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_settings_serde_rejects_zero_fan_out() {
        let err = serde_json::from_str::<PollSettings>(r#"{"fan_out": 0}"#).unwrap_err();
        assert!(err.to_string().contains("fan_out must be larger than zero"));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_settings_serde_rejects_zero_max_interval() {
        let err = serde_json::from_str::<PollSettings>(
            r#"{"max_interval": {"secs": 0, "nanos": 0}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("max_interval must be larger than zero"));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_settings_serde_rejects_zero_ci_multiplier() {
        let err = serde_json::from_str::<PollSettings>(r#"{"ci_mode": true, "ci_multiplier": 0}"#)
            .unwrap_err();
        assert!(err.to_string().contains("ci_multiplier must be larger than zero"));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_settings_serde_loaded_values_derive_policy() {
        let settings: PollSettings =
            serde_json::from_str(r#"{"fan_out": 4, "max_interval": {"secs": 1, "nanos": 0}}"#)
                .unwrap();
        let policy = RetryPolicy::derive(Duration::from_secs(2), &settings);
        assert_eq!(policy.interval(), Duration::from_millis(500));
    }

    #[test]
    fn test_invalid_settings_display() {
        let err = InvalidSettings::new("fan_out");
        assert_eq!(err.field(), "fan_out");
        assert_eq!(err.to_string(), "fan_out must be larger than zero");
    }
}
