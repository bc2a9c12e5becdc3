//! Provider endpoints and health-ranked selection.
//!
//! The registry is the only process-wide mutable state in the engine. Health
//! scores are a soft heuristic — an exponential moving average of attempt
//! outcomes, 0–100 — reset on restart, never a correctness invariant.
//! Updates go through atomics so concurrent sends can report outcomes
//! without a lock.

use std::sync::atomic::{AtomicU32, Ordering};

use serde::Deserialize;

use herald_common::{Secret, tracing};

/// A configured mail submission endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpEndpoint {
    /// Stable identifier used in results, logs, and health reporting.
    pub name: String,
    /// Host name; also the name verified on TLS connections.
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<Secret>,
    /// TLS from the first byte. Defaults to `port == 465` when unset.
    #[serde(default)]
    pub implicit_tls: Option<bool>,
    /// Upgrade via STARTTLS after EHLO. Defaults to `port == 587` when
    /// unset. Ignored on implicit-TLS connections.
    #[serde(default)]
    pub starttls: Option<bool>,
    /// Accept self-signed certificates. Test servers only.
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl SmtpEndpoint {
    /// Plain submission endpoint without credentials (tests, local relays).
    #[must_use]
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            username: None,
            password: None,
            implicit_tls: None,
            starttls: None,
            accept_invalid_certs: false,
        }
    }

    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<Secret>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    #[must_use]
    pub fn uses_implicit_tls(&self) -> bool {
        self.implicit_tls.unwrap_or(self.port == 465)
    }

    /// Whether the session should upgrade via STARTTLS after the first EHLO.
    #[must_use]
    pub fn wants_starttls(&self) -> bool {
        !self.uses_implicit_tls() && self.starttls.unwrap_or(self.port == 587)
    }

    /// Username and cleartext password, when both are configured.
    #[must_use]
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some((user.as_str(), pass.expose())),
            _ => None,
        }
    }
}

/// Starting health for a fresh endpoint.
const INITIAL_HEALTH: u32 = 100;

/// EMA weight denominator: each outcome moves the score by 1/8 of the
/// distance to its own value (0 or 100).
const EMA_WEIGHT: u32 = 8;

#[derive(Debug)]
struct Provider {
    endpoint: SmtpEndpoint,
    health: AtomicU32,
}

/// An endpoint handed out by the registry, with the health score it was
/// ranked under.
#[derive(Debug, Clone)]
pub struct RankedEndpoint {
    pub endpoint: SmtpEndpoint,
    pub health: u32,
}

/// Health-ranked registry of submission endpoints.
///
/// Injected into the engine at construction; all mutation happens through
/// [`ProviderRegistry::record_outcome`].
#[derive(Debug)]
pub struct ProviderRegistry {
    providers: Vec<Provider>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn new(endpoints: Vec<SmtpEndpoint>) -> Self {
        Self {
            providers: endpoints
                .into_iter()
                .map(|endpoint| Provider {
                    endpoint,
                    health: AtomicU32::new(INITIAL_HEALTH),
                })
                .collect(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Endpoints in descending health order. Ties keep configuration order,
    /// so equally healthy providers are tried in the order they were listed.
    #[must_use]
    pub fn ranked(&self) -> Vec<RankedEndpoint> {
        let mut ranked: Vec<RankedEndpoint> = self
            .providers
            .iter()
            .map(|p| RankedEndpoint {
                endpoint: p.endpoint.clone(),
                health: p.health.load(Ordering::Relaxed),
            })
            .collect();

        ranked.sort_by(|a, b| b.health.cmp(&a.health));
        ranked
    }

    /// Folds an attempt outcome into the endpoint's health score.
    pub fn record_outcome(&self, name: &str, success: bool) {
        let Some(provider) = self.providers.iter().find(|p| p.endpoint.name == name) else {
            return;
        };

        let target: u32 = if success { 100 } else { 0 };
        let mut current = provider.health.load(Ordering::Relaxed);
        loop {
            let updated = (current * (EMA_WEIGHT - 1) + target) / EMA_WEIGHT;
            match provider.health.compare_exchange_weak(
                current,
                updated,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    if !success {
                        tracing::debug!(
                            provider = name,
                            health = updated,
                            "Provider health degraded"
                        );
                    }
                    return;
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Current health score for an endpoint.
    #[must_use]
    pub fn health(&self, name: &str) -> Option<u32> {
        self.providers
            .iter()
            .find(|p| p.endpoint.name == name)
            .map(|p| p.health.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn registry(names: &[&str]) -> ProviderRegistry {
        ProviderRegistry::new(
            names
                .iter()
                .map(|n| SmtpEndpoint::new(*n, "mail.example.com", 587))
                .collect(),
        )
    }

    #[test]
    fn test_initial_health_and_config_order() {
        let registry = registry(&["primary", "secondary"]);
        let ranked = registry.ranked();

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].endpoint.name, "primary");
        assert_eq!(ranked[0].health, 100);
        assert_eq!(ranked[1].endpoint.name, "secondary");
    }

    #[test]
    fn test_failures_degrade_and_reorder() {
        let registry = registry(&["primary", "secondary"]);

        for _ in 0..3 {
            registry.record_outcome("primary", false);
        }

        let ranked = registry.ranked();
        assert_eq!(ranked[0].endpoint.name, "secondary");
        assert!(registry.health("primary").unwrap() < 100);
    }

    #[test]
    fn test_successes_recover_health() {
        let registry = registry(&["primary"]);

        for _ in 0..10 {
            registry.record_outcome("primary", false);
        }
        let degraded = registry.health("primary").unwrap();

        for _ in 0..10 {
            registry.record_outcome("primary", true);
        }
        assert!(registry.health("primary").unwrap() > degraded);
    }

    #[test]
    fn test_ema_converges_to_extremes() {
        let registry = registry(&["p"]);

        for _ in 0..64 {
            registry.record_outcome("p", false);
        }
        assert_eq!(registry.health("p").unwrap(), 0);

        for _ in 0..64 {
            registry.record_outcome("p", true);
        }
        assert!(registry.health("p").unwrap() >= 93);
    }

    #[test]
    fn test_unknown_provider_ignored() {
        let registry = registry(&["p"]);
        registry.record_outcome("nonexistent", false);
        assert_eq!(registry.health("p"), Some(100));
        assert_eq!(registry.health("nonexistent"), None);
    }

    #[test]
    fn test_endpoint_tls_defaults() {
        assert!(SmtpEndpoint::new("a", "h", 465).uses_implicit_tls());
        assert!(!SmtpEndpoint::new("a", "h", 465).wants_starttls());

        assert!(!SmtpEndpoint::new("a", "h", 587).uses_implicit_tls());
        assert!(SmtpEndpoint::new("a", "h", 587).wants_starttls());

        assert!(!SmtpEndpoint::new("a", "h", 2525).wants_starttls());

        let mut forced = SmtpEndpoint::new("a", "h", 2525);
        forced.starttls = Some(true);
        assert!(forced.wants_starttls());
    }

    #[test]
    fn test_credentials_require_both_parts() {
        let endpoint = SmtpEndpoint::new("a", "h", 587);
        assert!(endpoint.credentials().is_none());

        let endpoint = endpoint.with_credentials("user", "pass");
        assert_eq!(endpoint.credentials(), Some(("user", "pass")));
    }

    #[test]
    fn test_endpoint_debug_masks_password() {
        let endpoint = SmtpEndpoint::new("a", "h", 587).with_credentials("user", "hunter2");
        let debug = format!("{endpoint:?}");
        assert!(!debug.contains("hunter2"));
    }
}
