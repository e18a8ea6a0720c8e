//! Runtime configuration from `DISPATCH_*` environment variables.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `DISPATCH_API_BASE_URL` | `http://localhost:8080` |
//! | `DISPATCH_WS_URL` | `ws://localhost:8080/ws` |
//! | `DISPATCH_ROUTING_BASE_URL` | `https://api.openrouteservice.org` |
//! | `DISPATCH_ROUTING_API_KEY` | unset (straight-line routing) |
//! | `DISPATCH_GEOCODER_BASE_URL` | `https://nominatim.openstreetmap.org` |
//! | `DISPATCH_POLL_INTERVAL_MS` | `5000` |
//! | `DISPATCH_CHANGE_THRESHOLD_M` | `1.0` |
//! | `DISPATCH_GEO_TIMEOUT_MS` | `5000` |
//! | `DISPATCH_RECONNECT_MAX_ATTEMPTS` | `5` |
//! | `DISPATCH_RECONNECT_BASE_DELAY_MS` | `1000` |
//! | `DISPATCH_RECONNECT_MAX_DELAY_MS` | `30000` |
//! | `DISPATCH_REDIAL_INTERVAL_MS` | `30000` |
//! | `DISPATCH_PERMISSION_CACHE_PATH` | unset (in memory) |
//! | `DISPATCH_USER_ID` | `0` |
//! | `DISPATCH_USERNAME` | unset |
//! | `DISPATCH_DEFAULT_CENTER` | `60.7076,28.7528` |

use crate::channel::ReconnectPolicy;
use crate::geo::{TrackerConfig, WatchOptions, DEFAULT_CHANGE_THRESHOLD_M};
use crate::lifecycle::Redial;
use crate::model::{LatLng, SessionIdentity};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const PREFIX: &str = "DISPATCH_";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{key}: cannot parse {value:?} ({reason})")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchConfig {
    pub api_base_url: String,
    pub ws_url: String,
    pub routing_base_url: String,
    pub routing_api_key: Option<String>,
    pub geocoder_base_url: String,
    pub poll_interval_ms: u64,
    pub change_threshold_m: f64,
    pub geo_timeout_ms: u64,
    pub reconnect_max_attempts: u32,
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
    /// How often the session re-dials a socket the channel gave up on.
    pub redial_interval_ms: u64,
    pub permission_cache_path: Option<PathBuf>,
    pub user_id: i64,
    pub username: Option<String>,
    pub default_center: LatLng,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080".into(),
            ws_url: "ws://localhost:8080/ws".into(),
            routing_base_url: "https://api.openrouteservice.org".into(),
            routing_api_key: None,
            geocoder_base_url: "https://nominatim.openstreetmap.org".into(),
            poll_interval_ms: 5_000,
            change_threshold_m: DEFAULT_CHANGE_THRESHOLD_M,
            geo_timeout_ms: 5_000,
            reconnect_max_attempts: 5,
            reconnect_base_delay_ms: 1_000,
            reconnect_max_delay_ms: 30_000,
            redial_interval_ms: 30_000,
            permission_cache_path: None,
            user_id: 0,
            username: None,
            default_center: LatLng::new(60.7076, 28.7528),
        }
    }
}

impl DispatchConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| {
            lookup(&format!("{PREFIX}{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();

        if let Some(v) = get("API_BASE_URL") {
            config.api_base_url = v;
        }
        if let Some(v) = get("WS_URL") {
            config.ws_url = v;
        }
        if let Some(v) = get("ROUTING_BASE_URL") {
            config.routing_base_url = v;
        }
        config.routing_api_key = get("ROUTING_API_KEY");
        if let Some(v) = get("GEOCODER_BASE_URL") {
            config.geocoder_base_url = v;
        }
        parse_into(&get, "POLL_INTERVAL_MS", &mut config.poll_interval_ms)?;
        parse_into(&get, "CHANGE_THRESHOLD_M", &mut config.change_threshold_m)?;
        parse_into(&get, "GEO_TIMEOUT_MS", &mut config.geo_timeout_ms)?;
        parse_into(&get, "RECONNECT_MAX_ATTEMPTS", &mut config.reconnect_max_attempts)?;
        parse_into(&get, "RECONNECT_BASE_DELAY_MS", &mut config.reconnect_base_delay_ms)?;
        parse_into(&get, "RECONNECT_MAX_DELAY_MS", &mut config.reconnect_max_delay_ms)?;
        parse_into(&get, "REDIAL_INTERVAL_MS", &mut config.redial_interval_ms)?;
        config.permission_cache_path = get("PERMISSION_CACHE_PATH").map(PathBuf::from);
        parse_into(&get, "USER_ID", &mut config.user_id)?;
        config.username = get("USERNAME");
        if let Some(v) = get("DEFAULT_CENTER") {
            config.default_center = parse_center(&v)?;
        }

        if !config.change_threshold_m.is_finite() || config.change_threshold_m < 0.0 {
            return Err(invalid(
                "CHANGE_THRESHOLD_M",
                &config.change_threshold_m.to_string(),
                "must be a non-negative number",
            ));
        }
        if config.poll_interval_ms == 0 {
            return Err(invalid("POLL_INTERVAL_MS", "0", "must be positive"));
        }
        if config.redial_interval_ms == 0 {
            return Err(invalid("REDIAL_INTERVAL_MS", "0", "must be positive"));
        }

        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn redial(&self) -> Redial {
        Redial {
            url: self.ws_url.clone(),
            every: Duration::from_millis(self.redial_interval_ms),
        }
    }

    pub fn tracker(&self) -> TrackerConfig {
        TrackerConfig {
            options: WatchOptions {
                timeout: Duration::from_millis(self.geo_timeout_ms),
                ..WatchOptions::default()
            },
            change_threshold_m: self.change_threshold_m,
        }
    }

    pub fn reconnect(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: self.reconnect_max_attempts,
            base_delay: Duration::from_millis(self.reconnect_base_delay_ms),
            max_delay: Duration::from_millis(self.reconnect_max_delay_ms),
        }
    }

    pub fn identity(&self) -> SessionIdentity {
        SessionIdentity {
            user_id: self.user_id,
            username: self.username.clone(),
        }
    }
}

fn invalid(name: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key: format!("{PREFIX}{name}"),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_into<T>(
    get: &impl Fn(&str) -> Option<String>,
    name: &str,
    slot: &mut T,
) -> Result<(), ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = get(name) {
        *slot = raw
            .parse()
            .map_err(|e: T::Err| invalid(name, &raw, &e.to_string()))?;
    }
    Ok(())
}

fn parse_center(raw: &str) -> Result<LatLng, ConfigError> {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    let [lat, lon] = parts.as_slice() else {
        return Err(invalid("DEFAULT_CENTER", raw, "expected `lat,lon`"));
    };
    let lat: f64 = lat
        .parse()
        .map_err(|e: std::num::ParseFloatError| invalid("DEFAULT_CENTER", raw, &e.to_string()))?;
    let lon: f64 = lon
        .parse()
        .map_err(|e: std::num::ParseFloatError| invalid("DEFAULT_CENTER", raw, &e.to_string()))?;
    Ok(LatLng::new(lat, lon))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_nothing_is_set() {
        let config = DispatchConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, DispatchConfig::default());
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.reconnect(), ReconnectPolicy::default());
        assert_eq!(config.tracker(), TrackerConfig::default());
        assert_eq!(config.redial().every, Duration::from_secs(30));
        assert_eq!(config.redial().url, "ws://localhost:8080/ws");
    }

    #[test]
    fn test_overrides() {
        let config = DispatchConfig::from_lookup(lookup(&[
            ("DISPATCH_POLL_INTERVAL_MS", "3000"),
            ("DISPATCH_USER_ID", "42"),
            ("DISPATCH_USERNAME", "anna"),
            ("DISPATCH_DEFAULT_CENTER", "59.93, 30.31"),
            ("DISPATCH_ROUTING_API_KEY", "  "),
        ]))
        .unwrap();
        assert_eq!(config.poll_interval_ms, 3_000);
        assert_eq!(config.identity().user_id, 42);
        assert_eq!(config.username.as_deref(), Some("anna"));
        assert_eq!(config.default_center, LatLng::new(59.93, 30.31));
        assert_eq!(config.routing_api_key, None);
    }

    #[test]
    fn test_invalid_numbers_are_errors() {
        let err = DispatchConfig::from_lookup(lookup(&[("DISPATCH_GEO_TIMEOUT_MS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "DISPATCH_GEO_TIMEOUT_MS"));

        assert!(DispatchConfig::from_lookup(lookup(&[("DISPATCH_DEFAULT_CENTER", "60.7")])).is_err());
        assert!(DispatchConfig::from_lookup(lookup(&[("DISPATCH_POLL_INTERVAL_MS", "0")])).is_err());
        assert!(DispatchConfig::from_lookup(lookup(&[("DISPATCH_REDIAL_INTERVAL_MS", "0")])).is_err());
    }
}
