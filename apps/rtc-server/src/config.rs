/// Dispatcher configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Route serving the WebSocket upgrade.
    pub rtc_path: String,
    /// When false, upgrades without a valid ticket are rejected with 401.
    pub allow_anonymous: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 4010,
            rtc_path: "/rtc".to_string(),
            allow_anonymous: true,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to the
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            rtc_path: std::env::var("RTC_PATH")
                .ok()
                .filter(|s| s.starts_with('/'))
                .unwrap_or(defaults.rtc_path),
            allow_anonymous: std::env::var("RTC_ALLOW_ANONYMOUS")
                .ok()
                .and_then(|v| parse_bool(&v))
                .unwrap_or(defaults.allow_anonymous),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
