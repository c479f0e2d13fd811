//! Harness configuration, read once from the environment at startup.

/// Which context entries an invocation must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContextProfile {
    /// Require identity, deadline, request id, API host, and namespace.
    #[default]
    Full,
    /// Require only identity and deadline; pick the rest up when present.
    Lite,
}

impl ContextProfile {
    fn from_env(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "full" => Some(Self::Full),
            "lite" => Some(Self::Lite),
            _ => None,
        }
    }
}

/// Behavior switches for one harness process.
#[derive(Debug, Clone, Copy, Default)]
pub struct HarnessConfig {
    /// Action code is baked into the image; skip the init phase.
    pub preloaded: bool,
    /// Rewrite web-event payloads into HTTP-shaped events before dispatch.
    pub http_event: bool,
    /// Context strictness for two-argument entry points.
    pub context_profile: ContextProfile,
}

impl HarnessConfig {
    /// Read configuration from environment variables:
    /// - HUSK_PRELOADED: action code ships with the image ("false"/"0" = off)
    /// - HUSK_HTTP_EVENT: enable the web-event rewrite ("false"/"0" = off)
    /// - HUSK_CONTEXT: "full" or "lite" (default "full")
    pub fn from_env() -> Self {
        Self {
            preloaded: std::env::var("HUSK_PRELOADED")
                .map(|value| value != "false" && value != "0")
                .unwrap_or(false),
            http_event: std::env::var("HUSK_HTTP_EVENT")
                .map(|value| value != "false" && value != "0")
                .unwrap_or(false),
            context_profile: std::env::var("HUSK_CONTEXT")
                .ok()
                .and_then(|value| ContextProfile::from_env(&value))
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_parse_is_case_insensitive() {
        assert_eq!(ContextProfile::from_env("full"), Some(ContextProfile::Full));
        assert_eq!(ContextProfile::from_env("Lite"), Some(ContextProfile::Lite));
        assert_eq!(ContextProfile::from_env("LITE"), Some(ContextProfile::Lite));
    }

    #[test]
    fn unknown_profile_falls_back_to_default() {
        assert_eq!(ContextProfile::from_env("strict"), None);
        assert_eq!(ContextProfile::default(), ContextProfile::Full);
    }
}
