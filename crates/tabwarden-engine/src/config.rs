//! Engine configuration with defaults and validation.

/// Tunable engine behavior. Defaults are safe for production use.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// URL prefix identifying the anchor surface tab. A live tab whose URL
    /// starts with this prefix survives workspace teardown.
    pub anchor_url: String,
    /// Age threshold for the unused-tab cleaning pass.
    pub unused_tab_days: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            anchor_url: "tabwarden://dashboard".to_string(),
            unused_tab_days: 7,
        }
    }
}

impl EngineConfig {
    /// Validates the configuration, returning an error message on failure.
    pub fn validate(&self) -> Result<(), String> {
        if self.anchor_url.trim().is_empty() {
            return Err("anchor_url is required".into());
        }
        if self.unused_tab_days < 1 {
            return Err("unused_tab_days must be at least 1".into());
        }
        Ok(())
    }

    /// Cutoff timestamp (epoch ms) below which a tab counts as unused. The
    /// configured day threshold applies unless the caller overrides it.
    pub fn unused_cutoff_ms(&self, now_ms: i64, days_override: Option<i64>) -> i64 {
        let days = days_override.unwrap_or(self.unused_tab_days);
        now_ms - days * 24 * 60 * 60 * 1000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert_eq!(config.anchor_url, "tabwarden://dashboard");
        assert_eq!(config.unused_tab_days, 7);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = EngineConfig::default();
        config.anchor_url = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.unused_tab_days = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unused_cutoff_subtracts_whole_days() {
        let config = EngineConfig {
            unused_tab_days: 2,
            ..EngineConfig::default()
        };
        assert_eq!(
            config.unused_cutoff_ms(200_000_000, None),
            200_000_000 - 172_800_000
        );
        assert_eq!(
            config.unused_cutoff_ms(200_000_000, Some(1)),
            200_000_000 - 86_400_000
        );
    }
}
