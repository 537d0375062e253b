//! Per-zone strictness and timeout, selected by the first whitespace field
//! of each request.
//!
//! Built once from `Config` at startup and then shared read-only across
//! every connection, the way `EsmtpListenerParams` is built from config
//! once and handed by clone/reference to each `SmtpServer`.

use crate::config::{Config, ZoneConfig};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct ZoneEntry {
    pub timeout: Duration,
    pub strict_testing: bool,
}

impl From<ZoneConfig> for ZoneEntry {
    fn from(zone: ZoneConfig) -> Self {
        Self {
            timeout: zone.timeout,
            strict_testing: zone.strict_testing,
        }
    }
}

pub struct ZoneRegistry {
    default: ZoneEntry,
    zones: HashMap<String, ZoneEntry>,
}

impl ZoneRegistry {
    pub fn from_config(config: &Config) -> Self {
        let zones = config
            .zones
            .iter()
            .map(|(name, zone)| (name.clone(), ZoneEntry::from(*zone)))
            .collect();
        Self {
            default: ZoneEntry::from(config.default_zone),
            zones,
        }
    }

    /// Zone name `""` or any name with no explicit entry falls back to the
    /// default zone.
    pub fn lookup(&self, name: &str) -> ZoneEntry {
        if name.is_empty() {
            return self.default;
        }
        self.zones.get(name).copied().unwrap_or(self.default)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn config_with_zone() -> Config {
        let yaml = r#"
zones:
  partner.example.com:
    timeout: 8
    strict_testing: true
"#;
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn empty_zone_name_is_default() {
        let registry = ZoneRegistry::from_config(&Config::default());
        let zone = registry.lookup("");
        assert_eq!(zone.timeout, Duration::from_secs(4));
        assert!(!zone.strict_testing);
    }

    #[test]
    fn unknown_zone_name_is_default() {
        let registry = ZoneRegistry::from_config(&config_with_zone());
        let zone = registry.lookup("unknown.example.com");
        assert!(!zone.strict_testing);
    }

    #[test]
    fn known_zone_name_is_looked_up() {
        let registry = ZoneRegistry::from_config(&config_with_zone());
        let zone = registry.lookup("partner.example.com");
        assert_eq!(zone.timeout, Duration::from_secs(8));
        assert!(zone.strict_testing);
    }
}
