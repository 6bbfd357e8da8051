//! Config cache keys and the string coercions applied on read.
//!
//! The local cache stores every value as a string. Callers read them back as
//! booleans or dates through [`parse_bool`] / [`parse_date`], falling back to a
//! conservative default when a value is missing or malformed.

use chrono::{DateTime, NaiveDate};

/// Keys this agent reads and writes in the local config cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    SystemId,
    AccountCreated,
    Status,
    StoreActive,
    PharmacyActive,
    ContractExpiry,
    OfflineMode,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 7] = [
        ConfigKey::SystemId,
        ConfigKey::AccountCreated,
        ConfigKey::Status,
        ConfigKey::StoreActive,
        ConfigKey::PharmacyActive,
        ConfigKey::ContractExpiry,
        ConfigKey::OfflineMode,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigKey::SystemId => "system_id",
            ConfigKey::AccountCreated => "account_created",
            ConfigKey::Status => "status",
            ConfigKey::StoreActive => "store_active",
            ConfigKey::PharmacyActive => "pharmacy_active",
            ConfigKey::ContractExpiry => "contract_expiry",
            ConfigKey::OfflineMode => "offline_mode",
        }
    }
}

impl core::fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a cached boolean. Returns `None` for anything unrecognised.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn format_bool(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

/// Parse a cached or remote date: `YYYY-MM-DD`, or the date part of an
/// RFC 3339 timestamp.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.date_naive());
    }
    // "2026-12-31 00:00:00" and similar database renderings.
    raw.get(..10)
        .and_then(|head| NaiveDate::parse_from_str(head, "%Y-%m-%d").ok())
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_stable() {
        let names: Vec<_> = ConfigKey::ALL.iter().map(|k| k.as_str()).collect();
        assert_eq!(
            names,
            [
                "system_id",
                "account_created",
                "status",
                "store_active",
                "pharmacy_active",
                "contract_expiry",
                "offline_mode"
            ]
        );
    }

    #[test]
    fn bool_coercion() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" 0 "), Some(false));
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_bool(""), None);
    }

    #[test]
    fn date_coercion() {
        let expected = NaiveDate::from_ymd_opt(2026, 12, 31).unwrap();
        assert_eq!(parse_date("2026-12-31"), Some(expected));
        assert_eq!(parse_date("2026-12-31T23:59:59+00:00"), Some(expected));
        assert_eq!(parse_date("2026-12-31 08:00:00"), Some(expected));
        assert_eq!(parse_date("31/12/2026"), None);
        assert_eq!(parse_date(""), None);
        assert_eq!(format_date(expected), "2026-12-31");
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: formatting a bool and parsing it back is lossless.
            #[test]
            fn bool_format_parse_agrees(value in any::<bool>()) {
                prop_assert_eq!(parse_bool(format_bool(value)), Some(value));
            }

            /// Property: parsing never panics on arbitrary input.
            #[test]
            fn parse_is_total(raw in ".{0,40}") {
                let _ = parse_bool(&raw);
                let _ = parse_date(&raw);
            }
        }
    }
}
