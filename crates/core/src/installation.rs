//! Installation status as reported by the licensing backend.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config_key::parse_date;
use crate::error::AccessError;
use crate::id::SystemId;

/// Prefix of a relative shutdown marker (`IN_MINUTES:<n>`).
pub const RELATIVE_MARKER_PREFIX: &str = "IN_MINUTES:";

/// Largest relative marker accepted (one day).
pub const MAX_RELATIVE_MINUTES: i64 = 24 * 60;

/// Remote activation state of an installation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallState {
    Active,
    Deactivated,
    /// Anything the backend sends that we do not recognise.
    #[default]
    #[serde(other)]
    Unknown,
}

impl InstallState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallState::Active => "active",
            InstallState::Deactivated => "deactivated",
            InstallState::Unknown => "unknown",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "active" => InstallState::Active,
            "deactivated" => InstallState::Deactivated,
            _ => InstallState::Unknown,
        }
    }
}

/// One poll's view of the installation record.
///
/// Date and shutdown fields are kept in their wire form and parsed on demand,
/// so a malformed value in one field never discards the rest of the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationStatus {
    pub system_id: SystemId,
    #[serde(default)]
    pub status: InstallState,
    #[serde(default)]
    pub store_active: bool,
    #[serde(default)]
    pub pharmacy_active: bool,
    #[serde(default)]
    pub contract_expiry: Option<String>,
    #[serde(default)]
    pub shutdown_time: Option<String>,
    /// Message shown on the locked screen.
    #[serde(default)]
    pub reason: Option<String>,
    /// Who to call to get unlocked.
    #[serde(default)]
    pub contact_info: Option<String>,
}

impl InstallationStatus {
    pub fn new(system_id: SystemId, status: InstallState) -> Self {
        Self {
            system_id,
            status,
            store_active: false,
            pharmacy_active: false,
            contract_expiry: None,
            shutdown_time: None,
            reason: None,
            contact_info: None,
        }
    }

    pub fn contract_expiry_date(&self) -> Option<NaiveDate> {
        self.contract_expiry.as_deref().and_then(parse_date)
    }

    /// Parse the shutdown command, if any.
    pub fn shutdown_command(&self) -> Result<Option<ShutdownTime>, AccessError> {
        match self.shutdown_time.as_deref() {
            None => Ok(None),
            Some(raw) => ShutdownTime::parse(raw),
        }
    }
}

/// A remote shutdown command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownTime {
    /// Shut down at this instant.
    Absolute(DateTime<Utc>),
    /// Shut down `minutes` after the client first sees the marker.
    Relative { minutes: i64 },
}

impl ShutdownTime {
    /// Parse the wire form. Blank input means "no command".
    pub fn parse(raw: &str) -> Result<Option<Self>, AccessError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }

        if let Some(rest) = raw.strip_prefix(RELATIVE_MARKER_PREFIX) {
            let minutes: i64 = rest.trim().parse().map_err(|_| {
                AccessError::validation(format!("bad relative shutdown marker: {raw}"))
            })?;
            if minutes < 0 {
                return Err(AccessError::validation(format!(
                    "negative relative shutdown marker: {raw}"
                )));
            }
            if minutes > MAX_RELATIVE_MINUTES {
                return Err(AccessError::validation(format!(
                    "relative shutdown marker too far out: {raw}"
                )));
            }
            return Ok(Some(ShutdownTime::Relative { minutes }));
        }

        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Ok(Some(ShutdownTime::Absolute(ts.with_timezone(&Utc))));
        }
        for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
                return Ok(Some(ShutdownTime::Absolute(naive.and_utc())));
            }
        }

        Err(AccessError::validation(format!("unparseable shutdown time: {raw}")))
    }

    /// Resolve to an absolute instant relative to `now`.
    ///
    /// `None` when a relative marker falls outside the representable range.
    pub fn resolve(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            ShutdownTime::Absolute(at) => Some(*at),
            ShutdownTime::Relative { minutes } => {
                Duration::try_minutes(*minutes).and_then(|offset| now.checked_add_signed(offset))
            }
        }
    }

    /// Wire form written back to the backend.
    pub fn to_wire(&self) -> String {
        match self {
            ShutdownTime::Absolute(at) => at.to_rfc3339(),
            ShutdownTime::Relative { minutes } => format!("{RELATIVE_MARKER_PREFIX}{minutes}"),
        }
    }
}
