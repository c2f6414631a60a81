//! Release policies attached to stored files.
//!
//! A policy pairs two levels on the same four-step ordinal scale: the
//! `attention` required before the file may be released, and the `confidence`
//! actually available. See [`gate`] for how the two are compared.

pub mod gate;
pub mod memory;
pub mod remote;
pub mod sqlite;
pub mod store;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use gate::{check, permits, Denial};
pub use store::{PolicyStore, PolicyStoreError};

/// Ordinal level: None=0, Sometimes=1, Usually=2, Always=3
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Level {
    None,
    Sometimes,
    Usually,
    Always,
}

impl Level {
    pub fn rank(self) -> u8 {
        match self {
            Level::None => 0,
            Level::Sometimes => 1,
            Level::Usually => 2,
            Level::Always => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Level::None => "None",
            Level::Sometimes => "Sometimes",
            Level::Usually => "Usually",
            Level::Always => "Always",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown level {0:?} (expected None, Sometimes, Usually or Always)")]
pub struct UnknownLevel(pub String);

impl FromStr for Level {
    type Err = UnknownLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "None" => Ok(Level::None),
            "Sometimes" => Ok(Level::Sometimes),
            "Usually" => Ok(Level::Usually),
            "Always" => Ok(Level::Always),
            other => Err(UnknownLevel(other.to_string())),
        }
    }
}

/// Informational only; the gate never looks at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessRights {
    Public,
    #[default]
    Private,
}

impl AccessRights {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessRights::Public => "public",
            AccessRights::Private => "private",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown access rights {0:?} (expected public or private)")]
pub struct UnknownAccessRights(pub String);

impl FromStr for AccessRights {
    type Err = UnknownAccessRights;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "public" => Ok(AccessRights::Public),
            "private" => Ok(AccessRights::Private),
            other => Err(UnknownAccessRights(other.to_string())),
        }
    }
}

/// Caller-supplied policy for an upload, before a locator exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyInput {
    pub access_rights: AccessRights,
    pub attention: Level,
    pub confidence: Level,
    pub label: String,
}

impl Default for PolicyInput {
    fn default() -> Self {
        Self {
            access_rights: AccessRights::Private,
            attention: Level::Always,
            confidence: Level::Usually,
            label: String::new(),
        }
    }
}

impl PolicyInput {
    /// Parse optional raw form/JSON values, falling back to defaults for absent
    /// or blank ones. Unknown values are errors rather than silently ranked 0.
    pub fn parse(
        access_rights: Option<&str>,
        attention: Option<&str>,
        confidence: Option<&str>,
        label: Option<&str>,
    ) -> Result<Self, String> {
        fn present(v: Option<&str>) -> Option<&str> {
            v.map(str::trim).filter(|v| !v.is_empty())
        }

        let defaults = Self::default();

        Ok(Self {
            access_rights: match present(access_rights) {
                Some(v) => v.parse().map_err(|e: UnknownAccessRights| e.to_string())?,
                None => defaults.access_rights,
            },
            attention: match present(attention) {
                Some(v) => v.parse().map_err(|e: UnknownLevel| format!("attention: {}", e))?,
                None => defaults.attention,
            },
            confidence: match present(confidence) {
                Some(v) => v.parse().map_err(|e: UnknownLevel| format!("confidence: {}", e))?,
                None => defaults.confidence,
            },
            label: label.unwrap_or_default().to_string(),
        })
    }

    pub fn with_location(self, data_location: impl Into<String>) -> PolicyFields {
        PolicyFields {
            data_location: data_location.into(),
            access_rights: self.access_rights,
            attention: self.attention,
            confidence: self.confidence,
            label: self.label,
        }
    }
}

/// Everything an upsert replaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyFields {
    pub data_location: String,
    pub access_rights: AccessRights,
    pub attention: Level,
    pub confidence: Level,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRecord {
    pub file_id: String,
    pub data_location: String,
    pub access_rights: AccessRights,
    pub attention: Level,
    pub confidence: Level,
    #[serde(default)]
    pub label: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PolicyRecord {
    pub fn new(file_id: &str, fields: PolicyFields, now: DateTime<Utc>) -> Self {
        Self {
            file_id: file_id.to_string(),
            data_location: fields.data_location,
            access_rights: fields.access_rights,
            attention: fields.attention,
            confidence: fields.confidence,
            label: fields.label,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace every field but `file_id` and `created_at`.
    pub fn apply(&mut self, fields: PolicyFields, now: DateTime<Utc>) {
        self.data_location = fields.data_location;
        self.access_rights = fields.access_rights;
        self.attention = fields.attention;
        self.confidence = fields.confidence;
        self.label = fields.label;
        self.updated_at = now;
    }
}
