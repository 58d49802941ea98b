use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::{EngineError, EngineResult};

/// Longest package identifier accepted from callers
pub const MAX_PACKAGE_ID_LEN: usize = 256;

/// Validated package identifier
///
/// Opaque to the engine. Backend-style ids such as `name;version;arch;data`
/// pass through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageId(String);

impl PackageId {
    /// Parse and validate a package identifier
    pub fn parse(raw: impl Into<String>) -> EngineResult<Self> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(EngineError::invalid("package id is empty"));
        }
        if raw.len() > MAX_PACKAGE_ID_LEN {
            return Err(EngineError::invalid(format!(
                "package id exceeds {} bytes",
                MAX_PACKAGE_ID_LEN
            )));
        }
        if raw.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(EngineError::invalid(format!(
                "package id '{}' contains whitespace or control characters",
                raw.escape_debug()
            )));
        }
        Ok(Self(raw))
    }

    /// Parse a list of identifiers, rejecting empty lists and duplicates
    pub fn parse_list<I, S>(raw: I) -> EngineResult<Vec<Self>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let packages = raw
            .into_iter()
            .map(Self::parse)
            .collect::<EngineResult<Vec<_>>>()?;
        validate_list(&packages)?;
        Ok(packages)
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Package name, the first `;`-separated field
    pub fn name(&self) -> &str {
        self.0.split(';').next().unwrap_or(&self.0)
    }
}

/// Reject empty or duplicated package lists
pub(crate) fn validate_list(packages: &[PackageId]) -> EngineResult<()> {
    if packages.is_empty() {
        return Err(EngineError::invalid("package list is empty"));
    }
    let mut seen = HashSet::with_capacity(packages.len());
    for package in packages {
        if !seen.insert(package) {
            return Err(EngineError::invalid(format!(
                "package '{}' listed more than once",
                package
            )));
        }
    }
    Ok(())
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for PackageId {
    type Error = EngineError;

    fn try_from(raw: String) -> EngineResult<Self> {
        Self::parse(raw)
    }
}

impl TryFrom<&str> for PackageId {
    type Error = EngineError;

    fn try_from(raw: &str) -> EngineResult<Self> {
        Self::parse(raw)
    }
}

impl From<PackageId> for String {
    fn from(id: PackageId) -> Self {
        id.0
    }
}

/// Package state as reported in search and update results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageState {
    Installed,
    Available,
    Update,
}

impl PackageState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Installed => "installed",
            Self::Available => "available",
            Self::Update => "update",
        }
    }
}

/// One result item produced by a worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    pub package_id: PackageId,
    pub state: PackageState,
    pub summary: String,
}

impl PackageInfo {
    pub fn new(package_id: PackageId, state: PackageState, summary: impl Into<String>) -> Self {
        Self {
            package_id,
            state,
            summary: summary.into(),
        }
    }
}
