use serde::{Deserialize, Serialize};
use std::fmt;

use super::package::{validate_list, PackageId};
use crate::{EngineError, EngineResult};

/// Parameterless discriminant of an [`Operation`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    GetUpdates,
    UpdateSystem,
    FindPackages,
    GetDependencies,
    InstallPackages,
    RemovePackages,
    RemovePackagesWithDependencies,
}

impl OperationKind {
    /// Stable operation name
    pub fn name(&self) -> &'static str {
        match self {
            Self::GetUpdates => "get-updates",
            Self::UpdateSystem => "update-system",
            Self::FindPackages => "find-packages",
            Self::GetDependencies => "get-dependencies",
            Self::InstallPackages => "install-packages",
            Self::RemovePackages => "remove-packages",
            Self::RemovePackagesWithDependencies => "remove-packages-with-dependencies",
        }
    }

    /// Status text a worker reports while running this kind
    pub fn status_text(&self) -> &'static str {
        match self {
            Self::GetUpdates | Self::FindPackages | Self::GetDependencies => "query",
            Self::UpdateSystem => "update",
            Self::InstallPackages => "install",
            Self::RemovePackages | Self::RemovePackagesWithDependencies => "remove",
        }
    }

    /// Whether at most one job of this kind may run at a time
    pub fn is_exclusive(&self) -> bool {
        matches!(self, Self::UpdateSystem)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single package-management request with its parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Operation {
    GetUpdates,
    UpdateSystem,
    FindPackages { search: String },
    GetDependencies { package: PackageId },
    InstallPackages { packages: Vec<PackageId> },
    RemovePackages { packages: Vec<PackageId> },
    RemovePackagesWithDependencies { packages: Vec<PackageId> },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::GetUpdates => OperationKind::GetUpdates,
            Self::UpdateSystem => OperationKind::UpdateSystem,
            Self::FindPackages { .. } => OperationKind::FindPackages,
            Self::GetDependencies { .. } => OperationKind::GetDependencies,
            Self::InstallPackages { .. } => OperationKind::InstallPackages,
            Self::RemovePackages { .. } => OperationKind::RemovePackages,
            Self::RemovePackagesWithDependencies { .. } => {
                OperationKind::RemovePackagesWithDependencies
            }
        }
    }

    /// Check the parameters carried by this request
    ///
    /// Package ids are validated on construction; this catches empty search
    /// strings and empty or duplicated package lists, which can still arrive
    /// through deserialization or direct construction.
    pub fn validate(&self) -> EngineResult<()> {
        match self {
            Self::GetUpdates | Self::UpdateSystem | Self::GetDependencies { .. } => Ok(()),
            Self::FindPackages { search } => {
                if search.trim().is_empty() {
                    Err(EngineError::invalid("search text is empty"))
                } else if search.chars().any(char::is_control) {
                    Err(EngineError::invalid("search text contains control characters"))
                } else {
                    Ok(())
                }
            }
            Self::InstallPackages { packages }
            | Self::RemovePackages { packages }
            | Self::RemovePackagesWithDependencies { packages } => validate_list(packages),
        }
    }

    /// Packages named by the request, in request order
    pub fn packages(&self) -> &[PackageId] {
        match self {
            Self::GetDependencies { package } => std::slice::from_ref(package),
            Self::InstallPackages { packages }
            | Self::RemovePackages { packages }
            | Self::RemovePackagesWithDependencies { packages } => packages,
            _ => &[],
        }
    }
}
