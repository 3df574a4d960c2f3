//! Notification permission.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

/// Notification permission as reported by the platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Granted,
    Denied,
    /// Never asked.
    #[default]
    Default,
    /// No notification support at all.
    Unsupported,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Permission::Granted => "granted",
            Permission::Denied => "denied",
            Permission::Default => "default",
            Permission::Unsupported => "unsupported",
        };
        f.write_str(s)
    }
}

/// Error returned when parsing an unknown permission string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown permission state: {0}")]
pub struct PermissionParseError(pub String);

impl FromStr for Permission {
    type Err = PermissionParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "granted" => Ok(Permission::Granted),
            "denied" => Ok(Permission::Denied),
            "default" | "prompt" => Ok(Permission::Default),
            "unsupported" => Ok(Permission::Unsupported),
            _ => Err(PermissionParseError(s.to_owned())),
        }
    }
}

/// Platform permission primitives.
#[async_trait]
pub trait PermissionSource: Send + Sync {
    async fn query_permission(&self) -> Permission;

    /// Prompt the user. Gated on a user gesture by the caller.
    async fn request_permission(&self) -> Permission;
}

/// Permission held in memory, seeded from config.
///
/// `request_permission` models a user who accepts the prompt: `Default`
/// becomes `Granted`. A denial is sticky, as on most platforms.
#[derive(Debug)]
pub struct ConfiguredPermission {
    state: Mutex<Permission>,
}

impl ConfiguredPermission {
    pub fn new(initial: Permission) -> Self {
        Self {
            state: Mutex::new(initial),
        }
    }

    pub fn set(&self, permission: Permission) {
        match self.state.lock() {
            Ok(mut guard) => *guard = permission,
            Err(poisoned) => *poisoned.into_inner() = permission,
        }
    }

    fn get(&self) -> Permission {
        match self.state.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl PermissionSource for ConfiguredPermission {
    async fn query_permission(&self) -> Permission {
        self.get()
    }

    async fn request_permission(&self) -> Permission {
        if self.get() == Permission::Default {
            self.set(Permission::Granted);
        }
        self.get()
    }
}
