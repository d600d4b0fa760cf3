//! Role → permission table and claim evaluation.
//!
//! The table is built once at startup and shared read-only. Permissions are
//! resolved into a token at issuance; [`has_role`] and [`has_permission`]
//! only look at the signed claims, so later table edits never reach tokens
//! already in circulation. Revoke and reissue to apply them.

use serde::{Deserialize, Serialize};

use crate::models::auth::SessionClaims;

/// One entry of the role table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// On-disk shape of the role table file.
#[derive(Debug, Deserialize)]
struct RoleFile {
    roles: Vec<RoleConfig>,
}

/// Ordered, immutable role → permissions table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleTable {
    roles: Vec<RoleConfig>,
}

impl RoleTable {
    pub fn new(roles: Vec<RoleConfig>) -> Self {
        Self { roles }
    }

    /// Parse a YAML document of the form `roles: [{name, permissions}]`.
    pub fn from_yaml(doc: &str) -> Result<Self, serde_yaml::Error> {
        let file: RoleFile = serde_yaml::from_str(doc)?;
        Ok(Self::new(file.roles))
    }

    /// Built-in table used when no role file is configured.
    pub fn builtin() -> Self {
        let perms = |names: &[&str]| names.iter().map(|n| n.to_string()).collect();
        Self::new(vec![
            RoleConfig {
                name: "USER".into(),
                description: Some("Regular user".into()),
                permissions: perms(&["READ"]),
            },
            RoleConfig {
                name: "ADMIN".into(),
                description: Some("Administrator".into()),
                permissions: perms(&["READ", "WRITE", "DELETE", "MANAGE_USERS"]),
            },
        ])
    }

    pub fn roles(&self) -> &[RoleConfig] {
        &self.roles
    }

    pub fn contains_role(&self, name: &str) -> bool {
        self.roles.iter().any(|r| r.name == name)
    }

    /// Deduplicated union of the permissions of `granted` roles.
    ///
    /// Order follows the table, then each role's permission list. Unknown
    /// role names contribute nothing.
    pub fn permissions_for(&self, granted: &[String]) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for role in self.roles.iter().filter(|r| granted.contains(&r.name)) {
            for permission in &role.permissions {
                if !out.contains(permission) {
                    out.push(permission.clone());
                }
            }
        }
        out
    }
}

impl Default for RoleTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Whether the verified claims carry `role`.
pub fn has_role(claims: &SessionClaims, role: &str) -> bool {
    claims.roles.iter().any(|r| r == role)
}

/// Whether the verified claims carry `permission`.
pub fn has_permission(claims: &SessionClaims, permission: &str) -> bool {
    claims.permissions.iter().any(|p| p == permission)
}
