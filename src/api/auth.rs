//! User and claim store.
//!
//! A JSON document of the form:
//!
//! ```text
//! { "users": { "bob": { "password": "pass", "claims": ["inventory:write", "all:read"] } } }
//! ```
//!
//! A claim is `<stream>:<read|write>`. `all` matches every stream and write
//! access implies read access.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Login of the administrator in the default document.
pub const DEFAULT_LOGIN: &str = "admin";

/// Password of the administrator in the default document.
pub const DEFAULT_PASSWORD: &str = "password";

/// Stream name that matches every stream in a claim.
pub const ALL_STREAMS: &str = "all";

/// Access level of a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Access {
    /// Subscribe and read cached data.
    Read,
    /// Publish; implies read.
    Write,
}

/// A single user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub password: String,
    #[serde(default)]
    pub claims: Vec<String>,
}

/// All users of the system.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthData {
    #[serde(default)]
    pub users: BTreeMap<String, UserInfo>,
}

impl AuthData {
    /// Document with one administrator allowed to write everywhere.
    pub fn with_default_admin() -> Self {
        let mut data = Self::default();
        data.users.insert(
            DEFAULT_LOGIN.to_string(),
            UserInfo {
                password: DEFAULT_PASSWORD.to_string(),
                claims: vec![format!("{}:write", ALL_STREAMS)],
            },
        );
        data
    }

    /// Serialize to pretty JSON.
    pub fn serialize(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Parse a JSON document.
    pub fn deserialize(source: &str) -> serde_json::Result<Self> {
        serde_json::from_str(source)
    }

    /// Look up `login` and check its password.
    pub fn authenticate(&self, login: &str, password: &str) -> Option<&UserInfo> {
        self.users.get(login).filter(|u| u.password == password)
    }
}

impl UserInfo {
    /// Whether any claim grants `access` on `stream`.
    pub fn has_claim(&self, stream: &str, access: Access) -> bool {
        self.claims.iter().filter_map(|c| parse_claim(c)).any(|(s, granted)| {
            (s == ALL_STREAMS || s == stream) && granted >= access
        })
    }
}

fn parse_claim(claim: &str) -> Option<(&str, Access)> {
    let (stream, access) = claim.rsplit_once(':')?;
    let access = match access {
        "read" => Access::Read,
        "write" => Access::Write,
        _ => return None,
    };
    Some((stream, access))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_admin_writes_everywhere() {
        let data = AuthData::with_default_admin();
        let admin = data.authenticate(DEFAULT_LOGIN, DEFAULT_PASSWORD).unwrap();
        assert!(admin.has_claim("inventory", Access::Write));
        assert!(admin.has_claim("orders", Access::Read));
        assert!(data.authenticate(DEFAULT_LOGIN, "wrong").is_none());
    }

    #[test]
    fn test_parse_document() {
        let data = AuthData::deserialize(
            r#"{"users": {"bob": {"password": "pass", "claims": ["inventory:write", "all:read", "bogus"]}}}"#,
        )
        .unwrap();
        let bob = data.authenticate("bob", "pass").unwrap();
        assert!(bob.has_claim("inventory", Access::Write));
        assert!(bob.has_claim("orders", Access::Read));
        assert!(!bob.has_claim("orders", Access::Write));

        let again = AuthData::deserialize(&data.serialize().unwrap()).unwrap();
        assert_eq!(again, data);
    }
}
