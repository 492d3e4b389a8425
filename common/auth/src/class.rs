use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Authentication domains that keep a locally stored token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserClass {
    Admin,
    Lawyer,
}

impl UserClass {
    pub const ALL: [UserClass; 2] = [UserClass::Admin, UserClass::Lawyer];

    pub fn as_str(&self) -> &'static str {
        match self {
            UserClass::Admin => "admin",
            UserClass::Lawyer => "lawyer",
        }
    }
}

impl fmt::Display for UserClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserClass {
    type Err = AuthError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(UserClass::Admin),
            "lawyer" => Ok(UserClass::Lawyer),
            other => Err(AuthError::UnknownClass(other.to_string())),
        }
    }
}

/// Classification of the principal behind a backend session. Derived on
/// every detection cycle, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Guest,
    User,
    Lawyer,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Guest => "guest",
            UserType::User => "user",
            UserType::Lawyer => "lawyer",
        }
    }

    pub fn is_authenticated(&self) -> bool {
        !matches!(self, UserType::Guest)
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
