use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub user_metadata: Option<serde_json::Value>,
    pub aud: Option<String>,
    pub iat: Option<u64>,
}

/// Role of the caller as resolved by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Patient,
    Doctor,
    Receptionist,
    Admin,
}

impl ActorRole {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "patient" => Some(ActorRole::Patient),
            "doctor" => Some(ActorRole::Doctor),
            "receptionist" => Some(ActorRole::Receptionist),
            "admin" => Some(ActorRole::Admin),
            _ => None,
        }
    }

    /// Staff can act on appointments they are not a party to.
    pub fn is_staff(self) -> bool {
        matches!(self, ActorRole::Receptionist | ActorRole::Admin)
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActorRole::Patient => write!(f, "patient"),
            ActorRole::Doctor => write!(f, "doctor"),
            ActorRole::Receptionist => write!(f, "receptionist"),
            ActorRole::Admin => write!(f, "admin"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn actor_role(&self) -> Option<ActorRole> {
        self.role.as_deref().and_then(ActorRole::parse)
    }

    pub fn has_role(&self, role: ActorRole) -> bool {
        self.actor_role() == Some(role)
    }
}
