use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Role of an authenticated caller, resolved upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorRole {
    Customer,
    Doctor,
    Admin,
}

impl FromStr for ActorRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "CUSTOMER" | "PET_OWNER" => Ok(ActorRole::Customer),
            "DOCTOR" => Ok(ActorRole::Doctor),
            "ADMIN" => Ok(ActorRole::Admin),
            other => Err(format!("Unknown actor role: {}", other)),
        }
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActorRole::Customer => "CUSTOMER",
            ActorRole::Doctor => "DOCTOR",
            ActorRole::Admin => "ADMIN",
        };
        f.write_str(s)
    }
}

/// Caller identity passed explicitly into every core operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(id: Uuid, role: ActorRole) -> Self {
        Self { id, role }
    }

    pub fn customer(id: Uuid) -> Self {
        Self::new(id, ActorRole::Customer)
    }

    pub fn doctor(id: Uuid) -> Self {
        Self::new(id, ActorRole::Doctor)
    }

    pub fn admin(id: Uuid) -> Self {
        Self::new(id, ActorRole::Admin)
    }

    pub fn is_admin(&self) -> bool {
        self.role == ActorRole::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing_accepts_pet_owner_alias() {
        assert_eq!("pet_owner".parse::<ActorRole>().unwrap(), ActorRole::Customer);
        assert_eq!("Doctor".parse::<ActorRole>().unwrap(), ActorRole::Doctor);
        assert!("vet".parse::<ActorRole>().is_err());
    }
}
