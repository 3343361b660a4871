/// ROLE MODEL
///
/// Roles are granted by holding role NFTs. The hierarchy is
/// guest < patient < provider < admin; a higher role satisfies any check for
/// a lower one.

use dmind_core::SolanaConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AuthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Guest,
    Patient,
    Provider,
    Admin,
}

impl UserRole {
    pub fn level(&self) -> u8 {
        *self as u8
    }

    pub fn satisfies(&self, required: UserRole) -> bool {
        *self >= required
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Guest => "guest",
            UserRole::Patient => "patient",
            UserRole::Provider => "provider",
            UserRole::Admin => "admin",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "guest" => Ok(UserRole::Guest),
            "patient" => Ok(UserRole::Patient),
            "provider" => Ok(UserRole::Provider),
            "admin" => Ok(UserRole::Admin),
            other => Err(AuthError::UnknownRole(other.to_string())),
        }
    }
}

/// Mint addresses of the three role NFTs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleNftContracts {
    pub care_orchestrator_nft: String,
    pub dmtx_dao_token: String,
    pub patient_nft: String,
}

impl RoleNftContracts {
    pub fn from_config(config: &SolanaConfig) -> Self {
        RoleNftContracts {
            care_orchestrator_nft: config.care_orchestrator_mint.clone(),
            dmtx_dao_token: config.dmtx_dao_mint.clone(),
            patient_nft: config.patient_mint.clone(),
        }
    }

    /// Role-granting mints, highest role first
    pub fn by_priority(&self) -> [(UserRole, &str); 3] {
        [
            (UserRole::Admin, self.dmtx_dao_token.as_str()),
            (UserRole::Provider, self.care_orchestrator_nft.as_str()),
            (UserRole::Patient, self.patient_nft.as_str()),
        ]
    }

    pub fn all_mints(&self) -> Vec<String> {
        vec![
            self.care_orchestrator_nft.clone(),
            self.dmtx_dao_token.clone(),
            self.patient_nft.clone(),
        ]
    }

    /// Role granted by a mint; unknown mints grant `guest`
    pub fn role_for_mint(&self, mint: &str) -> UserRole {
        self.by_priority()
            .iter()
            .find(|(_, m)| *m == mint)
            .map(|(role, _)| *role)
            .unwrap_or(UserRole::Guest)
    }

    pub fn required_mints_for_role(&self, role: UserRole) -> Vec<String> {
        self.by_priority()
            .iter()
            .filter(|(r, _)| *r == role)
            .map(|(_, m)| m.to_string())
            .collect()
    }
}
