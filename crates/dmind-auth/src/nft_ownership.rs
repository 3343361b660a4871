/// NFT OWNERSHIP
///
/// Resolves roles from the role NFTs a wallet holds. Lookup failures are
/// logged and treated as "owns nothing", so an unreachable RPC node yields
/// `guest` rather than an error.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::roles::{RoleNftContracts, UserRole};
use crate::solana::TokenAccountSource;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NftOwnership {
    pub mint: String,
    pub owner: String,
    pub token_account: String,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleNft {
    #[serde(flatten)]
    pub ownership: NftOwnership,
    pub role: UserRole,
}

/// Which role NFTs a wallet currently holds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NftOwnershipFlags {
    pub care_orchestrator_nft: bool,
    pub dmtx_dao_token: bool,
    pub patient_nft: bool,
}

pub struct NftOwnershipService {
    source: Arc<dyn TokenAccountSource>,
    contracts: RoleNftContracts,
}

impl NftOwnershipService {
    pub fn new(source: Arc<dyn TokenAccountSource>, contracts: RoleNftContracts) -> Self {
        NftOwnershipService { source, contracts }
    }

    pub fn contracts(&self) -> &RoleNftContracts {
        &self.contracts
    }

    /// Token accounts of `wallet` whose mint is one of `mints`
    pub async fn check_nft_ownership(&self, wallet: &str, mints: &[String]) -> Vec<NftOwnership> {
        match self.source.token_accounts_by_owner(wallet).await {
            Ok(accounts) => accounts
                .into_iter()
                .filter(|a| mints.iter().any(|m| *m == a.mint))
                .map(|a| NftOwnership {
                    mint: a.mint,
                    owner: wallet.to_string(),
                    token_account: a.pubkey,
                    amount: a.amount,
                })
                .collect(),
            Err(e) => {
                warn!(wallet, error = %e, "Error checking NFT ownership");
                Vec::new()
            }
        }
    }

    async fn role_holdings(&self, wallet: &str) -> Vec<NftOwnership> {
        self.check_nft_ownership(wallet, &self.contracts.all_mints()).await
    }

    fn holds(owned: &[NftOwnership], mint: &str) -> bool {
        owned.iter().any(|n| n.mint == mint && n.amount > 0)
    }

    fn role_from_holdings(&self, owned: &[NftOwnership]) -> UserRole {
        self.contracts
            .by_priority()
            .iter()
            .find(|(_, mint)| Self::holds(owned, mint))
            .map(|(role, _)| *role)
            .unwrap_or(UserRole::Guest)
    }

    fn flags_from_holdings(&self, owned: &[NftOwnership]) -> NftOwnershipFlags {
        NftOwnershipFlags {
            care_orchestrator_nft: Self::holds(owned, &self.contracts.care_orchestrator_nft),
            dmtx_dao_token: Self::holds(owned, &self.contracts.dmtx_dao_token),
            patient_nft: Self::holds(owned, &self.contracts.patient_nft),
        }
    }

    /// Highest role granted by a held NFT
    pub async fn user_role_from_nfts(&self, wallet: &str) -> UserRole {
        let role = self.role_from_holdings(&self.role_holdings(wallet).await);
        debug!(wallet, role = %role, "Resolved role from NFTs");
        role
    }

    /// Role and ownership flags from a single lookup
    pub async fn resolve(&self, wallet: &str) -> (UserRole, NftOwnershipFlags) {
        let owned = self.role_holdings(wallet).await;
        (self.role_from_holdings(&owned), self.flags_from_holdings(&owned))
    }

    pub async fn ownership_flags(&self, wallet: &str) -> NftOwnershipFlags {
        self.flags_from_holdings(&self.role_holdings(wallet).await)
    }

    pub async fn verify_nft_ownership(&self, wallet: &str, mint: &str) -> bool {
        let owned = self.check_nft_ownership(wallet, &[mint.to_string()]).await;
        Self::holds(&owned, mint)
    }

    pub async fn all_role_nfts(&self, wallet: &str) -> Vec<RoleNft> {
        self.role_holdings(wallet)
            .await
            .into_iter()
            .map(|ownership| RoleNft {
                role: self.contracts.role_for_mint(&ownership.mint),
                ownership,
            })
            .collect()
    }

    pub async fn has_role_access(&self, wallet: &str, required: UserRole) -> bool {
        self.user_role_from_nfts(wallet).await.satisfies(required)
    }
}
