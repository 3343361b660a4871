/// DECENTRAMIND AUTH
///
/// Wallet identity for the platform:
/// - Role NFTs mapped onto an admin > provider > patient > guest hierarchy
/// - Token account lookups over Solana JSON-RPC
/// - Wallet sign-in proven by an ed25519 signature
/// - HS256 session tokens with revocation

pub mod error;
pub mod nft_ownership;
pub mod roles;
pub mod session;
pub mod signature;
pub mod solana;

pub use error::AuthError;
pub use nft_ownership::{NftOwnership, NftOwnershipFlags, NftOwnershipService, RoleNft};
pub use roles::{RoleNftContracts, UserRole};
pub use session::{AuthService, AuthSession, DecentraMindUser, SessionClaims, UserProfile};
pub use signature::{check_sign_in_message, sign_in_message, verify_wallet_signature, SIGN_IN_WINDOW_SECS};
pub use solana::{RpcError, SolanaRpcClient, TokenAccount, TokenAccountSource, SPL_TOKEN_PROGRAM_ID};
