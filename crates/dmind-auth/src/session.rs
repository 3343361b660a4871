/// WALLET SIGN-IN AND SESSIONS
///
/// Signing in checks a fresh signed message from the wallet, resolves the
/// role from held NFTs, upserts the user document and issues an HS256
/// session token. Each signature is accepted once. Revoked tokens are
/// tracked by fingerprint until they would have expired.

use chrono::{DateTime, Duration, TimeZone, Utc};
use dashmap::DashMap;
use dmind_core::{timestamp, AuthConfig, WalletAddress};
use dmind_state::{collections, encode_record, DocumentStore};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::info;

use crate::error::AuthError;
use crate::nft_ownership::{NftOwnershipFlags, NftOwnershipService};
use crate::roles::UserRole;
use crate::signature::{check_sign_in_message, verify_wallet_signature, SIGN_IN_WINDOW_SECS};

pub const WALLET_EMAIL_DOMAIN: &str = "wallet.decentramind.com";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecentraMindUser {
    pub uid: String,
    pub email: String,
    pub wallet_address: String,
    pub role: UserRole,
    pub nft_ownership: NftOwnershipFlags,
    pub profile: UserProfile,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub last_login_at: DateTime<Utc>,
    pub is_verified: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub role: UserRole,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

impl SessionClaims {
    /// The session must belong to `wallet`
    pub fn require_subject(&self, wallet: &str) -> Result<(), AuthError> {
        if self.sub == wallet {
            Ok(())
        } else {
            Err(AuthError::Forbidden(format!("session does not belong to {}", wallet)))
        }
    }

    pub fn require_role(&self, required: UserRole) -> Result<(), AuthError> {
        if self.role.satisfies(required) {
            Ok(())
        } else {
            Err(AuthError::Forbidden(format!("{} role required", required)))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    pub user: DecentraMindUser,
    pub token: String,
    #[serde(with = "timestamp")]
    pub expires_at: DateTime<Utc>,
}

pub struct AuthService {
    nft: Arc<NftOwnershipService>,
    store: Arc<dyn DocumentStore>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    ttl: Duration,
    /// Token fingerprint -> expiry (unix seconds)
    revoked: DashMap<String, i64>,
    /// Sign-in signature fingerprint -> end of its window (unix seconds)
    used_signatures: DashMap<String, i64>,
}

impl AuthService {
    pub fn new(config: &AuthConfig, nft: Arc<NftOwnershipService>, store: Arc<dyn DocumentStore>) -> Self {
        AuthService {
            nft,
            store,
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            issuer: config.issuer.clone(),
            ttl: Duration::hours(config.session_ttl_hours),
            revoked: DashMap::new(),
            used_signatures: DashMap::new(),
        }
    }

    pub fn nft_ownership(&self) -> &NftOwnershipService {
        &self.nft
    }

    /// Sign in with `signature`, the wallet's base58 ed25519 signature of
    /// `message` (see `sign_in_message`)
    pub async fn sign_in_with_wallet(
        &self,
        wallet_address: &str,
        message: &str,
        signature: &str,
    ) -> Result<AuthSession, AuthError> {
        let wallet = WalletAddress::parse(wallet_address)
            .map_err(|_| AuthError::InvalidWalletAddress(wallet_address.to_string()))?;
        let now = timestamp::now_millis();

        let issued_at = check_sign_in_message(&wallet, message, now)?;
        verify_wallet_signature(&wallet, message, signature)?;
        let window_end = (issued_at + Duration::seconds(SIGN_IN_WINDOW_SECS)).timestamp();
        if self
            .used_signatures
            .insert(fingerprint(signature), window_end)
            .is_some()
        {
            return Err(AuthError::SignatureReused);
        }

        let (role, nft_ownership) = self.nft.resolve(wallet.as_str()).await;

        let created_at = match self.user(wallet.as_str()).await? {
            Some(existing) => existing.created_at,
            None => now,
        };
        let user = DecentraMindUser {
            uid: wallet.as_str().to_string(),
            email: format!("{}@{}", wallet, WALLET_EMAIL_DOMAIN),
            wallet_address: wallet.as_str().to_string(),
            role,
            nft_ownership,
            profile: UserProfile {
                name: format!("Wallet {}", wallet.short()),
                avatar: None,
            },
            created_at,
            last_login_at: now,
            is_verified: true,
        };
        self.store
            .set(collections::USERS, wallet.as_str(), encode_record(&user)?)
            .await?;

        let (token, expires_at) = self.issue_token(wallet.as_str(), role, now)?;
        info!(wallet = %wallet, role = %role, "Wallet signed in");

        Ok(AuthSession { user, token, expires_at })
    }

    /// Sign a session token for `wallet` as of `issued_at`
    pub fn issue_token(&self, wallet: &str, role: UserRole, issued_at: DateTime<Utc>) -> Result<(String, DateTime<Utc>), AuthError> {
        let expires_at = issued_at + self.ttl;
        let claims = SessionClaims {
            sub: wallet.to_string(),
            role,
            iss: self.issuer.clone(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::TokenIssue(e.to_string()))?;
        Ok((token, expires_at))
    }

    /// Check signature, issuer, expiry and revocation
    pub fn verify_session(&self, token: &str) -> Result<SessionClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.issuer.as_str()]);
        let claims = decode::<SessionClaims>(token, &self.decoding_key, &validation)?.claims;
        if self.revoked.contains_key(&fingerprint(token)) {
            return Err(AuthError::SessionRevoked);
        }
        Ok(claims)
    }

    /// Revoke a valid session token
    pub fn sign_out(&self, token: &str) -> Result<(), AuthError> {
        let claims = self.verify_session(token)?;
        self.revoked.insert(fingerprint(token), claims.exp);
        info!(wallet = %claims.sub, "Wallet signed out");
        Ok(())
    }

    /// Drop revocations for tokens that have expired anyway, and used
    /// sign-in signatures whose messages are past their window
    pub fn purge_revoked(&self, now: DateTime<Utc>) -> usize {
        let still_live = |_: &String, exp: &mut i64| match Utc.timestamp_opt(*exp, 0).single() {
            Some(expiry) => expiry > now,
            None => false,
        };
        let before = self.revoked.len();
        self.revoked.retain(still_live);
        self.used_signatures.retain(still_live);
        before - self.revoked.len()
    }

    pub fn revoked_count(&self) -> usize {
        self.revoked.len()
    }

    pub async fn user(&self, wallet: &str) -> Result<Option<DecentraMindUser>, AuthError> {
        match self.store.get(collections::USERS, wallet).await? {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }
}

fn fingerprint(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
