/// WALLET SIGNATURES
///
/// Sign-in proves wallet ownership with an ed25519 signature over a message
/// naming the wallet and the time it was issued. Keys and signatures travel
/// base58-encoded, the way Solana wallets emit them.

use chrono::{DateTime, Utc};
use dmind_core::{timestamp, WalletAddress};
use ed25519_dalek::{Signature, VerifyingKey};

use crate::error::AuthError;

/// How far `Issued At` may drift from the server clock
pub const SIGN_IN_WINDOW_SECS: i64 = 300;

const WALLET_LINE: &str = "Wallet: ";
const ISSUED_AT_LINE: &str = "Issued At: ";

/// The message a wallet signs to sign in
pub fn sign_in_message(wallet: &str, issued_at: DateTime<Utc>) -> String {
    format!(
        "Sign in to DecentraMind\n{}{}\n{}{}",
        WALLET_LINE,
        wallet,
        ISSUED_AT_LINE,
        timestamp::format(&issued_at)
    )
}

/// Check that `message` names `wallet` and was issued within the window,
/// returning the issue time
pub fn check_sign_in_message(
    wallet: &WalletAddress,
    message: &str,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, AuthError> {
    let named = message
        .lines()
        .filter_map(|line| line.trim().strip_prefix(WALLET_LINE))
        .any(|w| w.trim() == wallet.as_str());
    if !named {
        return Err(AuthError::InvalidSignature(
            "sign-in message does not name this wallet".to_string(),
        ));
    }

    let issued_at = message
        .lines()
        .find_map(|line| line.trim().strip_prefix(ISSUED_AT_LINE))
        .and_then(|raw| DateTime::parse_from_rfc3339(raw.trim()).ok())
        .map(|ts| ts.with_timezone(&Utc))
        .ok_or_else(|| AuthError::InvalidSignature("sign-in message has no valid Issued At line".to_string()))?;

    if (now - issued_at).num_seconds().abs() > SIGN_IN_WINDOW_SECS {
        return Err(AuthError::SignInExpired);
    }
    Ok(issued_at)
}

/// Verify a base58 ed25519 signature of `message` by `wallet`'s key
pub fn verify_wallet_signature(wallet: &WalletAddress, message: &str, signature: &str) -> Result<(), AuthError> {
    let key_bytes = bs58::decode(wallet.as_str())
        .into_vec()
        .map_err(|e| AuthError::InvalidSignature(format!("wallet is not base58: {}", e)))?;
    let key_bytes: [u8; 32] = key_bytes
        .try_into()
        .map_err(|_| AuthError::InvalidSignature("wallet is not a 32-byte public key".to_string()))?;
    let key = VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| AuthError::InvalidSignature(format!("wallet is not an ed25519 key: {}", e)))?;

    let sig_bytes = bs58::decode(signature)
        .into_vec()
        .map_err(|e| AuthError::InvalidSignature(format!("signature is not base58: {}", e)))?;
    let signature = Signature::from_slice(&sig_bytes)
        .map_err(|e| AuthError::InvalidSignature(format!("malformed signature: {}", e)))?;

    key.verify_strict(message.as_bytes(), &signature)
        .map_err(|_| AuthError::InvalidSignature("signature does not match wallet".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use ed25519_dalek::{Signer, SigningKey};

    fn keypair(seed: u8) -> (SigningKey, WalletAddress) {
        let key = SigningKey::from_bytes(&[seed; 32]);
        let wallet = bs58::encode(key.verifying_key().as_bytes()).into_string();
        (key, WalletAddress::parse(&wallet).unwrap())
    }

    fn sign(key: &SigningKey, message: &str) -> String {
        bs58::encode(key.sign(message.as_bytes()).to_bytes()).into_string()
    }

    #[test]
    fn test_valid_signature() {
        let (key, wallet) = keypair(7);
        let message = sign_in_message(wallet.as_str(), Utc::now());
        assert!(verify_wallet_signature(&wallet, &message, &sign(&key, &message)).is_ok());
    }

    #[test]
    fn test_signature_from_other_key_fails() {
        let (_, wallet) = keypair(7);
        let (other, _) = keypair(9);
        let message = sign_in_message(wallet.as_str(), Utc::now());
        let err = verify_wallet_signature(&wallet, &message, &sign(&other, &message)).unwrap_err();
        assert!(matches!(err, AuthError::InvalidSignature(_)));
        assert!(verify_wallet_signature(&wallet, &message, "0OIl").is_err());
    }

    #[test]
    fn test_message_window() {
        let (_, wallet) = keypair(3);
        let now = Utc::now();
        let fresh = sign_in_message(wallet.as_str(), now - Duration::seconds(60));
        assert!(check_sign_in_message(&wallet, &fresh, now).is_ok());

        let stale = sign_in_message(wallet.as_str(), now - Duration::minutes(10));
        assert_eq!(check_sign_in_message(&wallet, &stale, now).unwrap_err(), AuthError::SignInExpired);

        let (_, other) = keypair(4);
        let foreign = sign_in_message(other.as_str(), now);
        assert!(matches!(
            check_sign_in_message(&wallet, &foreign, now),
            Err(AuthError::InvalidSignature(_))
        ));
        assert!(check_sign_in_message(&wallet, "Wallet: nothing else", now).is_err());
    }
}
