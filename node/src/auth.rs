//! # Request Authentication
//!
//! Two kinds of bearer token guard the mutating endpoints:
//!
//! - the **admin token**, configured at startup, for `/deposit` and
//!   `/finalize`;
//! - an **account key** per address, for `/purchase` and `/transfer`, which
//!   move value or tokens out of that address.
//!
//! Account keys are not stored. Each one is a BLAKE3 keyed hash of the
//! address under a key derived from the admin token, so the node can check
//! any of them and hand one out with each deposit. Comparisons go through
//! [`blake3::Hash`], whose equality is constant time.

use axum::http::{header::AUTHORIZATION, HeaderMap};

use tokensale_contracts::Address;

/// Context string for the account-key derivation.
const ACCOUNT_KEY_CONTEXT: &str = "tokensale-node 2026-10 account key";

/// Why a request was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No `Authorization: Bearer ...` header.
    #[error("missing bearer token")]
    MissingToken,

    /// The admin token did not match.
    #[error("invalid admin token")]
    InvalidAdminToken,

    /// The account key does not belong to the named account.
    #[error("invalid account key for {0}")]
    InvalidAccountKey(Address),
}

/// Credentials checked by the API.
#[derive(Clone)]
pub struct ApiAuth {
    admin_digest: blake3::Hash,
    account_key: [u8; 32],
}

impl ApiAuth {
    pub fn new(admin_token: &str) -> Self {
        Self {
            admin_digest: blake3::hash(admin_token.as_bytes()),
            account_key: blake3::derive_key(ACCOUNT_KEY_CONTEXT, admin_token.as_bytes()),
        }
    }

    /// The bearer token that authorizes spending from `account`, as hex.
    pub fn account_token(&self, account: &Address) -> String {
        self.account_digest(account).to_hex().to_string()
    }

    /// Accepts the request only if it carries the admin token.
    pub fn require_admin(&self, headers: &HeaderMap) -> Result<(), AuthError> {
        let token = bearer(headers)?;
        if blake3::hash(token.as_bytes()) == self.admin_digest {
            Ok(())
        } else {
            Err(AuthError::InvalidAdminToken)
        }
    }

    /// Accepts the request only if it carries `account`'s key.
    pub fn require_account(&self, headers: &HeaderMap, account: &Address) -> Result<(), AuthError> {
        let token = bearer(headers)?;
        let presented =
            blake3::Hash::from_hex(token).map_err(|_| AuthError::InvalidAccountKey(*account))?;
        if presented == self.account_digest(account) {
            Ok(())
        } else {
            Err(AuthError::InvalidAccountKey(*account))
        }
    }

    fn account_digest(&self, account: &Address) -> blake3::Hash {
        blake3::keyed_hash(&self.account_key, account.as_bytes())
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` header.
fn bearer(headers: &HeaderMap) -> Result<&str, AuthError> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingToken)
}
