//! Authentication: turning a bearer credential into a [`UserId`].
//!
//! The pipeline only depends on the [`Authenticator`] trait. The bundled
//! [`TokenAuthenticator`] issues and verifies self-contained tokens keyed by
//! the master token key; deployments with an external login system plug in
//! their own implementation.
//!
//! A token only proves who the caller is. Whether that user still exists and
//! which methods they may call comes from their user record, checked by the
//! pipeline's scope stage.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use keyward_core::{KeyConfig, MacDomain, MessageAuthenticator, UserId};
use rand::RngCore;
use thiserror::Error;

/// Length of the random nonce embedded in a token.
pub const TOKEN_NONCE_LEN: usize = 16;

/// The credential attached to a call.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Bearer(String),
    Anonymous,
}

impl Credential {
    pub fn bearer(token: impl Into<String>) -> Self {
        Credential::Bearer(token.into())
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::Bearer(_) => f.write_str("Bearer(<redacted>)"),
            Credential::Anonymous => f.write_str("Anonymous"),
        }
    }
}

/// Why a credential was rejected.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no credential supplied")]
    MissingCredential,

    #[error("malformed token: {0}")]
    Malformed(&'static str),

    #[error("token verification failed")]
    InvalidToken,

    /// The credential verified but names a user with no record.
    #[error("unknown user")]
    UnknownUser,
}

/// Resolves a credential to the calling user.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Authenticate `credential`.
    ///
    /// # Returns
    /// The caller's user id, or the reason the credential was rejected.
    async fn authenticate(&self, credential: &Credential) -> Result<UserId, AuthError>;

    /// Mint a credential for a newly created user.
    ///
    /// Authenticators backed by an external login system return `None`; the
    /// user then obtains a credential from that system.
    fn issue_credential(&self, _user_id: &UserId) -> Option<Credential> {
        None
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Token Authenticator
// ─────────────────────────────────────────────────────────────────────────────

/// Stateless bearer tokens of the form
/// `base64url(user_id) "." base64url(nonce) "." base64url(tag)`.
///
/// The tag is the token-domain MAC under the master token key over
/// `nonce || user_id`. Tokens do not expire.
#[derive(Debug)]
pub struct TokenAuthenticator {
    mac: MessageAuthenticator,
}

impl TokenAuthenticator {
    pub fn new(keys: &KeyConfig) -> Self {
        Self {
            mac: MessageAuthenticator::new(keys.tek(), MacDomain::Token),
        }
    }

    /// Issue a token for `user_id`.
    pub fn issue(&self, user_id: &UserId) -> String {
        let mut nonce = [0u8; TOKEN_NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);
        let tag = self.mac.tag(&nonce, user_id.as_bytes());
        format!(
            "{}.{}.{}",
            URL_SAFE_NO_PAD.encode(user_id.as_bytes()),
            URL_SAFE_NO_PAD.encode(nonce),
            URL_SAFE_NO_PAD.encode(tag.as_bytes()),
        )
    }

    /// Verify a token and return the user it was issued to.
    pub fn verify(&self, token: &str) -> Result<UserId, AuthError> {
        let mut parts = token.split('.');
        let (Some(user), Some(nonce), Some(tag), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::Malformed("expected three segments"));
        };

        let user = decode(user)?;
        let nonce = decode(nonce)?;
        let tag = decode(tag)?;
        if nonce.len() != TOKEN_NONCE_LEN {
            return Err(AuthError::Malformed("bad nonce length"));
        }
        let user_id =
            UserId::try_from(user.as_slice()).map_err(|_| AuthError::Malformed("bad user id"))?;

        if !self.mac.verify(&nonce, user_id.as_bytes(), &tag) {
            return Err(AuthError::InvalidToken);
        }
        Ok(user_id)
    }
}

fn decode(segment: &str) -> Result<Vec<u8>, AuthError> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| AuthError::Malformed("bad base64"))
}

#[async_trait]
impl Authenticator for TokenAuthenticator {
    async fn authenticate(&self, credential: &Credential) -> Result<UserId, AuthError> {
        match credential {
            Credential::Bearer(token) => self.verify(token),
            Credential::Anonymous => Err(AuthError::MissingCredential),
        }
    }

    fn issue_credential(&self, user_id: &UserId) -> Option<Credential> {
        Some(Credential::bearer(self.issue(user_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_then_verify() {
        let auth = TokenAuthenticator::new(&KeyConfig::generate());
        let user = UserId::generate();
        let token = auth.issue(&user);
        assert_eq!(auth.verify(&token).unwrap(), user);
    }

    #[test]
    fn test_tokens_are_unique() {
        let auth = TokenAuthenticator::new(&KeyConfig::generate());
        let user = UserId::generate();
        assert_ne!(auth.issue(&user), auth.issue(&user));
    }

    #[test]
    fn test_swapped_user_rejected() {
        let auth = TokenAuthenticator::new(&KeyConfig::generate());
        let token = auth.issue(&UserId::generate());
        let other = URL_SAFE_NO_PAD.encode(UserId::generate().as_bytes());

        let rest = token.split_once('.').unwrap().1;
        let forged = format!("{other}.{rest}");
        assert!(matches!(auth.verify(&forged), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_other_key_rejected() {
        let issuer = TokenAuthenticator::new(&KeyConfig::generate());
        let verifier = TokenAuthenticator::new(&KeyConfig::generate());
        let token = issuer.issue(&UserId::generate());
        assert!(matches!(verifier.verify(&token), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_malformed_tokens() {
        let auth = TokenAuthenticator::new(&KeyConfig::generate());
        for token in ["", "abc", "a.b", "a.b.c.d", "!!.!!.!!"] {
            assert!(
                matches!(auth.verify(token), Err(AuthError::Malformed(_))),
                "{token:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_anonymous_rejected() {
        let auth = TokenAuthenticator::new(&KeyConfig::generate());
        assert!(matches!(
            auth.authenticate(&Credential::Anonymous).await,
            Err(AuthError::MissingCredential)
        ));
    }

    #[tokio::test]
    async fn test_issued_credential_authenticates() {
        let auth = TokenAuthenticator::new(&KeyConfig::generate());
        let user = UserId::generate();

        let credential = auth.issue_credential(&user).unwrap();
        assert_eq!(auth.authenticate(&credential).await.unwrap(), user);
    }

    #[test]
    fn test_credential_debug_redacts() {
        let c = Credential::bearer("secret-token");
        assert!(!format!("{c:?}").contains("secret"));
    }
}
