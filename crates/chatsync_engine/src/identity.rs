//! Identity of the signed-in user.

use parking_lot::RwLock;

/// Source of the current user's identity.
///
/// Remote reads and writes only happen while a user id is available.
pub trait IdentityProvider: Send + Sync {
    /// Returns the signed-in user's id, or `None` when signed out.
    fn current_user_id(&self) -> Option<String>;
}

/// Identity that can be switched at runtime.
#[derive(Debug, Default)]
pub struct StaticIdentity {
    user_id: RwLock<Option<String>>,
}

impl StaticIdentity {
    /// Creates an identity for a signed-in user.
    pub fn signed_in(user_id: impl Into<String>) -> Self {
        Self {
            user_id: RwLock::new(Some(user_id.into())),
        }
    }

    /// Creates an anonymous identity.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Signs a user in, replacing any current user.
    pub fn sign_in(&self, user_id: impl Into<String>) {
        *self.user_id.write() = Some(user_id.into());
    }

    /// Signs the current user out.
    pub fn sign_out(&self) {
        *self.user_id.write() = None;
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_user_id(&self) -> Option<String> {
        self.user_id.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_in_and_out() {
        let identity = StaticIdentity::anonymous();
        assert!(identity.current_user_id().is_none());

        identity.sign_in("user-1");
        assert_eq!(identity.current_user_id().as_deref(), Some("user-1"));

        identity.sign_out();
        assert!(identity.current_user_id().is_none());
    }

    #[test]
    fn signed_in_identity() {
        let identity = StaticIdentity::signed_in("user-2");
        assert_eq!(identity.current_user_id().as_deref(), Some("user-2"));
    }
}
