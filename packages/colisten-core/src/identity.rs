//! Local user identity derived from on-device credential state.

use rand::Rng;

use crate::protocol_constants::{GUEST_ID_PREFIX, GUEST_NAME, USER_ID_HASH_LEN};

/// An account remembered by the credential store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredAccount {
    pub name: String,
    pub avatar_url: String,
}

/// Read-only view of the device's credential storage.
pub trait CredentialSource: Send + Sync {
    /// Raw cookie header of the signed-in user, if any.
    fn cookies(&self) -> Option<String>;

    /// Accounts in the order the credential store lists them.
    fn stored_accounts(&self) -> Vec<StoredAccount>;
}

/// Fixed credentials, for headless use and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    pub cookies: Option<String>,
    pub accounts: Vec<StoredAccount>,
}

impl StaticCredentials {
    /// No cookies and no accounts: resolves to a random guest.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }
}

impl CredentialSource for StaticCredentials {
    fn cookies(&self) -> Option<String> {
        self.cookies.clone()
    }

    fn stored_accounts(&self) -> Vec<StoredAccount> {
        self.accounts.clone()
    }
}

/// Who this device is within a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIdentity {
    pub user_id: String,
    pub display_name: String,
    pub avatar_url: String,
}

/// Derives a [`LocalIdentity`] from a [`CredentialSource`].
pub struct IdentityResolver;

impl IdentityResolver {
    /// Resolves the local identity.
    ///
    /// The id is stable for a given cookie string (truncated md5 hex digest).
    /// Without cookies a random `guest_NNNN` id is generated, so two
    /// anonymous devices may collide.
    pub fn resolve(source: &dyn CredentialSource) -> LocalIdentity {
        let user_id = source
            .cookies()
            .filter(|c| !c.trim().is_empty())
            .map(|c| hash_user_id(&c))
            .unwrap_or_else(random_guest_id);

        let first = source.stored_accounts().into_iter().next();
        let (display_name, avatar_url) = match first {
            Some(account) => (account.name, account.avatar_url),
            None => (GUEST_NAME.to_string(), String::new()),
        };

        log::debug!("[Identity] Resolved local user {}", user_id);

        LocalIdentity {
            user_id,
            display_name,
            avatar_url,
        }
    }
}

fn hash_user_id(cookies: &str) -> String {
    let digest = format!("{:x}", md5::compute(cookies.as_bytes()));
    digest[..USER_ID_HASH_LEN].to_string()
}

fn random_guest_id() -> String {
    let n: u16 = rand::thread_rng().gen_range(1000..=9999);
    format!("{}{}", GUEST_ID_PREFIX, n)
}
