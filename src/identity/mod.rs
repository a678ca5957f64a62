//! Pseudonymous user identity.
//!
//! The identity of a signal is resolved in this order:
//!
//! 1. the user passed explicitly with the call
//! 2. the configured default user
//! 3. a random identifier generated once and kept in a local file
//!
//! Whatever wins is never sent as-is. [`hash_identity`] appends the salt and
//! sends only the SHA-256 digest. Changing the salt changes every user's
//! apparent identity, permanently.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Resolves the raw (unhashed) user identifier for a signal.
pub trait IdentityProvider: Send + Sync {
    /// Resolve the identifier to use.
    fn calculate_identity(&self, explicit_user: Option<&str>, default_user: Option<&str>)
        -> String;

    /// Forget the stored anonymous identifier. The next resolution makes a new one.
    fn reset_identity(&self);
}

/// Hash a resolved identifier with the configured salt.
///
/// Output is the lowercase hex SHA-256 of `identity + salt`.
pub fn hash_identity(identity: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(identity.as_bytes());
    hasher.update(salt.as_bytes());
    hex::encode(hasher.finalize())
}

/// Identity provider backed by a single file holding the anonymous identifier.
pub struct FileIdentityProvider {
    path: PathBuf,
    cached: Mutex<Option<String>>,
}

impl FileIdentityProvider {
    /// Create a provider storing its identifier at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: Mutex::new(None),
        }
    }

    /// Location of the identifier file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the stored anonymous identifier, creating it on first use.
    pub fn stable_identifier(&self) -> String {
        let mut cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(ref id) = *cached {
            return id.clone();
        }

        let id = match self.read_stored() {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4().to_string().to_uppercase();
                self.write_stored(&id);
                id
            }
        };

        *cached = Some(id.clone());
        id
    }

    fn read_stored(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => {
                let id = content.trim();
                if id.is_empty() {
                    None
                } else {
                    Some(id.to_string())
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Could not read identity file");
                None
            }
        }
    }

    fn write_stored(&self, id: &str) {
        let result = self
            .path
            .parent()
            .map(std::fs::create_dir_all)
            .unwrap_or(Ok(()))
            .and_then(|_| std::fs::write(&self.path, id));

        match result {
            Ok(()) => debug!(path = %self.path.display(), "Created anonymous identifier"),
            // Still usable for this process, just not stable across restarts.
            Err(e) => warn!(path = %self.path.display(), error = %e, "Could not persist identity"),
        }
    }
}

impl IdentityProvider for FileIdentityProvider {
    fn calculate_identity(
        &self,
        explicit_user: Option<&str>,
        default_user: Option<&str>,
    ) -> String {
        if let Some(user) = explicit_user.filter(|u| !u.is_empty()) {
            return user.to_string();
        }
        if let Some(user) = default_user.filter(|u| !u.is_empty()) {
            return user.to_string();
        }
        self.stable_identifier()
    }

    fn reset_identity(&self) {
        let mut cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());
        *cached = None;

        match std::fs::remove_file(&self.path) {
            Ok(()) => info!("Anonymous identifier reset"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Could not delete identity file"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_hash_known_vector() {
        assert_eq!(
            hash_identity("clientUser", ""),
            "6721870580401922549fe8fdb09a064dba5b8792fa018d3bd9ffa90fe37a0149"
        );
    }

    #[test]
    fn test_salt_changes_hash() {
        let plain = hash_identity("clientUser", "");
        let salted = hash_identity("clientUser", "pepper");
        assert_ne!(plain, salted);
        assert_eq!(salted, hash_identity("clientUserpepper", ""));
        assert_eq!(salted.len(), 64);
        assert!(salted.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_resolution_order() {
        let tmp = TempDir::new().unwrap();
        let provider = FileIdentityProvider::new(tmp.path().join("identity"));

        assert_eq!(
            provider.calculate_identity(Some("explicit"), Some("default")),
            "explicit"
        );
        assert_eq!(provider.calculate_identity(None, Some("default")), "default");
        assert_eq!(provider.calculate_identity(Some(""), Some("default")), "default");

        let anonymous = provider.calculate_identity(None, None);
        assert!(!anonymous.is_empty());
        assert_ne!(anonymous, "default");
    }

    #[test]
    fn test_stable_across_instances() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("identity");

        let first = FileIdentityProvider::new(&path).calculate_identity(None, None);
        let second = FileIdentityProvider::new(&path).calculate_identity(None, None);
        assert_eq!(first, second);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), first);
    }

    #[test]
    fn test_reset_regenerates() {
        let tmp = TempDir::new().unwrap();
        let provider = FileIdentityProvider::new(tmp.path().join("identity"));

        let first = provider.calculate_identity(None, None);
        let second = provider.calculate_identity(None, None);
        assert_eq!(first, second);

        provider.reset_identity();
        assert!(!provider.path().exists());

        let third = provider.calculate_identity(None, None);
        assert_ne!(first, third);
    }

    #[test]
    fn test_unwritable_location_still_resolves() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, "x").unwrap();

        // Parent is a regular file, so the identifier cannot be persisted.
        let provider = FileIdentityProvider::new(blocker.join("identity"));
        let first = provider.calculate_identity(None, None);
        let second = provider.calculate_identity(None, None);
        assert_eq!(first, second);
    }
}
