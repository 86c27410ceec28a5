//! Per-domain signing secret resolution and administration.
//!
//! One plain-text file per domain under the secrets directory, fronted by
//! an in-memory read-through cache. Secrets are never created implicitly
//! in the read path; provisioning is an explicit administrative operation.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use dashmap::DashMap;
use rand::RngCore;
use rand::rngs::OsRng;

use crate::domain::{Domain, LOCALHOST};
use crate::error::{Result, ServerError};

/// Well-known secret served for `localhost` outside production.
const LOCALHOST_SECRET: &str = "nicefox-dev-secret-do-not-use-in-production";

/// Entropy of generated secrets, in bytes.
const SECRET_LENGTH: usize = 32;

/// Resolves, caches and administers per-domain signing secrets.
pub struct SecretStore {
    dir: PathBuf,
    production: bool,
    cache: DashMap<String, String>,
    /// Serializes administrative file mutations. Reads go through `cache`
    /// without blocking each other.
    admin: Mutex<()>,
}

impl SecretStore {
    /// Open the store over `dir`, creating the directory owner-only if it
    /// does not exist yet.
    pub fn new(dir: impl Into<PathBuf>, production: bool) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&dir, fs::Permissions::from_mode(0o700))?;
        }

        Ok(Self {
            dir,
            production,
            cache: DashMap::new(),
            admin: Mutex::new(()),
        })
    }

    /// Resolve the signing secret for a raw domain string.
    ///
    /// `localhost` short-circuits to the development secret unless the
    /// process runs in production posture, where a forged Host header must
    /// not be able to reach it. Everything else is validated, served from
    /// cache, or read (trimmed) from the secret file. Any filesystem
    /// failure resolves to [`ServerError::SecretNotFound`].
    pub fn resolve(&self, raw: &str) -> Result<String> {
        if raw == LOCALHOST {
            if self.production {
                tracing::warn!(
                    "rejected localhost secret lookup in production, potential Host header forgery"
                );
                return Err(ServerError::SecretNotFound);
            }
            return Ok(LOCALHOST_SECRET.to_owned());
        }

        let domain = Domain::parse(raw)?;

        if let Some(secret) = self.cache.get(domain.as_str()) {
            return Ok(secret.clone());
        }

        match fs::read_to_string(self.secret_path(&domain)) {
            Ok(contents) => {
                let secret = contents.trim().to_owned();
                self.cache
                    .insert(domain.as_str().to_owned(), secret.clone());
                Ok(secret)
            }
            Err(err) => {
                if err.kind() != io::ErrorKind::NotFound {
                    tracing::error!(%domain, error = %err, "secret file unreadable");
                }
                Err(ServerError::SecretNotFound)
            }
        }
    }

    /// Return the existing secret for `raw`, or generate, persist and
    /// return a fresh one. Administrative operation.
    pub fn provision_or_get(&self, raw: &str) -> Result<String> {
        let domain = Domain::parse(raw)?;
        let _guard = self.admin_guard();
        let path = self.secret_path(&domain);

        match fs::read_to_string(&path) {
            Ok(existing) => Ok(existing.trim().to_owned()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                let secret = generate_secret();
                write_owner_only(&path, &secret).map_err(|err| {
                    ServerError::internal("cannot persist secret", err)
                })?;
                self.cache
                    .insert(domain.as_str().to_owned(), secret.clone());

                tracing::info!(%domain, "provisioned signing secret");
                Ok(secret)
            }
            Err(err) => {
                Err(ServerError::internal("cannot read secret file", err))
            }
        }
    }

    /// Unconditionally replace the secret for `raw`, persisting the new
    /// value and swapping the cache entry. Every token signed under the
    /// previous secret becomes unverifiable.
    pub fn rotate(&self, raw: &str) -> Result<String> {
        let domain = Domain::parse(raw)?;
        let _guard = self.admin_guard();

        let secret = generate_secret();
        write_owner_only(&self.secret_path(&domain), &secret).map_err(
            |err| ServerError::internal("cannot persist secret", err),
        )?;
        self.cache
            .insert(domain.as_str().to_owned(), secret.clone());

        tracing::info!(%domain, "rotated signing secret");
        Ok(secret)
    }

    /// All domains with a persisted secret, sorted lexicographically.
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.dir)
            .map_err(|err| ServerError::internal("cannot list secrets", err))?;

        let mut domains = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| {
                ServerError::internal("cannot list secrets", err)
            })?;
            if let Some(name) = entry.file_name().to_str() {
                domains.push(name.to_owned());
            }
        }
        domains.sort();

        Ok(domains)
    }

    /// Remove the persisted secret and its cache entry. Returns whether a
    /// secret existed.
    pub fn delete(&self, raw: &str) -> Result<bool> {
        let domain = Domain::parse(raw)?;
        let _guard = self.admin_guard();
        self.cache.remove(domain.as_str());

        match fs::remove_file(self.secret_path(&domain)) {
            Ok(()) => {
                tracing::info!(%domain, "deleted signing secret");
                Ok(true)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => {
                Err(ServerError::internal("cannot delete secret file", err))
            }
        }
    }

    fn secret_path(&self, domain: &Domain) -> PathBuf {
        self.dir.join(domain.as_str())
    }

    fn admin_guard(&self) -> std::sync::MutexGuard<'_, ()> {
        self.admin.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_LENGTH];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn write_owner_only(path: &Path, secret: &str) -> io::Result<()> {
    use std::io::Write as _;

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    options.open(path)?.write_all(secret.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (SecretStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = SecretStore::new(dir.path(), false).unwrap();
        (store, dir)
    }

    #[test]
    fn test_resolve_never_provisions() {
        let (store, dir) = store();

        assert!(matches!(
            store.resolve("new.example.com"),
            Err(ServerError::SecretNotFound)
        ));
        // the read path must not have created a file.
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_provision_is_idempotent() {
        let (store, _dir) = store();

        let first = store.provision_or_get("new.example.com").unwrap();
        let second = store.provision_or_get("new.example.com").unwrap();
        assert_eq!(first, second);

        let rotated = store.rotate("new.example.com").unwrap();
        assert_ne!(first, rotated);
        assert_eq!(store.resolve("new.example.com").unwrap(), rotated);
    }

    #[test]
    fn test_rotate_replaces_cache_entry() {
        let (store, _dir) = store();

        let before = store.provision_or_get("app.example.com").unwrap();
        assert_eq!(store.resolve("app.example.com").unwrap(), before);

        let after = store.rotate("app.example.com").unwrap();
        // cached value from the earlier resolve must not survive.
        assert_eq!(store.resolve("app.example.com").unwrap(), after);
    }

    #[test]
    fn test_resolve_trims_whitespace() {
        let (store, dir) = store();
        fs::write(dir.path().join("app.example.com"), "  s3cret \n").unwrap();

        assert_eq!(store.resolve("app.example.com").unwrap(), "s3cret");
    }

    #[test]
    fn test_localhost_policy() {
        let (dev, _d1) = store();
        assert_eq!(dev.resolve("localhost").unwrap(), LOCALHOST_SECRET);

        let dir = tempfile::tempdir().unwrap();
        let prod = SecretStore::new(dir.path(), true).unwrap();
        assert!(matches!(
            prod.resolve("localhost"),
            Err(ServerError::SecretNotFound)
        ));
    }

    #[test]
    fn test_traversal_never_reaches_filesystem() {
        let (store, dir) = store();
        fs::write(dir.path().join("victim"), "secret").unwrap();

        for raw in ["../victim", "..", "a/../victim", "victim\0"] {
            assert!(store.resolve(raw).is_err());
            assert!(store.provision_or_get(raw).is_err());
            assert!(store.rotate(raw).is_err());
            assert!(store.delete(raw).is_err());
        }
    }

    #[test]
    fn test_list_sorted() {
        let (store, _dir) = store();
        for domain in ["b.example.com", "a.example.com", "c.example.com"] {
            store.provision_or_get(domain).unwrap();
        }

        assert_eq!(
            store.list().unwrap(),
            vec!["a.example.com", "b.example.com", "c.example.com"]
        );
    }

    #[test]
    fn test_delete() {
        let (store, _dir) = store();
        store.provision_or_get("gone.example.com").unwrap();

        assert!(store.delete("gone.example.com").unwrap());
        assert!(!store.delete("gone.example.com").unwrap());
        assert!(store.resolve("gone.example.com").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_owner_only_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let (store, dir) = store();
        store.provision_or_get("app.example.com").unwrap();

        let dir_mode =
            fs::metadata(dir.path()).unwrap().permissions().mode();
        assert_eq!(dir_mode & 0o777, 0o700);

        let file_mode = fs::metadata(dir.path().join("app.example.com"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(file_mode & 0o777, 0o600);
    }
}
