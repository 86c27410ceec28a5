//! Session and identity orchestration.
//!
//! Glues the domain validator, secret store, token codec, state broker
//! and user repository together; user persistence itself stays behind
//! the [`UserRepository`] port.

use std::sync::Arc;

use url::Url;
use validator::{ValidationError, ValidationErrors};

use crate::broker::StateBroker;
use crate::crypto::PasswordManager;
use crate::domain::Domain;
use crate::error::{Result, ServerError};
use crate::google::GoogleClient;
use crate::secrets::SecretStore;
use crate::token::TokenCodec;
use crate::user::{AuthUser, Role, UserRepository};

/// Input for password registration.
#[derive(Clone, Debug)]
pub struct RegisterInput {
    pub email: String,
    pub password: String,
    pub name: String,
}

fn email_taken() -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    errors.add(
        "email",
        ValidationError::new("email_taken")
            .with_message("Email already registered.".into()),
    );
    errors
}

fn own_account(field: &'static str, message: &'static str) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    errors.add(
        field,
        ValidationError::new("own_account").with_message(message.into()),
    );
    errors
}

/// User manager.
#[derive(Clone)]
pub struct UserService {
    repo: Arc<dyn UserRepository>,
    secrets: Arc<SecretStore>,
    codec: TokenCodec,
    broker: Arc<StateBroker>,
    google: Option<GoogleClient>,
    password: PasswordManager,
    /// Verified against whenever no real hash exists, so every login
    /// performs exactly one password comparison.
    dummy_hash: String,
    own_domain: String,
    allowed_redirect_hosts: Vec<String>,
}

impl UserService {
    /// Create a new [`UserService`].
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repo: Arc<dyn UserRepository>,
        secrets: Arc<SecretStore>,
        codec: TokenCodec,
        broker: Arc<StateBroker>,
        google: Option<GoogleClient>,
        password: PasswordManager,
        own_domain: &str,
        allowed_redirect_hosts: Vec<String>,
    ) -> Result<Self> {
        let dummy_hash = password
            .hash_password("placeholder-credential")
            .map_err(|err| {
                ServerError::internal("cannot precompute dummy hash", err)
            })?;

        Ok(Self {
            repo,
            secrets,
            codec,
            broker,
            google,
            password,
            dummy_hash,
            own_domain: own_domain.to_owned(),
            allowed_redirect_hosts,
        })
    }

    /// Lifetime of minted tokens, in seconds.
    pub fn token_ttl(&self) -> u64 {
        self.codec.ttl()
    }

    /// Register a password account and mint a token for the requester's
    /// domain.
    pub async fn register(
        &self,
        input: RegisterInput,
        domain: Option<&str>,
    ) -> Result<(AuthUser, String)> {
        let domain = domain.unwrap_or(&self.own_domain);

        if self.repo.find_by_email(&input.email).await?.is_some() {
            return Err(email_taken().into());
        }

        let hash =
            self.password.hash_password(&input.password).map_err(|err| {
                ServerError::internal("cannot hash password", err)
            })?;
        let user = self
            .repo
            .create_with_password(&input.email, &input.name, &hash)
            .await?;
        let token = self.codec.mint(&user, domain)?;

        tracing::info!(user_id = user.id, "user registered");
        Ok((user, token))
    }

    /// Authenticate with email and password.
    ///
    /// "No such user", "password-less account" and "wrong password" all
    /// execute one hash comparison and share one error, so neither the
    /// timing nor the message reveals which branch failed.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        domain: Option<&str>,
    ) -> Result<(AuthUser, String)> {
        let domain = domain.unwrap_or(&self.own_domain);
        let user = self.repo.find_by_email(email).await?;

        let hash = user
            .as_ref()
            .and_then(|user| user.password_hash.as_deref())
            .unwrap_or(self.dummy_hash.as_str());
        let valid = self.password.verify_password(password, hash);

        match user {
            Some(user) if user.password_hash.is_some() && valid => {
                self.repo.update_last_login(&user.id).await?;
                let token = self.codec.mint(&user, domain)?;
                Ok((user, token))
            }
            _ => Err(ServerError::CredentialMismatch),
        }
    }

    /// Resolve the identity behind a token presented to this instance.
    pub async fn identify(&self, token: &str) -> Result<AuthUser> {
        let claims = self.codec.verify(token, &self.own_domain)?;

        self.repo
            .find_by_id(&claims.sub)
            .await?
            .ok_or(ServerError::UserNotFound)
    }

    /// Cross-domain hand-off: verify a token against this instance's own
    /// domain, then mint a fresh one for the target domain.
    pub async fn exchange(
        &self,
        token: &str,
        target_domain: &str,
    ) -> Result<String> {
        let claims = self.codec.verify(token, &self.own_domain)?;
        let user = self
            .repo
            .find_by_id(&claims.sub)
            .await?
            .ok_or(ServerError::UserNotFound)?;

        self.codec.mint(&user, target_domain)
    }

    /// Start a Google sign-in flow targeting the domain the redirect URL
    /// points back to.
    pub fn google_begin(&self, redirect: &str) -> Result<Url> {
        let google = self.google()?;

        let redirect_url =
            Url::parse(redirect).map_err(|_| ServerError::InvalidDomain)?;
        if !self.redirect_allowed(&redirect_url) {
            tracing::warn!(url = redirect, "redirect host not allowed");
            return Err(ServerError::InvalidDomain);
        }

        let domain = Domain::parse(
            redirect_url.host_str().ok_or(ServerError::InvalidDomain)?,
        )?;
        // the target must have a signing secret before the provider round
        // trip starts, not after it completed.
        self.secrets.resolve(domain.as_str())?;

        let state = self.broker.begin(domain, redirect_url);
        Ok(google.authorization_url(&state))
    }

    /// Finish a Google sign-in flow. The state entry is consumed
    /// atomically; replaying a captured callback URL fails.
    pub async fn google_callback(
        &self,
        code: &str,
        state: &str,
    ) -> Result<Url> {
        let google = self.google()?;
        let entry = self.broker.complete(state)?;

        let access_token = google.exchange_code(code).await?;
        let profile = google.fetch_profile(&access_token).await?;
        let user = self.repo.create_or_update_from_google(&profile).await?;

        let token = self.codec.mint(&user, entry.domain.as_str())?;
        let mut url = entry.redirect_url;
        url.query_pairs_mut().append_pair("token", &token);

        tracing::info!(user_id = user.id, domain = %entry.domain, "google sign-in completed");
        Ok(url)
    }

    /// All users, admin surface.
    pub async fn list_users(&self) -> Result<Vec<AuthUser>> {
        self.repo.list_all().await
    }

    pub async fn get_user(&self, id: &str) -> Result<AuthUser> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or(ServerError::UserNotFound)
    }

    /// Change a user's role. An admin cannot demote their own account.
    pub async fn change_role(
        &self,
        actor: &AuthUser,
        id: &str,
        role: Role,
    ) -> Result<AuthUser> {
        if actor.id == id && role != Role::Admin {
            return Err(own_account(
                "role",
                "Cannot change your own role.",
            )
            .into());
        }

        self.repo
            .update_role(id, role)
            .await?
            .ok_or(ServerError::UserNotFound)
    }

    /// Delete a user. An admin cannot delete their own account.
    pub async fn remove_user(
        &self,
        actor: &AuthUser,
        id: &str,
    ) -> Result<()> {
        if actor.id == id {
            return Err(own_account(
                "user",
                "Cannot delete your own account.",
            )
            .into());
        }

        if !self.repo.delete(id).await? {
            return Err(ServerError::UserNotFound);
        }

        Ok(())
    }

    fn google(&self) -> Result<&GoogleClient> {
        self.google.as_ref().ok_or(ServerError::Internal {
            details: "google oauth is not configured".into(),
            source: None,
        })
    }

    fn redirect_allowed(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host_port = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_owned(),
        };

        self.allowed_redirect_hosts
            .iter()
            .any(|allowed| *allowed == host_port || *allowed == host)
    }
}
