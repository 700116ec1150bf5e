//! The signed-in session: credential, persisted state, and the one shared
//! push connection every view subscribes through.

use std::sync::{Arc, PoisonError, RwLock};

use labgate_shared::{actions, Record};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api_client::ApiClient;
use crate::config::ClientConfig;
use crate::storage::Storage;
use crate::sync::{
    ConnectionError, ConnectionManager, ConnectionSettings, EventRouter, ResourceSync,
};

pub const SESSION_KEY: &str = "labgate_session";

/// Stored session data
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AuthSession {
    pub token: String,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub user_name: Option<String>,
}

impl AuthSession {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            user_id: None,
            user_name: None,
        }
    }
}

pub struct Session {
    id: Uuid,
    config: ClientConfig,
    storage: Option<Storage>,
    router: EventRouter,
    connection: ConnectionManager,
    auth: RwLock<Option<AuthSession>>,
}

impl Session {
    pub fn new(config: ClientConfig, storage: Option<Storage>) -> Self {
        let router = EventRouter::new();
        let connection = ConnectionManager::new(ConnectionSettings::from(&config), router.clone());
        Self {
            id: Uuid::new_v4(),
            config,
            storage,
            router,
            connection,
            auth: RwLock::new(None),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn auth(&self) -> Option<AuthSession> {
        self.auth.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set_auth(&self, auth: Option<AuthSession>) {
        *self.auth.write().unwrap_or_else(PoisonError::into_inner) = auth;
    }

    /// Load a previously stored session, if any, without connecting.
    pub fn restore(&self) -> Option<AuthSession> {
        let auth = self
            .storage
            .as_ref()?
            .load::<AuthSession>(SESSION_KEY)
            .filter(|a| !a.token.trim().is_empty())?;
        crate::log_debug!("restored session for {:?}", auth.user_name);
        self.set_auth(Some(auth.clone()));
        Some(auth)
    }

    /// Sign in: persist the credential, open the push connection and join
    /// the admin broadcast group.
    pub fn init(&self, auth: AuthSession) -> Result<(), ConnectionError> {
        if auth.token.trim().is_empty() {
            return Err(ConnectionError::NoCredential);
        }
        if let Some(storage) = &self.storage {
            if !storage.save(SESSION_KEY, &auth) {
                crate::log_warn!("could not persist session to {}", storage.dir().display());
            }
        }
        let token = auth.token.clone();
        self.set_auth(Some(auth));
        self.connection.start(&token)?;
        self.connection.join_group(actions::ADMIN_GROUP);
        Ok(())
    }

    /// Connect with the stored credential. Returns `false` when there is
    /// none.
    pub fn resume(&self) -> Result<bool, ConnectionError> {
        match self.auth().or_else(|| self.restore()) {
            Some(auth) => self.init(auth).map(|()| true),
            None => Ok(false),
        }
    }

    /// Sign out: stop the connection, drop every handler and forget the
    /// stored credential.
    pub fn teardown(&self) {
        self.connection.stop();
        self.router.clear();
        self.set_auth(None);
        if let Some(storage) = &self.storage {
            storage.remove(SESSION_KEY);
        }
        crate::log_info!("session {} signed out", self.id);
    }

    /// REST client carrying the session credential.
    pub fn api(&self) -> ApiClient {
        ApiClient::new()
            .with_base_url(self.config.api_base.clone())
            .with_bearer(self.auth().map(|a| a.token))
    }

    /// A fresh sync binding for the resource at `path`.
    pub fn resource<R: Record>(&self, path: &str) -> Arc<ResourceSync<R>> {
        let api = Arc::new(self.api().resource::<R>(path));
        ResourceSync::new(path, api, self.config.refetch_debounce)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.connection.stop();
    }
}
