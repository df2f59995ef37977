use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::app::error::{Result, RythmError};
use crate::auth::{
    AuthService, IdentityProvider, LogMailer, Mailer, OAuth1Provider, OAuth2Provider, ProviderKind,
};
use crate::config::Config;
use crate::rating::ReactionEngine;
use crate::store::sqlite::SqliteStore;
use crate::todos::TodoService;

pub struct AppContext {
    pub store: Arc<SqliteStore>,
    pub engine: ReactionEngine,
    pub auth: AuthService,
    pub todos: TodoService,
    pub config: Config,
}

impl AppContext {
    pub fn new(config: Config) -> Result<Self> {
        Self::with_mailer(config, Arc::new(LogMailer))
    }

    pub fn with_mailer(config: Config, mailer: Arc<dyn Mailer>) -> Result<Self> {
        let db_path = match &config.database.path {
            Some(p) => p.clone(),
            None => Self::default_db_path()?,
        };
        info!(path = %db_path.display(), "Opening database");

        let store = Arc::new(SqliteStore::new(&db_path)?);
        Ok(Self::assemble(store, config, mailer))
    }

    pub fn in_memory(config: Config) -> Result<Self> {
        let store = Arc::new(SqliteStore::in_memory()?);
        Ok(Self::assemble(store, config, Arc::new(LogMailer)))
    }

    fn assemble(store: Arc<SqliteStore>, config: Config, mailer: Arc<dyn Mailer>) -> Self {
        let mut auth = AuthService::new(store.clone(), mailer, config.auth.clone());
        for (name, client) in &config.oauth {
            let Some(kind) = ProviderKind::parse(name) else {
                warn!(provider = %name, "Ignoring unsupported identity provider");
                continue;
            };
            if !client.is_complete() {
                warn!(provider = %name, "Ignoring identity provider without client credentials");
                continue;
            }
            let public_url = &config.auth.public_url;
            let provider: Arc<dyn IdentityProvider> = if kind.is_oauth1() {
                Arc::new(OAuth1Provider::new(kind, client, public_url))
            } else {
                Arc::new(OAuth2Provider::new(kind, client, public_url))
            };
            auth = auth.with_provider(provider);
        }

        Self {
            engine: ReactionEngine::new(store.clone()),
            todos: TodoService::new(store.clone()),
            auth,
            store,
            config,
        }
    }

    fn default_db_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| RythmError::Config("Could not find data directory".into()))?;
        let rythm_dir = data_dir.join("rythm");
        std::fs::create_dir_all(&rythm_dir)?;
        Ok(rythm_dir.join("rythm.db"))
    }
}
