//! Connection coordinates of a provisioned resource

use serde::{Deserialize, Serialize};

/// Where the credentials for a resource are stored
///
/// Only a reference; the secret itself never passes through this crate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CredentialsRef {
    /// Kind of store (e.g. "secretsmanager")
    pub store: String,

    /// Key or ARN inside that store
    pub key: String,
}

impl CredentialsRef {
    pub fn new(store: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            store: store.into(),
            key: key.into(),
        }
    }
}

impl std::fmt::Display for CredentialsRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.store, self.key)
    }
}

/// How to reach a provisioned cache cluster or database
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coordinates {
    pub host: String,

    pub port: u16,

    /// Logical database name, for database resources
    pub database: Option<String>,

    /// `None` when the resource does not require authentication
    pub credentials: Option<CredentialsRef>,
}

impl Coordinates {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            database: None,
            credentials: None,
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_credentials(mut self, credentials: CredentialsRef) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl std::fmt::Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)?;
        if let Some(db) = &self.database {
            write!(f, "/{db}")?;
        }
        match &self.credentials {
            Some(creds) => write!(f, " credentials={creds}"),
            None => write!(f, " credentials=none"),
        }
    }
}
