use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use surrealdb::Surreal;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;

pub type Db = Surreal<Any>;

/// Connection settings for the user/entitlement store.
///
/// The gateway always signs in with service-level (root) credentials: role
/// reads must bypass row-level restrictions that would otherwise hide a
/// user's own role row from a normal read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: env::var("SURREALDB_URL").unwrap_or_else(|_| "memory".to_string()),
            namespace: env::var("SURREALDB_NAMESPACE").unwrap_or_else(|_| "platform".to_string()),
            database: env::var("SURREALDB_DATABASE").unwrap_or_else(|_| "auth".to_string()),
            username: env::var("SURREALDB_USERNAME").ok(),
            password: env::var("SURREALDB_PASSWORD").ok(),
        }
    }
}

pub async fn create_connection(config: DatabaseConfig) -> Result<Db> {
    let db = surrealdb::engine::any::connect(config.url).await?;

    // Sign in with the service credentials if provided
    if let (Some(username), Some(password)) = (config.username, config.password) {
        db.signin(Root {
            username: &username,
            password: &password,
        })
        .await?;
    }

    db.use_ns(config.namespace).use_db(config.database).await?;

    Ok(db)
}

pub async fn ensure_schema(db: &Db) -> Result<()> {
    let schema_queries = vec![
        // User profile table. `role` is deliberately a free-form string:
        // historical rows carry spellings like "Super Admin" and
        // "admin_user", and normalization happens at read time.
        "DEFINE TABLE user SCHEMAFULL;
         DEFINE FIELD email ON TABLE user TYPE option<string>;
         DEFINE FIELD role ON TABLE user TYPE option<string>;
         DEFINE FIELD last_login ON TABLE user TYPE option<datetime>;
         DEFINE FIELD created_at ON TABLE user VALUE time::now();
         DEFINE FIELD updated_at ON TABLE user VALUE time::now();",
        // Entitlement records, one default row per user created at signup.
        "DEFINE TABLE subscription SCHEMAFULL;
         DEFINE FIELD user_id ON TABLE subscription TYPE record<user>;
         DEFINE FIELD plan_type ON TABLE subscription TYPE string;
         DEFINE FIELD status ON TABLE subscription TYPE string;
         DEFINE FIELD max_devices ON TABLE subscription TYPE number DEFAULT 1;
         DEFINE FIELD started_at ON TABLE subscription TYPE option<datetime>;
         DEFINE FIELD auto_renew ON TABLE subscription TYPE bool DEFAULT false;
         DEFINE FIELD created_at ON TABLE subscription VALUE time::now();",
        "DEFINE INDEX subscription_user ON TABLE subscription COLUMNS user_id;",
    ];

    for query in schema_queries {
        db.query(query).await?;
    }

    Ok(())
}
