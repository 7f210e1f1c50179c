//! `dataweave create-db` / `dataweave delete-db` command implementations

use dataweave_server::config::Config;
use dataweave_server::db::{self, schema};
use tracing::info;

/// Which way to move the schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaAction {
    Create,
    Delete,
}

pub async fn run(mut config: Config, db_url: Option<String>, action: SchemaAction) -> anyhow::Result<()> {
    if let Some(url) = db_url {
        config.database.url = url;
    }

    let pool = db::create_pool(&config.database).await?;

    match action {
        SchemaAction::Create => {
            schema::create_schema(&pool).await?;
            info!(database = %config.database.url, "Schema created");
            println!("Database tables created.");
        },
        SchemaAction::Delete => {
            schema::drop_schema(&pool).await?;
            info!(database = %config.database.url, "Schema dropped");
            println!("Database tables deleted.");
        },
    }

    pool.close().await;
    Ok(())
}
