//! SiteDesk Server
//!
//! Conversation engine for construction-site operations over a
//! messaging channel: per-address sessions, stepped flow wizards, and
//! admin delegation, backed by SQLite.

mod actor;
mod db;
mod delegation;
mod dispatcher;
mod engine;
mod error;
mod flows;
mod http;
mod identity;
mod logging;
mod menu;
mod paths;
mod records;
mod session;
mod sites;
mod store;
#[cfg(test)]
mod testutil;
mod upload;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use crate::engine::{Deps, Engine, Services};
use crate::identity::SqliteIdentityResolver;
use crate::records::SqliteRecordSink;
use crate::sites::{SiteContextResolver, SqliteSiteDirectory};
use crate::store::SessionStore;
use crate::upload::{HttpAttachmentStore, UploadPipeline};

#[derive(Parser, Debug)]
#[command(name = "sitedesk", about = "SiteDesk conversation engine")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:4010")]
    bind: SocketAddr,

    /// Data directory (default: ~/.sitedesk).
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Base URL of the attachment store.
    #[arg(
        long,
        env = "SITEDESK_ATTACHMENT_URL",
        default_value = "http://127.0.0.1:4020"
    )]
    attachment_url: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let data_dir = paths::init_data_dir(args.data_dir.as_deref());
    std::fs::create_dir_all(&data_dir)?;

    let logging = logging::init_logging()?;
    info!(
        component = "server",
        event = "server.starting",
        run_id = %logging.run_id,
        data_dir = %data_dir.display(),
        "Starting SiteDesk server"
    );

    let db_path = paths::db_path();
    let mut conn = db::open(&db_path)?;
    db::run_migrations(&mut conn)?;
    drop(conn);

    let services = Services {
        sites: SiteContextResolver::new(Arc::new(SqliteSiteDirectory::new(db_path.clone()))),
        sink: Arc::new(SqliteRecordSink::new(db_path.clone())),
        uploads: UploadPipeline::new(Arc::new(HttpAttachmentStore::new(args.attachment_url))),
    };
    let deps = Arc::new(Deps {
        store: SessionStore::new(db_path.clone()),
        identities: Arc::new(SqliteIdentityResolver::new(db_path)),
        services,
    });
    let engine = Arc::new(Engine::new(deps));

    let app = http::router(engine);

    info!(
        component = "server",
        event = "server.listening",
        addr = %args.bind,
        "Listening"
    );
    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
