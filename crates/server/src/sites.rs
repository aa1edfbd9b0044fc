//! Site context resolution
//!
//! Every flow's record pertains to a physical site. The resolver turns
//! an identity's eligible set into either a silent auto-selection, a
//! selection prompt, or a terminal "contact an administrator" outcome.
//! It never writes session state itself — the caller (dispatcher or
//! delegation manager) persists the choice into whichever scope is
//! active, which is what keeps the resolver delegation-agnostic.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::params;
use sitedesk_protocol::{Identity, MenuOption, Role, SiteContext};
use tokio::task;

use crate::db;
use crate::error::EngineError;

#[async_trait]
pub trait SiteDirectory: Send + Sync {
    /// Sites this identity may act against. Admins see every site.
    async fn eligible_sites(&self, identity: &Identity) -> Result<Vec<SiteContext>, EngineError>;
}

/// Outcome of a resolution attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum SiteResolution {
    /// Exactly one eligible site: auto-selected, confirmation due.
    Resolved(SiteContext),
    /// Several eligible sites: the user must pick one.
    NeedsSelection(Vec<SiteContext>),
    /// No eligible site: terminal for this identity.
    NoneEligible,
}

#[derive(Clone)]
pub struct SiteContextResolver {
    directory: Arc<dyn SiteDirectory>,
}

impl SiteContextResolver {
    pub fn new(directory: Arc<dyn SiteDirectory>) -> Self {
        Self { directory }
    }

    pub async fn resolve(&self, identity: &Identity) -> Result<SiteResolution, EngineError> {
        let mut sites = self.directory.eligible_sites(identity).await?;
        Ok(match sites.len() {
            0 => SiteResolution::NoneEligible,
            1 => SiteResolution::Resolved(sites.remove(0)),
            _ => SiteResolution::NeedsSelection(sites),
        })
    }

    pub async fn eligible(&self, identity: &Identity) -> Result<Vec<SiteContext>, EngineError> {
        self.directory.eligible_sites(identity).await
    }
}

/// Match a user's choice (option id or typed name) against the eligible
/// set. Selections outside the set are rejected.
pub fn validate_choice(sites: &[SiteContext], choice: &str) -> Option<SiteContext> {
    let wanted = choice.trim();
    sites
        .iter()
        .find(|s| s.site_id == wanted || s.site_name.eq_ignore_ascii_case(wanted))
        .cloned()
}

/// Build the selection prompt options for a multi-site identity.
pub fn site_options(sites: &[SiteContext]) -> Vec<MenuOption> {
    sites
        .iter()
        .map(|s| MenuOption::new(s.site_id.clone(), s.site_name.clone()))
        .collect()
}

/// Directory backed by the `sites` / `site_members` tables.
pub struct SqliteSiteDirectory {
    db_path: PathBuf,
}

impl SqliteSiteDirectory {
    pub fn new(db_path: PathBuf) -> Self {
        Self { db_path }
    }
}

#[async_trait]
impl SiteDirectory for SqliteSiteDirectory {
    async fn eligible_sites(&self, identity: &Identity) -> Result<Vec<SiteContext>, EngineError> {
        let db_path = self.db_path.clone();
        let address = identity.address.clone();
        let all_sites = identity.role == Role::Admin;

        task::spawn_blocking(move || -> Result<Vec<SiteContext>, EngineError> {
            let conn = db::open(&db_path)?;
            let sql = if all_sites {
                "SELECT id, name FROM sites ORDER BY name"
            } else {
                "SELECT s.id, s.name FROM sites s
                 JOIN site_members m ON m.site_id = s.id
                 WHERE m.address = ?1
                 ORDER BY s.name"
            };
            let mut stmt = conn.prepare(sql)?;

            let map_row = |row: &rusqlite::Row<'_>| {
                Ok(SiteContext {
                    site_id: row.get(0)?,
                    site_name: row.get(1)?,
                })
            };
            let rows = if all_sites {
                stmt.query_map([], map_row)?
                    .filter_map(|r| r.ok())
                    .collect()
            } else {
                stmt.query_map(params![address], map_row)?
                    .filter_map(|r| r.ok())
                    .collect()
            };
            Ok(rows)
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::StubDirectory;

    fn site(id: &str, name: &str) -> SiteContext {
        SiteContext {
            site_id: id.into(),
            site_name: name.into(),
        }
    }

    fn employee(address: &str) -> Identity {
        Identity {
            address: address.into(),
            role: Role::Employee,
            verified: true,
            display_name: None,
        }
    }

    #[tokio::test]
    async fn single_site_auto_selects() {
        let resolver = SiteContextResolver::new(Arc::new(StubDirectory::new(vec![site(
            "s1", "Riverside",
        )])));
        let res = resolver.resolve(&employee("+1")).await.unwrap();
        assert_eq!(res, SiteResolution::Resolved(site("s1", "Riverside")));
    }

    #[tokio::test]
    async fn zero_sites_is_terminal() {
        let resolver = SiteContextResolver::new(Arc::new(StubDirectory::new(vec![])));
        let res = resolver.resolve(&employee("+1")).await.unwrap();
        assert_eq!(res, SiteResolution::NoneEligible);
    }

    #[tokio::test]
    async fn multiple_sites_need_selection() {
        let sites = vec![site("s1", "Riverside"), site("s2", "Hillcrest")];
        let resolver = SiteContextResolver::new(Arc::new(StubDirectory::new(sites.clone())));
        let res = resolver.resolve(&employee("+1")).await.unwrap();
        assert_eq!(res, SiteResolution::NeedsSelection(sites));
    }

    #[test]
    fn choice_validation_rejects_outsiders() {
        let sites = vec![site("s1", "Riverside"), site("s2", "Hillcrest")];
        assert_eq!(validate_choice(&sites, "s2"), Some(site("s2", "Hillcrest")));
        assert_eq!(
            validate_choice(&sites, "riverside"),
            Some(site("s1", "Riverside"))
        );
        assert_eq!(validate_choice(&sites, "s9"), None);
    }

    #[tokio::test]
    async fn sqlite_directory_scopes_members_and_admins() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let mut conn = db::open(&db_path).unwrap();
        db::run_migrations(&mut conn).unwrap();
        conn.execute_batch(
            "INSERT INTO sites (id, name) VALUES ('s1', 'Riverside'), ('s2', 'Hillcrest');
             INSERT INTO site_members (address, site_id) VALUES ('+1', 's1');",
        )
        .unwrap();

        let directory = SqliteSiteDirectory::new(db_path);
        let member_sites = directory.eligible_sites(&employee("+1")).await.unwrap();
        assert_eq!(member_sites, vec![site("s1", "Riverside")]);

        let admin = Identity {
            address: "+9".into(),
            role: Role::Admin,
            verified: true,
            display_name: None,
        };
        let admin_sites = directory.eligible_sites(&admin).await.unwrap();
        assert_eq!(admin_sites.len(), 2);
    }
}
