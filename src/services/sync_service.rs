use std::collections::BTreeSet;
use std::sync::Arc;

use sqlx::types::Json;
use sqlx::{PgPool, QueryBuilder};
use thiserror::Error;
use tracing::{debug, info};

use crate::database::manager::{DatabaseError, DatabaseManager};
use crate::database::models::{Company, PlanLimits, Role};
use crate::permissions::{self, MASTER_ROLE_NAME};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Database manager error: {0}")]
    DatabaseManager(#[from] DatabaseError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Propagates a company's plan and permission changes into its tenant
/// database.
pub struct SyncService {
    manager: Arc<DatabaseManager>,
}

impl SyncService {
    pub fn new(manager: Arc<DatabaseManager>) -> Self {
        Self { manager }
    }

    /// Rewrite a tenant's authorization configuration to match the given
    /// permission set and/or plan limits. Side effects only; both
    /// arguments are optional and independently applied.
    ///
    /// No-op when the company has no tenant database or its database is
    /// the reserved control database. A suspended company's effective
    /// permission set is replaced with the fixed minimal set, overriding
    /// `active_permissions`.
    ///
    /// The multi-step rewrite is not transactional: a failure mid-sequence
    /// leaves partial writes in place (a cleared role catalog with stale
    /// role assignments in the worst case). Re-running with the same
    /// inputs repairs it, since the whole operation is idempotent.
    /// Concurrent calls for the same tenant are not mutually excluded.
    pub async fn synchronize(
        &self,
        company: &Company,
        active_permissions: Option<&[String]>,
        plan_limits: Option<&PlanLimits>,
    ) -> Result<(), SyncError> {
        let Some(db_name) = company.db_name.as_deref() else {
            return Ok(());
        };
        if db_name.is_empty() || db_name == DatabaseManager::CONTROL_DB_NAME {
            return Ok(());
        }

        let pool = self.manager.tenant_pool(db_name).await?;

        if let Some(requested) = active_permissions {
            let active = permissions::effective_set(company.is_suspended, requested);
            debug!(
                tenant = db_name,
                suspended = company.is_suspended,
                active = active.len(),
                "synchronizing tenant permissions"
            );

            self.rebuild_role_catalog(&pool, &active).await?;
            self.reconcile_roles(&pool, &active).await?;
        }

        if let Some(limits) = plan_limits {
            self.write_plan_limits(&pool, limits).await?;
        }

        info!(tenant = db_name, "tenant configuration synchronized");
        Ok(())
    }

    /// Full replace of the tenant's role-definition catalog: erase every
    /// row, then insert the groups still covered by the active set as one
    /// batch (skipping the insert when none qualify).
    async fn rebuild_role_catalog(
        &self,
        pool: &PgPool,
        active: &BTreeSet<String>,
    ) -> Result<(), SyncError> {
        sqlx::query("DELETE FROM config_roles").execute(pool).await?;

        let entries = permissions::tenant_catalog_entries(active);
        if entries.is_empty() {
            return Ok(());
        }

        let mut insert =
            QueryBuilder::new("INSERT INTO config_roles (key, label, tagg, permissions) ");
        insert.push_values(entries, |mut row, entry| {
            row.push_bind(entry.key)
                .push_bind(entry.label)
                .push_bind(entry.tagg)
                .push_bind(Json(entry.permissions));
        });
        insert.build().execute(pool).await?;

        Ok(())
    }

    /// Reconcile every assigned role against the active set. Maestro is
    /// always rewritten; other roles only when their intersection with
    /// the active set shrinks.
    async fn reconcile_roles(
        &self,
        pool: &PgPool,
        active: &BTreeSet<String>,
    ) -> Result<(), SyncError> {
        let roles: Vec<Role> = sqlx::query_as("SELECT id, name, permissions FROM roles")
            .fetch_all(pool)
            .await?;

        for role in roles {
            if let Some(next) = reconciled_permissions(&role, active) {
                sqlx::query("UPDATE roles SET permissions = $1 WHERE id = $2")
                    .bind(Json(next))
                    .bind(role.id)
                    .execute(pool)
                    .await?;
            }
        }

        Ok(())
    }

    /// Upsert the tenant's single `config_plan` row with fresh limits.
    async fn write_plan_limits(&self, pool: &PgPool, limits: &PlanLimits) -> Result<(), SyncError> {
        let updated = sqlx::query("UPDATE config_plan SET plan_limits = $1, updated_at = NOW()")
            .bind(Json(limits))
            .execute(pool)
            .await?;

        if updated.rows_affected() == 0 {
            sqlx::query("INSERT INTO config_plan (plan_limits, updated_at) VALUES ($1, NOW())")
                .bind(Json(limits))
                .execute(pool)
                .await?;
        }

        Ok(())
    }
}

/// Decide a role's new permission list, or `None` when no write is
/// needed. Maestro is unconditionally re-derived from the catalog union;
/// any other role keeps the intersection of its current list with the
/// active set, persisted only when the intersection's size differs.
fn reconciled_permissions(role: &Role, active: &BTreeSet<String>) -> Option<Vec<String>> {
    if role.name == MASTER_ROLE_NAME {
        return Some(permissions::maestro_permissions(active));
    }

    let kept: Vec<String> = role
        .permissions
        .0
        .iter()
        .filter(|p| active.contains(*p))
        .cloned()
        .collect();

    if kept.len() != role.permissions.0.len() {
        Some(kept)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn set(perms: &[&str]) -> BTreeSet<String> {
        perms.iter().map(|p| p.to_string()).collect()
    }

    fn role(name: &str, perms: &[&str]) -> Role {
        Role {
            id: Uuid::new_v4(),
            name: name.to_string(),
            permissions: Json(perms.iter().map(|p| p.to_string()).collect()),
        }
    }

    fn company(db_name: Option<&str>) -> Company {
        Company {
            db_name: db_name.map(|n| n.to_string()),
            name: "Acme".to_string(),
            is_suspended: false,
            permissions: Json(vec!["view_tickets".to_string()]),
            plan_limits: Json(PlanLimits::default()),
        }
    }

    #[tokio::test]
    async fn synchronize_skips_companies_without_tenant_database() {
        let service = SyncService::new(Arc::new(DatabaseManager::new()));
        let perms = vec!["view_tickets".to_string()];

        // No pool is ever requested for these, so no DATABASE_URL is needed
        for db_name in [None, Some(""), Some(DatabaseManager::CONTROL_DB_NAME)] {
            let result = service
                .synchronize(&company(db_name), Some(&perms), Some(&PlanLimits::default()))
                .await;
            assert!(result.is_ok());
        }
    }

    #[test]
    fn maestro_is_always_rewritten() {
        let active = set(&["view_tickets"]);
        let maestro = role(MASTER_ROLE_NAME, &["view_tickets"]);

        let next = reconciled_permissions(&maestro, &active);
        assert_eq!(next, Some(vec!["view_tickets".to_string()]));
    }

    #[test]
    fn maestro_drops_management_permissions_from_active_set() {
        let active = set(&["view_tickets", "view_empresas", "view_config_planes"]);
        let maestro = role(MASTER_ROLE_NAME, &[]);

        let next = reconciled_permissions(&maestro, &active).unwrap();
        assert_eq!(next, vec!["view_tickets".to_string()]);
    }

    #[test]
    fn other_roles_keep_only_active_permissions() {
        let active = set(&["view_tickets"]);
        let editor = role("Editor", &["view_tickets", "view_formularios"]);

        let next = reconciled_permissions(&editor, &active);
        assert_eq!(next, Some(vec!["view_tickets".to_string()]));
    }

    #[test]
    fn stable_roles_are_not_rewritten() {
        let active = set(&["view_tickets", "view_formularios"]);
        let editor = role("Editor", &["view_tickets"]);

        assert_eq!(reconciled_permissions(&editor, &active), None);
    }

    #[test]
    fn reconciliation_is_idempotent() {
        let active = set(&["view_tickets"]);
        let editor = role("Editor", &["view_tickets", "view_formularios"]);

        let first = reconciled_permissions(&editor, &active).unwrap();
        let settled = Role {
            permissions: Json(first),
            ..editor
        };
        assert_eq!(reconciled_permissions(&settled, &active), None);
    }

    #[test]
    fn reconciled_list_is_subset_of_active() {
        let active = set(&["view_tickets", "view_anuncios"]);
        let viewer = role("Viewer", &["view_tickets", "view_empleados", "view_anuncios"]);

        let next = reconciled_permissions(&viewer, &active).unwrap();
        assert!(next.iter().all(|p| active.contains(p)));
    }
}
