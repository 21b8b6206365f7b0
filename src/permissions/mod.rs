use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A feature-area grouping of permission identifiers.
///
/// The catalog is compiled in and immutable at runtime. Tenant databases
/// receive filtered copies of these groups; the system-only groups are
/// never written into a tenant database.
pub struct PermissionGroup {
    pub key: &'static str,
    pub label: &'static str,
    pub tagg: &'static str,
    pub permissions: &'static [&'static str],
}

/// The maximal-privilege role present in every tenant database.
pub const MASTER_ROLE_NAME: &str = "Maestro";

/// Groups that only exist in the control plane and must never be
/// materialized in a tenant's `config_roles`.
pub const SYSTEM_GROUPS: &[&str] = &["gestor_empresas", "configuracion_planes", "planes"];

/// Groups additionally excluded from the Maestro role's permission union.
pub const MAESTRO_EXCLUDED_GROUPS: &[&str] = &["gestor_empresas", "configuracion_planes"];

/// The fixed minimal set a suspended tenant is narrowed to, regardless of
/// what its plan would otherwise allow.
pub const SUSPENDED_PERMISSIONS: &[&str] =
    &["view_panel_admin", "view_comprobantes", "create_comprobantes"];

pub static CATALOG: &[PermissionGroup] = &[
    PermissionGroup {
        key: "panel",
        label: "Panel de administración",
        tagg: "panel",
        permissions: &["view_panel_admin"],
    },
    PermissionGroup {
        key: "empleados",
        label: "Empleados",
        tagg: "rrhh",
        permissions: &[
            "view_empleados",
            "create_empleados",
            "edit_empleados",
            "delete_empleados",
        ],
    },
    PermissionGroup {
        key: "config",
        label: "Configuración de formularios",
        tagg: "formularios",
        permissions: &[
            "view_formularios",
            "create_formularios",
            "edit_formularios",
            "delete_formularios",
        ],
    },
    PermissionGroup {
        key: "tickets",
        label: "Tickets",
        tagg: "soporte",
        permissions: &["view_tickets", "create_tickets", "edit_tickets", "delete_tickets"],
    },
    PermissionGroup {
        key: "comprobantes",
        label: "Comprobantes",
        tagg: "comprobantes",
        permissions: &["view_comprobantes", "create_comprobantes", "delete_comprobantes"],
    },
    PermissionGroup {
        key: "anuncios",
        label: "Anuncios",
        tagg: "comunicacion",
        permissions: &["view_anuncios", "create_anuncios", "delete_anuncios"],
    },
    PermissionGroup {
        key: "notificaciones",
        label: "Notificaciones",
        tagg: "comunicacion",
        permissions: &["view_notificaciones", "send_notificaciones"],
    },
    PermissionGroup {
        key: "gestor_empresas",
        label: "Gestor de empresas",
        tagg: "sistema",
        permissions: &[
            "view_empresas",
            "create_empresas",
            "edit_empresas",
            "suspend_empresas",
        ],
    },
    PermissionGroup {
        key: "configuracion_planes",
        label: "Configuración de planes",
        tagg: "sistema",
        permissions: &["view_config_planes", "edit_config_planes"],
    },
    PermissionGroup {
        key: "planes",
        label: "Planes",
        tagg: "sistema",
        permissions: &["view_planes", "assign_planes"],
    },
];

/// One row of a tenant's role-definition catalog (`config_roles`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub key: String,
    pub label: String,
    pub tagg: String,
    pub permissions: Vec<String>,
}

/// Compute the permission set actually in force for a tenant.
///
/// Suspension replaces the requested set entirely; it never merges.
pub fn effective_set(is_suspended: bool, requested: &[String]) -> BTreeSet<String> {
    if is_suspended {
        SUSPENDED_PERMISSIONS.iter().map(|p| p.to_string()).collect()
    } else {
        requested.iter().cloned().collect()
    }
}

/// Build the `config_roles` rows for a tenant from the static catalog.
///
/// System-only groups are skipped, and a group is only emitted when its
/// intersection with the active set is non-empty.
pub fn tenant_catalog_entries(active: &BTreeSet<String>) -> Vec<CatalogEntry> {
    CATALOG
        .iter()
        .filter(|group| !SYSTEM_GROUPS.contains(&group.key))
        .filter_map(|group| {
            let subset: Vec<String> = group
                .permissions
                .iter()
                .filter(|p| active.contains(**p))
                .map(|p| p.to_string())
                .collect();

            if subset.is_empty() {
                None
            } else {
                Some(CatalogEntry {
                    key: group.key.to_string(),
                    label: group.label.to_string(),
                    tagg: group.tagg.to_string(),
                    permissions: subset,
                })
            }
        })
        .collect()
}

/// The Maestro role's permission list: the union of all catalog groups
/// excluding system-only and company-management/plan-configuration groups,
/// intersected with the active set.
///
/// Derived from the static catalog, not from the tenant's freshly rebuilt
/// `config_roles` rows; the two stay aligned because both come from
/// [`CATALOG`].
pub fn maestro_permissions(active: &BTreeSet<String>) -> Vec<String> {
    CATALOG
        .iter()
        .filter(|group| {
            !SYSTEM_GROUPS.contains(&group.key) && !MAESTRO_EXCLUDED_GROUPS.contains(&group.key)
        })
        .flat_map(|group| group.permissions.iter())
        .filter(|p| active.contains(**p))
        .map(|p| p.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(perms: &[&str]) -> BTreeSet<String> {
        perms.iter().map(|p| p.to_string()).collect()
    }

    fn owned(perms: &[&str]) -> Vec<String> {
        perms.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn catalog_permissions_are_unique() {
        let mut seen = BTreeSet::new();
        for group in CATALOG {
            for p in group.permissions {
                assert!(seen.insert(*p), "duplicate permission in catalog: {}", p);
            }
        }
    }

    #[test]
    fn suspension_replaces_requested_set() {
        let requested = owned(&["view_tickets", "view_formularios", "view_empresas"]);
        let effective = effective_set(true, &requested);
        assert_eq!(effective, set(SUSPENDED_PERMISSIONS));
    }

    #[test]
    fn active_set_passes_through_when_not_suspended() {
        let requested = owned(&["view_tickets", "view_formularios"]);
        let effective = effective_set(false, &requested);
        assert_eq!(effective, set(&["view_tickets", "view_formularios"]));
    }

    #[test]
    fn catalog_entries_match_tickets_and_config_scenario() {
        let active = set(&["view_tickets", "view_formularios"]);
        let entries = tenant_catalog_entries(&active);

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].key, "config");
        assert_eq!(entries[0].permissions, owned(&["view_formularios"]));
        assert_eq!(entries[1].key, "tickets");
        assert_eq!(entries[1].permissions, owned(&["view_tickets"]));
    }

    #[test]
    fn catalog_entries_skip_system_groups() {
        let active = set(&["view_empresas", "view_config_planes", "view_planes", "view_tickets"]);
        let entries = tenant_catalog_entries(&active);

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, "tickets");
    }

    #[test]
    fn catalog_entries_empty_when_nothing_matches() {
        let entries = tenant_catalog_entries(&set(&["does_not_exist"]));
        assert!(entries.is_empty());
    }

    #[test]
    fn suspended_catalog_covers_only_minimal_groups() {
        let requested = owned(&["view_tickets", "view_formularios", "view_anuncios"]);
        let effective = effective_set(true, &requested);
        let entries = tenant_catalog_entries(&effective);

        let keys: Vec<&str> = entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["panel", "comprobantes"]);
        assert_eq!(entries[1].permissions, owned(&["view_comprobantes", "create_comprobantes"]));
    }

    #[test]
    fn maestro_never_receives_management_permissions() {
        let active = set(&[
            "view_tickets",
            "view_empresas",
            "suspend_empresas",
            "view_config_planes",
            "view_planes",
        ]);
        let maestro = maestro_permissions(&active);
        assert_eq!(maestro, owned(&["view_tickets"]));
    }

    #[test]
    fn maestro_is_subset_of_active_set() {
        let active = set(&["view_tickets", "view_formularios", "create_comprobantes"]);
        let maestro = maestro_permissions(&active);
        assert!(maestro.iter().all(|p| active.contains(p)));
    }

    #[test]
    fn maestro_recomputation_is_stable() {
        let active = set(&["view_tickets", "view_anuncios"]);
        assert_eq!(maestro_permissions(&active), maestro_permissions(&active));
    }
}
