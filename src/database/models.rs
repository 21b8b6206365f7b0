use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// A company row from the control database (`empresas`).
///
/// `db_name` identifies the company's dedicated tenant database; it is
/// absent for companies that have not been provisioned yet. `permissions`
/// holds the active permission set granted by the company's plan.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub db_name: Option<String>,
    pub name: String,
    pub is_suspended: bool,
    pub permissions: Json<Vec<String>>,
    pub plan_limits: Json<PlanLimits>,
}

/// Quantitative limits granted by a company's plan.
///
/// Absent fields mean "unlimited". All caps must be positive when set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanLimits {
    pub max_users: Option<u32>,
    pub max_forms: Option<u32>,
    pub max_responses: Option<u32>,
    pub max_storage_mb: Option<u32>,
}

impl PlanLimits {
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("maxUsers", self.max_users),
            ("maxForms", self.max_forms),
            ("maxResponses", self.max_responses),
            ("maxStorageMb", self.max_storage_mb),
        ] {
            if value == Some(0) {
                return Err(format!("{} must be positive when set", name));
            }
        }
        Ok(())
    }
}

/// An assigned role in a tenant database (`roles`).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub permissions: Json<Vec<String>>,
}

/// A navigation entry from the shared `menu` collection.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MenuItem {
    pub label: String,
    pub path: String,
    pub icon: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_limits_default_to_unlimited() {
        let limits = PlanLimits::default();
        assert_eq!(limits.max_users, None);
        assert!(limits.validate().is_ok());
    }

    #[test]
    fn plan_limits_reject_zero_caps() {
        let limits = PlanLimits {
            max_forms: Some(0),
            ..Default::default()
        };
        assert!(limits.validate().is_err());
    }

    #[test]
    fn plan_limits_use_camel_case_keys() {
        let limits = PlanLimits {
            max_users: Some(25),
            max_storage_mb: Some(512),
            ..Default::default()
        };
        let value = serde_json::to_value(&limits).unwrap();
        assert_eq!(value["maxUsers"], 25);
        assert_eq!(value["maxStorageMb"], 512);
    }
}
