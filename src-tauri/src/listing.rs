use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use tracing::{info, warn};

use crate::auth::AdminAuthority;
use crate::model::{Category, Registration};
use crate::store::{RecordStore, StoreError};

/// The table's category selector: everything, or one category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CategoryFilter {
    #[default]
    All,
    Only(Category),
}

impl CategoryFilter {
    pub fn tag(self) -> &'static str {
        match self {
            CategoryFilter::All => "all",
            CategoryFilter::Only(category) => category.as_str(),
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
            return Some(CategoryFilter::All);
        }
        Category::parse(trimmed).map(CategoryFilter::Only)
    }

    pub fn matches(self, record: &Registration) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Only(category) => record.category() == category,
        }
    }

    /// Keeps matching records in their original order.
    pub fn apply(self, records: Vec<Registration>) -> Vec<Registration> {
        records
            .into_iter()
            .filter(|record| self.matches(record))
            .collect()
    }
}

impl Serialize for CategoryFilter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.tag())
    }
}

impl<'de> Deserialize<'de> for CategoryFilter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        CategoryFilter::parse(raw.as_str())
            .ok_or_else(|| serde::de::Error::custom(format!("unknown category filter: {raw}")))
    }
}

/// What the table shows: the total in the store and the filtered rows.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationListing {
    pub filter: CategoryFilter,
    pub total: usize,
    pub records: Vec<Registration>,
}

pub fn list_registrations(
    store: &dyn RecordStore,
    filter: CategoryFilter,
) -> Result<RegistrationListing, StoreError> {
    let all = store.select_all()?;
    let total = all.len();
    Ok(RegistrationListing {
        filter,
        total,
        records: filter.apply(all),
    })
}

#[derive(Debug, Error)]
pub enum DeleteError {
    #[error("Solo un administrador puede eliminar registros")]
    Unauthorized { sign_in_required: bool },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Deletes one record on behalf of the current identity. Non-administrators are turned
/// away before the store is touched.
pub fn delete_registration(
    authority: &dyn AdminAuthority,
    store: &dyn RecordStore,
    id: &str,
) -> Result<(), DeleteError> {
    let identity = authority.current_identity();
    let Some(identity) = identity.filter(|identity| identity.is_admin) else {
        warn!(id, "delete refused without administrator session");
        return Err(DeleteError::Unauthorized {
            sign_in_required: true,
        });
    };
    store.delete_by_id(id)?;
    info!(id, user = %identity.user, "registration deleted");
    Ok(())
}
