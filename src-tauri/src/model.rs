//! Registration records as the store sees them.
//!
//! A [`Registration`] is stored in the flat record layout used by the table and the
//! export (`tipo`, `bought_from_*`, `inherited_from_*` columns), while in memory the
//! category-specific fields live inside [`CategoryDetails`] so a founder can never
//! carry seller or predecessor data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "fundador")]
    Founder,
    #[serde(rename = "comprador", alias = "comprado")]
    Buyer,
    #[serde(rename = "heredero", alias = "herdero")]
    Heir,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Founder, Category::Buyer, Category::Heir];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Founder => "fundador",
            Category::Buyer => "comprador",
            Category::Heir => "heredero",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Category::Founder => "Fundador",
            Category::Buyer => "Comprador",
            Category::Heir => "Heredero",
        }
    }

    /// Parses a wire value. Older records spelled two variants differently; those
    /// spellings are read but never written back.
    pub fn parse(value: &str) -> Option<Category> {
        match value.trim().to_lowercase().as_str() {
            "fundador" => Some(Category::Founder),
            "comprador" | "comprado" => Some(Category::Buyer),
            "heredero" | "herdero" => Some(Category::Heir),
            _ => None,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Image produced by the signature pad, kept as the data URL it was exported as.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(String);

impl Signature {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Mirrors the pad's own emptiness check: nothing drawn means either no payload at
    /// all or a data URL whose body is empty.
    pub fn is_empty(&self) -> bool {
        let trimmed = self.0.trim();
        if trimmed.is_empty() {
            return true;
        }
        if trimmed.starts_with("data:") {
            return match trimmed.split_once(',') {
                Some((_, body)) => body.trim().is_empty(),
                None => true,
            };
        }
        false
    }

    pub fn is_inline_image(&self) -> bool {
        !self.is_empty() && self.0.trim_start().starts_with("data:image/")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyName {
    pub name: String,
    pub lastname: String,
}

impl PartyName {
    pub fn new(name: impl Into<String>, lastname: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lastname: lastname.into(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.name, self.lastname).trim().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryDetails {
    Founder,
    Buyer { seller: PartyName },
    Heir { predecessor: PartyName },
}

impl CategoryDetails {
    pub fn category(&self) -> Category {
        match self {
            CategoryDetails::Founder => Category::Founder,
            CategoryDetails::Buyer { .. } => Category::Buyer,
            CategoryDetails::Heir { .. } => Category::Heir,
        }
    }

    pub fn seller(&self) -> Option<&PartyName> {
        match self {
            CategoryDetails::Buyer { seller } => Some(seller),
            _ => None,
        }
    }

    pub fn predecessor(&self) -> Option<&PartyName> {
        match self {
            CategoryDetails::Heir { predecessor } => Some(predecessor),
            _ => None,
        }
    }
}

/// A validated registration that has not been accepted by a store yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRegistration {
    pub name: String,
    pub lastname: String,
    pub national_id: String,
    pub phone: String,
    pub email: String,
    pub details: CategoryDetails,
    pub signature: Signature,
}

/// A registration accepted by a store. Immutable; only an authorized delete removes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RegistrationRow", into = "RegistrationRow")]
pub struct Registration {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub lastname: String,
    pub national_id: String,
    pub phone: String,
    pub email: String,
    pub details: CategoryDetails,
    pub signature: Signature,
}

impl Registration {
    pub fn from_new(id: impl Into<String>, timestamp: DateTime<Utc>, record: NewRegistration) -> Self {
        Self {
            id: id.into(),
            timestamp,
            name: record.name,
            lastname: record.lastname,
            national_id: record.national_id,
            phone: record.phone,
            email: record.email,
            details: record.details,
            signature: record.signature,
        }
    }

    pub fn category(&self) -> Category {
        self.details.category()
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.name, self.lastname).trim().to_string()
    }
}

#[derive(Serialize, Deserialize)]
struct RegistrationRow {
    id: String,
    name: String,
    lastname: String,
    #[serde(default)]
    cedula: String,
    phone: String,
    email: String,
    tipo: Category,
    #[serde(default)]
    signature: Signature,
    bought_from_name: Option<String>,
    bought_from_lastname: Option<String>,
    inherited_from_name: Option<String>,
    inherited_from_lastname: Option<String>,
    timestamp: DateTime<Utc>,
}

impl From<RegistrationRow> for Registration {
    fn from(row: RegistrationRow) -> Self {
        // Rows written before the conditional sections existed have no party columns.
        let details = match row.tipo {
            Category::Founder => CategoryDetails::Founder,
            Category::Buyer => CategoryDetails::Buyer {
                seller: PartyName::new(
                    row.bought_from_name.unwrap_or_default(),
                    row.bought_from_lastname.unwrap_or_default(),
                ),
            },
            Category::Heir => CategoryDetails::Heir {
                predecessor: PartyName::new(
                    row.inherited_from_name.unwrap_or_default(),
                    row.inherited_from_lastname.unwrap_or_default(),
                ),
            },
        };
        Self {
            id: row.id,
            timestamp: row.timestamp,
            name: row.name,
            lastname: row.lastname,
            national_id: row.cedula,
            phone: row.phone,
            email: row.email,
            details,
            signature: row.signature,
        }
    }
}

impl From<Registration> for RegistrationRow {
    fn from(record: Registration) -> Self {
        let tipo = record.category();
        let (bought_from_name, bought_from_lastname) = match record.details.seller() {
            Some(seller) => (Some(seller.name.clone()), Some(seller.lastname.clone())),
            None => (None, None),
        };
        let (inherited_from_name, inherited_from_lastname) = match record.details.predecessor() {
            Some(predecessor) => (
                Some(predecessor.name.clone()),
                Some(predecessor.lastname.clone()),
            ),
            None => (None, None),
        };
        Self {
            id: record.id,
            name: record.name,
            lastname: record.lastname,
            cedula: record.national_id,
            phone: record.phone,
            email: record.email,
            tipo,
            signature: record.signature,
            bought_from_name,
            bought_from_lastname,
            inherited_from_name,
            inherited_from_lastname,
            timestamp: record.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn buyer() -> Registration {
        Registration::from_new(
            "r-1",
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
            NewRegistration {
                name: "Ana".into(),
                lastname: "Pérez".into(),
                national_id: "V-123".into(),
                phone: "+58 412 555".into(),
                email: "ana@example.com".into(),
                details: CategoryDetails::Buyer {
                    seller: PartyName::new("Luis", "Gómez"),
                },
                signature: Signature::new("data:image/png;base64,AAAA"),
            },
        )
    }

    #[test]
    fn legacy_category_spellings_are_read_but_not_written() {
        assert_eq!(Category::parse("herdero"), Some(Category::Heir));
        assert_eq!(Category::parse("Comprado"), Some(Category::Buyer));
        assert_eq!(Category::parse("otro"), None);
        let parsed: Category = serde_json::from_value(json!("herdero")).unwrap();
        assert_eq!(serde_json::to_value(parsed).unwrap(), json!("heredero"));
    }

    #[test]
    fn flat_row_carries_explicit_nulls_for_other_categories() {
        let value = serde_json::to_value(buyer()).unwrap();
        assert_eq!(value["tipo"], json!("comprador"));
        assert_eq!(value["cedula"], json!("V-123"));
        assert_eq!(value["bought_from_name"], json!("Luis"));
        assert_eq!(value["inherited_from_name"], json!(null));
        assert_eq!(value["inherited_from_lastname"], json!(null));
    }

    #[test]
    fn rows_without_party_columns_still_load() {
        let value = json!({
            "id": "old",
            "name": "Eva",
            "lastname": "Ruiz",
            "phone": "123",
            "email": "eva@example.com",
            "tipo": "herdero",
            "signature": "data:image/png;base64,AAAA",
            "timestamp": "2023-01-02T03:04:05Z"
        });
        let record: Registration = serde_json::from_value(value).unwrap();
        assert_eq!(record.category(), Category::Heir);
        assert_eq!(record.national_id, "");
        assert_eq!(
            record.details.predecessor(),
            Some(&PartyName::new("", ""))
        );
    }

    #[test]
    fn signature_emptiness_follows_the_pad() {
        assert!(Signature::default().is_empty());
        assert!(Signature::new("   ").is_empty());
        assert!(Signature::new("data:image/png;base64,").is_empty());
        assert!(!Signature::new("data:image/png;base64,iVBOR").is_empty());
        assert!(Signature::new("data:image/png;base64,iVBOR").is_inline_image());
        assert!(!Signature::new("signed").is_inline_image());
    }
}
