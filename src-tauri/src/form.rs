//! Draft registration held by the form, plus its validation rules.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

use crate::model::{Category, CategoryDetails, NewRegistration, PartyName, Signature};

/// Every editable field of the form. Wire keys match the stored record columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Field {
    #[serde(rename = "name")]
    Name,
    #[serde(rename = "lastname")]
    Lastname,
    #[serde(rename = "cedula")]
    NationalId,
    #[serde(rename = "phone")]
    Phone,
    #[serde(rename = "email")]
    Email,
    #[serde(rename = "tipo")]
    Category,
    #[serde(rename = "signature")]
    Signature,
    #[serde(rename = "bought_from_name")]
    SellerName,
    #[serde(rename = "bought_from_lastname")]
    SellerLastname,
    #[serde(rename = "inherited_from_name")]
    PredecessorName,
    #[serde(rename = "inherited_from_lastname")]
    PredecessorLastname,
}

impl Field {
    pub const ALL: [Field; 11] = [
        Field::Name,
        Field::Lastname,
        Field::NationalId,
        Field::Phone,
        Field::Email,
        Field::Category,
        Field::Signature,
        Field::SellerName,
        Field::SellerLastname,
        Field::PredecessorName,
        Field::PredecessorLastname,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::Lastname => "lastname",
            Field::NationalId => "cedula",
            Field::Phone => "phone",
            Field::Email => "email",
            Field::Category => "tipo",
            Field::Signature => "signature",
            Field::SellerName => "bought_from_name",
            Field::SellerLastname => "bought_from_lastname",
            Field::PredecessorName => "inherited_from_name",
            Field::PredecessorLastname => "inherited_from_lastname",
        }
    }

    pub fn from_key(key: &str) -> Option<Field> {
        Field::ALL.into_iter().find(|field| field.key() == key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Issue {
    Required,
    InvalidFormat,
}

/// Field-scoped validation failures. Rebuilt from scratch on every pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    issues: BTreeMap<Field, Issue>,
}

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn get(&self, field: Field) -> Option<Issue> {
        self.issues.get(&field).copied()
    }

    pub fn contains(&self, field: Field) -> bool {
        self.issues.contains_key(&field)
    }

    pub fn fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.issues.keys().copied()
    }

    pub fn message(&self, field: Field) -> Option<&'static str> {
        self.get(field).map(|issue| issue_message(field, issue))
    }

    fn insert(&mut self, field: Field, issue: Issue) {
        self.issues.insert(field, issue);
    }

    fn remove(&mut self, field: Field) {
        self.issues.remove(&field);
    }
}

impl Serialize for ValidationErrors {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.issues.len()))?;
        for (field, issue) in &self.issues {
            map.serialize_entry(field.key(), issue_message(*field, *issue))?;
        }
        map.end()
    }
}

fn issue_message(field: Field, issue: Issue) -> &'static str {
    match (field, issue) {
        (Field::Phone, Issue::InvalidFormat) => "Formato de teléfono inválido",
        (Field::Email, Issue::InvalidFormat) => "Formato de email inválido",
        (Field::Name, _) => "El nombre es requerido",
        (Field::Lastname, _) => "El apellido es requerido",
        (Field::NationalId, _) => "La cédula es requerida",
        (Field::Phone, _) => "El teléfono es requerido",
        (Field::Email, _) => "El email es requerido",
        (Field::Category, _) => "El tipo es requerido",
        (Field::Signature, _) => "La firma es requerida",
        (Field::SellerName, _) => "El nombre del vendedor es requerido",
        (Field::SellerLastname, _) => "El apellido del vendedor es requerido",
        (Field::PredecessorName, _) => "El nombre de quien heredó es requerido",
        (Field::PredecessorLastname, _) => "El apellido de quien heredó es requerido",
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormError {
    #[error("unknown form field: {0}")]
    UnknownField(String),
    #[error("unknown category: {0}")]
    UnknownCategory(String),
    #[error("field {} is not shown for the selected category", .0.key())]
    HiddenField(Field),
}

/// Category selection with the conditional section that belongs to it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CategoryDraft {
    #[default]
    Unselected,
    Founder,
    Buyer { seller: PartyName },
    Heir { predecessor: PartyName },
}

impl CategoryDraft {
    pub fn category(&self) -> Option<Category> {
        match self {
            CategoryDraft::Unselected => None,
            CategoryDraft::Founder => Some(Category::Founder),
            CategoryDraft::Buyer { .. } => Some(Category::Buyer),
            CategoryDraft::Heir { .. } => Some(Category::Heir),
        }
    }

    fn select(&mut self, next: Option<Category>) {
        if self.category() == next {
            return;
        }
        *self = match next {
            None => CategoryDraft::Unselected,
            Some(Category::Founder) => CategoryDraft::Founder,
            Some(Category::Buyer) => CategoryDraft::Buyer {
                seller: PartyName::default(),
            },
            Some(Category::Heir) => CategoryDraft::Heir {
                predecessor: PartyName::default(),
            },
        };
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationDraft {
    pub name: String,
    pub lastname: String,
    pub national_id: String,
    pub phone: String,
    pub email: String,
    pub category: CategoryDraft,
    pub signature: Signature,
}

impl RegistrationDraft {
    /// Builds the store payload, trimming text fields. Returns `None` while no category
    /// is selected; callers validate first.
    pub fn to_registration(&self) -> Option<NewRegistration> {
        let details = match &self.category {
            CategoryDraft::Unselected => return None,
            CategoryDraft::Founder => CategoryDetails::Founder,
            CategoryDraft::Buyer { seller } => CategoryDetails::Buyer {
                seller: trimmed_party(seller),
            },
            CategoryDraft::Heir { predecessor } => CategoryDetails::Heir {
                predecessor: trimmed_party(predecessor),
            },
        };
        Some(NewRegistration {
            name: self.name.trim().to_string(),
            lastname: self.lastname.trim().to_string(),
            national_id: self.national_id.trim().to_string(),
            phone: self.phone.trim().to_string(),
            email: self.email.trim().to_string(),
            details,
            signature: self.signature.clone(),
        })
    }
}

fn trimmed_party(party: &PartyName) -> PartyName {
    PartyName::new(party.name.trim(), party.lastname.trim())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VisibleSections {
    pub seller: bool,
    pub predecessor: bool,
}

/// What the form UI renders: raw field values, current errors, and visible sections.
#[derive(Debug, Clone, Serialize)]
pub struct FormSnapshot {
    pub fields: BTreeMap<&'static str, String>,
    pub errors: ValidationErrors,
    pub sections: VisibleSections,
}

#[derive(Debug, Clone, Default)]
pub struct FormState {
    draft: RegistrationDraft,
    errors: ValidationErrors,
}

impl FormState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draft(&self) -> &RegistrationDraft {
        &self.draft
    }

    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    /// Updates one field. Never validates.
    pub fn set_field(&mut self, field: Field, value: impl Into<String>) -> Result<(), FormError> {
        let value = value.into();
        let draft = &mut self.draft;
        match field {
            Field::Name => draft.name = value,
            Field::Lastname => draft.lastname = value,
            Field::NationalId => draft.national_id = value,
            Field::Phone => draft.phone = value,
            Field::Email => draft.email = value,
            Field::Signature => draft.signature = Signature::new(value),
            Field::Category => {
                let next = if value.trim().is_empty() {
                    None
                } else {
                    Some(Category::parse(&value).ok_or(FormError::UnknownCategory(value))?)
                };
                draft.category.select(next);
            }
            Field::SellerName | Field::SellerLastname => match &mut draft.category {
                CategoryDraft::Buyer { seller } if field == Field::SellerName => seller.name = value,
                CategoryDraft::Buyer { seller } => seller.lastname = value,
                _ => return Err(FormError::HiddenField(field)),
            },
            Field::PredecessorName | Field::PredecessorLastname => match &mut draft.category {
                CategoryDraft::Heir { predecessor } if field == Field::PredecessorName => {
                    predecessor.name = value
                }
                CategoryDraft::Heir { predecessor } => predecessor.lastname = value,
                _ => return Err(FormError::HiddenField(field)),
            },
        }
        Ok(())
    }

    /// Same as [`FormState::set_field`] but addressed by wire key.
    pub fn set_field_by_key(&mut self, key: &str, value: impl Into<String>) -> Result<(), FormError> {
        let field = Field::from_key(key).ok_or_else(|| FormError::UnknownField(key.to_string()))?;
        self.set_field(field, value)
    }

    pub fn field(&self, field: Field) -> &str {
        let draft = &self.draft;
        match field {
            Field::Name => draft.name.as_str(),
            Field::Lastname => draft.lastname.as_str(),
            Field::NationalId => draft.national_id.as_str(),
            Field::Phone => draft.phone.as_str(),
            Field::Email => draft.email.as_str(),
            Field::Signature => draft.signature.as_str(),
            Field::Category => draft.category.category().map(Category::as_str).unwrap_or(""),
            Field::SellerName => match &draft.category {
                CategoryDraft::Buyer { seller } => seller.name.as_str(),
                _ => "",
            },
            Field::SellerLastname => match &draft.category {
                CategoryDraft::Buyer { seller } => seller.lastname.as_str(),
                _ => "",
            },
            Field::PredecessorName => match &draft.category {
                CategoryDraft::Heir { predecessor } => predecessor.name.as_str(),
                _ => "",
            },
            Field::PredecessorLastname => match &draft.category {
                CategoryDraft::Heir { predecessor } => predecessor.lastname.as_str(),
                _ => "",
            },
        }
    }

    /// Recomputes every error and replaces the stored set.
    pub fn validate(&mut self) -> &ValidationErrors {
        self.errors = validate_draft(&self.draft);
        &self.errors
    }

    pub fn is_valid(&mut self) -> bool {
        self.validate().is_empty()
    }

    pub fn reset(&mut self) {
        self.draft = RegistrationDraft::default();
        self.errors = ValidationErrors::default();
    }

    pub fn clear_signature(&mut self) {
        self.draft.signature = Signature::default();
        self.errors.remove(Field::Signature);
    }

    pub fn sections(&self) -> VisibleSections {
        match self.draft.category {
            CategoryDraft::Buyer { .. } => VisibleSections {
                seller: true,
                predecessor: false,
            },
            CategoryDraft::Heir { .. } => VisibleSections {
                seller: false,
                predecessor: true,
            },
            _ => VisibleSections::default(),
        }
    }

    pub fn snapshot(&self) -> FormSnapshot {
        FormSnapshot {
            fields: Field::ALL
                .into_iter()
                .map(|field| (field.key(), self.field(field).to_string()))
                .collect(),
            errors: self.errors.clone(),
            sections: self.sections(),
        }
    }
}

fn phone_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\+?[\d\s\-()]+$").expect("phone pattern compiles"))
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles"))
}

pub fn is_valid_phone(value: &str) -> bool {
    phone_pattern().is_match(value)
}

pub fn is_valid_email(value: &str) -> bool {
    email_pattern().is_match(value)
}

fn require(errors: &mut ValidationErrors, field: Field, value: &str) {
    if value.trim().is_empty() {
        errors.insert(field, Issue::Required);
    }
}

fn validate_draft(draft: &RegistrationDraft) -> ValidationErrors {
    let mut errors = ValidationErrors::default();
    require(&mut errors, Field::Name, &draft.name);
    require(&mut errors, Field::Lastname, &draft.lastname);
    require(&mut errors, Field::NationalId, &draft.national_id);

    if draft.phone.trim().is_empty() {
        errors.insert(Field::Phone, Issue::Required);
    } else if !is_valid_phone(&draft.phone) {
        errors.insert(Field::Phone, Issue::InvalidFormat);
    }

    if draft.email.trim().is_empty() {
        errors.insert(Field::Email, Issue::Required);
    } else if !is_valid_email(&draft.email) {
        errors.insert(Field::Email, Issue::InvalidFormat);
    }

    if draft.signature.is_empty() {
        errors.insert(Field::Signature, Issue::Required);
    }

    match &draft.category {
        CategoryDraft::Unselected => errors.insert(Field::Category, Issue::Required),
        CategoryDraft::Founder => {}
        CategoryDraft::Buyer { seller } => {
            require(&mut errors, Field::SellerName, &seller.name);
            require(&mut errors, Field::SellerLastname, &seller.lastname);
        }
        CategoryDraft::Heir { predecessor } => {
            require(&mut errors, Field::PredecessorName, &predecessor.name);
            require(&mut errors, Field::PredecessorLastname, &predecessor.lastname);
        }
    }
    errors
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn filled_form(category: &str) -> FormState {
        let mut form = FormState::new();
        form.set_field(Field::Name, "Ana").unwrap();
        form.set_field(Field::Lastname, "Pérez").unwrap();
        form.set_field(Field::NationalId, "V-12345678").unwrap();
        form.set_field(Field::Phone, "+58 412-555-0101").unwrap();
        form.set_field(Field::Email, "ana@example.com").unwrap();
        form.set_field(Field::Category, category).unwrap();
        form.set_field(Field::Signature, "data:image/png;base64,iVBORw0KGgo=")
            .unwrap();
        form
    }

    #[test]
    fn empty_form_names_every_base_field() {
        let mut form = FormState::new();
        let fields: Vec<Field> = form.validate().fields().collect();
        assert_eq!(
            fields,
            vec![
                Field::Name,
                Field::Lastname,
                Field::NationalId,
                Field::Phone,
                Field::Email,
                Field::Category,
                Field::Signature,
            ]
        );
    }

    #[test]
    fn missing_fields_are_named_exactly() {
        let mut form = filled_form("fundador");
        form.set_field(Field::Lastname, "   ").unwrap();
        form.set_field(Field::Email, "").unwrap();
        let errors = form.validate();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors.get(Field::Lastname), Some(Issue::Required));
        assert_eq!(errors.get(Field::Email), Some(Issue::Required));
        assert_eq!(errors.message(Field::Email), Some("El email es requerido"));
    }

    #[test]
    fn phone_pattern_accepts_loose_formats() {
        for ok in ["+1 234-567-8900", "(0212) 555 0101", "04125550101", "+58-(412)-555"] {
            assert!(is_valid_phone(ok), "{ok} should pass");
        }
        for bad in ["phone", "+", "12a34", "++123", "123+"] {
            assert!(!is_valid_phone(bad), "{bad} should fail");
        }
    }

    #[test]
    fn email_pattern_needs_a_dotted_domain() {
        assert!(is_valid_email("a@b.co"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a@@b.co"));
        assert!(!is_valid_email("a b@c.de"));
        assert!(!is_valid_email("@b.co"));
    }

    #[test]
    fn malformed_values_are_flagged_as_format_issues() {
        let mut form = filled_form("fundador");
        form.set_field(Field::Phone, "call me").unwrap();
        form.set_field(Field::Email, "a@b").unwrap();
        let errors = form.validate();
        assert_eq!(errors.get(Field::Phone), Some(Issue::InvalidFormat));
        assert_eq!(errors.message(Field::Phone), Some("Formato de teléfono inválido"));
        assert_eq!(errors.get(Field::Email), Some(Issue::InvalidFormat));
    }

    #[test]
    fn patterns_see_the_raw_value() {
        let mut form = filled_form("fundador");
        form.set_field(Field::Phone, " +58 412-555-0101").unwrap();
        form.set_field(Field::Email, " a@b.co").unwrap();
        let errors = form.validate();
        assert_eq!(errors.get(Field::Phone), Some(Issue::InvalidFormat));
        assert_eq!(errors.get(Field::Email), Some(Issue::InvalidFormat));

        form.set_field(Field::Phone, "   ").unwrap();
        assert_eq!(form.validate().get(Field::Phone), Some(Issue::Required));
    }

    #[test]
    fn buyer_requires_only_seller_fields() {
        let mut form = filled_form("comprador");
        form.set_field(Field::SellerLastname, "Gómez").unwrap();
        let errors = form.validate();
        assert_eq!(errors.fields().collect::<Vec<_>>(), vec![Field::SellerName]);
    }

    #[test]
    fn heir_requires_only_predecessor_fields() {
        let mut form = filled_form("heredero");
        form.set_field(Field::PredecessorName, "Rosa").unwrap();
        let errors = form.validate();
        assert_eq!(
            errors.fields().collect::<Vec<_>>(),
            vec![Field::PredecessorLastname]
        );
    }

    #[test]
    fn hidden_sections_reject_input() {
        let mut form = filled_form("fundador");
        assert_eq!(
            form.set_field(Field::SellerName, "Luis"),
            Err(FormError::HiddenField(Field::SellerName))
        );
        assert_eq!(
            form.set_field(Field::Category, "vendedor"),
            Err(FormError::UnknownCategory("vendedor".into()))
        );
        assert_eq!(
            form.set_field_by_key("apodo", "x"),
            Err(FormError::UnknownField("apodo".into()))
        );
    }

    #[test]
    fn switching_category_discards_the_previous_section() {
        let mut form = filled_form("comprador");
        form.set_field(Field::SellerName, "Luis").unwrap();
        form.set_field(Field::Category, "comprador").unwrap();
        assert_eq!(form.field(Field::SellerName), "Luis");

        form.set_field(Field::Category, "heredero").unwrap();
        assert_eq!(form.field(Field::SellerName), "");
        assert_eq!(
            form.sections(),
            VisibleSections {
                seller: false,
                predecessor: true
            }
        );

        form.set_field(Field::Category, "comprador").unwrap();
        assert_eq!(form.field(Field::SellerName), "");
    }

    #[test]
    fn validation_replaces_rather_than_merges() {
        let mut form = filled_form("fundador");
        form.set_field(Field::Name, "").unwrap();
        assert!(form.validate().contains(Field::Name));

        form.set_field(Field::Name, "Ana").unwrap();
        assert!(form.errors().contains(Field::Name));
        assert!(form.is_valid());
        assert!(form.errors().is_empty());
    }

    #[test]
    fn clear_signature_drops_only_that_error() {
        let mut form = FormState::new();
        form.validate();
        form.clear_signature();
        assert!(!form.errors().contains(Field::Signature));
        assert!(form.errors().contains(Field::Name));
    }

    #[test]
    fn reset_returns_to_the_initial_state() {
        let mut form = filled_form("heredero");
        form.set_field(Field::PredecessorName, "Rosa").unwrap();
        form.validate();
        form.reset();
        assert_eq!(form.draft(), &RegistrationDraft::default());
        assert!(form.errors().is_empty());
    }

    #[test]
    fn payload_is_trimmed_and_keeps_only_the_active_section() {
        let mut form = filled_form("heredero");
        form.set_field(Field::Name, "  Ana ").unwrap();
        form.set_field(Field::PredecessorName, " Rosa").unwrap();
        form.set_field(Field::PredecessorLastname, "Díaz ").unwrap();
        let payload = form.draft().to_registration().unwrap();
        assert_eq!(payload.name, "Ana");
        assert_eq!(
            payload.details,
            CategoryDetails::Heir {
                predecessor: PartyName::new("Rosa", "Díaz")
            }
        );
        assert!(FormState::new().draft().to_registration().is_none());
    }

    #[test]
    fn snapshot_serializes_errors_by_wire_key() {
        let mut form = filled_form("comprador");
        form.validate();
        let value = serde_json::to_value(form.snapshot()).unwrap();
        assert_eq!(
            value["errors"]["bought_from_name"],
            "El nombre del vendedor es requerido"
        );
        assert_eq!(value["fields"]["tipo"], "comprador");
        assert_eq!(value["sections"]["seller"], true);
    }
}
