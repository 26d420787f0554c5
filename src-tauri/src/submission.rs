//! One submission attempt from validation to insert.
//!
//! The flow is validate → duplicate check (national ID, then phone) → insert. Every
//! failure ends the attempt with an [`Outcome`]; nothing is retried. The duplicate
//! check and the insert are separate store calls, so two concurrent submissions with
//! the same national ID can both pass the check and both be inserted.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::form::{Field, FormState, ValidationErrors};
use crate::model::Registration;
use crate::store::{RecordFilter, RecordStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuplicateCheck {
    pub national_id: bool,
    pub phone: bool,
}

impl Default for DuplicateCheck {
    fn default() -> Self {
        Self {
            national_id: true,
            phone: true,
        }
    }
}

impl DuplicateCheck {
    pub fn disabled() -> Self {
        Self {
            national_id: false,
            phone: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum Outcome {
    Success(Registration),
    ValidationFailed(ValidationErrors),
    Duplicate {
        field: Field,
        message: String,
        conflicting_id: String,
    },
    PersistenceError(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
}

fn duplicate_message(field: Field, existing: &Registration) -> String {
    let what = match field {
        Field::NationalId => "esta cédula",
        Field::Phone => "este teléfono",
        _ => "este valor",
    };
    format!(
        "Ya existe un registro con {what}: {}",
        existing.full_name()
    )
}

#[derive(Clone)]
pub struct SubmissionCoordinator {
    store: Arc<dyn RecordStore>,
    checks: DuplicateCheck,
}

impl SubmissionCoordinator {
    pub fn new(store: Arc<dyn RecordStore>, checks: DuplicateCheck) -> Self {
        Self { store, checks }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn checks(&self) -> DuplicateCheck {
        self.checks
    }

    /// Runs one attempt. The form keeps its draft on every outcome; resetting after
    /// success is the caller's job (see [`RegistrationDesk::submit`]).
    pub fn submit(&self, form: &mut FormState) -> Outcome {
        let errors = form.validate();
        if !errors.is_empty() {
            debug!(fields = errors.len(), "submission rejected by validation");
            return Outcome::ValidationFailed(errors.clone());
        }
        let Some(payload) = form.draft().to_registration() else {
            return Outcome::ValidationFailed(form.errors().clone());
        };

        let mut lookups = Vec::with_capacity(2);
        if self.checks.national_id {
            lookups.push((Field::NationalId, RecordFilter::NationalId(payload.national_id.clone())));
        }
        if self.checks.phone {
            lookups.push((Field::Phone, RecordFilter::Phone(payload.phone.clone())));
        }
        for (field, filter) in lookups {
            match self.store.find_one(&filter) {
                Ok(Some(existing)) => {
                    info!(field = field.key(), conflicting = %existing.id, "duplicate registration");
                    return Outcome::Duplicate {
                        field,
                        message: duplicate_message(field, &existing),
                        conflicting_id: existing.id,
                    };
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(field = field.key(), error = %err, "duplicate check failed");
                    return Outcome::PersistenceError(err.to_string());
                }
            }
        }

        match self.store.insert(payload) {
            Ok(record) => {
                info!(id = %record.id, category = %record.category(), "registration stored");
                Outcome::Success(record)
            }
            Err(err) => {
                warn!(error = %err, "registration insert failed");
                Outcome::PersistenceError(err.to_string())
            }
        }
    }
}

/// The form a window is editing together with the coordinator that submits it.
pub struct RegistrationDesk {
    form: FormState,
    coordinator: SubmissionCoordinator,
}

impl RegistrationDesk {
    pub fn new(coordinator: SubmissionCoordinator) -> Self {
        Self {
            form: FormState::new(),
            coordinator,
        }
    }

    pub fn form(&self) -> &FormState {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut FormState {
        &mut self.form
    }

    pub fn coordinator(&self) -> &SubmissionCoordinator {
        &self.coordinator
    }

    /// Submits the current draft and clears the form when the store accepted it.
    pub fn submit(&mut self) -> Outcome {
        let outcome = self.coordinator.submit(&mut self.form);
        if outcome.is_success() {
            self.form.reset();
        }
        outcome
    }
}
