//! Registration capture: a form with category-dependent sections and a drawn
//! signature, duplicate-safe submission into an encrypted record store, an
//! admin-gated delete, and spreadsheet/printable exports of the filtered table.
//!
//! The desktop shell (feature `desktop`) binds these pieces to a Tauri webview.

pub mod auth;
pub mod config;
pub mod crypto;
pub mod export;
pub mod form;
pub mod listing;
pub mod logging;
pub mod model;
pub mod storage;
pub mod store;
pub mod submission;

#[cfg(feature = "desktop")]
mod commands;

pub use auth::{AdminAuthority, Identity, PasswordAuthority, StaticAuthority};
pub use config::AppConfig;
pub use export::{ExportDocument, ExportKind};
pub use form::{Field, FormState, ValidationErrors};
pub use listing::{delete_registration, list_registrations, CategoryFilter, DeleteError};
pub use model::{Category, CategoryDetails, NewRegistration, PartyName, Registration, Signature};
pub use store::{EncryptedFileStore, MemoryStore, RecordFilter, RecordStore, StoreError};
pub use submission::{DuplicateCheck, Outcome, RegistrationDesk, SubmissionCoordinator};

#[cfg(feature = "desktop")]
pub fn run() {
    commands::run();
}
