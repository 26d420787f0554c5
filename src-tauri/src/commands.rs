use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tauri::{AppHandle, Manager, State};
use tauri_plugin_opener::OpenerExt;
use tracing::{info, warn};

use crate::auth::{AdminAuthority, Identity, PasswordAuthority};
use crate::config::AppConfig;
use crate::export::{ExportDocument, ExportKind};
use crate::form::FormSnapshot;
use crate::listing::{self, CategoryFilter, DeleteError, RegistrationListing};
use crate::logging;
use crate::storage::{write_text_file, AUTH_FILE, EXPORTS_DIR, STORE_FILE};
use crate::store::{EncryptedFileStore, MemoryStore, RecordStore};
use crate::submission::{Outcome, RegistrationDesk, SubmissionCoordinator};

pub struct AppState {
    root: PathBuf,
    config: AppConfig,
    store: Arc<dyn RecordStore>,
    desk: Mutex<RegistrationDesk>,
    authority: PasswordAuthority,
}

impl AppState {
    fn initialize(app: &AppHandle) -> Result<Self, String> {
        let root = storage_root_dir(app)?;
        let config = AppConfig::load(&root).map_err(|err| err.to_string())?;
        logging::init(&config.log_level);

        let store: Arc<dyn RecordStore> = match std::env::var(&config.store_passphrase_env) {
            Ok(passphrase) if !passphrase.is_empty() => Arc::new(
                EncryptedFileStore::open(
                    root.join(STORE_FILE),
                    passphrase.as_str(),
                    config.pbkdf2_iterations,
                )
                .map_err(|err| err.to_string())?,
            ),
            _ => {
                warn!(
                    env = %config.store_passphrase_env,
                    "no store key set; registrations are kept in memory only"
                );
                Arc::new(MemoryStore::new())
            }
        };
        let coordinator = SubmissionCoordinator::new(store.clone(), config.duplicate_check);
        let authority = PasswordAuthority::new(root.join(AUTH_FILE), config.pbkdf2_iterations);
        info!(root = %root.display(), "registro started");
        Ok(Self {
            root,
            config,
            store,
            desk: Mutex::new(RegistrationDesk::new(coordinator)),
            authority,
        })
    }

    fn desk(&self) -> Result<MutexGuard<'_, RegistrationDesk>, String> {
        self.desk
            .lock()
            .map_err(|_| "form state is unavailable".to_string())
    }

    fn listing(&self, filter: CategoryFilter) -> Result<RegistrationListing, String> {
        listing::list_registrations(self.store.as_ref(), filter).map_err(|err| err.to_string())
    }
}

#[derive(Deserialize)]
struct FormSetFieldRequest {
    field: String,
    value: String,
}

#[derive(Deserialize)]
struct ListRequest {
    #[serde(default)]
    filter: CategoryFilter,
}

#[derive(Deserialize)]
struct DeleteRequest {
    id: String,
}

#[derive(Deserialize)]
struct CredentialsRequest {
    user: String,
    password: String,
}

#[derive(Deserialize)]
struct AddAccountRequest {
    user: String,
    password: String,
    #[serde(default)]
    admin: bool,
}

#[derive(Deserialize)]
struct AuthChangeRequest {
    current: String,
    next: String,
}

#[derive(Serialize)]
struct SubmitResult {
    outcome: Outcome,
    form: FormSnapshot,
}

#[derive(Serialize)]
struct SaveExportResult {
    ok: bool,
    canceled: bool,
    filename: String,
    path: Option<String>,
    truncated: bool,
}

#[tauri::command]
fn app_version(app: AppHandle) -> String {
    app.package_info().version.to_string()
}

#[tauri::command]
fn platform_name() -> String {
    match std::env::consts::OS {
        "windows" => "win32",
        "macos" => "darwin",
        "android" => "android",
        _ => "linux",
    }
    .to_string()
}

#[tauri::command]
fn form_snapshot(state: State<'_, AppState>) -> Result<FormSnapshot, String> {
    Ok(state.desk()?.form().snapshot())
}

#[tauri::command]
fn form_set_field(
    state: State<'_, AppState>,
    payload: FormSetFieldRequest,
) -> Result<FormSnapshot, String> {
    let mut desk = state.desk()?;
    desk.form_mut()
        .set_field_by_key(payload.field.as_str(), payload.value)
        .map_err(|err| err.to_string())?;
    Ok(desk.form().snapshot())
}

#[tauri::command]
fn form_validate(state: State<'_, AppState>) -> Result<FormSnapshot, String> {
    let mut desk = state.desk()?;
    desk.form_mut().validate();
    Ok(desk.form().snapshot())
}

#[tauri::command]
fn form_reset(state: State<'_, AppState>) -> Result<FormSnapshot, String> {
    let mut desk = state.desk()?;
    desk.form_mut().reset();
    Ok(desk.form().snapshot())
}

#[tauri::command]
fn form_clear_signature(state: State<'_, AppState>) -> Result<FormSnapshot, String> {
    let mut desk = state.desk()?;
    desk.form_mut().clear_signature();
    Ok(desk.form().snapshot())
}

#[tauri::command]
fn registration_submit(state: State<'_, AppState>) -> Result<SubmitResult, String> {
    let mut desk = state.desk()?;
    let outcome = desk.submit();
    Ok(SubmitResult {
        outcome,
        form: desk.form().snapshot(),
    })
}

#[tauri::command]
fn registrations_list(
    state: State<'_, AppState>,
    payload: ListRequest,
) -> Result<RegistrationListing, String> {
    state.listing(payload.filter)
}

#[tauri::command]
fn registration_delete(
    state: State<'_, AppState>,
    payload: DeleteRequest,
) -> Result<serde_json::Value, String> {
    match listing::delete_registration(&state.authority, state.store.as_ref(), payload.id.trim()) {
        Ok(()) => Ok(json!({ "ok": true })),
        Err(err @ DeleteError::Unauthorized { sign_in_required }) => Ok(json!({
            "ok": false,
            "error": err.to_string(),
            "signInRequired": sign_in_required,
        })),
        Err(err) => Ok(json!({ "ok": false, "error": err.to_string() })),
    }
}

#[tauri::command]
fn auth_status(state: State<'_, AppState>) -> Result<serde_json::Value, String> {
    let configured = state
        .authority
        .is_configured()
        .map_err(|err| err.to_string())?;
    Ok(json!({
        "configured": configured,
        "identity": state.authority.current_identity(),
    }))
}

#[tauri::command]
fn auth_setup(state: State<'_, AppState>, payload: CredentialsRequest) -> Result<bool, String> {
    state
        .authority
        .setup(payload.user.as_str(), payload.password.as_str())
        .map_err(|err| err.to_string())?;
    Ok(true)
}

#[tauri::command]
fn auth_sign_in(
    state: State<'_, AppState>,
    payload: CredentialsRequest,
) -> Result<Identity, String> {
    state
        .authority
        .sign_in(payload.user.as_str(), payload.password.as_str())
        .map_err(|err| err.to_string())
}

#[tauri::command]
fn auth_sign_out(state: State<'_, AppState>) {
    state.authority.sign_out();
}

#[tauri::command]
fn auth_change(state: State<'_, AppState>, payload: AuthChangeRequest) -> Result<bool, String> {
    state
        .authority
        .change_password(payload.current.as_str(), payload.next.as_str())
        .map_err(|err| err.to_string())?;
    Ok(true)
}

#[tauri::command]
fn auth_add_account(
    state: State<'_, AppState>,
    payload: AddAccountRequest,
) -> Result<bool, String> {
    state
        .authority
        .add_account(payload.user.as_str(), payload.password.as_str(), payload.admin)
        .map_err(|err| err.to_string())?;
    Ok(true)
}

fn build_export(state: &AppState, filter: CategoryFilter) -> Result<ExportDocument, String> {
    let listing = state.listing(filter)?;
    ExportDocument::build(
        &listing.records,
        filter,
        Utc::now(),
        state.config.export_row_limit,
    )
    .map_err(|err| err.to_string())
}

#[tauri::command]
fn export_spreadsheet(
    state: State<'_, AppState>,
    payload: ListRequest,
) -> Result<SaveExportResult, String> {
    let document = build_export(&state, payload.filter)?;
    let filename = document.file_name(ExportKind::Spreadsheet);
    let path = rfd::FileDialog::new()
        .set_file_name(filename.as_str())
        .add_filter("CSV", &["csv"])
        .save_file();

    let Some(path) = path else {
        return Ok(SaveExportResult {
            ok: false,
            canceled: true,
            filename,
            path: None,
            truncated: document.truncated(),
        });
    };

    write_text_file(&path, document.render(ExportKind::Spreadsheet).as_str())
        .map_err(|err| err.to_string())?;
    info!(path = %path.display(), rows = document.rows().len(), "spreadsheet exported");
    Ok(SaveExportResult {
        ok: true,
        canceled: false,
        filename,
        path: Some(path.to_string_lossy().to_string()),
        truncated: document.truncated(),
    })
}

#[tauri::command]
fn export_printable(
    app: AppHandle,
    state: State<'_, AppState>,
    payload: ListRequest,
) -> Result<SaveExportResult, String> {
    let document = build_export(&state, payload.filter)?;
    let filename = document.file_name(ExportKind::Printable);
    let path = state.root.join(EXPORTS_DIR).join(filename.as_str());
    write_text_file(&path, document.render(ExportKind::Printable).as_str())
        .map_err(|err| err.to_string())?;
    app.opener()
        .open_path(path.to_string_lossy().to_string(), Option::<String>::None)
        .map_err(|err: tauri_plugin_opener::Error| err.to_string())?;
    info!(path = %path.display(), rows = document.rows().len(), "printable exported");
    Ok(SaveExportResult {
        ok: true,
        canceled: false,
        filename,
        path: Some(path.to_string_lossy().to_string()),
        truncated: document.truncated(),
    })
}

fn storage_root_dir(app: &AppHandle) -> Result<PathBuf, String> {
    let base = app.path().app_data_dir().map_err(|err| err.to_string())?;
    let root = base.join("Registro");
    fs::create_dir_all(root.as_path()).map_err(|err| err.to_string())?;
    Ok(root)
}

pub(crate) fn run() {
    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .setup(|app| {
            let state = AppState::initialize(app.handle())?;
            app.manage(state);
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            app_version,
            platform_name,
            form_snapshot,
            form_set_field,
            form_validate,
            form_reset,
            form_clear_signature,
            registration_submit,
            registrations_list,
            registration_delete,
            auth_status,
            auth_setup,
            auth_sign_in,
            auth_sign_out,
            auth_change,
            auth_add_account,
            export_spreadsheet,
            export_printable
        ])
        .run(tauri::generate_context!())
        .expect("failed to run Registro");
}
