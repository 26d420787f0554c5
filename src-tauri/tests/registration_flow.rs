use std::sync::Arc;

use chrono::Utc;
use registro::{
    delete_registration, list_registrations, AdminAuthority, AppConfig, Category, CategoryFilter,
    DeleteError, EncryptedFileStore, ExportDocument, ExportKind, Field, Outcome,
    PasswordAuthority, RecordStore, RegistrationDesk, SubmissionCoordinator,
};

const SIGNATURE: &str = "data:image/png;base64,iVBORw0KGgo=";

fn fill(desk: &mut RegistrationDesk, values: &[(&str, &str)]) {
    for (key, value) in values {
        desk.form_mut().set_field_by_key(key, *value).unwrap();
    }
}

fn base_fields<'a>(national_id: &'a str, phone: &'a str) -> Vec<(&'static str, &'a str)> {
    vec![
        ("name", "Ana"),
        ("lastname", "Pérez"),
        ("cedula", national_id),
        ("phone", phone),
        ("email", "ana@example.com"),
        ("signature", SIGNATURE),
    ]
}

#[test]
fn capture_list_export_and_delete_against_an_encrypted_store() {
    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig {
        pbkdf2_iterations: 10,
        ..AppConfig::default()
    };
    config.save(dir.path()).unwrap();
    let config = AppConfig::load(dir.path()).unwrap();
    assert_eq!(config.pbkdf2_iterations, 10);

    let store_path = dir.path().join("registrations.enc");
    let store: Arc<dyn RecordStore> = Arc::new(
        EncryptedFileStore::open(&store_path, "clave", config.pbkdf2_iterations).unwrap(),
    );
    let mut desk = RegistrationDesk::new(SubmissionCoordinator::new(
        store.clone(),
        config.duplicate_check,
    ));

    fill(&mut desk, &base_fields("V-100", "+58 412-000-0001"));
    fill(
        &mut desk,
        &[
            ("tipo", "comprador"),
            ("bought_from_name", "Luis"),
            ("bought_from_lastname", "Rojas"),
        ],
    );
    let first = match desk.submit() {
        Outcome::Success(record) => record,
        other => panic!("unexpected outcome {other:?}"),
    };
    assert_eq!(first.category(), Category::Buyer);
    assert!(desk.form().field(Field::Name).is_empty());

    fill(&mut desk, &base_fields("V-200", "+58 412-000-0002"));
    fill(&mut desk, &[("tipo", "fundador")]);
    assert!(desk.submit().is_success());

    // Same phone as the first record under a fresh national ID.
    fill(&mut desk, &base_fields("V-300", "+58 412-000-0001"));
    fill(&mut desk, &[("tipo", "fundador")]);
    match desk.submit() {
        Outcome::Duplicate {
            field,
            conflicting_id,
            message,
        } => {
            assert_eq!(field, Field::Phone);
            assert_eq!(conflicting_id, first.id);
            assert_eq!(message, "Ya existe un registro con este teléfono: Ana Pérez");
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(desk.form().field(Field::NationalId), "V-300");

    drop(desk);
    drop(store);
    let store = EncryptedFileStore::open(&store_path, "clave", config.pbkdf2_iterations).unwrap();
    let listing = list_registrations(&store, CategoryFilter::Only(Category::Founder)).unwrap();
    assert_eq!(listing.total, 2);
    assert_eq!(listing.records.len(), 1);
    assert_eq!(listing.records[0].national_id, "V-200");

    let document = ExportDocument::build(
        &listing.records,
        listing.filter,
        Utc::now(),
        config.export_row_limit,
    )
    .unwrap();
    let csv = document.render(ExportKind::Spreadsheet);
    assert_eq!(csv.lines().count(), 2);
    assert!(csv.lines().nth(1).unwrap().starts_with("Ana,Pérez,V-200,"));
    assert!(document
        .file_name(ExportKind::Printable)
        .starts_with("registrations_fundador_"));
    assert!(document
        .render(ExportKind::Printable)
        .contains("Registration Records - Fundador"));

    let authority = PasswordAuthority::new(dir.path().join("auth.json"), 10);
    assert!(matches!(
        delete_registration(&authority, &store, first.id.as_str()),
        Err(DeleteError::Unauthorized { .. })
    ));
    authority.setup("admin", "secreto").unwrap();
    authority.sign_in("admin", "secreto").unwrap();
    assert!(authority.is_admin());
    delete_registration(&authority, &store, first.id.as_str()).unwrap();

    let remaining = list_registrations(&store, CategoryFilter::All).unwrap();
    assert_eq!(remaining.total, 1);
    assert_eq!(remaining.records[0].national_id, "V-200");
}

#[test]
fn hidden_section_values_do_not_reach_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn RecordStore> =
        Arc::new(EncryptedFileStore::open(dir.path().join("r.enc"), "k", 10).unwrap());
    let mut desk = RegistrationDesk::new(SubmissionCoordinator::new(
        store.clone(),
        Default::default(),
    ));

    fill(&mut desk, &base_fields("E-1", "0212 555 1234"));
    fill(
        &mut desk,
        &[
            ("tipo", "heredero"),
            ("inherited_from_name", "Rosa"),
            ("inherited_from_lastname", "Díaz"),
            ("tipo", "fundador"),
        ],
    );
    let record = match desk.submit() {
        Outcome::Success(record) => record,
        other => panic!("unexpected outcome {other:?}"),
    };
    let row = serde_json::to_value(&record).unwrap();
    assert_eq!(row["tipo"], "fundador");
    assert!(row["inherited_from_name"].is_null());
    assert!(row["bought_from_name"].is_null());
}
