mod common;

use common::{person_ref, persistent_record, plain_context};
use entitybind_core::{BufferMode, ConfigError, RecordError, RecordOptions};

#[test]
fn options_from_json_configure_the_record() {
    let options = RecordOptions::from_json_str(
        r#"{
            "buffered": true,
            "nested_properties": ["address.street", "manager.name"],
            "read_only_properties": ["age"]
        }"#,
    )
    .expect("valid options");

    let context = plain_context();
    let mut record = persistent_record(&context, person_ref(1, "Alice"));
    options.apply(&mut record).expect("apply options");

    assert_eq!(record.mode(), BufferMode::FullyBuffered);
    assert!(record.has_property("address.street"));
    assert!(record.has_property("manager.name"));
    assert!(matches!(
        record.set_value("age", 40),
        Err(RecordError::ReadOnly(_))
    ));
    assert!(!context.properties().has_property("address.street"));
}

#[test]
fn apply_reports_the_failing_option() {
    let options = RecordOptions {
        nested_properties: vec!["name.first".to_string()],
        ..RecordOptions::default()
    };
    let context = plain_context();
    let mut record = persistent_record(&context, person_ref(1, "Alice"));

    let err = options.apply(&mut record).expect_err("name is not nestable");
    match err {
        ConfigError::Apply { option, source } => {
            assert_eq!(option, "nested_properties:name.first");
            assert!(matches!(source, RecordError::NotNestable { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(record.mode(), BufferMode::PassThrough);
}

#[test]
fn malformed_json_is_a_parse_error() {
    let err = RecordOptions::from_json_str("{\"buffered\": \"yes\"}").expect_err("wrong type");
    assert!(matches!(err, ConfigError::Parse(_)));
    assert!(err.to_string().starts_with("invalid record options"));
}
