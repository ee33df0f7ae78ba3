//! Tests for parameter extraction, the wire codec, and value resolution.
//!
//! Validates spec round-tripping, override precedence, and boolean parsing.

use cuberun::{flag_name, resolve, ParamDecl, ParamSpec, ParamType, ParamValue};
use std::collections::{BTreeMap, HashMap};

fn expected_spec() -> ParamSpec {
    ParamSpec::new(BTreeMap::from([
        (
            "some_int".to_string(),
            ParamDecl {
                ty: ParamType::Int,
                default: Some(ParamValue::Int(42)),
            },
        ),
        (
            "some_float".to_string(),
            ParamDecl {
                ty: ParamType::Float,
                default: Some(ParamValue::Float(3.14159)),
            },
        ),
        (
            "some_string".to_string(),
            ParamDecl {
                ty: ParamType::Str,
                default: Some(ParamValue::Str("foo".to_string())),
            },
        ),
        (
            "some_bool".to_string(),
            ParamDecl {
                ty: ParamType::Bool,
                default: Some(ParamValue::Bool(false)),
            },
        ),
    ]))
}

const PARAMS_YAML: &str = "
some_int:
    type: int
    default: 42
some_float:
    type: float
    default: 3.14159
some_string:
    type: str
    default: foo
some_bool:
    type: bool
    default: false
";

// =============================================================================
// Extraction Tests
// =============================================================================

#[test]
fn test_spec_from_code() {
    let spec = ParamSpec::from_code(
        "\nsome_int = 42\nsome_float = 3.14159\nsome_string = \"foo\"\nsome_bool = False\n",
    );
    assert_eq!(spec, expected_spec());
}

#[test]
fn test_spec_from_code_single_quotes() {
    let spec = ParamSpec::from_code("region = 'baltic'\n");
    assert_eq!(
        spec.get("region").unwrap().default,
        Some(ParamValue::Str("baltic".to_string()))
    );
}

// =============================================================================
// Codec Tests
// =============================================================================

#[test]
fn test_spec_to_yaml() {
    let text = expected_spec().to_yaml().unwrap();
    let parsed: serde_yaml::Value = serde_yaml::from_str(&text).unwrap();
    assert_eq!(parsed["some_int"]["type"], "int");
    assert_eq!(parsed["some_int"]["default"], 42);
    assert_eq!(parsed["some_bool"]["default"], false);
    assert_eq!(parsed["some_string"]["default"], "foo");
}

#[test]
fn test_spec_from_yaml() {
    assert_eq!(ParamSpec::from_yaml(PARAMS_YAML).unwrap(), expected_spec());
}

#[test]
fn test_spec_round_trip() {
    let spec = expected_spec();
    let round_tripped = ParamSpec::from_yaml(&spec.to_yaml().unwrap()).unwrap();
    assert_eq!(round_tripped, spec);
}

#[test]
fn test_spec_from_yaml_with_dataset() {
    let spec = ParamSpec::from_yaml("some_ds:\n    type: Dataset\n    default: null\n").unwrap();
    assert_eq!(
        spec.get("some_ds").unwrap(),
        &ParamDecl {
            ty: ParamType::Dataset,
            default: None,
        }
    );
    assert_eq!(spec.dataset_names(), vec!["some_ds".to_string()]);
}

#[test]
fn test_dataset_never_carries_default() {
    let mut params = BTreeMap::new();
    params.insert(
        "ds".to_string(),
        ParamDecl {
            ty: ParamType::Dataset,
            default: Some(ParamValue::Int(1)),
        },
    );
    let text = ParamSpec::new(params).to_yaml().unwrap();
    let parsed: serde_yaml::Value = serde_yaml::from_str(&text).unwrap();
    assert_eq!(parsed["ds"]["default"], serde_yaml::Value::Null);
}

#[test]
fn test_unknown_type_token_is_parse_error() {
    let err = ParamSpec::from_yaml("x:\n    type: quaternion\n    default: null\n").unwrap_err();
    let message = err.to_string();
    assert!(message.contains("x"), "error names the entry: {message}");
    assert!(message.contains("quaternion"));
}

#[test]
fn test_malformed_text_is_parse_error() {
    assert!(ParamSpec::from_yaml(": : :").is_err());
}

// =============================================================================
// Resolution Tests
// =============================================================================

#[test]
fn test_read_cli_arguments() {
    let args: Vec<String> = [
        "execute",
        "--some-int",
        "23",
        "--some-string",
        "bar",
        "--irrelevant-argument",
        "--some-float",
        "2.71828",
        "--some-bool",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    let ctx = resolve(&expected_spec(), &HashMap::new(), &args).unwrap();
    assert_eq!(
        ctx.values,
        BTreeMap::from([
            ("some_int".to_string(), ParamValue::Int(23)),
            ("some_float".to_string(), ParamValue::Float(2.71828)),
            ("some_string".to_string(), ParamValue::Str("bar".to_string())),
            ("some_bool".to_string(), ParamValue::Bool(true)),
        ])
    );

    let empty = resolve(&expected_spec(), &HashMap::new(), &[]).unwrap();
    assert!(empty.values.is_empty());
}

#[test]
fn test_read_env_arguments() {
    let env: HashMap<String, String> = [
        ("cuberun_some_int", "42"),
        ("cuberun_some_float", "3.14159"),
        ("cuberun_some_string", "foo"),
        ("cuberun_some_bool", "False"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    let ctx = resolve(&expected_spec(), &env, &[]).unwrap();
    assert_eq!(
        ctx.values,
        BTreeMap::from([
            ("some_int".to_string(), ParamValue::Int(42)),
            ("some_float".to_string(), ParamValue::Float(3.14159)),
            ("some_string".to_string(), ParamValue::Str("foo".to_string())),
            ("some_bool".to_string(), ParamValue::Bool(false)),
        ])
    );
}

#[test]
fn test_combined_precedence_cli_wins() {
    let env: HashMap<String, String> = [
        ("cuberun_some_int", "42"),
        ("cuberun_some_float", "3.14159"),
        ("cuberun_some_string", "foo"),
        ("cuberun_some_bool", "False"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    let args: Vec<String> = [
        "execute",
        "--some-string",
        "bar",
        "--irrelevant-argument",
        "--some-float",
        "2.71828",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    let ctx = resolve(&expected_spec(), &env, &args).unwrap();
    assert_eq!(
        ctx.values,
        BTreeMap::from([
            ("some_int".to_string(), ParamValue::Int(42)),
            ("some_float".to_string(), ParamValue::Float(2.71828)),
            ("some_string".to_string(), ParamValue::Str("bar".to_string())),
            ("some_bool".to_string(), ParamValue::Bool(false)),
        ])
    );
}

#[test]
fn test_boolean_falsy_set() {
    for falsy in ["False", "false", "FALSE", "0", ""] {
        let env = HashMap::from([("cuberun_some_bool".to_string(), falsy.to_string())]);
        let ctx = resolve(&expected_spec(), &env, &[]).unwrap();
        assert_eq!(
            ctx.values["some_bool"],
            ParamValue::Bool(false),
            "value {falsy:?} should be falsy"
        );
    }
    for truthy in ["True", "1", "yes", "anything"] {
        let env = HashMap::from([("cuberun_some_bool".to_string(), truthy.to_string())]);
        let ctx = resolve(&expected_spec(), &env, &[]).unwrap();
        assert_eq!(
            ctx.values["some_bool"],
            ParamValue::Bool(true),
            "value {truthy:?} should be truthy"
        );
    }
}

#[test]
fn test_unparseable_override_names_parameter() {
    let env = HashMap::from([("cuberun_some_int".to_string(), "twelve".to_string())]);
    let err = resolve(&expected_spec(), &env, &[]).unwrap_err();
    assert!(err.to_string().contains("some_int"));
}

#[test]
fn test_flag_name_derivation() {
    assert_eq!(flag_name("some_int"), "--some-int");
    assert_eq!(flag_name("a_b_c"), "--a-b-c");
}
