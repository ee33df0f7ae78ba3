//! Tests for workflow-description output.
//!
//! Validates the two-node graph shape, per-parameter inputs, scalar input
//! bindings, and the container requirement.

use cuberun::{write_workflow, ParamDecl, ParamSpec, ParamType, ParamValue};
use serde_yaml::Value;
use std::collections::BTreeMap;

fn spec_with_dataset() -> ParamSpec {
    ParamSpec::new(BTreeMap::from([
        (
            "some_int".to_string(),
            ParamDecl {
                ty: ParamType::Int,
                default: Some(ParamValue::Int(42)),
            },
        ),
        (
            "some_bool".to_string(),
            ParamDecl {
                ty: ParamType::Bool,
                default: Some(ParamValue::Bool(false)),
            },
        ),
        (
            "some_ds".to_string(),
            ParamDecl {
                ty: ParamType::Dataset,
                default: None,
            },
        ),
    ]))
}

fn generate() -> Value {
    let text = write_workflow(&spec_with_dataset(), "cuberun:2025.01.31.12.00.00").unwrap();
    serde_yaml::from_str(&text).unwrap()
}

fn graph(doc: &Value) -> &Vec<Value> {
    doc["$graph"].as_sequence().unwrap()
}

fn node<'a>(doc: &'a Value, class: &str) -> &'a Value {
    graph(doc)
        .iter()
        .find(|n| n["class"] == class)
        .unwrap_or_else(|| panic!("no {class} node"))
}

// =============================================================================
// Graph Shape Tests
// =============================================================================

#[test]
fn test_graph_has_exactly_one_workflow_and_one_tool() {
    let doc = generate();
    assert_eq!(doc["cwlVersion"], "v1.0");
    assert_eq!(graph(&doc).len(), 2);
    node(&doc, "Workflow");
    node(&doc, "CommandLineTool");
}

#[test]
fn test_workflow_declares_one_input_per_parameter() {
    let doc = generate();
    let inputs = &node(&doc, "Workflow")["inputs"];
    assert_eq!(inputs.as_mapping().unwrap().len(), 3);
    assert_eq!(inputs["some_int"]["type"], "long");
    assert_eq!(inputs["some_int"]["default"], 42);
    assert_eq!(inputs["some_int"]["label"], "some_int");
    assert_eq!(inputs["some_bool"]["type"], "boolean");
    assert_eq!(inputs["some_ds"]["type"], "Directory");
}

#[test]
fn test_workflow_step_sources_from_workflow_inputs() {
    let doc = generate();
    let workflow = node(&doc, "Workflow");
    let steps = workflow["steps"].as_mapping().unwrap();
    assert_eq!(steps.len(), 1);
    let step = &workflow["steps"]["run_script"];
    assert_eq!(step["run"], "#cuberun_script");
    assert_eq!(step["in"]["some_int"], "some_int");
    assert_eq!(step["in"]["some_ds"], "some_ds");
}

#[test]
fn test_workflow_has_directory_output() {
    let doc = generate();
    let outputs = &node(&doc, "Workflow")["outputs"];
    assert_eq!(outputs.as_mapping().unwrap().len(), 1);
    assert_eq!(outputs["results"]["type"], "Directory");
}

// =============================================================================
// Tool Node Tests
// =============================================================================

#[test]
fn test_tool_declares_image_requirement() {
    let doc = generate();
    let tool = node(&doc, "CommandLineTool");
    assert_eq!(
        tool["requirements"]["DockerRequirement"]["dockerPull"],
        "cuberun:2025.01.31.12.00.00"
    );
}

#[test]
fn test_tool_binds_scalars_only() {
    let doc = generate();
    let inputs = &node(&doc, "CommandLineTool")["inputs"];
    assert_eq!(
        inputs.as_mapping().unwrap().len(),
        2,
        "dataset parameters carry no tool binding"
    );
    assert_eq!(inputs["some_int"]["inputBinding"]["prefix"], "--some-int");
    assert_eq!(inputs["some_bool"]["inputBinding"]["prefix"], "--some-bool");
}

#[test]
fn test_tool_output_bound_to_cwd_glob() {
    let doc = generate();
    let tool = node(&doc, "CommandLineTool");
    assert_eq!(tool["outputs"]["results"]["outputBinding"]["glob"], ".");
}

// =============================================================================
// Error Tests
// =============================================================================

#[test]
fn test_unmappable_type_fails_at_consumption() {
    let spec = ParamSpec::from_code("xs = [1, 2, 3]\n");
    let err = write_workflow(&spec, "cuberun:test").unwrap_err();
    assert!(err.to_string().contains("xs"));
}
