//! Workflow-description (CWL) output.
//!
//! Emits a document with a `$graph` containing exactly one workflow node —
//! one input per parameter, sourced from workflow inputs, and one
//! directory-typed output — and exactly one command-line-tool node declaring
//! the image tag as its container requirement, one input binding per scalar
//! parameter, and the directory output bound to the working-directory glob.
//!
//! This is a pure data transformation at the pipeline boundary; nothing here
//! touches the engine.

use crate::constants::{CWL_TOOL_ID, CWL_VERSION, ENTRY_POINT_FILE};
use crate::error::{Error, Result};
use crate::params::{flag_name, ParamSpec, ParamValue};
use serde::Serialize;
use std::collections::BTreeMap;

// =============================================================================
// Document Nodes
// =============================================================================

#[derive(Serialize)]
struct CwlDocument {
    #[serde(rename = "cwlVersion")]
    cwl_version: String,
    #[serde(rename = "$graph")]
    graph: Vec<CwlNode>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum CwlNode {
    Workflow(Workflow),
    Tool(CommandLineTool),
}

#[derive(Serialize)]
struct Workflow {
    class: String,
    id: String,
    label: String,
    doc: String,
    inputs: BTreeMap<String, CwlInput>,
    outputs: BTreeMap<String, WorkflowOutput>,
    steps: BTreeMap<String, WorkflowStep>,
}

#[derive(Serialize)]
struct WorkflowOutput {
    #[serde(rename = "type")]
    ty: String,
    #[serde(rename = "outputSource")]
    output_source: String,
}

#[derive(Serialize)]
struct WorkflowStep {
    run: String,
    #[serde(rename = "in")]
    inputs: BTreeMap<String, String>,
    out: Vec<String>,
}

#[derive(Serialize)]
struct CommandLineTool {
    class: String,
    id: String,
    requirements: ToolRequirements,
    #[serde(rename = "baseCommand")]
    base_command: Vec<String>,
    inputs: BTreeMap<String, CwlInput>,
    outputs: BTreeMap<String, ToolOutput>,
}

#[derive(Serialize)]
struct ToolRequirements {
    #[serde(rename = "DockerRequirement")]
    docker: DockerRequirement,
}

#[derive(Serialize)]
struct DockerRequirement {
    #[serde(rename = "dockerPull")]
    docker_pull: String,
}

#[derive(Serialize)]
struct ToolOutput {
    #[serde(rename = "type")]
    ty: String,
    #[serde(rename = "outputBinding")]
    output_binding: OutputBinding,
}

#[derive(Serialize)]
struct OutputBinding {
    glob: String,
}

#[derive(Serialize)]
struct CwlInput {
    #[serde(rename = "type")]
    ty: String,
    default: Option<ParamValue>,
    label: String,
    doc: String,
    #[serde(rename = "inputBinding", skip_serializing_if = "Option::is_none")]
    input_binding: Option<InputBinding>,
}

#[derive(Serialize)]
struct InputBinding {
    prefix: String,
}

// =============================================================================
// Generation
// =============================================================================

/// Emits the workflow description for a parameter spec and image tag.
///
/// # Errors
///
/// [`Error::TypeConversion`] when a parameter's type has no CWL mapping.
pub fn write_workflow(spec: &ParamSpec, image_tag: &str) -> Result<String> {
    let workflow_inputs = workflow_inputs(spec)?;
    let tool_inputs = tool_inputs(spec)?;

    let step_inputs: BTreeMap<String, String> = workflow_inputs
        .keys()
        .map(|name| (name.clone(), name.clone()))
        .collect();

    let document = CwlDocument {
        cwl_version: CWL_VERSION.to_string(),
        graph: vec![
            CwlNode::Workflow(Workflow {
                class: "Workflow".to_string(),
                id: "main".to_string(),
                label: "cuberun computation".to_string(),
                doc: "cuberun computation".to_string(),
                inputs: workflow_inputs,
                outputs: BTreeMap::from([(
                    "results".to_string(),
                    WorkflowOutput {
                        ty: "Directory".to_string(),
                        output_source: "run_script/results".to_string(),
                    },
                )]),
                steps: BTreeMap::from([(
                    "run_script".to_string(),
                    WorkflowStep {
                        run: format!("#{CWL_TOOL_ID}"),
                        inputs: step_inputs,
                        out: vec!["results".to_string()],
                    },
                )]),
            }),
            CwlNode::Tool(CommandLineTool {
                class: "CommandLineTool".to_string(),
                id: CWL_TOOL_ID.to_string(),
                requirements: ToolRequirements {
                    docker: DockerRequirement {
                        docker_pull: image_tag.to_string(),
                    },
                },
                base_command: vec![format!("./{ENTRY_POINT_FILE}"), "--batch".to_string()],
                inputs: tool_inputs,
                outputs: BTreeMap::from([(
                    "results".to_string(),
                    ToolOutput {
                        ty: "Directory".to_string(),
                        output_binding: OutputBinding {
                            glob: ".".to_string(),
                        },
                    },
                )]),
            }),
        ],
    };
    Ok(serde_yaml::to_string(&document)?)
}

/// One workflow-level input per parameter, datasets included.
fn workflow_inputs(spec: &ParamSpec) -> Result<BTreeMap<String, CwlInput>> {
    spec.iter()
        .map(|(name, decl)| {
            let ty = decl.ty.cwl_type().ok_or_else(|| Error::TypeConversion {
                name: name.clone(),
                type_name: decl.ty.to_string(),
            })?;
            Ok((
                name.clone(),
                CwlInput {
                    ty: ty.to_string(),
                    default: decl.default.clone(),
                    label: name.clone(),
                    doc: name.clone(),
                    input_binding: None,
                },
            ))
        })
        .collect()
}

/// One bound tool input per scalar parameter.
fn tool_inputs(spec: &ParamSpec) -> Result<BTreeMap<String, CwlInput>> {
    spec.scalars()
        .map(|(name, decl)| {
            let ty = decl.ty.cwl_type().ok_or_else(|| Error::TypeConversion {
                name: name.clone(),
                type_name: decl.ty.to_string(),
            })?;
            Ok((
                name.clone(),
                CwlInput {
                    ty: ty.to_string(),
                    default: decl.default.clone(),
                    label: name.clone(),
                    doc: name.clone(),
                    input_binding: Some(InputBinding {
                        prefix: flag_name(name),
                    }),
                },
            ))
        })
        .collect()
}
