//! Parameter spec extraction and wire codec.
//!
//! A [`ParamSpec`] maps parameter names to their declared type and default
//! value. It is created once by [`ParamSpec::from_code`] from the declarative
//! assignment block of a source unit, is immutable thereafter, and travels
//! verbatim inside the built artifact as `parameters.yaml`.
//!
//! # Wire Format
//!
//! One entry per parameter name, value `{type: <token>, default: <scalar-or-null>}`;
//! tokens are exactly `int|float|str|bool|Dataset`:
//!
//! ```yaml
//! some_int:
//!   type: int
//!   default: 42
//! some_ds:
//!   type: Dataset
//!   default: null
//! ```
//!
//! Dataset parameters never carry a default over the wire.

use crate::constants::PARAMS_FILE;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

// =============================================================================
// Parameter Types
// =============================================================================

/// Declared type of a parameter.
///
/// The closed wire set is the four scalar types plus `Dataset`. Extraction
/// may additionally record an [`Opaque`](Self::Opaque) runtime type; mapping
/// one to an external schema fails with [`Error::TypeConversion`] at
/// spec-consumption time, never during extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    Int,
    Float,
    Str,
    Bool,
    /// Structured-dataset parameter, resolved via stage-in rather than
    /// scalar overrides.
    Dataset,
    /// A runtime type outside the wire set, recorded at extraction.
    Opaque(String),
}

impl ParamType {
    /// Parses a wire token. Unknown tokens are `None`; the codec turns that
    /// into a [`Error::Parse`] naming the offending entry.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "int" => Some(Self::Int),
            "float" => Some(Self::Float),
            "str" => Some(Self::Str),
            "bool" => Some(Self::Bool),
            "Dataset" => Some(Self::Dataset),
            _ => None,
        }
    }

    /// Returns the wire token, or `None` for types with no wire mapping.
    pub fn token(&self) -> Option<&str> {
        match self {
            Self::Int => Some("int"),
            Self::Float => Some("float"),
            Self::Str => Some("str"),
            Self::Bool => Some("bool"),
            Self::Dataset => Some("Dataset"),
            Self::Opaque(_) => None,
        }
    }

    /// Returns the CWL schema type, or `None` for types with no mapping.
    ///
    /// Datasets are staged from a catalog directory, hence `Directory`.
    pub fn cwl_type(&self) -> Option<&'static str> {
        match self {
            Self::Int => Some("long"),
            Self::Float => Some("double"),
            Self::Str => Some("string"),
            Self::Bool => Some("boolean"),
            Self::Dataset => Some("Directory"),
            Self::Opaque(_) => None,
        }
    }

    /// True for the four scalar types resolvable from env/CLI overrides.
    pub fn is_scalar(&self) -> bool {
        matches!(self, Self::Int | Self::Float | Self::Str | Self::Bool)
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Opaque(name) => write!(f, "{name}"),
            other => write!(f, "{}", other.token().unwrap_or("?")),
        }
    }
}

// =============================================================================
// Parameter Values
// =============================================================================

/// A concrete scalar parameter value.
///
/// The untagged serde form matches the YAML scalar encoding of the wire
/// format: `false`, `42`, `3.14`, `foo`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ParamValue {
    /// The [`ParamType`] this value inhabits.
    pub fn param_type(&self) -> ParamType {
        match self {
            Self::Bool(_) => ParamType::Bool,
            Self::Int(_) => ParamType::Int,
            Self::Float(_) => ParamType::Float,
            Self::Str(_) => ParamType::Str,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v}"),
        }
    }
}

/// Declared type and default value of one parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDecl {
    pub ty: ParamType,
    pub default: Option<ParamValue>,
}

// =============================================================================
// Parameter Spec
// =============================================================================

/// Serialized form of one spec entry.
#[derive(Serialize, Deserialize)]
struct WireEntry {
    #[serde(rename = "type")]
    ty: String,
    default: Option<ParamValue>,
}

/// Mapping from parameter name to declared type and default value.
///
/// Names are valid identifiers, usable both as an environment-variable
/// suffix and as a dashed command-line flag (see [`flag_name`]).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParamSpec {
    params: BTreeMap<String, ParamDecl>,
}

impl ParamSpec {
    /// Creates a spec from an explicit declaration map.
    pub fn new(params: BTreeMap<String, ParamDecl>) -> Self {
        Self { params }
    }

    /// Extracts a spec from a fragment of declarative assignment code.
    ///
    /// Each `name = literal` statement is evaluated into a fresh namespace
    /// and recorded as `(runtime type of value, value)`. Non-assignment
    /// lines are ignored; unsupported right-hand sides are recorded with an
    /// [`ParamType::Opaque`] type and no default. Extraction itself never
    /// fails.
    pub fn from_code(code: &str) -> Self {
        let mut params = BTreeMap::new();
        for line in code.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((name, rhs)) = split_assignment(line) else {
                continue;
            };
            let (ty, default) = parse_literal(rhs);
            params.insert(name.to_string(), ParamDecl { ty, default });
        }
        Self { params }
    }

    /// Deserializes a spec from its wire form.
    ///
    /// # Errors
    ///
    /// [`Error::Parse`] naming the offending entry for malformed text or an
    /// unknown type token.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let entries: BTreeMap<String, WireEntry> =
            serde_yaml::from_str(text).map_err(|e| Error::Parse {
                entry: PARAMS_FILE.to_string(),
                reason: e.to_string(),
            })?;
        let mut params = BTreeMap::new();
        for (name, entry) in entries {
            let ty = ParamType::from_token(&entry.ty).ok_or_else(|| Error::Parse {
                entry: name.clone(),
                reason: format!("unknown type token '{}'", entry.ty),
            })?;
            let default = match ty {
                // A dataset can never carry a default over the wire.
                ParamType::Dataset => None,
                ParamType::Float => entry.default.map(|v| match v {
                    ParamValue::Int(i) => ParamValue::Float(i as f64),
                    other => other,
                }),
                _ => entry.default,
            };
            params.insert(name, ParamDecl { ty, default });
        }
        Ok(Self { params })
    }

    /// Reads and deserializes a spec from a file.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        Self::from_yaml(&std::fs::read_to_string(path)?)
    }

    /// Serializes the spec to its wire form, one entry per parameter.
    ///
    /// # Errors
    ///
    /// [`Error::TypeConversion`] when a parameter's type has no wire token.
    pub fn to_yaml(&self) -> Result<String> {
        let mut entries = BTreeMap::new();
        for (name, decl) in &self.params {
            let token = decl.ty.token().ok_or_else(|| Error::TypeConversion {
                name: name.clone(),
                type_name: decl.ty.to_string(),
            })?;
            let default = match decl.ty {
                ParamType::Dataset => None,
                _ => decl.default.clone(),
            };
            entries.insert(
                name.clone(),
                WireEntry {
                    ty: token.to_string(),
                    default,
                },
            );
        }
        Ok(serde_yaml::to_string(&entries)?)
    }

    /// Looks up one declaration.
    pub fn get(&self, name: &str) -> Option<&ParamDecl> {
        self.params.get(name)
    }

    /// Iterates over all declarations in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamDecl)> {
        self.params.iter()
    }

    /// Iterates over scalar declarations only.
    pub fn scalars(&self) -> impl Iterator<Item = (&String, &ParamDecl)> {
        self.params.iter().filter(|(_, d)| d.ty.is_scalar())
    }

    /// Names of all declared dataset parameters.
    pub fn dataset_names(&self) -> Vec<String> {
        self.params
            .iter()
            .filter(|(_, d)| d.ty == ParamType::Dataset)
            .map(|(n, _)| n.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// Dashed command-line flag for a parameter name: `some_int` → `--some-int`.
pub fn flag_name(name: &str) -> String {
    format!("--{}", name.replace('_', "-"))
}

// =============================================================================
// Assignment Parsing
// =============================================================================

/// Splits `name = rhs`, returning `None` for non-assignments or names that
/// are not valid identifiers.
fn split_assignment(line: &str) -> Option<(&str, &str)> {
    let (lhs, rhs) = line.split_once('=')?;
    // Reject comparison/augmented operators masquerading as assignments.
    if rhs.starts_with('=') || lhs.ends_with(['!', '<', '>', '+', '-', '*', '/', '%']) {
        return None;
    }
    let name = lhs.trim();
    if !is_identifier(name) {
        return None;
    }
    Some((name, rhs.trim()))
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Evaluates a literal right-hand side into `(runtime type, value)`.
fn parse_literal(rhs: &str) -> (ParamType, Option<ParamValue>) {
    let rhs = strip_trailing_comment(rhs);
    match rhs {
        "True" | "true" => (ParamType::Bool, Some(ParamValue::Bool(true))),
        "False" | "false" => (ParamType::Bool, Some(ParamValue::Bool(false))),
        "None" => (ParamType::Opaque("NoneType".to_string()), None),
        _ => {
            if let Some(s) = quoted_string(rhs) {
                return (ParamType::Str, Some(ParamValue::Str(s)));
            }
            if let Ok(i) = rhs.parse::<i64>() {
                return (ParamType::Int, Some(ParamValue::Int(i)));
            }
            if let Ok(f) = rhs.parse::<f64>() {
                return (ParamType::Float, Some(ParamValue::Float(f)));
            }
            let label = match rhs.chars().next() {
                Some('[') => "list",
                Some('{') => "dict",
                Some('(') => "tuple",
                _ => "expression",
            };
            (ParamType::Opaque(label.to_string()), None)
        }
    }
}

/// Strips an inline comment from an unquoted right-hand side.
fn strip_trailing_comment(rhs: &str) -> &str {
    if rhs.starts_with('"') || rhs.starts_with('\'') {
        return rhs;
    }
    match rhs.find('#') {
        Some(idx) => rhs[..idx].trim(),
        None => rhs,
    }
}

/// Returns the contents of a matching-quoted string literal.
fn quoted_string(rhs: &str) -> Option<String> {
    for quote in ['"', '\''] {
        if rhs.len() >= 2 && rhs.starts_with(quote) && rhs.ends_with(quote) {
            return Some(rhs[1..rhs.len() - 1].to_string());
        }
    }
    None
}
