//! Run-time parameter value resolution.
//!
//! At container start the entry point merges parameter values from the
//! process environment and the argument list, precedence low→high:
//!
//! 1. environment variable `cuberun_<name>`, parsed per declared type;
//! 2. CLI flag `--<dashed-name>` with the following token as value (a
//!    boolean flag's bare presence is sufficient);
//! 3. dataset parameters, staged from a `--product` directory.
//!
//! Unknown CLI tokens are ignored. Parameters set through neither channel
//! are simply absent from the result; default insertion is the computation's
//! own responsibility.
//!
//! The resolved values travel in an explicit [`RunContext`] handed by
//! reference into the computation entry point. Nothing is written back into
//! ambient process state.

use crate::constants::{ENV_VAR_PREFIX, PRODUCT_FLAG};
use crate::error::{Error, Result};
use crate::params::{flag_name, ParamSpec, ParamType, ParamValue};
use crate::stage::{stage_in, StagedDataset};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

/// Resolved parameter values for one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunContext {
    /// Scalar parameter values, by parameter name.
    pub values: BTreeMap<String, ParamValue>,
    /// Staged dataset inputs, by parameter name.
    pub datasets: BTreeMap<String, StagedDataset>,
}

/// Merges environment and CLI overrides into a [`RunContext`].
///
/// `env` is passed explicitly (rather than read ambiently) so resolution is
/// a pure function of its inputs.
pub fn resolve(
    spec: &ParamSpec,
    env: &HashMap<String, String>,
    args: &[String],
) -> Result<RunContext> {
    let mut values = read_from_env(spec, env)?;
    values.extend(read_from_cli(spec, args)?);

    let datasets = match (spec.dataset_names(), product_dir(args)) {
        (declared, Some(dir)) if !declared.is_empty() => stage_in(&dir, &declared)?,
        // Without a --product flag, dataset parameters stay unresolved and
        // must be supplied by the computation itself.
        _ => BTreeMap::new(),
    };

    Ok(RunContext { values, datasets })
}

/// Reads scalar overrides from prefixed environment variables.
pub fn read_from_env(
    spec: &ParamSpec,
    env: &HashMap<String, String>,
) -> Result<BTreeMap<String, ParamValue>> {
    let mut values = BTreeMap::new();
    for (name, decl) in spec.scalars() {
        let key = format!("{ENV_VAR_PREFIX}{name}");
        if let Some(raw) = env.get(&key) {
            values.insert(name.clone(), parse_scalar(name, &decl.ty, raw)?);
        }
    }
    Ok(values)
}

/// Reads scalar overrides from the argument list.
///
/// Only declared flags are consumed; everything else in `args` is ignored.
pub fn read_from_cli(spec: &ParamSpec, args: &[String]) -> Result<BTreeMap<String, ParamValue>> {
    let mut values = BTreeMap::new();
    for (name, decl) in spec.scalars() {
        let flag = flag_name(name);
        let Some(idx) = args.iter().position(|a| *a == flag) else {
            continue;
        };
        if decl.ty == ParamType::Bool {
            // Presence alone means true; no value token is consumed.
            values.insert(name.clone(), ParamValue::Bool(true));
            continue;
        }
        let raw = args.get(idx + 1).ok_or_else(|| Error::Parse {
            entry: name.clone(),
            reason: format!("flag {flag} is missing a value"),
        })?;
        values.insert(name.clone(), parse_scalar(name, &decl.ty, raw)?);
    }
    Ok(values)
}

/// Returns the staged-data directory named by a `--product` flag, if any.
pub fn product_dir(args: &[String]) -> Option<PathBuf> {
    let idx = args.iter().position(|a| a == PRODUCT_FLAG)?;
    args.get(idx + 1).map(PathBuf::from)
}

/// Parses a raw override according to the declared type.
///
/// Boolean parsing uses a case-insensitive falsy set {`false`, `0`, empty
/// string}; everything else is truthy.
fn parse_scalar(name: &str, ty: &ParamType, raw: &str) -> Result<ParamValue> {
    match ty {
        ParamType::Int => raw
            .parse::<i64>()
            .map(ParamValue::Int)
            .map_err(|e| parse_error(name, raw, &e.to_string())),
        ParamType::Float => raw
            .parse::<f64>()
            .map(ParamValue::Float)
            .map_err(|e| parse_error(name, raw, &e.to_string())),
        ParamType::Str => Ok(ParamValue::Str(raw.to_string())),
        ParamType::Bool => {
            let falsy = raw.eq_ignore_ascii_case("false") || raw == "0" || raw.is_empty();
            Ok(ParamValue::Bool(!falsy))
        }
        ParamType::Dataset | ParamType::Opaque(_) => Err(parse_error(
            name,
            raw,
            "not a scalar parameter type",
        )),
    }
}

fn parse_error(name: &str, raw: &str, reason: &str) -> Error {
    Error::Parse {
        entry: name.to_string(),
        reason: format!("cannot parse '{raw}': {reason}"),
    }
}
