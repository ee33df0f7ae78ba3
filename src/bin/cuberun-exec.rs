//! # cuberun-exec - In-Container Runtime Entry Point
//!
//! This binary is copied into every built image under the fixed name
//! `execute` and is the image's CMD. At container start it:
//!
//! - loads the persisted parameter spec from beside the executable,
//! - resolves parameter values from the process environment and argv
//!   (env override < CLI override; datasets staged via `--product`),
//! - hands the resolved context to the embedded computation,
//! - in batch mode, writes a result catalog over the saved datasets and
//!   touches the `finished` marker.
//!
//! ## Expected Image Layout
//!
//! ```text
//! /home/mambauser/
//! ├── execute           ← this binary
//! ├── user_code.py      ← generated computation body
//! ├── parameters.yaml   ← persisted parameter spec
//! └── output/           ← batch results, extracted by the orchestrator
//! ```

use cuberun::{
    resolve, scan_output_dir, write_stac, ComputeRuntime, ParamSpec, ProcessRuntime, RunMode,
    FINISHED_MARKER, OUTPUT_DIR_NAME, PARAMS_FILE, USER_CODE_FILE,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> cuberun::Result<()> {
    let exe_dir = exe_dir()?;
    let spec = ParamSpec::from_yaml_file(&exe_dir.join(PARAMS_FILE))?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let env: HashMap<String, String> = std::env::vars().collect();
    let ctx = resolve(&spec, &env, &args)?;
    info!(
        "resolved {} scalar value(s), {} dataset(s)",
        ctx.values.len(),
        ctx.datasets.len()
    );

    let mode = RunMode {
        batch: args.iter().any(|a| a == "--batch"),
        server: args.iter().any(|a| a == "--server"),
        from_saved: args.iter().any(|a| a == "--from-saved"),
        ..Default::default()
    };

    let runtime = ProcessRuntime::new(exe_dir.join(USER_CODE_FILE));
    runtime.execute(&ctx, &mode).await?;

    if mode.batch {
        let home = home_dir();
        let datasets = scan_output_dir(&home.join(OUTPUT_DIR_NAME))?;
        write_stac(&datasets, &home)?;
        std::fs::write(exe_dir.join(FINISHED_MARKER), "")?;
        info!("batch run finished, {} dataset(s) saved", datasets.len());
    }
    Ok(())
}

fn exe_dir() -> cuberun::Result<PathBuf> {
    let exe = std::env::current_exe()?;
    Ok(exe
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(".")))
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}
