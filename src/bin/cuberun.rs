//! # cuberun - Orchestrator CLI
//!
//! Create, build, and run compute engine containers from parameterized
//! source units.
//!
//! ## Usage
//!
//! ```sh
//! cuberun script <body-file> <output-dir> [--params <file>] [--clear]
//! cuberun build <body-file> [--params <file>] [--environment <file>]
//!               [--workdir <dir>] [--tag <tag>] [--cwl <file>] [--skip-build]
//!               [--batch] [--server] [--from-saved] [--output <dir>] [--keep]
//! cuberun run <image> [--batch] [--server] [--from-saved]
//!             [--output <dir>] [--keep]
//! ```
//!
//! `script` assembles the bundle on the host without touching the engine;
//! `build` assembles, sanitizes the environment, and builds the image
//! (optionally running it afterwards); `run` runs a container from an
//! existing image reference.

use cuberun::{
    BuildContext, ContainerRunner, DockerEngine, ImageBuilder, ImageRef, ParamSpec, RunMode,
    ScriptBundle,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing_subscriber::EnvFilter;

// =============================================================================
// CLI Parsing
// =============================================================================

#[derive(Debug)]
enum Command {
    Script {
        body: PathBuf,
        output_dir: PathBuf,
        params: Option<PathBuf>,
        clear: bool,
    },
    Build {
        body: PathBuf,
        params: Option<PathBuf>,
        environment: Option<PathBuf>,
        workdir: Option<PathBuf>,
        tag: Option<String>,
        cwl: Option<PathBuf>,
        skip_build: bool,
        mode: RunMode,
        output: Option<PathBuf>,
        keep: bool,
    },
    Run {
        image: String,
        mode: RunMode,
        output: Option<PathBuf>,
        keep: bool,
    },
    Version,
    Help,
}

fn parse_args(args: &[String]) -> Result<Command, String> {
    let Some(command) = args.first() else {
        return Ok(Command::Help);
    };
    match command.as_str() {
        "script" => {
            let mut positional = Vec::new();
            let mut params = None;
            let mut clear = false;
            let mut i = 1;
            while i < args.len() {
                match args[i].as_str() {
                    "--params" | "-p" => {
                        params = Some(PathBuf::from(value_of(args, &mut i)?));
                    }
                    "--clear" | "-c" => {
                        clear = true;
                        i += 1;
                    }
                    other => {
                        positional.push(PathBuf::from(other));
                        i += 1;
                    }
                }
            }
            let [body, output_dir] = positional.as_slice() else {
                return Err("script requires <body-file> <output-dir>".to_string());
            };
            Ok(Command::Script {
                body: body.clone(),
                output_dir: output_dir.clone(),
                params,
                clear,
            })
        }
        "build" => {
            let mut body = None;
            let mut params = None;
            let mut environment = None;
            let mut workdir = None;
            let mut tag = None;
            let mut cwl = None;
            let mut skip_build = false;
            let mut mode = RunMode::default();
            let mut output = None;
            let mut keep = false;
            let mut i = 1;
            while i < args.len() {
                match args[i].as_str() {
                    "--params" | "-p" => params = Some(PathBuf::from(value_of(args, &mut i)?)),
                    "--environment" | "-e" => {
                        environment = Some(PathBuf::from(value_of(args, &mut i)?))
                    }
                    "--workdir" | "-w" => workdir = Some(PathBuf::from(value_of(args, &mut i)?)),
                    "--tag" | "-t" => tag = Some(value_of(args, &mut i)?),
                    "--cwl" => cwl = Some(PathBuf::from(value_of(args, &mut i)?)),
                    "--output" | "-o" => output = Some(PathBuf::from(value_of(args, &mut i)?)),
                    "--skip-build" => {
                        skip_build = true;
                        i += 1;
                    }
                    "--batch" | "-b" => {
                        mode.batch = true;
                        i += 1;
                    }
                    "--server" | "-s" => {
                        mode.server = true;
                        i += 1;
                    }
                    "--from-saved" | "-f" => {
                        mode.from_saved = true;
                        i += 1;
                    }
                    "--keep" | "-k" => {
                        keep = true;
                        i += 1;
                    }
                    other => {
                        body = Some(PathBuf::from(other));
                        i += 1;
                    }
                }
            }
            let Some(body) = body else {
                return Err("build requires <body-file>".to_string());
            };
            Ok(Command::Build {
                body,
                params,
                environment,
                workdir,
                tag,
                cwl,
                skip_build,
                mode,
                output,
                keep,
            })
        }
        "run" => {
            let mut image = None;
            let mut mode = RunMode::default();
            let mut output = None;
            let mut keep = false;
            let mut i = 1;
            while i < args.len() {
                match args[i].as_str() {
                    "--output" | "-o" => output = Some(PathBuf::from(value_of(args, &mut i)?)),
                    "--batch" | "-b" => {
                        mode.batch = true;
                        i += 1;
                    }
                    "--server" | "-s" => {
                        mode.server = true;
                        i += 1;
                    }
                    "--from-saved" | "-f" => {
                        mode.from_saved = true;
                        i += 1;
                    }
                    "--keep" | "-k" => {
                        keep = true;
                        i += 1;
                    }
                    other => {
                        image = Some(other.to_string());
                        i += 1;
                    }
                }
            }
            let Some(image) = image else {
                return Err("run requires <image>".to_string());
            };
            Ok(Command::Run {
                image,
                mode,
                output,
                keep,
            })
        }
        "version" | "--version" | "-V" => Ok(Command::Version),
        "help" | "--help" | "-h" => Ok(Command::Help),
        other => Err(format!("unknown command '{other}'")),
    }
}

fn value_of(args: &[String], i: &mut usize) -> Result<String, String> {
    let flag = &args[*i];
    match args.get(*i + 1) {
        Some(value) => {
            *i += 2;
            Ok(value.clone())
        }
        None => Err(format!("{flag} requires a value")),
    }
}

fn usage() -> &'static str {
    "cuberun - package and run compute engine containers

USAGE:
    cuberun script <body-file> <output-dir> [--params <file>] [--clear]
    cuberun build <body-file> [OPTIONS]
    cuberun run <image> [OPTIONS]
    cuberun version

BUILD OPTIONS:
    -p, --params <file>       declarative parameters region of the source unit
    -e, --environment <file>  environment manifest to use in the image
    -w, --workdir <dir>       build directory (default: ephemeral temp dir)
    -t, --tag <tag>           image tag (default: timestamp-derived)
        --cwl <file>          write a workflow description for the built image
        --skip-build          write build files without invoking the engine
    -b, --batch               run as batch container after building
    -s, --server              run as server container after building
    -f, --from-saved          serve datasets from saved results
    -o, --output <dir>        extract container results to this directory
    -k, --keep                keep the container after it has finished

RUN OPTIONS:
    -b/-s/-f/-o/-k            as for build
"
}

// =============================================================================
// Dispatch
// =============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match parse_args(&args) {
        Ok(command) => command,
        Err(message) => {
            eprintln!("error: {message}");
            eprintln!("{}", usage());
            return ExitCode::FAILURE;
        }
    };

    match dispatch(command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(command: Command) -> cuberun::Result<()> {
    match command {
        Command::Help => {
            println!("{}", usage());
            Ok(())
        }
        Command::Version => {
            println!("cuberun {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Command::Script {
            body,
            output_dir,
            params,
            clear,
        } => {
            let bundle = load_bundle(&body, params.as_deref())?;
            bundle.assemble(&output_dir, clear)
        }
        Command::Build {
            body,
            params,
            environment,
            workdir,
            tag,
            cwl,
            skip_build,
            mode,
            output,
            keep,
        } => {
            let bundle = load_bundle(&body, params.as_deref())?;
            let spec = bundle.spec().clone();
            let ctx = match workdir {
                Some(dir) => {
                    std::fs::create_dir_all(&dir)?;
                    BuildContext::new(bundle, environment, dir, tag)
                }
                None => BuildContext::with_ephemeral_dir(bundle, environment, tag)?,
            };
            if let Some(cwl_path) = cwl {
                std::fs::write(&cwl_path, cuberun::cwl::write_workflow(&spec, ctx.tag())?)?;
            }
            if skip_build {
                // No engine involvement at all in skip-build mode.
                let builder = ImageBuilder::new(Arc::new(NullEngine));
                builder.build(&ctx, true).await?;
                return Ok(());
            }
            let engine = Arc::new(DockerEngine::connect()?);
            let builder = ImageBuilder::new(engine.clone());
            let Some(image) = builder.build(&ctx, false).await? else {
                return Ok(());
            };
            if mode.batch || mode.server {
                let runner = ContainerRunner::new(engine, image.into(), output).await?;
                runner.run(&mode, keep, interrupt_token()).await?;
            }
            Ok(())
        }
        Command::Run {
            image,
            mode,
            output,
            keep,
        } => {
            let engine = Arc::new(DockerEngine::connect()?);
            let runner = ContainerRunner::new(engine, ImageRef::ByName(image), output).await?;
            runner.run(&mode, keep, interrupt_token()).await?;
            Ok(())
        }
    }
}

/// Reads the source unit body and extracts its parameter spec.
fn load_bundle(body: &std::path::Path, params: Option<&std::path::Path>) -> cuberun::Result<ScriptBundle> {
    let body_text = std::fs::read_to_string(body)?;
    let spec = match params {
        Some(path) => ParamSpec::from_code(&std::fs::read_to_string(path)?),
        None => ParamSpec::default(),
    };
    Ok(ScriptBundle::new(body_text, spec))
}

/// Token cancelled on the first interrupt signal.
///
/// The listener only cancels the token; all engine calls stay inside the
/// runner's polling loop.
fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_token.cancel();
        }
    });
    token
}

// =============================================================================
// Skip-Build Engine Stub
// =============================================================================

/// Engine placeholder for skip-build mode, where no engine call is ever
/// made. Every operation is unreachable by construction.
struct NullEngine;

#[async_trait::async_trait]
impl cuberun::ContainerEngine for NullEngine {
    async fn resolve_image(&self, name: &str) -> cuberun::Result<cuberun::Image> {
        Err(cuberun::Error::InvalidImageReference {
            reference: name.to_string(),
            reason: "no engine available in skip-build mode".to_string(),
        })
    }

    async fn build_image(&self, _context: Vec<u8>, tag: &str) -> cuberun::Result<cuberun::Image> {
        Err(cuberun::Error::BuildFailed {
            message: format!("no engine available in skip-build mode (tag {tag})"),
            log: Vec::new(),
        })
    }

    async fn create_container(
        &self,
        _spec: &cuberun::ContainerSpec,
    ) -> cuberun::Result<String> {
        unreachable!("skip-build mode never creates containers")
    }

    async fn start_container(&self, _id: &str) -> cuberun::Result<()> {
        unreachable!("skip-build mode never starts containers")
    }

    async fn container_status(
        &self,
        _id: &str,
    ) -> cuberun::Result<cuberun::ContainerStatus> {
        unreachable!("skip-build mode never polls containers")
    }

    async fn stop_container(&self, _id: &str) -> cuberun::Result<()> {
        unreachable!("skip-build mode never stops containers")
    }

    async fn remove_container(&self, _id: &str, _force: bool) -> cuberun::Result<()> {
        unreachable!("skip-build mode never removes containers")
    }

    async fn export_path(
        &self,
        _id: &str,
        _path: &str,
    ) -> cuberun::Result<cuberun::ChunkStream> {
        unreachable!("skip-build mode never exports archives")
    }
}
