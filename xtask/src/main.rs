use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{exit, Command, ExitStatus};

use clap::{Parser, Subcommand, ValueEnum};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

// ── CLI definition ─────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "xtask",
    about = "Task runner for the thumbnail pipeline workspace",
    long_about = "A unified CLI for packaging the thumbnail Lambda, rendering\n\
                  variants from a local directory, and running CI checks."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run CI checks (fmt, clippy, tests)
    Ci {
        /// Job to run
        #[arg(value_enum, default_value_t = CiJob::Check)]
        job: CiJob,
    },
    /// Render variants for keys stored under a local directory
    RenderLocal {
        /// Directory whose subdirectories act as containers
        #[arg(long, default_value = "local_store")]
        root: String,
        /// Container holding the uploads
        #[arg(long, default_value = "local")]
        container: String,
        /// Object keys to process, e.g. original/photo.jpg
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Build and package the thumbnail Lambda artifact for Terraform inputs
    ServerlessPackage {
        /// Compilation target triple for Lambda binaries
        #[arg(long, default_value = "x86_64-unknown-linux-gnu")]
        target: String,
        /// Build profile used for binaries
        #[arg(value_enum, long, default_value_t = BuildProfile::Release)]
        profile: BuildProfile,
    },
}

#[derive(Clone, ValueEnum)]
enum CiJob {
    /// Formatting and clippy
    Lint,
    /// Unit tests for both crates
    Test,
    /// Run lint + test
    Check,
}

#[derive(Clone, Copy, ValueEnum)]
enum BuildProfile {
    Debug,
    Release,
}

impl BuildProfile {
    fn dir_name(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Release => "release",
        }
    }

    fn as_cargo_flag(self) -> Option<&'static str> {
        match self {
            Self::Debug => None,
            Self::Release => Some("--release"),
        }
    }
}

// ── helpers ────────────────────────────────────────────────────────

fn step(label: &str) {
    eprintln!("\n=== {label} ===");
}

fn cargo(args: &[&str]) -> ExitStatus {
    eprintln!("+ cargo {}", args.join(" "));
    Command::new("cargo")
        .args(args)
        .status()
        .expect("failed to execute cargo")
}

fn run_cargo(args: &[&str]) {
    let status = cargo(args);
    if !status.success() {
        exit(status.code().unwrap_or(1));
    }
}

const LAMBDA_BIN: &str = "thumbnail_lambda";
const DIST_DIR: &str = "infra/thumbnails/dist";
const ARTIFACT_NAME: &str = "thumbnail.zip";

fn package_thumbnail_lambda(target: &str, profile: BuildProfile) {
    require_installed_target(target);

    step("Build thumbnail lambda");
    let mut args = vec!["build", "-p", LAMBDA_BIN, "--bin", LAMBDA_BIN, "--target", target];
    args.extend(profile.as_cargo_flag());
    run_cargo(&args);

    step("Package lambda artifact");
    let binary = Path::new("target")
        .join(target)
        .join(profile.dir_name())
        .join(LAMBDA_BIN);
    let dist = Path::new(DIST_DIR);
    fs::create_dir_all(dist).expect("failed to create lambda dist directory");

    let artifact = dist.join(ARTIFACT_NAME);
    write_bootstrap_zip(&binary, &artifact);
    eprintln!("\nPackaged artifact:\n- {}", artifact.display());
}

/// Skipped with a warning when rustup is unavailable, e.g. on a distro toolchain.
fn require_installed_target(target: &str) {
    let output = match Command::new("rustup")
        .args(["target", "list", "--installed"])
        .output()
    {
        Ok(output) if output.status.success() => output,
        _ => {
            eprintln!("warning: could not list installed rust targets; skipping the `{target}` check");
            return;
        }
    };

    let installed = String::from_utf8_lossy(&output.stdout);
    if !installed.lines().any(|line| line.trim() == target) {
        eprintln!("rust target `{target}` is not installed; run `rustup target add {target}` first");
        exit(1);
    }
}

/// Lambda's `provided` runtimes start the executable named `bootstrap` at the
/// archive root.
fn write_bootstrap_zip(binary: &Path, artifact: &Path) {
    let bytes = fs::read(binary).unwrap_or_else(|error| {
        panic!("failed to read lambda binary '{}': {error}", binary.display())
    });

    let file = fs::File::create(artifact).expect("failed to create lambda zip");
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o755);
    zip.start_file("bootstrap", options)
        .expect("failed to add bootstrap to lambda zip");
    zip.write_all(&bytes).expect("failed to write bootstrap");
    zip.finish().expect("failed to finalize lambda zip");
}

// ── CI jobs ────────────────────────────────────────────────────────

fn ci_lint() {
    step("Check formatting");
    run_cargo(&["fmt", "--all", "--", "--check"]);

    step("Clippy");
    run_cargo(&[
        "clippy",
        "--all-targets",
        "--all-features",
        "--",
        "-D",
        "warnings",
    ]);
}

fn ci_test() {
    step("Test thumbnail_core");
    run_cargo(&["test", "-p", "thumbnail_core"]);

    step("Test thumbnail_lambda");
    run_cargo(&["test", "-p", "thumbnail_lambda"]);
}

// ── main ───────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Ci { job } => {
            match job {
                CiJob::Lint => ci_lint(),
                CiJob::Test => ci_test(),
                CiJob::Check => {
                    ci_lint();
                    ci_test();
                }
            }
            eprintln!("\nCI job passed.");
        }
        Commands::RenderLocal {
            root,
            container,
            keys,
        } => {
            let mut args = vec![
                "run",
                "-p",
                "thumbnail_lambda",
                "--bin",
                "thumbnail_local",
                "--",
                "--root",
                &root,
                "--container",
                &container,
            ];
            args.extend(keys.iter().map(String::as_str));
            run_cargo(&args);
        }
        Commands::ServerlessPackage { target, profile } => {
            package_thumbnail_lambda(&target, profile);
        }
    }
}
