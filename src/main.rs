use clap::{Parser, Subcommand};

use commands::GlobalArgs;

mod commands;
mod output;

use commands::{build, deploy, docker_auth, fetch_cert, run};
use fabric::config::FabricConfig;
use fabric::telemetry;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "fabric")]
#[command(version = VERSION)]
#[command(about = "Build action images and deploy platform resources described in a manifest")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    run: run::RunArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Search the repo for Dockerfiles, then build and push their images
    Build(build::BuildArgs),
    /// Deploy the resources listed in the manifest without building images
    Deploy(deploy::DeployArgs),
    /// Log in to a docker registry for pushing images
    #[command(alias = "dockerAuth")]
    DockerAuth(docker_auth::DockerAuthArgs),
    /// Save the TLS certificate chain a server presents, without verifying it
    #[command(alias = "fetchCert")]
    FetchCert(fetch_cert::FetchCertArgs),
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let config = FabricConfig::from_env();
    telemetry::init_tracing(config.log_json, tracing::Level::INFO);

    let global = GlobalArgs { config };
    let (json_result, exit_code) = commands::run_json(cli.command, cli.run, &global);

    if let Err(err) = output::print_json_result(json_result) {
        tracing::error!("Failed to print result: {}", err);
    }

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
