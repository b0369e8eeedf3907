use clap::Args;
use serde::Serialize;

use fabric::build::{DockerCli, ImageBuilder};

use super::{CmdResult, GlobalArgs};

#[derive(Args, Debug)]
pub struct DockerAuthArgs {
    /// Registry to log in to
    pub registry: String,
    pub user: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct DockerAuthOutput {
    pub registry: String,
    pub user: String,
}

pub fn run(args: DockerAuthArgs, _global: &GlobalArgs) -> CmdResult<DockerAuthOutput> {
    DockerCli::default().login(&args.registry, &args.user, &args.password)?;
    tracing::info!("Docker login to {} successful", args.registry);

    Ok((
        DockerAuthOutput {
            registry: args.registry,
            user: args.user,
        },
        0,
    ))
}
