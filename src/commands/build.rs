use clap::Args;
use std::path::PathBuf;

use fabric::build::{self, BuildSummary, DockerCli};

use super::{repo_dir, with_client, CmdResult, GlobalArgs};

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Repo checkout to search for Dockerfiles
    pub repo: PathBuf,
}

pub fn run(args: BuildArgs, global: &GlobalArgs) -> CmdResult<BuildSummary> {
    let repo = repo_dir(&args.repo)?;
    tracing::info!("Building action images in repo checkout {}", repo.display());

    let summary = with_client(&global.config, |client| {
        build::build_images(&repo, &global.config.registry, client, &DockerCli::default())
    })?;

    Ok((summary, 0))
}
