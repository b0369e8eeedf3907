use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

use fabric::build::{self, BuildSummary, DockerCli};
use fabric::deploy::DeploySummary;
use fabric::manifest::DEFAULT_MANIFEST_FILE;

use super::deploy::deploy_manifest;
use super::{repo_dir, with_client, CmdResult, GlobalArgs};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Repo checkout to build and deploy
    pub repo: Option<PathBuf>,

    /// Manifest file, relative to the repo
    #[arg(short, long, default_value = DEFAULT_MANIFEST_FILE)]
    pub manifest: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutput {
    pub build: BuildSummary,
    pub deploy: DeploySummary,
}

/// Build every image, then deploy the manifest against the fresh images.
pub fn run(args: RunArgs, global: &GlobalArgs) -> CmdResult<RunOutput> {
    let repo = args
        .repo
        .as_deref()
        .ok_or_else(|| fabric::Error::validation_missing_argument(vec!["repo".to_string()]))
        .and_then(repo_dir)?;

    let output = with_client(&global.config, |client| {
        tracing::info!("Building action images in repo checkout {}", repo.display());
        let build = build::build_images(&repo, &global.config.registry, client, &DockerCli::default())?;
        let images = build.image_mapping();
        tracing::info!("Deploying with {} freshly built image(s)", images.len());
        let deploy = deploy_manifest(&repo, &args.manifest, &images, &global.config, client)?;
        Ok(RunOutput { build, deploy })
    })?;

    Ok((output, 0))
}
