use clap::Args;
use std::path::PathBuf;

use fabric::client::PlatformClient;
use fabric::config::FabricConfig;
use fabric::deploy::{DeployRequest, DeploySummary, Deployer};
use fabric::images::ActionImageMapping;
use fabric::manifest::DEFAULT_MANIFEST_FILE;
use fabric::transform::JsonnetTransformer;

use super::{repo_dir, with_client, CmdResult, GlobalArgs};

#[derive(Args, Debug)]
pub struct DeployArgs {
    /// Repo checkout holding the manifest and resources
    pub repo: PathBuf,

    /// Manifest file, relative to the repo
    #[arg(short, long, default_value = DEFAULT_MANIFEST_FILE)]
    pub manifest: String,
}

/// Deploy the manifest of `repo` with `client`.
pub(crate) fn deploy_manifest(
    repo: &std::path::Path,
    manifest: &str,
    images: &ActionImageMapping,
    config: &FabricConfig,
    client: &PlatformClient,
) -> fabric::Result<DeploySummary> {
    tracing::info!(
        "Deploying resources from manifest {} in repo {}",
        manifest,
        repo.display()
    );
    let transformer = JsonnetTransformer::new();
    Deployer::new(client, &transformer).run(&DeployRequest {
        repo_dir: repo,
        manifest_file: manifest,
        images,
        environment: &config.environment,
    })
}

/// Deploy without building. Snapshot actions keep their exported images.
pub fn run(args: DeployArgs, global: &GlobalArgs) -> CmdResult<DeploySummary> {
    let repo = repo_dir(&args.repo)?;
    let images = ActionImageMapping::new();

    let summary = with_client(&global.config, |client| {
        deploy_manifest(&repo, &args.manifest, &images, &global.config, client)
    })?;

    Ok((summary, 0))
}
