use std::path::{Path, PathBuf};

use fabric::auth;
use fabric::client::PlatformClient;
use fabric::config::FabricConfig;
use fabric::http::ReqwestTransport;

pub type CmdResult<T> = fabric::Result<(T, i32)>;

pub(crate) struct GlobalArgs {
    pub config: FabricConfig,
}

pub mod build;
pub mod deploy;
pub mod docker_auth;
pub mod fetch_cert;
pub mod run;

/// Canonical repo checkout directory; it must exist.
pub(crate) fn repo_dir(path: &Path) -> fabric::Result<PathBuf> {
    if !path.is_dir() {
        return Err(fabric::Error::validation_invalid_argument(
            "repo",
            format!("Repo directory {} does not exist", path.display()),
            None,
        ));
    }
    path.canonicalize().map_err(|e| {
        fabric::Error::internal_io(e.to_string(), Some(format!("resolve {}", path.display())))
    })
}

/// Run `f` with an authenticated platform client.
pub(crate) fn with_client<T>(
    config: &FabricConfig,
    f: impl FnOnce(&PlatformClient) -> fabric::Result<T>,
) -> fabric::Result<T> {
    let transport = ReqwestTransport::new(&config.tls)?;
    let client = auth::connect(config, &transport)?;
    tracing::info!(
        "Connected to {} ({} {})",
        client.base_url(),
        client.scope().label(),
        client.scope().name()
    );
    f(&client)
}

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $global:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args, $global))
    };
}

pub(crate) fn run_json(
    command: Option<crate::Commands>,
    root: run::RunArgs,
    global: &GlobalArgs,
) -> (fabric::Result<serde_json::Value>, i32) {
    match command {
        Some(crate::Commands::Build(args)) => dispatch!(args, global, build),
        Some(crate::Commands::Deploy(args)) => dispatch!(args, global, deploy),
        Some(crate::Commands::DockerAuth(args)) => dispatch!(args, global, docker_auth),
        Some(crate::Commands::FetchCert(args)) => dispatch!(args, global, fetch_cert),
        None => dispatch!(root, global, run),
    }
}
