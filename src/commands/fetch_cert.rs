use std::path::PathBuf;

use clap::Args;
use serde::Serialize;

use fabric::certs;

use super::{CmdResult, GlobalArgs};

#[derive(Args, Debug)]
pub struct FetchCertArgs {
    /// Server address as host:port
    pub server: String,
    /// File to save the PEM chain to
    pub path: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct FetchCertOutput {
    pub server: String,
    pub path: String,
    pub certificates: usize,
}

pub fn run(args: FetchCertArgs, _global: &GlobalArgs) -> CmdResult<FetchCertOutput> {
    let chain = certs::fetch_certificate_chain(&args.server)?;
    certs::write_pem(&args.path, &chain)?;
    tracing::info!(
        "Saved {} certificate(s) from {} to {}",
        chain.len(),
        args.server,
        args.path.display()
    );

    Ok((
        FetchCertOutput {
            server: args.server,
            path: args.path.display().to_string(),
            certificates: chain.len(),
        },
        0,
    ))
}
