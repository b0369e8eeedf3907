//! Version tags for built images, derived from the repo checkout.

use std::path::Path;

use crate::utils::command::run_in_optional;

pub const FALLBACK_TAG: &str = "latest";

/// Image tag for `repo_dir` plus a warning when it had to fall back.
///
/// The tag is `<7-char commit>-<branch>`. Outside a git checkout, or when
/// HEAD cannot be resolved, every image is tagged `latest`.
pub fn version_tag(repo_dir: &Path) -> (String, Option<String>) {
    version_tag_with(repo_dir, |args| run_in_optional(repo_dir, "git", args))
}

fn version_tag_with<F>(repo_dir: &Path, git: F) -> (String, Option<String>)
where
    F: Fn(&[&str]) -> Option<String>,
{
    let hash = git(&["rev-parse", "--short=7", "HEAD"]);
    let branch = git(&["rev-parse", "--abbrev-ref", "HEAD"]);

    match (hash, branch) {
        (Some(hash), Some(branch)) => {
            let short: String = hash.chars().take(7).collect();
            (format!("{}-{}", short, sanitize(&branch)), None)
        }
        _ => (
            FALLBACK_TAG.to_string(),
            Some(format!(
                "{} is not a git checkout, images will be tagged as `{}`",
                repo_dir.display(),
                FALLBACK_TAG
            )),
        ),
    }
}

/// Docker tags only allow `[A-Za-z0-9_.-]`; branches like `feature/x` are
/// flattened to `feature-x`.
fn sanitize(branch: &str) -> String {
    branch
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect()
}
