//! Campaign directories and the archives they are uploaded as.

use glob::Pattern;
use std::fs::File;
use std::path::{Path, PathBuf};
use zip::write::FileOptions;
use zip::ZipWriter;

use crate::error::{Error, Result};
use crate::manifest::ResourceRef;
use crate::utils::path::{self, to_slash};

const CAMPAIGN_ROOT_DEPTH: usize = 2;

/// Directory a campaign entry stands for.
///
/// The campaign root is the first two components of the entry
/// (`campaigns/spring/connections/db.json` is `campaigns/spring`). A shorter
/// entry is used as is. When the root names a file, its parent is the campaign.
pub fn campaign_dir(repo_dir: &Path, reference: &ResourceRef) -> PathBuf {
    let root: PathBuf = reference.path.components().take(CAMPAIGN_ROOT_DEPTH).collect();
    let resolved = repo_dir.join(root);
    if resolved.is_file() {
        resolved.parent().map(Path::to_path_buf).unwrap_or(resolved)
    } else {
        resolved
    }
}

/// Manifest-relative form of the campaign directory, used to match
/// connections that belong to the campaign.
pub fn campaign_prefix(repo_dir: &Path, reference: &ResourceRef) -> PathBuf {
    let dir = campaign_dir(repo_dir, reference);
    dir.strip_prefix(repo_dir)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| reference.path.clone())
}

/// Zip every file under `dir` into `<dir>.zip` next to it.
///
/// Entry names are relative to `dir` with forward slashes; directories are
/// not stored. Any unreadable file fails the whole archive and the partial
/// archive is deleted. The caller removes the archive after upload.
pub fn pack(dir: &Path) -> Result<PathBuf> {
    let display = dir.display().to_string();
    if !dir.is_dir() {
        return Err(Error::archive_io(display, "not a directory"));
    }

    let mut archive_name = dir.as_os_str().to_os_string();
    archive_name.push(".zip");
    let archive_path = PathBuf::from(archive_name);

    let file = File::create(&archive_path)
        .map_err(|e| Error::archive_io(archive_path.display().to_string(), e.to_string()))?;

    match write_archive(file, dir, &archive_path) {
        Ok(()) => Ok(archive_path),
        Err(e) => {
            if let Err(remove) = std::fs::remove_file(&archive_path) {
                tracing::warn!("Failed to remove {}: {}", archive_path.display(), remove);
            }
            Err(e)
        }
    }
}

fn write_archive(file: File, dir: &Path, archive_path: &Path) -> Result<()> {
    let display = dir.display().to_string();
    let mut writer = ZipWriter::new(file);
    let options = FileOptions::default();

    let pattern = format!("{}/**/*", Pattern::escape(&display));
    let entries = glob::glob(&pattern).map_err(|e| Error::archive_io(display.clone(), e.to_string()))?;

    for entry in entries {
        let file_path = entry.map_err(|e| Error::archive_io(display.clone(), e.to_string()))?;
        if file_path.is_dir() {
            continue;
        }

        let relative = file_path
            .strip_prefix(dir)
            .map_err(|e| Error::archive_io(file_path.display().to_string(), e.to_string()))?;
        let name = to_slash(relative);

        let mut source = File::open(&file_path)
            .map_err(|e| Error::archive_io(file_path.display().to_string(), e.to_string()))?;
        writer
            .start_file(name, options)
            .map_err(|e| Error::archive_io(file_path.display().to_string(), e.to_string()))?;
        std::io::copy(&mut source, &mut writer)
            .map_err(|e| Error::archive_io(file_path.display().to_string(), e.to_string()))?;
    }

    writer
        .finish()
        .map_err(|e| Error::archive_io(archive_path.display().to_string(), e.to_string()))?;
    Ok(())
}

/// True when `connection` lies under the campaign directory `prefix`,
/// compared component by component.
pub fn contains(prefix: &Path, connection: &str) -> bool {
    path::normalize_separators(connection).starts_with(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;
    use zip::ZipArchive;

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn pack_stores_files_relative_to_campaign_dir() {
        let repo = TempDir::new().unwrap();
        let dir = repo.path().join("campaigns").join("campaignA");
        write(&dir.join("a").join("b.json"), "{\"x\":1}");
        write(&dir.join("top.yaml"), "name: top");
        std::fs::create_dir_all(dir.join("empty")).unwrap();

        let archive_path = pack(&dir).unwrap();
        assert_eq!(archive_path, repo.path().join("campaigns").join("campaignA.zip"));

        let mut archive = ZipArchive::new(File::open(&archive_path).unwrap()).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(names, vec!["a/b.json".to_string(), "top.yaml".to_string()]);

        let mut content = String::new();
        archive
            .by_name("a/b.json")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "{\"x\":1}");
    }

    #[test]
    fn pack_rejects_missing_directory() {
        let repo = TempDir::new().unwrap();
        let err = pack(&repo.path().join("nope")).unwrap_err();
        assert_eq!(err.code.as_str(), "archive.io");
    }

    #[test]
    fn file_entry_resolves_to_its_directory() {
        let repo = TempDir::new().unwrap();
        write(&repo.path().join("campaignA").join("campaign.json"), "{}");

        let reference = ResourceRef::new("campaignA/campaign.json");
        assert_eq!(campaign_dir(repo.path(), &reference), repo.path().join("campaignA"));
        assert_eq!(campaign_prefix(repo.path(), &reference), PathBuf::from("campaignA"));

        write(
            &repo.path().join("campaigns").join("spring").join("connections").join("db.json"),
            "{}",
        );
        let deep = ResourceRef::new("campaigns/spring/connections/db.json");
        assert_eq!(
            campaign_dir(repo.path(), &deep),
            repo.path().join("campaigns").join("spring")
        );
        assert_eq!(
            campaign_prefix(repo.path(), &deep),
            Path::new("campaigns").join("spring")
        );
    }

    #[cfg(unix)]
    #[test]
    fn failed_pack_leaves_no_archive_behind() {
        let repo = TempDir::new().unwrap();
        let dir = repo.path().join("campaignA");
        write(&dir.join("ok.json"), "{}");
        std::os::unix::fs::symlink(repo.path().join("missing.json"), dir.join("z_dangling.json")).unwrap();

        let err = pack(&dir).unwrap_err();

        assert_eq!(err.code.as_str(), "archive.io");
        assert!(!repo.path().join("campaignA.zip").exists());
    }

    #[test]
    fn containment_is_by_whole_components() {
        let prefix = PathBuf::from("campaignA");
        assert!(contains(&prefix, "campaignA/connections/c1.yaml"));
        assert!(contains(&prefix, r"campaignA\connections\c1.yaml"));
        assert!(!contains(&prefix, "campaignAB/connections/c1.yaml"));
        assert!(!contains(&prefix, "connections/c1.yaml"));
    }
}
