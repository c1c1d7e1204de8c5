use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

const ENV_FILE_VAR: &str = "DEVSYNC_ENV_FILE";
const PROFILE_VAR: &str = "DEVSYNC_ENV";
const DEFAULT_PROFILE: &str = "development";

/// Where settings files come from before clap sees the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
enum EnvSource {
    /// `--env-file` or `DEVSYNC_ENV_FILE`. The file must exist.
    Explicit(PathBuf),
    /// The per-profile chain in the working directory. Missing files are skipped.
    Chain(Vec<PathBuf>),
}

/// Loads env files ahead of argument parsing so `DEVSYNC_*` values in them
/// reach clap's `env` fallbacks. Returns the files that were read, for
/// logging once tracing is up.
pub fn bootstrap_from_args(args: &[OsString]) -> Result<Vec<PathBuf>> {
    let cwd = std::env::current_dir().context("failed to read current directory")?;
    let explicit = extract_env_file_arg(args)
        .or_else(|| std::env::var_os(ENV_FILE_VAR).filter(|v| !v.is_empty()).map(PathBuf::from));
    let profile = std::env::var(PROFILE_VAR)
        .ok()
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_PROFILE.to_string());

    load_env(&env_source(&cwd, explicit, &profile))
}

fn load_env(source: &EnvSource) -> Result<Vec<PathBuf>> {
    let files = match source {
        EnvSource::Explicit(path) => {
            if !path.is_file() {
                anyhow::bail!("env file {} does not exist", path.display());
            }
            vec![path.clone()]
        }
        EnvSource::Chain(paths) => paths.iter().filter(|p| p.is_file()).cloned().collect(),
    };

    let mut merged = HashMap::new();
    for file in &files {
        for (key, value) in read_env_file(file)? {
            if std::env::var_os(&key).is_none() {
                // Later files in the chain win over earlier ones.
                merged.insert(key, value);
            }
        }
    }

    let mut envs: Vec<(String, String)> = merged.into_iter().collect();
    envs.sort_by(|a, b| a.0.cmp(&b.0));
    for (key, value) in envs {
        std::env::set_var(key, value);
    }
    Ok(files)
}

fn read_env_file(path: &Path) -> Result<Vec<(String, String)>> {
    let parsed = dotenvy::from_path_iter(path)
        .with_context(|| format!("failed to read env file {}", path.display()))?;
    parsed
        .map(|item| item.with_context(|| format!("failed to parse env file {}", path.display())))
        .collect()
}

fn extract_env_file_arg(args: &[OsString]) -> Option<PathBuf> {
    let mut explicit = None;
    let mut rest = args.iter().skip(1);
    while let Some(arg) = rest.next() {
        let Some(arg) = arg.to_str() else {
            continue;
        };
        if arg == "--" {
            break;
        }
        if arg == "--env-file" {
            explicit = rest.next().map(PathBuf::from);
        } else if let Some(value) = arg.strip_prefix("--env-file=") {
            explicit = Some(PathBuf::from(value));
        }
    }
    explicit
}

fn env_source(cwd: &Path, explicit: Option<PathBuf>, profile: &str) -> EnvSource {
    if let Some(path) = explicit {
        return EnvSource::Explicit(cwd.join(path));
    }
    EnvSource::Chain(vec![
        cwd.join(".env"),
        cwd.join(format!(".env.{profile}")),
        cwd.join(".env.local"),
        cwd.join(format!(".env.{profile}.local")),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[test]
    fn env_file_flag_is_found_in_either_form() {
        assert_eq!(
            extract_env_file_arg(&argv(&["devsync", "sync", "--env-file", "kiosk.env", "status"])),
            Some(PathBuf::from("kiosk.env"))
        );
        assert_eq!(
            extract_env_file_arg(&argv(&["devsync", "--env-file=/etc/devsync.env"])),
            Some(PathBuf::from("/etc/devsync.env"))
        );
        assert_eq!(
            extract_env_file_arg(&argv(&["devsync", "records", "push", "--", "--env-file"])),
            None
        );
    }

    #[test]
    fn explicit_file_replaces_the_profile_chain() {
        let cwd = Path::new("/srv/front-desk");
        assert_eq!(
            env_source(cwd, Some(PathBuf::from("custom.env")), "kiosk"),
            EnvSource::Explicit(PathBuf::from("/srv/front-desk/custom.env"))
        );
        assert_eq!(
            env_source(cwd, Some(PathBuf::from("/etc/devsync.env")), "kiosk"),
            EnvSource::Explicit(PathBuf::from("/etc/devsync.env"))
        );
    }

    #[test]
    fn profile_chain_goes_from_shared_to_local() {
        let EnvSource::Chain(files) = env_source(Path::new("/srv"), None, "kiosk") else {
            panic!("expected the profile chain");
        };
        let names: Vec<_> = files
            .iter()
            .map(|f| f.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, [".env", ".env.kiosk", ".env.local", ".env.kiosk.local"]);
    }

    #[test]
    fn missing_chain_files_are_skipped_and_later_files_win() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".env"),
            "DEVSYNC_TEST_ENV_SHARED=base\nDEVSYNC_TEST_ENV_OVERRIDE=base\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join(".env.local"),
            "DEVSYNC_TEST_ENV_OVERRIDE=local\n",
        )
        .unwrap();

        let loaded = load_env(&env_source(dir.path(), None, "kiosk")).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(std::env::var("DEVSYNC_TEST_ENV_SHARED").unwrap(), "base");
        assert_eq!(std::env::var("DEVSYNC_TEST_ENV_OVERRIDE").unwrap(), "local");
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = env_source(dir.path(), Some(PathBuf::from("absent.env")), "kiosk");
        let err = load_env(&source).unwrap_err();
        assert!(err.to_string().contains("absent.env"));
    }
}
