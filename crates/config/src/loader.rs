use crate::Config;
use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use std::path::{Path, PathBuf};

/// Prefix of environment variables read by [`Config::load`].
pub const ENV_PREFIX: &str = "MEMBANK_";
const NESTING_SEPARATOR: &str = "__";

/// Per-user configuration file, e.g. `~/.config/membank/config.toml` on Linux.
pub fn default_config_file() -> Option<PathBuf> {
    ProjectDirs::from("", "", "membank").map(|dirs| dirs.config_dir().join("config.toml"))
}

pub(crate) fn figment(file: Option<&Path>, env_prefix: &str) -> Result<Figment> {
    let mut figment = Figment::from(Serialized::defaults(Config::default()));
    match file {
        Some(file) => {
            if !file.is_file() {
                exn::bail!(ErrorKind::NotFound(file.to_path_buf()));
            }
            figment = merge_file(figment, file)?;
        },
        None => {
            if let Some(file) = default_config_file()
                && file.is_file()
            {
                figment = merge_file(figment, &file)?;
            }
        },
    }
    Ok(figment.merge(Env::prefixed(env_prefix).split(NESTING_SEPARATOR)))
}

fn merge_file(figment: Figment, file: &Path) -> Result<Figment> {
    tracing::debug!(path = %file.display(), "Loading configuration file");
    let extension = file.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase);
    Ok(match extension.as_deref() {
        Some("toml") => figment.merge(Toml::file_exact(file)),
        Some("yaml" | "yml") => figment.merge(Yaml::file_exact(file)),
        Some("json") => figment.merge(Json::file_exact(file)),
        _ => exn::bail!(ErrorKind::UnsupportedFormat(file.to_path_buf())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::time::Duration;

    fn write(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[rstest]
    #[case("config.toml", "root = \"/srv/bank\"\n[cache]\ncapacity = 7\n")]
    #[case("config.yaml", "root: /srv/bank\ncache:\n  capacity: 7\n")]
    #[case("config.yml", "root: /srv/bank\ncache:\n  capacity: 7\n")]
    #[case("config.json", r#"{"root": "/srv/bank", "cache": {"capacity": 7}}"#)]
    fn file_formats(#[case] name: &str, #[case] contents: &str) {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, name, contents);
        let config = Config::load_with_prefix(Some(&path), "MEMBANK_TEST_FORMATS_").unwrap();
        assert_eq!(config.root().unwrap(), Path::new("/srv/bank"));
        assert_eq!(config.cache.capacity, 7);
        // Untouched sections keep their defaults.
        assert_eq!(config.retry_policy().base_delay, Duration::from_millis(100));
    }

    #[test]
    fn environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "config.toml", "[retry]\nmax_retries = 1\nbase_delay_ms = 10\n");
        // SAFETY: variable names are unique to this test.
        unsafe {
            std::env::set_var("MEMBANK_TEST_ENV_RETRY__MAX_RETRIES", "5");
            std::env::set_var("MEMBANK_TEST_ENV_ROOT", "/from/env");
        }
        let config = Config::load_with_prefix(Some(&path), "MEMBANK_TEST_ENV_").unwrap();
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.base_delay_ms, 10);
        assert_eq!(config.root().unwrap(), Path::new("/from/env"));
    }

    #[test]
    fn explicit_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load_with_prefix(Some(&dir.path().join("nope.toml")), "MEMBANK_TEST_MISSING_").unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "config.ini", "root = /srv/bank");
        let err = Config::load_with_prefix(Some(&path), "MEMBANK_TEST_INI_").unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnsupportedFormat(_)));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "config.toml", "[cache]\ncapacity = 3\nsize = 4\n");
        let err = Config::load_with_prefix(Some(&path), "MEMBANK_TEST_UNKNOWN_").unwrap_err();
        assert!(matches!(&*err, ErrorKind::Load(_)));
    }

    #[test]
    fn loaded_values_are_validated() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "config.toml", "[retry]\nbackoff_factor = 0.25\n");
        let err = Config::load_with_prefix(Some(&path), "MEMBANK_TEST_VALIDATE_").unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(_)));
    }
}
