use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cli::{AppContext, InitArgs};

/// Name written by `stanpatch init`
pub const CONFIG_FILE: &str = "stanpatch.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config
{
    /// Reserved workspace directory (imports, patch store, sandboxes)
    pub stan_path: String,

    /// Patch command settings
    pub patch: PatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchConfig
{
    /// Copy failure diagnostics to the clipboard when possible
    pub clipboard: bool,

    /// Persist the raw payload to `<stan_path>/patch/.patch`
    pub persist_raw: bool,

    /// Keep check-mode sandboxes after reporting
    pub keep_sandbox: bool,
}

impl Default for Config
{
    fn default() -> Self
    {
        Self { stan_path: ".stan".to_string(), patch: PatchConfig::default() }
    }
}

impl Default for PatchConfig
{
    fn default() -> Self
    {
        Self { clipboard: true, persist_raw: true, keep_sandbox: true }
    }
}

/// Load layered config: defaults <- repo config file <- `STANPATCH_*` env
pub fn load_config(repo_root: &Path) -> Result<Config>
{
    let mut builder = config::Config::builder();

    // Load from config files in priority order
    let config_paths = ["stanpatch.toml", "stanpatch.yaml", "stanpatch.json", ".stanpatch.toml"];

    for name in &config_paths
    {
        let candidate = repo_root.join(name);
        if candidate.exists()
        {
            builder = builder.add_source(config::File::from(candidate));
            break;
        }
    }

    // STANPATCH_STAN_PATH, STANPATCH_PATCH__CLIPBOARD, ...
    builder = builder.add_source(
        config::Environment::with_prefix("STANPATCH")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let cfg = builder
        .build()
        .context("Failed to load configuration")?;
    let parsed: Config = cfg
        .try_deserialize()
        .context("Failed to parse configuration")?;

    tracing::debug!(stan_path = %parsed.stan_path, "configuration loaded");
    Ok(parsed)
}

pub fn init(
    args: InitArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let config_path = args
        .path
        .join(CONFIG_FILE);

    if config_path.exists() && !args.force
    {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    let config = Config::default();
    let toml_string =
        toml::to_string_pretty(&config).context("Failed to serialize default config")?;

    std::fs::write(&config_path, toml_string).context("Failed to write config file")?;

    if !ctx.quiet
    {
        println!("Created config file at {}", config_path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests
{
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_without_file()
    {
        let tmp = TempDir::new().unwrap();
        let cfg = load_config(tmp.path()).unwrap();
        assert_eq!(cfg.stan_path, ".stan");
        assert!(cfg.patch.persist_raw);
    }

    #[test]
    fn file_overrides_defaults()
    {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("stanpatch.toml"),
            "stan_path = \"custom\"\n[patch]\nclipboard = false\n",
        )
        .unwrap();

        let cfg = load_config(tmp.path()).unwrap();
        assert_eq!(cfg.stan_path, "custom");
        assert!(!cfg.patch.clipboard);
        // Untouched keys keep their defaults
        assert!(cfg.patch.keep_sandbox);
    }

    #[test]
    fn init_refuses_overwrite()
    {
        let tmp = TempDir::new().unwrap();
        let ctx = AppContext { quiet: true, no_color: true, verbose: false };
        init(InitArgs { path: tmp.path().to_path_buf(), force: false }, &ctx).unwrap();
        assert!(tmp.path().join(CONFIG_FILE).exists());
        assert!(init(InitArgs { path: tmp.path().to_path_buf(), force: false }, &ctx).is_err());
        init(InitArgs { path: tmp.path().to_path_buf(), force: true }, &ctx).unwrap();
    }
}
