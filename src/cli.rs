use crate::config::Config;
use crate::sync::DeployOptions;
use clap::Parser;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "circdeploy")]
#[command(about = "Deploy the current CircuitPython project to a connected device", long_about = None)]
#[command(version)]
#[command(after_help = "All .py and .pyc files in the source tree are copied to the device.
All other .py and .pyc files on the device are deleted, except under /lib/.

EXAMPLES:
    # Deploy the current directory to the auto-detected device
    circdeploy

    # Preview what would change
    circdeploy --dry-run

    # Explicit source and destination, keep stale files on the device
    circdeploy --src ./firmware --dest /media/me/CIRCUITPY --no-delete

    # Copy files that .gitignore would exclude too
    circdeploy --no-gitignore")]
pub struct Cli {
    /// Deploy from this location [default: current directory]
    #[arg(short = 's', long = "source", visible_alias = "src")]
    pub source: Option<PathBuf>,

    /// Deploy to this location [default: device path automatically detected]
    #[arg(short = 'd', long = "destination", visible_alias = "dest")]
    pub destination: Option<PathBuf>,

    /// Delete .py/.pyc files on the device that are not in the source (default)
    #[arg(long, overrides_with = "no_delete")]
    pub delete: bool,

    /// Leave files on the device that are not in the source
    #[arg(long, overrides_with = "delete")]
    pub no_delete: bool,

    /// Ignore files using .gitignore files under the source path (default)
    #[arg(long, overrides_with = "no_gitignore")]
    pub use_gitignore: bool,

    /// Do not read .gitignore files
    #[arg(long, overrides_with = "use_gitignore")]
    pub no_gitignore: bool,

    /// Don't copy or delete files, only output what would be done
    #[arg(short = 'n', long, overrides_with = "no_dry_run")]
    pub dry_run: bool,

    /// Apply changes even if the config file asks for a dry run
    #[arg(long, overrides_with = "dry_run")]
    pub no_dry_run: bool,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (only show errors)
    #[arg(short, long)]
    pub quiet: bool,

    /// Output JSON (newline-delimited JSON for scripting)
    #[arg(long)]
    pub json: bool,

    /// Read defaults from this file instead of the user config
    #[arg(long, env = "CIRCDEPLOY_CONFIG")]
    pub config: Option<PathBuf>,
}

impl Cli {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.quiet && self.verbose > 0 {
            anyhow::bail!("--quiet and --verbose cannot be used together");
        }

        if let Some(source) = &self.source {
            if !source.is_dir() {
                anyhow::bail!(crate::error::SyncError::SourceNotFound {
                    path: source.clone()
                });
            }
        }

        Ok(())
    }

    /// Merge flags over config-file values over built-in defaults
    ///
    /// Relative paths are taken relative to `cwd`.
    pub fn deploy_options(&self, config: &Config, cwd: &Path) -> DeployOptions {
        let source = self
            .source
            .clone()
            .or_else(|| config.source.clone())
            .map_or_else(|| cwd.to_path_buf(), |path| cwd.join(path));

        let destination = self
            .destination
            .clone()
            .or_else(|| config.destination.clone())
            .map(|path| cwd.join(path));

        DeployOptions {
            source,
            destination,
            delete: flag_pair(self.delete, self.no_delete, config.delete, true),
            use_gitignore: flag_pair(self.use_gitignore, self.no_gitignore, config.use_gitignore, true),
            dry_run: flag_pair(self.dry_run, self.no_dry_run, config.dry_run, false),
        }
    }

    pub fn log_level(&self) -> tracing::Level {
        if self.quiet || self.json {
            return tracing::Level::ERROR;
        }

        match self.verbose {
            0 => tracing::Level::INFO,
            1 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}

fn flag_pair(on: bool, off: bool, configured: Option<bool>, default: bool) -> bool {
    if off {
        false
    } else if on {
        true
    } else {
        configured.unwrap_or(default)
    }
}
