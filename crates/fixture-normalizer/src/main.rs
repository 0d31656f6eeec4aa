use anyhow::{Result, bail};
use camino::Utf8PathBuf;
use clap::Parser;
use fixture_normalizer::{
    CheckOutcome, NormalizeOptions, NormalizerConfig, check, discover_fixtures, normalize_with,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "fixture-normalizer",
    version,
    about = "Collapse layer paths out of package diff fixtures"
)]
struct Cli {
    /// Diff fixture files, or directories searched for `*.json` fixtures
    #[arg(value_name = "PATH", required = true)]
    paths: Vec<Utf8PathBuf>,
    /// Path to the configuration file (defaults to ./fixture-normalizer.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<Utf8PathBuf>,
    /// Report fixtures that are not normalized instead of rewriting them
    #[arg(long)]
    check: bool,
    /// Indentation width for rewritten fixtures
    #[arg(long, value_name = "N")]
    indent: Option<usize>,
}

impl Cli {
    /// Flags win over every configuration layer.
    fn resolve_options(&self, mut config: NormalizerConfig) -> NormalizeOptions {
        if let Some(indent) = self.indent {
            config.indent = indent;
        }
        config.options()
    }
}

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = NormalizerConfig::load(cli.config.as_deref())?;
    let options = cli.resolve_options(config);

    let mut fixtures = Vec::new();
    for path in &cli.paths {
        fixtures.extend(discover_fixtures(path)?);
    }
    if fixtures.is_empty() {
        bail!("no diff fixtures found under {:?}", cli.paths);
    }

    if cli.check {
        check_all(&fixtures, &options)
    } else {
        normalize_all(&fixtures, &options)
    }
}

fn normalize_all(fixtures: &[Utf8PathBuf], options: &NormalizeOptions) -> Result<()> {
    let mut rewritten = 0;
    for fixture in fixtures {
        if normalize_with(fixture, options)?.rewritten {
            rewritten += 1;
        }
    }
    info!(
        fixtures = fixtures.len(),
        rewritten, "fixture normalization complete"
    );
    Ok(())
}

fn check_all(fixtures: &[Utf8PathBuf], options: &NormalizeOptions) -> Result<()> {
    let mut stale = Vec::new();
    for fixture in fixtures {
        if check(fixture, options)? == CheckOutcome::Stale {
            stale.push(fixture.as_str());
        }
    }
    if !stale.is_empty() {
        bail!(
            "{} fixture(s) need normalizing: {}",
            stale.len(),
            stale.join(", ")
        );
    }
    info!(fixtures = fixtures.len(), "all fixtures normalized");
    Ok(())
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn single_positional_path() {
        let cli = Cli::try_parse_from(["fixture-normalizer", "tests/diff.json"]).unwrap();
        assert_eq!(cli.paths, [Utf8PathBuf::from("tests/diff.json")]);
        assert!(!cli.check);
        assert_eq!(cli.indent, None);
    }

    #[test]
    fn indent_flag_overrides_config() {
        let config = NormalizerConfig {
            indent: 8,
            trailing_newline: true,
            ..NormalizerConfig::default()
        };
        let cli =
            Cli::try_parse_from(["fixture-normalizer", "--indent", "2", "diff.json"]).unwrap();

        let options = cli.resolve_options(config);
        assert_eq!(options.indent, 2);
        assert!(options.trailing_newline);
    }

    #[test]
    fn config_indent_kept_without_flag() {
        let config = NormalizerConfig {
            indent: 8,
            ..NormalizerConfig::default()
        };
        let cli = Cli::try_parse_from(["fixture-normalizer", "diff.json"]).unwrap();

        assert_eq!(cli.resolve_options(config).indent, 8);
    }

    #[test]
    fn path_is_required() {
        assert!(Cli::try_parse_from(["fixture-normalizer", "--check"]).is_err());
    }
}
