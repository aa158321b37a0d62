///
/// This module implements the CLI interface for press-migrate: command parsing, argument
/// validation and the async entrypoint shared by `main` and the integration tests.
///
/// All migration logic (transformation, identity maps, ordering, batching) lives in the
/// [`press-migrate-core`] crate. This module only wires the concrete WordPress reader and
/// Contentful writer into it and prints results.
///
/// ## Commands
/// - `export`: snapshot the WordPress REST API into the export directory.
/// - `assets`, `content`, `run`: migrate from the export (media only, entries only, both).
/// - `transform`: convert one HTML file offline and print the document.
/// - `status`: show how much has been mapped so far.
///
/// ## Extending
/// When adding subcommands, update [`Commands`] below and keep non-trivial
/// logic inside `press-migrate-core`.
///
/// [`press-migrate-core`]: ../../press-migrate-core/
use crate::load_config::{load_config, CliConfig};
use crate::upload::ContentfulClient;
use crate::wordpress::{ExportReader, WordPressClient};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use press_migrate_core::identity_map::{IdentityMap, JsonMapStore, MapKind};
use press_migrate_core::migrate::{MigrationReport, Migrator, Phase};
use press_migrate_core::transform::{TransformOptions, Transformer};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// CLI for press-migrate: move a WordPress site into Contentful.
#[derive(Parser)]
#[clap(
    name = "press-migrate",
    version,
    about = "Migrate WordPress content (HTML) into Contentful rich text, resumably"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Export every WordPress family to JSON files in the export directory
    Export {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
    /// Upload media and write the asset map
    Assets {
        #[clap(long)]
        config: PathBuf,
    },
    /// Migrate authors, taxonomies, posts and pages (requires the asset map)
    Content {
        #[clap(long)]
        config: PathBuf,
    },
    /// Assets, then content
    Run {
        #[clap(long)]
        config: PathBuf,
    },
    /// Convert one HTML file to a rich-text document and print it
    Transform {
        /// HTML file to convert
        #[clap(long)]
        input: PathBuf,
        /// State directory whose identity maps resolve images and links
        #[clap(long)]
        state_dir: Option<PathBuf>,
        /// Keep whitespace-only text between blocks
        #[clap(long)]
        preserve_whitespace: bool,
    },
    /// Print how many assets and entries are mapped
    Status {
        #[clap(long)]
        config: PathBuf,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Export { config } => export(load_config(config)?).await,
        Commands::Assets { config } => migrate(load_config(config)?, Phase::Assets).await,
        Commands::Content { config } => migrate(load_config(config)?, Phase::Content).await,
        Commands::Run { config } => migrate(load_config(config)?, Phase::All).await,
        Commands::Transform {
            input,
            state_dir,
            preserve_whitespace,
        } => transform(&input, state_dir.as_deref(), preserve_whitespace),
        Commands::Status { config } => status(&load_config(config)?),
    }
}

async fn export(config: CliConfig) -> Result<()> {
    tracing::info!(command = "export", export_dir = %config.source.export_dir.display(), "[EXPORT] Starting export");
    let client = WordPressClient::new(&config.source);
    let exported = client.export(&config.source.export_dir).await?;
    for family in &exported {
        println!("{:<12} {:>6}  {}", family.family, family.count, family.path.display());
    }
    tracing::info!(command = "export", families = exported.len(), "[EXPORT] Export complete");
    Ok(())
}

async fn migrate(config: CliConfig, phase: Phase) -> Result<()> {
    // The export must exist before anything is written to the destination.
    let reader = ExportReader::open(&config.source.export_dir)?;
    let writer = ContentfulClient::new_from_env(&config.destination, &config.migrate.locale)
        .map_err(|e| anyhow::anyhow!("Failed to construct Contentful client: {e}"))?;
    let store = JsonMapStore::new(&config.migrate.state_dir);

    let migrator = Migrator::new(&reader, &writer, &store, &config.migrate);
    match migrator.run(phase).await {
        Ok(report) => {
            tracing::info!(?phase, run_id = %report.run_id, "[MIGRATE] Migration complete");
            print_report(&report);
            Ok(())
        }
        Err(e) => {
            tracing::error!(?phase, error = %e, "[MIGRATE][ERROR] Migration failed");
            Err(e.into())
        }
    }
}

fn print_report(report: &MigrationReport) {
    println!("run {}", report.run_id);
    for stats in &report.families {
        println!(
            "{:<12} total={:<5} migrated={:<5} skipped={:<5} failed={}",
            stats.family, stats.total, stats.migrated, stats.skipped, stats.failed
        );
        for failure in &stats.failures {
            println!("  failed {} {}: {}", stats.family, failure.source_id, failure.message);
        }
        for entity in &stats.warnings {
            for warning in &entity.warnings {
                println!("  warning {} {}: {}", stats.family, entity.source_id, warning);
            }
        }
    }
}

fn transform(input: &Path, state_dir: Option<&Path>, preserve_whitespace: bool) -> Result<()> {
    let html = fs::read_to_string(input)
        .with_context(|| format!("Failed to read input file {}", input.display()))?;
    let maps = match state_dir {
        Some(dir) => JsonMapStore::new(dir).load_all()?,
        None => IdentityMap::new(),
    };

    let output = Transformer::new(&maps)
        .with_options(TransformOptions {
            preserve_whitespace,
        })
        .transform(Some(&html));

    println!("{}", serde_json::to_string_pretty(&output.document.to_json())?);
    for warning in &output.warnings {
        eprintln!("warning: {warning}");
    }
    let violations = output.document.violations();
    for violation in &violations {
        eprintln!("violation: {violation}");
    }
    if !violations.is_empty() {
        anyhow::bail!("document has {} schema violation(s)", violations.len());
    }
    Ok(())
}

fn status(config: &CliConfig) -> Result<()> {
    let store = JsonMapStore::new(&config.migrate.state_dir);
    let maps = store.load_all()?;

    println!("state dir  {}", store.dir().display());
    println!("assets     {}", maps.len(MapKind::Assets));
    println!("entries    {}", maps.len(MapKind::Entries));

    let mut per_prefix: BTreeMap<&str, usize> = BTreeMap::new();
    for key in maps.mapping(MapKind::Entries).keys() {
        if let Some((prefix, _)) = key.split_once(':') {
            *per_prefix.entry(prefix).or_default() += 1;
        }
    }
    for (prefix, count) in per_prefix {
        println!("  {prefix:<9}{count}");
    }
    Ok(())
}
