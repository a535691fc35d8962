use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use flavor_harvest::app::{AcquireOptions, AcquireResult, App};
use flavor_harvest::config::ConfigLoader;
use flavor_harvest::domain::{IdRange, Source};
use flavor_harvest::error::HarvestError;
use flavor_harvest::fetcher::{EntityFetcher, FlavorDbHttpClient, OfflineFetcher};
use flavor_harvest::flavorgraph::SystemGitCloner;
use flavor_harvest::output::{JsonOutput, OutputMode};
use flavor_harvest::tui::Tui;

#[derive(Parser)]
#[command(name = "flavor-harvest")]
#[command(about = "Download raw FlavorGraph and FlavorDB data and build the FlavorDB tables")]
#[command(version, author)]
struct Cli {
    #[arg(long)]
    non_interactive: bool,

    /// Path to a flavor-harvest.json config file.
    #[arg(long)]
    config: Option<String>,

    /// Download only one source.
    #[arg(long, value_enum)]
    only: Option<Source>,

    /// Root directory for raw downloads (overrides the config file).
    #[arg(long)]
    raw_root: Option<String>,

    /// First FlavorDB entity id to sweep.
    #[arg(long)]
    from: Option<u32>,

    /// Last FlavorDB entity id to sweep (inclusive).
    #[arg(long)]
    to: Option<u32>,

    /// Rebuild the FlavorDB tables from cached entities without any requests.
    #[arg(long)]
    extract_only: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<HarvestError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &HarvestError) -> u8 {
    match error {
        HarvestError::ConfigRead(_)
        | HarvestError::ConfigParse(_)
        | HarvestError::InvalidRange(_)
        | HarvestError::InvalidSource(_) => 2,
        HarvestError::Http(_)
        | HarvestError::PreflightFailed { .. }
        | HarvestError::MissingTool(_)
        | HarvestError::Git(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let mut config = ConfigLoader::resolve(cli.config.as_deref())?;
    if let Some(raw_root) = &cli.raw_root {
        config.raw_root = Utf8PathBuf::from(raw_root.clone());
    }
    let range_override = match (cli.from, cli.to) {
        (None, None) => None,
        (from, to) => Some(IdRange::new(
            from.unwrap_or(config.flavordb.range.start()),
            to.unwrap_or(config.flavordb.range.end()),
        )?),
    };
    let options = AcquireOptions {
        extract_only: cli.extract_only,
        range_override,
    };
    let sources: Vec<Source> = match cli.only {
        Some(source) => vec![source],
        None => Source::ALL.to_vec(),
    };

    let needs_network = sources.contains(&Source::Fdb) && !options.extract_only;
    if needs_network {
        let fetcher = FlavorDbHttpClient::new(&config.flavordb)?;
        let app = App::new(config, fetcher, SystemGitCloner::new());
        execute(app, sources, options, output_mode)
    } else {
        let app = App::new(config, OfflineFetcher, SystemGitCloner::new());
        execute(app, sources, options, output_mode)
    }
}

fn execute<F: EntityFetcher + 'static>(
    app: App<F, SystemGitCloner>,
    sources: Vec<Source>,
    options: AcquireOptions,
    output_mode: OutputMode,
) -> miette::Result<()> {
    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.acquire(&sources, &options, &JsonOutput)?;
            JsonOutput::print_acquire(&result).into_diagnostic()?;
            Ok(())
        }
        OutputMode::Interactive => {
            let mut tui = Tui::new();
            let result = tui.run(move |sink| app.acquire(&sources, &options, sink))?;
            tui.finish(&result)?;
            print_summary(&result);
            Ok(())
        }
    }
}

fn print_summary(result: &AcquireResult) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let red = "\x1b[31m";
    let reset = "\x1b[0m";

    if let Some(graph) = &result.flavorgraph {
        println!(
            "{cyan}FlavorGraph ({}): {} files in {}{reset}",
            graph.action, graph.files, graph.path
        );
    }

    if let Some(db) = &result.flavordb {
        let color = match db.status.as_str() {
            "complete" | "extracted" => green,
            "aborted" => yellow,
            _ => red,
        };
        println!("{color}FlavorDB: {}{reset}", db.status);
        if let Some(reason) = &db.reason {
            println!("{color}   reason: {reason}{reset}");
        }
        if let Some(path) = &db.diagnostic {
            println!("{color}   saved response: {path}{reset}");
        }
        if let Some(sweep) = &db.sweep {
            println!("   New downloads:  {}", sweep.downloaded);
            println!("   Already cached: {}", sweep.skipped);
            println!("   IDs not found:  {}", sweep.not_found);
            println!("   Errors:         {}", sweep.errors.len());
            for error in sweep.errors.iter().take(5) {
                println!("{yellow}     id {}: {}{reset}", error.id, error.message);
            }
        }
        if let Some(counts) = &db.counts {
            println!("   Entities:                  {}", counts.entities);
            println!("   Unique molecules:          {}", counts.molecules);
            println!("   Entity-molecule edges:     {}", counts.entity_molecule_edges);
            println!(
                "   Molecule-descriptor edges: {}",
                counts.molecule_descriptor_edges
            );
        }
    }

    println!("{cyan}Download summary{reset}");
    for source in &result.summary {
        if source.downloaded {
            println!(
                "{green}  {:20} {} files, {:.1} MB{reset}",
                source.name, source.files, source.megabytes
            );
        } else {
            println!("{yellow}  {:20} NOT DOWNLOADED{reset}", source.name);
        }
    }
}
