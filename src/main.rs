use anyhow::{Context, bail};
use clap::Parser;
use std::fs;
use std::process::ExitCode;

use chronicler::logging;
use chronicler::orchestrator::{Console, Orchestrator, default_selection};
use chronicler::step::StepStatus;
use chronicler::store::MemoryStore;
use chronicler::{Catalog, Character, HttpEndpoint, Settings, Splat, standard_registry};

/// Drives an LLM through the generation steps for one character record.
#[derive(Parser)]
#[command(name = "chronicler", version, about)]
struct Cli {
    /// Character record to read and write back.
    character: String,

    /// Comma-separated step keys to run; defaults to every unfinished step.
    #[arg(long, value_delimiter = ',', value_name = "KEYS")]
    steps: Option<Vec<String>>,

    /// World-item catalog; generation runs against an empty one when omitted.
    #[arg(long, value_name = "FILE")]
    catalog: Option<String>,

    /// Start a blank character of this splat instead of reading the file.
    #[arg(long, value_name = "SPLAT")]
    new: Option<Splat>,

    /// Rank to generate a Spirit at (Spirit characters only).
    #[arg(long, value_name = "RANK")]
    spirit: Option<u8>,
}

struct PrintConsole;

impl Console for PrintConsole {
    fn status(&self, slot: usize, key: &str, status: StepStatus) {
        println!("[{slot:>2}] {key}: {status}");
    }

    fn info(&self, message: &str) {
        println!("{message}");
    }

    fn warn(&self, message: &str) {
        eprintln!("Warning: {message}");
    }

    fn error(&self, message: &str) {
        eprintln!("Error: {message}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    logging::init()?;

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(_) => {
            let defaults = Settings::new();
            defaults
                .save()
                .context("could not write default settings")?;
            defaults
        }
    };
    if settings.api_key.is_empty() {
        bail!("No API key configured. Add one to ./data/settings.json and run again.");
    }

    let mut character: Character = match cli.new {
        Some(splat) => Character::new(splat),
        None => {
            let raw = fs::read_to_string(&cli.character)
                .with_context(|| format!("could not read {}", cli.character))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("could not parse {}", cli.character))?
        }
    };

    let console = PrintConsole;

    if let Some(rank) = cli.spirit {
        match character.spirit.as_mut() {
            Some(spirit) => {
                spirit.rank = rank;
                console.info(&format!("Generating Spirit with Rank {rank}."));
            }
            None => bail!("--spirit only applies to Spirit characters"),
        }
    }

    let catalog = match &cli.catalog {
        Some(path) => {
            Catalog::load_from_file(path).with_context(|| format!("could not load {path}"))?
        }
        None => Catalog::empty(),
    };

    let registry = standard_registry();
    let selected = match cli.steps {
        Some(steps) => steps,
        None => default_selection(&registry, &character),
    };
    if selected.is_empty() {
        console.info("Nothing to generate.");
        return Ok(ExitCode::SUCCESS);
    }

    let endpoint = HttpEndpoint::new(&settings)?;
    let store = MemoryStore::new(character);
    let orchestrator = Orchestrator::new(&registry, &catalog, &endpoint, &console);
    let reports = orchestrator.generate(&store, &selected).await;

    let finished = store.into_character();
    let serialized = serde_json::to_string_pretty(&finished)?;
    fs::write(&cli.character, serialized)
        .with_context(|| format!("could not write {}", cli.character))?;
    console.info(&format!("Saved {}.", cli.character));

    let failed = reports.iter().filter(|report| !report.success).count();
    if failed > 0 {
        console.error(&format!("{failed} step(s) failed; see ./data/log.txt."));
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

// TODO: Support reading the API key from an environment variable so CI runs
// do not need a settings file.
