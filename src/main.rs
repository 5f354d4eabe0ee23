use bugbuster::cli::{Cli, Commands, ConfigAction};
use bugbuster::config::Config;
use bugbuster::embedding::{encoder_from_config, SharedIndex};
use bugbuster::error::{BugbusterError, Result};
use bugbuster::llm::model_from_config;
use bugbuster::pipeline::{refresh_index, DefectAssistant};
use bugbuster::records::load_records_file;
use bugbuster::retrieval::Query;
use bugbuster::storage::DefectStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn main() -> Result<()> {
    let cli = Cli::parse_args();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Serve { bind } => {
            let mut config = load_config(cli.config, cli.profile)?;
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            cmd_serve(config)?;
        }
        Commands::Ask {
            question,
            conversation,
            json,
        } => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_ask(config, question, conversation, json)?;
        }
        Commands::Import { file } => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_import(&config, &file)?;
        }
        Commands::Records { service } => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_records(&config, service.as_deref())?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, cli.profile, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose {
        "bugbuster=debug"
    } else {
        "bugbuster=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| BugbusterError::Io {
        source: e,
        context: "Failed to create tokio runtime".to_string(),
    })
}

/// Open the store, build the index and wire the pipeline
fn build_assistant(config: &Config) -> Result<Arc<DefectAssistant>> {
    let encoder = encoder_from_config(&config.embedding)?;
    let store = DefectStore::open(&config.storage.database_path()?)?;
    let shared = Arc::new(SharedIndex::new());

    let stats = refresh_index(&store, encoder.as_ref(), &shared)?;
    if stats.records == 0 {
        tracing::warn!("No defect records imported yet. Run 'bugbuster import <file>' first.");
    }

    let model = model_from_config(&config.llm)?;
    tracing::info!("Answers generated by {}", model.model_name());
    Ok(Arc::new(DefectAssistant::new(config, shared, encoder, model)?))
}

fn cmd_serve(config: Config) -> Result<()> {
    let assistant = build_assistant(&config)?;
    runtime()?.block_on(bugbuster::server::serve(assistant, &config.server))
}

fn cmd_ask(config: Config, question: String, conversation: Option<String>, json: bool) -> Result<()> {
    let assistant = build_assistant(&config)?;
    let query = Query {
        text: question,
        conversation_id: conversation,
    };
    let result = runtime()?.block_on(assistant.respond(query));

    if json {
        let out = serde_json::to_string_pretty(&result).map_err(|e| BugbusterError::Json {
            source: e,
            context: "Failed to serialize answer".to_string(),
        })?;
        println!("{}", out);
        return Ok(());
    }

    println!("{}", result.message);
    if !result.results.is_empty() {
        println!();
        for m in &result.results {
            println!(
                "  {:<12} {:>5.2}  {}",
                m.defect_id.as_deref().unwrap_or("-"),
                m.relevance,
                m.defect_summary
            );
        }
    }
    Ok(())
}

fn cmd_import(config: &Config, file: &Path) -> Result<()> {
    let records = load_records_file(file, &config.intent.known_services)?;
    let store = DefectStore::open(&config.storage.database_path()?)?;
    let stats = store.import_records(&records)?;

    let encoder = encoder_from_config(&config.embedding)?;
    let refreshed = refresh_index(&store, encoder.as_ref(), &SharedIndex::new())?;

    println!("✓ Imported {} records from {}", records.len(), file.display());
    println!(
        "  New: {}  Updated: {}  Unchanged: {}",
        stats.inserted, stats.updated, stats.unchanged
    );
    println!(
        "  Embeddings: {} computed, {} reused",
        refreshed.encoded, refreshed.cached
    );
    Ok(())
}

fn cmd_records(config: &Config, service: Option<&str>) -> Result<()> {
    let store = DefectStore::open(&config.storage.database_path()?)?;
    let records = store.load_records()?;

    let mut shown = 0;
    for record in &records {
        if let Some(service) = service {
            if !record.service.eq_ignore_ascii_case(service) {
                continue;
            }
        }
        println!("{:<12} {:<12} {}", record.key, record.service, record.summary);
        shown += 1;
    }

    println!("\n{} of {} records", shown, records.len());
    Ok(())
}

fn cmd_config(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    action: ConfigAction,
) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path, profile)?;
            let json = serde_json::to_string_pretty(&config).map_err(|e| BugbusterError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;
            println!("{}", json);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>, profile: Option<String>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'bugbuster config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        if let Some(profile) = profile {
            config.apply_profile(&profile)?;
        }
        bugbuster::config::ConfigValidator::validate(&config)?;
        return Ok(config);
    }

    if let Some(profile) = profile {
        Config::load_with_profile(&path, &profile)
    } else {
        Config::load(&path)
    }
}
