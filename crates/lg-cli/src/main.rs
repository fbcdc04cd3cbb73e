//! ListGuard CLI
//!
//! Offline tools for inspecting filter lists, plus profile administration and
//! a long-running updater on top of `lg-profiles`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use clap::{ArgAction, Parser, Subcommand};

use lg_compiler::{build_index, parse_filter_list, parse_line, ParsedLine};
use lg_core::{MatchDecision, MatchResult, RequestContext, RequestType};
use lg_profiles::{
    ContentBlockingManager, EngineConfig, ProfileCategory, ProfileEventKind, ProfileInfo, ProfileSettings,
    UpdateOutcome,
};

#[derive(Parser)]
#[command(name = "lg-cli")]
#[command(about = "ListGuard filter list tools and subscription manager")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decide whether a request would be blocked by the given lists
    Check {
        /// Filter list files
        #[arg(short, long, required = true)]
        list: Vec<PathBuf>,

        /// Request URL
        #[arg(short, long)]
        url: String,

        /// URL of the page making the request
        #[arg(short, long)]
        origin: Option<String>,

        /// Request type (script, image, stylesheet, xmlhttprequest, ...)
        #[arg(short = 't', long = "type", default_value = "other")]
        request_type: String,
    },

    /// Parse a filter list and report what it contains
    Parse {
        /// Filter list file
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Manage filter subscriptions
    Profiles {
        /// Engine configuration file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[command(subcommand)]
        action: ProfileAction,
    },

    /// Load all profiles and keep them updated until interrupted
    Run {
        /// Engine configuration file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ProfileAction {
    /// List subscriptions and their status
    List,

    /// Subscribe to a filter list
    Add {
        name: String,

        /// http(s):// or file:// source
        url: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long, default_value = "other")]
        category: ProfileCategory,

        /// Language tags for regional lists
        #[arg(long, value_delimiter = ',')]
        languages: Vec<String>,

        /// Hours between automatic updates (0 = never)
        #[arg(long)]
        interval_hours: Option<u64>,

        /// Add without enabling
        #[arg(long)]
        disabled: bool,
    },

    Remove {
        name: String,
    },

    Enable {
        name: String,
    },

    Disable {
        name: String,
    },

    /// Download now (every enabled profile when no name is given)
    Update {
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Check {
            list,
            url,
            origin,
            request_type,
        } => {
            setup_logging("warn", cli.verbose);
            cmd_check(&list, &url, origin.as_deref(), &request_type)
        }
        Commands::Parse { input } => {
            setup_logging("warn", cli.verbose);
            cmd_parse(&input, cli.verbose > 0)
        }
        Commands::Profiles { config, action } => match load_config(config.as_deref(), cli.verbose) {
            Ok(config) => cmd_profiles(&config, action).await,
            Err(e) => Err(e),
        },
        Commands::Run { config } => match load_config(config.as_deref(), cli.verbose) {
            Ok(config) => cmd_run(&config).await,
            Err(e) => Err(e),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// `RUST_LOG` wins; otherwise `level`, raised by each `-v`.
fn setup_logging(level: &str, verbose: u8) {
    let level = match verbose {
        0 => level,
        1 => "debug",
        _ => "trace",
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("{level},hyper=warn,reqwest=warn")));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

fn load_config(path: Option<&Path>, verbose: u8) -> Result<EngineConfig, String> {
    let config = EngineConfig::load_or_default(path).map_err(|e| e.to_string())?;
    setup_logging(&config.logging.level, verbose);

    if config.install_public_suffix_list().map_err(|e| e.to_string())? {
        log::info!("Using public suffix list from config");
    }
    Ok(config)
}

// =============================================================================
// Offline Commands
// =============================================================================

fn cmd_check(lists: &[PathBuf], url: &str, origin: Option<&str>, request_type: &str) -> Result<(), String> {
    let request_type = RequestType::from_type_name(request_type);
    let ctx = RequestContext::new(url, origin, request_type);

    let mut verdict = MatchResult::default();
    for path in lists {
        let content =
            fs::read_to_string(path).map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
        let compiled = build_index(&content).map_err(|e| format!("'{}': {}", path.display(), e))?;

        let result = compiled.index.match_request(&ctx);
        match result.decision {
            MatchDecision::Exception => {
                verdict = result;
                break;
            }
            MatchDecision::Block if verdict.decision == MatchDecision::NoMatch => verdict = result,
            _ => {}
        }
    }

    let label = match verdict.decision {
        MatchDecision::Block => "BLOCK",
        MatchDecision::Exception => "ALLOW (exception)",
        MatchDecision::NoMatch => "ALLOW",
    };
    println!("{label}");
    if let Some(filter) = verdict.filter() {
        println!("  Rule: {filter}");
    }
    Ok(())
}

fn cmd_parse(input: &Path, verbose: bool) -> Result<(), String> {
    let content =
        fs::read_to_string(input).map_err(|e| format!("Failed to read '{}': {}", input.display(), e))?;

    let start = Instant::now();
    let parsed = parse_filter_list(&content);
    let elapsed = start.elapsed();

    let report = &parsed.report;
    let metadata = &parsed.metadata;

    println!("Filter list: {}", input.display());
    if let Some(title) = &metadata.title {
        println!("  Title:       {title}");
    }
    if let Some(version) = &metadata.version {
        println!("  Version:     {version}");
    }
    if let Some(expires) = metadata.expires {
        println!("  Expires:     {}", format_duration(expires));
    }
    println!("  Lines:       {}", report.lines);
    println!("  Blocking:    {}", report.blocking);
    println!("  Exceptions:  {}", report.exceptions);
    println!("  Cosmetic:    {}", report.cosmetic);
    println!("  Comments:    {}", report.comments);
    println!("  Ignored:     {}", report.ignored);
    println!("  Errors:      {}", report.errors);
    println!("  Time:        {:.1}ms", elapsed.as_secs_f64() * 1000.0);

    if verbose && report.errors > 0 {
        println!();
        println!("Unparseable lines:");
        for (line_no, line) in content.lines().enumerate() {
            if let ParsedLine::Unparseable(e) = parse_line(line) {
                println!("  {:>6}: {} ({})", line_no + 1, line.trim(), e);
            }
        }
    }

    Ok(())
}

// =============================================================================
// Profile Commands
// =============================================================================

async fn cmd_profiles(config: &EngineConfig, action: ProfileAction) -> Result<(), String> {
    let manager = ContentBlockingManager::open_with_http(config).map_err(|e| e.to_string())?;

    match action {
        ProfileAction::List => {
            let profiles = manager.list_profiles();
            if profiles.is_empty() {
                println!("No profiles in {}", config.storage_dir.display());
            }
            for info in &profiles {
                print_profile(info);
            }
        }
        ProfileAction::Add {
            name,
            url,
            title,
            category,
            languages,
            interval_hours,
            disabled,
        } => {
            let mut settings = ProfileSettings::new(name, url)
                .with_category(category)
                .with_languages(languages);
            if let Some(title) = title {
                settings = settings.with_title(title);
            }
            if let Some(hours) = interval_hours {
                settings = settings.with_update_interval(Duration::from_secs(hours.saturating_mul(3600)));
            }
            if disabled {
                settings = settings.disabled();
            }
            let info = manager.add_profile(settings).map_err(|e| e.to_string())?;
            println!("Added '{}'", info.name);
        }
        ProfileAction::Remove { name } => {
            manager.remove_profile(&name).map_err(|e| e.to_string())?;
            println!("Removed '{name}'");
        }
        ProfileAction::Enable { name } => {
            manager.set_enabled(&name, true).map_err(|e| e.to_string())?;
            println!("Enabled '{name}'");
        }
        ProfileAction::Disable { name } => {
            manager.set_enabled(&name, false).map_err(|e| e.to_string())?;
            println!("Disabled '{name}'");
        }
        ProfileAction::Update { name } => {
            let names = match name {
                Some(name) => vec![name],
                None => manager
                    .list_profiles()
                    .into_iter()
                    .filter(|p| p.enabled)
                    .map(|p| p.name)
                    .collect(),
            };

            let mut failed = 0;
            for name in names {
                let outcome = manager.refresh_profile(&name).await.map_err(|e| e.to_string())?;
                match outcome {
                    UpdateOutcome::Updated { rules } => println!("{name}: updated ({rules} rules)"),
                    UpdateOutcome::Unchanged => println!("{name}: unchanged"),
                    UpdateOutcome::Failed(e) => {
                        println!("{name}: failed: {e}");
                        failed += 1;
                    }
                }
            }
            if failed > 0 {
                return Err(format!("{failed} profile(s) failed to update"));
            }
        }
    }

    Ok(())
}

fn print_profile(info: &ProfileInfo) {
    let status = if info.enabled { "enabled" } else { "disabled" };
    println!("{} ({}) [{}, {}]", info.name, info.title, info.category, status);
    println!("  Source:      {}", info.source_url);
    if !info.languages.is_empty() {
        println!("  Languages:   {}", info.languages.join(", "));
    }
    if info.update_interval.is_zero() {
        println!("  Updates:     manual");
    } else {
        println!("  Updates:     every {}", format_duration(info.update_interval));
    }
    match info.last_update.and_then(|t| SystemTime::now().duration_since(t).ok()) {
        Some(age) => println!("  Last update: {} ago{}", format_duration(age), if info.is_stale { " (stale)" } else { "" }),
        None => println!("  Last update: never"),
    }
    println!("  State:       {}", info.state);
    if info.consecutive_failures > 0 {
        println!("  Failures:    {}", info.consecutive_failures);
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 86_400 {
        format!("{}d {}h", secs / 86_400, secs % 86_400 / 3600)
    } else if secs >= 3600 {
        format!("{}h {}m", secs / 3600, secs % 3600 / 60)
    } else {
        format!("{}m", secs / 60)
    }
}

// =============================================================================
// Long-running Updater
// =============================================================================

async fn cmd_run(config: &EngineConfig) -> Result<(), String> {
    let manager = ContentBlockingManager::open_with_http(config).map_err(|e| e.to_string())?;
    let mut events = manager.subscribe();

    for (name, outcome) in manager.activate_all().await {
        if let UpdateOutcome::Failed(e) = outcome {
            log::warn!("Profile '{}' not loaded: {}", name, e);
        }
    }

    let scheduler = manager.start_scheduler();
    log::info!(
        "Watching {} profiles, checking every {}s",
        manager.list_profiles().len(),
        config.check_interval().as_secs()
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => match event.kind {
                    ProfileEventKind::Updated { rules } => log::info!("'{}' now has {} rules", event.name, rules),
                    ProfileEventKind::UpdateFailed(e) => log::warn!("'{}' update failed: {}", event.name, e),
                    _ => log::debug!("{:?}", event),
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => log::debug!("Skipped {} events", n),
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    scheduler.stop();
    log::info!("Stopped");
    Ok(())
}
