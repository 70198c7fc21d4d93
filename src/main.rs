//! CLI entry point for `attachback`.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use attachback::auth::{self, ClientSecrets, OAuthClient, Session, TokenStore};
use attachback::config::Config;
use attachback::download::{self, DownloadOptions, RunStats};
use attachback::gmail::GmailClient;
use attachback::records::DedupLog;

#[derive(Parser)]
#[command(
    name = "attachback",
    version,
    about = "Back up Gmail attachments to a local folder",
    long_about = "Downloads the attachments of every Gmail message matching a search query \
                  into a local folder. Attachments saved by an earlier run are remembered in \
                  records.txt and never downloaded again."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Directory attachments are written into [env: ATTACH_DOWNLOAD_PATH]
    #[arg(short, long, global = true, value_name = "DIR")]
    download_dir: Option<PathBuf>,

    /// Directory holding records.txt [env: ATTACH_RECORD_PATH]
    #[arg(long, global = true, value_name = "DIR")]
    record_dir: Option<PathBuf>,

    /// OAuth2 client secrets file [env: ATTACH_APP_CREDENTIALS]
    #[arg(long, global = true, value_name = "FILE")]
    credentials: Option<PathBuf>,

    /// Token file kept between runs [env: ATTACH_API_TOKEN]
    #[arg(long, global = true, value_name = "FILE")]
    token: Option<PathBuf>,

    /// Gmail search query, e.g. "has:attachment" [env: ATTACH_GMAIL_SEARCH]
    #[arg(short, long, global = true)]
    query: Option<String>,

    /// Only save attachments whose content type contains this [env: ATTACH_CONTENT_TYPE]
    #[arg(short = 't', long, global = true, value_name = "SUBSTRING")]
    content_type: Option<String>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Download new attachments (default)
    Run {
        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Authorize access to Gmail and store the token
    Auth,
    /// Show the effective configuration and check it
    Check,
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (mut config, load_report) = attachback::config::load_config();
    apply_cli_overrides(&mut config, &cli);

    let log_level = match cli.verbose {
        0 => config.general.log_level.clone(),
        1 => "info".to_string(),
        2 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    setup_logging(&log_level, &config);
    load_report.log();
    config.log_effective();

    match cli.command {
        None => cmd_run(&config, false),
        Some(Commands::Run { json }) => cmd_run(&config, json),
        Some(Commands::Auth) => cmd_auth(&config),
        Some(Commands::Check) => cmd_check(&config),
        Some(Commands::Completions { shell }) => cmd_completions(shell),
        Some(Commands::Manpage) => cmd_manpage(),
    }
}

fn apply_cli_overrides(config: &mut Config, cli: &Cli) {
    if let Some(dir) = &cli.download_dir {
        config.paths.download_dir.clone_from(dir);
    }
    if let Some(dir) = &cli.record_dir {
        config.paths.record_dir.clone_from(dir);
    }
    if let Some(path) = &cli.credentials {
        config.paths.app_credentials.clone_from(path);
    }
    if let Some(path) = &cli.token {
        config.paths.api_token.clone_from(path);
    }
    if let Some(q) = &cli.query {
        config.filter.query.clone_from(q);
    }
    if let Some(ct) = &cli.content_type {
        config.filter.content_type.clone_from(ct);
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = attachback::config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "attachback.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Authenticate and build the session the Gmail client refreshes through.
fn authenticate(config: &Config) -> anyhow::Result<Session> {
    let secrets = ClientSecrets::load(&config.paths.app_credentials)?;
    let client = OAuthClient::new(secrets)?;
    let store = TokenStore::new(&config.paths.api_token);
    let token = auth::authenticate(&store, &client, &[auth::GMAIL_READONLY_SCOPE])?;
    Ok(Session::new(token, client, store))
}

/// Download every new matching attachment.
fn cmd_run(config: &Config, json: bool) -> anyhow::Result<()> {
    config.validate()?;

    let mut dedup = DedupLog::open(config.record_file())?;
    let session = authenticate(config)?;
    let gmail = GmailClient::with_base_url(session, &config.api.base_url)?;

    let options = DownloadOptions {
        query: config.filter.query.clone(),
        content_type: config.filter.content_type.clone(),
        download_dir: config.paths.download_dir.clone(),
    };

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} [{elapsed}]")
            .expect("valid template"),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message("Scanning messages");

    let report = |s: &RunStats| {
        pb.set_message(format!(
            "Scanned {} message(s), saved {} attachment(s)",
            s.messages_scanned, s.files_written
        ));
    };
    let progress: &dyn Fn(&RunStats) = &report;

    let start = Instant::now();
    let stats = download::download_attachments(&gmail, &mut dedup, &options, Some(progress))?;
    pb.finish_and_clear();

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print_run_summary(&stats, config, start.elapsed());
    }
    Ok(())
}

/// Only authorize and persist the token.
fn cmd_auth(config: &Config) -> anyhow::Result<()> {
    authenticate(config)?;
    println!("  Token stored in {}", config.paths.api_token.display());
    Ok(())
}

/// Print the effective configuration, then validate it.
fn cmd_check(config: &Config) -> anyhow::Result<()> {
    println!("{}", toml::to_string_pretty(config)?);
    config.validate()?;
    if !config.paths.app_credentials.exists() {
        anyhow::bail!(
            "App credentials not found: {}",
            config.paths.app_credentials.display()
        );
    }
    println!("  Configuration OK");
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "attachback", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

/// Print the run counters in a human-readable table.
fn print_run_summary(stats: &RunStats, config: &Config, elapsed: Duration) {
    use humansize::{format_size, BINARY};

    println!();
    println!("  {:<25} {}", "Messages scanned", stats.messages_scanned);
    println!("  {:<25} {}", "Attachments seen", stats.attachments_seen);
    println!(
        "  {:<25} {} ({})",
        "Saved",
        stats.files_written,
        format_size(stats.bytes_written, BINARY)
    );
    println!("  {:<25} {}", "Already downloaded", stats.already_downloaded);
    if !config.filter.content_type.is_empty() {
        println!("  {:<25} {}", "Other content types", stats.filtered_out);
    }
    if stats.unnamed > 0 {
        println!("  {:<25} {}", "Unnamed, skipped", stats.unnamed);
    }
    if stats.has_failures() {
        println!(
            "  {:<25} {} message(s), {} attachment(s)",
            "Failed", stats.failed_messages, stats.failed_attachments
        );
    }
    if stats.listing_incomplete {
        println!("  Message listing stopped early; see the log for details.");
    }
    println!("  {:<25} {}", "Output directory", config.paths.download_dir.display());
    println!("  {:<25} {:.2?}", "Elapsed", elapsed);
    println!();
}
