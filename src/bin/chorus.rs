//! Chorus CLI.
//!
//! Drives logged-in AI chat tabs in a real Chrome session from the command
//! line: broadcast a prompt to every enabled service, collect the newest
//! replies, export conversations as markdown files, or report per-service
//! connection health.
//!
//! Usage examples:
//!   Attach to a browser started with --remote-debugging-port:
//!     $ chorus --connect ws://127.0.0.1:9222/devtools/browser/<id> \
//!       send "explain the borrow checker in one paragraph"
//!   Launch a dedicated Chrome with a persistent profile:
//!     $ chorus --user-data-dir ~/.config/chorus-profile status
//!
//! Tabs already open on the chat sites are adopted automatically, so
//! pointing the tool at a window where the services are logged in is
//! enough. Replies and status tables go to stdout; logging stays on
//! stderr.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};

use chorus::client::{ChorusClient, ServiceStatus};
use chorus::config::{BrowserMode, ChorusConfig, ChorusConfigOverrides, LoggerCallback, Verbosity};
use chorus::runtime::ChromiumoxideRuntime;
use chorus::service::Service;
use chorus::types::{ConnectionStatus, ResponseWait};

#[derive(Parser)]
#[command(
    name = "chorus",
    author,
    version,
    about = "Broadcast prompts to browser AI chats and export the replies"
)]
struct Cli {
    /// Increase log verbosity (pass multiple times for DEBUG).
    #[arg(long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Attach to a running browser over its DevTools websocket instead of
    /// launching one.
    #[arg(long, global = true, value_name = "WS_URL")]
    connect: Option<String>,

    /// Chrome/Chromium executable to launch.
    #[arg(long, global = true, value_name = "PATH")]
    chrome: Option<String>,

    /// Profile directory for the launched browser, so existing logins apply.
    #[arg(long, global = true, value_name = "DIR")]
    user_data_dir: Option<String>,

    /// Launch the browser without a window.
    #[arg(long, global = true)]
    headless: bool,

    /// Comma-separated subset of services to drive
    /// (chatgpt, claude, gemini, perplexity, grok).
    #[arg(long, global = true, value_name = "LIST")]
    services: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send a prompt to every enabled service, or to one with --service.
    Send(SendArgs),
    /// Wait for and print the newest assistant reply per service.
    Collect(CollectArgs),
    /// Export conversations as markdown files.
    Export(ExportArgs),
    /// Report per-service connection health.
    Status,
}

#[derive(Args)]
struct SendArgs {
    /// Prompt text to deliver.
    message: String,

    /// Send to a single service instead of broadcasting.
    #[arg(long, value_name = "SERVICE")]
    service: Option<String>,

    /// Wait for the replies after sending and print them.
    #[arg(long)]
    collect: bool,
}

#[derive(Args)]
struct CollectArgs {
    /// Collect from a single service instead of every open session.
    #[arg(long, value_name = "SERVICE")]
    service: Option<String>,

    /// Read whatever is rendered now instead of waiting for completion.
    #[arg(long)]
    immediate: bool,

    /// Override the completion deadline in seconds.
    #[arg(long, value_name = "SECS", conflicts_with = "immediate")]
    timeout: Option<u64>,
}

#[derive(Args)]
struct ExportArgs {
    /// Export a single service instead of every open session.
    #[arg(long, value_name = "SERVICE")]
    service: Option<String>,

    /// Directory the markdown files are written into.
    #[arg(long, default_value = "exports", value_name = "DIR")]
    output: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_env_logger();

    let cli = Cli::parse();
    let config = build_config(&cli)?;

    let client = ChorusClient::new(config, ChromiumoxideRuntime::new())
        .context("failed to construct chorus client")?;

    client
        .init()
        .await
        .context("failed to start the browser session")?;

    let adopted = client
        .adopt_pages()
        .await
        .context("failed to scan the browser for existing service tabs")?;
    if !adopted.is_empty() {
        let labels: Vec<&str> = adopted.iter().map(|service| service.label()).collect();
        info!("Adopted open tabs: {}", labels.join(", "));
    }

    let outcome = match &cli.command {
        Command::Send(args) => run_send(&client, args).await,
        Command::Collect(args) => run_collect(&client, args).await,
        Command::Export(args) => run_export(&client, args).await,
        Command::Status => run_status(&client).await,
    };

    if let Err(error) = client.shutdown().await {
        warn!("Browser shutdown reported: {error}");
    }

    outcome
}

async fn run_send(client: &ChorusClient<ChromiumoxideRuntime>, args: &SendArgs) -> Result<()> {
    let outcomes = match args.service.as_deref() {
        Some(name) => {
            let service = parse_service(name)?;
            let result = client
                .send(service, &args.message)
                .await
                .with_context(|| format!("send to {} failed", service.label()))?;
            vec![(service, result)]
        }
        None => client
            .broadcast(&args.message)
            .await
            .context("broadcast failed")?,
    };

    let mut delivered = 0usize;
    for (service, result) in &outcomes {
        if result.success {
            delivered += 1;
            match result.warning.as_deref() {
                Some(warning) => warn!("{}: sent, {warning}", service.label()),
                None => info!("{}: sent", service.label()),
            }
        } else {
            warn!(
                "{}: not delivered: {}",
                service.label(),
                result.error.as_deref().unwrap_or("unknown failure")
            );
        }
    }
    info!("Delivered to {delivered} of {} service(s)", outcomes.len());

    if args.collect {
        for (service, result) in &outcomes {
            if !result.success {
                continue;
            }
            match client
                .collect(*service, client.response_wait(*service))
                .await
            {
                Ok(reply) => print_reply(*service, &reply),
                Err(error) => warn!("{}: collect failed: {error}", service.label()),
            }
        }
    }

    if delivered == 0 {
        return Err(anyhow!("no service accepted the message"));
    }
    Ok(())
}

async fn run_collect(
    client: &ChorusClient<ChromiumoxideRuntime>,
    args: &CollectArgs,
) -> Result<()> {
    let services = select_services(client, args.service.as_deref())?;

    for service in services {
        let wait = if args.immediate {
            ResponseWait::Immediate
        } else if let Some(secs) = args.timeout {
            ResponseWait::Window(Duration::from_secs(secs))
        } else {
            client.response_wait(service)
        };

        match client.collect(service, wait).await {
            Ok(reply) => print_reply(service, &reply),
            Err(error) => warn!("{}: collect failed: {error}", service.label()),
        }
    }
    Ok(())
}

async fn run_export(client: &ChorusClient<ChromiumoxideRuntime>, args: &ExportArgs) -> Result<()> {
    let services = select_services(client, args.service.as_deref())?;

    let mut written = 0usize;
    for service in services {
        let outcome = match client.export(service).await {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!("{}: export failed: {error}", service.label());
                continue;
            }
        };

        let path = client
            .write_export(&outcome, &args.output)
            .await
            .with_context(|| format!("failed to write {}", outcome.file_name))?;
        info!(
            "{}: {} message(s) via {} -> {}",
            service.label(),
            outcome.snapshot.total_messages,
            outcome.snapshot.detection_method.as_str(),
            path.display()
        );
        written += 1;
    }

    if written == 0 {
        return Err(anyhow!("no conversation could be exported"));
    }
    Ok(())
}

async fn run_status(client: &ChorusClient<ChromiumoxideRuntime>) -> Result<()> {
    let report = client
        .check_connections()
        .await
        .context("status check failed")?;
    if report.is_empty() {
        info!("No service tabs registered; open the chat sites in the browser or run send first");
        return Ok(());
    }

    for entry in &report {
        println!("{}", format_status_line(entry));
        if matches!(entry.status, Some(ConnectionStatus::Ready)) {
            if let Ok(snapshot) = client.snapshot(entry.service).await {
                println!(
                    "       {} user / {} assistant message(s) via {}",
                    snapshot.user_messages,
                    snapshot.assistant_messages,
                    snapshot.detection_method.as_str()
                );
            }
        }
    }
    Ok(())
}

fn format_status_line(entry: &ServiceStatus) -> String {
    let state = match (&entry.status, &entry.error) {
        (Some(status), _) => status.label().to_string(),
        (None, Some(error)) => format!("error: {error}"),
        (None, None) => "unknown".to_string(),
    };
    format!(
        "[{:>4}] {:<12} {:<18} {}",
        entry.service.badge(),
        entry.service.label(),
        state,
        entry.url.as_deref().unwrap_or("-")
    )
}

fn print_reply(service: Service, reply: &str) {
    println!();
    println!("=== {} {} ===", service.emoji(), service.label());
    println!("{reply}");
}

fn select_services(
    client: &ChorusClient<ChromiumoxideRuntime>,
    requested: Option<&str>,
) -> Result<Vec<Service>> {
    match requested {
        Some(name) => Ok(vec![parse_service(name)?]),
        None => {
            let registered = client.registered_services();
            if registered.is_empty() {
                return Err(anyhow!(
                    "no service tabs are open; send a message first or attach to a browser with the chats open"
                ));
            }
            Ok(registered)
        }
    }
}

fn build_config(cli: &Cli) -> Result<ChorusConfig> {
    let base = ChorusConfig::from_env().context("invalid CHORUS_* environment")?;

    let mut overrides = ChorusConfigOverrides::default();
    overrides.verbose = Some(verbosity_from_count(cli.verbose));
    overrides.use_rich_logging = Some(false);
    overrides.logger = Some(Some(make_logger_callback()));

    if let Some(url) = &cli.connect {
        overrides = overrides
            .browser(BrowserMode::Connect)
            .websocket_url(Some(url.clone()));
    }
    if let Some(path) = &cli.chrome {
        overrides.chrome_executable = Some(Some(path.clone()));
    }
    if let Some(dir) = &cli.user_data_dir {
        overrides.user_data_dir = Some(Some(dir.clone()));
    }
    if cli.headless {
        overrides.headless = Some(true);
    }
    if let Some(list) = &cli.services {
        overrides.enabled_services = Some(Some(parse_service_list(list)?));
    }

    Ok(base.with_overrides(overrides))
}

fn parse_service_list(list: &str) -> Result<Vec<Service>> {
    let services = list
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(parse_service)
        .collect::<Result<Vec<_>>>()?;
    if services.is_empty() {
        return Err(anyhow!("--services needs at least one service name"));
    }
    Ok(services)
}

fn parse_service(name: &str) -> Result<Service> {
    Service::parse(name).ok_or_else(|| {
        anyhow!("unknown service '{name}' (expected chatgpt, claude, gemini, perplexity, or grok)")
    })
}

fn make_logger_callback() -> LoggerCallback {
    Arc::new(|line: &str| {
        log::info!("{line}");
    })
}

fn verbosity_from_count(count: u8) -> Verbosity {
    match count {
        0 => Verbosity::Medium,
        1 => Verbosity::Detailed,
        _ => Verbosity::Detailed,
    }
}

fn init_env_logger() {
    if env::var("RUST_LOG").is_err() {
        unsafe {
            env::set_var("RUST_LOG", "info");
        }
    }

    let _ = env_logger::Builder::from_env(env_logger::Env::default())
        .format_timestamp_secs()
        .try_init();
}
