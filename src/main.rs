use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::Path;
use std::process::ExitCode;

use roster_mail::cli::{Cli, Command, Paths, USAGE};
use roster_mail::compose;
use roster_mail::config::Config;
use roster_mail::dataset::{ContactFilter, Dataset};
use roster_mail::dispatch::{DispatchController, PromptConfirmer};
use roster_mail::identity;
use roster_mail::transport::SmtpSession;
use roster_mail::usage;

fn main() -> ExitCode {
    let cli = match Cli::parse(std::env::args().skip(1)) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("Error: {e}\n\n{USAGE}");
            return ExitCode::from(2);
        }
    };

    if let Err(e) = init_runtime() {
        eprintln!("Error: {e:#}");
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Command::Help => {
            print!("{USAGE}");
            return ExitCode::SUCCESS;
        }
        Command::Init { write_contacts } => run_init(&cli.paths, write_contacts),
        Command::Send { template, filter } => run_send(&cli.paths, &template, &filter),
        Command::Render { template, filter } => run_render(&cli.paths, &template, &filter),
        Command::Usage { stats } => run_usage(stats.as_deref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let aborted = e
                .downcast_ref::<roster_mail::Error>()
                .is_some_and(roster_mail::Error::is_user_abort);
            if aborted {
                eprintln!("Aborted, nothing was sent.");
            } else {
                eprintln!("Error: {e:#}");
            }
            ExitCode::FAILURE
        }
    }
}

fn init_runtime() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();
    Ok(())
}

fn run_init(paths: &Paths, write_contacts: bool) -> anyhow::Result<()> {
    let config = Config::load(&paths.config).map_err(roster_mail::Error::from)?;
    let namespace = config.namespace().map_err(roster_mail::Error::from)?;

    let mut dataset = Dataset::load(&paths.contacts, &[], &ContactFilter::default())
        .map_err(roster_mail::Error::from)?;
    dataset.assign_identities(&namespace);
    if write_contacts {
        dataset
            .write_csv(&paths.contacts)
            .map_err(roster_mail::Error::from)?;
    }

    let entries = identity::client_entries(&namespace, dataset.contacts());
    let json = identity::client_list_json(&entries).map_err(roster_mail::Error::from)?;
    println!("{json}");
    Ok(())
}

fn run_send(paths: &Paths, template: &str, filter: &ContactFilter) -> anyhow::Result<()> {
    let config = Config::load(&paths.config).map_err(roster_mail::Error::from)?;
    let password = config.smtp.password().map_err(roster_mail::Error::from)?;
    let (composer, dataset) = compose::prepare(&config, paths, filter)?;
    let entry = composer.environment().resolve_entry(template);

    if dataset.is_empty() {
        tracing::warn!("No contacts matched, nothing to send");
        return Ok(());
    }

    let stdin = io::stdin();
    let confirmer = PromptConfirmer::new(stdin.lock(), io::stdout());
    let mut controller = DispatchController::new(confirmer, io::stdout());

    let server = config.smtp.server.clone();
    let port = config.smtp.port();
    let report = controller
        .run(
            dataset.contacts(),
            |contact| composer.compose(&entry, contact),
            || SmtpSession::connect(&server, port),
            &config.smtp.user,
            &password,
        )
        .map_err(roster_mail::Error::from)?;

    eprintln!("Sent {} message(s).", report.sent);
    Ok(())
}

fn run_render(paths: &Paths, template: &str, filter: &ContactFilter) -> anyhow::Result<()> {
    let config = Config::load(&paths.config).map_err(roster_mail::Error::from)?;
    let (composer, dataset) = compose::prepare(&config, paths, filter)?;
    let entry = composer.environment().resolve_entry(template);

    let mut out = io::stdout().lock();
    for contact in dataset.contacts() {
        let text = composer
            .render(&entry, contact)
            .map_err(roster_mail::Error::from)?;
        writeln!(out, "── {} ──", contact.email())?;
        writeln!(out, "{text}")?;
    }
    out.flush()?;
    Ok(())
}

fn run_usage(stats: Option<&Path>) -> anyhow::Result<()> {
    let records = match stats {
        Some(path) => {
            let file = File::open(path).map_err(roster_mail::error::StatsError::from)?;
            usage::parse_stats(BufReader::new(file))
        }
        None => usage::parse_stats(io::stdin().lock()),
    }
    .map_err(roster_mail::Error::from)?;
    usage::write_csv(&records, io::stdout().lock()).map_err(roster_mail::Error::from)?;
    Ok(())
}
