//! CLI entry point for `mailgrab`.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::{Args, CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use mailgrab::auth;
use mailgrab::config::Config;
use mailgrab::model::predicate::SelectionPredicate;
use mailgrab::retrieve::{retrieve_api, retrieve_imap, RetrievalOptions, RetrievalReport};
use mailgrab::transport::graph::GraphClient;
use mailgrab::transport::imap::ImapMailbox;

#[derive(Parser)]
#[command(name = "mailgrab", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Root directory for attachment folders (overrides config)
    #[arg(short, long, global = true, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Retrieve from an IMAP folder
    Imap {
        #[command(flatten)]
        selection: Selection,
        /// IMAP server host
        #[arg(long)]
        host: Option<String>,
        /// IMAP server port (TLS)
        #[arg(long)]
        port: Option<u16>,
        /// Folder to read
        #[arg(long)]
        folder: Option<String>,
        /// TOML file with `user` and `password`
        #[arg(long, value_name = "FILE")]
        credentials: Option<PathBuf>,
    },
    /// Retrieve from the Microsoft Graph mail API
    Graph {
        #[command(flatten)]
        selection: Selection,
        /// Maximum records for --date and --subject
        #[arg(long, value_name = "N")]
        max: Option<usize>,
        /// Export the fetched records to this JSON file
        #[arg(long, value_name = "FILE")]
        json: Option<PathBuf>,
        /// Access token (skips the device-code sign-in)
        #[arg(long, env = "MAILGRAB_TOKEN", hide_env_values = true)]
        token: Option<String>,
        /// Application (client) ID for device-code sign-in
        #[arg(long)]
        client_id: Option<String>,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

/// Which messages to retrieve. Without any flag the user is asked.
#[derive(Args)]
struct Selection {
    /// Newest N messages
    #[arg(long, value_name = "N", conflicts_with_all = ["date", "subject"])]
    latest: Option<usize>,
    /// Messages that arrived on this day
    #[arg(long, value_name = "YYYY-MM-DD", conflicts_with = "subject")]
    date: Option<String>,
    /// Subject keyword for --date (case-insensitive, repeatable, any may match)
    #[arg(long, value_name = "TEXT", requires = "date")]
    keyword: Vec<String>,
    /// Messages whose subject contains this text (case-insensitive)
    #[arg(long, value_name = "TEXT")]
    subject: Option<String>,
}

impl Selection {
    fn predicate(&self) -> anyhow::Result<SelectionPredicate> {
        if let Some(n) = self.latest {
            return Ok(SelectionPredicate::LatestN(n));
        }
        if let Some(day) = &self.date {
            return Ok(SelectionPredicate::date_and_keywords(day, &self.keyword)?);
        }
        if let Some(subject) = &self.subject {
            return Ok(SelectionPredicate::SubjectSearch(subject.clone()));
        }
        prompt_predicate()
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = mailgrab::config::load_config();

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    if let Some(dir) = cli.output {
        config.retrieval.attachment_dir = dir;
    }

    let result = match cli.command {
        Commands::Imap {
            selection,
            host,
            port,
            folder,
            credentials,
        } => {
            if let Some(host) = host {
                config.imap.host = host;
            }
            if let Some(port) = port {
                config.imap.port = port;
            }
            if let Some(folder) = folder {
                config.imap.folder = folder;
            }
            if let Some(credentials) = credentials {
                config.imap.credentials_file = credentials;
            }
            cmd_imap(&config, &selection)
        }
        Commands::Graph {
            selection,
            max,
            json,
            token,
            client_id,
        } => {
            if let Some(max) = max {
                config.retrieval.max_messages = max;
            }
            if json.is_some() {
                config.retrieval.json_export = json;
            }
            if let Some(client_id) = client_id {
                config.graph.client_id = client_id;
            }
            cmd_graph(&config, &selection, token)
        }
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Retrieval failed");
    }
    result
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = mailgrab::config::log_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "mailgrab.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Ask on the terminal which messages to retrieve, until the answer is usable.
fn prompt_predicate() -> anyhow::Result<SelectionPredicate> {
    loop {
        eprintln!("Choose an option:");
        eprintln!("  1. Retrieve the latest N messages");
        eprintln!("  2. Retrieve messages by date and subject keywords");
        match read_answer("Enter choice (1 or 2): ")?.as_str() {
            "1" => {
                let answer = read_answer("Number of messages: ")?;
                match answer.parse::<usize>() {
                    Ok(n) => return Ok(SelectionPredicate::LatestN(n)),
                    Err(_) => eprintln!("Not a number: {answer}"),
                }
            }
            "2" => {
                let day = read_answer("Date (YYYY-MM-DD): ")?;
                let keywords =
                    read_answer("Subject keywords, comma separated (leave blank for any): ")?;
                match SelectionPredicate::date_and_keywords(&day, keywords.split(',')) {
                    Ok(predicate) => return Ok(predicate),
                    Err(e) => eprintln!("{e}"),
                }
            }
            _ => eprintln!("Invalid choice."),
        }
    }
}

fn read_answer(prompt: &str) -> anyhow::Result<String> {
    eprint!("{prompt}");
    io::stderr().flush()?;
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        anyhow::bail!("no input on stdin");
    }
    Ok(line.trim().to_string())
}

/// Retrieve from IMAP and print each message as it is found.
fn cmd_imap(config: &Config, selection: &Selection) -> anyhow::Result<()> {
    let predicate = selection.predicate()?;
    let creds = auth::load_credentials(&config.imap.credentials_file)?;
    let mut session = auth::connect_imap(&config.imap.host, config.imap.port, &creds)?;
    let options = RetrievalOptions::from_config(config);

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Scanning [{bar:40.cyan/blue}] {pos}/{len}")
            .expect("valid template")
            .progress_chars("#>-"),
    );

    let result = {
        let mut mailbox = ImapMailbox::new(&mut session, config.imap.folder.as_str());
        let stdout = io::stdout();
        let mut out = stdout.lock();
        retrieve_imap(
            &mut mailbox,
            &predicate,
            &options,
            &mut out,
            Some(&|done, total| {
                pb.set_length(u64::from(total));
                pb.set_position(u64::from(done));
            }),
        )
    };
    pb.finish_and_clear();

    if let Err(e) = session.logout() {
        tracing::warn!(error = %e, "Logout failed");
    }

    print_report(&result?);
    Ok(())
}

/// Retrieve from the Graph API and print the listing.
fn cmd_graph(config: &Config, selection: &Selection, token: Option<String>) -> anyhow::Result<()> {
    let predicate = selection.predicate()?;
    let token = match token {
        Some(token) => token,
        None => auth::acquire_token(&config.graph, &mut io::stderr())?,
    };
    let mut client = GraphClient::new(token)?;
    let options = RetrievalOptions::from_config(config);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let report = retrieve_api(&mut client, &predicate, &options, &mut out)?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &RetrievalReport) {
    eprintln!();
    eprintln!("  {:<25} {}", "Messages", report.messages);
    if !report.attachments.is_empty() || report.failed_attachments > 0 {
        eprintln!("  {:<25} {}", "Attachments saved", report.attachments.len());
    }
    if report.failed_attachments > 0 {
        eprintln!("  {:<25} {}", "Attachments failed", report.failed_attachments);
    }
    if report.skipped > 0 {
        eprintln!("  {:<25} {}", "Skipped", report.skipped);
    }
    if let Some(path) = &report.exported {
        eprintln!("  {:<25} {}", "JSON export", path.display());
    }
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mailgrab", &mut std::io::stdout());
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
