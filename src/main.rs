//! picoc-harness - run the interpreter test suite on a board
//!
//! Connects to the board, then for each test resets the interpreter, uploads
//! the program line by line, runs it and prints its output.

use clap::{Parser, ValueEnum};
use picoc_harness::core::report::{RunEvent, RunObserver, SuiteReport, TestStatus};
use picoc_harness::core::transport::list_ports;
use picoc_harness::{
    CliResult, Connector, CorpusProvider, DirectoryCorpus, ExitCodes, HarnessConfig, Link,
    LogFormat, LoggedLink, SerialConfig, SessionRunner, TcpConfig, TranscriptLogger, Transport,
};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info};

/// Report output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON report on stdout, transcript on stderr
    Json,
}

/// Run the picoc test suite on an embedded target
#[derive(Parser, Debug)]
#[command(name = "picoc-harness", version, about, long_about = None)]
struct Cli {
    /// Run only this test file (default: the whole suite)
    test: Option<String>,

    /// Serial port of the board
    #[arg(short, long, env = "PICOC_PORT")]
    port: Option<String>,

    /// Baud rate
    #[arg(short, long, env = "PICOC_BAUD")]
    baud: Option<u32>,

    /// Serial read timeout in milliseconds
    #[arg(long)]
    read_timeout_ms: Option<u64>,

    /// Reach the board through a TCP bridge instead (host:port)
    #[arg(long, value_name = "HOST:PORT")]
    tcp: Option<String>,

    /// Directory holding the test files
    #[arg(short = 'C', long, env = "PICOC_CORPUS")]
    corpus_dir: Option<PathBuf>,

    /// Config file (default: config.toml in the user config directory)
    #[arg(long, env = "PICOC_CONFIG")]
    config: Option<PathBuf>,

    /// File listing the suite, one test per line
    #[arg(long)]
    list_file: Option<PathBuf>,

    /// Seconds to wait for a test to finish (0 = forever)
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Stop at the first hung test
    #[arg(long)]
    fail_fast: bool,

    /// Print the suite and exit
    #[arg(long)]
    list: bool,

    /// List available serial ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Record the wire traffic to this file
    #[arg(long)]
    log: Option<PathBuf>,

    /// Wire log format (text, hex, csv, jsonl)
    #[arg(long, default_value = "text")]
    log_format: LogFormat,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Verbose diagnostics
    #[arg(short, long)]
    verbose: bool,

    /// Quiet mode (target output and errors only)
    #[arg(short, long)]
    quiet: bool,
}

/// Prints the run as it happens
struct ConsoleObserver {
    to_stderr: bool,
    quiet: bool,
}

impl ConsoleObserver {
    fn new(cli: &Cli) -> Self {
        Self {
            to_stderr: cli.format == OutputFormat::Json,
            quiet: cli.quiet,
        }
    }

    fn print(&self, text: &str) {
        if self.to_stderr {
            eprintln!("{text}");
        } else {
            println!("{text}");
            let _ = std::io::stdout().flush();
        }
    }

    fn notice(&self, text: &str) {
        if !self.quiet {
            self.print(text);
        }
    }
}

/// One line of the console transcript
#[derive(Debug, PartialEq, Eq)]
enum ConsoleLine {
    /// Progress text, hidden by `--quiet`
    Notice(String),
    /// Target output, always shown
    Output(String),
}

fn console_lines(event: RunEvent) -> Vec<ConsoleLine> {
    use ConsoleLine::{Notice, Output};

    match event {
        RunEvent::Waiting { target } => vec![Notice(format!(
            "Waiting until port {target} can be opened..."
        ))],
        RunEvent::Connected { .. } => vec![Notice("Connected and initialized!".to_string())],
        RunEvent::TestStarted { name } => vec![
            Notice(format!("Running test {name}...")),
            Notice("---".to_string()),
        ],
        RunEvent::Output { line } => vec![Output(line)],
        RunEvent::TestFinished { name, status } => {
            let mut lines = vec![Notice("---".to_string())];
            if status == TestStatus::Hung {
                lines.push(Output(format!("Test {name} did not finish")));
            }
            lines.push(Notice("Finished!".to_string()));
            lines
        }
    }
}

impl RunObserver for ConsoleObserver {
    fn on_event(&mut self, event: RunEvent) {
        for line in console_lines(event) {
            match line {
                ConsoleLine::Notice(text) => self.notice(&text),
                ConsoleLine::Output(text) => self.print(&text),
            }
        }
    }
}

fn init_tracing(cli: &Cli) {
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else if cli.quiet {
        tracing::Level::ERROR
    } else {
        tracing::Level::WARN
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(std::io::stderr);

    match cli.format {
        OutputFormat::Json => builder.json().init(),
        OutputFormat::Text => builder.init(),
    }
}

fn load_config(cli: &Cli) -> Result<HarnessConfig, CliResult> {
    let mut config = match &cli.config {
        Some(path) => HarnessConfig::load_from(path)?,
        None => HarnessConfig::load()?,
    };

    if let Some(addr) = &cli.tcp {
        let tcp = TcpConfig::parse(addr)
            .map_err(|e| CliResult::error(ExitCodes::INVALID_ARGS, e.to_string()))?;
        config.link = Transport::Tcp(tcp);
    } else if cli.port.is_some() || cli.baud.is_some() || cli.read_timeout_ms.is_some() {
        let mut serial = match &config.link {
            Transport::Serial(serial) => serial.clone(),
            Transport::Tcp(_) => SerialConfig::default(),
        };
        if let Some(port) = &cli.port {
            serial.port.clone_from(port);
        }
        if let Some(baud) = cli.baud {
            serial.baud_rate = baud;
        }
        if let Some(ms) = cli.read_timeout_ms {
            serial.read_timeout_ms = ms;
        }
        config.link = Transport::Serial(serial);
    }

    if let Some(dir) = &cli.corpus_dir {
        config.suite.corpus_dir.clone_from(dir);
    }
    if let Some(secs) = cli.timeout {
        config.timing.completion_timeout_secs = secs;
    }
    if cli.fail_fast {
        config.suite.fail_fast = true;
    }

    config.validate()?;
    Ok(config)
}

fn print_ports(cli: &Cli) -> Result<CliResult, CliResult> {
    let ports = list_ports().map_err(|e| CliResult::error(ExitCodes::ERROR, e.to_string()))?;

    match cli.format {
        OutputFormat::Json => {
            let json: Vec<serde_json::Value> = ports
                .iter()
                .map(|p| {
                    serde_json::json!({
                        "name": p.port_name,
                        "type": format!("{:?}", p.port_type)
                    })
                })
                .collect();
            let text = serde_json::to_string_pretty(&json)
                .map_err(|e| CliResult::error(ExitCodes::ERROR, e.to_string()))?;
            println!("{text}");
        }
        OutputFormat::Text => {
            if ports.is_empty() && !cli.quiet {
                println!("No serial ports found.");
            }
            for port in &ports {
                println!("{}", port.port_name);
            }
        }
    }

    Ok(CliResult::success())
}

fn print_report(cli: &Cli, report: &SuiteReport) -> Result<(), CliResult> {
    if cli.format == OutputFormat::Json {
        let text = serde_json::to_string_pretty(report)
            .map_err(|e| CliResult::error(ExitCodes::ERROR, e.to_string()))?;
        println!("{text}");
    }
    Ok(())
}

async fn run(cli: &Cli) -> Result<CliResult, CliResult> {
    if cli.list_ports {
        return print_ports(cli);
    }

    let config = load_config(cli)?;
    let mut corpus: DirectoryCorpus = config.corpus();
    if let Some(path) = &cli.list_file {
        corpus = corpus.with_list_file(path)?;
    }

    if cli.list {
        for name in corpus.suite() {
            println!("{name}");
        }
        return Ok(CliResult::success());
    }

    // a typo in the test name should not cost a board reset
    if let Some(name) = &cli.test {
        corpus.load(name)?;
    }

    let mut console = ConsoleObserver::new(cli);
    let link = Connector::new(config.connector_config())
        .connect(&config.link, &mut console)
        .await?;

    let link: Box<dyn Link> = match &cli.log {
        Some(path) => {
            let logger = TranscriptLogger::create(path, cli.log_format)?;
            info!("Logging wire traffic to {}", path.display());
            Box::new(LoggedLink::new(link, logger))
        }
        None => link,
    };

    let mut runner = SessionRunner::new(link, config.collector(), config.session_config());
    let report = runner
        .run_suite(&corpus, cli.test.as_deref(), &mut console)
        .await?;

    print_report(cli, &report)?;
    Ok(CliResult::from_report(&report))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);
    debug!(?cli, "Starting picoc-harness v{}", picoc_harness::VERSION);

    let result = run(&cli).await.unwrap_or_else(|e| e);
    match (&result, result.message()) {
        (CliResult::Error(..), Some(msg)) => eprintln!("Error: {msg}"),
        (CliResult::Success(_), Some(msg)) if !cli.quiet && cli.format == OutputFormat::Text => {
            println!("{msg}");
        }
        _ => {}
    }
    result.to_exit_code()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_each_test_ends_with_finished() {
        let lines = console_lines(RunEvent::TestFinished {
            name: "00_assignment.c".to_string(),
            status: TestStatus::Completed,
        });
        assert_eq!(
            lines,
            vec![
                ConsoleLine::Notice("---".to_string()),
                ConsoleLine::Notice("Finished!".to_string()),
            ]
        );
    }

    #[test]
    fn test_hung_test_is_reported() {
        let lines = console_lines(RunEvent::TestFinished {
            name: "15_recursion.c".to_string(),
            status: TestStatus::Hung,
        });
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[1],
            ConsoleLine::Output("Test 15_recursion.c did not finish".to_string())
        );
        assert_eq!(lines[2], ConsoleLine::Notice("Finished!".to_string()));
    }

    #[test]
    fn test_output_is_verbatim() {
        assert_eq!(
            console_lines(RunEvent::Output {
                line: "  x = 1".to_string()
            }),
            vec![ConsoleLine::Output("  x = 1".to_string())]
        );
    }
}
