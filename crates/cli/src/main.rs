use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use uartwire_config::{decode_hex, DeviceProfile, Outcome, ScriptAssertion, TransmitScript};
use uartwire_core::metrics::TxMetrics;
use uartwire_core::snapshot::DeviceSnapshot;
use uartwire_core::{PollPolicy, Radix, ReadyModel, SimulatedUart, Termination, TxError, UartTx};

#[derive(Parser, Debug)]
#[command(author, version, about = "uartwire: polled UART transmitter over a simulated device", long_about = None)]
struct Cli {
    /// Enable per-byte transmit tracing
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Transmit text to a simulated UART and echo the wire bytes
    Send(SendArgs),
    /// Run a transmit script and check its assertions
    Test(TestArgs),
}

#[derive(Args, Debug)]
struct SendArgs {
    /// Path to the device profile (YAML)
    #[arg(short, long)]
    profile: Option<PathBuf>,

    /// Append nothing after each string
    #[arg(long)]
    raw: bool,

    /// Append CR LF after each string
    #[arg(long, conflicts_with = "raw")]
    crlf: bool,

    /// Give up after this many status polls per byte (default: spin forever)
    #[arg(long)]
    poll_limit: Option<u64>,

    /// Simulated ready behaviour: always, never or after:N
    #[arg(long, value_parser = parse_ready)]
    ready: Option<ReadyModel>,

    /// Integer to transmit after the text
    #[arg(long, allow_hyphen_values = true)]
    int: Option<i32>,

    /// Radix for --int
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u32).range(2..=16))]
    radix: u32,

    /// Do not echo wire bytes to stdout
    #[arg(short, long)]
    quiet: bool,

    /// Write a JSON report to this path
    #[arg(long)]
    report: Option<PathBuf>,

    /// Strings to transmit, in order
    text: Vec<String>,
}

#[derive(Args, Debug)]
struct TestArgs {
    /// Path to the transmit script (YAML)
    #[arg(short, long)]
    script: PathBuf,

    /// Do not echo wire bytes to stdout
    #[arg(short, long)]
    quiet: bool,

    /// Write a JSON report to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

fn parse_ready(value: &str) -> Result<ReadyModel, String> {
    match value {
        "always" => Ok(ReadyModel::Always),
        "never" => Ok(ReadyModel::Never),
        other => other
            .strip_prefix("after:")
            .and_then(|n| n.parse().ok())
            .map(ReadyModel::AfterPolls)
            .ok_or_else(|| format!("expected always, never or after:N, got '{}'", other)),
    }
}

#[derive(Debug)]
enum Payload {
    Text(String),
    Int(i32, Radix),
}

#[derive(Serialize, Debug)]
struct AssertionResult {
    assertion: String,
    passed: bool,
}

#[derive(Serialize, Debug)]
struct Report {
    status: &'static str,
    outcome: Outcome,
    error: Option<String>,
    profile: DeviceProfile,
    wire_sha256: String,
    bytes_sent: u64,
    polls: u64,
    timeouts: u64,
    device: DeviceSnapshot,
    assertions: Vec<AssertionResult>,
}

struct Session {
    device: SimulatedUart,
    metrics: Arc<TxMetrics>,
    result: Result<(), TxError>,
}

impl Session {
    fn outcome(&self) -> Outcome {
        match self.result {
            Ok(()) => Outcome::Completed,
            Err(TxError::HardwareTimeout { .. }) => Outcome::HardwareTimeout,
        }
    }

    /// A transmit error fails the run unless an outcome assertion already judged it.
    fn passed(&self, assertions: &[AssertionResult], outcome_asserted: bool) -> bool {
        assertions.iter().all(|a| a.passed) && (self.result.is_ok() || outcome_asserted)
    }

    fn report(
        &self,
        profile: &DeviceProfile,
        assertions: Vec<AssertionResult>,
        outcome_asserted: bool,
    ) -> Report {
        let status = if self.passed(&assertions, outcome_asserted) {
            "pass"
        } else {
            "fail"
        };
        Report {
            status,
            outcome: self.outcome(),
            error: self.result.as_ref().err().map(|e| e.to_string()),
            profile: profile.clone(),
            wire_sha256: format!("{:x}", Sha256::digest(self.device.wire())),
            bytes_sent: self.metrics.get_bytes(),
            polls: self.metrics.get_polls(),
            timeouts: self.metrics.get_timeouts(),
            device: self.device.snapshot(),
            assertions,
        }
    }
}

/// Longest ready delay the CLI will wait out without a poll limit.
const MAX_UNBOUNDED_READY_DELAY: u64 = 1_000_000;

fn check_spin(profile: &DeviceProfile) -> Result<()> {
    if profile.poll_policy() != PollPolicy::Spin {
        return Ok(());
    }
    match profile.simulation.ready {
        ReadyModel::Never => bail!(
            "Device '{}' never becomes ready and has no poll limit; refusing to spin forever",
            profile.name
        ),
        ReadyModel::AfterPolls(n) if n > MAX_UNBOUNDED_READY_DELAY => bail!(
            "Device '{}' needs {} polls per byte and has no poll limit; set a poll limit above {} to wait that long",
            profile.name,
            n,
            MAX_UNBOUNDED_READY_DELAY
        ),
        _ => Ok(()),
    }
}

fn transmit(profile: &DeviceProfile, payloads: &[Payload]) -> Result<Session> {
    check_spin(profile)?;
    let policy = profile.poll_policy();

    let mut device = SimulatedUart::new(profile.simulation.ready);
    let metrics = Arc::new(TxMetrics::new());

    info!(
        "Transmitting to '{}' at {:#x} ({:?}, {:?})",
        profile.name, profile.base_address, policy, profile.termination
    );

    let result = {
        let mut tx = UartTx::new(&mut device, policy);
        tx.add_observer(metrics.clone());
        payloads.iter().try_for_each(|payload| match payload {
            Payload::Text(text) => tx.send_string(text, profile.termination),
            Payload::Int(value, radix) => tx.send_int(*value, *radix),
        })
    };

    match &result {
        Ok(()) => info!(
            "Sent {} bytes in {} polls ({:.0} B/s)",
            metrics.get_bytes(),
            metrics.get_polls(),
            metrics.get_bytes_per_sec()
        ),
        Err(e) => warn!("Transmit aborted: {}", e),
    }

    Ok(Session {
        device,
        metrics,
        result,
    })
}

fn echo_wire(wire: &[u8]) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(wire)?;
    stdout.flush()?;
    Ok(())
}

fn write_report(path: &Path, report: &Report) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create report directory {:?}", parent))?;
        }
    }
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write report to {:?}", path))?;
    info!("Report written to {:?}", path);
    Ok(())
}

fn evaluate(assertion: &ScriptAssertion, session: &Session) -> Result<AssertionResult> {
    let wire = session.device.wire();
    let result = match assertion {
        ScriptAssertion::WireContains(a) => AssertionResult {
            assertion: format!("wire_contains: {:?}", a.wire_contains),
            passed: String::from_utf8_lossy(wire).contains(&a.wire_contains),
        },
        ScriptAssertion::WireEqualsHex(a) => AssertionResult {
            assertion: format!("wire_equals_hex: {}", a.wire_equals_hex),
            passed: decode_hex(&a.wire_equals_hex)? == wire,
        },
        ScriptAssertion::ExpectedOutcome(a) => AssertionResult {
            assertion: format!("expected_outcome: {:?}", a.expected_outcome),
            passed: session.outcome() == a.expected_outcome,
        },
    };
    Ok(result)
}

fn run_send(args: SendArgs) -> Result<()> {
    let mut profile = match &args.profile {
        Some(path) => {
            info!("Loading device profile: {:?}", path);
            DeviceProfile::from_file(path)?
        }
        None => {
            info!("Using default device profile");
            DeviceProfile::default()
        }
    };
    if args.raw {
        profile.termination = Termination::Raw;
    }
    if args.crlf {
        profile.termination = Termination::CrLf;
    }
    if let Some(limit) = args.poll_limit {
        profile.poll_limit = Some(limit);
    }
    if let Some(ready) = args.ready {
        profile.simulation.ready = ready;
    }
    profile.validate()?;

    let mut payloads: Vec<Payload> = args.text.into_iter().map(Payload::Text).collect();
    if let Some(value) = args.int {
        let radix = Radix::new(args.radix).context("Unsupported radix")?;
        payloads.push(Payload::Int(value, radix));
    }
    if payloads.is_empty() {
        bail!("Nothing to send: pass TEXT arguments or --int");
    }

    let session = transmit(&profile, &payloads)?;
    if !args.quiet {
        echo_wire(session.device.wire())?;
    }
    if let Some(path) = &args.report {
        write_report(path, &session.report(&profile, Vec::new(), false))?;
    }

    session.result.context("Transmit failed")
}

fn run_test(args: TestArgs) -> Result<()> {
    info!("Loading transmit script: {:?}", args.script);
    let script = TransmitScript::from_file(&args.script)?;
    let script_dir = args.script.parent().unwrap_or_else(|| Path::new("."));
    let profile = script.resolve_profile(script_dir)?;

    let payloads: Vec<Payload> = script
        .inputs
        .lines
        .iter()
        .cloned()
        .map(Payload::Text)
        .collect();
    let session = transmit(&profile, &payloads)?;
    if !args.quiet {
        echo_wire(session.device.wire())?;
    }

    let results = script
        .assertions
        .iter()
        .map(|a| evaluate(a, &session))
        .collect::<Result<Vec<_>>>()?;
    for result in &results {
        if result.passed {
            info!("PASS {}", result.assertion);
        } else {
            warn!("FAIL {}", result.assertion);
        }
    }

    let expects_outcome = script
        .assertions
        .iter()
        .any(|a| matches!(a, ScriptAssertion::ExpectedOutcome(_)));
    let report = session.report(&profile, results, expects_outcome);
    if let Some(path) = &args.report {
        write_report(path, &report)?;
    }

    let failed = report.assertions.iter().filter(|a| !a.passed).count();
    if failed > 0 {
        bail!("{} of {} assertions failed", failed, report.assertions.len());
    }
    if !expects_outcome {
        session.result.context("Transmit failed")?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the wire bytes.
    if cli.trace {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Command::Send(args) => run_send(args),
        Command::Test(args) => run_test(args),
    }
}
