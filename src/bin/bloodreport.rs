//! CLI binary for bloodreport-analyzer.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `AnalysisConfig` and prints the result.

use anyhow::{Context, Result};
use bloodreport_analyzer::{
    analyze, extract_only, AnalysisConfig, AnalysisError, AnalysisProgressCallback,
    AnalysisResult, ProgressCallback, ProviderKind, Stage,
};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal spinner that logs one line per finished stage.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl AnalysisProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: Stage) {
        self.bar.set_message(format!("{stage}…"));
    }

    fn on_stage_complete(&self, stage: Stage, output_len: usize) {
        let unit = match stage {
            Stage::Load => "bytes",
            Stage::Extract => "chars",
            Stage::Analyze => "bytes of JSON",
        };
        self.bar.println(format!(
            "  {} {:<18} {}",
            green("✓"),
            stage.label(),
            dim(&format!("{output_len} {unit}"))
        ));
    }

    fn on_stage_error(&self, stage: Stage, error: &str) {
        let first_line = error.lines().next().unwrap_or(error);
        self.bar
            .println(format!("  {} {:<18} {}", red("✗"), stage.label(), red(first_line)));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Analyze a PDF report with the hosted chat-completion API
  bloodreport report.pdf

  # Scanned report (requires tesseract)
  bloodreport scan.jpg --text

  # Self-hosted model behind a JSON endpoint
  bloodreport --provider remote --endpoint http://localhost:11434/api/analyze \
      --option model=llama3.1 report.pdf

  # Any edgequake-llm provider
  bloodreport --provider gateway --gateway anthropic --model claude-sonnet-4-20250514 report.pdf

  # Only print the extracted text (no API key needed)
  bloodreport --extract-only report.pdf

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          Chat-completion credential (VITE_OPENAI_API_KEY also accepted)
  BLOODREPORT_PROVIDER    chat | remote | gateway
  BLOODREPORT_MODEL       Model ID (default gpt-4o-mini)
  BLOODREPORT_ENDPOINT    Remote inference endpoint
  EDGEQUAKE_LLM_PROVIDER  Gateway provider name
  TESSERACT_PATH          tesseract binary used for image reports
  RUST_LOG                Overrides -v / -q log filtering

  .env.local and .env in the working directory are read at startup.
"#;

/// Analyze blood-test reports (PDF or image) with an LLM.
#[derive(Parser, Debug)]
#[command(
    name = "bloodreport",
    version,
    about = "Analyze blood-test reports (PDF or image) with an LLM",
    long_about = "Extract the text of a blood-test report (PDF text layer or OCR for PNG/JPEG \
scans), ask an LLM to summarise it, and print a validated JSON analysis: key findings, \
supplement suggestions, overall health status and a summary.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local report path (.pdf, .png, .jpg) or HTTP/HTTPS URL.
    input: String,

    /// Write the JSON result to this file instead of stdout.
    #[arg(short, long, env = "BLOODREPORT_OUTPUT")]
    output: Option<PathBuf>,

    /// Provider kind: chat, remote, gateway.
    #[arg(long, env = "BLOODREPORT_PROVIDER", default_value = "chat")]
    provider: ProviderKind,

    /// Model ID (chat and gateway providers).
    #[arg(long, env = "BLOODREPORT_MODEL")]
    model: Option<String>,

    /// Remote inference endpoint URL (remote provider).
    #[arg(long, env = "BLOODREPORT_ENDPOINT")]
    endpoint: Option<String>,

    /// OpenAI-compatible chat-completion URL (chat provider).
    #[arg(long, env = "BLOODREPORT_CHAT_ENDPOINT")]
    chat_endpoint: Option<String>,

    /// edgequake-llm provider name (gateway provider).
    #[arg(long, env = "EDGEQUAKE_LLM_PROVIDER")]
    gateway: Option<String>,

    /// API key for the chat provider.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Extra request header NAME=VALUE (remote provider, repeatable).
    #[arg(long = "header", value_name = "NAME=VALUE")]
    headers: Vec<String>,

    /// Extra body field KEY=VALUE; VALUE is parsed as JSON when possible
    /// (remote provider, repeatable).
    #[arg(long = "option", value_name = "KEY=VALUE")]
    options: Vec<String>,

    /// OCR language for image reports.
    #[arg(long, env = "BLOODREPORT_OCR_LANG", default_value = "eng")]
    ocr_lang: String,

    /// tesseract binary to use for image reports.
    #[arg(long, env = "TESSERACT_PATH")]
    tesseract: Option<PathBuf>,

    /// HTTP download timeout in seconds for URL inputs.
    #[arg(long, env = "BLOODREPORT_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Abort the whole analysis after this many seconds.
    #[arg(long, env = "BLOODREPORT_TIMEOUT")]
    timeout: Option<u64>,

    /// Print the extracted text and stop (no provider call).
    #[arg(long)]
    extract_only: bool,

    /// Print a human-readable report instead of JSON.
    #[arg(long, conflicts_with = "output")]
    text: bool,

    /// Compact JSON instead of pretty-printed.
    #[arg(long)]
    compact: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "BLOODREPORT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs (includes the extracted text).
    #[arg(short, long, env = "BLOODREPORT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "BLOODREPORT_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Environment files must be loaded before clap reads `env =` fallbacks.
    dotenvy::from_filename(".env.local").ok();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.verbose;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress = show_progress.then(CliProgressCallback::new);
    let config = build_config(
        &cli,
        progress.clone().map(|p| p as Arc<dyn AnalysisProgressCallback>),
    )?;

    // ── Extract-only mode ────────────────────────────────────────────────
    if cli.extract_only {
        let text = with_timeout(cli.timeout, extract_only(&cli.input, &config)).await;
        if let Some(ref p) = progress {
            p.finish();
        }
        let text = text.context("Text extraction failed")?;
        let mut out = text.into_string();
        if !out.ends_with('\n') {
            out.push('\n');
        }
        io::stdout()
            .lock()
            .write_all(out.as_bytes())
            .context("Failed to write to stdout")?;
        return Ok(());
    }

    // ── Run analysis ─────────────────────────────────────────────────────
    let result = with_timeout(cli.timeout, analyze(&cli.input, &config)).await;
    if let Some(ref p) = progress {
        p.finish();
    }

    let result = match result {
        Ok(r) => r,
        Err(e)
            if e
                .downcast_ref::<AnalysisError>()
                .is_some_and(AnalysisError::is_rate_limited) =>
        {
            anyhow::bail!(
                "{e}\nYou have reached the provider's rate limit. Please wait a minute and try \
                 again, or upgrade your plan for higher limits."
            )
        }
        Err(e) => return Err(e.context("Analysis failed")),
    };

    if cli.text {
        print_report(&result);
        return Ok(());
    }

    let json = if cli.compact {
        serde_json::to_string(&result)
    } else {
        serde_json::to_string_pretty(&result)
    }
    .context("Failed to serialise result")?;

    match cli.output {
        Some(ref path) => {
            write_atomic(path, &json).await?;
            if !cli.quiet {
                eprintln!("{} {}", green("✔"), bold(&path.display().to_string()));
            }
        }
        None => println!("{json}"),
    }

    Ok(())
}

/// Bound `fut` by `secs`, if given.
async fn with_timeout<T>(
    secs: Option<u64>,
    fut: impl std::future::Future<Output = Result<T, AnalysisError>>,
) -> Result<T> {
    match secs {
        Some(s) => tokio::time::timeout(Duration::from_secs(s), fut)
            .await
            .map_err(|_| anyhow::anyhow!("Analysis timed out after {s}s"))?
            .map_err(anyhow::Error::from),
        None => fut.await.map_err(anyhow::Error::from),
    }
}

/// Map CLI args to `AnalysisConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<AnalysisConfig> {
    let mut builder = AnalysisConfig::builder()
        .provider_kind(cli.provider)
        .ocr_language(cli.ocr_lang.clone())
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref m) = cli.model {
        builder = builder.model(m.clone());
    }
    if let Some(ref url) = cli.endpoint {
        builder = builder.remote_endpoint(url.clone());
    }
    if let Some(ref url) = cli.chat_endpoint {
        builder = builder.chat_endpoint(url.clone());
    }
    if let Some(ref name) = cli.gateway {
        builder = builder.gateway_provider(name.clone());
    }
    if let Some(ref path) = cli.tesseract {
        builder = builder.tesseract_path(path.clone());
    }

    let api_key = cli
        .api_key
        .clone()
        .or_else(|| std::env::var("VITE_OPENAI_API_KEY").ok())
        .filter(|k| !k.trim().is_empty());
    if let Some(key) = api_key {
        builder = builder.api_key(key);
    }

    for raw in &cli.headers {
        let (name, value) = split_pair(raw, "--header")?;
        builder = builder.header(name, value);
    }
    for raw in &cli.options {
        let (key, value) = split_pair(raw, "--option")?;
        builder = builder.extra_option(key, parse_option_value(value));
    }

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn split_pair<'a>(raw: &'a str, flag: &str) -> Result<(&'a str, &'a str)> {
    match raw.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim(), v)),
        _ => anyhow::bail!("{flag} expects KEY=VALUE, got '{raw}'"),
    }
}

/// `42` → number, `true` → bool, `{"a":1}` → object, anything else → string.
fn parse_option_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Write to a temp file next to `path`, then rename.
async fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, contents)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

fn print_report(r: &AnalysisResult) {
    let status = match r.health_status.as_str() {
        "good" => green("good"),
        "attention" => yellow("attention"),
        _ => red("concern"),
    };
    println!("{}  {}", bold("Health status:"), status);
    if let Some(ref bt) = r.blood_type {
        println!("{}     {}", bold("Blood type:"), bt);
    }

    println!("\n{}", bold("Key findings"));
    for finding in &r.key_findings {
        println!("  • {finding}");
    }

    if !r.supplements.is_empty() {
        println!("\n{}", bold("Supplements"));
        for s in &r.supplements {
            let dosage = s
                .dosage
                .as_deref()
                .map(|d| format!(" — {d}"))
                .unwrap_or_default();
            println!("  • {} [{}]{}", bold(&s.name), s.priority, dosage);
            println!("    {}", dim(&s.reason));
        }
    }

    println!("\n{}\n{}", bold("Summary"), r.summary);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn option_values_parse_as_json_when_possible() {
        assert_eq!(parse_option_value("42"), json!(42));
        assert_eq!(parse_option_value("false"), json!(false));
        assert_eq!(parse_option_value("llama3.1"), json!("llama3.1"));
        assert_eq!(parse_option_value(r#"{"k":1}"#), json!({"k": 1}));
    }

    #[test]
    fn pairs_require_a_key() {
        assert_eq!(split_pair("a=b=c", "--option").unwrap(), ("a", "b=c"));
        assert!(split_pair("novalue", "--option").is_err());
        assert!(split_pair("=x", "--header").is_err());
    }

    #[test]
    fn cli_maps_onto_config() {
        let cli = Cli::parse_from([
            "bloodreport",
            "--provider",
            "remote",
            "--endpoint",
            "http://localhost:11434/api/analyze",
            "--header",
            "X-Trace=1",
            "--option",
            "stream=false",
            "report.pdf",
        ]);
        let config = build_config(&cli, None).unwrap();
        assert_eq!(config.provider_kind, ProviderKind::Remote);
        assert_eq!(
            config.remote_endpoint.as_deref(),
            Some("http://localhost:11434/api/analyze")
        );
        assert_eq!(config.headers.get("X-Trace").map(String::as_str), Some("1"));
        assert_eq!(config.extra_options.get("stream"), Some(&json!(false)));
    }
}
