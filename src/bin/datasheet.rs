//! CLI binary for edgequake-datasheet.
//!
//! A thin shim over the library crate: `serve` runs the HTTP API, `convert`
//! and `extract` run one request locally and print the result.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_datasheet::{
    api::{self, ApiSizeLimits, ApiState, ServerConfig},
    pipeline::input,
    resolve_provider, AliasMap, AliasTarget, ConversionConfig, ExtractionConfig, FieldSchema,
    LanguageModel, PageProgress, PageSelection, PdfiumRasterizer, Pipeline,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── Progress bar ─────────────────────────────────────────────────────────────

/// Renders [`PageProgress`] events as an indicatif bar with one log line
/// per finished page. Pages may finish out of order.
struct CliProgress {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_prefix("Preparing");
        bar.set_message("Rendering pages…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed_secs(&self, page_num: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut times| times.remove(&page_num))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl PageProgress for CliProgress {
    fn on_conversion_start(&self, total_pages: usize) {
        self.bar.set_length(total_pages as u64);
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} pages  \
                 {elapsed_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  "),
        );
        self.bar.set_prefix("Reading tables");
        self.bar.reset_eta();
    }

    fn on_page_start(&self, page_num: usize, _total_pages: usize) {
        if let Ok(mut times) = self.start_times.lock() {
            times.insert(page_num, Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total_pages: usize, markdown_len: usize) {
        let secs = self.elapsed_secs(page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            page_num,
            total_pages,
            dim(&format!("{markdown_len:>5} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let secs = self.elapsed_secs(page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total_pages,
            red(error.lines().next().unwrap_or(error)),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_conversion_complete(&self, total_pages: usize, tables_found: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} tables found on {}/{} pages",
            green("✔"),
            bold(&tables_found.to_string()),
            total_pages
        );
    }
}

// ── Arguments ────────────────────────────────────────────────────────────────

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the HTTP API
  datasheet serve --host 0.0.0.0 --port 8080

  # Tables from pages 2-4 of a scanned datasheet
  datasheet convert pump.pdf --start 2 --end 4 -o pump.md

  # Map the tables onto the default pump schema
  datasheet extract pump.md

  # Custom fields, renaming a key the model tends to use
  datasheet extract pump.md --fields "flow,head" --alias "capacity=flow"

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  EDGEQUAKE_LLM_PROVIDER  Provider (openai, anthropic, gemini, ollama, ...)
  EDGEQUAKE_MODEL         Model ID (default: gpt-4.1-nano)
  PDFIUM_LIB_PATH         Path to libpdfium; otherwise the system library
  DATASHEET_CORS_ORIGINS  Comma-separated allowed origins for `serve`
  RUST_LOG                Log filter, overrides --verbose / --quiet
"#;

/// Extract tables and engineering fields from scanned datasheets.
#[derive(Parser, Debug)]
#[command(
    name = "datasheet",
    version,
    about = "Extract tables and engineering fields from scanned datasheets with Vision LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, global = true, env = "EDGEQUAKE_LLM_PROVIDER")]
    provider: Option<String>,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1).
    #[arg(long, global = true, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Per-call LLM timeout in seconds.
    #[arg(long, global = true, env = "DATASHEET_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "DATASHEET_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "DATASHEET_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the Convert / Extract HTTP API.
    Serve(ServeArgs),
    /// Convert an image or PDF into table Markdown.
    Convert(ConvertArgs),
    /// Map table Markdown onto named fields.
    Extract(ExtractArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to bind.
    #[arg(long, env = "DATASHEET_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to bind.
    #[arg(long, env = "DATASHEET_PORT", default_value_t = 8080)]
    port: u16,

    /// Request body limit in megabytes.
    #[arg(long, env = "DATASHEET_MAX_BODY_MB", default_value_t = 50)]
    max_body_mb: usize,

    #[command(flatten)]
    pages: PageArgs,
}

/// Page and rendering defaults. For `serve` these are the server defaults
/// each request may narrow.
#[derive(Args, Debug, Clone)]
struct PageArgs {
    /// Include spec, e.g. "1,3,5-7".
    #[arg(long, env = "DATASHEET_PAGES")]
    pages: Option<String>,

    /// Exclude spec, applied last.
    #[arg(long, env = "DATASHEET_EXCLUDE")]
    exclude: Option<String>,

    /// First page (1-based).
    #[arg(long, env = "DATASHEET_START")]
    start: Option<usize>,

    /// Last page (inclusive).
    #[arg(long, env = "DATASHEET_END")]
    end: Option<usize>,

    /// Maximum pages counted from --start (1-50).
    #[arg(long, env = "DATASHEET_MAX_PAGES")]
    max_pages: Option<usize>,

    /// Render scale (1-4).
    #[arg(long, env = "DATASHEET_SCALE", default_value_t = 2.0)]
    scale: f32,

    /// Concurrent vision calls (1-5).
    #[arg(short, long, env = "DATASHEET_CONCURRENCY", default_value_t = 3)]
    concurrency: usize,

    /// Text file replacing the built-in table-extraction instruction.
    #[arg(long, env = "DATASHEET_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// Local image/PDF path, HTTP(S) URL, or data URL.
    input: String,

    /// Write Markdown to this file instead of stdout.
    #[arg(short, long, env = "DATASHEET_OUTPUT")]
    output: Option<PathBuf>,

    /// Print `{ markdown, usage }` as JSON.
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    pages: PageArgs,
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// Markdown file, or "-" for stdin.
    input: String,

    /// Comma-separated field names. Default: the pump schema.
    #[arg(long, value_delimiter = ',')]
    fields: Vec<String>,

    /// Rename a key in the model's answer: old=new. An empty new name drops it.
    #[arg(long = "alias", value_name = "OLD=NEW")]
    aliases: Vec<String>,

    /// Print `{ fields, order, usage }` as JSON.
    #[arg(long)]
    json: bool,
}

// ── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
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

    let model = load_model(&cli);
    let pipeline = Pipeline::new(model, Arc::new(PdfiumRasterizer::from_env()));

    match cli.command {
        Command::Serve(ref args) => run_serve(&cli, args, pipeline).await,
        Command::Convert(ref args) => run_convert(&cli, args, pipeline).await,
        Command::Extract(ref args) => run_extract(&cli, args, pipeline).await,
    }
}

/// Build the model client once. A missing provider is not fatal here:
/// `extract` still runs on the heuristic and `serve` answers 500 on convert.
fn load_model(cli: &Cli) -> Option<Arc<dyn LanguageModel>> {
    match resolve_provider(cli.provider.as_deref(), cli.model.as_deref()) {
        Ok(model) => Some(Arc::new(model)),
        Err(e) => {
            warn!("No LLM provider available: {}", e);
            None
        }
    }
}

fn conversion_config(cli: &Cli, args: &PageArgs) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .scale(args.scale)
        .concurrency(args.concurrency)
        .api_timeout_secs(cli.api_timeout)
        .pages(PageSelection {
            start: args.start.unwrap_or(1).max(1),
            end: args.end,
            include: args.pages.clone().unwrap_or_default(),
            exclude: args.exclude.clone().unwrap_or_default(),
        });
    if let Some(n) = args.max_pages {
        builder = builder.max_pages(n);
    }
    if let Some(ref path) = args.system_prompt {
        let prompt = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read system prompt from {}", path.display()))?;
        builder = builder.system_prompt(prompt);
    }
    builder.build().context("Invalid configuration")
}

fn extraction_config(cli: &Cli) -> ExtractionConfig {
    ExtractionConfig {
        api_timeout_secs: cli.api_timeout.max(1),
        ..ExtractionConfig::default()
    }
}

async fn run_serve(cli: &Cli, args: &ServeArgs, pipeline: Pipeline) -> Result<()> {
    if let Err(e) = PdfiumRasterizer::from_env().check_library() {
        warn!("PDF conversion will fail until pdfium is available: {}", e);
    }
    let conversion = conversion_config(cli, &args.pages)?;
    let state = ApiState::new(pipeline, conversion, extraction_config(cli));
    let config = ServerConfig {
        host: args.host.clone(),
        port: args.port,
        limits: ApiSizeLimits::from_mb(args.max_body_mb),
    };
    api::serve(config, state).await.context("Server failed")
}

/// The bar writes to stderr; `--json` and `--quiet` keep the terminal clean.
fn show_progress(cli: &Cli, args: &ConvertArgs) -> bool {
    !cli.quiet && !args.json
}

async fn run_convert(cli: &Cli, args: &ConvertArgs, pipeline: Pipeline) -> Result<()> {
    let config = conversion_config(cli, &args.pages)?;
    let pipeline = if show_progress(cli, args) {
        pipeline.with_progress(CliProgress::new())
    } else {
        pipeline
    };

    let document = input::load_source(&args.input, cli.api_timeout)
        .await
        .with_context(|| format!("Failed to load {}", args.input))?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let output = pipeline
        .convert(document, &config, &cancel)
        .await
        .context("Conversion failed")?;

    if args.json {
        let body = api::ConvertResponse {
            markdown: output.markdown,
            usage: output.usage,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&body).context("Failed to serialise output")?
        );
        return Ok(());
    }

    if let Some(ref path) = args.output {
        tokio::fs::write(path, output.markdown.as_bytes())
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(output.markdown.as_bytes())
            .context("Failed to write to stdout")?;
        if !output.markdown.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }

    if !cli.quiet {
        eprintln!(
            "   {} pages  {} tokens in / {} tokens out  {}ms{}",
            output.pages.len(),
            dim(&output.usage.prompt_tokens.to_string()),
            dim(&output.usage.completion_tokens.to_string()),
            output.duration_ms,
            args.output
                .as_ref()
                .map(|p| format!("  →  {}", bold(&p.display().to_string())))
                .unwrap_or_default(),
        );
    }
    Ok(())
}

async fn run_extract(cli: &Cli, args: &ExtractArgs, pipeline: Pipeline) -> Result<()> {
    let markdown = if args.input == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        buf
    } else {
        tokio::fs::read_to_string(&args.input)
            .await
            .with_context(|| format!("Failed to read {}", args.input))?
    };

    let schema = FieldSchema::for_fields(&args.fields);
    let aliases = parse_aliases(&args.aliases)?;
    let cancel = CancellationToken::new();

    let result = pipeline
        .extract(&markdown, &schema, &aliases, &extraction_config(cli), &cancel)
        .await
        .context("Extraction failed")?;

    if args.json {
        let body = api::ExtractResponse {
            fields: result.fields,
            order: result.order,
            usage: result.usage,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&body).context("Failed to serialise output")?
        );
        return Ok(());
    }

    let width = result.order.iter().map(String::len).max().unwrap_or(0);
    for (name, value) in result.ordered() {
        let shown = if value.is_empty() { dim("-") } else { value.to_string() };
        println!("{name:<width$}  {shown}");
    }
    if !cli.quiet {
        eprintln!(
            "   source: {:?}  {} tokens",
            result.source, result.usage.total_tokens
        );
    }
    Ok(())
}

/// Parse `--alias old=new` pairs. `old=` drops the key.
fn parse_aliases(pairs: &[String]) -> Result<AliasMap> {
    let mut aliases = AliasMap::new();
    for pair in pairs {
        let (old, new) = pair
            .split_once('=')
            .with_context(|| format!("Invalid alias '{pair}', expected OLD=NEW"))?;
        let old = old.trim();
        if old.is_empty() {
            anyhow::bail!("Invalid alias '{pair}': empty key");
        }
        let target = match new.trim() {
            "" => AliasTarget::Deleted,
            name => AliasTarget::Rename(name.to_string()),
        };
        aliases.insert(old.to_string(), target);
    }
    Ok(aliases)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_aliases_handles_rename_and_delete() {
        let aliases =
            parse_aliases(&["capacity=flow".to_string(), "notes=".to_string()]).unwrap();
        assert_eq!(
            aliases.get("capacity"),
            Some(&AliasTarget::Rename("flow".to_string()))
        );
        assert_eq!(aliases.get("notes"), Some(&AliasTarget::Deleted));
    }

    #[test]
    fn parse_aliases_rejects_missing_separator() {
        assert!(parse_aliases(&["capacity".to_string()]).is_err());
        assert!(parse_aliases(&["=flow".to_string()]).is_err());
    }

    #[test]
    fn cli_parses_convert_subcommand() {
        let cli = Cli::try_parse_from([
            "datasheet", "convert", "pump.pdf", "--start", "2", "--exclude", "3", "--json",
        ])
        .unwrap();
        match cli.command {
            Command::Convert(args) => {
                assert_eq!(args.input, "pump.pdf");
                assert_eq!(args.pages.start, Some(2));
                assert_eq!(args.pages.exclude.as_deref(), Some("3"));
                assert!(args.json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn json_output_disables_progress() {
        let progress = |argv: &[&str]| {
            let cli = Cli::try_parse_from(argv).unwrap();
            match &cli.command {
                Command::Convert(args) => show_progress(&cli, args),
                other => panic!("unexpected command: {other:?}"),
            }
        };
        assert!(progress(&["datasheet", "convert", "pump.pdf"]));
        assert!(!progress(&["datasheet", "convert", "pump.pdf", "--json"]));
        assert!(!progress(&["datasheet", "--quiet", "convert", "pump.pdf"]));
    }
}
