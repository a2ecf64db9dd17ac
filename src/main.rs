//! dlp-conductor - yt-dlp, provisioned and supervised
//!
//! Resolves the downloader and its helpers, then runs one download with live
//! progress and Ctrl-C cancellation.

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, ValueEnum};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use dlp_conductor::core::job::DownloadJob;
use dlp_conductor::core::process::OutputSink;
use dlp_conductor::core::progress::ProgressTick;
use dlp_conductor::core::resolver::DependencyResolver;
use dlp_conductor::error::DlpError;
use dlp_conductor::storage::config;
use dlp_conductor::types::{CookieSource, ErrorSignal, JobState, ToolKind, ToolPaths};
use dlp_conductor::utils::media::ext;
use dlp_conductor::utils::paths::{get_config_path, get_tools_dir};

/// yt-dlp, provisioned and supervised.
#[derive(Parser, Debug)]
#[command(name = "dlp-conductor")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Video URL
    url: Option<String>,

    /// Output file (defaults to "<download dir>/<title> [<id>].<ext>")
    #[arg(short, long)]
    output: Option<String>,

    /// Format id to download
    #[arg(short, long)]
    format: Option<String>,

    /// Extract audio only
    #[arg(long)]
    audio: bool,

    /// Download subtitles for this language
    #[arg(long, value_name = "LANG")]
    subs: Option<String>,

    /// Embed subtitles instead of writing .srt files
    #[arg(long)]
    embed_subs: bool,

    /// Save the thumbnail too
    #[arg(long)]
    thumbnail: bool,

    /// Read cookies from a browser
    #[arg(long, value_enum)]
    cookies: Option<Browser>,

    /// Read cookies from a Netscape cookie file
    #[arg(long)]
    cookie_file: Option<PathBuf>,

    /// Proxy URL
    #[arg(long)]
    proxy: Option<String>,

    /// Maximum download rate, e.g. 2M
    #[arg(long)]
    limit_rate: Option<String>,

    /// Hand transfers to aria2c when available
    #[arg(long)]
    aria2: bool,

    /// The URL is a live stream (keep partial output on cancel)
    #[arg(long)]
    live: bool,

    /// Print metadata as JSON instead of downloading
    #[arg(long)]
    info: bool,

    /// Resolve tools, print where they are, and exit
    #[arg(long)]
    resolve_only: bool,

    /// Write the current configuration (defaults filled in) to the config file and exit
    #[arg(long)]
    write_config: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Errors only
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Browser {
    Chrome,
    ChromeBeta,
    Chromium,
    Edge,
    Firefox,
    Opera,
}

impl From<Browser> for CookieSource {
    fn from(browser: Browser) -> Self {
        match browser {
            Browser::Chrome => CookieSource::Chrome,
            Browser::ChromeBeta => CookieSource::ChromeBeta,
            Browser::Chromium => CookieSource::Chromium,
            Browser::Edge => CookieSource::Edge,
            Browser::Firefox => CookieSource::Firefox,
            Browser::Opera => CookieSource::Opera,
        }
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

/// Progress bar fed from progress-template lines; everything else is printed above it
struct TerminalSink {
    bar: ProgressBar,
}

impl OutputSink for TerminalSink {
    fn on_stdout(&mut self, line: &str) {
        match ProgressTick::parse(line) {
            Some(tick) => {
                if let Some(percent) = tick.percent {
                    self.bar.set_position(percent.round() as u64);
                }
                self.bar.set_message(format!("ETA {}", tick.eta));
            }
            None => self.bar.println(line),
        }
    }

    fn on_stderr(&mut self, line: &str) {
        self.bar.println(line.dimmed().to_string());
    }
}

fn print_tools(tools: &ToolPaths) {
    for kind in [
        ToolKind::Downloader,
        ToolKind::Transcoder,
        ToolKind::AcceleratedDownloader,
        ToolKind::ScriptRuntime,
    ] {
        match tools.get(kind) {
            Some(tool) => println!(
                "{} {:<24} {}",
                "✓".green(),
                kind.label(),
                tool.path.display()
            ),
            None => println!("{} {:<24} {}", "✗".red(), kind.label(), "not found".dimmed()),
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "Error:".red(), e);
        let code = e
            .downcast_ref::<DlpError>()
            .map(|err| err.code().exit_code())
            .unwrap_or(1);
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let cfg = config::load_config().await?;

    if cli.write_config {
        config::save_config(&cfg).await.context("Failed to save config")?;
        println!("{} Wrote {}", "✓".green(), get_config_path());
        return Ok(());
    }
    let tools_dir = get_tools_dir(cfg.tools_dir.as_deref());

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
    spinner.set_message("Checking tools...");
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));

    let tools = DependencyResolver::new(tools_dir, cfg.flavor)
        .resolve_all()
        .await;

    spinner.finish_and_clear();

    if cli.resolve_only {
        print_tools(&tools);
        return Ok(());
    }

    let Some(url) = cli.url.as_deref() else {
        bail!("No URL given. Run with --help for usage.");
    };

    let target = cli.output.clone().unwrap_or_else(|| {
        format!("{}/%(title)s [%(id)s].%(ext)s", cfg.download_dir)
    });

    let mut job = DownloadJob::new(url, &tools);

    if cli.info {
        job.get_info();
    } else if cli.audio {
        job.download_audio(cli.format.as_deref().unwrap_or("bestaudio"), &target);
    } else if let Some(format) = cli.format.as_deref() {
        job.download_video(format, &ext(&target), &target);
    } else {
        job.output(&target);
    }

    let proxy = cli.proxy.as_deref().or(cfg.proxy.as_deref()).unwrap_or_default();
    let limit_rate = cli
        .limit_rate
        .as_deref()
        .or(cfg.limit_rate.as_deref())
        .unwrap_or_default();
    let cookies = match (&cli.cookie_file, cli.cookies) {
        (Some(file), _) => Some(CookieSource::File(file.clone())),
        (None, Some(browser)) => Some(browser.into()),
        (None, None) => cfg.cookies.clone(),
    };

    job.proxy(proxy, true)
        .limit_rate(limit_rate)
        .subtitle(
            cli.subs.as_deref().unwrap_or_default(),
            &target,
            cli.embed_subs || cfg.embed_subs,
        )
        .thumbnail(cli.thumbnail, &target, cfg.embed_thumbnail)
        .use_accelerated_downloader(cli.aria2 || cfg.use_aria2)
        .set_live(cli.live);
    if let Some(source) = &cookies {
        job.cookie(source, true);
    }

    let canceller = job.canceller();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            canceller.cancel();
        }
    });

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos:>3}% {msg}")?.progress_chars("█▓░"),
    );
    let mut sink = TerminalSink { bar };

    let status = job.exec(&mut sink).await?;
    sink.bar.finish_and_clear();

    let Some(status) = status else {
        return Err(DlpError::MissingDependency(format!(
            "{} is not available. Run with --resolve-only to see what was found.",
            tools.flavor().binary_stem()
        ))
        .into());
    };

    job.when_signaled(ErrorSignal::SignInRequired, || {
        eprintln!(
            "{} This video needs a signed-in session. Try --cookies <browser> or --cookie-file.",
            "Hint:".yellow()
        );
    })
    .when_signaled(ErrorSignal::Unsupported, || {
        eprintln!("{} No extractor supports this URL.", "Hint:".yellow());
    });

    match job.state() {
        JobState::Cancelled => println!("{}", "Download cancelled.".yellow()),
        _ if status.success() => {
            println!("{} Download complete!", "✓".green());
            for file in job.files().iter().filter(|f| std::path::Path::new(f).exists()) {
                println!("  {}", file);
            }
        }
        _ => bail!("yt-dlp exited with {}", status),
    }

    Ok(())
}
