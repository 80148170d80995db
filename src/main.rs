//! imgcdn 命令行入口

use std::fs;
use std::io::{self, Read, Write};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use encoding_rs::Encoding;

use imgcdn::builders::RecoveryScript;
use imgcdn::config::ConfigManager;
use imgcdn::env::{self, EnvVar};
use imgcdn::parsers::html::is_full_document;
use imgcdn::{CdnRewriter, HostSignals, ImgCdnError, ImgCdnResult, MarkupStrategy, RenderHooks, Settings};

#[derive(Parser)]
#[command(
    name = "imgcdn",
    about = "Rewrite image URLs in rendered HTML to a CDN with client-side origin fallback",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rewrite image tags in an HTML file (or stdin) as a single render pass.
    Rewrite {
        /// Input file, `-` or omitted for stdin.
        input: Option<String>,

        /// Site home URL used to resolve relative image references.
        #[arg(long)]
        site_origin: Option<String>,

        /// Output file (stdout when omitted).
        #[arg(short, long)]
        output: Option<String>,

        /// Settings file (TOML or JSON).
        #[arg(short, long)]
        config: Option<String>,

        /// Override the CDN domain.
        #[arg(long)]
        cdn_domain: Option<String>,

        /// Override the worker domain.
        #[arg(long)]
        worker_domain: Option<String>,

        /// Input/output character encoding label.
        #[arg(short, long, default_value = "utf-8")]
        encoding: String,

        /// Use the pattern-based markup path instead of the tag processor.
        #[arg(long)]
        pattern: bool,

        /// Do not append the recovery script to full documents.
        #[arg(long)]
        no_script: bool,
    },

    /// Rewrite a single URL.
    Url {
        url: String,

        #[arg(long)]
        site_origin: Option<String>,

        #[arg(short, long)]
        config: Option<String>,

        #[arg(long)]
        cdn_domain: Option<String>,

        #[arg(long)]
        worker_domain: Option<String>,
    },

    /// Print the lazy-image recovery script.
    Script {
        /// Include console logging.
        #[arg(long)]
        debug: bool,

        /// Print the CSP `script-src` hash instead of the script.
        #[arg(long)]
        csp: bool,
    },

    /// Print environment variable documentation.
    EnvDocs,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = env::core::LogLevel::get().unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> ImgCdnResult<()> {
    match command {
        Commands::Rewrite {
            input,
            site_origin,
            output,
            config,
            cdn_domain,
            worker_domain,
            encoding,
            pattern,
            no_script,
        } => {
            let mut settings = load_settings(config.as_deref(), cdn_domain, worker_domain)?;
            if pattern {
                settings.markup_parser = MarkupStrategy::Pattern;
            }
            let rewriter = CdnRewriter::new(settings, resolve_site_origin(site_origin)?);

            let encoding = Encoding::for_label(encoding.as_bytes())
                .ok_or_else(|| ImgCdnError::Config(format!("未知的字符编码: {}", encoding)))?;
            let data = read_input(input.as_deref())?;
            let (html, _, _) = encoding.decode(&data);

            let pass = rewriter.begin_pass(HostSignals::frontend());
            let mut rewritten = pass.on_markup_fragment(&html);

            if !no_script && is_full_document(&html) {
                if let Some(footer) = pass.on_page_complete() {
                    rewritten = insert_before_body_end(&rewritten, &footer);
                }
            }

            let (bytes, _, _) = encoding.encode(&rewritten);
            write_output(output.as_deref(), &bytes)
        }
        Commands::Url {
            url,
            site_origin,
            config,
            cdn_domain,
            worker_domain,
        } => {
            let settings = load_settings(config.as_deref(), cdn_domain, worker_domain)?;
            let rewriter = CdnRewriter::new(settings, resolve_site_origin(site_origin)?);
            let pass = rewriter.begin_pass(HostSignals::frontend());

            println!("{}", pass.on_single_url(&url, None));
            Ok(())
        }
        Commands::Script { debug, csp } => {
            let script = RecoveryScript::build(debug);
            if csp {
                println!("{}", script.csp_hash());
            } else {
                println!("{}", script.source());
            }
            Ok(())
        }
        Commands::EnvDocs => {
            print!("{}", env::generate_env_docs());
            Ok(())
        }
    }
}

/// 加载配置并应用命令行覆盖；命令行调用即视为启用
fn load_settings(
    config: Option<&str>,
    cdn_domain: Option<String>,
    worker_domain: Option<String>,
) -> ImgCdnResult<Settings> {
    let manager = match config {
        Some(path) => ConfigManager::from_path(path)?,
        None => ConfigManager::new()?,
    };

    manager
        .with_overrides(|settings| {
            if let Some(domain) = cdn_domain {
                settings.cdn_domain = domain;
            }
            if let Some(domain) = worker_domain {
                settings.worker_domain = domain;
            }
            settings.enabled = true;
        })
        .validated()
}

fn resolve_site_origin(site_origin: Option<String>) -> ImgCdnResult<String> {
    match site_origin {
        Some(origin) => Ok(env::core::SiteOrigin::parse(&origin)?),
        None => Ok(env::core::SiteOrigin::get()?),
    }
}

fn read_input(input: Option<&str>) -> ImgCdnResult<Vec<u8>> {
    match input {
        None | Some("-") => {
            let mut data = Vec::new();
            io::stdin().read_to_end(&mut data)?;
            Ok(data)
        }
        Some(path) => Ok(fs::read(path)?),
    }
}

fn write_output(output: Option<&str>, bytes: &[u8]) -> ImgCdnResult<()> {
    match output {
        Some(path) => fs::write(path, bytes)?,
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(bytes)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

/// 在最后一个 `</body>` 之前插入，没有时追加到末尾
fn insert_before_body_end(html: &str, footer: &str) -> String {
    match html.to_ascii_lowercase().rfind("</body>") {
        Some(index) => format!("{}{}{}", &html[..index], footer, &html[index..]),
        None => format!("{}{}", html, footer),
    }
}
