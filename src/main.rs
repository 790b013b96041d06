use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Scaffolding for a crawl engine project.
#[derive(Parser)]
#[command(name = "hoopa", version, about = "Asynchronous crawl engine scaffolding")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a new project skeleton: a spider (`-s`) or a full project (`-p`).
    Create {
        /// Generate a single spider module under `./spiders/<name>.rs`.
        #[arg(short = 's', long, value_name = "NAME")]
        spider: Option<String>,

        /// Generate a full project skeleton (Cargo.toml, src/main.rs, spiders/) at this path.
        #[arg(short = 'p', long, value_name = "PATH")]
        project: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Create { spider: Some(name), project: None } => create_spider(&name),
        Command::Create { spider: None, project: Some(path) } => create_project(&path),
        Command::Create { .. } => {
            anyhow::bail!("pass exactly one of -s <name> or -p <path>");
        }
    }
}

fn create_spider(name: &str) -> anyhow::Result<()> {
    let dir = PathBuf::from("spiders");
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(format!("{name}.rs"));
    if path.exists() {
        anyhow::bail!("{} already exists", path.display());
    }

    let struct_name = to_pascal_case(name);
    std::fs::write(&path, spider_template(name, &struct_name))?;
    tracing::info!(path = %path.display(), "created spider");
    Ok(())
}

fn create_project(path: &std::path::Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(path.join("src"))?;
    std::fs::create_dir_all(path.join("spiders"))?;

    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("crawler")
        .to_string();

    std::fs::write(path.join("Cargo.toml"), project_manifest(&name))?;
    std::fs::write(path.join("src/main.rs"), PROJECT_MAIN_TEMPLATE)?;
    tracing::info!(path = %path.display(), "created project");
    Ok(())
}

fn to_pascal_case(name: &str) -> String {
    name.split(['_', '-'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

fn spider_template(name: &str, struct_name: &str) -> String {
    format!(
        r#"use async_trait::async_trait;
use hoopa_rs::error::Result;
use hoopa_rs::item::Item;
use hoopa_rs::middleware::ParseOutput;
use hoopa_rs::request::Request;
use hoopa_rs::response::Response;
use hoopa_rs::spider::Spider;

pub struct {struct_name};

#[async_trait]
impl Spider for {struct_name} {{
    fn name(&self) -> &str {{
        "{name}"
    }}

    async fn start_requests(&self) -> Result<Vec<Request>> {{
        Ok(vec![Request::builder("https://example.com")?.build()])
    }}

    async fn dispatch(&self, callback: &str, _request: &Request, response: &Response) -> Result<Vec<ParseOutput>> {{
        match callback {{
            "parse" => Ok(vec![ParseOutput::Item(Item::new("page").with("status", response.status))]),
            other => Err(hoopa_rs::spider::unknown_callback(other)),
        }}
    }}
}}
"#
    )
}

fn project_manifest(name: &str) -> String {
    format!(
        r#"[package]
name = "{name}"
version = "0.1.0"
edition = "2021"

[dependencies]
hoopa-rs = {{ path = "." }}
async-trait = "0.1"
tokio = {{ version = "1", features = ["full"] }}
anyhow = "1.0"
"#
    )
}

const PROJECT_MAIN_TEMPLATE: &str = r#"mod spiders;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // wire a spider, downloader, and scheduler here, then call Engine::run
    Ok(())
}
"#;
