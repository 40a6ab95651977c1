use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};

use anvil_lib::{
    ChannelProgressReporter, InstallRequest, ProvisionEvent, ProvisionerConfig,
    ProvisioningEngine, SoftwareType,
};

#[derive(Parser)]
#[command(name = "anvil", version, about = "Provision Minecraft dedicated servers")]
struct Cli {
    /// JSON settings file; missing keys keep their defaults
    #[arg(long, global = true, env = "ANVIL_CONFIG")]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Install or update a server directory
    Install {
        #[arg(value_parser = parse_software)]
        software: SoftwareType,
        /// Server directory (made absolute against the current directory)
        target: PathBuf,
        #[arg(long, default_value = "latest")]
        version: String,
        #[arg(long)]
        build: Option<String>,
        /// URL, local archive or Modrinth project slug
        #[arg(long)]
        modpack_source: Option<String>,
        #[arg(long)]
        mc_version: Option<String>,
        /// Java executable for a major version, e.g. `--java 21=/opt/jdk21/bin/java`
        #[arg(long, value_parser = parse_java)]
        java: Vec<(String, PathBuf)>,
    },
    /// Print the download a version resolves to without installing it
    Resolve {
        #[arg(value_parser = parse_software)]
        software: SoftwareType,
        #[arg(long, default_value = "latest")]
        version: String,
        #[arg(long)]
        build: Option<String>,
    },
    /// List versions known upstream
    Versions {
        #[command(subcommand)]
        feed: VersionFeed,
    },
}

#[derive(Subcommand)]
enum VersionFeed {
    /// Bedrock dedicated server builds, newest first
    Bedrock,
}

fn parse_software(value: &str) -> Result<SoftwareType, String> {
    SoftwareType::parse(value).ok_or_else(|| format!("unknown server software {:?}", value))
}

fn parse_java(value: &str) -> Result<(String, PathBuf), String> {
    let (label, path) = value
        .split_once('=')
        .ok_or_else(|| format!("expected LABEL=PATH, got {:?}", value))?;
    Ok((label.to_string(), PathBuf::from(path)))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if cli.verbose { "debug" } else { "info" }),
    )
    .init();

    let mut config = match &cli.config {
        Some(path) => ProvisionerConfig::load(path)?,
        None => ProvisionerConfig::default(),
    };

    match cli.command {
        Command::Install {
            software,
            target,
            version,
            build,
            modpack_source,
            mc_version,
            java,
        } => {
            config.java_paths.extend(java);
            let engine = ProvisioningEngine::new(config)?;
            let target = std::path::absolute(&target)
                .with_context(|| format!("cannot resolve {:?}", target))?;

            let mut request = InstallRequest::new(software, target, version);
            request.build = build;
            request.modpack_source = modpack_source;
            request.mc_version = mc_version;
            install(&engine, request).await
        }
        Command::Resolve {
            software,
            version,
            build,
        } => {
            let engine = ProvisioningEngine::new(config)?;
            let artifact = engine
                .resolver()
                .resolve(software, &version, build.as_deref())
                .await?;
            println!("{} {}", software, artifact.version);
            if let Some(build) = &artifact.build {
                println!("build   {}", build);
            }
            println!("file    {}", artifact.file_name);
            println!("url     {}", artifact.url);
            Ok(())
        }
        Command::Versions {
            feed: VersionFeed::Bedrock,
        } => {
            let engine = ProvisioningEngine::new(config)?;
            let feed = engine.bedrock_versions().await?;
            log::debug!("Bedrock feed fetched at {}", feed.fetched_at);
            for version in &feed.versions {
                println!("{}", version);
            }
            Ok(())
        }
    }
}

async fn install(engine: &ProvisioningEngine, request: InstallRequest) -> Result<()> {
    let (reporter, mut events) = ChannelProgressReporter::new();
    let printer = tokio::spawn(async move {
        let mut last_percent = None;
        while let Some(event) = events.recv().await {
            match event {
                ProvisionEvent::Stage { stage } => eprintln!("==> {}", stage.describe()),
                ProvisionEvent::Status { message } => log::info!("{}", message),
                ProvisionEvent::Progress { percent, .. } => {
                    if let Some(p) = percent {
                        if last_percent != Some(p) && p % 10 == 0 {
                            eprintln!("    {}%", p);
                        }
                    }
                    last_percent = percent;
                }
                ProvisionEvent::InstallerOutput { line } => eprintln!("    | {}", line),
                ProvisionEvent::Done { .. } => {}
            }
        }
    });

    let result = engine.install(request, Arc::new(reporter)).await;
    if let Err(e) = printer.await {
        log::warn!("Progress printer stopped: {}", e);
    }

    let entrypoint = result.map_err(|failure| anyhow!(failure))?;
    println!("{}", entrypoint);
    Ok(())
}
