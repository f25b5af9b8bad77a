use anyhow::{Context, bail};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use summary_cluster::config::{MasterConfig, WorkerConfig, parse_port_range};
use summary_cluster::orchestrator::master::MasterNode;
use summary_cluster::summarizer::TextRankSummarizer;
use summary_cluster::worker::node::SlaveNode;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Role {
    Master,
    Slave,
}

#[derive(Debug)]
struct Args {
    role: Role,
    bind: Option<IpAddr>,
    master: Option<SocketAddr>,
    ports: Option<String>,
    file: Option<PathBuf>,
    ratio: f32,
    wait: Duration,
    single_thread: bool,
}

fn usage(program: &str) {
    eprintln!(
        "Usage: {program} --role <master|slave> [--bind <ip>] [--master <ip:port>] \
         [--ports <start-end>] [--file <path>] [--ratio <0..1>] [--wait <secs>] \
         [--mode <cluster|single>]"
    );
    eprintln!("Example: {program} --role master --bind 0.0.0.0");
    eprintln!("Example: {program} --role slave --master 127.0.0.1:6000 --ports 7000-7100");
    eprintln!("Example: {program} --role master --file report.txt --ratio 0.3 --wait 5");
    eprintln!("Example: {program} --role master --file report.txt --mode single");
}

fn parse_args(args: &[String]) -> anyhow::Result<Args> {
    let mut parsed = Args {
        role: Role::Master,
        bind: None,
        master: None,
        ports: None,
        file: None,
        ratio: 0.3,
        wait: Duration::from_secs(5),
        single_thread: false,
    };
    let mut role = None;

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        let value = || {
            args.get(i + 1)
                .with_context(|| format!("{flag} needs a value"))
        };
        match flag {
            "--role" => {
                role = Some(match value()?.as_str() {
                    "master" => Role::Master,
                    "slave" | "worker" => Role::Slave,
                    other => bail!("unknown role {other}"),
                });
                i += 2;
            }
            "--bind" => {
                parsed.bind = Some(value()?.parse().context("--bind")?);
                i += 2;
            }
            "--master" => {
                parsed.master = Some(value()?.parse().context("--master")?);
                i += 2;
            }
            "--ports" => {
                parsed.ports = Some(value()?.clone());
                i += 2;
            }
            "--file" => {
                parsed.file = Some(PathBuf::from(value()?));
                i += 2;
            }
            "--ratio" => {
                parsed.ratio = value()?.parse().context("--ratio")?;
                i += 2;
            }
            "--mode" => {
                parsed.single_thread = match value()?.as_str() {
                    "cluster" | "distributed" => false,
                    "single" => true,
                    other => bail!("unknown mode {other}"),
                };
                i += 2;
            }
            "--wait" => {
                parsed.wait = Duration::from_secs(value()?.parse().context("--wait")?);
                i += 2;
            }
            _ => {
                i += 1;
            }
        }
    }

    parsed.role = role.context("--role is required")?;
    Ok(parsed)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("summary_cluster=info,summary_node=info")),
        )
        .init();

    let argv: Vec<String> = std::env::args().collect();
    let args = match parse_args(&argv) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}");
            usage(argv.first().map(String::as_str).unwrap_or("summary-node"));
            std::process::exit(1);
        }
    };

    match args.role {
        Role::Master => run_master(args).await,
        Role::Slave => run_slave(args).await,
    }
}

async fn run_master(args: Args) -> anyhow::Result<()> {
    let mut config = MasterConfig::from_env()?;
    if let Some(ip) = args.bind {
        config.bind_ip = ip;
    }

    let master = MasterNode::bind(config, Arc::new(TextRankSummarizer::new())).await?;
    master.clone().start().await;

    if let Some(path) = &args.file {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let outcome = if args.single_thread {
            master.summarize_local(&text, args.ratio, &file_name).await?
        } else {
            tracing::info!("Waiting {:?} for workers to register", args.wait);
            tokio::time::sleep(args.wait).await;
            master.summarize(&text, args.ratio, &file_name).await?
        };
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    }

    tracing::info!("Press Ctrl+C to shutdown");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down coordinator");
    Ok(())
}

async fn run_slave(args: Args) -> anyhow::Result<()> {
    let mut config = WorkerConfig::from_env()?;
    if let Some(ip) = args.bind {
        config.bind_ip = ip;
    }
    if let Some(master) = args.master {
        config.master_addr = master;
    }
    if let Some(ports) = &args.ports {
        config.port_range = parse_port_range(ports)?;
    }

    let node = SlaveNode::bind(config, Arc::new(TextRankSummarizer::new())).await?;
    tracing::info!("Worker {} on {}", node.id(), node.local_addr());
    node.clone().start().await;

    tracing::info!("Press Ctrl+C to shutdown");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down worker {}", node.id());
    Ok(())
}
