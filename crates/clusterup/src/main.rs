//! clusterup - bring up a single-node control plane in a container.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use clusterup::policy::DEFAULT_POLICY_PATH;
use clusterup::{ConsoleObserver, Orchestrator, StartOptions, StartupPolicy};
use clusterup_common::DockerCli;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Start a single-node cluster control plane on the local container host
#[derive(Parser, Debug)]
#[command(name = "clusterup")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// IP the control plane advertises; detected from the image when omitted
    #[arg(long)]
    server_ip: Option<String>,

    /// Image repository, overriding the policy file
    #[arg(long)]
    image: Option<String>,

    /// Image tag
    #[arg(long, default_value = "latest")]
    tag: String,

    /// Name of the control plane container, overriding the policy file
    #[arg(long)]
    container_name: Option<String>,

    /// Public hostname for the master URL
    #[arg(long)]
    public_hostname: Option<String>,

    /// Routing subdomain; defaults to <server-ip>.<wildcard suffix>
    #[arg(long)]
    routing_suffix: Option<String>,

    /// Host directory holding the configuration
    #[arg(long, default_value = clusterup::options::DEFAULT_HOST_CONFIG_DIR)]
    host_config_dir: PathBuf,

    /// Host directory for pod volumes
    #[arg(long, default_value = clusterup::options::DEFAULT_HOST_VOLUMES_DIR)]
    host_volumes_dir: PathBuf,

    /// Host directory persisting etcd data
    #[arg(long)]
    host_data_dir: Option<PathBuf>,

    /// Reuse configuration already present in the host config directory
    #[arg(long)]
    use_existing_config: bool,

    /// Mount the volumes directory with shared propagation
    #[arg(long)]
    shared_volume: bool,

    /// KEY=VALUE passed to the control plane containers (repeatable)
    #[arg(short = 'e', long = "env")]
    environment: Vec<String>,

    /// Control plane daemon log level; 0 keeps its default
    #[arg(long, default_value = "0")]
    server_loglevel: u8,

    /// Skip the host port availability check
    #[arg(long)]
    skip_port_check: bool,

    /// Verify the server IP is reachable before starting
    #[arg(long)]
    test_ip: bool,

    /// Startup policy file
    #[arg(short = 'p', long, default_value = DEFAULT_POLICY_PATH)]
    policy: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,
}

fn init_logging(log_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .init();
}

/// Cancels `token` on SIGINT.
fn setup_signal_handlers(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received SIGINT, cancelling startup");
            token.cancel();
        }
    });
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut policy = StartupPolicy::load_or_default(&args.policy)?;
    if let Some(image) = args.image {
        policy.container.image = image;
    }
    if let Some(name) = args.container_name {
        policy.container.container_name = name;
    }
    let image = policy.image_ref(&args.tag);
    info!(image = %image, policy = %args.policy.display(), "Using control plane image");

    let cancel = CancellationToken::new();
    setup_signal_handlers(cancel.clone());

    let docker = Arc::new(DockerCli::new(image.clone()));
    let mut orch = Orchestrator::new(docker.clone(), docker, policy)
        .with_image(image)
        .with_observer(Arc::new(ConsoleObserver))
        .with_cancellation(cancel);
    if let Some(host) = args.public_hostname {
        orch = orch.with_public_host(host);
    }
    if let Some(suffix) = args.routing_suffix {
        orch = orch.with_routing_suffix(suffix);
    }

    if args.skip_port_check {
        info!("Skipping port check");
    } else {
        orch.check_ports().await?;
    }

    let server_ip = match args.server_ip {
        Some(ip) => ip,
        None => orch.server_ip().await.context("determining the server IP")?,
    };

    if args.test_ip {
        if let Err(e) = orch.test_ip(&server_ip).await {
            match orch.other_ips(&server_ip).await {
                Ok(others) if !others.is_empty() => {
                    warn!(ip = %server_ip, alternatives = ?others, "Server IP is not reachable");
                }
                Ok(_) => {}
                Err(lookup) => warn!(error = %lookup, "Could not list other host addresses"),
            }
            return Err(e).context(format!("server IP {} is not reachable", server_ip));
        }
    }

    let mut opts = StartOptions::new(&server_ip)
        .with_image_tag(&args.tag)
        .with_host_config_dir(args.host_config_dir)
        .with_host_volumes_dir(args.host_volumes_dir)
        .use_existing_config(args.use_existing_config)
        .use_shared_volume(args.shared_volume)
        .with_environment(args.environment)
        .with_log_level(args.server_loglevel);
    if let Some(dir) = args.host_data_dir {
        opts = opts.with_host_data_dir(dir);
    }

    let staged = orch.start(&opts).await?;
    println!("Server is running at {}", orch.master_url(&server_ip));
    println!("Local configuration copy: {}", staged.display());
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args.log_level);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("clusterup: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
