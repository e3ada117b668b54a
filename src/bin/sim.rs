use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, error, info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};
use zabbix_sim::{
    actors::{
        messages::HostOutcome,
        scheduler::{SchedulerHandle, Timing, run_once},
    },
    agent::{ActiveAgent, Session},
    config::read_config_file,
    recording::load_recording,
    transport::SessionClient,
};

#[derive(Debug, Clone, Parser)]
#[command(about = "Replay recorded item values to a Zabbix server as an active agent")]
struct Args {
    /// Config file
    #[arg(short)]
    file: PathBuf,

    /// Recording to replay, overrides the config file
    #[arg(short, long)]
    recording: Option<PathBuf>,

    /// Refresh checks, report every item once, print the resulting state and exit
    #[arg(long)]
    once: bool,

    /// Trace every packet
    #[arg(short, long)]
    verbose: bool,
}

fn init(verbose: bool) {
    dotenv::dotenv().ok();

    let level = if verbose {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };
    let filter = filter::Targets::new().with_target("zabbix_sim", level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init(args.verbose);
    trace!("started with args: {args:?}");

    let mut config = read_config_file(&args.file)?;
    if let Some(recording) = args.recording.clone() {
        config.recording = Some(recording);
    }
    let config = config.resolve()?;

    let hosts = load_recording(&config.recording)?;

    let session = config
        .session_seed
        .map_or_else(Session::random, Session::new);
    let transport = Arc::new(SessionClient::new(config.timeout));
    let agent = ActiveAgent::new(config.server_address.clone(), transport, session);

    info!(
        "simulating {} host(s) against {} (send every {:?}, refresh every {:?})",
        hosts.len(),
        config.server_address,
        config.send_interval,
        config.refresh_interval
    );

    if args.once {
        let report = run_once(agent, hosts).await?;
        info!(
            "sent {} value(s), {} exchange(s) failed",
            report.send.items_sent(),
            report.send.failures() + report.refresh.failures()
        );
        println!(
            "{}",
            serde_json::to_string_pretty(&report.snapshot).context("failed to render state")?
        );
        return Ok(());
    }

    let handle = SchedulerHandle::spawn(
        agent,
        hosts,
        Timing {
            send_interval: config.send_interval,
            refresh_interval: config.refresh_interval,
        },
    );

    // a real agent asks for its checks as soon as it comes up
    let report = handle.refresh_now().await?;
    for (host, outcome) in &report.hosts {
        if let HostOutcome::Refreshed { checks, updated } = outcome {
            debug!("{host}: {checks} active check(s), {updated} interval(s) adjusted");
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to wait for ctrl-c: {e}");
    }

    info!("shutting down");
    handle.shutdown().await?;

    Ok(())
}
