use anyhow::Context;
use clap::Parser;
use crater_config::CraterConfig;
use crater_engine::{Acceptor, RosterPlan, Session};
use crater_ring::RingConfig;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Relay records from one producer through an optional transformer to any
/// number of consumers.
#[derive(Parser, Debug)]
#[command(name = "crater")]
struct Args {
    /// Address to listen on. Overrides the config file.
    listen: Option<String>,

    /// TOML config file.
    #[arg(long)]
    config: Option<String>,

    /// Ring capacity in records.
    #[arg(long)]
    capacity: Option<u64>,

    /// Consumers to wait for before running.
    #[arg(long)]
    consumers: Option<usize>,

    /// Run without a transformer.
    #[arg(long)]
    no_transformer: bool,

    /// Log filter, e.g. `info` or `crater_engine=debug`.
    #[arg(long)]
    log_level: Option<String>,

    /// Seconds between ring status lines.
    #[arg(long, default_value_t = 1)]
    status_interval: u64,
}

impl Args {
    fn config(&self) -> anyhow::Result<CraterConfig> {
        let mut config = match &self.config {
            Some(path) => CraterConfig::load(path.as_str())?,
            None => CraterConfig::default(),
        };
        if let Some(listen) = &self.listen {
            config.listen = listen.clone();
        }
        if let Some(capacity) = self.capacity {
            config.ring.capacity = capacity;
        }
        if let Some(consumers) = self.consumers {
            config.roster.consumers = consumers;
        }
        if self.no_transformer {
            config.roster.transformer = false;
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = args.config()?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || stop.store(true, Ordering::Release))
            .context("failed to install the Ctrl+C handler")?;
    }

    let plan = RosterPlan::from(&config.roster);
    let mut session = Session::new(RingConfig::new(config.ring.capacity), plan);
    let acceptor = Acceptor::bind(&config.listen)
        .with_context(|| format!("failed to listen on {}", config.listen))?;
    info!(
        addr = %acceptor.local_addr()?,
        capacity = config.ring.capacity,
        producer = plan.producer,
        transformer = plan.transformer,
        consumers = plan.consumers,
        "crater listening"
    );

    acceptor.assemble(&mut session).context("accept loop failed")?;
    session.start()?;
    session.monitor(Duration::from_secs(args.status_interval.max(1)), &stop);
    session.stop();
    Ok(())
}
