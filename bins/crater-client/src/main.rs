use anyhow::Context;
use bytes::Bytes;
use clap::{Parser, ValueEnum};
use crater_engine::Client;
use crater_protocol::{Channel, Limit, Role};
use std::io::Write;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RoleArg {
    #[value(alias = "p")]
    Producer,
    #[value(alias = "c")]
    Consumer,
    #[value(alias = "t")]
    Transformer,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Producer => Role::Producer,
            RoleArg::Consumer => Role::Consumer,
            RoleArg::Transformer => Role::Transformer,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ChannelArg {
    Input,
    Output,
}

impl From<ChannelArg> for Channel {
    fn from(channel: ChannelArg) -> Self {
        match channel {
            ChannelArg::Input => Channel::Input,
            ChannelArg::Output => Channel::Output,
        }
    }
}

/// Reference actor for a crater relay.
#[derive(Parser, Debug)]
#[command(name = "crater-client")]
struct Args {
    /// Relay address.
    server: String,

    /// Role to declare.
    #[arg(value_enum)]
    role: RoleArg,

    /// Records to handle before exiting. 0 runs until the server closes.
    #[arg(long, default_value_t = 0)]
    count: u64,

    /// Channel a consumer reads.
    #[arg(long, value_enum, default_value = "output")]
    channel: ChannelArg,

    /// Records per GIVE_DATA or GET_DATA.
    #[arg(long, default_value_t = 16)]
    batch: u64,

    /// Pause between batches, and between empty polls.
    #[arg(long, default_value_t = 10)]
    interval_ms: u64,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let role = Role::from(args.role);
    let mut client = Client::connect(args.server.as_str(), role)
        .with_context(|| format!("failed to connect to {}", args.server))?;
    info!(server = %args.server, %role, "connected");

    let interval = Duration::from_millis(args.interval_ms);
    let batch = args.batch.max(1);
    let handled = match role {
        Role::Producer => produce(&mut client, args.count, batch, interval)?,
        Role::Transformer => transform(&mut client, args.count, batch, interval)?,
        Role::Consumer => consume(&mut client, args.channel.into(), args.count, batch, interval)?,
    };
    info!(handled, "done");
    Ok(())
}

fn done(handled: u64, count: u64) -> bool {
    count != 0 && handled >= count
}

fn produce(client: &mut Client, count: u64, batch: u64, interval: Duration) -> anyhow::Result<u64> {
    let mut next = 0u64;
    while !done(next, count) {
        let end = if count == 0 { next + batch } else { count.min(next + batch) };
        let records = (next..end).map(|i| Bytes::from(format!("record-{i}"))).collect();
        client.give(Channel::Input, records)?;
        debug!(from = next, to = end, "gave");
        next = end;
        thread::sleep(interval);
    }
    Ok(next)
}

fn transform(client: &mut Client, count: u64, batch: u64, interval: Duration) -> anyhow::Result<u64> {
    let mut handled = 0u64;
    while !done(handled, count) {
        let records = client.get(Channel::Input, Limit::Elements(batch))?;
        if records.is_empty() {
            thread::sleep(interval);
            continue;
        }
        handled += records.len() as u64;
        let upper = records.iter().map(|r| Bytes::from(r.to_ascii_uppercase())).collect();
        client.give(Channel::Output, upper)?;
    }
    Ok(handled)
}

fn consume(
    client: &mut Client,
    channel: Channel,
    count: u64,
    batch: u64,
    interval: Duration,
) -> anyhow::Result<u64> {
    let mut out = std::io::stdout().lock();
    let mut handled = 0u64;
    while !done(handled, count) {
        let records = client.get(channel, Limit::Elements(batch))?;
        if records.is_empty() {
            thread::sleep(interval);
            continue;
        }
        for record in &records {
            out.write_all(record)?;
            out.write_all(b"\n")?;
        }
        out.flush()?;
        handled += records.len() as u64;
    }
    Ok(handled)
}
