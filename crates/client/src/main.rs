use std::net::SocketAddr;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;

use rift::{FixedTimestep, PacketLossSimulation, UdpConfig, UdpTransport};
use rift_client::bot::Wanderer;
use rift_client::{ClientConfig, ClientEvent, ConnectionState, SyncClient};

/// Render frames per second of the headless loop.
const FRAME_INTERVAL: Duration = Duration::from_millis(16);
const REPORT_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "rift-client")]
#[command(about = "Headless Rift bot client")]
struct Args {
    #[arg(short, long, default_value = "127.0.0.1")]
    server: String,

    #[arg(short, long, default_value_t = rift::DEFAULT_PORT)]
    port: u16,

    #[arg(long, default_value_t = 1, help = "Random seed for the bot's wandering")]
    seed: u64,

    #[arg(long, help = "Stop after this many seconds")]
    duration: Option<u64>,

    #[arg(long, default_value_t = 0.0, help = "Simulated outgoing packet loss (0-100)")]
    loss_percent: f32,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let addr: SocketAddr = format!("{}:{}", args.server, args.port)
        .parse()
        .with_context(|| format!("invalid server address {}:{}", args.server, args.port))?;
    let udp_config = UdpConfig {
        conditions: if args.loss_percent > 0.0 {
            PacketLossSimulation::lossy(args.loss_percent)
        } else {
            PacketLossSimulation::default()
        },
        ..UdpConfig::default()
    };
    let transport = UdpTransport::connect(addr, udp_config)
        .await
        .with_context(|| format!("connecting to {addr}"))?;
    log::info!("connecting to {addr} from {}", transport.local_addr());

    let mut client = SyncClient::new(transport, ClientConfig::default());
    let mut bot = Wanderer::new(args.seed);
    let deadline = args
        .duration
        .map(|secs| Instant::now() + Duration::from_secs(secs));

    run(&mut client, &mut bot, deadline).await;

    if client.state() != ConnectionState::Disconnected {
        if let Err(err) = client.disconnect() {
            log::warn!("goodbye not sent: {err}");
        }
        // Give the reliable goodbye a moment to leave.
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    Ok(())
}

async fn run(client: &mut SyncClient<UdpTransport>, bot: &mut Wanderer, deadline: Option<Instant>) {
    let mut clock = FixedTimestep::new(client.tick_rate());
    let mut interval = tokio::time::interval(FRAME_INTERVAL);
    let mut last = Instant::now();
    let mut last_report = Instant::now();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = interval.tick() => {}
        }
        let now = Instant::now();
        if deadline.is_some_and(|deadline| now >= deadline) {
            break;
        }
        let dt = (now - last).as_secs_f32();
        last = now;

        clock.accumulate(dt);
        while clock.consume_tick() {
            client.tick(&bot.next_input());
        }
        client.frame(dt);

        let events: Vec<ClientEvent> = client.drain_events().collect();
        for event in events {
            match event {
                ClientEvent::Welcomed {
                    client_id,
                    controlled_entity,
                } => {
                    log::info!("joined as client {client_id}, hero {controlled_entity}");
                    clock = FixedTimestep::new(client.tick_rate());
                }
                ClientEvent::Reconciled { input_id, outcome } => {
                    log::debug!("input {input_id}: {outcome:?}");
                }
                ClientEvent::Disconnected { reason } => {
                    log::info!("server closed the connection: {reason}");
                    return;
                }
                _ => {}
            }
        }

        if last_report.elapsed() >= REPORT_INTERVAL {
            last_report = Instant::now();
            report(client);
        }
    }
}

fn report(client: &SyncClient<UdpTransport>) {
    let stats = client.stats();
    let prediction = client.prediction().stats();
    let net = client.network_stats();
    log::info!(
        "snapshot {} (full {}, stale {}, resyncs {}) | corrections {} snaps {} | {} pkts out {} in, {} dropped",
        stats.last_snapshot_id,
        stats.full_updates,
        stats.stale_snapshots,
        stats.resync_requests,
        prediction.corrections,
        prediction.snaps,
        net.packets_sent,
        net.packets_received,
        net.packets_dropped,
    );
}
