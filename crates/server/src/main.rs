use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{cursor, execute};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;

use rift::{FixedTimestep, PacketLossSimulation, UdpConfig, UdpTransport};
use rift_server::tui::{self, TuiState};
use rift_server::{ServerConfig, ServerEvent, SyncServer};

/// Wake-up period of the main loop; ticks themselves run at the configured rate.
const POLL_INTERVAL: Duration = Duration::from_millis(2);

#[derive(Parser)]
#[command(name = "rift-server")]
#[command(about = "Authoritative Rift game server")]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    #[arg(short, long, default_value_t = rift::DEFAULT_PORT)]
    port: u16,

    #[arg(short, long, default_value_t = rift::DEFAULT_TICK_RATE)]
    tick_rate: u32,

    #[arg(short, long, default_value_t = 32)]
    max_clients: usize,

    #[arg(long, default_value_t = 1, help = "Players needed to start the match")]
    min_players: usize,

    #[arg(long)]
    headless: bool,

    #[arg(long, help = "Enable packet loss simulation on outgoing traffic")]
    simulate_packet_loss: bool,

    #[arg(long, default_value_t = 0.0, help = "Packet loss percentage (0-100)")]
    loss_percent: f32,

    #[arg(long, default_value_t = 0, help = "Minimum latency in ms")]
    min_latency: u32,

    #[arg(long, default_value_t = 0, help = "Maximum latency in ms")]
    max_latency: u32,

    #[arg(long, default_value_t = 0, help = "Jitter in ms")]
    jitter: u32,
}

impl Args {
    fn server_config(&self) -> ServerConfig {
        let packet_loss = self.simulate_packet_loss.then(|| PacketLossSimulation {
            enabled: true,
            loss_percent: self.loss_percent,
            min_latency_ms: self.min_latency,
            max_latency_ms: self.max_latency,
            jitter_ms: self.jitter,
        });
        ServerConfig {
            tick_rate: self.tick_rate,
            max_clients: self.max_clients,
            min_players_to_start: self.min_players,
            packet_loss,
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let addr: SocketAddr = format!("{}:{}", args.bind, args.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", args.bind, args.port))?;
    let config = args.server_config();

    if args.headless {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    let udp_config = UdpConfig {
        max_connections: config.max_clients,
        conditions: config.packet_loss.clone().unwrap_or_default(),
        ..UdpConfig::default()
    };
    let transport = UdpTransport::bind(addr, udp_config)
        .await
        .with_context(|| format!("binding {addr}"))?;
    let local_addr = transport.local_addr();
    let mut server = SyncServer::new(transport, config);

    if args.headless {
        log::info!("server listening on {local_addr}");
        run_headless(&mut server).await;
        log::info!("server shutting down");
    } else {
        run_with_tui(&mut server, local_addr).await?;
    }
    server.shutdown();
    Ok(())
}

async fn run_headless(server: &mut SyncServer<UdpTransport>) {
    let mut clock = FixedTimestep::new(server.config().tick_rate);
    let mut interval = tokio::time::interval(POLL_INTERVAL);
    let mut last = Instant::now();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = interval.tick() => {}
        }
        let now = Instant::now();
        clock.accumulate((now - last).as_secs_f32());
        last = now;
        while clock.consume_tick() {
            server.tick();
        }
        for event in server.drain_events() {
            log_event(&event);
        }
    }
}

fn log_event(event: &ServerEvent) {
    match event {
        ServerEvent::ConnectionDenied { client_id, reason } => {
            log::warn!("connection {client_id} denied: {reason}");
        }
        ServerEvent::Error { message } => log::error!("{message}"),
        // the engine already logs the rest as it happens
        _ => {}
    }
}

async fn run_with_tui(server: &mut SyncServer<UdpTransport>, local_addr: SocketAddr) -> io::Result<()> {
    terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, cursor::Hide)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = tui_loop(&mut terminal, server, local_addr).await;

    terminal::disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, cursor::Show)?;
    result
}

async fn tui_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    server: &mut SyncServer<UdpTransport>,
    local_addr: SocketAddr,
) -> io::Result<()> {
    let mut state = TuiState::new();
    state.log_info(format!("Server listening on {local_addr}"));

    let mut clock = FixedTimestep::new(server.config().tick_rate);
    let mut interval = tokio::time::interval(POLL_INTERVAL);
    let mut last = Instant::now();

    loop {
        interval.tick().await;
        let now = Instant::now();
        clock.accumulate((now - last).as_secs_f32());
        last = now;
        while clock.consume_tick() {
            server.tick();
        }

        for event in server.drain_events() {
            match event {
                ServerEvent::ClientConnected { client_id, entity } => {
                    state.log_info(format!("Client {client_id} connected (hero {entity})"));
                }
                ServerEvent::ClientDisconnected { client_id, reason } => {
                    state.log_info(format!("Client {client_id} {}", reason.as_str()));
                }
                ServerEvent::ConnectionDenied { client_id, reason } => {
                    state.log_warn(format!("Connection {client_id} denied: {reason}"));
                }
                ServerEvent::ResyncRequested { client_id } => {
                    state.log_info(format!("Client {client_id} requested a full update"));
                }
                ServerEvent::MatchStarted { snapshot_id } => {
                    state.log_info(format!("Match started at snapshot {snapshot_id}"));
                }
                ServerEvent::Error { message } => state.log_error(message),
            }
        }

        if let Some(client_id) = state.take_pending_kick() {
            server.kick(client_id);
        }

        let clients = server.client_infos();
        while event::poll(Duration::ZERO)? {
            let Event::Key(key) = event::read()? else {
                continue;
            };
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Up => state.select_prev(clients.len()),
                KeyCode::Down => state.select_next(clients.len()),
                KeyCode::Char('k') | KeyCode::Char('K') => state.request_kick(&clients),
                _ => {}
            }
        }

        let stats = server.stats();
        terminal.draw(|frame| tui::render(frame, &state, &stats, &clients))?;
    }
}
