//! Server network layer handling TCP connections and game loop coordination

use crate::client_manager::Frame;
use crate::game::{Game, SharedGame};
use log::{debug, error, info, warn};
use shared::protocol::{self, read_frame, Envelope, Packet};
use shared::GameConfig;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::{interval, timeout, MissedTickBehavior};

/// How long one accept call may block before the running flag is rechecked.
pub const ACCEPT_POLL: Duration = Duration::from_secs(1);
/// How long the final snapshot is left to drain before the server stops.
pub const GAME_OVER_HOLD: Duration = Duration::from_secs(2);
/// Outbound frames buffered per client before broadcasts start skipping it.
pub const CLIENT_QUEUE_DEPTH: usize = 32;

pub type ServerResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Main server coordinating connections and the game simulation
pub struct Server {
    listener: TcpListener,
    game: SharedGame,
    tick_duration: Duration,
    game_over_hold: Duration,
}

impl Server {
    pub async fn new(
        addr: &str,
        config: &GameConfig,
        tick_duration: Duration,
    ) -> ServerResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            game: Arc::new(Mutex::new(Game::new(config))),
            tick_duration,
            game_over_hold: GAME_OVER_HOLD,
        })
    }

    /// Overrides how long the server lingers after the game ends.
    pub fn with_game_over_hold(mut self, hold: Duration) -> Self {
        self.game_over_hold = hold;
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle to the session, e.g. for stopping the server from outside.
    pub fn game(&self) -> SharedGame {
        Arc::clone(&self.game)
    }

    /// Accepts connections until the game ends or is stopped, then waits for
    /// the tick loop to finish.
    pub async fn run(self) -> ServerResult<()> {
        let tick_task = tokio::spawn(tick_loop(
            Arc::clone(&self.game),
            self.tick_duration,
            self.game_over_hold,
        ));

        info!("Server started successfully");

        loop {
            {
                let game = self.game.lock().await;
                if !game.is_running() || game.is_game_over() {
                    break;
                }
            }

            match timeout(ACCEPT_POLL, self.listener.accept()).await {
                Err(_) => continue,
                Ok(Ok((stream, addr))) => {
                    info!("Accepted connection from {}", addr);
                    tokio::spawn(handle_connection(stream, addr, Arc::clone(&self.game)));
                }
                Ok(Err(e)) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }

        tick_task.await?;
        info!("Server shutting down");
        Ok(())
    }
}

/// Advances the simulation and broadcasts a snapshot every tick until the
/// game ends or is stopped.
async fn tick_loop(game: SharedGame, tick_duration: Duration, hold: Duration) {
    let mut ticker = interval(tick_duration);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut tick: u64 = 0;

    loop {
        ticker.tick().await;

        let mut game = game.lock().await;
        if !game.is_running() {
            return;
        }
        if game.is_game_over() {
            break;
        }

        game.update();
        game.broadcast();

        tick += 1;
        if tick % 100 == 0 {
            debug!(
                "Tick {}: {} players, {}s elapsed",
                tick,
                game.player_count(),
                game.state().elapsed_time
            );
        }
    }

    game.lock().await.broadcast();
    info!("Game over, holding final state for {:?}", hold);
    tokio::time::sleep(hold).await;
    game.lock().await.stop();
}

/// Drains a client's outbound queue into its socket. Ends when every sender
/// is gone or the socket fails.
async fn write_loop<W>(mut writer: W, mut rx: mpsc::Receiver<Frame>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = rx.recv().await {
        if let Err(e) = writer.write_all(&frame).await {
            debug!("Write failed, dropping remaining frames: {}", e);
            return;
        }
    }
    let _ = writer.shutdown().await;
}

/// Per-connection reader. Routes packets into the session and releases the
/// player's slot on exit, whatever the reason.
async fn handle_connection(stream: TcpStream, addr: SocketAddr, game: SharedGame) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Could not disable Nagle for {}: {}", addr, e);
    }
    let (mut reader, writer) = stream.into_split();
    let (tx, rx) = mpsc::channel::<Frame>(CLIENT_QUEUE_DEPTH);
    let writer_task = tokio::spawn(write_loop(writer, rx));
    let mut slot: Option<usize> = None;
    let mut shutdown = game.lock().await.shutdown_signal();

    loop {
        let read = tokio::select! {
            read = read_frame(&mut reader) => read,
            _ = stopped(&mut shutdown) => {
                info!("Closing connection from {}, server stopping", addr);
                break;
            }
        };
        let payload = match read {
            Ok(payload) => payload,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                info!("{} closed the connection", addr);
                break;
            }
            Err(e) => {
                warn!("Connection error from {}: {}", addr, e);
                break;
            }
        };

        let envelope = match protocol::decode_payload(&payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Dropping malformed frame from {}: {}", addr, e);
                continue;
            }
        };

        match (envelope.packet, slot) {
            (Packet::JoinGame { name, port }, None) => {
                let joined = game.lock().await.join(tx.clone(), &name);
                match joined {
                    Ok(id) => {
                        info!("{} joined as '{}' in slot {} (port {})", addr, name, id, port);
                        slot = Some(id);
                    }
                    Err(e) => {
                        info!("Rejected join from {}: {}", addr, e);
                        send_error(&tx, e.to_string()).await;
                        break;
                    }
                }
            }
            (Packet::JoinGame { .. }, Some(id)) => {
                debug!("Ignoring duplicate join from slot {}", id);
            }
            (Packet::PlayerInput { direction }, Some(id)) => {
                game.lock().await.input(id, direction);
            }
            (Packet::Pause, Some(id)) => game.lock().await.pause(id),
            (Packet::Resume, Some(id)) => game.lock().await.resume(id),
            (Packet::PlayerDisconnect, _) => {
                info!("{} disconnected", addr);
                break;
            }
            (packet, _) => {
                debug!("Ignoring {:?} from {}", packet.message_type(), addr);
            }
        }
    }

    if let Some(id) = slot {
        game.lock().await.leave(id);
    }
    drop(tx);
    if let Err(e) = writer_task.await {
        error!("Writer task for {} failed: {}", addr, e);
    }
}

/// Resolves once the session has been stopped or dropped.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

async fn send_error(tx: &mpsc::Sender<Frame>, message: String) {
    let envelope = Envelope::from_server(Packet::Error { message });
    match protocol::encode(&envelope) {
        Ok(frame) => {
            let _ = tx.send(Arc::new(frame)).await;
        }
        Err(e) => error!("Failed to encode error message: {}", e),
    }
}
