use clap::Parser;
use log::{error, info};
use server::network::Server;
use shared::{GameConfig, GameMode, WorldType, DEFAULT_OBSTACLE_DENSITY, DEFAULT_PORT, TICK_RATE};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short = 'p', long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// World width in cells
    #[arg(short = 'w', long, default_value = "40")]
    width: i32,

    /// World height in cells (no short flag to avoid conflict with --help)
    #[arg(long, default_value = "20")]
    height: i32,

    /// Time limit in seconds; enables timed mode
    #[arg(short = 't', long)]
    time_limit: Option<u32>,

    /// Generate random obstacles
    #[arg(short = 'o', long)]
    obstacles: bool,

    /// Load obstacles from a map file
    #[arg(short = 'm', long)]
    map: Option<PathBuf>,

    /// Maximum number of players, 1 for singleplayer
    #[arg(short = 'n', long, default_value = "8")]
    max_players: u32,

    /// Obstacle density for random maps
    #[arg(long, default_value_t = DEFAULT_OBSTACLE_DENSITY)]
    density: f32,

    /// Simulation ticks per second
    #[arg(long, default_value_t = TICK_RATE)]
    tick_rate: u32,
}

impl Args {
    fn game_config(&self) -> GameConfig {
        GameConfig {
            mode: if self.time_limit.is_some() {
                GameMode::Timed
            } else {
                GameMode::Standard
            },
            world_type: if self.obstacles || self.map.is_some() {
                WorldType::WithObstacles
            } else {
                WorldType::NoObstacles
            },
            width: self.width,
            height: self.height,
            time_limit: self.time_limit.unwrap_or(0),
            map_file: self.map.clone(),
            max_players: self.max_players,
            obstacle_density: self.density,
        }
        .sanitized()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let config = args.game_config();

    info!("Starting snake server...");
    info!("Port: {}", args.port);
    info!("Mode: {:?}", config.mode);
    if config.mode == GameMode::Timed {
        info!("Time limit: {}s", config.time_limit);
    }
    info!("World: {}x{}", config.width, config.height);
    info!(
        "Obstacles: {}",
        match (&config.map_file, config.world_type) {
            (Some(path), _) => format!("from {}", path.display()),
            (None, WorldType::WithObstacles) => format!("random, density {}", config.obstacle_density),
            (None, WorldType::NoObstacles) => "none".to_string(),
        }
    );
    info!(
        "Max players: {} ({})",
        config.max_players,
        if config.max_players == 1 {
            "singleplayer"
        } else {
            "multiplayer"
        }
    );

    let tick_duration = Duration::from_secs_f64(1.0 / f64::from(args.tick_rate.max(1)));
    let address = format!("{}:{}", args.host, args.port);
    let server = Server::new(&address, &config, tick_duration).await?;
    let game = server.game();

    tokio::select! {
        result = server.run() => {
            if let Err(e) = &result {
                error!("Server error: {}", e);
            }
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
            game.lock().await.stop();
        }
    }

    Ok(())
}
