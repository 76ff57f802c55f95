//! Obstacle map loading, random generation and reachability checks.
//!
//! A map is a row-major `width * height` bitmap where a non-zero cell is an
//! obstacle. The session builds one at creation and never changes it.

use log::{info, warn};
use rand::Rng;
use shared::{GameConfig, Position, WorldType, MAX_DIMENSION, MIN_DIMENSION};
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Random maps are retried this many times before giving up on obstacles.
pub const MAP_GENERATION_ATTEMPTS: usize = 10;

#[derive(Debug, Error)]
pub enum MapError {
    #[error("failed to read map file: {0}")]
    Io(#[from] std::io::Error),
    #[error("map header must be `width height`, got {0:?}")]
    InvalidHeader(String),
    #[error("map is {width}x{height}, each side must be {}..={}", MIN_DIMENSION, MAX_DIMENSION)]
    InvalidDimensions { width: i32, height: i32 },
}

/// Obstacle bitmap together with its dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObstacleMap {
    pub width: i32,
    pub height: i32,
    pub cells: Vec<u8>,
}

impl ObstacleMap {
    /// A map without any obstacles.
    pub fn empty(width: i32, height: i32) -> Self {
        Self {
            width,
            height,
            cells: vec![0; cell_count(width, height)],
        }
    }

    pub fn center(&self) -> Position {
        Position::new(self.width / 2, self.height / 2)
    }

    pub fn obstacle_count(&self) -> usize {
        self.cells.iter().filter(|&&cell| cell != 0).count()
    }
}

fn cell_count(width: i32, height: i32) -> usize {
    width.max(0) as usize * height.max(0) as usize
}

/// Parses a map file.
///
/// The first line holds `width height`; each following line is one row where
/// `#` marks an obstacle. Short or missing rows are free for the remaining
/// columns, and anything past the declared size is ignored.
pub fn load_from_file(path: &Path) -> Result<ObstacleMap, MapError> {
    let contents = fs::read_to_string(path)?;
    parse_map(&contents)
}

pub fn parse_map(contents: &str) -> Result<ObstacleMap, MapError> {
    let mut lines = contents.lines();
    let header = lines.next().unwrap_or_default();
    let mut fields = header.split_whitespace().map(str::parse::<i32>);

    let (width, height) = match (fields.next(), fields.next()) {
        (Some(Ok(width)), Some(Ok(height))) if width > 0 && height > 0 => (width, height),
        _ => return Err(MapError::InvalidHeader(header.to_string())),
    };
    let allowed = MIN_DIMENSION..=MAX_DIMENSION;
    if !allowed.contains(&width) || !allowed.contains(&height) {
        return Err(MapError::InvalidDimensions { width, height });
    }

    let mut map = ObstacleMap::empty(width, height);
    for (y, line) in lines.take(height as usize).enumerate() {
        for (x, ch) in line.chars().take(width as usize).enumerate() {
            if ch == '#' {
                map.cells[y * width as usize + x] = 1;
            }
        }
    }

    Ok(map)
}

/// Radius of the obstacle-free circle around the map center.
pub fn safe_zone_radius(width: i32, height: i32) -> i32 {
    (width.min(height) / 4).max(10)
}

/// Places an obstacle on every cell outside the central safe zone with
/// probability `density`.
pub fn generate_random<R: Rng>(
    width: i32,
    height: i32,
    density: f32,
    rng: &mut R,
) -> Vec<u8> {
    let density = f64::from(density.clamp(0.0, 1.0));
    let center = Position::new(width / 2, height / 2);
    let radius = safe_zone_radius(width, height);
    let mut cells = vec![0u8; cell_count(width, height)];

    for y in 0..height {
        for x in 0..width {
            let (dx, dy) = (x - center.x, y - center.y);
            if dx * dx + dy * dy <= radius * radius {
                continue;
            }
            if rng.gen_bool(density) {
                cells[(y * width + x) as usize] = 1;
            }
        }
    }

    cells
}

/// Breadth-first flood fill over 4-connected free cells.
///
/// Returns true iff every free cell of the map is reachable from `start`.
/// A start outside the map or on an obstacle is never reachable.
pub fn is_reachable(cells: &[u8], width: i32, height: i32, start: Position) -> bool {
    let in_bounds = |p: Position| p.x >= 0 && p.x < width && p.y >= 0 && p.y < height;
    let index = |p: Position| (p.y * width + p.x) as usize;

    if !in_bounds(start) || cells.get(index(start)).map_or(true, |&c| c != 0) {
        return false;
    }

    let free_cells = cells.iter().filter(|&&cell| cell == 0).count();
    let mut visited = vec![false; cells.len()];
    let mut queue = VecDeque::from([start]);
    visited[index(start)] = true;
    let mut reached = 0;

    while let Some(current) = queue.pop_front() {
        reached += 1;

        for (dx, dy) in [(0, -1), (0, 1), (-1, 0), (1, 0)] {
            let next = Position::new(current.x + dx, current.y + dy);
            if !in_bounds(next) {
                continue;
            }
            let i = index(next);
            if cells[i] == 0 && !visited[i] {
                visited[i] = true;
                queue.push_back(next);
            }
        }
    }

    reached == free_cells
}

/// Builds the obstacle map a new session starts with.
///
/// Never fails: an unreadable map file or a density that keeps producing
/// disconnected maps both degrade to an empty map.
pub fn build_obstacles<R: Rng>(config: &GameConfig, rng: &mut R) -> ObstacleMap {
    if let Some(path) = &config.map_file {
        return match load_from_file(path) {
            Ok(map) => {
                info!(
                    "Loaded {}x{} map from {} ({} obstacles)",
                    map.width,
                    map.height,
                    path.display(),
                    map.obstacle_count()
                );
                map
            }
            Err(e) => {
                warn!("Could not load map {}: {}, using an empty map", path.display(), e);
                ObstacleMap::empty(config.width, config.height)
            }
        };
    }

    if config.world_type == WorldType::NoObstacles {
        return ObstacleMap::empty(config.width, config.height);
    }

    let center = Position::new(config.width / 2, config.height / 2);
    for attempt in 1..=MAP_GENERATION_ATTEMPTS {
        let cells = generate_random(config.width, config.height, config.obstacle_density, rng);
        if is_reachable(&cells, config.width, config.height, center) {
            let map = ObstacleMap {
                width: config.width,
                height: config.height,
                cells,
            };
            info!(
                "Generated obstacle map on attempt {} ({} obstacles)",
                attempt,
                map.obstacle_count()
            );
            return map;
        }
    }

    warn!(
        "No connected map after {} attempts, using an empty map",
        MAP_GENERATION_ATTEMPTS
    );
    ObstacleMap::empty(config.width, config.height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::path::PathBuf;

    fn temp_map_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "snake-map-{}-{}.txt",
            std::process::id(),
            name
        ));
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_parse_map() {
        let map = parse_map("10 12\n#........#\n.#\n").unwrap();

        assert_eq!(map.width, 10);
        assert_eq!(map.height, 12);
        assert_eq!(map.cells.len(), 120);
        assert_eq!(map.cells[0], 1);
        assert_eq!(map.cells[9], 1);
        assert_eq!(map.cells[11], 1);
        assert_eq!(map.obstacle_count(), 3);
    }

    #[test]
    fn test_parse_map_ignores_extra_rows_and_columns() {
        let mut contents = String::from("10 10\n.........##\n");
        for _ in 0..9 {
            contents.push_str("..........\n");
        }
        contents.push_str("##########\n");

        let map = parse_map(&contents).unwrap();
        assert_eq!(map.cells.len(), 100);
        assert_eq!(map.cells[9], 1);
        assert_eq!(map.obstacle_count(), 1);
    }

    #[test]
    fn test_parse_map_rejects_bad_header() {
        assert!(matches!(parse_map(""), Err(MapError::InvalidHeader(_))));
        assert!(matches!(parse_map("10\n"), Err(MapError::InvalidHeader(_))));
        assert!(matches!(parse_map("a b\n"), Err(MapError::InvalidHeader(_))));
        assert!(matches!(parse_map("0 5\n"), Err(MapError::InvalidHeader(_))));
    }

    #[test]
    fn test_parse_map_rejects_out_of_range_dimensions() {
        for header in ["9 10", "10 201", "1100 1000", "100000 100000"] {
            let result = parse_map(&format!("{}\n#\n", header));
            assert!(
                matches!(result, Err(MapError::InvalidDimensions { .. })),
                "{} should be rejected",
                header
            );
        }
        assert!(parse_map("200 10\n").is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let path = temp_map_file("load", "10 10\n###\n");
        let map = load_from_file(&path).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(&map.cells[..4], &[1, 1, 1, 0]);
        assert_eq!(map.obstacle_count(), 3);
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_from_file(Path::new("/nonexistent/snake/map.txt"));
        assert!(matches!(result, Err(MapError::Io(_))));
    }

    #[test]
    fn test_safe_zone_radius() {
        assert_eq!(safe_zone_radius(40, 20), 10);
        assert_eq!(safe_zone_radius(200, 120), 30);
    }

    #[test]
    fn test_random_map_keeps_safe_zone_free() {
        let mut rng = StdRng::seed_from_u64(1);
        let (width, height) = (60, 50);
        let cells = generate_random(width, height, 1.0, &mut rng);
        let radius = safe_zone_radius(width, height);

        for y in 0..height {
            for x in 0..width {
                let (dx, dy) = (x - width / 2, y - height / 2);
                let inside = dx * dx + dy * dy <= radius * radius;
                let cell = cells[(y * width + x) as usize];
                assert_eq!(cell == 0, inside, "cell ({}, {})", x, y);
            }
        }
    }

    #[test]
    fn test_random_map_density() {
        let mut rng = StdRng::seed_from_u64(99);
        let (width, height) = (200, 200);
        let cells = generate_random(width, height, 0.3, &mut rng);
        let radius = safe_zone_radius(width, height);

        let outside = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .filter(|&(x, y)| {
                let (dx, dy) = (x - width / 2, y - height / 2);
                dx * dx + dy * dy > radius * radius
            })
            .count();
        let obstacles = cells.iter().filter(|&&c| c != 0).count();

        assert_approx_eq!(obstacles as f64 / outside as f64, 0.3, 0.02);
    }

    #[test]
    fn test_zero_density_is_empty() {
        let mut rng = StdRng::seed_from_u64(3);
        let cells = generate_random(30, 30, 0.0, &mut rng);
        assert!(cells.iter().all(|&c| c == 0));
    }

    #[test]
    fn test_reachable_open_map() {
        let cells = vec![0; 25];
        assert!(is_reachable(&cells, 5, 5, Position::new(2, 2)));
    }

    #[test]
    fn test_unreachable_when_wall_splits_map() {
        #[rustfmt::skip]
        let cells = vec![
            0, 0, 1, 0, 0,
            0, 0, 1, 0, 0,
            0, 0, 1, 0, 0,
        ];
        assert!(!is_reachable(&cells, 5, 3, Position::new(0, 0)));
    }

    #[test]
    fn test_reachable_around_obstacles() {
        #[rustfmt::skip]
        let cells = vec![
            0, 0, 1, 0, 0,
            0, 0, 1, 0, 0,
            0, 0, 0, 0, 0,
        ];
        assert!(is_reachable(&cells, 5, 3, Position::new(0, 0)));
    }

    #[test]
    fn test_diagonal_gap_is_not_connected() {
        #[rustfmt::skip]
        let cells = vec![
            0, 1,
            1, 0,
        ];
        assert!(!is_reachable(&cells, 2, 2, Position::new(0, 0)));
    }

    #[test]
    fn test_start_on_obstacle_or_outside() {
        let cells = vec![1, 0, 0, 0];
        assert!(!is_reachable(&cells, 2, 2, Position::new(0, 0)));
        assert!(!is_reachable(&cells, 2, 2, Position::new(5, 0)));
        assert!(!is_reachable(&cells, 2, 2, Position::new(-1, 1)));
    }

    #[test]
    fn test_reachability_matches_flood_fill_on_random_maps() {
        let mut rng = StdRng::seed_from_u64(2024);
        for _ in 0..20 {
            let (width, height) = (12, 9);
            let cells: Vec<u8> = (0..width * height)
                .map(|_| u8::from(rng.gen_bool(0.35)))
                .collect();
            let start = Position::new(width / 2, height / 2);

            // Naive fixpoint flood fill as the reference.
            let mut filled = vec![false; cells.len()];
            let start_index = (start.y * width + start.x) as usize;
            if cells[start_index] == 0 {
                filled[start_index] = true;
                let mut changed = true;
                while changed {
                    changed = false;
                    for y in 0..height {
                        for x in 0..width {
                            let i = (y * width + x) as usize;
                            if cells[i] != 0 || filled[i] {
                                continue;
                            }
                            let touches = [(0, -1), (0, 1), (-1, 0), (1, 0)].iter().any(
                                |&(dx, dy)| {
                                    let (nx, ny) = (x + dx, y + dy);
                                    nx >= 0
                                        && nx < width
                                        && ny >= 0
                                        && ny < height
                                        && filled[(ny * width + nx) as usize]
                                },
                            );
                            if touches {
                                filled[i] = true;
                                changed = true;
                            }
                        }
                    }
                }
            }
            let expected = cells[start_index] == 0
                && cells
                    .iter()
                    .zip(&filled)
                    .all(|(&cell, &reached)| cell != 0 || reached);

            assert_eq!(is_reachable(&cells, width, height, start), expected);
        }
    }

    #[test]
    fn test_build_without_obstacles() {
        let config = GameConfig::default();
        let map = build_obstacles(&config, &mut StdRng::seed_from_u64(0));

        assert_eq!(map, ObstacleMap::empty(40, 20));
    }

    #[test]
    fn test_build_random_map_is_reachable() {
        let config = GameConfig {
            world_type: WorldType::WithObstacles,
            width: 60,
            height: 40,
            ..GameConfig::default()
        };
        let map = build_obstacles(&config, &mut StdRng::seed_from_u64(5));

        assert_eq!(map.cells.len(), 60 * 40);
        assert!(is_reachable(&map.cells, 60, 40, map.center()));
    }

    #[test]
    fn test_build_falls_back_to_empty_when_never_connected() {
        // Dense noise always leaves free pockets cut off from the center.
        let config = GameConfig {
            world_type: WorldType::WithObstacles,
            width: 60,
            height: 60,
            obstacle_density: 0.6,
            ..GameConfig::default()
        };
        let map = build_obstacles(&config, &mut StdRng::seed_from_u64(5));

        assert_eq!(map.obstacle_count(), 0);
        assert_eq!(map.cells.len(), 60 * 60);
    }

    #[test]
    fn test_build_from_file_overrides_dimensions() {
        let path = temp_map_file("build", "12 11\n#\n");
        let config = GameConfig {
            world_type: WorldType::WithObstacles,
            map_file: Some(path.clone()),
            ..GameConfig::default()
        };
        let map = build_obstacles(&config, &mut StdRng::seed_from_u64(0));
        fs::remove_file(&path).unwrap();

        assert_eq!((map.width, map.height), (12, 11));
        assert_eq!(map.obstacle_count(), 1);
    }

    #[test]
    fn test_build_from_missing_file_is_empty() {
        let config = GameConfig {
            world_type: WorldType::WithObstacles,
            map_file: Some(PathBuf::from("/nonexistent/snake/map.txt")),
            ..GameConfig::default()
        };
        let map = build_obstacles(&config, &mut StdRng::seed_from_u64(0));

        assert_eq!(map, ObstacleMap::empty(40, 20));
    }

    #[test]
    fn test_build_from_oversized_file_is_empty() {
        let path = temp_map_file("oversized", "1100 1000\n#\n");
        let config = GameConfig {
            world_type: WorldType::WithObstacles,
            map_file: Some(path.clone()),
            ..GameConfig::default()
        };
        let map = build_obstacles(&config, &mut StdRng::seed_from_u64(0));
        fs::remove_file(&path).unwrap();

        assert_eq!(map, ObstacleMap::empty(40, 20));
    }
}
