use serde::Deserialize;
use std::fs;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub world: WorldConfig,
    #[serde(default)]
    pub actors: ActorsConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
}

#[derive(Debug, Deserialize)]
pub struct WorldConfig {
    #[serde(default = "default_size_x")]
    pub size_x: i32,
    #[serde(default = "default_size_y")]
    pub size_y: i32,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: i32,
    #[serde(default = "default_subdivisions")]
    pub subdivisions: i32,
}

#[derive(Debug, Deserialize)]
pub struct ActorsConfig {
    #[serde(default = "default_actor_speed")]
    pub default_speed: f32,
    #[serde(default = "default_rotation_speed")]
    pub rotation_speed: f32,
    #[serde(default = "default_bot_count")]
    pub bot_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_tick_seconds")]
    pub tick_seconds: f32,
    #[serde(default = "default_tick_count")]
    pub tick_count: u32,
    #[serde(default = "default_low_update_period")]
    pub low_update_period: f32,
    #[serde(default = "default_high_update_period")]
    pub high_update_period: f32,
    #[serde(default = "default_temperature_effect_power")]
    pub temperature_effect_power: f32,
}

#[derive(Debug, Deserialize)]
pub struct LayoutConfig {
    #[serde(default)]
    pub path: Option<String>,
}

// Default values
fn default_size_x() -> i32 { 20 }
fn default_size_y() -> i32 { 20 }
fn default_chunk_size() -> i32 { 16 }
fn default_subdivisions() -> i32 { 4 }
fn default_actor_speed() -> f32 { 1.0 }
fn default_rotation_speed() -> f32 { 4.0 }
fn default_bot_count() -> usize { 3 }
fn default_tick_seconds() -> f32 { 0.1 }
fn default_tick_count() -> u32 { 600 }
fn default_low_update_period() -> f32 { 1.0 }
fn default_high_update_period() -> f32 { 0.1 }
fn default_temperature_effect_power() -> f32 { 0.2 }

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            size_x: default_size_x(),
            size_y: default_size_y(),
            chunk_size: default_chunk_size(),
            subdivisions: default_subdivisions(),
        }
    }
}

impl Default for ActorsConfig {
    fn default() -> Self {
        Self {
            default_speed: default_actor_speed(),
            rotation_speed: default_rotation_speed(),
            bot_count: default_bot_count(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_seconds: default_tick_seconds(),
            tick_count: default_tick_count(),
            low_update_period: default_low_update_period(),
            high_update_period: default_high_update_period(),
            temperature_effect_power: default_temperature_effect_power(),
        }
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self { path: None }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            world: WorldConfig::default(),
            actors: ActorsConfig::default(),
            simulation: SimulationConfig::default(),
            layout: LayoutConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file, or use defaults if file doesn't exist
    pub fn load() -> Self {
        match fs::read_to_string("config.toml") {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    log::info!("loaded configuration from config.toml");
                    config
                }
                Err(e) => {
                    log::warn!("failed to parse config.toml: {}, using defaults", e);
                    Config::default()
                }
            },
            Err(_) => {
                log::info!("no config.toml found, using default configuration");
                Config::default()
            }
        }
    }
}
