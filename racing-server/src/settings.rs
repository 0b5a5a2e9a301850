use std::path::PathBuf;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use snafu::{ResultExt, Snafu, ensure};

use crate::vehicle::VehicleConfig;
use crate::wheel::WheelConfig;

pub const DEFAULT_CONFIG_FILE: &str = "racing-server";

#[derive(Debug, Snafu)]
#[snafu(context(suffix(Err)))]
pub enum SettingsError {
    #[snafu(display("Failed to read settings"))]
    Load { source: ConfigError },

    #[snafu(display("Tick rate must be between 1 and 1000 Hz, got {tick_hz}"))]
    TickRate { tick_hz: u32 },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bind_addr: String,
    pub tick_hz: u32,
    pub models_dir: PathBuf,
    pub verify_models: bool,
    pub vehicle: VehicleConfig,
    pub wheel: WheelConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:9001".to_string(),
            tick_hz: 60,
            models_dir: PathBuf::from("data/models"),
            verify_models: false,
            vehicle: VehicleConfig::default(),
            wheel: WheelConfig::default(),
        }
    }
}

impl Settings {
    /// Defaults, then `<file>.yaml` if present, then `RACING_*` variables
    /// (nested keys use `__`, e.g. `RACING_WHEEL__MASS`).
    pub fn load(file: &str) -> Result<Settings, SettingsError> {
        let config = Config::builder()
            .set_default("bind_addr", "0.0.0.0:9001")
            .context(LoadErr)?
            .set_default("tick_hz", 60)
            .context(LoadErr)?
            .add_source(File::with_name(file).required(false))
            .add_source(
                Environment::with_prefix("RACING")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context(LoadErr)?;

        let settings: Settings = config.try_deserialize().context(LoadErr)?;
        ensure!(
            (1..=1000).contains(&settings.tick_hz),
            TickRateErr {
                tick_hz: settings.tick_hz
            }
        );
        Ok(settings)
    }

    pub fn timestep(&self) -> f32 {
        1.0 / self.tick_hz as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("racing-settings-{}.yaml", uuid::Uuid::new_v4()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let settings = Settings::load("does-not-exist-racing-settings").unwrap();
        assert_eq!(settings.tick_hz, 60);
        assert_eq!(settings.wheel, WheelConfig::default());
        assert_eq!(settings.vehicle.wheels.len(), 4);
    }

    #[test]
    fn yaml_overrides_nested_values() {
        let path = temp_file(
            "tick_hz: 30\nwheel:\n  mass: 7.5\n  max_steer_rotation: 0.4\nvehicle:\n  max_wheel_speed: 12.0\n",
        );
        let settings = Settings::load(path.to_str().unwrap()).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(settings.tick_hz, 30);
        assert_eq!(settings.wheel.mass, 7.5);
        assert_eq!(settings.wheel.max_steer_rotation, 0.4);
        assert_eq!(settings.wheel.traction_acceleration, 150.0);
        assert_eq!(settings.vehicle.max_wheel_speed, 12.0);
        assert!((settings.timestep() - 1.0 / 30.0).abs() < 1e-6);
    }

    #[test]
    fn zero_tick_rate_is_rejected() {
        let path = temp_file("tick_hz: 0\n");
        let result = Settings::load(path.to_str().unwrap());
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(result, Err(SettingsError::TickRate { tick_hz: 0 })));
    }
}
