use std::sync::Arc;

use log::{error, info};
use racing_server::assets::ModelLibrary;
use racing_server::net::{ServerContext, start_websocket_server};
use racing_server::physics::PhysicsWorld;
use racing_server::settings::{DEFAULT_CONFIG_FILE, Settings};
use racing_server::state::SharedGameState;
use tokio::sync::Mutex;
use tokio::time::{Duration, MissedTickBehavior, interval};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = match Settings::load(DEFAULT_CONFIG_FILE) {
        Ok(s) => s,
        Err(e) => {
            error!("{}", snafu::Report::from_error(e));
            std::process::exit(1);
        }
    };
    info!("Starting racing server at {} Hz", settings.tick_hz);

    let dt = settings.timestep();
    let ctx = ServerContext {
        state: Arc::new(Mutex::new(SharedGameState::new())),
        physics: Arc::new(Mutex::new(PhysicsWorld::new())),
        models: Arc::new(Mutex::new(ModelLibrary::new(
            settings.models_dir.clone(),
            settings.verify_models,
        ))),
        settings: Arc::new(settings),
    };

    tokio::spawn(start_websocket_server(ctx.clone()));

    let mut ticker = interval(Duration::from_secs_f32(dt));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let mut game = ctx.state.lock().await;
        let mut phys = ctx.physics.lock().await;

        game.apply_inputs(&mut phys);
        phys.step(dt);

        game.tick += 1;
        game.broadcast_snapshot(&phys);
    }
}
