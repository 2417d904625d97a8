use vatflow::config::Config;
use vatflow::RunError;

fn main() -> Result<(), RunError> {
    env_logger::init();

    // Optional JSON config path as the first argument.
    let config = match std::env::args().nth(1) {
        Some(path) => {
            log::info!("loading config from {}", path);
            Config::load(&path)?
        }
        None => Config::default(),
    };

    vatflow::app::run(config)
}
