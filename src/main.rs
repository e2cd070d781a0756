use tracing::{error, info, warn};

use chrollo::notify::Notification;
use chrollo::{
    notification_channel, ApiOptions, Config, Notifier, PluginChain, ScriptEngine, ScriptLoader,
};

fn main() {
    // Load configuration
    let config = match Config::load_with_env("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = chrollo::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        chrollo::logging::init_console_only(&config.logging.level);
    }

    info!("Chrollo - scriptable STOMP interception engine");

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {e}");
        std::process::exit(1);
    }

    // Protocol plugin
    let mut plugins = PluginChain::with_builtins();
    if let Err(e) = plugins.activate(config.plugins.active.as_deref()) {
        error!("{e}");
        std::process::exit(1);
    }
    let available: Vec<String> = plugins.available().into_iter().map(|p| p.id).collect();
    info!(
        active = plugins.active_id().unwrap_or("none"),
        available = ?available,
        "Protocol plugins ready"
    );

    // Scripts
    let loader = ScriptLoader::new(&config.scripting.scripts_dir);
    let scan = loader.scan();
    for (path, e) in &scan.errors {
        warn!(path = %path, "Failed to read script: {e}");
    }

    let (tx, rx) = notification_channel();
    let options = ApiOptions {
        test_api: config.scripting.test_api,
        ..ApiOptions::default()
    };
    let mut engine =
        match ScriptEngine::with_options(config.scripting.limits(), options, Notifier::new(tx)) {
            Ok(engine) => engine,
            Err(e) => {
                error!("Failed to create script engine: {e}");
                std::process::exit(1);
            }
        };

    if let Err(e) = engine.sync_scripts(&scan.scripts) {
        error!("Failed to load scripts: {e}");
        std::process::exit(1);
    }

    info!(
        dir = %loader.scripts_dir().display(),
        found = scan.scripts.len(),
        enabled = scan.enabled().count(),
        state = ?engine.state(),
        "Scripts loaded"
    );
    if let Some(e) = engine.script_error() {
        warn!("First script error: {e}");
    }

    for notification in rx.drain() {
        if let Notification::Console { level, message } = notification {
            info!(target: "chrollo::console", level = level.as_str(), "{}", message);
        }
    }

    engine.dispose();
}
