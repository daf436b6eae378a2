use std::io;

use ai_chat::logging::init_file_logging;
use ai_chat::providers::backend_from_env;
use ai_chat::{prewarm_highlighting, AppConfig, EnvConfig, Repl};
use chat_session::{Session, DEFAULT_SYSTEM_INSTRUCTION};
use history_store::HistoryStore;

fn main() -> io::Result<()> {
    let prewarm = std::thread::Builder::new()
        .name("markdown-highlight-prewarm".to_string())
        .spawn(prewarm_highlighting);

    let env = EnvConfig::from_env();
    let config_path = AppConfig::default_path();
    let config = config_path
        .as_deref()
        .map(AppConfig::load_or_default)
        .unwrap_or_default();

    let log_path = config.log_path();
    if let Err(error) = init_file_logging(&log_path, env.log_filter.as_deref()) {
        eprintln!("Logging disabled ({}): {error}", log_path.display());
    }
    tracing::info!("application started");
    if let Err(error) = prewarm {
        tracing::warn!(%error, "failed to spawn highlight prewarm thread");
    }

    let backend = backend_from_env(&env).map_err(io::Error::other)?;
    let mut session = Session::new(backend, DEFAULT_SYSTEM_INSTRUCTION);
    if let Some(model) = env.model.clone().or_else(|| config.model.clone()) {
        session = session.with_model(model);
    }

    let store = match HistoryStore::open_default() {
        Ok(store) => Some(store),
        Err(error) => {
            tracing::warn!(%error, "history storage unavailable");
            None
        }
    };

    let mut repl = Repl::new(session, config, store)?;
    repl.run(io::stdin().lock())?;

    let config = repl.into_config();
    if let Some(path) = config_path {
        match config.save(&path) {
            Ok(()) => tracing::info!(path = %path.display(), "configuration saved"),
            Err(error) => tracing::warn!(path = %path.display(), %error, "failed to save configuration"),
        }
    }
    tracing::info!("application exiting");
    Ok(())
}
