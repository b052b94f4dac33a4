use rapidwhisper_core::config::{self, AppConfig};

/// Run the setup command: create directories and a default config.
pub fn run_setup() -> anyhow::Result<()> {
    eprintln!("RapidWhisper Setup");
    eprintln!("==================\n");

    let config_dir = config::config_dir()?;
    let recordings_dir = config::recordings_dir();
    std::fs::create_dir_all(&config_dir)?;
    std::fs::create_dir_all(&recordings_dir)?;

    let config_path = config::config_path()?;
    if !config_path.exists() {
        let cfg = AppConfig::default();
        config::save_config(&cfg)?;
        eprintln!("Created config at {}", config_path.display());
    } else {
        eprintln!("Config already exists at {}", config_path.display());
    }

    eprintln!("Recordings will be written to {}", recordings_dir.display());
    eprintln!("Statistics live in {}", config_dir.join("statistics.json").display());
    eprintln!("\nAdd your API key to the config (or set OPENAI_API_KEY / GROQ_API_KEY /");
    eprintln!("GLM_API_KEY / ZAI_API_KEY), then run: rapidwhisper");

    Ok(())
}
