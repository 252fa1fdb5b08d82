//! # ECU Sender
//!
//! Simulador da ponte ESP32 para desenvolvimento sem o carro: serve o
//! WebSocket em `/ws`, responde `ping` com `pong` e envia telemetria
//! sintética em intervalo fixo.
//!
//! ## Uso
//! ```bash
//! ecu_sender          # usa [sender] do config.toml
//! ```

mod bridge;
mod engine;

use ecu_core::config::AppConfig;
use ecu_core::protocol::WS_PATH;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, warn};

fn main() -> ExitCode {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── Carregar config ──
    let config_path = AppConfig::default_path();
    let config = AppConfig::load(&config_path);

    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }
    for problem in config.validate() {
        warn!("Config: {problem}");
    }

    let sender_cfg = &config.sender;
    let addr = format!("{}:{}", sender_cfg.bind_ip, sender_cfg.port);
    let interval = Duration::from_millis(sender_cfg.interval_ms.max(1));

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!("Falha ao criar runtime tokio: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(async {
        let listener = bridge::bind(&addr).await?;

        // ── Banner ──
        println!();
        println!("══════════════════════════════════════════════");
        println!("   ⚡ ECU SENDER – SIMULADOR ESP32");
        println!("══════════════════════════════════════════════");
        println!("  Endpoint:  ws://{addr}{WS_PATH}");
        println!("  Intervalo: {} ms", interval.as_millis());
        println!("══════════════════════════════════════════════");
        println!();

        bridge::serve(listener, interval).await;
        Ok::<(), bridge::BridgeError>(())
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
