//! Configuração unificada via TOML.
//!
//! Um único `config.toml` ao lado do executável serve ao receiver
//! (`[connection]`, `[alerts]`) e ao simulador (`[sender]`).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Erros de leitura/escrita/edição da configuração.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Erro de I/O em {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Erro ao serializar TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Par inválido '{0}' (esperado chave=valor)")]
    MalformedPair(String),

    #[error("Chave desconhecida: {0}")]
    UnknownKey(String),

    #[error("Valor inválido para {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Parâmetros da conexão com a ponte ESP32.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// IP/hostname do ESP32 (AP padrão: 192.168.4.1)
    pub host: String,
    /// Porta HTTP do ESP32
    pub port: u16,
    /// Espera entre tentativas de reconexão (ms)
    pub reconnect_interval_ms: u64,
    /// Tentativas de reconexão antes de desistir
    pub max_reconnect_attempts: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "192.168.4.1".into(),
            port: 80,
            reconnect_interval_ms: 3000,
            max_reconnect_attempts: 10,
        }
    }
}

impl ConnectionConfig {
    /// Valida a configuração e retorna lista de erros.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.host.trim().is_empty() {
            errors.push("Host do ESP32 não pode ser vazio".into());
        }
        if self.port == 0 {
            errors.push("Porta do ESP32 não pode ser 0".into());
        }
        if self.reconnect_interval_ms == 0 {
            errors.push("Intervalo de reconexão deve ser > 0 ms".into());
        }

        errors
    }
}

/// Atualização parcial de [`ConnectionConfig`]; `None` mantém o valor atual.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfigUpdate {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub reconnect_interval_ms: Option<u64>,
    pub max_reconnect_attempts: Option<u32>,
}

impl ConnectionConfigUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Merge raso sobre `base`.
    pub fn merged_into(&self, base: &ConnectionConfig) -> ConnectionConfig {
        ConnectionConfig {
            host: self.host.clone().unwrap_or_else(|| base.host.clone()),
            port: self.port.unwrap_or(base.port),
            reconnect_interval_ms: self
                .reconnect_interval_ms
                .unwrap_or(base.reconnect_interval_ms),
            max_reconnect_attempts: self
                .max_reconnect_attempts
                .unwrap_or(base.max_reconnect_attempts),
        }
    }

    /// Lê pares `chave=valor` separados por espaço, ex.: `host=10.0.0.7 port=81`.
    ///
    /// Chaves aceitas: `host`, `port`, `interval`, `max_attempts`.
    pub fn parse_pairs(input: &str) -> Result<Self, ConfigError> {
        let mut update = Self::default();

        for pair in input.split_whitespace() {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| ConfigError::MalformedPair(pair.into()))?;
            let invalid = || ConfigError::InvalidValue {
                key: key.into(),
                value: value.into(),
            };

            match key {
                "host" => update.host = Some(value.into()),
                "port" => update.port = Some(value.parse().map_err(|_| invalid())?),
                "interval" => {
                    update.reconnect_interval_ms = Some(value.parse().map_err(|_| invalid())?)
                }
                "max_attempts" => {
                    update.max_reconnect_attempts = Some(value.parse().map_err(|_| invalid())?)
                }
                other => return Err(ConfigError::UnknownKey(other.into())),
            }
        }

        Ok(update)
    }
}

/// Limites de alerta aplicados a cada snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    /// RPM acima da qual o log registra aviso
    pub high_rpm: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self { high_rpm: 6000.0 }
    }
}

/// Configuração do simulador de ponte ESP32.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    /// IP local para bind
    pub bind_ip: String,
    /// Porta do servidor WebSocket
    pub port: u16,
    /// Intervalo entre frames de telemetria (ms)
    pub interval_ms: u64,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            bind_ip: "127.0.0.1".into(),
            port: 8080,
            interval_ms: 100,
        }
    }
}

/// Configuração raiz do aplicativo.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub connection: ConnectionConfig,
    pub alerts: AlertThresholds,
    pub sender: SenderConfig,
}

impl AppConfig {
    /// Carrega configuração de um arquivo TOML, caindo no padrão em caso de erro.
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match toml::from_str::<AppConfig>(&content) {
                    Ok(config) => {
                        info!("Configuração carregada de {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        warn!("Erro ao parsear {}: {}", path.display(), e);
                    }
                },
                Err(e) => {
                    warn!("Erro ao ler {}: {}", path.display(), e);
                }
            }
        }

        info!("Usando configuração padrão");
        AppConfig::default()
    }

    /// Salva configuração em arquivo TOML.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Retorna o caminho padrão do config.toml.
    pub fn default_path() -> PathBuf {
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("config.toml")
    }

    /// Valida a configuração e retorna lista de erros.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = self.connection.validate();

        if !self.alerts.high_rpm.is_finite() || self.alerts.high_rpm <= 0.0 {
            errors.push(format!("Limite de RPM inválido: {}", self.alerts.high_rpm));
        }
        if self.sender.port == 0 {
            errors.push("Porta do sender não pode ser 0".into());
        }
        if self.sender.interval_ms == 0 || self.sender.interval_ms > 60_000 {
            errors.push(format!(
                "Intervalo do sender inválido: {} ms (1–60000)",
                self.sender.interval_ms
            ));
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        let errors = config.validate();
        assert!(errors.is_empty(), "Erros: {:?}", errors);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let partial = r#"
[connection]
host = "10.0.0.7"
"#;
        let config: AppConfig = toml::from_str(partial).unwrap();
        assert_eq!(config.connection.host, "10.0.0.7");
        assert_eq!(config.connection.port, 80);
        assert_eq!(config.connection.reconnect_interval_ms, 3000);
        assert_eq!(config.alerts.high_rpm, 6000.0);
    }

    #[test]
    fn save_then_load_from_disk() {
        let path = std::env::temp_dir().join(format!("ecu_link_cfg_{}.toml", std::process::id()));
        let mut config = AppConfig::default();
        config.connection.max_reconnect_attempts = 3;
        config.save(&path).unwrap();
        let loaded = AppConfig::load(&path);
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn update_merges_only_given_fields() {
        let base = ConnectionConfig::default();
        let update = ConnectionConfigUpdate {
            port: Some(81),
            ..Default::default()
        };
        let merged = update.merged_into(&base);
        assert_eq!(merged.port, 81);
        assert_eq!(merged.host, base.host);
        assert_eq!(merged.max_reconnect_attempts, base.max_reconnect_attempts);
    }

    #[test]
    fn parse_pairs_reads_console_syntax() {
        let update = ConnectionConfigUpdate::parse_pairs("host=10.0.0.9 interval=500").unwrap();
        assert_eq!(update.host.as_deref(), Some("10.0.0.9"));
        assert_eq!(update.reconnect_interval_ms, Some(500));
        assert_eq!(update.port, None);

        assert!(matches!(
            ConnectionConfigUpdate::parse_pairs("port=abc"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            ConnectionConfigUpdate::parse_pairs("speed=1"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(matches!(
            ConnectionConfigUpdate::parse_pairs("host"),
            Err(ConfigError::MalformedPair(_))
        ));
    }

    #[test]
    fn zero_interval_is_invalid() {
        let config = ConnectionConfig {
            reconnect_interval_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.validate().len(), 1);
    }
}
