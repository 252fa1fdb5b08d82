//! Console de texto: interpreta comandos do stdin e formata o estado do link.

use chrono::Local;
use ecu_core::config::ConfigError;
use ecu_core::{ConnectionConfigUpdate, LogEntry, TelemetrySnapshot};

/// Comando digitado pelo operador.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Connect,
    Disconnect,
    Send(String),
    Clear,
    Set(ConnectionConfigUpdate),
    Status,
    Help,
    Quit,
}

/// Erros de interpretação de uma linha do console.
#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    #[error("Comando desconhecido: {0} (digite 'help')")]
    Unknown(String),

    #[error("Uso: {0}")]
    Usage(&'static str),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub const HELP: &str = "\
  connect              conecta (zera tentativas)
  disconnect           desconecta manualmente
  send <texto>         envia comando ao ESP32
  clear                limpa o log
  set k=v ...          host, port, interval, max_attempts
  status               mostra estado e última leitura
  quit                 sai";

/// Interpreta uma linha. Linhas vazias retornam `None`.
pub fn parse_line(line: &str) -> Option<Result<ConsoleCommand, ConsoleError>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word.to_ascii_lowercase().as_str() {
        "connect" | "c" => Ok(ConsoleCommand::Connect),
        "disconnect" | "d" => Ok(ConsoleCommand::Disconnect),
        "send" | "s" if rest.is_empty() => Err(ConsoleError::Usage("send <texto>")),
        // Texto vai como digitado, sem normalizar
        "send" | "s" => Ok(ConsoleCommand::Send(rest.to_string())),
        "clear" => Ok(ConsoleCommand::Clear),
        "set" if rest.is_empty() => Err(ConsoleError::Usage("set chave=valor ...")),
        "set" => ConnectionConfigUpdate::parse_pairs(rest)
            .map(ConsoleCommand::Set)
            .map_err(ConsoleError::from),
        "status" => Ok(ConsoleCommand::Status),
        "help" | "?" => Ok(ConsoleCommand::Help),
        "quit" | "exit" | "q" => Ok(ConsoleCommand::Quit),
        other => Err(ConsoleError::Unknown(other.to_string())),
    };

    Some(command)
}

/// Entradas mais novas que `last_seen`, em ordem cronológica (mais antiga primeiro).
///
/// Se `last_seen` saiu do buffer (ou o log foi limpo), devolve o log inteiro.
pub fn unseen_entries<'a>(log: &'a [LogEntry], last_seen: Option<&LogEntry>) -> Vec<&'a LogEntry> {
    let fresh = match last_seen {
        Some(seen) => log
            .iter()
            .position(|e| e == seen)
            .unwrap_or(log.len()),
        None => log.len(),
    };
    log[..fresh].iter().rev().collect()
}

pub fn format_entry(entry: &LogEntry) -> String {
    format!(
        "[{}] {:<4} {}",
        entry.timestamp.with_timezone(&Local).format("%H:%M:%S"),
        entry.kind.label(),
        entry.message
    )
}

pub fn format_telemetry(t: &TelemetrySnapshot) -> String {
    let mut line = format!(
        "RPM {:>5.0} | MAP {:>5.2} | Alvo {:>5.2} | WG {:>5.1}% | TPS {:>5.1}% | Torque {:>5.0}",
        t.engine_rpm,
        t.map_pressure,
        t.target_boost,
        t.wastegate_position,
        t.tps_position,
        t.torque_request
    );
    if t.tcu_limp_mode {
        line.push_str(" | ⚠ LIMP");
    } else if t.tcu_protection_active {
        line.push_str(" | ⚠ PROTEÇÃO");
    }
    line
}
