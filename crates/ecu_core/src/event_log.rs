//! Log de eventos circular, mais novo primeiro.

use crate::types::{LogEntry, LogKind};
use std::collections::VecDeque;
use tracing::{debug, error, info, warn};

/// Capacidade fixa do log.
pub const LOG_CAPACITY: usize = 100;

/// Buffer limitado de [`LogEntry`]; índice 0 é sempre a entrada mais recente.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    entries: VecDeque<LogEntry>,
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(LOG_CAPACITY),
        }
    }

    /// Insere no topo e descarta a entrada mais antiga se passar da capacidade.
    pub fn append(&mut self, message: impl Into<String>, kind: LogKind) {
        let entry = LogEntry::new(message, kind);
        match kind {
            LogKind::Info => debug!("[log] {}", entry.message),
            LogKind::Success => info!("[log] {}", entry.message),
            LogKind::Warning => warn!("[log] {}", entry.message),
            LogKind::Error => error!("[log] {}", entry.message),
        }

        self.entries.push_front(entry);
        self.entries.truncate(LOG_CAPACITY);
    }

    /// Esvazia o log e registra o aviso de limpeza.
    pub fn clear(&mut self) {
        self.entries = VecDeque::with_capacity(LOG_CAPACITY);
        self.append("Log cleared", LogKind::Info);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn latest(&self) -> Option<&LogEntry> {
        self.entries.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    /// Cópia completa do buffer, na ordem mais novo → mais antigo.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }
}
