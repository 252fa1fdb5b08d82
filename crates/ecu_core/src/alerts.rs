//! Classificação de um snapshot contra os limites de segurança.

use crate::config::AlertThresholds;
use crate::types::{LogKind, TelemetrySnapshot};

/// Um alerta disparado, pronto para entrar no log.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub metric: &'static str,
    pub kind: LogKind,
    pub message: String,
}

/// Avalia um snapshot e retorna de 0 a 2 alertas, nesta ordem:
/// estado da TCU (limp mode tem precedência sobre proteção) e depois RPM alta.
pub fn evaluate_alerts(snapshot: &TelemetrySnapshot, thresholds: &AlertThresholds) -> Vec<Alert> {
    let mut alerts = Vec::with_capacity(2);

    if snapshot.tcu_limp_mode {
        alerts.push(Alert {
            metric: "tcu_limp_mode",
            kind: LogKind::Error,
            message: "TCU LIMP MODE ACTIVE!".into(),
        });
    } else if snapshot.tcu_protection_active {
        alerts.push(Alert {
            metric: "tcu_protection",
            kind: LogKind::Warning,
            message: "TCU Protection Active".into(),
        });
    }

    if snapshot.engine_rpm > thresholds.high_rpm {
        alerts.push(Alert {
            metric: "engine_rpm",
            kind: LogKind::Warning,
            message: format!("High RPM: {:.0}", snapshot.engine_rpm.round()),
        });
    }

    alerts
}
