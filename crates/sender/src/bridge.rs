//! Servidor WebSocket que imita a ponte ESP32.

use crate::engine::EngineModel;
use chrono::Utc;
use ecu_core::protocol::{KEEPALIVE_PING, KEEPALIVE_PONG, WS_PATH, encode_snapshot};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Falha ao escutar em {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

pub async fn bind(addr: &str) -> Result<TcpListener, BridgeError> {
    TcpListener::bind(addr).await.map_err(|source| BridgeError::Bind {
        addr: addr.to_string(),
        source,
    })
}

/// Pausa após um accept falho (ex.: EMFILE) para não girar em vazio.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Aceita clientes para sempre; cada um ganha sua task e seu próprio motor.
pub async fn serve(listener: TcpListener, interval: Duration) {
    loop {
        match admit(listener.accept().await) {
            Some((stream, peer)) => {
                tokio::spawn(handle_client(stream, peer, interval));
            }
            None => tokio::time::sleep(ACCEPT_BACKOFF).await,
        }
    }
}

/// Erros de accept são transitórios: loga e segue escutando.
fn admit(
    accepted: std::io::Result<(TcpStream, SocketAddr)>,
) -> Option<(TcpStream, SocketAddr)> {
    match accepted {
        Ok(client) => Some(client),
        Err(e) => {
            warn!("Falha ao aceitar conexão: {e}");
            None
        }
    }
}

/// Só aceita o upgrade no caminho da ponte.
fn check_path(request: &Request, response: Response) -> Result<Response, ErrorResponse> {
    if request.uri().path() == WS_PATH {
        return Ok(response);
    }
    let mut refused = ErrorResponse::new(Some(format!("use {WS_PATH}")));
    *refused.status_mut() = StatusCode::NOT_FOUND;
    Err(refused)
}

async fn handle_client(stream: TcpStream, peer: SocketAddr, interval: Duration) {
    let ws = match accept_hdr_async(stream, check_path).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("Handshake recusado para {peer}: {e}");
            return;
        }
    };
    info!("Cliente conectado: {peer}");

    let (mut sink, mut stream) = ws.split();
    let mut engine = EngineModel::new();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let snapshot = engine.next_snapshot(Utc::now());
                if let Err(e) = sink.send(Message::Text(encode_snapshot(&snapshot))).await {
                    debug!("Envio para {peer} falhou: {e}");
                    break;
                }
            }
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) if text == KEEPALIVE_PING => {
                    debug!("ping de {peer}");
                    if sink.send(Message::Text(KEEPALIVE_PONG.into())).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Text(text))) => info!("Comando de {peer}: {text}"),
                Some(Ok(Message::Close(frame))) => {
                    match frame {
                        Some(f) => info!("{peer} fechou ({}): {}", u16::from(f.code), f.reason),
                        None => info!("{peer} fechou"),
                    }
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Erro no socket de {peer}: {e}");
                    break;
                }
                None => break,
            },
        }
    }

    info!("Cliente desconectado: {peer}");
}
