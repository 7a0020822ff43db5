// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subscriber connection handling.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tm_core::{ConnectionId, Envelope, IdGen};
use tm_engine::{ChannelListener, Emit, Emitter, FanOut};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::protocol::{self, ClientMessage, ProtocolError};

/// Errors that end a connection early
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("no handshake within {0:?}")]
    HandshakeTimeout(Duration),
}

/// What every connection task shares
pub struct ServerContext<I> {
    pub fanout: FanOut,
    pub emitter: Emitter,
    pub ids: I,
    pub handshake_timeout: Duration,
    /// Pending outbound lines per connection
    pub outbound_queue: usize,
}

/// Serve one subscriber until it disconnects
///
/// The connection is subscribed under its handshake key only after the
/// ack is written, so the ack is always its first line. It is unsubscribed
/// however the connection ends.
pub async fn handle_connection<S, I>(ctx: Arc<ServerContext<I>>, stream: S) -> Result<(), ServerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    I: IdGen,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut lines = BufReader::new(reader).lines();

    let handshake = match protocol::read_line(&mut lines, Some(ctx.handshake_timeout)).await {
        Ok(line) => line,
        Err(ProtocolError::Timeout) => {
            warn!(timeout = ?ctx.handshake_timeout, "handshake timeout");
            return Err(ServerError::HandshakeTimeout(ctx.handshake_timeout));
        }
        Err(ProtocolError::ConnectionClosed) => {
            debug!("client disconnected before handshake");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let key = match protocol::parse_handshake(&handshake) {
        Ok(key) => key,
        Err(reasons) => {
            info!(?reasons, "handshake rejected");
            protocol::write_envelope(&mut writer, &Envelope::handshake_rejected(reasons)).await?;
            return Ok(());
        }
    };
    protocol::write_envelope(&mut writer, &Envelope::handshake_ok()).await?;

    let id = ctx.ids.next();
    let (tx, mut outbound) = mpsc::channel(ctx.outbound_queue.max(1));
    ctx.fanout
        .subscribe(id.clone(), key.clone(), Arc::new(ChannelListener::new(tx)));
    info!(connection = %id, %key, "subscriber connected");

    let result = serve(&ctx, &id, &mut lines, &mut writer, &mut outbound).await;

    ctx.fanout.unsubscribe(&id);
    info!(connection = %id, %key, "subscriber disconnected");
    match result {
        Err(ServerError::Protocol(ProtocolError::ConnectionClosed)) => Ok(()),
        other => other,
    }
}

async fn serve<R, W, I>(
    ctx: &ServerContext<I>,
    id: &ConnectionId,
    lines: &mut tokio::io::Lines<R>,
    writer: &mut W,
    outbound: &mut mpsc::Receiver<String>,
) -> Result<(), ServerError>
where
    R: tokio::io::AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            line = protocol::read_line(lines, None) => {
                let reply = handle_message(ctx, id, &line?);
                protocol::write_envelope(writer, &reply).await?;
            }
            event = outbound.recv() => match event {
                Some(event) => protocol::write_line(writer, &event).await?,
                // The fan-out dropped this listener
                None => {
                    warn!(connection = %id, "subscriber fell behind, closing");
                    return Ok(());
                }
            },
        }
    }
}

/// Handle one post-handshake line and build its reply
fn handle_message<I>(ctx: &ServerContext<I>, id: &ConnectionId, line: &str) -> Envelope {
    match protocol::parse_message(line) {
        Ok(ClientMessage::Produce { topic, key, value }) => {
            if topic.trim().is_empty() {
                return produce_ack(vec!["topic is required".to_string()]);
            }
            debug!(connection = %id, %topic, "produce queued");
            ctx.emitter.emit(Emit { topic, key, value });
            produce_ack(Vec::new())
        }
        Err(e) => {
            warn!(connection = %id, error = %e, "unrecognized message");
            produce_ack(vec![format!("unrecognized message: {}", e)])
        }
    }
}

fn produce_ack(reasons: Vec<String>) -> Envelope {
    Envelope::ProduceAck {
        ok: reasons.is_empty(),
        reasons,
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
