//! Realtime detection channel.
//!
//! Each connection runs a reader and a worker joined on one task. The reader
//! decodes text frames into a depth-one queue; the worker runs the pipeline
//! on each frame in order and writes one JSON result per frame. A frame that
//! is not base64 is queued as an error and stops the reader; the worker
//! closes the connection with 1011 once every earlier frame has its result.

use crate::http::AppState;
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use vipwatch_core::{DetectionPipeline, Frame, FrameError};

/// Frames waiting behind the one being processed.
const FRAME_QUEUE_DEPTH: usize = 1;

type QueuedFrame = Result<Frame, FrameError>;

#[derive(Error, Debug)]
enum ChannelError {
    #[error("undecodable frame: {0}")]
    Frame(#[from] FrameError),
    #[error("receive failed: {0}")]
    Receive(axum::Error),
    #[error("send failed: {0}")]
    Send(axum::Error),
    #[error("result encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

pub async fn live_detection(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| run_channel(socket, state.pipeline))
}

async fn run_channel(socket: WebSocket, pipeline: Arc<DetectionPipeline>) {
    let conn = uuid::Uuid::new_v4();
    tracing::info!(%conn, "live client connected");

    let (mut sink, mut stream) = socket.split();
    let (tx, rx) = mpsc::channel::<QueuedFrame>(FRAME_QUEUE_DEPTH);

    let outcome = tokio::try_join!(
        read_frames(&mut stream, tx),
        deliver_results(&pipeline, rx, &mut sink),
    );

    match outcome {
        Ok(((), delivered)) => {
            tracing::info!(%conn, delivered, "live client disconnected");
        }
        Err(err @ (ChannelError::Receive(_) | ChannelError::Send(_))) => {
            tracing::info!(%conn, reason = %err, "live client dropped");
        }
        Err(err) => {
            tracing::warn!(%conn, error = %err, "closing live channel");
            let close = Message::Close(Some(CloseFrame {
                code: close_code::ERROR,
                reason: "frame rejected".into(),
            }));
            if let Err(e) = sink.send(close).await {
                tracing::debug!(%conn, error = %e, "close frame not delivered");
            }
        }
    }
}

async fn read_frames(
    stream: &mut SplitStream<WebSocket>,
    tx: mpsc::Sender<QueuedFrame>,
) -> Result<(), ChannelError> {
    while let Some(msg) = stream.next().await {
        match msg.map_err(ChannelError::Receive)? {
            Message::Text(text) => {
                let frame = Frame::from_wire(&text);
                let rejected = frame.is_err();
                if tx.send(frame).await.is_err() || rejected {
                    break;
                }
            }
            Message::Binary(bytes) => {
                tracing::warn!(len = bytes.len(), "binary frame ignored; send base64 text");
            }
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }
    Ok(())
}

async fn deliver_results(
    pipeline: &DetectionPipeline,
    mut rx: mpsc::Receiver<QueuedFrame>,
    sink: &mut SplitSink<WebSocket, Message>,
) -> Result<u64, ChannelError> {
    let mut delivered = 0;
    while let Some(queued) = rx.recv().await {
        let frame = queued?;
        let result = pipeline.process(&frame).await;
        let json = serde_json::to_string(&result)?;
        sink.send(Message::Text(json)).await.map_err(ChannelError::Send)?;
        delivered += 1;
    }
    Ok(delivered)
}
