use crate::controller::ControllerHandle;
use anyhow::{Context, Result};
use flowfold_core::Msg;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

type Conn = Framed<UnixStream, LengthDelimitedCodec>;

pub async fn run(sock_path: &str, controller: ControllerHandle) -> Result<()> {
    // Clean stale socket
    let _ = std::fs::remove_file(sock_path);
    let listener =
        UnixListener::bind(sock_path).with_context(|| format!("bind UDS {sock_path}"))?;
    tracing::info!(socket = sock_path, "flowfold-agent listening");
    serve(listener, controller).await
}

pub async fn serve(listener: UnixListener, controller: ControllerHandle) -> Result<()> {
    loop {
        let (stream, _addr) = listener.accept().await?;
        tracing::info!("renderer connected");
        let controller = controller.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream, controller).await {
                tracing::warn!(error = ?err, "renderer connection closed with error");
            } else {
                tracing::info!("renderer disconnected");
            }
        });
    }
}

async fn handle_connection(stream: UnixStream, controller: ControllerHandle) -> Result<()> {
    let mut framed = Framed::new(stream, LengthDelimitedCodec::new());
    // Subscribe before the snapshot so no transition falls in between.
    let mut bus = controller.subscribe();

    // Expect Hello, then send ours and the current frame
    match framed.next().await {
        Some(frame) => {
            let msg: Msg = serde_json::from_slice(&frame?).context("decode handshake")?;
            if !matches!(msg, Msg::Hello { .. }) {
                tracing::warn!("renderer skipped hello");
            }
            if let Some(reply) = controller.request(msg).await? {
                send(&mut framed, &reply).await?;
            }
        }
        None => return Ok(()),
    }
    send_snapshot(&mut framed, &controller).await?;

    loop {
        tokio::select! {
            frame = framed.next() => {
                let Some(frame) = frame else { break };
                let bytes = frame?;
                let reply = match serde_json::from_slice::<Msg>(&bytes) {
                    Ok(msg) => controller.request(msg).await?,
                    Err(e) => Some(Msg::Rejected {
                        error: format!("decode error: {e}"),
                    }),
                };
                if let Some(reply) = reply {
                    send(&mut framed, &reply).await?;
                }
            }
            event = bus.recv() => match event {
                Ok(msg) => send(&mut framed, &msg).await?,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "renderer lagging; resending snapshot");
                    send_snapshot(&mut framed, &controller).await?;
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}

async fn send_snapshot(framed: &mut Conn, controller: &ControllerHandle) -> Result<()> {
    if let Some(snapshot) = controller.request(Msg::RequestSnapshot).await? {
        send(framed, &snapshot).await?;
    }
    Ok(())
}

async fn send(framed: &mut Conn, msg: &Msg) -> Result<()> {
    framed
        .send(tokio_util::bytes::Bytes::from(serde_json::to_vec(msg)?))
        .await?;
    Ok(())
}
