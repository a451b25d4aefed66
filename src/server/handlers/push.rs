use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::Extension;
use axum::response::Response;
use futures::{SinkExt, StreamExt};

use crate::auth::User;
use crate::notify::Hub;

/// Idle sockets are dropped once no frame (pings included) arrives for this long.
const READ_DEADLINE: Duration = Duration::from_secs(30);

pub async fn subscribe(
    Extension(hub): Extension<Arc<Hub>>,
    user: User,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| relay(socket, hub, user.id))
}

#[tracing::instrument(skip(socket, hub))]
async fn relay(socket: WebSocket, hub: Arc<Hub>, identity: String) {
    let (channel, receiver) = Hub::channel();
    let registration = hub.register(&identity, channel).await;

    let (mut sink, mut stream) = socket.split();

    let mut forward = tokio::spawn(async move {
        while let Ok(message) = receiver.recv().await {
            if sink.send(Message::Text(message)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    loop {
        tokio::select! {
            _ = &mut forward => break,
            frame = tokio::time::timeout(READ_DEADLINE, stream.next()) => match frame {
                Ok(Some(Ok(Message::Close(_)))) | Ok(Some(Err(_))) | Ok(None) => break,
                Ok(Some(Ok(_))) => {}
                Err(_) => {
                    tracing::info!("read deadline passed, closing socket");
                    break;
                }
            },
        }
    }

    forward.abort();
    hub.unregister_if_current(&identity, registration).await;
}
