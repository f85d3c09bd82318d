//! Push channel: every dashboard session gets the current reading on connect, then each new
//! reading as a `sensor_data` event. Delivery is best effort.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{Sink, SinkExt, StreamExt};
use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

use crate::server::AppState;
use crate::telemetry::publisher::Publisher;
use crate::telemetry::reading::Reading;

pub const SENSOR_DATA_EVENT: &str = "sensor_data";

#[derive(Debug, Serialize)]
struct PushEvent<'a> {
    event: &'static str,
    data: &'a Reading,
}

pub fn encode_sensor_data(reading: &Reading) -> Result<String, serde_json::Error> {
    serde_json::to_string(&PushEvent { event: SENSOR_DATA_EVENT, data: reading })
}

/// GET /ws
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| push_session(socket, state.publisher))
}

// Err means the session is gone
async fn send_reading<S>(sink: &mut S, reading: &Reading) -> Result<(), ()>
where
    S: Sink<Message> + Unpin,
{
    let text = match encode_sensor_data(reading) {
        Ok(text) => text,
        Err(err) => {
            warn!("Failed to encode reading: {}", err);
            return Ok(());
        },
    };

    sink.send(Message::Text(text)).await.map_err(|_| ())
}

async fn push_session(socket: WebSocket, publisher: Publisher) {
    // subscribe before taking the snapshot so no reading falls in between
    let mut updates = publisher.subscribe();
    let (mut sender, mut receiver) = socket.split();
    info!("Web client connected");

    if send_reading(&mut sender, &publisher.snapshot()).await.is_ok() {
        'mainloop: loop {
            tokio::select! {
                update = updates.recv() => match update {
                    Ok(reading) => {
                        if send_reading(&mut sender, &reading).await.is_err() {
                            break 'mainloop;
                        }
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("Web client lagged, skipped {} readings", skipped);
                    },
                    Err(RecvError::Closed) => break 'mainloop,
                },
                message = receiver.next() => match message {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break 'mainloop,
                    Some(Ok(_)) => {},
                },
            }
        }
    }

    info!("Web client disconnected");
}
