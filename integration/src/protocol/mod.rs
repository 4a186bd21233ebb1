/// WebSocket transport glue over tokio-tungstenite.
pub mod websocket;
