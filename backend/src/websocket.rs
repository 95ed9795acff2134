use crate::error::{AppError, AppResult};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::RwLock;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Channel carrying listing activity for every client
pub const MARKETPLACE_CHANNEL: &str = "marketplace";

pub fn user_channel(username: &str) -> String {
    format!("user:{}", username)
}

/// Wallet channels are case-insensitive
pub fn wallet_channel(wallet: &str) -> String {
    format!("wallet:{}", wallet.to_lowercase())
}

/// WebSocket message types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum WsMessage {
    #[serde(rename = "subscribe")]
    Subscribe {
        channel: String, // "user:{username}", "wallet:{address}", "marketplace"
    },
    #[serde(rename = "unsubscribe")]
    Unsubscribe { channel: String },
    #[serde(rename = "activity_logged")]
    ActivityLogged {
        activity_id: String,
        user: String,
        activity_type: String,
        predicted_emission: f64,
        is_offset: bool,
    },
    #[serde(rename = "credit_minted")]
    CreditMinted {
        activity_id: String,
        user: String,
        wallet: String,
        token_id: Option<u64>,
        co2_grams: u64,
        transaction_hash: String,
    },
    #[serde(rename = "listing_created")]
    ListingCreated {
        listing_id: String,
        token_id: i64,
        seller: String,
        price_eth: f64,
    },
    #[serde(rename = "listing_sold")]
    ListingSold {
        listing_id: String,
        token_id: i64,
        buyer: String,
        seller_wallet: String,
        buyer_wallet: String,
        transaction_hash: String,
    },
    #[serde(rename = "error")]
    Error { message: String },
}

/// A message addressed to one channel
#[derive(Debug, Clone)]
struct Envelope {
    channel: String,
    message: WsMessage,
}

/// WebSocket server for real-time updates
pub struct WebSocketServer {
    /// Broadcast sender for sending messages to all clients
    tx: broadcast::Sender<Envelope>,
    /// Active subscriptions: channel -> set of client IDs
    subscriptions: Arc<RwLock<HashMap<String, Vec<Uuid>>>>,
    /// Client subscriptions: client_id -> set of channels
    client_channels: Arc<RwLock<HashMap<Uuid, Vec<String>>>>,
}

impl WebSocketServer {
    /// Create a new WebSocket server
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1000); // Buffer up to 1000 messages

        Self {
            tx,
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            client_channels: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Broadcast a message to all subscribers of a channel
    pub async fn broadcast_to_channel(&self, channel: &str, message: WsMessage) {
        let subscriptions = self.subscriptions.read().await;

        if let Some(subscribers) = subscriptions.get(channel) {
            let count = subscribers.len();
            if count > 0 {
                debug!("Broadcasting to {} subscribers on channel {}", count, channel);
                let envelope = Envelope {
                    channel: channel.to_string(),
                    message,
                };
                if let Err(e) = self.tx.send(envelope) {
                    warn!("Failed to broadcast message: {}", e);
                }
            }
        }
    }

    /// Subscribe a client to a channel
    pub async fn subscribe(&self, client_id: Uuid, channel: String) {
        let channel = normalize_channel(&channel);
        let mut subscriptions = self.subscriptions.write().await;
        let mut client_channels = self.client_channels.write().await;

        let subscribers = subscriptions.entry(channel.clone()).or_insert_with(Vec::new);
        if !subscribers.contains(&client_id) {
            subscribers.push(client_id);
        }

        let channels = client_channels.entry(client_id).or_insert_with(Vec::new);
        if !channels.contains(&channel) {
            channels.push(channel.clone());
        }

        info!("Client {} subscribed to {}", client_id, channel);
    }

    /// Unsubscribe a client from a channel
    pub async fn unsubscribe(&self, client_id: Uuid, channel: &str) {
        let channel = normalize_channel(channel);
        let mut subscriptions = self.subscriptions.write().await;
        let mut client_channels = self.client_channels.write().await;

        if let Some(subscribers) = subscriptions.get_mut(&channel) {
            subscribers.retain(|&id| id != client_id);
            if subscribers.is_empty() {
                subscriptions.remove(&channel);
            }
        }

        if let Some(channels) = client_channels.get_mut(&client_id) {
            channels.retain(|c| *c != channel);
        }

        info!("Client {} unsubscribed from {}", client_id, channel);
    }

    /// Get all channels a client is subscribed to
    pub async fn get_client_channels(&self, client_id: Uuid) -> Vec<String> {
        let client_channels = self.client_channels.read().await;
        client_channels.get(&client_id).cloned().unwrap_or_default()
    }

    /// Number of clients listening on a channel
    pub async fn subscriber_count(&self, channel: &str) -> usize {
        let subscriptions = self.subscriptions.read().await;
        subscriptions.get(channel).map(Vec::len).unwrap_or(0)
    }

    /// Drop every subscription held by a client
    async fn remove_client(&self, client_id: Uuid) {
        for channel in self.get_client_channels(client_id).await {
            self.unsubscribe(client_id, &channel).await;
        }
        self.client_channels.write().await.remove(&client_id);
    }

    /// Handle a new WebSocket connection
    pub async fn handle_connection(&self, stream: tokio::net::TcpStream) -> AppResult<()> {
        let ws_stream = accept_async(stream)
            .await
            .map_err(|e| AppError::Message(format!("WebSocket handshake failed: {}", e)))?;

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let mut rx = self.tx.subscribe();
        let client_id = Uuid::new_v4();

        info!("New WebSocket connection: {}", client_id);

        let welcome = serde_json::json!({
            "type": "connected",
            "client_id": client_id.to_string(),
            "message": "Connected to CarbonSmart live updates"
        });
        if let Err(e) = ws_sender.send(Message::Text(welcome.to_string())).await {
            warn!("Failed to send welcome message: {}", e);
        }

        let ws_sender = Arc::new(tokio::sync::Mutex::new(ws_sender));
        let ws_sender_for_receiver = ws_sender.clone();
        let ws_server_for_receiver = self.clone();

        tokio::spawn(async move {
            while let Some(msg) = ws_receiver.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        let reply = match serde_json::from_str::<WsMessage>(&text) {
                            Ok(WsMessage::Subscribe { channel }) => {
                                ws_server_for_receiver.subscribe(client_id, channel.clone()).await;
                                serde_json::json!({ "type": "subscribed", "channel": channel })
                            }
                            Ok(WsMessage::Unsubscribe { channel }) => {
                                ws_server_for_receiver.unsubscribe(client_id, &channel).await;
                                serde_json::json!({ "type": "unsubscribed", "channel": channel })
                            }
                            Ok(_) => {
                                warn!("Unexpected message type from client {}", client_id);
                                continue;
                            }
                            Err(_) => {
                                warn!("Failed to parse message from client {}: {}", client_id, text);
                                serde_json::json!({ "type": "error", "message": "Invalid message format" })
                            }
                        };

                        let mut sender = ws_sender_for_receiver.lock().await;
                        if let Err(e) = sender.send(Message::Text(reply.to_string())).await {
                            warn!("Failed to reply to client {}: {}", client_id, e);
                        }
                    }
                    Ok(Message::Close(_)) => {
                        info!("WebSocket connection closed: {}", client_id);
                        break;
                    }
                    Err(e) => {
                        error!("WebSocket error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }

            ws_server_for_receiver.remove_client(client_id).await;
        });

        let ws_server_clone = self.clone();
        let ws_sender_for_broadcast = ws_sender;
        tokio::spawn(async move {
            loop {
                let envelope = match rx.recv().await {
                    Ok(envelope) => envelope,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Client {} lagged, skipped {} messages", client_id, skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                if !ws_server_clone
                    .is_client_subscribed(client_id, &envelope.channel)
                    .await
                {
                    continue;
                }

                let json = match serde_json::to_string(&envelope.message) {
                    Ok(json) => json,
                    Err(e) => {
                        error!("Failed to serialize message: {}", e);
                        continue;
                    }
                };

                let mut sender = ws_sender_for_broadcast.lock().await;
                if let Err(e) = sender.send(Message::Text(json)).await {
                    debug!("Client {} gone: {}", client_id, e);
                    break;
                }
            }
        });

        Ok(())
    }

    /// Check if client is subscribed to a channel
    async fn is_client_subscribed(&self, client_id: Uuid, channel: &str) -> bool {
        let subscriptions = self.subscriptions.read().await;
        subscriptions
            .get(channel)
            .map(|subscribers| subscribers.contains(&client_id))
            .unwrap_or(false)
    }

    /// Broadcast to a user's channel
    pub async fn broadcast_to_user(&self, username: &str, message: WsMessage) {
        self.broadcast_to_channel(&user_channel(username), message).await;
    }

    /// Broadcast to a wallet's channel
    pub async fn broadcast_to_wallet(&self, wallet: &str, message: WsMessage) {
        self.broadcast_to_channel(&wallet_channel(wallet), message).await;
    }

    /// Broadcast to marketplace watchers
    pub async fn broadcast_to_marketplace(&self, message: WsMessage) {
        self.broadcast_to_channel(MARKETPLACE_CHANNEL, message).await;
    }
}

/// Lowercase the address part of wallet channels
fn normalize_channel(channel: &str) -> String {
    match channel.strip_prefix("wallet:") {
        Some(wallet) => wallet_channel(wallet),
        None => channel.to_string(),
    }
}

impl Clone for WebSocketServer {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            subscriptions: Arc::clone(&self.subscriptions),
            client_channels: Arc::clone(&self.client_channels),
        }
    }
}

impl Default for WebSocketServer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_wire_format() {
        let msg = WsMessage::ListingCreated {
            listing_id: "abc".to_string(),
            token_id: 7,
            seller: "demo_user".to_string(),
            price_eth: 0.05,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "listing_created");
        assert_eq!(json["token_id"], 7);

        let parsed: WsMessage =
            serde_json::from_str(r#"{"type":"subscribe","channel":"marketplace"}"#).unwrap();
        assert_eq!(
            parsed,
            WsMessage::Subscribe {
                channel: "marketplace".to_string()
            }
        );
    }

    #[test]
    fn test_wallet_channels_are_lowercased() {
        assert_eq!(
            wallet_channel("0xABCdef"),
            "wallet:0xabcdef"
        );
        assert_eq!(normalize_channel("wallet:0xABC"), "wallet:0xabc");
        assert_eq!(normalize_channel("user:Demo"), "user:Demo");
    }

    #[tokio::test]
    async fn test_subscribe_and_unsubscribe() {
        let server = WebSocketServer::new();
        let client = Uuid::new_v4();

        server.subscribe(client, "user:demo_user".to_string()).await;
        server.subscribe(client, "user:demo_user".to_string()).await;
        server.subscribe(client, "wallet:0xABC".to_string()).await;

        assert_eq!(server.subscriber_count("user:demo_user").await, 1);
        assert_eq!(server.subscriber_count("wallet:0xabc").await, 1);
        assert!(server.is_client_subscribed(client, "wallet:0xabc").await);

        server.remove_client(client).await;
        assert_eq!(server.subscriber_count("user:demo_user").await, 0);
        assert!(server.get_client_channels(client).await.is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_reaches_only_subscribed_channels() {
        let server = WebSocketServer::new();
        let mut rx = server.tx.subscribe();
        let client = Uuid::new_v4();

        // no subscribers: nothing is sent
        server
            .broadcast_to_marketplace(WsMessage::Error { message: "x".into() })
            .await;
        assert!(rx.try_recv().is_err());

        server.subscribe(client, MARKETPLACE_CHANNEL.to_string()).await;
        server
            .broadcast_to_marketplace(WsMessage::Error { message: "y".into() })
            .await;

        let envelope = rx.try_recv().unwrap();
        assert_eq!(envelope.channel, MARKETPLACE_CHANNEL);
        assert_eq!(envelope.message, WsMessage::Error { message: "y".into() });
    }
}
