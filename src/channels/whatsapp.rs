use super::traits::{Channel, ConnectionState, InboundMessage, SendMessage};
use crate::error::DeliveryError;
use crate::identity::normalize_address;
use crate::util::{now_ms, truncate_with_ellipsis};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Duration;
use uuid::Uuid;

/// How many outbound message ids are remembered for echo detection.
const SENT_ID_MEMORY: usize = 256;

/// WhatsApp channel. Talks to an Evolution API bridge that owns the
/// WhatsApp Web session. Outbound goes over its REST API; inbound events
/// arrive on the gateway webhook and are handed to [`WhatsAppChannel::ingest_webhook`].
pub struct WhatsAppChannel {
    api_url: String,
    api_key: String,
    instance: String,
    client: reqwest::Client,
    connection: ConnectionState,
    sent_ids: Mutex<VecDeque<String>>,
}

impl WhatsAppChannel {
    pub fn new(api_url: String, api_key: String, instance: String) -> Self {
        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key,
            instance,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            connection: ConnectionState::default(),
            sent_ids: Mutex::new(VecDeque::with_capacity(SENT_ID_MEMORY)),
        }
    }

    fn api_url(&self, route: &str) -> String {
        format!("{}/{route}/{}", self.api_url, self.instance)
    }

    fn remember_sent(&self, id: String) {
        let mut ids = self.sent_ids.lock();
        if ids.len() == SENT_ID_MEMORY {
            ids.pop_front();
        }
        ids.push_back(id);
    }

    fn was_sent_by_us(&self, id: &str) -> bool {
        self.sent_ids.lock().iter().any(|sent| sent == id)
    }

    /// Apply one bridge webhook payload.
    ///
    /// QR and connection events update [`ConnectionState`]; message events
    /// are returned for the dispatcher. Anything else is ignored.
    pub fn ingest_webhook(&self, payload: &Value) -> Vec<InboundMessage> {
        let event = payload
            .get("event")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_ascii_lowercase()
            .replace('_', ".");
        let data = &payload["data"];

        match event.as_str() {
            "qrcode.updated" => {
                match extract_qr(data) {
                    Some(qr) => {
                        tracing::info!(
                            "WhatsApp pairing QR updated; open the status panel to scan it"
                        );
                        self.connection.set_qr(qr);
                    }
                    None => tracing::warn!("WhatsApp qrcode.updated event without an image"),
                }
                Vec::new()
            }
            "connection.update" => {
                match data.get("state").and_then(Value::as_str).unwrap_or("") {
                    "open" | "connected" => {
                        tracing::info!("WhatsApp session connected");
                        self.connection.mark_ready();
                    }
                    "close" | "closed" | "disconnected" => {
                        tracing::warn!(
                            "WhatsApp session disconnected; a new QR code will follow"
                        );
                        self.connection.mark_disconnected();
                    }
                    other => tracing::debug!(state = other, "WhatsApp connection state"),
                }
                Vec::new()
            }
            "messages.upsert" => {
                let owner = payload.get("sender").and_then(Value::as_str).unwrap_or("");
                let items = match data.as_array() {
                    Some(items) => items.iter().collect::<Vec<_>>(),
                    None => vec![data],
                };
                items
                    .into_iter()
                    .filter_map(|item| self.parse_message(item, owner))
                    .collect()
            }
            _ => Vec::new(),
        }
    }

    fn parse_message(&self, item: &Value, owner: &str) -> Option<InboundMessage> {
        let key = &item["key"];
        let Some(remote_jid) = key.get("remoteJid").and_then(Value::as_str) else {
            tracing::warn!("WhatsApp: message without remoteJid, skipping");
            return None;
        };
        if remote_jid.ends_with("@g.us") || remote_jid.ends_with("@broadcast") {
            return None;
        }

        let body = item["message"]["conversation"]
            .as_str()
            .or_else(|| item["message"]["extendedTextMessage"]["text"].as_str())
            .unwrap_or("")
            .to_string();
        if body.trim().is_empty() {
            tracing::debug!(chat = remote_jid, "WhatsApp: non-text message, skipping");
            return None;
        }

        let from_self = key.get("fromMe").and_then(Value::as_bool).unwrap_or(false);
        let id = key
            .get("id")
            .and_then(Value::as_str)
            .map_or_else(|| Uuid::new_v4().to_string(), ToString::to_string);
        let chat = normalize_address(remote_jid).unwrap_or_default();
        let owner = normalize_address(owner).unwrap_or_default();
        let (from, to) = if from_self { (owner, chat) } else { (chat, owner) };

        // Best effort only: the bridge may echo a send before its response
        // (and the id) reaches us. The dispatcher asks `is_own_echo` again.
        Some(InboundMessage {
            is_automated: from_self && self.was_sent_by_us(&id),
            id,
            from,
            to,
            body,
            from_self,
            timestamp_ms: now_ms(),
        })
    }
}

/// Pull the QR data URL out of the shapes Evolution API uses:
/// `{qrcode: {base64}}`, `{base64}` or `{qrcode: "data:..."}`.
pub(crate) fn extract_qr(resp: &Value) -> Option<String> {
    resp["qrcode"]["base64"]
        .as_str()
        .or_else(|| resp["base64"].as_str())
        .or_else(|| resp["qrcode"].as_str())
        .filter(|qr| qr.starts_with("data:image/"))
        .map(ToString::to_string)
}

#[async_trait]
impl Channel for WhatsAppChannel {
    fn name(&self) -> &str {
        "whatsapp"
    }

    fn connection(&self) -> &ConnectionState {
        &self.connection
    }

    async fn send(&self, message: &SendMessage) -> Result<(), DeliveryError> {
        if !self.connection.is_ready() {
            return Err(DeliveryError::NotConnected);
        }

        let body = serde_json::json!({
            "number": message.recipient,
            "text": message.content,
        });
        let resp = self
            .client
            .post(self.api_url("message/sendText"))
            .header("apikey", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body: truncate_with_ellipsis(&body, 300),
            });
        }

        match resp.json::<Value>().await {
            Ok(sent) => {
                if let Some(id) = sent["key"]["id"].as_str() {
                    self.remember_sent(id.to_string());
                }
            }
            Err(e) => tracing::debug!("WhatsApp sendText response not JSON: {e}"),
        }

        tracing::debug!(
            to = %message.recipient,
            text = %truncate_with_ellipsis(&message.content, 80),
            "WhatsApp message sent"
        );
        Ok(())
    }

    async fn connect(&self) -> anyhow::Result<()> {
        let resp = self
            .client
            .get(self.api_url("instance/connect"))
            .header("apikey", &self.api_key)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!(
                "Evolution instance/connect failed ({status}): {}",
                truncate_with_ellipsis(&text, 300)
            );
        }

        let json: Value = serde_json::from_str(&text).unwrap_or_default();
        if let Some(qr) = extract_qr(&json) {
            tracing::info!("WhatsApp pairing QR received; open the status panel to scan it");
            self.connection.set_qr(qr);
        } else if connection_state_is_open(&json) {
            self.connection.mark_ready();
        }
        Ok(())
    }

    async fn health_check(&self) -> bool {
        let resp = match self
            .client
            .get(self.api_url("instance/connectionState"))
            .header("apikey", &self.api_key)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                tracing::debug!(status = %resp.status(), "WhatsApp health check rejected");
                return false;
            }
            Err(e) => {
                tracing::debug!("WhatsApp health check failed: {e}");
                return false;
            }
        };

        resp.json::<Value>()
            .await
            .is_ok_and(|json| connection_state_is_open(&json))
    }

    fn is_own_echo(&self, id: &str) -> bool {
        self.was_sent_by_us(id)
    }
}

fn connection_state_is_open(json: &Value) -> bool {
    json["instance"]["state"]
        .as_str()
        .or_else(|| json["state"].as_str())
        == Some("open")
}
