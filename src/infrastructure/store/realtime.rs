//! Supabase Realtime 通道（Phoenix 协议，websocket）
//!
//! 订阅某张表的 `postgres_changes`（所有事件类型），每条变更只转成一个
//! 空的 `ChangeNotice::Changed`。断线不重连：通道结束后订阅即结束。

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::{ChangeNotice, StoreError};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Phoenix 帧
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PhoenixMessage {
    topic: String,
    event: String,
    #[serde(default)]
    payload: Value,
    #[serde(rename = "ref", default)]
    msg_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    join_ref: Option<String>,
}

/// 收到的帧的含义
#[derive(Debug, PartialEq)]
enum Frame {
    Change,
    Reply { msg_ref: Option<String>, ok: bool, reason: String },
    Closed(String),
    Other,
}

pub struct RealtimeChannel {
    socket: Socket,
    topic: String,
    next_ref: u64,
}

/// 由项目地址推导 websocket 地址
fn websocket_url(base_url: &str, api_key: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base.to_string()
    };
    format!("{}/realtime/v1/websocket?apikey={}&vsn=1.0.0", base, api_key)
}

fn join_message(topic: &str, schema: &str, table: &str, api_key: &str, msg_ref: &str) -> PhoenixMessage {
    PhoenixMessage {
        topic: topic.to_string(),
        event: "phx_join".to_string(),
        payload: json!({
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": [
                    { "event": "*", "schema": schema, "table": table }
                ]
            },
            "access_token": api_key
        }),
        msg_ref: Some(msg_ref.to_string()),
        join_ref: Some(msg_ref.to_string()),
    }
}

fn heartbeat_message(msg_ref: &str) -> PhoenixMessage {
    PhoenixMessage {
        topic: "phoenix".to_string(),
        event: "heartbeat".to_string(),
        payload: json!({}),
        msg_ref: Some(msg_ref.to_string()),
        join_ref: None,
    }
}

fn classify(text: &str) -> Frame {
    let Ok(msg) = serde_json::from_str::<PhoenixMessage>(text) else {
        return Frame::Other;
    };
    match msg.event.as_str() {
        "postgres_changes" => Frame::Change,
        "phx_reply" => {
            let ok = msg.payload.get("status").and_then(Value::as_str) == Some("ok");
            let reason = msg
                .payload
                .pointer("/response/reason")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Frame::Reply {
                msg_ref: msg.msg_ref,
                ok,
                reason,
            }
        }
        "phx_error" | "phx_close" => Frame::Closed(msg.event),
        "system" if msg.payload.get("status").and_then(Value::as_str) == Some("error") => {
            Frame::Closed(msg.payload.to_string())
        }
        _ => Frame::Other,
    }
}

impl RealtimeChannel {
    /// 建立连接并加入表的变更频道；加入失败时返回错误
    pub async fn join(
        base_url: &str,
        api_key: &str,
        schema: &str,
        table: &str,
    ) -> Result<Self, StoreError> {
        let url = websocket_url(base_url, api_key);
        let (socket, _) = connect_async(url.as_str())
            .await
            .map_err(|e| StoreError::Subscription(e.to_string()))?;

        let mut channel = Self {
            socket,
            topic: format!("realtime:{}:{}", schema, table),
            next_ref: 1,
        };

        let join_ref = channel.take_ref();
        let join = join_message(&channel.topic, schema, table, api_key, &join_ref);
        channel.send(&join).await?;

        while let Some(frame) = channel.socket.next().await {
            let frame = frame.map_err(|e| StoreError::Subscription(e.to_string()))?;
            let Message::Text(text) = frame else {
                continue;
            };
            match classify(&text) {
                Frame::Reply { msg_ref, ok, reason } if msg_ref.as_deref() == Some(join_ref.as_str()) => {
                    if ok {
                        info!("已加入 Realtime 频道: {}", channel.topic);
                        return Ok(channel);
                    }
                    return Err(StoreError::Subscription(format!("加入频道被拒绝: {}", reason)));
                }
                Frame::Closed(reason) => {
                    return Err(StoreError::Subscription(format!("频道已关闭: {}", reason)))
                }
                _ => {}
            }
        }
        Err(StoreError::Subscription("连接在加入频道前断开".to_string()))
    }

    /// 转发变更事件，直到连接断开或接收方被丢弃
    pub async fn run(mut self, tx: mpsc::UnboundedSender<ChangeNotice>, heartbeat: Duration) {
        let mut ticker = tokio::time::interval(heartbeat);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let msg_ref = self.take_ref();
                    if let Err(e) = self.send(&heartbeat_message(&msg_ref)).await {
                        warn!("Realtime 心跳发送失败: {}", e);
                        break;
                    }
                }
                frame = self.socket.next() => {
                    let text = match frame {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(_))) | None => {
                            warn!("Realtime 连接已关闭，订阅结束");
                            break;
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            warn!("Realtime 连接出错，订阅结束: {}", e);
                            break;
                        }
                    };
                    match classify(&text) {
                        Frame::Change => {
                            debug!("收到表变更通知: {}", self.topic);
                            if tx.send(ChangeNotice::Changed).is_err() {
                                break;
                            }
                        }
                        Frame::Closed(reason) => {
                            warn!("Realtime 频道被关闭: {}", reason);
                            break;
                        }
                        Frame::Reply { .. } | Frame::Other => {}
                    }
                }
            }
        }
    }

    fn take_ref(&mut self) -> String {
        let r = self.next_ref;
        self.next_ref += 1;
        r.to_string()
    }

    async fn send(&mut self, msg: &PhoenixMessage) -> Result<(), StoreError> {
        let text = serde_json::to_string(msg).map_err(|e| StoreError::Decode(e.to_string()))?;
        self.socket
            .send(Message::Text(text))
            .await
            .map_err(|e| StoreError::Subscription(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_websocket_url_from_project_url() {
        assert_eq!(
            websocket_url("https://demo.supabase.co/", "anon"),
            "wss://demo.supabase.co/realtime/v1/websocket?apikey=anon&vsn=1.0.0"
        );
        assert_eq!(
            websocket_url("http://localhost:54321", "k"),
            "ws://localhost:54321/realtime/v1/websocket?apikey=k&vsn=1.0.0"
        );
    }

    #[test]
    fn test_join_subscribes_to_every_event() {
        let msg = join_message("realtime:public:students", "public", "students", "anon", "1");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["event"], "phx_join");
        assert_eq!(value["ref"], "1");
        let change = &value["payload"]["config"]["postgres_changes"][0];
        assert_eq!(change["event"], "*");
        assert_eq!(change["table"], "students");
    }

    #[test]
    fn test_classify_frames() {
        let change = r#"{"topic":"realtime:public:students","event":"postgres_changes","payload":{"data":{"type":"INSERT"}},"ref":null}"#;
        assert_eq!(classify(change), Frame::Change);

        let reply = r#"{"topic":"realtime:public:students","event":"phx_reply","payload":{"status":"ok","response":{}},"ref":"1"}"#;
        assert_eq!(
            classify(reply),
            Frame::Reply {
                msg_ref: Some("1".to_string()),
                ok: true,
                reason: String::new()
            }
        );

        let closed = r#"{"topic":"realtime:public:students","event":"phx_close","payload":{},"ref":"1"}"#;
        assert!(matches!(classify(closed), Frame::Closed(_)));

        assert_eq!(classify("not json"), Frame::Other);
    }
}
