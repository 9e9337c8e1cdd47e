// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Live leaderboard updates over STOMP on a WebSocket.
//!
//! The backend broadcasts every leaderboard to `/topic/leaderboard/{period}`
//! whenever a run ends, and answers a `SEND` to `/app/leaderboard/{period}`
//! with a fresh broadcast. Only the raw WebSocket transport is spoken here
//! (no SockJS framing).

use crate::models::{LeaderboardEntry, LeaderboardPeriod};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

const UPDATE_BUFFER: usize = 16;

/// Errors from the live leaderboard connection.
#[derive(Debug, thiserror::Error)]
pub enum LiveError {
    #[error("WebSocket error: {0}")]
    Transport(String),

    #[error("Malformed STOMP frame: {0}")]
    Protocol(String),

    #[error("Broker error: {0}")]
    Broker(String),

    #[error("Connection closed before the broker answered")]
    Closed,
}

impl From<tokio_tungstenite::tungstenite::Error> for LiveError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        LiveError::Transport(err.to_string())
    }
}

/// One STOMP 1.2 frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StompFrame {
    pub command: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl StompFrame {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of header `name` (repeated headers: first one wins).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.command.len() + self.body.len() + 64);
        out.push_str(&self.command);
        out.push('\n');
        for (name, value) in &self.headers {
            out.push_str(name);
            out.push(':');
            out.push_str(value);
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Parse one frame. Heart-beats (bare end-of-lines) yield `None`.
    pub fn parse(text: &str) -> Result<Option<Self>, LiveError> {
        let text = text.trim_start_matches(['\r', '\n']);
        if text.is_empty() {
            return Ok(None);
        }

        let (head, rest) = text
            .split_once("\n\n")
            .or_else(|| text.split_once("\r\n\r\n"))
            .ok_or_else(|| LiveError::Protocol("missing header terminator".to_string()))?;
        let body = match rest.find('\0') {
            Some(end) => &rest[..end],
            None => rest,
        };

        let mut lines = head.lines();
        let command = lines
            .next()
            .map(str::trim_end)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| LiveError::Protocol("missing command".to_string()))?;

        let mut headers = Vec::new();
        for line in lines {
            let line = line.trim_end_matches('\r');
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| LiveError::Protocol(format!("bad header line {:?}", line)))?;
            headers.push((name.to_string(), value.to_string()));
        }

        Ok(Some(Self {
            command: command.to_string(),
            headers,
            body: body.to_string(),
        }))
    }
}

/// A fresh leaderboard pushed by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardUpdate {
    pub period: LeaderboardPeriod,
    pub entries: Vec<LeaderboardEntry>,
}

pub fn topic_destination(period: LeaderboardPeriod) -> String {
    format!("/topic/leaderboard/{}", period.slug())
}

pub fn request_destination(period: LeaderboardPeriod) -> String {
    format!("/app/leaderboard/{}", period.slug())
}

fn period_of_topic(destination: &str) -> Option<LeaderboardPeriod> {
    let slug = destination.strip_prefix("/topic/leaderboard/")?;
    [
        LeaderboardPeriod::Daily,
        LeaderboardPeriod::Weekly,
        LeaderboardPeriod::AllTime,
    ]
    .into_iter()
    .find(|p| p.slug() == slug)
}

fn frame_of(message: &Message) -> Result<Option<StompFrame>, LiveError> {
    match message {
        Message::Text(_) | Message::Binary(_) => StompFrame::parse(message.to_text()?),
        _ => Ok(None),
    }
}

/// Subscription to one or more live leaderboards.
///
/// The connection is served by a background task; dropping the handle
/// closes it.
pub struct LiveLeaderboard {
    updates: mpsc::Receiver<LeaderboardUpdate>,
    requests: mpsc::UnboundedSender<LeaderboardPeriod>,
    task: JoinHandle<()>,
}

impl LiveLeaderboard {
    /// Connect to the STOMP endpoint at `url` and subscribe to `periods`.
    ///
    /// Returns once the broker has accepted the connection.
    pub async fn connect(url: &str, periods: &[LeaderboardPeriod]) -> Result<Self, LiveError> {
        let (socket, _) = tokio_tungstenite::connect_async(url).await?;
        let (mut sink, mut stream) = socket.split();

        let host = reqwest::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "localhost".to_string());
        let connect = StompFrame::new("CONNECT")
            .header("accept-version", "1.2")
            .header("host", host)
            .header("heart-beat", "0,0");
        sink.send(Message::text(connect.encode())).await?;

        loop {
            let message = stream.next().await.ok_or(LiveError::Closed)??;
            if let Message::Close(_) = message {
                return Err(LiveError::Closed);
            }
            let Some(frame) = frame_of(&message)? else {
                continue;
            };
            match frame.command.as_str() {
                "CONNECTED" => break,
                "ERROR" => {
                    let reason = frame.get("message").unwrap_or(frame.body.as_str()).to_string();
                    return Err(LiveError::Broker(reason));
                }
                other => tracing::debug!(command = other, "Ignoring frame before CONNECTED"),
            }
        }

        for (i, period) in periods.iter().enumerate() {
            let subscribe = StompFrame::new("SUBSCRIBE")
                .header("id", format!("sub-{}", i))
                .header("destination", topic_destination(*period))
                .header("ack", "auto");
            sink.send(Message::text(subscribe.encode())).await?;
        }
        tracing::info!(url, subscriptions = periods.len(), "Live leaderboard connected");

        let (updates_tx, updates_rx) = mpsc::channel(UPDATE_BUFFER);
        let (requests_tx, mut requests_rx) = mpsc::unbounded_channel::<LeaderboardPeriod>();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    request = requests_rx.recv() => {
                        let Some(period) = request else { break };
                        let send = StompFrame::new("SEND")
                            .header("destination", request_destination(period))
                            .header("content-length", "0");
                        if let Err(e) = sink.send(Message::text(send.encode())).await {
                            tracing::warn!(error = %e, "Failed to request leaderboard");
                            break;
                        }
                    }
                    incoming = stream.next() => match incoming {
                        None | Some(Ok(Message::Close(_))) => {
                            tracing::info!("Live leaderboard connection closed");
                            break;
                        }
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "Live leaderboard connection failed");
                            break;
                        }
                        Some(Ok(message)) => match frame_of(&message) {
                            Ok(Some(frame)) => {
                                if !forward(frame, &updates_tx).await {
                                    break;
                                }
                            }
                            Ok(None) => {}
                            Err(e) => tracing::warn!(error = %e, "Skipping unreadable frame"),
                        },
                    },
                }
            }
            let disconnect = StompFrame::new("DISCONNECT");
            let _ = sink.send(Message::text(disconnect.encode())).await;
        });

        Ok(Self {
            updates: updates_rx,
            requests: requests_tx,
            task,
        })
    }

    /// Ask the server to broadcast `period` now. `false` if the connection is gone.
    pub fn request(&self, period: LeaderboardPeriod) -> bool {
        self.requests.send(period).is_ok()
    }

    /// Next update, or `None` once the connection has closed.
    pub async fn next(&mut self) -> Option<LeaderboardUpdate> {
        self.updates.recv().await
    }
}

impl Drop for LiveLeaderboard {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Handle one frame from the broker. Returns `false` when the connection should stop.
async fn forward(frame: StompFrame, updates: &mpsc::Sender<LeaderboardUpdate>) -> bool {
    match frame.command.as_str() {
        "MESSAGE" => {
            let Some(period) = frame.get("destination").and_then(period_of_topic) else {
                tracing::debug!(destination = ?frame.get("destination"), "Message for unknown topic");
                return true;
            };
            match serde_json::from_str::<Vec<LeaderboardEntry>>(&frame.body) {
                Ok(entries) => updates.send(LeaderboardUpdate { period, entries }).await.is_ok(),
                Err(e) => {
                    tracing::warn!(period = period.slug(), error = %e, "Undecodable leaderboard");
                    true
                }
            }
        }
        "ERROR" => {
            tracing::warn!(message = ?frame.get("message"), body = %frame.body, "Broker error");
            false
        }
        _ => true,
    }
}
