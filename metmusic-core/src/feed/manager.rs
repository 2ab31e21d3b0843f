//! Push channel lifecycle
//!
//! Keeps exactly one subscription to a session's feed alive: connect,
//! subscribe, receive, watch for staleness, and reconnect after a fixed delay
//! whenever the channel drops. Runs as a background task and reports through
//! an event channel; it never touches the output device.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{self, protocol::Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::protocol::{self, ListenRequest, PlaybackFeedback};
use super::watchdog::LivenessWatchdog;
use crate::config::FeedConfig;

/// Push channel connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
}

/// Channel-level failures. All of them end in a scheduled reconnect.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Failed to connect: {0}")]
    Connect(#[source] tungstenite::Error),

    #[error("Connection attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to send: {0}")]
    Send(#[source] tungstenite::Error),

    #[error("Receive error: {0}")]
    Receive(#[source] tungstenite::Error),

    #[error("Failed to encode subscribe message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Events emitted by the feed manager
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// Connection state changed
    State(ConnectionState),
    /// Feedback for our session (received or synthesized by the watchdog)
    Feedback(PlaybackFeedback),
    /// Channel error, always followed by `State(Disconnected)`
    Error(String),
}

/// Commands sent to the running feed task
#[derive(Debug)]
enum FeedCommand {
    Shutdown,
}

/// Handle to the running feed task
#[derive(Clone)]
pub struct FeedHandle {
    command_tx: mpsc::UnboundedSender<FeedCommand>,
}

impl FeedHandle {
    /// Close the channel and stop reconnecting
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(FeedCommand::Shutdown);
    }
}

/// Why a single channel session ended
enum ChannelOutcome {
    /// Closed by the server or the stream ended
    Closed,
    /// Shutdown requested locally
    Shutdown,
}

/// Owns the push channel for one session
pub struct FeedManager {
    session_id: String,
    url: String,
    reconnect_delay: Duration,
    connect_timeout: Duration,
    liveness_tick: Duration,
    watchdog: LivenessWatchdog,
}

impl FeedManager {
    pub fn new(session_id: impl Into<String>, config: &FeedConfig) -> Self {
        Self {
            session_id: session_id.into(),
            url: config.url.clone(),
            reconnect_delay: config.reconnect_delay(),
            connect_timeout: config.connect_timeout(),
            liveness_tick: config.liveness_tick(),
            watchdog: LivenessWatchdog::new(config.liveness_timeout_ms),
        }
    }

    /// Spawn the feed task, delivering its events into a caller-owned queue.
    /// Must be called from within a tokio runtime.
    pub fn start_into<E>(self, event_tx: mpsc::UnboundedSender<E>) -> FeedHandle
    where
        E: From<FeedEvent> + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        tokio::spawn(self.run(event_tx, command_rx));
        FeedHandle { command_tx }
    }

    /// Connect / reconnect loop. Retries forever with a fixed delay.
    async fn run<E>(
        mut self,
        event_tx: mpsc::UnboundedSender<E>,
        mut command_rx: mpsc::UnboundedReceiver<FeedCommand>,
    ) where
        E: From<FeedEvent> + Send + 'static,
    {
        // The liveness tick outlives individual channels so a feed that never
        // comes back still ends in a pause.
        let mut tick = tokio::time::interval(self.liveness_tick);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            emit(&event_tx, FeedEvent::State(ConnectionState::Connecting));

            match self.run_channel(&event_tx, &mut command_rx, &mut tick).await {
                Ok(ChannelOutcome::Shutdown) => {
                    emit(&event_tx, FeedEvent::State(ConnectionState::Disconnected));
                    info!("Feed for session {} shut down", self.session_id);
                    return;
                }
                Ok(ChannelOutcome::Closed) => {
                    info!("Feed channel closed by server");
                }
                Err(e) => {
                    warn!("Feed channel error: {}", e);
                    emit(&event_tx, FeedEvent::Error(e.to_string()));
                }
            }

            emit(&event_tx, FeedEvent::State(ConnectionState::Disconnected));
            info!("Reconnecting in {:?}", self.reconnect_delay);

            let reconnect = tokio::time::sleep(self.reconnect_delay);
            tokio::pin!(reconnect);

            loop {
                tokio::select! {
                    _ = &mut reconnect => break,
                    _ = tick.tick() => self.check_liveness(crate::current_time_ms(), &event_tx),
                    cmd = command_rx.recv() => match cmd {
                        Some(FeedCommand::Shutdown) | None => {
                            info!("Feed for session {} shut down", self.session_id);
                            return;
                        }
                    },
                }
            }
        }
    }

    /// Run a single channel session until it closes
    async fn run_channel<E: From<FeedEvent>>(
        &mut self,
        event_tx: &mpsc::UnboundedSender<E>,
        command_rx: &mut mpsc::UnboundedReceiver<FeedCommand>,
        tick: &mut Interval,
    ) -> Result<ChannelOutcome, ChannelError> {
        debug!("Connecting to feed: {}", self.url);

        let url = self.url.clone();
        let subscribe = serde_json::to_string(&ListenRequest::new(&self.session_id))?;
        let connect_timeout = self.connect_timeout;
        let attempt = tokio::time::timeout(connect_timeout, open_channel(&url, subscribe, event_tx));
        tokio::pin!(attempt);

        // A stalled handshake must not starve the watchdog or shutdown
        let ws_stream = loop {
            tokio::select! {
                result = &mut attempt => match result {
                    Ok(opened) => break opened?,
                    Err(_) => return Err(ChannelError::Timeout(connect_timeout)),
                },
                _ = tick.tick() => self.check_liveness(crate::current_time_ms(), event_tx),
                cmd = command_rx.recv() => match cmd {
                    Some(FeedCommand::Shutdown) | None => return Ok(ChannelOutcome::Shutdown),
                },
            }
        };
        info!("Subscribed to session {}", self.session_id);

        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        self.handle_text(text.as_str(), crate::current_time_ms(), event_tx);
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!("Server closed feed: {:?}", frame);
                        return Ok(ChannelOutcome::Closed);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(ChannelError::Receive(e)),
                    None => return Ok(ChannelOutcome::Closed),
                },
                _ = tick.tick() => self.check_liveness(crate::current_time_ms(), event_tx),
                cmd = command_rx.recv() => match cmd {
                    Some(FeedCommand::Shutdown) | None => {
                        let _ = write.send(Message::Close(None)).await;
                        return Ok(ChannelOutcome::Shutdown);
                    }
                },
            }
        }
    }

    /// Decode one text frame and forward feedback for our session
    fn handle_text<E: From<FeedEvent>>(
        &mut self,
        text: &str,
        now_ms: u64,
        event_tx: &mpsc::UnboundedSender<E>,
    ) {
        match protocol::parse_feedback(text, &self.session_id) {
            Ok(Some(feedback)) => {
                self.watchdog.observe(&feedback, now_ms);
                emit(event_tx, FeedEvent::Feedback(feedback));
            }
            Ok(None) => {}
            Err(e) => warn!("Dropping message: {}", e),
        }
    }

    /// Synthesize a stop when a playing feed has gone silent
    fn check_liveness<E: From<FeedEvent>>(&mut self, now_ms: u64, event_tx: &mpsc::UnboundedSender<E>) {
        if self.watchdog.check(now_ms) {
            warn!("No feedback for session {} - treating feed as stopped", self.session_id);
            emit(event_tx, FeedEvent::Feedback(PlaybackFeedback::stopped()));
        }
    }
}

fn emit<E: From<FeedEvent>>(event_tx: &mpsc::UnboundedSender<E>, event: FeedEvent) {
    let _ = event_tx.send(E::from(event));
}

/// Open the socket and send the subscription
async fn open_channel<E: From<FeedEvent>>(
    url: &str,
    subscribe: String,
    event_tx: &mpsc::UnboundedSender<E>,
) -> Result<WebSocketStream<MaybeTlsStream<TcpStream>>, ChannelError> {
    let (mut ws_stream, _) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(ChannelError::Connect)?;

    emit(event_tx, FeedEvent::State(ConnectionState::Connected));

    ws_stream
        .send(Message::Text(subscribe.into()))
        .await
        .map_err(ChannelError::Send)?;
    Ok(ws_stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    const FEEDBACK_A: &str = r#"{"type":"feedback","SessionId":"s1","data":{"status":true,"songMid":"A","systemTime":1700000010000,"currentTime":10}}"#;
    const FEEDBACK_OTHER: &str = r#"{"type":"feedback","SessionId":"s2","data":{"status":true,"songMid":"X","systemTime":1,"currentTime":0}}"#;
    const FEEDBACK_B: &str = r#"{"type":"feedback","SessionId":"s1","data":{"status":true,"songMid":"B","systemTime":1700000020000,"currentTime":0}}"#;

    fn local_config(addr: std::net::SocketAddr) -> FeedConfig {
        FeedConfig {
            url: format!("ws://{}", addr),
            ..FeedConfig::default()
        }
    }

    /// Serves one channel that reports A playing and then closes
    async fn play_once(listener: &TcpListener) {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let _subscribe = ws.next().await;
        ws.send(Message::text(FEEDBACK_A.to_string())).await.unwrap();
        ws.close(None).await.unwrap();
    }

    /// Accepts TCP connections but never answers the upgrade
    async fn stall_handshakes(listener: TcpListener) {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    }

    fn start(manager: FeedManager) -> (FeedHandle, mpsc::UnboundedReceiver<FeedEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (manager.start_into(tx), rx)
    }

    fn manager() -> FeedManager {
        FeedManager::new("s1", &FeedConfig::default())
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<FeedEvent>) -> FeedEvent {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for feed event")
            .expect("feed channel closed")
    }

    #[test]
    fn test_handle_text_filters_and_forwards() {
        let mut manager = manager();
        let (tx, mut rx) = mpsc::unbounded_channel::<FeedEvent>();

        manager.handle_text("garbage", 0, &tx);
        manager.handle_text(FEEDBACK_OTHER, 0, &tx);
        assert!(rx.try_recv().is_err());

        manager.handle_text(FEEDBACK_A, 0, &tx);
        match rx.try_recv() {
            Ok(FeedEvent::Feedback(feedback)) => assert_eq!(feedback.track_id, "A"),
            other => panic!("expected feedback, got {:?}", other),
        }
    }

    #[test]
    fn test_stale_feed_synthesizes_stop() {
        let mut manager = manager();
        let (tx, mut rx) = mpsc::unbounded_channel::<FeedEvent>();

        manager.handle_text(FEEDBACK_A, 1000, &tx);
        let _ = rx.try_recv();

        manager.check_liveness(12_000, &tx);
        assert!(rx.try_recv().is_err());

        manager.check_liveness(13_001, &tx);
        match rx.try_recv() {
            Ok(FeedEvent::Feedback(feedback)) => assert!(!feedback.is_playing),
            other => panic!("expected synthesized stop, got {:?}", other),
        }

        // Only once
        manager.check_liveness(30_000, &tx);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_subscribe_receive_and_reconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            let subscribe = ws.next().await.unwrap().unwrap();
            for text in [FEEDBACK_A, "garbage", FEEDBACK_OTHER, FEEDBACK_B] {
                ws.send(Message::text(text.to_string())).await.unwrap();
            }
            ws.close(None).await.unwrap();
            subscribe.to_text().unwrap().to_string()
        });

        let config = FeedConfig {
            url: format!("ws://{}", addr),
            reconnect_delay_ms: 50,
            ..FeedConfig::default()
        };
        let (handle, mut events) = start(FeedManager::new("s1", &config));

        assert!(matches!(next_event(&mut events).await, FeedEvent::State(ConnectionState::Connecting)));
        assert!(matches!(next_event(&mut events).await, FeedEvent::State(ConnectionState::Connected)));

        match next_event(&mut events).await {
            FeedEvent::Feedback(feedback) => assert_eq!(feedback.track_id, "A"),
            other => panic!("expected feedback A, got {:?}", other),
        }
        match next_event(&mut events).await {
            FeedEvent::Feedback(feedback) => assert_eq!(feedback.track_id, "B"),
            other => panic!("expected feedback B, got {:?}", other),
        }

        let subscribe: serde_json::Value = serde_json::from_str(&server.await.unwrap()).unwrap();
        assert_eq!(subscribe, serde_json::json!({ "type": "listen", "SessionId": ["s1"] }));

        // Channel closed: disconnected, then a fresh attempt after the delay
        loop {
            match next_event(&mut events).await {
                FeedEvent::State(ConnectionState::Disconnected) => break,
                FeedEvent::Error(_) => continue,
                other => panic!("expected disconnect, got {:?}", other),
            }
        }
        assert!(matches!(next_event(&mut events).await, FeedEvent::State(ConnectionState::Connecting)));

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_reconnect_waits_for_configured_delay() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let config = FeedConfig {
            reconnect_delay_ms: 300,
            ..local_config(addr)
        };
        let (handle, mut events) = start(FeedManager::new("s1", &config));

        assert!(matches!(next_event(&mut events).await, FeedEvent::State(ConnectionState::Connecting)));
        assert!(matches!(next_event(&mut events).await, FeedEvent::Error(_)));
        assert!(matches!(next_event(&mut events).await, FeedEvent::State(ConnectionState::Disconnected)));
        let disconnected_at = Instant::now();

        assert!(matches!(next_event(&mut events).await, FeedEvent::State(ConnectionState::Connecting)));
        let gap = disconnected_at.elapsed();
        assert!(gap >= Duration::from_millis(250), "retried after {:?}", gap);
        assert!(gap < Duration::from_secs(2), "retried after {:?}", gap);

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_watchdog_fires_during_reconnect_wait() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            play_once(&listener).await;
            // Nothing listens afterwards
            drop(listener);
        });

        let config = FeedConfig {
            reconnect_delay_ms: 5000,
            liveness_timeout_ms: 300,
            liveness_tick_ms: 50,
            ..local_config(addr)
        };
        let (handle, mut events) = start(FeedManager::new("s1", &config));

        assert!(matches!(next_event(&mut events).await, FeedEvent::State(ConnectionState::Connecting)));
        assert!(matches!(next_event(&mut events).await, FeedEvent::State(ConnectionState::Connected)));
        match next_event(&mut events).await {
            FeedEvent::Feedback(feedback) => assert!(feedback.is_playing),
            other => panic!("expected feedback A, got {:?}", other),
        }
        loop {
            match next_event(&mut events).await {
                FeedEvent::State(ConnectionState::Disconnected) => break,
                FeedEvent::Error(_) => continue,
                other => panic!("expected disconnect, got {:?}", other),
            }
        }

        // Well before the 5 s retry
        match next_event(&mut events).await {
            FeedEvent::Feedback(feedback) => assert!(!feedback.is_playing),
            other => panic!("expected synthesized stop, got {:?}", other),
        }

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_watchdog_and_shutdown_run_while_handshake_stalls() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            play_once(&listener).await;
            stall_handshakes(listener).await;
        });

        let config = FeedConfig {
            reconnect_delay_ms: 50,
            connect_timeout_ms: 60_000,
            liveness_timeout_ms: 300,
            liveness_tick_ms: 50,
            ..local_config(addr)
        };
        let (handle, mut events) = start(FeedManager::new("s1", &config));

        let mut attempts = 0;
        loop {
            match next_event(&mut events).await {
                FeedEvent::State(ConnectionState::Connecting) => attempts += 1,
                FeedEvent::Feedback(feedback) if !feedback.is_playing => break,
                _ => {}
            }
        }
        // The stop came while the second attempt was still pending
        assert_eq!(attempts, 2);

        handle.shutdown();
        assert!(matches!(next_event(&mut events).await, FeedEvent::State(ConnectionState::Disconnected)));
        let closed = timeout(Duration::from_secs(5), events.recv()).await.unwrap();
        assert!(closed.is_none());
    }

    #[tokio::test]
    async fn test_stalled_handshake_times_out_and_retries() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(stall_handshakes(listener));

        let config = FeedConfig {
            reconnect_delay_ms: 50,
            connect_timeout_ms: 200,
            ..local_config(addr)
        };
        let (handle, mut events) = start(FeedManager::new("s1", &config));

        assert!(matches!(next_event(&mut events).await, FeedEvent::State(ConnectionState::Connecting)));
        let started = Instant::now();
        match next_event(&mut events).await {
            FeedEvent::Error(message) => assert!(message.contains("timed out"), "{}", message),
            other => panic!("expected timeout error, got {:?}", other),
        }
        assert!(started.elapsed() >= Duration::from_millis(150));
        assert!(matches!(next_event(&mut events).await, FeedEvent::State(ConnectionState::Disconnected)));
        assert!(matches!(next_event(&mut events).await, FeedEvent::State(ConnectionState::Connecting)));

        handle.shutdown();
    }
}
