//! # Feed Transport
//!
//! The seam between the feed worker and the socket. A [`Connector`] opens one
//! transport per connection attempt and reports everything that happens to it
//! through an [`EventSink`], tagged with the attempt's generation; the worker
//! talks back through the returned [`TransportHandle`].
//!
//! `WsConnector` is the production implementation over `tokio-tungstenite`.
//! Tests plug in a scripted connector instead.

use tokio::sync::mpsc;
use url::Url;

use crate::core::signal::{Signal, TransportEvent};

/// Instructions from the worker to a running transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCommand {
    Send(String),
    Close { code: u16, reason: String },
}

/// Worker-side handle to one transport. Dropping it tells the transport to
/// shut down.
#[derive(Debug)]
pub struct TransportHandle {
    commands: mpsc::UnboundedSender<TransportCommand>,
}

impl TransportHandle {
    /// A handle and the command stream the transport task reads from.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TransportCommand>) {
        let (commands, rx) = mpsc::unbounded_channel();
        (Self { commands }, rx)
    }

    pub fn send_text(&self, text: String) -> bool {
        self.commands.send(TransportCommand::Send(text)).is_ok()
    }

    pub fn close(&self, code: u16, reason: &str) -> bool {
        self.commands
            .send(TransportCommand::Close { code, reason: reason.to_string() })
            .is_ok()
    }
}

/// Transport-side callback surface for one connection attempt.
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    signals: mpsc::UnboundedSender<Signal>,
}

impl EventSink {
    pub fn new(generation: u64, signals: mpsc::UnboundedSender<Signal>) -> Self {
        Self { generation, signals }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns `false` once the worker is gone.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.signals
            .send(Signal::Transport { generation: self.generation, event })
            .is_ok()
    }
}

/// Opens transports. Called from inside the worker task, so implementations
/// may spawn onto the current runtime but must not block.
pub trait Connector: Send + Sync + 'static {
    fn open(&self, url: &Url, sink: EventSink) -> TransportHandle;
}

#[cfg(feature = "wss")]
pub use ws::WsConnector;

#[cfg(feature = "wss")]
mod ws {
    use futures_util::{SinkExt, StreamExt};
    use tokio::sync::mpsc;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
    use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
    use url::Url;

    use super::{Connector, EventSink, TransportCommand, TransportHandle};
    use crate::core::signal::{CloseInfo, TransportEvent};

    #[cfg(feature = "retrieve")]
    use crate::retrieve::ky_http::HealthProbe;

    const CLOSE_DRAIN: std::time::Duration = std::time::Duration::from_secs(1);

    /// `tokio-tungstenite` transport with an optional HTTP pre-flight.
    #[derive(Default)]
    pub struct WsConnector {
        #[cfg(feature = "retrieve")]
        probe: Option<HealthProbe>,
    }

    impl WsConnector {
        pub fn new() -> Self {
            // Only the ring provider is compiled in; installing it twice is harmless.
            let _ = rustls::crypto::ring::default_provider().install_default();
            Self::default()
        }

        #[cfg(feature = "retrieve")]
        pub fn with_health_probe(mut self, probe: Option<HealthProbe>) -> Self {
            self.probe = probe;
            self
        }
    }

    impl Connector for WsConnector {
        fn open(&self, url: &Url, sink: EventSink) -> TransportHandle {
            let (handle, commands) = TransportHandle::channel();
            let url = url.clone();
            #[cfg(feature = "retrieve")]
            let probe = self.probe.clone();

            tokio::spawn(async move {
                #[cfg(feature = "retrieve")]
                let preflight = async move {
                    if let Some(probe) = probe {
                        probe.check_best_effort().await;
                    }
                };
                #[cfg(not(feature = "retrieve"))]
                let preflight = async {};

                run_socket(url, preflight, sink, commands).await;
            });

            handle
        }
    }

    async fn run_socket<F>(
        url: Url,
        preflight: F,
        sink: EventSink,
        mut commands: mpsc::UnboundedReceiver<TransportCommand>,
    ) where
        F: std::future::Future<Output = ()>,
    {
        log::info!("Connecting to stock feed: {} (generation {})", url, sink.generation());

        let connecting = async {
            preflight.await;
            connect_async(url.as_str()).await
        };

        let ws_stream = tokio::select! {
            result = connecting => match result {
                Ok((ws_stream, _)) => ws_stream,
                Err(e) => {
                    log::error!("Failed to connect to stock feed: {}", e);
                    sink.emit(TransportEvent::Error(e.to_string()));
                    sink.emit(TransportEvent::Closed(CloseInfo::abnormal(e.to_string())));
                    return;
                }
            },
            _ = abandoned(&mut commands) => {
                log::debug!("Connection attempt {} abandoned before open", sink.generation());
                return;
            }
        };

        sink.emit(TransportEvent::Opened);
        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(TransportCommand::Send(text)) => {
                        log::trace!("Sending frame: {}", text);
                        if let Err(e) = write.send(Message::Text(text.into())).await {
                            log::error!("Failed to send frame: {}", e);
                            sink.emit(TransportEvent::Error(e.to_string()));
                        }
                    }
                    Some(TransportCommand::Close { code, reason }) => {
                        let frame = CloseFrame { code: CloseCode::from(code), reason: reason.into() };
                        let _ = write.send(Message::Close(Some(frame))).await;
                        // Let the peer's close reply drain; the worker has already moved on.
                        let drain = async { while let Some(Ok(_)) = read.next().await {} };
                        let _ = tokio::time::timeout(CLOSE_DRAIN, drain).await;
                        return;
                    }
                    None => {
                        let _ = write.close().await;
                        return;
                    }
                },
                message = read.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        sink.emit(TransportEvent::Text(text.as_str().to_owned()));
                    }
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                        Ok(text) => {
                            sink.emit(TransportEvent::Text(text));
                        }
                        Err(_) => log::warn!("Dropping non-UTF-8 binary frame ({} bytes)", bytes.len()),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        let info = match frame {
                            Some(frame) => CloseInfo::clean(u16::from(frame.code), frame.reason.as_str()),
                            None => CloseInfo::clean(1005, ""),
                        };
                        log::info!("Stock feed closed by server ({}): {}", info.code, info.reason);
                        sink.emit(TransportEvent::Closed(info));
                        return;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        log::warn!("Stock feed read error: {}", e);
                        sink.emit(TransportEvent::Error(e.to_string()));
                        sink.emit(TransportEvent::Closed(CloseInfo::abnormal(e.to_string())));
                        return;
                    }
                    None => {
                        sink.emit(TransportEvent::Closed(CloseInfo::abnormal("stream ended without close frame")));
                        return;
                    }
                },
            }
        }
    }

    /// Resolves when the worker closes or drops the handle.
    async fn abandoned(commands: &mut mpsc::UnboundedReceiver<TransportCommand>) {
        while let Some(command) = commands.recv().await {
            if matches!(command, TransportCommand::Close { .. }) {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_forwards_commands_until_dropped() {
        let (handle, mut rx) = TransportHandle::channel();
        assert!(handle.send_text("{\"type\":\"PING\"}".into()));
        assert!(handle.close(1000, "bye"));
        assert_eq!(rx.try_recv().unwrap(), TransportCommand::Send("{\"type\":\"PING\"}".into()));
        assert_eq!(rx.try_recv().unwrap(), TransportCommand::Close { code: 1000, reason: "bye".into() });

        drop(rx);
        assert!(!handle.send_text("late".into()));
    }

    #[test]
    fn sink_tags_events_with_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(7, tx);
        assert!(sink.emit(TransportEvent::Opened));
        match rx.try_recv().unwrap() {
            Signal::Transport { generation, event } => {
                assert_eq!(generation, 7);
                assert_eq!(event, TransportEvent::Opened);
            }
            other => panic!("unexpected signal {other:?}"),
        }
    }
}
