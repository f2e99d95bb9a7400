//! Websocket gateway session.
//!
//! One call to [`QqGateway::connect_and_serve`] is one session: resolve the
//! gateway URL, identify, then heartbeat and dispatch events until the
//! connection ends.  Sessions are never resumed; the supervisor starts a
//! fresh one after any failure.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, info, warn};

use mcbot_core::{CommandRouter, Connector, SessionReporter};

use crate::api::{QqApi, QqEndpoints};
use crate::error::{QqError, Result};
use crate::message::GroupMessage;
use crate::payload::{GatewayEvent, GatewayPayload, INTENT_PUBLIC_MESSAGES};

/// How long to wait for the Hello frame after connecting.
const HELLO_TIMEOUT: Duration = Duration::from_secs(15);

/// Connects the command router to the QQ bot gateway.
#[derive(Debug, Clone)]
pub struct QqGateway {
    api: QqApi,
    router: Arc<CommandRouter>,
    target_group: Option<String>,
}

impl QqGateway {
    pub fn new(api: QqApi, router: Arc<CommandRouter>) -> Self {
        let target_group = router.config().target_group.clone();
        Self {
            api,
            router,
            target_group,
        }
    }

    /// Build a gateway from the router's configuration and the default
    /// platform endpoints.
    pub fn from_router(router: Arc<CommandRouter>) -> mcbot_core::Result<Self> {
        let (app_id, secret) = router.config().credentials()?;
        let api = QqApi::new(app_id, secret, QqEndpoints::default())?;
        Ok(Self::new(api, router))
    }

    /// Whether a mention from `group_openid` should be handled.
    fn accepts(&self, group_openid: &str) -> bool {
        self.target_group
            .as_deref()
            .is_none_or(|target| target == group_openid)
    }

    async fn run_session(&self, session: &SessionReporter) -> Result<()> {
        let token = self.api.access_token().await?;
        let url = self.api.gateway_url().await?;

        info!(url = %url, "connecting to QQ gateway");
        let (ws, _) = connect_async(url.as_str()).await?;
        let (mut sink, mut stream) = ws.split();

        // The first frame must be Hello.
        let hello = tokio::time::timeout(HELLO_TIMEOUT, stream.next())
            .await
            .map_err(|_| QqError::Protocol {
                reason: "timed out waiting for hello".to_owned(),
            })?;
        let interval_ms = match hello {
            Some(Ok(Message::Text(text))) => {
                let payload: GatewayPayload = serde_json::from_str(text.as_str())?;
                match GatewayEvent::classify(payload)? {
                    GatewayEvent::Hello {
                        heartbeat_interval_ms,
                    } => heartbeat_interval_ms,
                    other => {
                        return Err(QqError::Protocol {
                            reason: format!("expected hello, got {other:?}"),
                        });
                    }
                }
            }
            Some(Ok(other)) => {
                return Err(QqError::Protocol {
                    reason: format!("expected hello text frame, got {other:?}"),
                });
            }
            Some(Err(e)) => return Err(e.into()),
            None => {
                return Err(QqError::Closed {
                    reason: "connection ended before hello".to_owned(),
                });
            }
        };

        let identify = GatewayPayload::identify(&token, INTENT_PUBLIC_MESSAGES);
        sink.send(Message::Text(serde_json::to_string(&identify)?.into()))
            .await?;
        debug!(interval_ms, "identify sent");

        let period = Duration::from_millis(interval_ms.max(1_000));
        let mut heartbeat = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        let mut last_seq: Option<u64> = None;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    let beat = GatewayPayload::heartbeat(last_seq);
                    sink.send(Message::Text(serde_json::to_string(&beat)?.into())).await?;
                    debug!(?last_seq, "heartbeat sent");
                }
                frame = stream.next() => {
                    let frame = match frame {
                        Some(frame) => frame?,
                        None => {
                            return Err(QqError::Closed {
                                reason: "stream ended".to_owned(),
                            });
                        }
                    };

                    match frame {
                        Message::Text(text) => {
                            match serde_json::from_str::<GatewayPayload>(text.as_str()) {
                                Ok(payload) => {
                                    if let Some(seq) = payload.s {
                                        last_seq = Some(seq);
                                    }
                                    let event = GatewayEvent::classify(payload);
                                    if let Some(reply) = self.handle_event(event, last_seq, session)? {
                                        sink.send(Message::Text(serde_json::to_string(&reply)?.into()))
                                            .await?;
                                    }
                                }
                                Err(e) => warn!(
                                    error = %e,
                                    frame_len = text.len(),
                                    "skipping non-JSON gateway frame"
                                ),
                            }
                        }
                        Message::Ping(data) => sink.send(Message::Pong(data)).await?,
                        Message::Close(close) => {
                            return match close {
                                Some(frame) if frame.code == CloseCode::Normal => {
                                    info!("gateway closed normally");
                                    Ok(())
                                }
                                Some(frame) => Err(QqError::Closed {
                                    reason: format!("{} {}", u16::from(frame.code), frame.reason.as_str()),
                                }),
                                None => Err(QqError::Closed {
                                    reason: "close frame without code".to_owned(),
                                }),
                            };
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    /// React to one event.  Returns a frame to send back, if any.
    fn handle_event(
        &self,
        event: serde_json::Result<GatewayEvent>,
        last_seq: Option<u64>,
        session: &SessionReporter,
    ) -> Result<Option<GatewayPayload>> {
        let event = match event {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "skipping malformed gateway event");
                return Ok(None);
            }
        };

        match event {
            GatewayEvent::Ready { session_id } => {
                info!(session_id = ?session_id, "QQ gateway session ready");
                session.connected();
            }
            GatewayEvent::GroupAtMessage(event) => {
                if !self.accepts(&event.group_openid) {
                    debug!(group = %event.group_openid, "mention from non-target group ignored");
                    return Ok(None);
                }

                info!(group = %event.group_openid, msg_id = %event.id, "group mention received");
                let message = GroupMessage::new(self.api.clone(), event);
                let router = Arc::clone(&self.router);
                tokio::spawn(async move {
                    router.dispatch(&message).await;
                });
            }
            GatewayEvent::HeartbeatAck => debug!("heartbeat acknowledged"),
            GatewayEvent::Reconnect => {
                return Err(QqError::Reconnect {
                    reason: "server sent op 7".to_owned(),
                });
            }
            GatewayEvent::InvalidSession => {
                return Err(QqError::Reconnect {
                    reason: "invalid session (op 9)".to_owned(),
                });
            }
            GatewayEvent::OtherDispatch(t) => debug!(event = %t, "unhandled dispatch"),
            GatewayEvent::Hello { .. } => debug!("unexpected repeated hello"),
            GatewayEvent::HeartbeatRequest => {
                debug!(?last_seq, "server requested heartbeat");
                return Ok(Some(GatewayPayload::heartbeat(last_seq)));
            }
            GatewayEvent::Unknown(code) => debug!(op = code, "unknown opcode"),
        }
        Ok(None)
    }
}

#[async_trait]
impl Connector for QqGateway {
    async fn connect_and_serve(&self, session: SessionReporter) -> mcbot_core::Result<()> {
        self.run_session(&session).await.map_err(Into::into)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
