use super::envelope::{decode_frame, PushMessage};
use super::retry::RetryBudget;
use super::ChannelError;
use crate::config::ChannelConfig;
use crate::notifier::Notifier;
use crate::session::AuthState;
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type PendingRequests = Arc<Mutex<HashMap<String, oneshot::Sender<Value>>>>;
type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// 推送通道客户端
///
/// 等待登录完成后打开一次连接；断开后按固定间隔重连，预算用完即放弃。
/// 收到的消息按到达顺序转发给 `push_tx`，由上层逐条分发。
pub struct ChannelClient {
    config: ChannelConfig,
    auth: AuthState,
    notifier: Notifier,
    push_tx: mpsc::UnboundedSender<PushMessage>,
}

/// 后台连接任务的句柄，drop 时任务随之终止
pub struct ChannelHandle {
    connected: Arc<AtomicBool>,
    outbound_tx: mpsc::UnboundedSender<String>,
    pending: PendingRequests,
    request_timeout: Duration,
    task: Option<JoinHandle<()>>,
}

impl ChannelClient {
    pub fn new(
        config: ChannelConfig,
        auth: AuthState,
        notifier: Notifier,
        push_tx: mpsc::UnboundedSender<PushMessage>,
    ) -> Self {
        Self {
            config,
            auth,
            notifier,
            push_tx,
        }
    }

    /// 启动后台任务
    pub fn spawn(self) -> ChannelHandle {
        let connected = Arc::new(AtomicBool::new(false));
        let pending: PendingRequests = Arc::new(Mutex::new(HashMap::new()));
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let request_timeout = self.config.request_timeout;

        let task = tokio::spawn(self.run(connected.clone(), pending.clone(), outbound_rx));

        ChannelHandle {
            connected,
            outbound_tx,
            pending,
            request_timeout,
            task: Some(task),
        }
    }

    async fn run(
        self,
        connected: Arc<AtomicBool>,
        pending: PendingRequests,
        mut outbound_rx: mpsc::UnboundedReceiver<String>,
    ) {
        let token = self.wait_for_login().await;
        let url = format!("{}?token={}", self.config.url, token);
        let mut budget = RetryBudget::new(self.config.reopen_attempts, self.config.reopen_interval);

        loop {
            match connect_async(url.as_str()).await {
                Ok((socket, _)) => {
                    connected.store(true, Ordering::SeqCst);
                    if budget.on_open() {
                        self.notifier.success("WebSocket reconnected");
                    }
                    info!("WebSocket 已连接: {}", self.config.url);
                    self.pump(socket, &pending, &mut outbound_rx).await;
                }
                Err(e) => {
                    error!("Socket encountered error. {}", e);
                    if self.config.debug {
                        self.notifier
                            .error(ChannelError::Connect(e.to_string()).to_string());
                    }
                }
            }

            connected.store(false, Ordering::SeqCst);
            fail_pending(&pending);
            info!("Connection closed.");

            match budget.on_close() {
                Some(delay) => {
                    sleep(delay).await;
                    budget.begin_attempt();
                    info!(
                        "Trying to re-open web-socket ({} attempts left)",
                        budget.remaining()
                    );
                }
                None => {
                    warn!("Socket can't re-establish connection!");
                    break;
                }
            }
        }
    }

    /// 轮询登录状态，拿到 token 后返回；只等待一次
    async fn wait_for_login(&self) -> String {
        loop {
            if let Some(token) = self.auth.token().filter(|t| !t.is_empty()) {
                return token;
            }
            sleep(self.config.login_poll_interval).await;
        }
    }

    async fn pump(
        &self,
        socket: Socket,
        pending: &PendingRequests,
        outbound_rx: &mut mpsc::UnboundedReceiver<String>,
    ) {
        let (mut write, mut read) = socket.split();
        loop {
            tokio::select! {
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.handle_frame(text.as_str(), pending),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        break;
                    }
                },
                Some(out) = outbound_rx.recv() => {
                    if let Err(e) = write.send(Message::text(out)).await {
                        error!("WebSocket 发送失败: {}", e);
                        break;
                    }
                }
            }
        }
    }

    fn handle_frame(&self, text: &str, pending: &PendingRequests) {
        let msg = match decode_frame(text) {
            Ok(msg) => msg,
            Err(ChannelError::Decompress(e)) => {
                error!("Failed to decompress message: {}", e);
                return;
            }
            Err(e) => {
                warn!("丢弃无法解析的消息: {}", e);
                return;
            }
        };

        let waiter = pending.lock().ok().and_then(|mut map| map.remove(&msg.id));
        if let Some(waiter) = waiter {
            debug!("请求 {} 收到响应", msg.id);
            let _ = waiter.send(msg.data.clone());
        }

        let _ = self.push_tx.send(msg);
    }
}

fn fail_pending(pending: &PendingRequests) {
    if let Ok(mut map) = pending.lock() {
        // drop 发送端，等待方会收到 Closed
        map.clear();
    }
}

impl ChannelHandle {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// 发送请求并等待同 id 的响应
    ///
    /// 负载里没有 `id` 时自动生成一个。
    pub async fn request(&self, mut payload: Value) -> Result<Value, ChannelError> {
        let Value::Object(ref mut map) = payload else {
            return Err(ChannelError::Decode("request payload must be an object".to_string()));
        };
        let id = map
            .entry("id")
            .or_insert_with(|| Value::String(uuid::Uuid::new_v4().to_string()))
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ChannelError::Decode("request id must be a string".to_string()))?;

        let (tx, rx) = oneshot::channel();
        if let Ok(mut map) = self.pending.lock() {
            map.insert(id.clone(), tx);
        }

        if self.outbound_tx.send(payload.to_string()).is_err() {
            self.forget(&id);
            return Err(ChannelError::Closed);
        }

        match timeout(self.request_timeout, rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(ChannelError::Closed),
            Err(_) => {
                self.forget(&id);
                Err(ChannelError::Timeout)
            }
        }
    }

    fn forget(&self, id: &str) {
        if let Ok(mut map) = self.pending.lock() {
            map.remove(id);
        }
    }

    /// 后台任务是否已经退出（重连预算耗尽）
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }

    pub fn shutdown(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.connected.store(false, Ordering::SeqCst);
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<ChannelHandle [connected={}]>", self.is_connected())
    }
}
