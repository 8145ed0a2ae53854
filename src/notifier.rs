use tokio::sync::mpsc;

/// 面向用户的提示，由前端（控制台）负责渲染
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    Success(String),
    Error(String),
    Info(String),
}

impl AppEvent {
    pub fn message(&self) -> &str {
        match self {
            AppEvent::Success(m) | AppEvent::Error(m) | AppEvent::Info(m) => m,
        }
    }
}

/// store 发出提示的唯一出口
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<AppEvent>,
}

impl Notifier {
    pub fn new(tx: mpsc::UnboundedSender<AppEvent>) -> Self {
        Self { tx }
    }

    /// 便于测试：返回 notifier 以及接收端
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AppEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn success(&self, msg: impl Into<String>) {
        let _ = self.tx.send(AppEvent::Success(msg.into()));
    }

    pub fn error(&self, msg: impl Into<String>) {
        let _ = self.tx.send(AppEvent::Error(msg.into()));
    }

    pub fn info(&self, msg: impl Into<String>) {
        let _ = self.tx.send(AppEvent::Info(msg.into()));
    }
}
