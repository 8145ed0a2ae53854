use std::sync::{Arc, RwLock};

/// 登录状态，REST 客户端与推送通道共享同一份
#[derive(Clone, Default)]
pub struct AuthState {
    token: Arc<RwLock<Option<String>>>,
}

impl AuthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        let state = Self::new();
        state.set_token(token);
        state
    }

    pub fn set_token(&self, token: impl Into<String>) {
        if let Ok(mut guard) = self.token.write() {
            *guard = Some(token.into());
        }
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.token.write() {
            *guard = None;
        }
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().ok().and_then(|guard| guard.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.token
            .read()
            .map(|guard| guard.as_deref().is_some_and(|t| !t.is_empty()))
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<AuthState [authenticated={}]>", self.is_authenticated())
    }
}
