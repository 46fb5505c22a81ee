use log::debug;
use std::sync::Arc;

use super::attempts::LoginAttemptTracker;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationEvent {
    Success { username: String },
    BadCredentials { username: String },
}

pub trait AuthenticationListener: Send + Sync {
    fn on_event(&self, event: &AuthenticationEvent);
}

/// 失败时累加计数，成功时清除
pub struct LoginAttemptListener {
    tracker: Arc<LoginAttemptTracker>,
}

impl LoginAttemptListener {
    pub fn new(tracker: Arc<LoginAttemptTracker>) -> Self {
        Self { tracker }
    }
}

impl AuthenticationListener for LoginAttemptListener {
    fn on_event(&self, event: &AuthenticationEvent) {
        debug!("认证事件: {:?}", event);
        match event {
            AuthenticationEvent::Success { username } => self.tracker.record_success(username),
            AuthenticationEvent::BadCredentials { username } => {
                self.tracker.record_failure(username);
            }
        }
    }
}
