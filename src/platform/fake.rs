//! In-memory `ChatPlatform` for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use teloxide::types::{ChatId, ChatMemberStatus, Recipient, UserId};

use crate::platform::{ChatPlatform, PlatformError, Reply};

#[derive(Debug, Clone, Copy)]
pub enum Lookup {
    Status(ChatMemberStatus),
    Rejected,
    Transport,
}

#[derive(Default)]
pub struct FakePlatform {
    lookups: HashMap<UserId, Lookup>,
    failing_sends: AtomicUsize,
    lookup_calls: AtomicUsize,
    sent: Mutex<Vec<(ChatId, Reply)>>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, user_id: u64, status: ChatMemberStatus) -> Self {
        self.lookups.insert(UserId(user_id), Lookup::Status(status));
        self
    }

    pub fn with_lookup(mut self, user_id: u64, lookup: Lookup) -> Self {
        self.lookups.insert(UserId(user_id), lookup);
        self
    }

    /// The next `count` sends fail with a transport error.
    pub fn failing_sends(self, count: usize) -> Self {
        self.failing_sends.store(count, Ordering::SeqCst);
        self
    }

    pub fn sent(&self) -> Vec<(ChatId, Reply)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn lookup_calls(&self) -> usize {
        self.lookup_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    async fn member_status(
        &self,
        _channel: Recipient,
        user_id: UserId,
    ) -> Result<ChatMemberStatus, PlatformError> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        match self.lookups.get(&user_id) {
            Some(Lookup::Status(status)) => Ok(*status),
            Some(Lookup::Transport) => Err(PlatformError::Transport("connection reset".into())),
            Some(Lookup::Rejected) | None => {
                Err(PlatformError::Rejected("Bad Request: user not found".into()))
            }
        }
    }

    async fn send_reply(&self, chat_id: ChatId, reply: Reply) -> Result<(), PlatformError> {
        let pending = self.failing_sends.load(Ordering::SeqCst);
        if pending > 0 {
            self.failing_sends.store(pending - 1, Ordering::SeqCst);
            return Err(PlatformError::Transport("timed out".into()));
        }
        self.sent.lock().unwrap().push((chat_id, reply));
        Ok(())
    }
}
