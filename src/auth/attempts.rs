use dashmap::DashMap;
use log::{debug, info, warn};
use std::time::{Duration, Instant};

/// 登录失败计数策略
#[derive(Debug, Clone)]
pub struct AttemptPolicy {
    pub max_attempts: u32,
    /// 自最后一次写入起的存活时间
    pub ttl: Duration,
    /// 最多跟踪的用户名数量
    pub capacity: usize,
}

impl Default for AttemptPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            ttl: Duration::from_secs(15 * 60),
            capacity: 100,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct AttemptEntry {
    count: u32,
    written_at: Instant,
}

impl AttemptEntry {
    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.written_at) >= ttl
    }
}

/// 进程内的登录失败计数器。
///
/// 单个用户名的递增在分片锁内完成，不会丢失更新；容量淘汰与并发写入之间允许短暂超出容量。
pub struct LoginAttemptTracker {
    policy: AttemptPolicy,
    entries: DashMap<String, AttemptEntry>,
}

impl LoginAttemptTracker {
    pub fn new(policy: AttemptPolicy) -> Self {
        info!(
            "初始化登录尝试计数器: 上限 {} 次, 有效期 {:?}, 容量 {}",
            policy.max_attempts, policy.ttl, policy.capacity
        );
        Self {
            policy,
            entries: DashMap::new(),
        }
    }

    /// 记录一次失败，返回当前计数
    pub fn record_failure(&self, username: &str) -> u32 {
        self.record_failure_at(username, Instant::now())
    }

    fn record_failure_at(&self, username: &str, now: Instant) -> u32 {
        let ttl = self.policy.ttl;
        let count = {
            let mut entry = self
                .entries
                .entry(username.to_string())
                .or_insert(AttemptEntry {
                    count: 0,
                    written_at: now,
                });
            if entry.is_expired(now, ttl) {
                entry.count = 0;
            }
            entry.count = entry.count.saturating_add(1);
            entry.written_at = now;
            entry.count
        };
        warn!("用户 {} 登录失败，当前失败次数: {}", username, count);

        self.evict_over_capacity(now);
        count
    }

    pub fn record_success(&self, username: &str) {
        if self.entries.remove(username).is_some() {
            debug!("用户 {} 的登录尝试记录已清除", username);
        }
    }

    /// 当前有效的失败次数，过期条目视为不存在
    pub fn attempts(&self, username: &str) -> u32 {
        self.attempts_at(username, Instant::now())
    }

    fn attempts_at(&self, username: &str, now: Instant) -> u32 {
        let ttl = self.policy.ttl;
        let expired = match self.entries.get(username) {
            Some(entry) if !entry.is_expired(now, ttl) => return entry.count,
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries
                .remove_if(username, |_, entry| entry.is_expired(now, ttl));
            debug!("用户 {} 的登录尝试记录已过期", username);
        }
        0
    }

    pub fn is_locked_out(&self, username: &str) -> bool {
        self.is_locked_out_at(username, Instant::now())
    }

    fn is_locked_out_at(&self, username: &str, now: Instant) -> bool {
        self.attempts_at(username, now) >= self.policy.max_attempts
    }

    /// 清理所有过期条目，返回清理数量
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    fn purge_expired_at(&self, now: Instant) -> usize {
        let ttl = self.policy.ttl;
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now, ttl));
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn evict_over_capacity(&self, now: Instant) {
        if self.entries.len() <= self.policy.capacity {
            return;
        }
        let purged = self.purge_expired_at(now);
        if purged > 0 {
            debug!("容量超限，清理了 {} 个过期条目", purged);
        }

        let excess = self.entries.len().saturating_sub(self.policy.capacity);
        if excess == 0 {
            return;
        }

        let mut oldest: Vec<(String, Instant)> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().written_at))
            .collect();
        oldest.sort_by_key(|(_, written_at)| *written_at);

        for (username, written_at) in oldest.into_iter().take(excess) {
            // 期间被重新写入的条目保留
            if self
                .entries
                .remove_if(&username, |_, entry| entry.written_at == written_at)
                .is_some()
            {
                debug!("容量超限，淘汰用户 {} 的登录尝试记录", username);
            }
        }
    }
}

impl Default for LoginAttemptTracker {
    fn default() -> Self {
        Self::new(AttemptPolicy::default())
    }
}
