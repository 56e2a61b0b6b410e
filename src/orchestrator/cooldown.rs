//! 模型冷却表
//!
//! 只有调度任务写入（失败时设置、成功时清除），其他地方只读。

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

/// 冷却时间上限，避免超大配置值让 `Instant` 溢出
const MAX_COOLDOWN: Duration = Duration::from_secs(30 * 365 * 24 * 3600);

/// 模型 ID → 冷却到期时间
#[derive(Debug, Default)]
pub struct CooldownRegistry {
    entries: Mutex<HashMap<String, Instant>>,
}

impl CooldownRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Instant>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 剩余冷却时间；已过期或不在表中时返回 `None`
    pub fn remaining(&self, model: &str, now: Instant) -> Option<Duration> {
        self.entries()
            .get(model)
            .filter(|expiry| **expiry > now)
            .map(|expiry| *expiry - now)
    }

    pub fn is_cooling_down(&self, model: &str, now: Instant) -> bool {
        self.remaining(model, now).is_some()
    }

    /// 设置冷却，直到 `now + duration`
    pub fn start(&self, model: &str, now: Instant, duration: Duration) {
        let expiry = now
            .checked_add(duration)
            .unwrap_or_else(|| now + MAX_COOLDOWN);
        self.entries().insert(model.to_string(), expiry);
    }

    /// 清除冷却，返回之前是否存在记录
    pub fn clear(&self, model: &str) -> bool {
        self.entries().remove(model).is_some()
    }

    /// 当前仍在冷却中的模型及剩余时间
    pub fn active(&self, now: Instant) -> Vec<(String, Duration)> {
        let mut active: Vec<(String, Duration)> = self
            .entries()
            .iter()
            .filter(|(_, expiry)| **expiry > now)
            .map(|(model, expiry)| (model.clone(), *expiry - now))
            .collect();
        active.sort();
        active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_and_expire() {
        let registry = CooldownRegistry::new();
        let now = Instant::now();
        registry.start("gemini-2.5-flash", now, Duration::from_secs(180));

        assert!(registry.is_cooling_down("gemini-2.5-flash", now));
        assert_eq!(
            registry.remaining("gemini-2.5-flash", now + Duration::from_secs(60)),
            Some(Duration::from_secs(120))
        );
        // 到期即可再次使用
        assert!(!registry.is_cooling_down("gemini-2.5-flash", now + Duration::from_secs(180)));
        assert!(!registry.is_cooling_down("gemini-2.5-pro", now));
    }

    #[test]
    fn test_clear() {
        let registry = CooldownRegistry::new();
        let now = Instant::now();
        registry.start("a", now, Duration::from_secs(10));

        assert!(registry.clear("a"));
        assert!(!registry.clear("a"));
        assert!(!registry.is_cooling_down("a", now));
    }

    #[test]
    fn test_active_lists_only_unexpired() {
        let registry = CooldownRegistry::new();
        let now = Instant::now();
        registry.start("b", now, Duration::from_secs(30));
        registry.start("a", now, Duration::from_secs(5));

        let later = now + Duration::from_secs(10);
        assert_eq!(registry.active(later), vec![("b".to_string(), Duration::from_secs(20))]);
    }

    #[test]
    fn test_huge_duration_does_not_overflow() {
        let registry = CooldownRegistry::new();
        let now = Instant::now();
        registry.start("a", now, Duration::MAX);
        assert!(registry.is_cooling_down("a", now + Duration::from_secs(365 * 24 * 3600)));
    }
}
