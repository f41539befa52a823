//! 状态缓存
//!
//! (地址, 命令码) 到最近一次观测帧的平面映射，不保留历史。
//! 条目在每次有效 WRITE 或合成响应时覆盖写入，从不过期，
//! 增长上界就是有限的地址/命令空间本身。

use std::collections::HashMap;

use parking_lot::Mutex;
use shortbus_protocol::{CacheKey, Frame};

/// 互斥保护的帧缓存
///
/// 所有操作都在同一把锁下进行，单次读或写各自原子。
/// 需要跨键的读-改-写序列（如 Spoofer 的镜像写入）按两次独立
/// 加锁执行：同一时刻只有一个工作器在跑，这不构成竞态。
#[derive(Debug, Default)]
pub struct StateCache {
    entries: Mutex<HashMap<CacheKey, Frame>>,
}

impl StateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以帧自身派生的键写入（覆盖旧值），返回该键
    pub fn write(&self, frame: Frame) -> CacheKey {
        let key = frame.cache_key();
        self.entries.lock().insert(key.clone(), frame);
        key
    }

    /// 读某个键下的帧；未命中返回 `None`，从不 panic
    pub fn read(&self, key: &CacheKey) -> Option<Frame> {
        self.entries.lock().get(key).cloned()
    }

    /// 读某个键下帧的负载（十六进制文本）
    pub fn read_data(&self, key: &CacheKey) -> Option<String> {
        self.entries.lock().get(key).map(|frame| frame.data.clone())
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// 按键排序的全量快照（供外部面板展示）
    pub fn snapshot(&self) -> Vec<(CacheKey, Frame)> {
        let mut entries: Vec<_> = self
            .entries
            .lock()
            .iter()
            .map(|(key, frame)| (key.clone(), frame.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}
