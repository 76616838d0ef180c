//! Wi-Fi 接口的一次性配置记录
//!
//! 关闭省电、设置本地地址都只需对每个接口做一次。该记录跨越多次实验存活，
//! 由进程入口创建一次，再交给每次实验的 `WifiStation`。

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Default)]
struct Configured {
    power_save_off: HashSet<String>,
    local_ip: HashMap<String, String>,
}

/// 进程级共享；克隆得到的是同一份记录。
#[derive(Debug, Clone, Default)]
pub struct StationMemo {
    inner: Arc<Mutex<Configured>>,
}

impl StationMemo {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut Configured) -> T) -> T {
        let mut g = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut g)
    }

    pub fn power_save_disabled(&self, netif: &str) -> bool {
        self.with(|c| c.power_save_off.contains(netif))
    }

    pub fn mark_power_save_disabled(&self, netif: &str) {
        self.with(|c| c.power_save_off.insert(netif.to_string()));
    }

    /// 该接口当前记录的地址是否正是 `addr`
    pub fn has_local_ip(&self, netif: &str, addr: &str) -> bool {
        self.with(|c| c.local_ip.get(netif).is_some_and(|a| a == addr))
    }

    pub fn mark_local_ip(&self, netif: &str, addr: &str) {
        self.with(|c| c.local_ip.insert(netif.to_string(), addr.to_string()));
    }
}
