//! 设备应用状态
//!
//! 设备在 `S.app` 类别中以整数上报；顺序与设备固件中的枚举一致。

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppState {
    Idle,
    MakePassword,
    WaitDirectConnect,
    WaitPake,
    WaitDirectDisconnect,
    WaitInfraConnect,
    WaitNdncert,
    Success,
    Failure,
    Final,
}

impl AppState {
    pub const ALL: [AppState; 10] = [
        AppState::Idle,
        AppState::MakePassword,
        AppState::WaitDirectConnect,
        AppState::WaitPake,
        AppState::WaitDirectDisconnect,
        AppState::WaitInfraConnect,
        AppState::WaitNdncert,
        AppState::Success,
        AppState::Failure,
        AppState::Final,
    ];

    pub fn from_index(v: i64) -> Option<AppState> {
        usize::try_from(v).ok().and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn index(self) -> i64 {
        self as i64
    }
}
