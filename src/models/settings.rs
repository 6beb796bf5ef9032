// 会话选项配置数据结构

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 会话选项（持久化用）
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    pub connection: ConnectionOptions,
    pub stream: StreamOptions,
    pub tree: TreeOptions,
}

// ======================== 连接设置 ========================

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionOptions {
    pub connection_timeout_secs: u32,
    pub keepalive_interval_secs: u32,
    // 重连
    pub reconnect_attempts: u32,
    pub reconnect_interval_secs: u32,
    // PTY 终端类型
    pub term: String,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            connection_timeout_secs: 30,
            keepalive_interval_secs: 60,
            reconnect_attempts: 3,
            reconnect_interval_secs: 5,
            term: "xterm".to_string(),
        }
    }
}

// ======================== 输出流设置 ========================

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamOptions {
    /// 接收循环空闲时的轮询间隔
    pub poll_interval_ms: u64,
    /// 登录后等待横幅输出的时间
    pub banner_settle_ms: u64,
    /// 静默查询超时
    pub silent_timeout_secs: u64,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            poll_interval_ms: 50,
            banner_settle_ms: 1000,
            silent_timeout_secs: 10,
        }
    }
}

impl StreamOptions {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn banner_settle(&self) -> Duration {
        Duration::from_millis(self.banner_settle_ms)
    }

    pub fn silent_timeout(&self) -> Duration {
        Duration::from_secs(self.silent_timeout_secs)
    }
}

// ======================== 文件树设置 ========================

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeOptions {
    /// 生成文件列表的命令，每行一个绝对路径或 ./ 相对路径
    pub listing_command: String,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            listing_command: "find . -not -path '*/.*'".to_string(),
        }
    }
}
