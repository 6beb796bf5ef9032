// SSH 连接事件定义

use chrono::{DateTime, Local};
use tracing::{debug, error, info, warn};

/// 连接事件（连接过程中由 SshClient 发出）
#[derive(Clone, Debug)]
pub enum ConnectionEvent {
    /// 阶段变化
    StageChanged(ConnectionStage),
    /// 日志消息
    Log(LogEntry),
}

/// 连接阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionStage {
    /// 初始化（解析配置、准备连接）
    Initializing = 0,
    /// TCP 连接目标主机
    ConnectingHost = 1,
    /// SSH 握手（密钥交换）
    Handshaking = 2,
    /// 身份认证
    Authenticating = 3,
    /// 建立交互通道
    EstablishingChannel = 4,
    /// 启动 Shell
    StartingSession = 5,
    /// 连接完成
    Connected = 6,
}

impl ConnectionStage {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Initializing => "Initializing",
            Self::ConnectingHost => "Connecting to host",
            Self::Handshaking => "SSH handshake",
            Self::Authenticating => "Authenticating",
            Self::EstablishingChannel => "Establishing channel",
            Self::StartingSession => "Starting shell",
            Self::Connected => "Connected",
        }
    }
}

/// 日志级别
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

/// 日志条目
#[derive(Clone, Debug)]
pub struct LogEntry {
    /// 时间戳
    pub timestamp: DateTime<Local>,
    /// 日志级别
    pub level: LogLevel,
    /// 消息内容
    pub message: String,
}

impl LogEntry {
    /// 创建新的日志条目
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            level,
            message: message.into(),
        }
    }

    pub fn debug(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Debug, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warn, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, message)
    }

    /// 转发到 tracing
    pub fn emit(&self, target: &str) {
        let stamp = self.timestamp.format("%H:%M:%S%.3f");
        match self.level {
            LogLevel::Debug => debug!("[SSH] [{}] {} {}", target, stamp, self.message),
            LogLevel::Info => info!("[SSH] [{}] {} {}", target, stamp, self.message),
            LogLevel::Warn => warn!("[SSH] [{}] {} {}", target, stamp, self.message),
            LogLevel::Error => error!("[SSH] [{}] {} {}", target, stamp, self.message),
        }
    }
}

impl ConnectionEvent {
    /// 将连接事件写入日志
    pub fn emit(&self, target: &str) {
        match self {
            Self::StageChanged(stage) => debug!("[SSH] [{}] Stage: {}", target, stage.label()),
            Self::Log(entry) => entry.emit(target),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order() {
        assert!(ConnectionStage::Initializing < ConnectionStage::Authenticating);
        assert!(ConnectionStage::StartingSession < ConnectionStage::Connected);
    }

    #[test]
    fn test_log_entry_level() {
        let entry = LogEntry::warn("host key changed");
        assert_eq!(entry.level.as_str(), "WARN");
        assert_eq!(entry.message, "host key changed");
    }
}
