// SSH 错误类型定义

use thiserror::Error;

/// SSH 错误类型（传输层内部使用，不会越过 ShellTransport 边界）
#[derive(Debug, Error)]
pub enum SshError {
    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO 错误（网络连接等）
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 认证失败
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// SSH 协议错误
    #[error("SSH protocol error: {0}")]
    Protocol(String),

    /// 密钥错误
    #[error("Key error: {0}")]
    Key(String),

    /// 连接超时
    #[error("Connection timeout after {0}s")]
    Timeout(u64),

    /// 通道错误
    #[error("Channel error: {0}")]
    Channel(String),

    /// 会话已断开
    #[error("Session disconnected: {0}")]
    Disconnected(String),
}

impl From<russh::Error> for SshError {
    fn from(e: russh::Error) -> Self {
        SshError::Protocol(e.to_string())
    }
}

impl From<russh::keys::Error> for SshError {
    fn from(e: russh::keys::Error) -> Self {
        SshError::Key(e.to_string())
    }
}

/// 会话控制器对外暴露的错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// 连接参数缺失或非法，不会发起任何网络操作
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// 连接阶段失败（认证、网络、超时）
    #[error("Connection failed: {0}")]
    Connection(String),

    /// 会话中途通道失效
    #[error("Transport error: {0}")]
    Transport(String),

    /// 已有命令在执行
    #[error("A command is already running")]
    Busy,

    /// 尚未连接
    #[error("Not connected")]
    NotConnected,
}
