// SSH 传输模块
//
// 模块结构:
// - config: 连接配置 (SshConfig, AuthMethod)
// - error: 错误类型 (SshError, SessionError)
// - event: 连接事件 (ConnectionEvent, ConnectionStage, LogEntry)
// - handler: russh Handler 实现
// - client: SSH 客户端核心（握手与认证）
// - session: 传输层 (ShellTransport, SshTransport)

pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod handler;
pub mod session;

pub use config::{AuthMethod, KeepaliveConfig, SshConfig};
pub use error::SessionError;
pub use session::{ShellTransport, SshTransportFactory, TransportFactory};
