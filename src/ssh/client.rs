// SSH 客户端核心实现
// 负责 TCP 连接、握手和认证，返回已认证的 russh Handle

use std::net::ToSocketAddrs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use russh::client::Handle;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;

use super::config::{AuthMethod, SshConfig};
use super::error::SshError;
use super::event::{ConnectionEvent, ConnectionStage, LogEntry};
use super::handler::SshClientHandler;

/// SSH 客户端
pub struct SshClient {
    /// 连接配置
    config: SshConfig,
    /// 事件发送器
    event_sender: mpsc::UnboundedSender<ConnectionEvent>,
}

impl SshClient {
    pub fn new(config: SshConfig, event_sender: mpsc::UnboundedSender<ConnectionEvent>) -> Self {
        Self {
            config,
            event_sender,
        }
    }

    /// 发送阶段变化事件
    pub fn emit_stage(&self, stage: ConnectionStage) {
        let _ = self.event_sender.send(ConnectionEvent::StageChanged(stage));
    }

    /// 发送日志事件
    pub fn log(&self, entry: LogEntry) {
        let _ = self.event_sender.send(ConnectionEvent::Log(entry));
    }

    /// 建立连接并完成认证
    pub async fn connect(&self) -> Result<Handle<SshClientHandler>, SshError> {
        // 阶段 1: 初始化
        self.emit_stage(ConnectionStage::Initializing);
        self.log(LogEntry::info("Starting SSH connection..."));
        self.log(LogEntry::debug(format!("Target: {}", self.config.target())));

        // 解析地址
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let socket_addr = addr
            .to_socket_addrs()
            .map_err(|e| SshError::Config(format!("Failed to resolve address: {}", e)))?
            .next()
            .ok_or_else(|| SshError::Config("No valid address found".to_string()))?;

        // 阶段 2: TCP 连接
        self.emit_stage(ConnectionStage::ConnectingHost);
        self.log(LogEntry::info(format!("Connecting to {}...", socket_addr)));

        let connect_timeout = Duration::from_secs(self.config.connect_timeout);
        let tcp_stream = timeout(connect_timeout, TcpStream::connect(socket_addr))
            .await
            .map_err(|_| SshError::Timeout(self.config.connect_timeout))?
            .map_err(SshError::Io)?;

        self.log(LogEntry::info("TCP connection established"));

        // 阶段 3: SSH 握手
        self.emit_stage(ConnectionStage::Handshaking);
        let russh_config = Arc::new(self.config.to_russh_config());
        let handler = SshClientHandler::new(self.config.target(), self.event_sender.clone());

        let mut handle = timeout(
            connect_timeout,
            russh::client::connect_stream(russh_config, tcp_stream, handler),
        )
        .await
        .map_err(|_| SshError::Timeout(self.config.connect_timeout))?
        .map_err(SshError::from)?;

        self.log(LogEntry::info("SSH handshake completed"));

        // 阶段 4: 认证
        self.emit_stage(ConnectionStage::Authenticating);
        self.log(LogEntry::info(format!(
            "Authenticating as '{}'...",
            self.config.username
        )));

        self.authenticate(&mut handle).await?;

        self.log(LogEntry::info("Authentication successful"));
        Ok(handle)
    }

    /// 执行认证
    async fn authenticate(&self, handle: &mut Handle<SshClientHandler>) -> Result<(), SshError> {
        use russh::client::AuthResult;

        let auth_result = match &self.config.auth {
            AuthMethod::Password(password) => {
                self.log(LogEntry::debug("Using password authentication"));
                handle
                    .authenticate_password(&self.config.username, password)
                    .await
                    .map_err(SshError::from)?
            }
            AuthMethod::PublicKey {
                key_path,
                passphrase,
            } => {
                self.log(LogEntry::debug(format!(
                    "Using public key authentication: {:?}",
                    key_path
                )));

                let key = self
                    .load_private_key(key_path, passphrase.as_deref())
                    .await?;
                let key_with_alg = russh::keys::PrivateKeyWithHashAlg::new(Arc::new(key), None);

                handle
                    .authenticate_publickey(&self.config.username, key_with_alg)
                    .await
                    .map_err(SshError::from)?
            }
        };

        match auth_result {
            AuthResult::Success => Ok(()),
            AuthResult::Failure {
                partial_success: true,
                ..
            } => Err(SshError::Auth(
                "Partial authentication - additional auth required".to_string(),
            )),
            AuthResult::Failure {
                remaining_methods, ..
            } => Err(SshError::Auth(format!(
                "Server rejected credentials for '{}'. Server suggests: {:?}",
                self.config.username, remaining_methods
            ))),
        }
    }

    /// 加载私钥文件
    async fn load_private_key(
        &self,
        key_path: &Path,
        passphrase: Option<&str>,
    ) -> Result<russh::keys::PrivateKey, SshError> {
        let key_data = tokio::fs::read(key_path)
            .await
            .map_err(|e| SshError::Key(format!("Failed to read key file: {}", e)))?;

        russh::keys::decode_secret_key(&String::from_utf8_lossy(&key_data), passphrase)
            .map_err(|e| SshError::Key(format!("Failed to decode key: {}", e)))
    }
}
