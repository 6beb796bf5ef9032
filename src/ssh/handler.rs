// russh 回调：主机密钥检查
// 本组件不做主机密钥校验，指纹写入连接日志供用户核对

use std::future::Future;

use russh::keys::ssh_key::HashAlg;
use russh::keys::PublicKey;
use tokio::sync::mpsc;
use tracing::warn;

use super::event::{ConnectionEvent, LogEntry};

pub struct SshClientHandler {
    /// user@host:port，用于日志
    target: String,
    event_sender: mpsc::UnboundedSender<ConnectionEvent>,
}

impl SshClientHandler {
    pub fn new(target: String, event_sender: mpsc::UnboundedSender<ConnectionEvent>) -> Self {
        Self {
            target,
            event_sender,
        }
    }
}

impl russh::client::Handler for SshClientHandler {
    type Error = russh::Error;

    fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send {
        let fingerprint = server_public_key.fingerprint(HashAlg::Sha256);
        warn!(
            "[SSH] [{}] Host key not verified, accepting {} {}",
            self.target,
            server_public_key.algorithm(),
            fingerprint
        );
        let _ = self
            .event_sender
            .send(ConnectionEvent::Log(LogEntry::info(format!(
                "Server key fingerprint: {}",
                fingerprint
            ))));

        async { Ok(true) }
    }
}
