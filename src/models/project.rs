// 项目连接参数和运行记录

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants::keys;
use crate::models::settings::ConnectionOptions;
use crate::services::storage::SettingsStore;
use crate::ssh::{AuthMethod, KeepaliveConfig, SessionError, SshConfig};

/// 认证凭据
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Credential {
    Password(String),
    KeyFile {
        path: PathBuf,
        passphrase: Option<String>,
    },
}

/// 从配置存储读取的连接参数
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub credential: Credential,
}

impl ConnectionSettings {
    /// 读取并校验连接参数
    /// 所有缺失字段一次性报告，不做任何网络操作
    pub fn from_store(store: &dyn SettingsStore) -> Result<Self, SessionError> {
        let value = |key: &str| store.get(key).filter(|v| !v.trim().is_empty());

        let host = value(keys::HOST);
        let user = value(keys::USER);
        let port = value(keys::PORT);
        let password = value(keys::PASSWORD);
        let key_path = value(keys::KEY_PATH);

        let mut missing = Vec::new();
        if host.is_none() {
            missing.push(keys::HOST);
        }
        if user.is_none() {
            missing.push(keys::USER);
        }
        if port.is_none() {
            missing.push(keys::PORT);
        }
        if password.is_none() && key_path.is_none() {
            missing.push("ssh_password or ssh_key_path");
        }
        if !missing.is_empty() {
            return Err(SessionError::Configuration(format!(
                "missing {}",
                missing.join(", ")
            )));
        }

        let port = port.unwrap_or_default();
        let port = port.trim().parse::<u16>().map_err(|_| {
            SessionError::Configuration(format!("invalid {}: '{}'", keys::PORT, port))
        })?;

        // 同时配置时优先使用私钥
        let credential = match key_path {
            Some(path) => Credential::KeyFile {
                path: PathBuf::from(path),
                passphrase: value(keys::KEY_PASSPHRASE),
            },
            None => Credential::Password(password.unwrap_or_default()),
        };

        Ok(Self {
            host: host.unwrap_or_default().trim().to_string(),
            port,
            user: user.unwrap_or_default().trim().to_string(),
            credential,
        })
    }

    /// 构建 SshConfig
    pub fn to_ssh_config(&self, options: &ConnectionOptions) -> SshConfig {
        let auth = match &self.credential {
            Credential::Password(password) => AuthMethod::Password(password.clone()),
            Credential::KeyFile { path, passphrase } => AuthMethod::PublicKey {
                key_path: path.clone(),
                passphrase: passphrase.clone(),
            },
        };

        SshConfig {
            host: self.host.clone(),
            port: self.port,
            username: self.user.clone(),
            auth,
            connect_timeout: u64::from(options.connection_timeout_secs),
            keepalive: KeepaliveConfig {
                enabled: options.keepalive_interval_secs > 0,
                interval: u64::from(options.keepalive_interval_secs),
                max_retries: 3,
            },
        }
    }
}

/// 最近运行的命令
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunEntry {
    pub project: String,
    pub command: String,
    pub cwd: Option<String>,
    pub ran_at: String,
}

impl RunEntry {
    pub fn now(project: &str, command: &str, cwd: Option<&str>) -> Self {
        Self {
            project: project.to_string(),
            command: command.to_string(),
            cwd: cwd.map(str::to_string),
            ran_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}
