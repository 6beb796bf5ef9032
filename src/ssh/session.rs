// SSH 会话（传输层）
// 持有已认证的连接和唯一的交互式 Shell 通道，并提供独立的静默执行通道

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{Handle, Msg};
use russh::{ChannelId, ChannelMsg};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use super::client::SshClient;
use super::config::SshConfig;
use super::error::SshError;
use super::event::{ConnectionEvent, ConnectionStage, LogEntry};
use super::handler::SshClientHandler;
use crate::constants::shell::ETX;
use crate::models::settings::SessionOptions;

/// 关闭通道时等待读取任务退出的最长时间
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// 交互式 Shell 传输层抽象
///
/// 所有失败都在这一层被吸收：连接失败转换为 `(false, message)`，
/// 静默查询失败返回空字符串，其他操作在没有通道时为空操作。
#[async_trait]
pub trait ShellTransport: Send + Sync {
    /// 建立连接、认证、打开交互通道并清空登录横幅
    async fn connect(&self) -> (bool, String);

    /// 底层连接是否仍然活跃
    fn is_active(&self) -> bool;

    /// 写入命令和换行符
    async fn send_line(&self, command: &str);

    /// 非阻塞读取当前缓冲的全部数据，没有数据时返回空
    fn drain_available(&self) -> Vec<u8>;

    /// 远端是否已经在交互通道上报告退出状态
    fn exit_status_ready(&self) -> bool;

    /// 在独立的一次性通道上执行命令，返回去掉尾部空白的 stdout
    async fn run_silent(&self, command: &str) -> String;

    /// 直接写入中断字节 (ETX)
    async fn send_interrupt(&self);

    /// 关闭通道和连接，可重复调用
    async fn close(&self);
}

/// 传输层工厂（控制器每次连接时创建新的传输层）
pub trait TransportFactory: Send + Sync {
    fn create(&self, config: SshConfig, options: &SessionOptions) -> Arc<dyn ShellTransport>;
}

/// 基于 russh 的传输层工厂
pub struct SshTransportFactory;

impl TransportFactory for SshTransportFactory {
    fn create(&self, config: SshConfig, options: &SessionOptions) -> Arc<dyn ShellTransport> {
        Arc::new(SshTransport::new(config, options))
    }
}

/// PTY 请求参数
#[derive(Clone, Debug)]
pub struct PtyRequest {
    /// 终端类型
    pub term: String,
    /// 列数
    pub col_width: u32,
    /// 行数
    pub row_height: u32,
    /// 终端模式
    pub modes: Vec<(russh::Pty, u32)>,
}

impl Default for PtyRequest {
    fn default() -> Self {
        Self {
            term: "xterm".to_string(),
            col_width: 200,
            row_height: 50,
            modes: vec![],
        }
    }
}

/// 已打开的交互式 Shell
/// 读取由后台任务完成，写入直接走 handle，避免读写互相阻塞
struct ShellChannel {
    handle: Arc<Handle<SshClientHandler>>,
    channel_id: ChannelId,
    output_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    exit_status: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    stop_tx: watch::Sender<bool>,
    reader: JoinHandle<()>,
}

/// russh 传输层实现
pub struct SshTransport {
    config: SshConfig,
    pty: PtyRequest,
    banner_settle: Duration,
    silent_timeout: Duration,
    shell: Mutex<Option<ShellChannel>>,
}

impl SshTransport {
    pub fn new(config: SshConfig, options: &SessionOptions) -> Self {
        Self {
            config,
            pty: PtyRequest {
                term: options.connection.term.clone(),
                ..Default::default()
            },
            banner_settle: options.stream.banner_settle(),
            silent_timeout: options.stream.silent_timeout(),
            shell: Mutex::new(None),
        }
    }

    fn shell(&self) -> MutexGuard<'_, Option<ShellChannel>> {
        self.shell.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 取出写入所需的 handle 和通道 ID（不跨 await 持有锁）
    fn writer(&self) -> Option<(Arc<Handle<SshClientHandler>>, ChannelId)> {
        self.shell()
            .as_ref()
            .map(|shell| (shell.handle.clone(), shell.channel_id))
    }

    /// 连接、认证并启动交互式 Shell
    async fn open_shell(&self) -> Result<ShellChannel, SshError> {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ConnectionEvent>();
        let target = self.config.target();
        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                event.emit(&target);
            }
        });

        let client = SshClient::new(self.config.clone(), event_tx);
        let handle = Arc::new(client.connect().await?);

        client.emit_stage(ConnectionStage::EstablishingChannel);
        let channel = handle
            .channel_open_session()
            .await
            .map_err(SshError::from)?;

        channel
            .request_pty(
                false,
                &self.pty.term,
                self.pty.col_width,
                self.pty.row_height,
                0,
                0,
                &self.pty.modes,
            )
            .await
            .map_err(SshError::from)?;

        client.emit_stage(ConnectionStage::StartingSession);
        channel.request_shell(false).await.map_err(SshError::from)?;

        let channel_id = channel.id();
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        let exit_status = Arc::new(AtomicBool::new(false));
        let closed = Arc::new(AtomicBool::new(false));

        let reader = tokio::spawn(pump_channel(
            channel,
            output_tx,
            exit_status.clone(),
            closed.clone(),
            stop_rx,
        ));

        client.emit_stage(ConnectionStage::Connected);
        client.log(LogEntry::info("Interactive shell ready"));

        Ok(ShellChannel {
            handle,
            channel_id,
            output_rx,
            exit_status,
            closed,
            stop_tx,
            reader,
        })
    }

    async fn exec_once(
        handle: Arc<Handle<SshClientHandler>>,
        command: &str,
    ) -> Result<Vec<u8>, SshError> {
        let mut channel = handle
            .channel_open_session()
            .await
            .map_err(SshError::from)?;

        channel
            .exec(true, command)
            .await
            .map_err(|e| SshError::Channel(e.to_string()))?;

        let mut stdout = Vec::new();
        loop {
            match channel.wait().await {
                Some(ChannelMsg::Data { data }) => stdout.extend_from_slice(&data),
                Some(ChannelMsg::ExitStatus { exit_status }) if exit_status != 0 => {
                    return Err(SshError::Channel(format!(
                        "Command exited with status {}",
                        exit_status
                    )));
                }
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => break,
                Some(_) => {}
            }
        }
        Ok(stdout)
    }
}

#[async_trait]
impl ShellTransport for SshTransport {
    async fn connect(&self) -> (bool, String) {
        if self.is_active() {
            return (true, format!("Already connected to {}", self.config.target()));
        }

        match self.open_shell().await {
            Ok(shell) => {
                *self.shell() = Some(shell);

                // 等待登录横幅输出后一次性丢弃（启发式，不保证完全清空）
                tokio::time::sleep(self.banner_settle).await;
                let banner = self.drain_available();
                debug!("[SSH] Discarded {} bytes of login banner", banner.len());

                info!("[SSH] Connected to {}", self.config.target());
                (true, format!("Connected to {}", self.config.target()))
            }
            Err(e) => {
                warn!("[SSH] Connection to {} failed: {}", self.config.target(), e);
                (false, e.to_string())
            }
        }
    }

    fn is_active(&self) -> bool {
        self.shell().as_ref().map_or(false, |shell| {
            !shell.handle.is_closed() && !shell.closed.load(Ordering::Acquire)
        })
    }

    async fn send_line(&self, command: &str) {
        let Some((handle, channel_id)) = self.writer() else {
            debug!("[SSH] send_line without channel ignored");
            return;
        };
        let line = format!("{}\n", command);
        if handle
            .data(channel_id, line.into_bytes().into())
            .await
            .is_err()
        {
            warn!("[SSH] Failed to send command to channel");
        }
    }

    fn drain_available(&self) -> Vec<u8> {
        let mut guard = self.shell();
        let Some(shell) = guard.as_mut() else {
            return Vec::new();
        };
        let mut buffer = Vec::new();
        while let Ok(bytes) = shell.output_rx.try_recv() {
            buffer.extend_from_slice(&bytes);
        }
        buffer
    }

    fn exit_status_ready(&self) -> bool {
        self.shell()
            .as_ref()
            .map_or(false, |shell| shell.exit_status.load(Ordering::Acquire))
    }

    async fn run_silent(&self, command: &str) -> String {
        let Some((handle, _)) = self.writer() else {
            return String::new();
        };
        match timeout(self.silent_timeout, Self::exec_once(handle, command)).await {
            Ok(Ok(stdout)) => String::from_utf8_lossy(&stdout).trim_end().to_string(),
            Ok(Err(e)) => {
                debug!("[SSH] Silent command '{}' failed: {}", command, e);
                String::new()
            }
            Err(_) => {
                debug!("[SSH] Silent command '{}' timed out", command);
                String::new()
            }
        }
    }

    async fn send_interrupt(&self) {
        let Some((handle, channel_id)) = self.writer() else {
            return;
        };
        if handle.data(channel_id, vec![ETX].into()).await.is_err() {
            warn!("[SSH] Failed to deliver interrupt");
        } else {
            debug!("[SSH] Interrupt delivered");
        }
    }

    async fn close(&self) {
        let taken = self.shell().take();
        let Some(shell) = taken else {
            return;
        };

        // 先关通道，再断开连接
        let _ = shell.stop_tx.send(true);
        if timeout(CLOSE_GRACE, shell.reader).await.is_err() {
            debug!("[SSH] Channel reader did not stop in time");
        }
        if let Err(e) = shell
            .handle
            .disconnect(russh::Disconnect::ByApplication, "", "English")
            .await
        {
            debug!("[SSH] Disconnect returned error: {}", e);
        }
        info!("[SSH] Session to {} closed", self.config.target());
    }
}

/// 交互通道读取循环：把数据转发到无界队列，供 drain_available 非阻塞读取
async fn pump_channel(
    mut channel: russh::Channel<Msg>,
    output_tx: mpsc::UnboundedSender<Vec<u8>>,
    exit_status: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    let _ = channel.eof().await;
                    let _ = channel.close().await;
                    break;
                }
            }
            msg = channel.wait() => match msg {
                Some(ChannelMsg::Data { data }) => {
                    trace!("[SSH] Received {} bytes", data.len());
                    let _ = output_tx.send(data.to_vec());
                }
                Some(ChannelMsg::ExtendedData { data, .. }) => {
                    let _ = output_tx.send(data.to_vec());
                }
                Some(ChannelMsg::ExitStatus { exit_status: status }) => {
                    debug!("[SSH] Shell exited with status {}", status);
                    exit_status.store(true, Ordering::Release);
                }
                Some(ChannelMsg::Close) | None => break,
                Some(_) => {}
            }
        }
    }
    closed.store(true, Ordering::Release);
}
