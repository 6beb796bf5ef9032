// 会话控制器
// 持有连接状态、当前工作目录和唯一的活动执行，负责把执行结果路由给监听者
//
// 执行器的文本块和完成通知通过 mpsc 送回控制器，由调用方在自己的任务上
// 调用 recv_event / handle_event 处理，监听者因此永远不会在工作任务上被调用。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use super::command::{
    classify, file_read_command, file_save_command, optimistic_cd, reconcile_query, Classification,
};
use super::event::SessionEvent;
use super::execution::{Chunk, CommandExecution, RunOutcome};
use super::runner::{CommandRunner, RunnerHandle};
use crate::models::project::{ConnectionSettings, RunEntry};
use crate::models::settings::SessionOptions;
use crate::models::tree::build_tree;
use crate::services::storage::SettingsStore;
use crate::ssh::{SessionError, ShellTransport, TransportFactory};

pub type Listener = Box<dyn FnMut(&SessionEvent) + Send>;

/// 会话状态
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    Disconnected,
    Connecting,
    Connected,
    /// 有命令正在执行
    Busy,
}

/// 执行器送回控制器的消息
#[derive(Debug)]
pub enum RunnerEvent {
    Chunk { execution: Uuid, chunk: Chunk },
    Finished { execution: Uuid, outcome: RunOutcome },
}

struct ActiveRun {
    execution: CommandExecution,
    runner: RunnerHandle,
}

/// 会话控制器
pub struct SessionController {
    project: String,
    store: Arc<dyn SettingsStore>,
    factory: Arc<dyn TransportFactory>,
    options: SessionOptions,
    status: SessionStatus,
    transport: Option<Arc<dyn ShellTransport>>,
    cwd: Option<String>,
    active: Option<ActiveRun>,
    listeners: Vec<Listener>,
    events_tx: mpsc::UnboundedSender<RunnerEvent>,
    events_rx: mpsc::UnboundedReceiver<RunnerEvent>,
}

impl SessionController {
    pub fn new(
        project: impl Into<String>,
        store: Arc<dyn SettingsStore>,
        factory: Arc<dyn TransportFactory>,
        options: SessionOptions,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            project: project.into(),
            store,
            factory,
            options,
            status: SessionStatus::Disconnected,
            transport: None,
            cwd: None,
            active: None,
            listeners: Vec::new(),
            events_tx,
            events_rx,
        }
    }

    pub fn add_listener(&mut self, listener: impl FnMut(&SessionEvent) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// 当前认为的工作目录
    pub fn cwd(&self) -> Option<&str> {
        self.cwd.as_deref()
    }

    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    fn emit(&mut self, event: SessionEvent) {
        for listener in self.listeners.iter_mut() {
            listener(&event);
        }
    }

    // ======================== 连接 ========================

    /// 连接远端主机
    ///
    /// 配置不完整时在任何网络操作之前返回 `Configuration` 错误。
    /// 连接失败后保持 Disconnected，错误消息同时发布给监听者。
    pub async fn connect(&mut self) -> Result<(), SessionError> {
        if self.transport.is_some() {
            debug!("[Controller] [{}] Already connected", self.project);
            return Ok(());
        }

        let settings = match ConnectionSettings::from_store(self.store.as_ref()) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("[Controller] [{}] {}", self.project, e);
                self.emit(SessionEvent::Log(e.to_string()));
                return Err(e);
            }
        };

        self.status = SessionStatus::Connecting;
        let config = settings.to_ssh_config(&self.options.connection);
        info!("[Controller] [{}] Connecting to {}", self.project, config.target());

        let transport = self.factory.create(config, &self.options);
        let (connected, message) = transport.connect().await;
        if !connected {
            let err = SessionError::Connection(message);
            error!("[Controller] [{}] {}", self.project, err);
            self.status = SessionStatus::Disconnected;
            self.emit(SessionEvent::Log(err.to_string()));
            return Err(err);
        }

        self.transport = Some(transport);
        self.status = SessionStatus::Connected;
        self.emit(SessionEvent::Log(message));
        self.emit(SessionEvent::ConnectionStatus(true));

        self.reconcile_cwd(None).await;
        if let Err(e) = self.refresh_tree() {
            debug!("[Controller] [{}] Initial tree refresh skipped: {}", self.project, e);
        }
        Ok(())
    }

    /// 断开后按配置重试连接
    pub async fn reconnect(&mut self) -> Result<(), SessionError> {
        let attempts = self.options.connection.reconnect_attempts.max(1);
        let interval = Duration::from_secs(u64::from(
            self.options.connection.reconnect_interval_secs,
        ));

        self.teardown(None).await;

        let mut last_error = SessionError::NotConnected;
        for attempt in 1..=attempts {
            info!(
                "[Reconnect] [{}] Attempt {}/{}",
                self.project, attempt, attempts
            );
            match self.connect().await {
                Ok(()) => {
                    info!("[Reconnect] [{}] Reconnected", self.project);
                    return Ok(());
                }
                Err(e @ SessionError::Configuration(_)) => return Err(e),
                Err(e) => {
                    warn!("[Reconnect] [{}] Attempt {} failed: {}", self.project, attempt, e);
                    last_error = e;
                }
            }
            if attempt < attempts {
                tokio::time::sleep(interval).await;
            }
        }

        error!(
            "[Reconnect] [{}] Giving up after {} attempts",
            self.project, attempts
        );
        Err(last_error)
    }

    /// 应用退出时释放连接
    pub async fn shutdown(&mut self) {
        if self.transport.is_some() || self.active.is_some() {
            self.teardown(None).await;
        }
    }

    /// 关闭连接并重置依赖的视图
    async fn teardown(&mut self, reason: Option<String>) {
        if let Some(active) = self.active.take() {
            if !active.runner.is_finished() {
                debug!(
                    "[Controller] [{}] Abandoning '{}'",
                    self.project, active.execution.command
                );
                active.runner.cancel();
            }
        }
        if let Some(transport) = self.transport.take() {
            transport.close().await;
        }
        self.status = SessionStatus::Disconnected;
        self.cwd = None;

        if let Some(reason) = reason {
            warn!("[Controller] [{}] {}", self.project, reason);
            self.emit(SessionEvent::Log(reason));
        }
        info!("[Controller] [{}] Disconnected", self.project);
        self.emit(SessionEvent::ConnectionStatus(false));
        self.emit(SessionEvent::Directory(None));
        self.emit(SessionEvent::TreeUpdated(Vec::new()));
        self.emit(SessionEvent::EditorReset);
    }

    // ======================== 命令提交 ========================

    /// 提交用户输入的命令
    ///
    /// exit 和中断不受忙碌限制，其余命令在执行期间被拒绝。
    pub async fn submit(&mut self, command: &str) -> Result<Classification, SessionError> {
        let classification = classify(command);
        if !classification.bypasses_busy_gate() {
            self.ensure_idle()?;
        }
        match classification {
            Classification::Exit => {
                info!("[Controller] [{}] Exit requested", self.project);
                self.teardown(None).await;
            }
            Classification::Interrupt => {
                let transport = self.transport.clone().ok_or(SessionError::NotConnected)?;
                info!("[Controller] [{}] Sending interrupt", self.project);
                transport.send_interrupt().await;
            }
            _ => {
                if classification == Classification::DirectoryChange {
                    let believed = optimistic_cd(self.cwd.as_deref(), command);
                    if believed != self.cwd {
                        self.cwd = believed;
                        self.emit(SessionEvent::Directory(self.cwd.clone()));
                    }
                }
                self.record_run(command);
                self.start_execution(command, classification, None)?;
            }
        }
        Ok(classification)
    }

    /// 读取远端文件到文件视图
    pub fn open_file(&mut self, path: &str) -> Result<Uuid, SessionError> {
        self.ensure_idle()?;
        self.emit(SessionEvent::FileOpened {
            path: path.to_string(),
        });
        self.start_execution(
            &file_read_command(path),
            Classification::FileRead,
            Some(path.to_string()),
        )
    }

    /// 把编辑后的内容写回远端文件
    pub fn save_file(&mut self, path: &str, content: &str) -> Result<Uuid, SessionError> {
        self.start_execution(
            &file_save_command(path, content),
            Classification::FileSave,
            Some(path.to_string()),
        )
    }

    /// 重新列出当前目录并重建文件树
    pub fn refresh_tree(&mut self) -> Result<Uuid, SessionError> {
        let command = self.options.tree.listing_command.clone();
        self.start_execution(&command, Classification::TreeRefresh, None)
    }

    /// 本地取消当前执行（远端进程不会收到信号）
    /// 没有执行或已经请求过取消时返回 false
    pub fn cancel(&mut self) -> bool {
        match &self.active {
            Some(active) if active.runner.is_cancelled() => {
                debug!("[Controller] [{}] Cancellation already requested", self.project);
                false
            }
            Some(active) => {
                info!(
                    "[Controller] [{}] Cancelling '{}'",
                    self.project, active.execution.command
                );
                active.runner.cancel();
                true
            }
            None => false,
        }
    }

    fn ensure_idle(&self) -> Result<Arc<dyn ShellTransport>, SessionError> {
        let transport = self.transport.clone().ok_or(SessionError::NotConnected)?;
        if self.active.is_some() {
            return Err(SessionError::Busy);
        }
        Ok(transport)
    }

    fn record_run(&self, command: &str) {
        let entry = RunEntry::now(&self.project, command, self.cwd.as_deref());
        if let Err(e) = self.store.add_run(entry) {
            warn!("[Controller] [{}] Failed to record run: {}", self.project, e);
        }
    }

    fn start_execution(
        &mut self,
        command: &str,
        classification: Classification,
        target: Option<String>,
    ) -> Result<Uuid, SessionError> {
        let transport = self.ensure_idle()?;
        let execution = CommandExecution::new(command, classification, self.cwd.clone(), target);
        let id = execution.id;

        let chunk_tx = self.events_tx.clone();
        let done_tx = self.events_tx.clone();
        let runner = CommandRunner::new(
            command,
            classification,
            self.options.stream.poll_interval(),
        )
        .on_chunk(move |chunk| {
            let _ = chunk_tx.send(RunnerEvent::Chunk {
                execution: id,
                chunk: chunk.clone(),
            });
        })
        .on_complete(move |outcome| {
            let _ = done_tx.send(RunnerEvent::Finished {
                execution: id,
                outcome,
            });
        })
        .start(transport);

        debug!(
            "[Controller] [{}] Started {:?} '{}'",
            self.project, classification, command
        );
        self.active = Some(ActiveRun { execution, runner });
        self.status = SessionStatus::Busy;
        Ok(id)
    }

    // ======================== 执行结果 ========================

    /// 等待下一条执行器消息（可在 select! 中使用）
    pub async fn recv_event(&mut self) -> Option<RunnerEvent> {
        self.events_rx.recv().await
    }

    /// 处理执行器消息，已被取代的执行发来的消息直接丢弃
    pub async fn handle_event(&mut self, event: RunnerEvent) {
        match event {
            RunnerEvent::Chunk { execution, chunk } => self.route_chunk(execution, chunk),
            RunnerEvent::Finished { execution, outcome } => {
                self.finish_execution(execution, outcome).await
            }
        }
    }

    /// 处理消息直到没有活动执行
    pub async fn wait_idle(&mut self) {
        while self.active.is_some() {
            match self.events_rx.recv().await {
                Some(event) => self.handle_event(event).await,
                None => break,
            }
        }
    }

    fn is_current(&self, id: Uuid) -> bool {
        self.active
            .as_ref()
            .map_or(false, |active| active.execution.id == id)
    }

    fn route_chunk(&mut self, id: Uuid, chunk: Chunk) {
        let Some(active) = self.active.as_mut().filter(|active| active.execution.id == id) else {
            trace!("[Controller] Dropping chunk from stale execution {}", id);
            return;
        };
        active.execution.push(chunk.clone());

        let event = match (active.execution.classification, chunk) {
            // 列表输出只用于构建文件树
            (Classification::TreeRefresh, _) => return,
            (Classification::FileRead, Chunk::Output(text)) => SessionEvent::FileContent(text),
            (_, Chunk::Output(text)) => SessionEvent::Console(text),
            (_, Chunk::DirectoryChanged) => SessionEvent::CdSucceeded,
        };
        self.emit(event);
    }

    async fn finish_execution(&mut self, id: Uuid, outcome: RunOutcome) {
        if !self.is_current(id) {
            trace!("[Controller] Ignoring completion of stale execution {}", id);
            return;
        }
        let Some(ActiveRun { mut execution, .. }) = self.active.take() else {
            return;
        };
        execution.complete();
        self.status = SessionStatus::Connected;
        let classification = execution.classification;
        info!(
            "[Controller] [{}] '{}' finished ({:?})",
            self.project, execution.command, outcome
        );

        match classification {
            Classification::TreeRefresh if outcome == RunOutcome::Completed => {
                let listing = execution.output();
                let tree = build_tree(listing.lines(), execution.cwd_before.as_deref());
                debug!("[Controller] [{}] Tree has {} top-level entries", self.project, tree.len());
                self.emit(SessionEvent::TreeUpdated(tree));
            }
            Classification::FileRead => {
                if let Some(path) = execution.target.clone() {
                    self.emit(SessionEvent::FileLoaded { path });
                }
            }
            Classification::FileSave if outcome == RunOutcome::Completed => {
                if let Some(path) = execution.target.clone() {
                    self.emit(SessionEvent::FileSaved { path });
                }
            }
            _ => {}
        }

        let alive = self
            .transport
            .as_ref()
            .map_or(false, |transport| transport.is_active());
        if !alive {
            let reason = SessionError::Transport("connection to remote host lost".to_string());
            self.teardown(Some(reason.to_string())).await;
            return;
        }

        // cd 失败时乐观目录不存在，以执行前的目录作为备选
        let fallback = match classification {
            Classification::DirectoryChange => execution.cwd_before.clone(),
            _ => None,
        };
        self.reconcile_cwd(fallback).await;
        self.emit(SessionEvent::CommandFinished {
            command: execution.command.clone(),
            classification,
            outcome,
        });

        if classification == Classification::GitClone && outcome == RunOutcome::Completed {
            self.emit(SessionEvent::MetricsRefreshRequested);
            if let Err(e) = self.refresh_tree() {
                warn!("[Controller] [{}] Tree refresh after clone failed: {}", self.project, e);
            }
        }
    }

    /// 通过静默通道查询真实工作目录
    /// 结果不可用时退回 fallback（如果有），否则保留原值
    async fn reconcile_cwd(&mut self, fallback: Option<String>) {
        let Some(transport) = self.transport.clone() else {
            return;
        };
        let query = reconcile_query(self.cwd.as_deref(), fallback.as_deref());
        let result = transport.run_silent(&query).await;
        let path = result.lines().last().unwrap_or("").trim();

        let reconciled = if path.starts_with('/') {
            Some(path.to_string())
        } else {
            debug!(
                "[Controller] [{}] Working directory query returned nothing usable",
                self.project
            );
            fallback
        };
        if let Some(cwd) = reconciled {
            if self.cwd.as_deref() != Some(cwd.as_str()) {
                self.cwd = Some(cwd);
                self.emit(SessionEvent::Directory(self.cwd.clone()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::constants::keys;
    use crate::models::TreeNode;
    use crate::services::storage::MemorySettingsStore;
    use crate::shell::testing::{ScriptedFactory, ScriptedTransport};

    struct Harness {
        controller: SessionController,
        transport: Arc<ScriptedTransport>,
        factory: Arc<ScriptedFactory>,
        store: Arc<MemorySettingsStore>,
        events: Arc<Mutex<Vec<SessionEvent>>>,
    }

    impl Harness {
        fn events(&self) -> Vec<SessionEvent> {
            self.events.lock().unwrap().clone()
        }

        fn clear_events(&self) {
            self.events.lock().unwrap().clear();
        }
    }

    fn options() -> SessionOptions {
        let mut options = SessionOptions::default();
        options.stream.poll_interval_ms = 1;
        options.connection.reconnect_attempts = 2;
        options.connection.reconnect_interval_secs = 0;
        options.tree.listing_command = "find .".to_string();
        options
    }

    fn configured_store() -> Arc<MemorySettingsStore> {
        let store = MemorySettingsStore::default();
        store.set(keys::HOST, "10.0.0.5").unwrap();
        store.set(keys::USER, "user").unwrap();
        store.set(keys::PORT, "22").unwrap();
        store.set(keys::PASSWORD, "secret").unwrap();
        Arc::new(store)
    }

    fn harness(transport: ScriptedTransport, store: Arc<MemorySettingsStore>) -> Harness {
        let transport = Arc::new(transport);
        let factory = Arc::new(ScriptedFactory::new(transport.clone()));
        let mut controller =
            SessionController::new("demo", store.clone(), factory.clone(), options());
        let events = Arc::new(Mutex::new(Vec::new()));
        let recorded = events.clone();
        controller.add_listener(move |event| recorded.lock().unwrap().push(event.clone()));
        Harness {
            controller,
            transport,
            factory,
            store,
            events,
        }
    }

    /// 让出执行权，等执行器任务发出命令并进入轮询
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    /// 已连接、初始文件树已加载的会话
    async fn connected() -> Harness {
        let mut h = harness(ScriptedTransport::disconnected(), configured_store());
        h.transport.set_silent_result("/home/user");
        h.transport
            .respond("find .", &["find .\r\n", ".\r\n./a\r\n./a/b.py\r\n./c.py\r\n", "user@host:~$ "]);
        h.controller.connect().await.unwrap();
        h.controller.wait_idle().await;
        h.clear_events();
        h
    }

    #[tokio::test]
    async fn test_connect_publishes_status_directory_and_tree() {
        let mut h = harness(ScriptedTransport::disconnected(), configured_store());
        h.transport.set_silent_result("/home/user\n");
        h.transport.respond("find .", &["find .\r\n./a\r\n./a/b.py\r\n./c.py\r\n$ "]);

        h.controller.connect().await.unwrap();
        assert_eq!(h.controller.status(), SessionStatus::Busy);
        h.controller.wait_idle().await;

        assert_eq!(h.controller.status(), SessionStatus::Connected);
        assert_eq!(h.controller.cwd(), Some("/home/user"));
        assert_eq!(h.factory.configs()[0].target(), "user@10.0.0.5:22");
        assert_eq!(h.transport.silent_queries()[0], "pwd");

        let events = h.events();
        assert!(events.contains(&SessionEvent::ConnectionStatus(true)));
        assert!(events.contains(&SessionEvent::Directory(Some("/home/user".into()))));
        assert!(!events.iter().any(|e| matches!(e, SessionEvent::Console(_))));

        let tree = events
            .iter()
            .find_map(|e| match e {
                SessionEvent::TreeUpdated(tree) => Some(tree.clone()),
                _ => None,
            })
            .unwrap();
        let names: Vec<&str> = tree.iter().map(|node| node.name.as_str()).collect();
        assert_eq!(names, vec!["a", "c.py"]);
        assert_eq!(
            tree[0].children,
            vec![TreeNode {
                name: "b.py".into(),
                children: Vec::new()
            }]
        );
    }

    #[tokio::test]
    async fn test_auth_failure_stays_disconnected() {
        let mut h = harness(
            ScriptedTransport::failing("Authentication failed: password rejected"),
            configured_store(),
        );

        let err = h.controller.connect().await.unwrap_err();
        assert!(matches!(err, SessionError::Connection(ref m) if m.contains("password rejected")));
        assert_eq!(h.controller.status(), SessionStatus::Disconnected);

        let logs: Vec<SessionEvent> = h
            .events()
            .into_iter()
            .filter(|e| matches!(e, SessionEvent::Log(_)))
            .collect();
        assert_eq!(logs.len(), 1);

        assert_eq!(
            h.controller.submit("ls").await,
            Err(SessionError::NotConnected)
        );
        assert!(h.transport.sent_lines().is_empty());
    }

    #[tokio::test]
    async fn test_incomplete_configuration_refused_before_network() {
        let store = Arc::new(MemorySettingsStore::default());
        store.set(keys::HOST, "10.0.0.5").unwrap();
        let mut h = harness(ScriptedTransport::disconnected(), store);

        let err = h.controller.connect().await.unwrap_err();
        assert!(matches!(err, SessionError::Configuration(_)));
        assert_eq!(h.transport.connect_calls(), 0);
        assert!(h.factory.configs().is_empty());
        assert_eq!(h.controller.status(), SessionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_normal_command_streams_to_console() {
        let mut h = connected().await;
        h.transport.respond("ls", &["ls\r\nnotes.txt\r\n", "user@host:~$ "]);

        assert_eq!(h.controller.submit("ls").await, Ok(Classification::Normal));
        h.controller.wait_idle().await;

        let events = h.events();
        assert_eq!(events[0], SessionEvent::Console("notes.txt\r\n".into()));
        assert_eq!(
            events.last(),
            Some(&SessionEvent::CommandFinished {
                command: "ls".into(),
                classification: Classification::Normal,
                outcome: RunOutcome::Completed,
            })
        );

        let runs = h.store.runs();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].command, "ls");
        assert_eq!(runs[0].cwd.as_deref(), Some("/home/user"));
    }

    #[tokio::test]
    async fn test_busy_rejects_second_command() {
        let mut h = connected().await;
        h.transport.respond("sleep 5", &["sleep 5\r\n"]);

        h.controller.submit("sleep 5").await.unwrap();
        settle().await;
        assert_eq!(h.controller.status(), SessionStatus::Busy);
        assert_eq!(h.controller.submit("ls").await, Err(SessionError::Busy));
        assert_eq!(h.controller.submit("cd /tmp").await, Err(SessionError::Busy));
        assert_eq!(h.controller.cwd(), Some("/home/user"));
        assert_eq!(h.transport.sent_lines(), vec!["find .", "sleep 5"]);
        assert!(h.controller.open_file("a.txt").is_err());

        h.transport.push_output("$ ");
        h.controller.wait_idle().await;
        assert_eq!(h.controller.status(), SessionStatus::Connected);

        h.transport.respond("ls", &["ls\r\n$ "]);
        assert!(h.controller.submit("ls").await.is_ok());
        h.controller.wait_idle().await;
        assert_eq!(h.transport.sent_lines(), vec!["find .", "sleep 5", "ls"]);
    }

    #[tokio::test]
    async fn test_interrupt_bypasses_busy_gate() {
        let mut h = connected().await;
        h.transport.respond("top", &["top\r\n"]);
        h.controller.submit("top").await.unwrap();
        settle().await;

        assert_eq!(
            h.controller.submit("Ctrl+C").await,
            Ok(Classification::Interrupt)
        );
        assert_eq!(h.transport.interrupts(), 1);
        assert!(h.controller.is_busy());

        h.transport.push_output("^C\r\nuser@host:~$ ");
        h.controller.wait_idle().await;
        assert_eq!(h.controller.status(), SessionStatus::Connected);
    }

    #[tokio::test]
    async fn test_cd_uses_authoritative_directory() {
        let mut h = connected().await;
        h.transport.respond("cd foo", &["cd foo\r\n", "user@host:~/foo$ "]);
        h.transport.set_silent_result("/mnt/data/foo");

        h.controller.submit("cd foo").await.unwrap();
        assert_eq!(h.controller.cwd(), Some("/home/user/foo"));
        h.controller.wait_idle().await;

        assert_eq!(h.controller.cwd(), Some("/mnt/data/foo"));
        assert_eq!(
            h.transport.silent_queries().last().map(String::as_str),
            Some("{ cd /home/user/foo || cd /home/user; } 2>/dev/null && pwd")
        );

        let events = h.events();
        assert_eq!(
            events[..3],
            [
                SessionEvent::Directory(Some("/home/user/foo".into())),
                SessionEvent::CdSucceeded,
                SessionEvent::Directory(Some("/mnt/data/foo".into())),
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_silent_result_keeps_directory() {
        let mut h = connected().await;
        h.transport.respond("ls", &["ls\r\nnotes.txt\r\n$ "]);
        h.transport.set_silent_result("");

        h.controller.submit("ls").await.unwrap();
        h.controller.wait_idle().await;
        assert_eq!(h.controller.cwd(), Some("/home/user"));
    }

    #[tokio::test]
    async fn test_failed_cd_reverts_to_previous_directory() {
        let mut h = connected().await;
        h.transport.respond(
            "cd nope",
            &["cd nope\r\nbash: cd: nope: No such file or directory\r\nuser@host:~$ "],
        );
        h.transport.respond("ls", &["ls\r\nnotes.txt\r\n$ "]);
        h.transport.set_silent_result("");

        h.controller.submit("cd nope").await.unwrap();
        assert_eq!(h.controller.cwd(), Some("/home/user/nope"));
        h.controller.wait_idle().await;
        assert_eq!(h.controller.cwd(), Some("/home/user"));

        h.controller.submit("ls").await.unwrap();
        h.controller.wait_idle().await;
        assert_eq!(h.controller.cwd(), Some("/home/user"));

        let queries = h.transport.silent_queries();
        assert_eq!(
            queries[queries.len() - 2..],
            [
                "{ cd /home/user/nope || cd /home/user; } 2>/dev/null && pwd".to_string(),
                "cd /home/user 2>/dev/null && pwd".to_string(),
            ]
        );
        assert!(h.events().contains(&SessionEvent::Directory(Some("/home/user".into()))));
    }

    #[tokio::test]
    async fn test_failed_cd_uses_fallback_answer() {
        let mut h = connected().await;
        h.transport.respond(
            "cd nope",
            &["cd nope\r\nbash: cd: nope: No such file or directory\r\n$ "],
        );

        // 备选目录查询得到真实目录
        h.controller.submit("cd nope").await.unwrap();
        h.controller.wait_idle().await;
        assert_eq!(h.controller.cwd(), Some("/home/user"));
    }

    #[tokio::test]
    async fn test_exit_while_busy_tears_down() {
        let mut h = connected().await;
        h.transport.respond("sleep 100", &["sleep 100\r\n"]);
        h.controller.submit("sleep 100").await.unwrap();
        settle().await;

        assert_eq!(h.controller.submit("exit").await, Ok(Classification::Exit));
        assert_eq!(h.controller.status(), SessionStatus::Disconnected);
        assert_eq!(h.controller.cwd(), None);
        assert!(!h.controller.is_busy());
        assert_eq!(h.transport.close_calls(), 1);
        assert!(!h.transport.is_active());

        assert_eq!(
            h.events(),
            vec![
                SessionEvent::ConnectionStatus(false),
                SessionEvent::Directory(None),
                SessionEvent::TreeUpdated(Vec::new()),
                SessionEvent::EditorReset,
            ]
        );

        // 被放弃的执行随后送达的完成通知不应改变状态
        let late = tokio::time::timeout(Duration::from_secs(1), h.controller.recv_event())
            .await
            .unwrap()
            .unwrap();
        h.controller.handle_event(late).await;
        assert_eq!(h.controller.status(), SessionStatus::Disconnected);

        h.controller.shutdown().await;
        assert_eq!(h.transport.close_calls(), 1);
    }

    #[tokio::test]
    async fn test_transport_loss_tears_down() {
        let mut h = connected().await;
        h.transport.respond("make", &["make\r\n"]);
        h.controller.submit("make").await.unwrap();
        settle().await;

        h.transport.drop_connection();
        h.controller.wait_idle().await;

        assert_eq!(h.controller.status(), SessionStatus::Disconnected);
        let events = h.events();
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::Log(m) if m.starts_with("Transport error"))));
        assert!(events.contains(&SessionEvent::ConnectionStatus(false)));
        assert!(!events
            .iter()
            .any(|e| matches!(e, SessionEvent::CommandFinished { .. })));
    }

    #[tokio::test]
    async fn test_open_file_routes_to_file_view() {
        let mut h = connected().await;
        h.transport.respond(
            "cat -- notes.txt",
            &["cat -- notes.txt\r\nhello\r\n", "world\r\n$ "],
        );

        h.controller.open_file("notes.txt").unwrap();
        h.controller.wait_idle().await;

        let events = h.events();
        assert_eq!(
            events[..4],
            [
                SessionEvent::FileOpened {
                    path: "notes.txt".into()
                },
                SessionEvent::FileContent("hello\r\n".into()),
                SessionEvent::FileContent("world".into()),
                SessionEvent::FileLoaded {
                    path: "notes.txt".into()
                },
            ]
        );
        assert!(!events.iter().any(|e| matches!(e, SessionEvent::Console(_))));
        assert!(h.store.runs().is_empty());
    }

    #[tokio::test]
    async fn test_save_file_sends_single_line() {
        let mut h = connected().await;
        let command = file_save_command("notes.txt", "a\nb\n");
        h.transport.respond(&command, &[&format!("{}\r\n$ ", command)]);

        h.controller.save_file("notes.txt", "a\nb\n").unwrap();
        h.controller.wait_idle().await;

        assert_eq!(h.transport.sent_lines().last(), Some(&command));
        assert!(h.events().contains(&SessionEvent::FileSaved {
            path: "notes.txt".into()
        }));
    }

    #[tokio::test]
    async fn test_git_clone_chains_metrics_and_tree_refresh() {
        let mut h = connected().await;
        h.transport.respond(
            "git clone https://example.com/r.git",
            &["git clone https://example.com/r.git\r\nCloning into 'r'...\r\n", "$ "],
        );
        h.transport
            .respond("find .", &["find .\r\n./r\r\n./r/README.md\r\n$ "]);

        assert_eq!(
            h.controller
                .submit("git clone https://example.com/r.git")
                .await,
            Ok(Classification::GitClone)
        );
        // wait_idle 会继续处理链式触发的文件树刷新
        h.controller.wait_idle().await;
        assert!(!h.controller.is_busy());

        let events = h.events();
        let metrics = events
            .iter()
            .position(|e| *e == SessionEvent::MetricsRefreshRequested)
            .unwrap();
        let tree = events
            .iter()
            .position(|e| matches!(e, SessionEvent::TreeUpdated(t) if t.len() == 1))
            .unwrap();
        assert!(metrics < tree);
        assert_eq!(
            h.transport.sent_lines(),
            vec!["find .", "git clone https://example.com/r.git", "find ."]
        );
    }

    #[tokio::test]
    async fn test_cancel_frees_gate() {
        let mut h = connected().await;
        h.transport.respond("tail -f log", &["tail -f log\r\n"]);
        h.controller.submit("tail -f log").await.unwrap();

        assert!(h.controller.cancel());
        assert!(!h.controller.cancel());
        h.controller.wait_idle().await;

        assert_eq!(h.controller.status(), SessionStatus::Connected);
        assert_eq!(h.transport.interrupts(), 0);
        assert!(h.events().contains(&SessionEvent::CommandFinished {
            command: "tail -f log".into(),
            classification: Classification::Normal,
            outcome: RunOutcome::Cancelled,
        }));
        assert!(!h.controller.cancel());
    }

    #[tokio::test]
    async fn test_reconnect_reopens_session() {
        let mut h = connected().await;

        h.controller.reconnect().await.unwrap();
        assert_eq!(h.transport.close_calls(), 1);
        assert_eq!(h.transport.connect_calls(), 2);
        h.controller.wait_idle().await;
        assert_eq!(h.controller.status(), SessionStatus::Connected);

        let events = h.events();
        let down = events
            .iter()
            .position(|e| *e == SessionEvent::ConnectionStatus(false))
            .unwrap();
        let up = events
            .iter()
            .position(|e| *e == SessionEvent::ConnectionStatus(true))
            .unwrap();
        assert!(down < up);
    }

    #[tokio::test]
    async fn test_reconnect_gives_up_after_attempts() {
        let mut h = harness(
            ScriptedTransport::failing("Connection timeout after 30s"),
            configured_store(),
        );

        let err = h.controller.reconnect().await.unwrap_err();
        assert!(matches!(err, SessionError::Connection(_)));
        assert_eq!(h.transport.connect_calls(), 2);
        assert_eq!(h.controller.status(), SessionStatus::Disconnected);
    }
}
