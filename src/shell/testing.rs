// 测试用的脚本化传输层

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::models::settings::SessionOptions;
use crate::ssh::{ShellTransport, SshConfig, TransportFactory};

#[derive(Default)]
struct Script {
    connect_failure: Option<String>,
    active: bool,
    exit_status_ready: bool,
    /// 每个元素模拟一次独立到达的读取
    pending: VecDeque<Vec<u8>>,
    responses: HashMap<String, Vec<String>>,
    sent: Vec<String>,
    interrupts: usize,
    silent_result: String,
    silent_queries: Vec<String>,
    connect_calls: usize,
    close_calls: usize,
}

/// 按脚本回应命令的传输层
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<Script>,
}

impl ScriptedTransport {
    pub fn connected() -> Self {
        let transport = Self::default();
        transport.script().active = true;
        transport
    }

    pub fn disconnected() -> Self {
        Self::default()
    }

    /// connect 总是失败
    pub fn failing(message: &str) -> Self {
        let transport = Self::default();
        transport.script().connect_failure = Some(message.to_string());
        transport
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }

    /// 收到 command 后依次产生 reads
    pub fn respond(&self, command: &str, reads: &[&str]) {
        self.script().responses.insert(
            command.to_string(),
            reads.iter().map(|read| read.to_string()).collect(),
        );
    }

    pub fn push_output(&self, text: &str) {
        self.script().pending.push_back(text.as_bytes().to_vec());
    }

    pub fn set_silent_result(&self, result: &str) {
        self.script().silent_result = result.to_string();
    }

    pub fn set_exit_status_ready(&self, ready: bool) {
        self.script().exit_status_ready = ready;
    }

    /// 模拟连接中途断开
    pub fn drop_connection(&self) {
        self.script().active = false;
    }

    pub fn sent_lines(&self) -> Vec<String> {
        self.script().sent.clone()
    }

    pub fn interrupts(&self) -> usize {
        self.script().interrupts
    }

    pub fn silent_queries(&self) -> Vec<String> {
        self.script().silent_queries.clone()
    }

    pub fn connect_calls(&self) -> usize {
        self.script().connect_calls
    }

    pub fn close_calls(&self) -> usize {
        self.script().close_calls
    }
}

#[async_trait]
impl ShellTransport for ScriptedTransport {
    async fn connect(&self) -> (bool, String) {
        let mut script = self.script();
        script.connect_calls += 1;
        if let Some(message) = script.connect_failure.clone() {
            return (false, message);
        }
        script.active = true;
        (true, "Connected to test@localhost:22".to_string())
    }

    fn is_active(&self) -> bool {
        self.script().active
    }

    async fn send_line(&self, command: &str) {
        let mut script = self.script();
        if !script.active {
            return;
        }
        script.sent.push(command.to_string());
        if let Some(reads) = script.responses.get(command).cloned() {
            script
                .pending
                .extend(reads.into_iter().map(String::into_bytes));
        }
    }

    fn drain_available(&self) -> Vec<u8> {
        self.script().pending.pop_front().unwrap_or_default()
    }

    fn exit_status_ready(&self) -> bool {
        self.script().exit_status_ready
    }

    async fn run_silent(&self, command: &str) -> String {
        let mut script = self.script();
        script.silent_queries.push(command.to_string());
        if script.active {
            script.silent_result.clone()
        } else {
            String::new()
        }
    }

    async fn send_interrupt(&self) {
        let mut script = self.script();
        if script.active {
            script.interrupts += 1;
        }
    }

    async fn close(&self) {
        let mut script = self.script();
        script.close_calls += 1;
        script.active = false;
        script.pending.clear();
    }
}

/// 始终返回同一个脚本化传输层的工厂
pub struct ScriptedFactory {
    transport: Arc<ScriptedTransport>,
    configs: Mutex<Vec<SshConfig>>,
}

impl ScriptedFactory {
    pub fn new(transport: Arc<ScriptedTransport>) -> Self {
        Self {
            transport,
            configs: Mutex::new(Vec::new()),
        }
    }

    pub fn configs(&self) -> Vec<SshConfig> {
        self.configs.lock().unwrap().clone()
    }
}

impl TransportFactory for ScriptedFactory {
    fn create(&self, config: SshConfig, _options: &SessionOptions) -> Arc<dyn ShellTransport> {
        self.configs.lock().unwrap().push(config);
        self.transport.clone()
    }
}
