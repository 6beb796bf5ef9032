// 单次命令执行

use serde::Serialize;
use uuid::Uuid;

use super::command::Classification;

/// 解复用器产出的文本块
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Chunk {
    /// 命令输出（保留原始 \r）
    Output(String),
    /// cd 在提示符前没有任何输出，视为静默成功
    DirectoryChanged,
}

/// 一次接收循环的结束方式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum RunOutcome {
    /// 识别到提示符或远端报告退出
    Completed,
    /// 本地协作取消（远端进程不一定终止）
    Cancelled,
    /// 通道失效
    TransportLost,
    /// 接收任务异常退出，按 "没有更多输出" 处理
    Failed,
}

/// 一次命令执行的记录
#[derive(Clone, Debug)]
pub struct CommandExecution {
    pub id: Uuid,
    pub command: String,
    pub classification: Classification,
    /// 执行前认为的工作目录
    pub cwd_before: Option<String>,
    /// 文件读取/保存的目标路径
    pub target: Option<String>,
    pub chunks: Vec<Chunk>,
    pub completed: bool,
}

impl CommandExecution {
    pub fn new(
        command: impl Into<String>,
        classification: Classification,
        cwd_before: Option<String>,
        target: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            command: command.into(),
            classification,
            cwd_before,
            target,
            chunks: Vec::new(),
            completed: false,
        }
    }

    pub fn push(&mut self, chunk: Chunk) {
        debug_assert!(!self.completed, "chunk after completion");
        self.chunks.push(chunk);
    }

    pub fn complete(&mut self) {
        self.completed = true;
    }

    /// 拼接全部输出文本
    pub fn output(&self) -> String {
        self.chunks
            .iter()
            .filter_map(|chunk| match chunk {
                Chunk::Output(text) => Some(text.as_str()),
                Chunk::DirectoryChanged => None,
            })
            .collect()
    }
}
