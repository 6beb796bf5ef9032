// 命令执行器
// 在独立的 tokio 任务上运行一次解复用循环，把文本块推送给观察者

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::command::Classification;
use super::demux;
use super::execution::{Chunk, RunOutcome};
use crate::ssh::ShellTransport;

pub type ChunkObserver = Box<dyn Fn(&Chunk) + Send + Sync>;
pub type CompletionObserver = Box<dyn Fn(RunOutcome) + Send + Sync>;

/// 命令执行器（一次性，start 后被消费）
pub struct CommandRunner {
    command: String,
    classification: Classification,
    poll_interval: Duration,
    chunk_observers: Vec<ChunkObserver>,
    completion_observers: Vec<CompletionObserver>,
}

impl CommandRunner {
    pub fn new(
        command: impl Into<String>,
        classification: Classification,
        poll_interval: Duration,
    ) -> Self {
        Self {
            command: command.into(),
            classification,
            poll_interval,
            chunk_observers: Vec::new(),
            completion_observers: Vec::new(),
        }
    }

    /// 注册文本块观察者（按到达顺序在工作任务上同步调用）
    pub fn on_chunk(mut self, observer: impl Fn(&Chunk) + Send + Sync + 'static) -> Self {
        self.chunk_observers.push(Box::new(observer));
        self
    }

    /// 注册完成观察者（每次执行恰好调用一次）
    pub fn on_complete(mut self, observer: impl Fn(RunOutcome) + Send + Sync + 'static) -> Self {
        self.completion_observers.push(Box::new(observer));
        self
    }

    /// 启动工作任务
    pub fn start(self, transport: Arc<dyn ShellTransport>) -> RunnerHandle {
        let cancel = Arc::new(AtomicBool::new(false));
        let Self {
            command,
            classification,
            poll_interval,
            chunk_observers,
            completion_observers,
        } = self;

        let flag = cancel.clone();
        let label = command.clone();
        let task = tokio::spawn(async move {
            // 接收循环放在内层任务中，即使它 panic 也保证完成通知发出
            let pass = tokio::spawn(async move {
                demux::run_pass(
                    transport.as_ref(),
                    &command,
                    classification,
                    poll_interval,
                    &flag,
                    |chunk| {
                        for observer in &chunk_observers {
                            observer(&chunk);
                        }
                    },
                )
                .await
            });

            let outcome = match pass.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("[Runner] Receive loop for '{}' aborted: {}", label, e);
                    RunOutcome::Failed
                }
            };

            debug!("[Runner] '{}' complete ({:?})", label, outcome);
            for observer in &completion_observers {
                observer(outcome);
            }
        });

        RunnerHandle { cancel, task }
    }
}

/// 正在运行的执行器句柄
pub struct RunnerHandle {
    cancel: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl RunnerHandle {
    /// 协作取消：在下一次循环检查时生效，不会中断远端进程
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
