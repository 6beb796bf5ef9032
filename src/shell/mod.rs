// 交互式 Shell 模块
//
// 模块结构:
// - command: 命令分类与命令文本构建
// - demux: 输出流解复用（回显、提示符、转义序列）
// - execution: 单次执行记录与文本块
// - runner: 在工作任务上运行一次执行
// - event: 发布给 UI 的会话事件
// - controller: 会话状态机

pub mod command;
pub mod controller;
pub mod demux;
pub mod event;
pub mod execution;
pub mod runner;

#[cfg(test)]
pub mod testing;

pub use command::Classification;
pub use controller::{RunnerEvent, SessionController, SessionStatus};
pub use event::SessionEvent;
pub use execution::{Chunk, RunOutcome};
