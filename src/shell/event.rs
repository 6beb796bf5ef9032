// 会话事件（控制器 -> UI 协作方）

use super::command::Classification;
use super::execution::RunOutcome;
use crate::models::TreeNode;

/// 控制器向监听者发布的事件，全部在控制器所在的任务上发出
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// 命令输出文本（保留 \r，进度条折叠由监听者处理）
    Console(String),
    /// 面向用户的状态消息（连接结果、错误）
    Log(String),
    /// 连接状态变化
    ConnectionStatus(bool),
    /// 当前工作目录（None 表示未知）
    Directory(Option<String>),
    /// cd 没有输出，视为成功
    CdSucceeded,
    /// 文件树重建结果（空列表表示清空）
    TreeUpdated(Vec<TreeNode>),
    /// 开始读取文件，监听者应清空文件内容缓冲
    FileOpened { path: String },
    /// 文件内容片段
    FileContent(String),
    /// 文件读取结束
    FileLoaded { path: String },
    /// 文件保存完成
    FileSaved { path: String },
    /// 关闭已打开的编辑器
    EditorReset,
    /// 请求外部刷新资源指标
    MetricsRefreshRequested,
    /// 一次命令执行结束（工作目录校准之后发出）
    CommandFinished {
        command: String,
        classification: Classification,
        outcome: RunOutcome,
    },
}
