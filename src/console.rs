// 终端输出渲染（命令行前端的事件监听者）

use crate::models::{RunEntry, TreeNode};
use crate::shell::{RunOutcome, SessionEvent};

/// 折叠进度条式的 \r 覆盖：每行只保留最后一次覆盖后的内容
pub fn collapse_carriage_returns(text: &str) -> String {
    text.split('\n')
        .map(|line| {
            let line = line.strip_suffix('\r').unwrap_or(line);
            match line.rfind('\r') {
                Some(pos) => &line[pos + 1..],
                None => line,
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// 缩进形式的文件树，目录名后加 /
pub fn render_tree(nodes: &[TreeNode]) -> String {
    let mut out = String::new();
    render_level(nodes, 0, &mut out);
    out
}

fn render_level(nodes: &[TreeNode], depth: usize, out: &mut String) {
    for node in nodes {
        out.push_str(&"  ".repeat(depth));
        out.push_str(&node.name);
        if node.is_dir() {
            out.push('/');
        }
        out.push('\n');
        render_level(&node.children, depth + 1, out);
    }
}

/// 最近 limit 条运行记录，新的在后
pub fn render_history(runs: &[RunEntry], limit: usize) -> String {
    let start = runs.len().saturating_sub(limit);
    runs[start..]
        .iter()
        .map(|run| {
            format!(
                "{}  {}  {}\n",
                run.ran_at,
                run.cwd.as_deref().unwrap_or("?"),
                run.command
            )
        })
        .collect()
}

/// 把会话事件转换为要写到标准输出的文本，不需要显示的事件返回 None
pub fn render_event(event: &SessionEvent) -> Option<String> {
    let text = match event {
        SessionEvent::Console(text) | SessionEvent::FileContent(text) => {
            collapse_carriage_returns(text)
        }
        SessionEvent::Log(message) => format!("[shellpilot] {}\n", message),
        SessionEvent::ConnectionStatus(true) => "[shellpilot] connected\n".to_string(),
        SessionEvent::ConnectionStatus(false) => "[shellpilot] disconnected\n".to_string(),
        SessionEvent::Directory(Some(path)) => format!("[shellpilot] cwd: {}\n", path),
        SessionEvent::TreeUpdated(nodes) if !nodes.is_empty() => render_tree(nodes),
        SessionEvent::FileOpened { path } => format!("----- {} -----\n", path),
        SessionEvent::FileLoaded { path } => format!("\n----- end of {} -----\n", path),
        SessionEvent::FileSaved { path } => format!("[shellpilot] saved {}\n", path),
        SessionEvent::CommandFinished {
            classification,
            outcome,
            ..
        } if !classification.is_internal() => match outcome {
            RunOutcome::Completed => "\n".to_string(),
            RunOutcome::Cancelled => "\n[shellpilot] cancelled\n".to_string(),
            RunOutcome::TransportLost | RunOutcome::Failed => {
                "\n[shellpilot] no more output\n".to_string()
            }
        },
        _ => return None,
    };
    Some(text)
}
