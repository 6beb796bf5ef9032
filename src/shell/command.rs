// 命令分类与命令文本构建

use std::borrow::Cow;

use base64::Engine;
use serde::Serialize;

use crate::constants::shell::{EXIT_COMMAND, INTERRUPT_SENTINEL, PWD_COMMAND};
use crate::models::paths::resolve_path;

/// 命令分类，每次提交时计算一次
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Classification {
    Normal,
    DirectoryChange,
    Interrupt,
    Exit,
    FileRead,
    FileSave,
    TreeRefresh,
    GitClone,
}

impl Classification {
    /// exit 和中断不受忙碌限制
    pub fn bypasses_busy_gate(&self) -> bool {
        matches!(self, Self::Exit | Self::Interrupt)
    }

    /// 只能由内部触发（不会从用户输入中分类出来）
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::FileRead | Self::FileSave | Self::TreeRefresh)
    }
}

/// 对用户输入的命令分类
pub fn classify(command: &str) -> Classification {
    let trimmed = command.trim();
    if trimmed == EXIT_COMMAND {
        Classification::Exit
    } else if trimmed == INTERRUPT_SENTINEL {
        Classification::Interrupt
    } else if is_cd(trimmed) {
        Classification::DirectoryChange
    } else if is_git_clone(trimmed) {
        Classification::GitClone
    } else {
        Classification::Normal
    }
}

fn is_cd(command: &str) -> bool {
    command == "cd"
        || command
            .strip_prefix("cd")
            .and_then(|rest| rest.chars().next())
            .map_or(false, char::is_whitespace)
}

fn is_git_clone(command: &str) -> bool {
    let tokens: Vec<&str> = command.split_whitespace().collect();
    tokens.windows(2).any(|pair| pair == ["git", "clone"])
}

/// 取出 cd 的第一个参数（支持引号，遇到 ; & | 截断）
fn cd_argument(command: &str) -> Option<&str> {
    let rest = command.trim().strip_prefix("cd")?.trim_start();
    let arg = match rest.chars().next() {
        Some(quote @ ('"' | '\'')) => rest[1..].split(quote).next().unwrap_or(""),
        _ => rest
            .split(|c: char| c.is_whitespace() || matches!(c, ';' | '&' | '|'))
            .next()
            .unwrap_or(""),
    };
    Some(arg)
}

/// cd 命令的乐观工作目录
/// 无法在本地推断时（如 `cd -` 或当前目录未知）返回原值
pub fn optimistic_cd(cwd: Option<&str>, command: &str) -> Option<String> {
    let Some(arg) = cd_argument(command) else {
        return cwd.map(str::to_string);
    };

    match arg {
        "" | "~" => Some("~".to_string()),
        "-" => cwd.map(str::to_string),
        _ if arg.starts_with('/') => Some(resolve_path("/", arg)),
        _ if arg.starts_with("~/") => Some(resolve_path("~", &arg[2..])),
        _ => cwd.map(|base| resolve_path(base, arg)),
    }
}

fn quote(value: &str) -> Cow<'_, str> {
    shell_escape::unix::escape(Cow::Borrowed(value))
}

fn cd_target(path: &str) -> String {
    if path == "~" {
        return "~".to_string();
    }
    match path.strip_prefix("~/") {
        Some(rest) => format!("~/{}", quote(rest)),
        None => quote(path).into_owned(),
    }
}

/// 工作目录校准查询
/// 静默通道是全新的 Shell，先进入当前认为的目录再 pwd，得到规范化的绝对路径。
/// cd 命令执行后传入执行前的目录作为备选，乐观目录不存在时回到备选目录查询。
pub fn reconcile_query(cwd: Option<&str>, fallback: Option<&str>) -> String {
    match (cwd, fallback) {
        (None, None) => PWD_COMMAND.to_string(),
        (Some(path), Some(before)) if path != before => format!(
            "{{ cd {} || cd {}; }} 2>/dev/null && {}",
            cd_target(path),
            cd_target(before),
            PWD_COMMAND
        ),
        (Some(path), _) | (None, Some(path)) => {
            format!("cd {} 2>/dev/null && {}", cd_target(path), PWD_COMMAND)
        }
    }
}

/// 读取文件内容的命令
pub fn file_read_command(path: &str) -> String {
    format!("cat -- {}", quote(path))
}

/// 保存文件内容的命令
/// 内容 base64 编码后单行发送，避免 heredoc 续行提示符干扰输出解析
pub fn file_save_command(path: &str, content: &str) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(content.as_bytes());
    format!("printf '%s' '{}' | base64 -d > {}", encoded, quote(path))
}
