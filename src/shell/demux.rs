// 输出流解复用
//
// 把 "一条命令 + 一个交互通道" 转换为只包含命令自身输出的文本块序列：
// 去掉命令回显（每次执行最多一次）和结尾的 Shell 提示符。
// 没有 PTY 协议层面的感知，只依赖原始字节流上的启发式规则。

use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, trace};

use super::command::Classification;
use super::execution::{Chunk, RunOutcome};
use crate::constants::shell::PROMPT_TERMINATORS;
use crate::ssh::ShellTransport;

/// CSI / OSC / 字符集切换等转义序列
static ESCAPE_SEQUENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1b\[[0-?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[()][A-Za-z0-9]|\x1b[=>]")
        .expect("escape sequence pattern is valid")
});

/// 去掉终端转义序列（保留 \r 和 \n）
pub fn strip_escapes(text: &str) -> Cow<'_, str> {
    ESCAPE_SEQUENCE.replace_all(text, "")
}

/// 接收循环状态
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    /// 还没有收到任何非空数据（回显检查尚未进行）
    AwaitingFirstByte,
    /// 正在转发输出
    Streaming,
    /// 已识别到提示符，序列结束
    PromptDetected,
    /// 循环已退出
    Done,
}

/// 单次执行的解复用状态机
#[derive(Debug)]
pub struct Demultiplexer {
    command: String,
    directory_change: bool,
    state: LoopState,
    emitted_output: bool,
}

impl Demultiplexer {
    pub fn new(command: &str, classification: Classification) -> Self {
        Self {
            command: command.trim().to_string(),
            directory_change: classification == Classification::DirectoryChange,
            state: LoopState::AwaitingFirstByte,
            emitted_output: false,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// 序列是否已经结束（不再接受输入）
    pub fn is_finished(&self) -> bool {
        matches!(self.state, LoopState::PromptDetected | LoopState::Done)
    }

    pub fn finish(&mut self) {
        self.state = LoopState::Done;
    }

    /// 处理一次读取得到的文本，返回需要发出的块
    pub fn feed(&mut self, raw: &str) -> Option<Chunk> {
        if self.is_finished() {
            return None;
        }

        let text = strip_escapes(raw);
        let mut body: &str = &text;

        if self.state == LoopState::AwaitingFirstByte {
            if text.is_empty() {
                return None;
            }
            self.state = LoopState::Streaming;
            body = strip_echo(body, &self.command);
        }

        let trimmed = body.trim_end();
        if trimmed.ends_with(PROMPT_TERMINATORS) {
            self.state = LoopState::PromptDetected;

            // 最后一个换行之前是输出，之后是提示符
            let output = trimmed
                .rfind('\n')
                .map(|pos| trimmed[..pos].trim_end_matches('\r'))
                .unwrap_or("");
            if !output.is_empty() {
                self.emitted_output = true;
                return Some(Chunk::Output(output.to_string()));
            }
            if self.directory_change && !self.emitted_output {
                return Some(Chunk::DirectoryChanged);
            }
            return None;
        }

        if body.is_empty() {
            return None;
        }
        self.emitted_output = true;
        Some(Chunk::Output(body.to_string()))
    }
}

/// 如果第一行包含命令文本则丢弃第一行
fn strip_echo<'a>(text: &'a str, command: &str) -> &'a str {
    let (first_line, rest) = match text.find('\n') {
        Some(pos) => (&text[..pos], &text[pos + 1..]),
        None => (text, ""),
    };
    if first_line.contains(command) {
        rest
    } else {
        text
    }
}

/// 增量 UTF-8 解码
/// 跨读取边界被截断的多字节字符会保留到下一次，其余非法字节替换为 U+FFFD
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let split = self.pending.len() - incomplete_tail_len(&self.pending);
        let text = String::from_utf8_lossy(&self.pending[..split]).into_owned();
        self.pending.drain(..split);
        text
    }

    pub fn flush(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}

/// 末尾不完整的 UTF-8 序列长度
fn incomplete_tail_len(buf: &[u8]) -> usize {
    for back in 1..=buf.len().min(3) {
        let byte = buf[buf.len() - back];
        if byte & 0b1100_0000 == 0b1000_0000 {
            continue;
        }
        let width = match byte {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        return if back < width { back } else { 0 };
    }
    0
}

/// 执行一次完整的接收循环
///
/// `emit` 在当前任务上同步调用，调用返回后才会继续读取。
pub async fn run_pass<F>(
    transport: &dyn ShellTransport,
    command: &str,
    classification: Classification,
    poll_interval: Duration,
    cancel: &AtomicBool,
    mut emit: F,
) -> RunOutcome
where
    F: FnMut(Chunk),
{
    // 丢弃上一次交互遗留的输出
    let stale = transport.drain_available();
    if !stale.is_empty() {
        debug!("[Shell] Discarded {} stale bytes before '{}'", stale.len(), command);
    }

    if !transport.is_active() {
        debug!("[Shell] Channel inactive, '{}' not sent", command);
        return RunOutcome::TransportLost;
    }
    transport.send_line(command).await;

    let mut demux = Demultiplexer::new(command, classification);
    let mut decoder = Utf8Decoder::default();

    let outcome = loop {
        if cancel.load(Ordering::Acquire) {
            break RunOutcome::Cancelled;
        }

        let bytes = transport.drain_available();
        if bytes.is_empty() {
            if transport.exit_status_ready() {
                let tail = decoder.flush();
                if let Some(chunk) = demux.feed(&tail) {
                    emit(chunk);
                }
                break RunOutcome::Completed;
            }
            if !transport.is_active() {
                break RunOutcome::TransportLost;
            }
            tokio::time::sleep(poll_interval).await;
            continue;
        }

        trace!("[Shell] Read {} bytes", bytes.len());
        let text = decoder.decode(&bytes);
        if let Some(chunk) = demux.feed(&text) {
            emit(chunk);
        }
        if demux.is_finished() {
            break RunOutcome::Completed;
        }
    };

    debug!(
        "[Shell] '{}' finished: {:?} (loop state {:?})",
        command,
        outcome,
        demux.state()
    );
    demux.finish();
    outcome
}
