// ShellPilot - 交互式远程 Shell 会话管理
// 应用入口（命令行前端）

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

mod console;
mod constants;
mod models;
mod services;
mod shell;
mod ssh;

use constants::keys;
use constants::shell::INTERRUPT_SENTINEL;
use services::storage::{self, JsonSettingsStore, SettingsStore};
use shell::SessionController;
use ssh::SshTransportFactory;

/// 交互式远程 Shell
#[derive(Parser, Debug)]
#[command(name = "shellpilot", version, about)]
struct Args {
    /// 项目名（对应 projects/<name>.json 中的连接配置）
    #[arg(short, long, default_value = "default")]
    project: String,

    /// 会话选项文件，默认使用配置目录下的 options.json
    #[arg(long)]
    options: Option<PathBuf>,
}

/// 本地命令的处理结果
enum Flow {
    Continue,
    Quit,
}

fn report(message: impl std::fmt::Display) {
    println!("[shellpilot] {}", message);
}

/// :history 显示的记录条数
const HISTORY_LINES: usize = 20;

async fn dispatch(
    controller: &mut SessionController,
    store: &JsonSettingsStore,
    line: &str,
) -> Flow {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Flow::Continue;
    }

    let Some(local) = trimmed.strip_prefix(':') else {
        if let Err(e) = controller.submit(line).await {
            report(e);
        }
        return Flow::Continue;
    };

    let mut parts = local.split_whitespace();
    let result = match (parts.next(), parts.next(), parts.next()) {
        (Some("quit"), None, None) => return Flow::Quit,
        (Some("connect"), None, None) => controller.connect().await,
        (Some("reconnect"), None, None) => controller.reconnect().await,
        (Some("tree"), None, None) => controller.refresh_tree().map(drop),
        (Some("history"), None, None) => {
            print!("{}", console::render_history(&store.runs(), HISTORY_LINES));
            Ok(())
        }
        (Some("open"), Some(path), None) => controller.open_file(path).map(drop),
        (Some("save"), Some(path), Some(local_file)) => {
            match tokio::fs::read_to_string(local_file).await {
                Ok(content) => controller.save_file(path, &content).map(drop),
                Err(e) => {
                    report(format!("Failed to read {}: {}", local_file, e));
                    Ok(())
                }
            }
        }
        (Some("cancel"), None, None) => {
            if !controller.cancel() {
                report("nothing to cancel");
            }
            Ok(())
        }
        _ => {
            report(
                "commands: :connect :reconnect :tree :history :open <path> :save <path> <local-file> :cancel :quit",
            );
            Ok(())
        }
    };
    if let Err(e) = result {
        report(e);
    }
    Flow::Continue
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志系统
    // 可以通过 RUST_LOG 环境变量控制日志级别，例如：RUST_LOG=debug shellpilot
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let store = JsonSettingsStore::for_project(&args.project)
        .with_context(|| format!("Failed to open project '{}'", args.project))?;
    let options = storage::load_options(args.options.as_deref())?;
    if let Some(name) = store.get(keys::PROJECT_NAME) {
        info!("Project: {} ({})", name, args.project);
    }

    let store = Arc::new(store);
    let mut controller = SessionController::new(
        args.project.clone(),
        store.clone(),
        Arc::new(SshTransportFactory),
        options,
    );
    controller.add_listener(|event| {
        if let Some(text) = console::render_event(event) {
            let mut stdout = std::io::stdout();
            let _ = stdout.write_all(text.as_bytes());
            let _ = stdout.flush();
        }
    });

    // 失败已经通过监听者报告，可以用 :connect 重试
    if let Err(e) = controller.connect().await {
        debug!("Initial connect failed: {}", e);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                if let Flow::Quit = dispatch(&mut controller, &store, &line).await {
                    break;
                }
            }
            Some(event) = controller.recv_event() => {
                controller.handle_event(event).await;
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!("Failed to listen for Ctrl+C: {}", e);
                    break;
                }
                if let Err(e) = controller.submit(INTERRUPT_SENTINEL).await {
                    report(e);
                }
            }
        }
    }

    controller.shutdown().await;
    Ok(())
}
