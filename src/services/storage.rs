// 本地数据持久化服务
// 项目配置是一个不做结构校验的键值存储，外加最近运行记录

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::storage::{
    CONFIG_DIR_NAME, MAX_RECENT_RUNS, OPTIONS_FILE, PROJECTS_DIR,
};
use crate::models::project::RunEntry;
use crate::models::settings::SessionOptions;

/// 配置协作方接口
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn add_run(&self, entry: RunEntry) -> Result<()>;
}

/// 获取配置目录路径
/// macOS: ~/Library/Application Support/shellpilot
/// Linux: ~/.config/shellpilot
/// Windows: C:\Users\<用户名>\AppData\Roaming\shellpilot
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .context("无法获取系统配置目录")?
        .join(CONFIG_DIR_NAME);
    if !config_dir.exists() {
        fs::create_dir_all(&config_dir).context("无法创建配置目录")?;
    }
    Ok(config_dir)
}

/// 获取项目配置文件路径
pub fn get_project_file(project: &str) -> Result<PathBuf> {
    Ok(get_config_dir()?
        .join(PROJECTS_DIR)
        .join(format!("{}.json", project)))
}

// ======================== 会话选项 ========================

/// 加载会话选项，文件不存在时返回默认值
pub fn load_options(path: Option<&Path>) -> Result<SessionOptions> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => get_config_dir()?.join(OPTIONS_FILE),
    };
    if !path.exists() {
        return Ok(SessionOptions::default());
    }
    let content = fs::read_to_string(&path).context("无法读取会话选项文件")?;
    let options: SessionOptions = serde_json::from_str(&content).context("无法解析会话选项文件")?;
    Ok(options)
}

// ======================== 项目键值存储 ========================

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct ProjectFile {
    values: BTreeMap<String, String>,
    runs: Vec<RunEntry>,
}

impl ProjectFile {
    fn push_run(&mut self, entry: RunEntry) {
        self.runs.push(entry);
        if self.runs.len() > MAX_RECENT_RUNS {
            let excess = self.runs.len() - MAX_RECENT_RUNS;
            self.runs.drain(..excess);
        }
    }
}

/// JSON 文件支持的项目配置
pub struct JsonSettingsStore {
    path: PathBuf,
    data: Mutex<ProjectFile>,
}

impl JsonSettingsStore {
    /// 打开指定文件，不存在时以空配置开始
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = if path.exists() {
            let content = fs::read_to_string(&path).context("无法读取项目配置文件")?;
            serde_json::from_str(&content).context("无法解析项目配置文件")?
        } else {
            ProjectFile::default()
        };
        debug!("[Storage] Opened project settings at {:?}", path);
        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    /// 打开配置目录下的项目文件
    pub fn for_project(project: &str) -> Result<Self> {
        Self::open(get_project_file(project)?)
    }

    /// 最近运行记录（旧的在前）
    pub fn runs(&self) -> Vec<RunEntry> {
        self.data().runs.clone()
    }

    fn data(&self) -> MutexGuard<'_, ProjectFile> {
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn save(&self, data: &ProjectFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("无法创建项目配置目录")?;
        }
        let content = serde_json::to_string_pretty(data).context("无法序列化项目配置")?;
        fs::write(&self.path, content).context("无法写入项目配置文件")?;
        Ok(())
    }
}

impl SettingsStore for JsonSettingsStore {
    fn get(&self, key: &str) -> Option<String> {
        self.data().values.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut data = self.data();
        data.values.insert(key.to_string(), value.to_string());
        self.save(&data)
    }

    fn add_run(&self, entry: RunEntry) -> Result<()> {
        let mut data = self.data();
        data.push_run(entry);
        self.save(&data)
    }
}

/// 内存配置（测试用）
#[cfg(test)]
#[derive(Default)]
pub struct MemorySettingsStore {
    data: Mutex<ProjectFile>,
}

#[cfg(test)]
impl MemorySettingsStore {
    pub fn runs(&self) -> Vec<RunEntry> {
        self.data.lock().unwrap().runs.clone()
    }
}

#[cfg(test)]
impl SettingsStore for MemorySettingsStore {
    fn get(&self, key: &str) -> Option<String> {
        self.data.lock().unwrap().values.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.data
            .lock()
            .unwrap()
            .values
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn add_run(&self, entry: RunEntry) -> Result<()> {
        self.data.lock().unwrap().push_run(entry);
        Ok(())
    }
}
