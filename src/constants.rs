// 常量定义

/// 配置存储中的键
pub mod keys {
    pub const HOST: &str = "ssh_host";
    pub const USER: &str = "ssh_user";
    pub const PORT: &str = "ssh_port";
    pub const PASSWORD: &str = "ssh_password";
    pub const KEY_PATH: &str = "ssh_key_path";
    pub const KEY_PASSPHRASE: &str = "ssh_key_passphrase";
    pub const PROJECT_NAME: &str = "project_name";
}

/// Shell 交互相关常量
pub mod shell {
    /// 中断字节 (Ctrl+C)
    pub const ETX: u8 = 0x03;
    /// 中断命令的哨兵文本
    pub const INTERRUPT_SENTINEL: &str = "Ctrl+C";
    /// 退出命令
    pub const EXIT_COMMAND: &str = "exit";
    /// 提示符结尾字符
    pub const PROMPT_TERMINATORS: [char; 3] = ['$', '#', '>'];
    /// 工作目录查询命令
    pub const PWD_COMMAND: &str = "pwd";
}

/// 本地存储
pub mod storage {
    pub const CONFIG_DIR_NAME: &str = "shellpilot";
    pub const OPTIONS_FILE: &str = "options.json";
    pub const PROJECTS_DIR: &str = "projects";
    /// 最近运行记录保留条数
    pub const MAX_RECENT_RUNS: usize = 100;
}
