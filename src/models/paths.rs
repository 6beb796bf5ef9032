// 远程路径工具函数

/// 获取父目录路径
pub fn get_parent_path(path: &str) -> String {
    if path == "/" {
        return "/".to_string();
    }

    let path = path.trim_end_matches('/');
    match path.rfind('/') {
        Some(0) => "/".to_string(),
        Some(pos) => path[..pos].to_string(),
        // "~" 之类无法再向上解析的路径保持不变
        None => path.to_string(),
    }
}

/// 连接路径
pub fn join_path(base: &str, name: &str) -> String {
    if base == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", base.trim_end_matches('/'), name)
    }
}

/// 在 base 上解析相对路径（处理 `.`、`..` 和绝对路径）
pub fn resolve_path(base: &str, relative: &str) -> String {
    let mut current = if relative.starts_with('/') {
        "/".to_string()
    } else {
        base.to_string()
    };

    for part in relative.split('/') {
        match part {
            "" | "." => {}
            ".." => current = get_parent_path(&current),
            name => current = join_path(&current, name),
        }
    }
    current
}
