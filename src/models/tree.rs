// 远程文件树
// 由扁平的路径列表（find 输出）构建层级结构

use std::collections::BTreeMap;

use serde::Serialize;

/// 文件树节点：children 为空表示文件，非空表示目录
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    pub name: String,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn is_dir(&self) -> bool {
        !self.children.is_empty()
    }
}

#[derive(Default)]
struct Branch {
    children: BTreeMap<String, Branch>,
}

impl Branch {
    fn into_nodes(self) -> Vec<TreeNode> {
        let mut nodes: Vec<TreeNode> = self
            .children
            .into_iter()
            .map(|(name, branch)| TreeNode {
                name,
                children: branch.into_nodes(),
            })
            .collect();
        sort_nodes(&mut nodes);
        nodes
    }
}

/// 目录在前，然后按名称不区分大小写排序
fn sort_nodes(nodes: &mut [TreeNode]) {
    nodes.sort_by(|a, b| {
        b.is_dir()
            .cmp(&a.is_dir())
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });
}

/// 把列表中的一行转换为相对路径
/// 绝对路径如果位于 root 之下则去掉 root 前缀
fn relative_entry<'a>(line: &'a str, root: Option<&str>) -> &'a str {
    if let Some(rest) = line.strip_prefix("./") {
        return rest;
    }
    if let Some(root) = root.filter(|r| r.starts_with('/') && *r != "/") {
        if let Some(rest) = line
            .strip_prefix(root)
            .and_then(|rest| rest.strip_prefix('/'))
        {
            return rest;
        }
    }
    line.trim_start_matches('/')
}

/// 从扁平列表构建文件树
pub fn build_tree<'a, I>(lines: I, root: Option<&str>) -> Vec<TreeNode>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut top = Branch::default();

    for line in lines {
        let line = line.trim_end_matches('\r').trim();
        if line.is_empty() || line == "." {
            continue;
        }

        let mut branch = &mut top;
        for part in relative_entry(line, root)
            .split('/')
            .filter(|part| !part.is_empty() && *part != ".")
        {
            branch = branch.children.entry(part.to_string()).or_default();
        }
    }

    top.into_nodes()
}
