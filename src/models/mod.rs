// 数据模型模块

pub mod paths;
pub mod project;
pub mod settings;
pub mod tree;

pub use project::{ConnectionSettings, Credential, RunEntry};
pub use settings::SessionOptions;
pub use tree::TreeNode;
