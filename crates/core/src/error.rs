use crate::region::RegionError;
use maptide_io::BamError;
use thiserror::Error;

/// 堆积计数查询过程中可能发生的错误
#[derive(Error, Debug)]
pub enum PileupError {
    #[error("BAM读取错误: {0}")]
    Bam(#[from] BamError),

    /// 参数组合互相矛盾，在任何文件读取之前报告
    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("区域解析错误: {0}")]
    Region(#[from] RegionError),

    #[error("BAM头中没有参考序列: {name}")]
    UnknownReference { name: String },

    #[error("记录引用了BAM头中不存在的参考序列编号: {id}")]
    InvalidReferenceId { id: usize },

    #[error("找不到索引文件: {path}")]
    IndexNotFound { path: String },

    #[error("查询已取消")]
    Cancelled,
}
