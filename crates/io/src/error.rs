//! BAM/BAI 读取过程中的错误类型

use std::io;
use thiserror::Error;

/// BAM/BAI文件读取错误
#[derive(Error, Debug)]
pub enum BamError {
    #[error("文件读取错误: {0}")]
    Io(#[from] io::Error),

    #[error("文件不存在: {path}")]
    FileNotFound { path: String },

    /// 记录结构损坏。`offset` 为记录起始的BGZF虚拟偏移，`record` 为从0开始的记录序号
    #[error("BAM记录格式错误 (虚拟偏移 {offset:#x}, 第 {record} 条记录): {message}")]
    Format {
        offset: u64,
        record: u64,
        message: String,
    },

    #[error("BAM头格式错误: {0}")]
    Header(String),

    #[error("BAI索引格式错误: {0}")]
    Index(String),

    #[error("索引中不存在参考序列 (id {id})")]
    ReferenceNotIndexed { id: usize },
}

impl BamError {
    /// 文件打不开时区分"不存在"与其它IO错误
    pub(crate) fn open(path: &std::path::Path, e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::NotFound {
            BamError::FileNotFound {
                path: path.to_string_lossy().to_string(),
            }
        } else {
            BamError::Io(e)
        }
    }
}

/// 单条记录解码失败的原因，由 [`BamReader`](crate::bam::BamReader) 附加偏移后转为 [`BamError::Format`]
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("记录长度 {0} 小于固定字段长度 32")]
    BlockTooShort(usize),

    #[error("字段 {field} 越界: 需要 {needed} 字节, 剩余 {available} 字节")]
    Truncated {
        field: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("无效的参考序列ID: {0}")]
    InvalidReferenceId(i32),

    #[error("无效的比对位置: {0}")]
    InvalidPosition(i32),

    #[error("读名长度为0")]
    EmptyReadName,

    #[error("无效的CIGAR操作码: {0}")]
    InvalidCigarOp(u8),

    #[error("无效的序列长度: {0}")]
    InvalidSequenceLength(i32),

    #[error("无效的标签类型: {0:#04x}")]
    InvalidTag(u8),

    #[error("CIGAR消耗 {cigar} 个碱基, 与序列长度 {sequence} 不符")]
    CigarSequenceMismatch { cigar: usize, sequence: usize },
}
