//! BAM/BAI 二进制格式读取子库
//!
//! BGZF 流上的虚拟偏移定位、BAM 文件头与比对记录解码、BAI 索引解析与区域查询。

pub mod bai;
pub mod bam;
pub mod error;
pub mod header;
pub mod reader;
pub mod record;

// 重新导出主要类型
pub use bai::{BaiIndex, Chunk};
pub use bam::{BamReader, BamRecordIterator};
pub use error::{BamError, DecodeError};
pub use header::{BamHeader, ReferenceSequence};
pub use reader::BinaryReader;
pub use record::AlignmentRecord;

/// 库版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
