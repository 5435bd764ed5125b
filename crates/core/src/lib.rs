//! 堆积计数引擎
//!
//! 从BAM比对记录按质量过滤累加逐位置碱基计数（A, C, G, T, 缺失, N），
//! 支持区域查询与BAI索引定位，并提供覆盖度与熵等逐位置统计。

pub mod accumulator;
pub mod cigar;
pub mod error;
pub mod pileup;
pub mod query;
pub mod region;
pub mod stats;

// 重新导出主要类型
pub use accumulator::{default_excluded_flags, PileupAccumulator, QueryStats, RegionFilter};
pub use cigar::{CigarEvent, CigarWalker};
pub use error::PileupError;
pub use pileup::{Base, CountVector, PileupKey, PileupTable};
pub use query::{default_index_path, query, query_all, MissingIndexPolicy, PileupQuery, QueryMode};
pub use region::{format_region, parse_region, Region, RegionError};
pub use stats::{entropy, position_stats, PositionStats};
