//! BAI 索引解析与区域查询
//!
//! ```text
//! magic       "BAI\1"
//! n_ref       int32
//! 每条参考序列:
//!   n_bin     int32
//!   每个bin:  bin uint32, n_chunk int32, 每个chunk: beg uint64, end uint64 (虚拟偏移)
//!   n_intv    int32
//!   ioffset   uint64[n_intv]   线性索引, 每 16kb 窗口最小虚拟偏移
//! n_no_coor   uint64 (可选)
//! ```
//!
//! 分箱为固定6层: 1 个 512Mbp bin, 8 个 64Mbp, 64 个 8Mbp, 512 个 1Mbp,
//! 4096 个 128kbp, 32768 个 16kbp，共 37449 个 bin。37450 号为元数据伪bin。

use crate::error::BamError;
use noodles::bgzf::VirtualPosition;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use tracing::debug;

const BAI_MAGIC: &[u8; 4] = b"BAI\x01";

/// 分箱方案能表示的最大坐标（不含）
pub const MAX_POSITION: u64 = 1 << 29;

/// 元数据伪bin编号
pub const METADATA_BIN: u32 = 37450;

const LINEAR_WINDOW_SHIFT: u32 = 14;

/// 每层 (bin编号起点, 位移)，从 512Mbp 到 16kbp
const LEVELS: [(u32, u32); 6] = [(0, 29), (1, 26), (9, 23), (73, 20), (585, 17), (4681, 14)];

/// 一段虚拟偏移范围 `[start, end)`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Chunk {
    pub start: VirtualPosition,
    pub end: VirtualPosition,
}

impl Chunk {
    pub fn new(start: VirtualPosition, end: VirtualPosition) -> Self {
        Self { start, end }
    }
}

/// 元数据伪bin中记录的参考序列概况
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReferenceMetadata {
    pub start: VirtualPosition,
    pub end: VirtualPosition,
    pub mapped: u64,
    pub unmapped: u64,
}

/// 单条参考序列的分箱索引和线性索引
#[derive(Clone, Debug, Default)]
pub struct ReferenceIndex {
    pub bins: HashMap<u32, Vec<Chunk>>,
    pub intervals: Vec<VirtualPosition>,
    pub metadata: Option<ReferenceMetadata>,
}

impl ReferenceIndex {
    /// 线性索引给出的最小偏移：起点所在窗口之前结束的chunk都不可能包含目标记录
    pub fn min_offset(&self, start: u64) -> VirtualPosition {
        let window = (start >> LINEAR_WINDOW_SHIFT) as usize;
        self.intervals
            .get(window)
            .or(self.intervals.last())
            .copied()
            .unwrap_or_else(|| VirtualPosition::from(0))
    }
}

/// BAI索引
#[derive(Clone, Debug, Default)]
pub struct BaiIndex {
    references: Vec<ReferenceIndex>,
    unplaced_unmapped: Option<u64>,
}

impl BaiIndex {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, BamError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| BamError::open(path, e))?;
        let index = Self::read(BufReader::new(file))?;
        debug!(
            "已读取BAI索引: {} ({} 条参考序列)",
            path.display(),
            index.references.len()
        );
        Ok(index)
    }

    pub fn read<R: Read>(mut reader: R) -> Result<Self, BamError> {
        let mut magic = [0u8; 4];
        read_exact(&mut reader, &mut magic)?;
        if &magic != BAI_MAGIC {
            return Err(BamError::Index(format!(
                "魔数错误: 期望 {:?}, 实际 {:?}",
                BAI_MAGIC, magic
            )));
        }

        let n_ref = read_count(&mut reader, "n_ref")?;
        let mut references = Vec::with_capacity(n_ref);
        for _ in 0..n_ref {
            references.push(read_reference(&mut reader)?);
        }

        let mut buf = [0u8; 8];
        let unplaced_unmapped = match reader.read_exact(&mut buf) {
            Ok(()) => Some(u64::from_le_bytes(buf)),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => None,
            Err(e) => return Err(BamError::Io(e)),
        };

        Ok(Self {
            references,
            unplaced_unmapped,
        })
    }

    pub fn references(&self) -> &[ReferenceIndex] {
        &self.references
    }

    /// 没有坐标的未比对记录数（索引末尾可选字段）
    pub fn unplaced_unmapped(&self) -> Option<u64> {
        self.unplaced_unmapped
    }

    /// 把 0-based 半开区间 `[start, end)` 解析为需要扫描的虚拟偏移范围
    ///
    /// 返回的范围按起点升序且互不重叠，保证覆盖所有可能与区间重叠的记录；
    /// 范围内也会有不重叠的记录，调用方必须再按位置过滤。
    pub fn resolve(&self, ref_id: usize, start: u64, end: u64) -> Result<Vec<Chunk>, BamError> {
        let reference = self
            .references
            .get(ref_id)
            .ok_or(BamError::ReferenceNotIndexed { id: ref_id })?;

        let start = start.min(MAX_POSITION - 1);
        let end = end.clamp(start + 1, MAX_POSITION);

        let mut chunks: Vec<Chunk> = reg2bins(start, end)
            .into_iter()
            .filter_map(|bin| reference.bins.get(&bin))
            .flatten()
            .copied()
            .collect();

        let min_offset = reference.min_offset(start);
        chunks.retain(|chunk| chunk.end > min_offset);

        let merged = merge_chunks(chunks);
        debug!(
            "索引解析: ref {} [{}, {}) -> {} 个chunk",
            ref_id,
            start,
            end,
            merged.len()
        );
        Ok(merged)
    }
}

fn read_reference<R: Read>(reader: &mut R) -> Result<ReferenceIndex, BamError> {
    let mut index = ReferenceIndex::default();

    let n_bin = read_count(reader, "n_bin")?;
    for _ in 0..n_bin {
        let bin = read_u32(reader)?;
        let n_chunk = read_count(reader, "n_chunk")?;
        let mut chunks = Vec::with_capacity(n_chunk);
        for _ in 0..n_chunk {
            let start = VirtualPosition::from(read_u64(reader)?);
            let end = VirtualPosition::from(read_u64(reader)?);
            chunks.push(Chunk::new(start, end));
        }

        if bin == METADATA_BIN {
            if chunks.len() != 2 {
                return Err(BamError::Index(format!(
                    "元数据bin应有2个chunk, 实际 {}",
                    chunks.len()
                )));
            }
            index.metadata = Some(ReferenceMetadata {
                start: chunks[0].start,
                end: chunks[0].end,
                mapped: u64::from(chunks[1].start),
                unmapped: u64::from(chunks[1].end),
            });
        } else if bin > METADATA_BIN {
            return Err(BamError::Index(format!("bin编号越界: {}", bin)));
        } else {
            index.bins.entry(bin).or_default().extend(chunks);
        }
    }

    let n_intv = read_count(reader, "n_intv")?;
    index.intervals.reserve(n_intv);
    for _ in 0..n_intv {
        index.intervals.push(VirtualPosition::from(read_u64(reader)?));
    }

    Ok(index)
}

/// 0-based 半开区间 `[start, end)` 完全落入的最小bin
///
/// ```
/// use maptide_io::bai::reg2bin;
///
/// assert_eq!(reg2bin(0, 100), 4681);
/// assert_eq!(reg2bin(16_000, 17_000), 585);
/// assert_eq!(reg2bin(0, 1 << 29), 0);
/// ```
pub fn reg2bin(start: u64, end: u64) -> u32 {
    let end = end.max(start + 1) - 1;
    for &(offset, shift) in LEVELS.iter().rev() {
        if start >> shift == end >> shift {
            return offset + (start >> shift) as u32;
        }
    }
    0
}

/// 所有可能与 `[start, end)` 重叠的bin，按编号升序
pub fn reg2bins(start: u64, end: u64) -> Vec<u32> {
    let end = end.max(start + 1).min(MAX_POSITION) - 1;
    let start = start.min(end);

    let mut bins = Vec::new();
    for &(offset, shift) in LEVELS.iter() {
        let first = offset + (start >> shift) as u32;
        let last = offset + (end >> shift) as u32;
        bins.extend(first..=last);
    }
    bins
}

/// 排序并合并重叠或相邻的chunk
fn merge_chunks(mut chunks: Vec<Chunk>) -> Vec<Chunk> {
    chunks.sort_by_key(|c| c.start);

    let mut merged: Vec<Chunk> = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        match merged.last_mut() {
            Some(current) if chunk.start <= current.end => {
                current.end = current.end.max(chunk.end);
            }
            _ => merged.push(chunk),
        }
    }
    merged
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), BamError> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            BamError::Index("索引文件被截断".to_string())
        } else {
            BamError::Io(e)
        }
    })
}

fn read_count<R: Read>(reader: &mut R, field: &str) -> Result<usize, BamError> {
    let mut buf = [0u8; 4];
    read_exact(reader, &mut buf)?;
    let value = i32::from_le_bytes(buf);
    usize::try_from(value).map_err(|_| BamError::Index(format!("{} 为负数: {}", field, value)))
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32, BamError> {
    let mut buf = [0u8; 4];
    read_exact(reader, &mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(reader: &mut R) -> Result<u64, BamError> {
    let mut buf = [0u8; 8];
    read_exact(reader, &mut buf)?;
    Ok(u64::from_le_bytes(buf))
}
