//! 按质量过滤把比对记录累加进堆积计数表

use crate::cigar::{CigarEvent, CigarWalker};
use crate::error::PileupError;
use crate::pileup::{Base, PileupKey, PileupTable};
use maptide_io::bai::MAX_POSITION;
use maptide_io::record::QUAL_MISSING;
use maptide_io::AlignmentRecord;
use noodles::sam::alignment::record::Flags;
use std::fmt;

/// 默认排除的记录：未比对、次要比对、QC失败、重复、补充比对 (0xF04)
pub fn default_excluded_flags() -> Flags {
    Flags::UNMAPPED | Flags::SECONDARY | Flags::QC_FAIL | Flags::DUPLICATE | Flags::SUPPLEMENTARY
}

/// 位置过滤器，`start`/`end` 为 1-based 闭区间
///
/// 索引路径和全扫描路径共用同一个过滤器，索引只负责缩小读取范围。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegionFilter {
    pub ref_id: usize,
    pub start: i64,
    pub end: i64,
}

impl RegionFilter {
    pub fn new(ref_id: usize, start: i64, end: i64) -> Self {
        Self { ref_id, start, end }
    }

    pub fn contains(&self, position: i64) -> bool {
        position >= self.start && position <= self.end
    }

    /// 记录是否可能向区间内贡献计数
    ///
    /// 开头的插入归属于比对起点之前的位置，所以记录窗口向左多算 1bp。
    pub fn overlaps(&self, record: &AlignmentRecord) -> bool {
        if record.ref_id != Some(self.ref_id) {
            return false;
        }
        match record.reference_interval() {
            // 0-based [a, b) 对应 1-based [a, b]
            Some((a, b)) => (a as i64) <= self.end && (b as i64) >= self.start,
            None => false,
        }
    }

    /// 用于查询BAI的 0-based 半开区间，与 [`RegionFilter::overlaps`] 的窗口一致
    ///
    /// 区间截断到BAI可表示的坐标范围 `[0, 2^29)`。
    pub fn index_interval(&self) -> (u64, u64) {
        let max = MAX_POSITION as i64;
        let start = self.start.saturating_sub(1).clamp(0, max - 1) as u64;
        let end = self.end.saturating_add(1).clamp(1, max) as u64;
        (start, end)
    }

    /// 坐标排序的文件中，此后的记录都不可能与区间重叠
    pub(crate) fn past_end(&self, record: &AlignmentRecord) -> bool {
        match (record.ref_id, record.pos) {
            (None, _) => true,
            (Some(id), _) if id > self.ref_id => true,
            (Some(id), Some(pos)) if id == self.ref_id => i64::from(pos) > self.end,
            _ => false,
        }
    }
}

/// 一次查询的记录统计
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueryStats {
    pub records_read: u64,
    pub records_counted: u64,
    pub filtered_by_flag: u64,
    pub filtered_by_mapping_quality: u64,
    pub filtered_by_region: u64,
    pub missing_sequence: u64,
}

impl fmt::Display for QueryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "读取 {} 条, 计入 {} 条, FLAG过滤 {} 条, MAPQ过滤 {} 条, 区域外 {} 条, 无序列 {} 条",
            self.records_read,
            self.records_counted,
            self.filtered_by_flag,
            self.filtered_by_mapping_quality,
            self.filtered_by_region,
            self.missing_sequence
        )
    }
}

/// 堆积计数累加器
pub struct PileupAccumulator {
    table: PileupTable,
    min_mapping_quality: u8,
    min_base_quality: u8,
    excluded_flags: Flags,
    region: Option<RegionFilter>,
    stats: QueryStats,
}

impl PileupAccumulator {
    pub fn new(references: Vec<String>, min_mapping_quality: u8, min_base_quality: u8) -> Self {
        Self {
            table: PileupTable::new(references),
            min_mapping_quality,
            min_base_quality,
            excluded_flags: default_excluded_flags(),
            region: None,
            stats: QueryStats::default(),
        }
    }

    pub fn with_excluded_flags(mut self, flags: Flags) -> Self {
        self.excluded_flags = flags;
        self
    }

    pub fn with_region(mut self, region: Option<RegionFilter>) -> Self {
        self.region = region;
        self
    }

    pub fn stats(&self) -> &QueryStats {
        &self.stats
    }

    fn passes_mapping_quality(&self, record: &AlignmentRecord) -> bool {
        match record.mapping_quality() {
            Some(mapq) => mapq >= self.min_mapping_quality,
            None => self.min_mapping_quality == 0,
        }
    }

    fn passes_base_quality(&self, quality: u8) -> bool {
        if quality == QUAL_MISSING {
            self.min_base_quality == 0
        } else {
            quality >= self.min_base_quality
        }
    }

    /// 累加一条记录，返回是否计入
    pub fn add(&mut self, record: &AlignmentRecord) -> Result<bool, PileupError> {
        self.stats.records_read += 1;

        if record.flags.intersects(self.excluded_flags) {
            self.stats.filtered_by_flag += 1;
            return Ok(false);
        }
        let (ref_id, pos) = match (record.ref_id, record.pos) {
            (Some(ref_id), Some(pos)) => (ref_id, pos),
            _ => {
                self.stats.filtered_by_flag += 1;
                return Ok(false);
            }
        };
        if ref_id >= self.table.references().len() {
            return Err(PileupError::InvalidReferenceId { id: ref_id });
        }
        if !self.passes_mapping_quality(record) {
            self.stats.filtered_by_mapping_quality += 1;
            return Ok(false);
        }
        if let Some(region) = &self.region {
            if !region.overlaps(record) {
                self.stats.filtered_by_region += 1;
                return Ok(false);
            }
        }
        if record.sequence.is_empty() {
            self.stats.missing_sequence += 1;
            return Ok(false);
        }

        for event in CigarWalker::new(&record.cigar, pos) {
            let (key, read_pos) = match event {
                CigarEvent::Aligned { ref_pos, read_pos } => {
                    (PileupKey::new(ref_pos, 0), Some(read_pos))
                }
                CigarEvent::Inserted {
                    ref_pos,
                    offset,
                    read_pos,
                } => (PileupKey::new(ref_pos, offset), Some(read_pos)),
                CigarEvent::Deleted { ref_pos } => (PileupKey::new(ref_pos, 0), None),
            };

            if let Some(region) = &self.region {
                if !region.contains(key.position) {
                    continue;
                }
            }

            let base = match read_pos {
                Some(i) => {
                    let quality = record.base_qualities.get(i).copied().unwrap_or(QUAL_MISSING);
                    if !self.passes_base_quality(quality) {
                        continue;
                    }
                    record.sequence.get(i).map_or(Base::N, |&b| Base::from_symbol(b))
                }
                // 缺失没有碱基质量，不做过滤
                None => Base::Deletion,
            };
            self.table.increment(ref_id, key, base);
        }

        self.stats.records_counted += 1;
        Ok(true)
    }

    pub fn finish(self) -> (PileupTable, QueryStats) {
        (self.table, self.stats)
    }
}
