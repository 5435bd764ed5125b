//! 查询调度：全扫描、索引定位、带区域过滤的全扫描三种模式

use crate::accumulator::{default_excluded_flags, PileupAccumulator, QueryStats, RegionFilter};
use crate::error::PileupError;
use crate::pileup::PileupTable;
use crate::region::{parse_region, Region};
use maptide_io::{AlignmentRecord, BaiIndex, BamHeader, BamReader};
use noodles::sam::alignment::record::Flags;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 默认索引路径的后缀
pub const INDEX_SUFFIX: &str = ".bai";

/// 默认索引文件不存在时的处理方式
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum MissingIndexPolicy {
    /// 警告后改为带区域过滤的全扫描
    #[default]
    #[clap(name = "scan")]
    FallBackToScan,
    /// 报错
    #[clap(name = "fail")]
    Fail,
}

/// 实际采用的读取策略
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryMode {
    FullScan,
    Indexed { region: Region, index: PathBuf },
    RegionScan { region: Region },
}

impl fmt::Display for QueryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryMode::FullScan => write!(f, "全文件扫描"),
            QueryMode::Indexed { region, index } => {
                write!(f, "索引查询 {} (索引 {})", region, index.display())
            }
            QueryMode::RegionScan { region } => write!(f, "区域过滤扫描 {}", region),
        }
    }
}

/// `<bam>.bai`
pub fn default_index_path<P: AsRef<Path>>(bam_path: P) -> PathBuf {
    let mut path = bam_path.as_ref().as_os_str().to_owned();
    path.push(INDEX_SUFFIX);
    PathBuf::from(path)
}

/// 一次堆积计数查询的全部选项
///
/// ```no_run
/// use maptide_core::PileupQuery;
///
/// let table = PileupQuery::new("sample.bam")
///     .region("chr1:1000-2000")
///     .min_mapping_quality(20)
///     .min_base_quality(13)
///     .run()?;
/// # Ok::<(), maptide_core::PileupError>(())
/// ```
#[derive(Clone, Debug)]
pub struct PileupQuery {
    bam_path: PathBuf,
    region: Option<String>,
    index_path: Option<PathBuf>,
    min_mapping_quality: u8,
    min_base_quality: u8,
    use_index: bool,
    excluded_flags: Flags,
    missing_index: MissingIndexPolicy,
    cancel: Option<Arc<AtomicBool>>,
}

impl PileupQuery {
    pub fn new<P: AsRef<Path>>(bam_path: P) -> Self {
        Self {
            bam_path: bam_path.as_ref().to_path_buf(),
            region: None,
            index_path: None,
            min_mapping_quality: 0,
            min_base_quality: 0,
            use_index: true,
            excluded_flags: default_excluded_flags(),
            missing_index: MissingIndexPolicy::default(),
            cancel: None,
        }
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn index_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.index_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn min_mapping_quality(mut self, quality: u8) -> Self {
        self.min_mapping_quality = quality;
        self
    }

    pub fn min_base_quality(mut self, quality: u8) -> Self {
        self.min_base_quality = quality;
        self
    }

    pub fn use_index(mut self, use_index: bool) -> Self {
        self.use_index = use_index;
        self
    }

    pub fn excluded_flags(mut self, flags: Flags) -> Self {
        self.excluded_flags = flags;
        self
    }

    pub fn missing_index(mut self, policy: MissingIndexPolicy) -> Self {
        self.missing_index = policy;
        self
    }

    /// 置位后查询在下一条记录处中止并返回 [`PileupError::Cancelled`]
    pub fn cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// 校验选项并选择读取策略，不打开BAM文件
    pub fn plan(&self) -> Result<QueryMode, PileupError> {
        if !self.use_index && self.index_path.is_some() {
            return Err(PileupError::Configuration(
                "关闭索引模式时不能同时指定索引文件".to_string(),
            ));
        }

        let region = match &self.region {
            Some(s) => parse_region(s)?,
            None => {
                if let Some(path) = &self.index_path {
                    debug!("未指定区域，忽略索引文件 {}", path.display());
                }
                return Ok(QueryMode::FullScan);
            }
        };

        if !self.use_index {
            return Ok(QueryMode::RegionScan { region });
        }

        if let Some(path) = &self.index_path {
            if !path.exists() {
                return Err(PileupError::IndexNotFound {
                    path: path.display().to_string(),
                });
            }
            return Ok(QueryMode::Indexed {
                region,
                index: path.clone(),
            });
        }

        let derived = default_index_path(&self.bam_path);
        if derived.exists() {
            return Ok(QueryMode::Indexed {
                region,
                index: derived,
            });
        }
        match self.missing_index {
            MissingIndexPolicy::Fail => Err(PileupError::IndexNotFound {
                path: derived.display().to_string(),
            }),
            MissingIndexPolicy::FallBackToScan => {
                warn!("索引文件 {} 不存在，改为全文件扫描", derived.display());
                Ok(QueryMode::RegionScan { region })
            }
        }
    }

    pub fn run(&self) -> Result<PileupTable, PileupError> {
        self.run_with_stats().map(|(table, _)| table)
    }

    pub fn run_with_stats(&self) -> Result<(PileupTable, QueryStats), PileupError> {
        let mode = self.plan()?;
        let mut reader = BamReader::from_path(&self.bam_path)?;
        info!("查询模式: {}", mode);

        let filter = match &mode {
            QueryMode::FullScan => None,
            QueryMode::Indexed { region, .. } | QueryMode::RegionScan { region } => {
                Some(region_filter(reader.header(), region)?)
            }
        };

        let mut accumulator = PileupAccumulator::new(
            reader.header().reference_names(),
            self.min_mapping_quality,
            self.min_base_quality,
        )
        .with_excluded_flags(self.excluded_flags)
        .with_region(filter);

        match (&mode, filter) {
            (QueryMode::Indexed { index, .. }, Some(filter)) => {
                self.scan_indexed(&mut reader, index, &filter, &mut accumulator)?
            }
            _ => self.scan_all(&mut reader, &mut accumulator)?,
        }

        let (table, stats) = accumulator.finish();
        info!("查询完成: {}; 表中 {} 个位置", stats, table.len());
        Ok((table, stats))
    }

    fn check_cancelled(&self) -> Result<(), PileupError> {
        match &self.cancel {
            Some(flag) if flag.load(Ordering::Relaxed) => {
                info!("查询已取消");
                Err(PileupError::Cancelled)
            }
            _ => Ok(()),
        }
    }

    fn scan_all(
        &self,
        reader: &mut BamReader<File>,
        accumulator: &mut PileupAccumulator,
    ) -> Result<(), PileupError> {
        for result in reader.records() {
            self.check_cancelled()?;
            accumulator.add(&result?)?;
        }
        Ok(())
    }

    fn scan_indexed(
        &self,
        reader: &mut BamReader<File>,
        index_path: &Path,
        filter: &RegionFilter,
        accumulator: &mut PileupAccumulator,
    ) -> Result<(), PileupError> {
        let index = BaiIndex::from_path(index_path)?;
        let (start, end) = filter.index_interval();
        let chunks = index.resolve(filter.ref_id, start, end)?;

        let mut record = AlignmentRecord::default();
        for chunk in chunks {
            reader.seek(chunk.start)?;
            loop {
                self.check_cancelled()?;
                if reader.virtual_position() >= chunk.end {
                    break;
                }
                if reader.read_record(&mut record)? == 0 {
                    break;
                }
                if filter.past_end(&record) {
                    break;
                }
                accumulator.add(&record)?;
            }
        }
        Ok(())
    }
}

/// 把区域换算为头中的参考序列编号和 1-based 闭区间
///
/// 省略起点时从 0 开始，以包含归属于第一个碱基之前的插入；
/// 省略终点时取参考序列长度。超出 i64 的坐标饱和到 `i64::MAX`。
/// BAI 的坐标上限只作用于索引查询区间，不影响这里的精确过滤。
fn region_filter(header: &BamHeader, region: &Region) -> Result<RegionFilter, PileupError> {
    let ref_id = header
        .reference_id(&region.chrom)
        .ok_or_else(|| PileupError::UnknownReference {
            name: region.chrom.clone(),
        })?;

    let to_i64 = |pos: u64| i64::try_from(pos).unwrap_or(i64::MAX);
    let start = region.start.map_or(0, to_i64);
    let end = match region.end {
        Some(end) => to_i64(end),
        None => header
            .reference(ref_id)
            .map(|r| i64::from(r.length))
            .filter(|&len| len > 0)
            .unwrap_or(i64::MAX),
    };
    Ok(RegionFilter::new(ref_id, start, end))
}

/// 按区域查询，签名与命令行参数一一对应
pub fn query<P: AsRef<Path>>(
    bam_path: P,
    region: Option<&str>,
    index_path: Option<&Path>,
    min_mapping_quality: u8,
    min_base_quality: u8,
    use_index: bool,
) -> Result<PileupTable, PileupError> {
    let mut query = PileupQuery::new(bam_path)
        .min_mapping_quality(min_mapping_quality)
        .min_base_quality(min_base_quality)
        .use_index(use_index);
    if let Some(region) = region {
        query = query.region(region);
    }
    if let Some(path) = index_path {
        query = query.index_path(path);
    }
    query.run()
}

/// 全文件堆积计数
pub fn query_all<P: AsRef<Path>>(
    bam_path: P,
    min_mapping_quality: u8,
    min_base_quality: u8,
) -> Result<PileupTable, PileupError> {
    PileupQuery::new(bam_path)
        .min_mapping_quality(min_mapping_quality)
        .min_base_quality(min_base_quality)
        .run()
}
