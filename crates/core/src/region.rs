//! 基因组区域 `CHROM:START-END` 的解析与格式化
//!
//! 坐标为 1-based 闭区间，省略的端点表示该方向不设边界。
//! 名称中含 `:` 的参考序列用 `{}` 包裹，例如 `{HLA-A*01:01}:100-200`。

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegionError {
    #[error("区域为空")]
    Empty,

    #[error("无效的坐标: {0}")]
    InvalidPosition(String),

    #[error("起点 {start} 大于终点 {end}")]
    StartAfterEnd { start: u64, end: u64 },

    #[error("参考序列名缺少结尾的 '}}': {0}")]
    UnclosedBrace(String),
}

/// 基因组区域
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Region {
    pub chrom: String,
    pub start: Option<u64>,
    pub end: Option<u64>,
}

impl Region {
    pub fn new(
        chrom: impl Into<String>,
        start: Option<u64>,
        end: Option<u64>,
    ) -> Result<Self, RegionError> {
        let chrom = chrom.into();
        if chrom.is_empty() {
            return Err(RegionError::Empty);
        }
        if start == Some(0) || end == Some(0) {
            return Err(RegionError::InvalidPosition("0".to_string()));
        }
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(RegionError::StartAfterEnd { start, end });
            }
        }
        Ok(Self { chrom, start, end })
    }

    /// 整条参考序列
    pub fn whole(chrom: impl Into<String>) -> Self {
        Self {
            chrom: chrom.into(),
            start: None,
            end: None,
        }
    }

    pub fn contains(&self, pos: u64) -> bool {
        self.start.map_or(true, |s| pos >= s) && self.end.map_or(true, |e| pos <= e)
    }
}

impl FromStr for Region {
    type Err = RegionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_region(s)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.chrom.contains(':') {
            write!(f, "{{{}}}", self.chrom)?;
        } else {
            f.write_str(&self.chrom)?;
        }

        match (self.start, self.end) {
            (None, None) => Ok(()),
            (Some(s), Some(e)) => write!(f, ":{}-{}", s, e),
            (Some(s), None) => write!(f, ":{}-", s),
            (None, Some(e)) => write!(f, ":-{}", e),
        }
    }
}

/// 解析 `CHROM`, `CHROM:START`, `CHROM:START-END`, `CHROM:-END`, `CHROM:START-`
///
/// ```
/// use maptide_core::region::parse_region;
///
/// let region = parse_region("chr1:1,000-2000").unwrap();
/// assert_eq!(region.chrom, "chr1");
/// assert_eq!(region.start, Some(1000));
/// assert_eq!(region.end, Some(2000));
///
/// let region = parse_region("chrM").unwrap();
/// assert_eq!((region.start, region.end), (None, None));
/// ```
pub fn parse_region(s: &str) -> Result<Region, RegionError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(RegionError::Empty);
    }

    if let Some(rest) = s.strip_prefix('{') {
        let (chrom, suffix) = rest
            .split_once('}')
            .ok_or_else(|| RegionError::UnclosedBrace(s.to_string()))?;
        return match suffix.strip_prefix(':') {
            Some(interval) if !interval.is_empty() => {
                let (start, end) = parse_interval(interval)?
                    .ok_or_else(|| RegionError::InvalidPosition(interval.to_string()))?;
                Region::new(chrom, start, end)
            }
            _ if suffix.is_empty() || suffix == ":" => Region::new(chrom, None, None),
            _ => Err(RegionError::InvalidPosition(suffix.to_string())),
        };
    }

    if let Some((chrom, interval)) = s.rsplit_once(':') {
        if interval.is_empty() {
            return Region::new(chrom, None, None);
        }
        if let Some((start, end)) = parse_interval(interval)? {
            return Region::new(chrom, start, end);
        }
    }

    // 冒号后不是坐标时整串视为参考序列名
    Ok(Region::whole(s))
}

pub fn format_region(region: &Region) -> String {
    region.to_string()
}

/// 不像坐标时返回 `Ok(None)`；像坐标但数值非法时返回错误
fn parse_interval(s: &str) -> Result<Option<(Option<u64>, Option<u64>)>, RegionError> {
    let looks_numeric = s.chars().all(|c| c.is_ascii_digit() || c == ',' || c == '-');
    if !looks_numeric || s == "-" {
        return Ok(None);
    }

    let (start, end) = match s.split_once('-') {
        Some((start, end)) => (parse_position(start)?, parse_position(end)?),
        None => {
            let start = parse_position(s)?;
            (start, None)
        }
    };
    Ok(Some((start, end)))
}

fn parse_position(s: &str) -> Result<Option<u64>, RegionError> {
    if s.is_empty() {
        return Ok(None);
    }
    let digits: String = s.chars().filter(|&c| c != ',').collect();
    match digits.parse::<u64>() {
        Ok(0) | Err(_) => Err(RegionError::InvalidPosition(s.to_string())),
        Ok(n) => Ok(Some(n)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_forms() {
        assert_eq!(parse_region("chr1").unwrap(), Region::whole("chr1"));
        assert_eq!(
            parse_region("chr1:100").unwrap(),
            Region::new("chr1", Some(100), None).unwrap()
        );
        assert_eq!(
            parse_region("chr1:100-200").unwrap(),
            Region::new("chr1", Some(100), Some(200)).unwrap()
        );
        assert_eq!(
            parse_region("chr1:-200").unwrap(),
            Region::new("chr1", None, Some(200)).unwrap()
        );
        assert_eq!(parse_region("chr1:").unwrap(), Region::whole("chr1"));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_region(""), Err(RegionError::Empty));
        assert_eq!(
            parse_region("chr1:200-100"),
            Err(RegionError::StartAfterEnd { start: 200, end: 100 })
        );
        assert!(matches!(parse_region("chr1:0-10"), Err(RegionError::InvalidPosition(_))));
        assert!(matches!(parse_region("chr1:1-2-3"), Err(RegionError::InvalidPosition(_))));
        assert!(matches!(parse_region("{chr1:1-2"), Err(RegionError::UnclosedBrace(_))));
    }

    #[test]
    fn test_names_with_colons() {
        assert_eq!(parse_region("HLA:abc").unwrap(), Region::whole("HLA:abc"));
        assert_eq!(
            parse_region("{HLA-A*01:01}:5-9").unwrap(),
            Region::new("HLA-A*01:01", Some(5), Some(9)).unwrap()
        );
        assert_eq!(parse_region("{HLA-A*01:01}").unwrap(), Region::whole("HLA-A*01:01"));
    }

    #[test]
    fn test_format_round_trip() {
        let regions = [
            Region::whole("chr1"),
            Region::whole("HLA-A*01:01"),
            Region::new("chr2", Some(1), Some(1)).unwrap(),
            Region::new("chr2", Some(10), None).unwrap(),
            Region::new("chr2", None, Some(99)).unwrap(),
            Region::new("x:y", Some(3), Some(4)).unwrap(),
            Region::new("chrUn_gl000220", Some(1_000_000), Some(2_000_000)).unwrap(),
        ];
        for region in regions {
            assert_eq!(parse_region(&format_region(&region)).unwrap(), region);
        }
    }

    #[test]
    fn test_contains() {
        let region = Region::new("chr1", Some(10), Some(20)).unwrap();
        assert!(region.contains(10) && region.contains(20));
        assert!(!region.contains(9) && !region.contains(21));
        assert!(Region::whole("chr1").contains(1));
    }
}
