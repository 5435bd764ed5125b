mod output;

use anyhow::{Context, Result};
use clap::Parser;
use maptide_core::{MissingIndexPolicy, PileupQuery};
use noodles::sam::alignment::record::Flags;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use tracing::{debug, info};

/// 从BAM文件计算逐位置碱基频率（A, C, G, T, 缺失, N）
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 输入BAM文件路径
    bam: PathBuf,

    /// 查询区域，形如 CHROM:START-END（默认：全部）
    #[arg(short, long)]
    region: Option<String>,

    /// BAI索引路径（默认：<BAM>.bai）
    #[arg(short, long)]
    index: Option<PathBuf>,

    /// 最小比对质量
    #[arg(short = 'm', long, default_value_t = 0)]
    mapping_quality: u8,

    /// 最小碱基质量
    #[arg(short = 'b', long, default_value_t = 0)]
    base_quality: u8,

    /// 不使用索引，按区域过滤全文件扫描
    #[arg(long)]
    no_index: bool,

    /// 默认索引不存在时的处理方式
    #[arg(long, value_enum, default_value = "scan")]
    missing_index: MissingIndexPolicy,

    /// 排除FLAG与之相交的记录（十进制或0x开头的十六进制）
    #[arg(long, default_value = "0xF04", value_parser = parse_flags)]
    exclude_flags: u16,

    /// 额外输出逐位置统计（百分比、熵、次级熵）
    #[arg(short, long)]
    stats: bool,

    /// 统计值保留的小数位数
    #[arg(short, long, default_value_t = 3)]
    decimals: u32,

    /// 启用详细日志
    #[arg(short, long)]
    verbose: bool,
}

fn parse_flags(s: &str) -> Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse::<u16>(),
    };
    parsed.map_err(|e| format!("无效的FLAG值 '{}': {}", s, e))
}

fn main() -> Result<()> {
    let args = Args::parse();

    // 日志写到stderr，stdout只输出表格
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("maptide={0},maptide_core={0},maptide_io={0}", log_level))
        .with_writer(io::stderr)
        .init();

    let mut query = PileupQuery::new(&args.bam)
        .min_mapping_quality(args.mapping_quality)
        .min_base_quality(args.base_quality)
        .use_index(!args.no_index)
        .excluded_flags(Flags::from(args.exclude_flags))
        .missing_index(args.missing_index);
    if let Some(region) = &args.region {
        query = query.region(region);
    }
    if let Some(index) = &args.index {
        query = query.index_path(index);
    }
    debug!("查询参数: {:?}", query);

    let (table, stats) = query
        .run_with_stats()
        .with_context(|| format!("处理BAM文件失败: {}", args.bam.display()))?;

    let stdout = io::stdout();
    let mut writer = BufWriter::new(stdout.lock());
    let rows = output::write_table(&mut writer, &table, args.stats, args.decimals)
        .context("写出结果失败")?;
    writer.flush().context("写出结果失败")?;

    info!("输出 {} 行 ({})", rows, stats);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        assert_eq!(parse_flags("0xF04"), Ok(0xF04));
        assert_eq!(parse_flags("1024"), Ok(1024));
        assert!(parse_flags("0xZZ").is_err());
    }

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["maptide", "in.bam"]).unwrap();
        assert_eq!(args.exclude_flags, 0xF04);
        assert_eq!(args.missing_index, MissingIndexPolicy::FallBackToScan);
        assert_eq!(args.decimals, 3);
        assert!(!args.no_index && !args.stats);

        let args = Args::try_parse_from([
            "maptide",
            "in.bam",
            "-r",
            "chr1:1-10",
            "--missing-index",
            "fail",
            "-s",
        ])
        .unwrap();
        assert_eq!(args.region.as_deref(), Some("chr1:1-10"));
        assert_eq!(args.missing_index, MissingIndexPolicy::Fail);
        assert!(args.stats);
    }
}
