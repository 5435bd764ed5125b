//! 制表符分隔的堆积计数输出

use maptide_core::{position_stats, Base, PileupTable};
use std::io::{self, Write};

const BASE_COLUMNS: [&str; 4] = ["chrom", "pos", "ins", "cov"];
const STATS_COLUMNS: [&str; 8] = [
    "pc_a",
    "pc_c",
    "pc_g",
    "pc_t",
    "pc_ds",
    "pc_n",
    "entropy",
    "secondary_entropy",
];

pub fn columns(stats: bool) -> Vec<&'static str> {
    let mut columns: Vec<&str> = BASE_COLUMNS.to_vec();
    columns.extend(Base::ALL.iter().map(|b| b.label()));
    if stats {
        columns.extend(STATS_COLUMNS);
    }
    columns
}

/// 四舍五入到 `decimals` 位，整数值保留一位小数 (`100.0`)
fn format_decimal(value: f64, decimals: u32) -> String {
    let factor = 10f64.powi(decimals as i32);
    let rounded = (value * factor).round() / factor;
    format!("{:?}", rounded)
}

/// 写出表头和全部行，按BAM头中的参考序列顺序，再按 `(pos, ins)` 升序
pub fn write_table<W: Write>(
    writer: &mut W,
    table: &PileupTable,
    stats: bool,
    decimals: u32,
) -> io::Result<u64> {
    writeln!(writer, "{}", columns(stats).join("\t"))?;

    let mut rows = 0;
    for (chrom, key, counts) in table.rows() {
        let mut fields = vec![
            chrom.to_string(),
            key.position.to_string(),
            key.insertion.to_string(),
            counts.coverage().to_string(),
        ];
        fields.extend(counts.counts().iter().map(u64::to_string));

        if stats {
            let position = position_stats(&counts);
            fields.extend(position.percentages.iter().map(|&pc| format_decimal(pc, decimals)));
            fields.push(format_decimal(position.entropy, decimals));
            fields.push(format_decimal(position.secondary_entropy, decimals));
        }

        writeln!(writer, "{}", fields.join("\t"))?;
        rows += 1;
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use maptide_core::{PileupAccumulator, PileupKey};
    use maptide_io::AlignmentRecord;
    use noodles::sam::alignment::record::cigar::{op::Kind, Op};

    fn table() -> PileupTable {
        let mut acc = PileupAccumulator::new(vec!["chr1".to_string(), "chr2".to_string()], 0, 0);
        for (ref_id, pos, seq) in [(1, 4, b"AC"), (0, 0, b"AG"), (0, 0, b"AA")] {
            let record = AlignmentRecord {
                ref_id: Some(ref_id),
                pos: Some(pos),
                mapping_quality: 60,
                cigar: vec![Op::new(Kind::Match, 2)],
                sequence: seq.to_vec(),
                base_qualities: vec![30; 2],
                ..Default::default()
            };
            acc.add(&record).unwrap();
        }
        acc.finish().0
    }

    #[test]
    fn test_columns() {
        assert_eq!(columns(false).join(","), "chrom,pos,ins,cov,a,c,g,t,ds,n");
        assert_eq!(columns(true).len(), 18);
    }

    #[test]
    fn test_write_counts() {
        let table = table();
        assert_eq!(table.get("chr1", PileupKey::new(2, 0)).unwrap().coverage(), 2);

        let mut out = Vec::new();
        let rows = write_table(&mut out, &table, false, 3).unwrap();
        assert_eq!(rows, 5);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[1], "chr1\t1\t0\t2\t2\t0\t0\t0\t0\t0");
        assert_eq!(lines[2], "chr1\t2\t0\t2\t1\t0\t1\t0\t0\t0");
        assert_eq!(lines[3], "chr2\t5\t0\t1\t1\t0\t0\t0\t0\t0");
    }

    #[test]
    fn test_write_stats() {
        let mut out = Vec::new();
        write_table(&mut out, &table(), true, 3).unwrap();
        let text = String::from_utf8(out).unwrap();
        let fields: Vec<_> = text.lines().nth(2).unwrap().split('\t').collect();

        assert_eq!(fields.len(), 18);
        assert_eq!(&fields[10..16], ["50.0", "0.0", "50.0", "0.0", "0.0", "0.0"]);
        assert_eq!(fields[16], "0.387");
        assert_eq!(fields[17], "0.0");
    }

    #[test]
    fn test_format_decimal() {
        assert_eq!(format_decimal(100.0, 3), "100.0");
        assert_eq!(format_decimal(100.0 / 3.0, 3), "33.333");
        assert_eq!(format_decimal(2.0 / 3.0, 1), "0.7");
    }
}
