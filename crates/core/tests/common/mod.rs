//! 测试用 BAM/BAI 生成

#![allow(dead_code)]

use maptide_io::bai::reg2bin;
use noodles::bgzf::{self, VirtualPosition};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tempfile::TempDir;

const SEQ_CODES: &[u8; 16] = b"=ACMGRSVTWYHKDBN";
const CIGAR_CODES: &[u8; 9] = b"MIDNSHP=X";

#[derive(Clone, Debug)]
pub struct TestRead {
    pub ref_id: i32,
    pub pos: i32,
    pub mapq: u8,
    pub flags: u16,
    pub cigar: Vec<(u8, u32)>,
    pub sequence: Vec<u8>,
    pub qualities: Vec<u8>,
}

impl TestRead {
    /// `pos` 为 0-based，`cigar` 为 SAM 文本形式
    pub fn new(ref_id: i32, pos: i32, cigar: &str, sequence: &[u8]) -> Self {
        Self {
            ref_id,
            pos,
            mapq: 60,
            flags: 0,
            cigar: parse_cigar(cigar),
            sequence: sequence.to_vec(),
            qualities: vec![30; sequence.len()],
        }
    }

    pub fn unplaced(sequence: &[u8]) -> Self {
        Self {
            ref_id: -1,
            pos: -1,
            mapq: 0,
            flags: 0x4,
            cigar: Vec::new(),
            sequence: sequence.to_vec(),
            qualities: vec![30; sequence.len()],
        }
    }

    pub fn mapq(mut self, mapq: u8) -> Self {
        self.mapq = mapq;
        self
    }

    pub fn flags(mut self, flags: u16) -> Self {
        self.flags = flags;
        self
    }

    pub fn quality(mut self, quality: u8) -> Self {
        self.qualities = vec![quality; self.sequence.len()];
        self
    }

    fn reference_span(&self) -> i32 {
        self.cigar
            .iter()
            .filter(|(op, _)| matches!(op, 0 | 2 | 3 | 7 | 8))
            .map(|&(_, len)| len as i32)
            .sum()
    }

    fn encode(&self) -> Vec<u8> {
        let end = self.pos + self.reference_span().max(1);
        let bin = if self.pos < 0 {
            4680
        } else {
            reg2bin(self.pos as u64, end as u64) as u16
        };

        let mut buf = Vec::new();
        buf.extend_from_slice(&self.ref_id.to_le_bytes());
        buf.extend_from_slice(&self.pos.to_le_bytes());
        buf.push(6);
        buf.push(self.mapq);
        buf.extend_from_slice(&bin.to_le_bytes());
        buf.extend_from_slice(&(self.cigar.len() as u16).to_le_bytes());
        buf.extend_from_slice(&self.flags.to_le_bytes());
        buf.extend_from_slice(&(self.sequence.len() as i32).to_le_bytes());
        buf.extend_from_slice(&(-1i32).to_le_bytes());
        buf.extend_from_slice(&(-1i32).to_le_bytes());
        buf.extend_from_slice(&0i32.to_le_bytes());
        buf.extend_from_slice(b"read1\0");
        for &(op, len) in &self.cigar {
            buf.extend_from_slice(&((len << 4) | u32::from(op)).to_le_bytes());
        }
        for pair in self.sequence.chunks(2) {
            let hi = seq_code(pair[0]);
            let lo = pair.get(1).map_or(0, |&b| seq_code(b));
            buf.push((hi << 4) | lo);
        }
        buf.extend_from_slice(&self.qualities);
        buf
    }
}

fn seq_code(base: u8) -> u8 {
    let base = base.to_ascii_uppercase();
    SEQ_CODES.iter().position(|&c| c == base).unwrap_or(15) as u8
}

pub fn parse_cigar(cigar: &str) -> Vec<(u8, u32)> {
    let mut ops = Vec::new();
    let mut len = 0u32;
    for c in cigar.bytes() {
        if c.is_ascii_digit() {
            len = len * 10 + u32::from(c - b'0');
        } else {
            let code = CIGAR_CODES.iter().position(|&x| x == c).unwrap() as u8;
            ops.push((code, len));
            len = 0;
        }
    }
    ops
}

/// 测试文件所在的临时目录随 `Fixture` 一起删除
pub struct Fixture {
    pub bam: PathBuf,
    pub bai: PathBuf,
    _dir: TempDir,
}

#[derive(Default)]
struct IndexBuilder {
    bins: BTreeMap<u32, Vec<(VirtualPosition, VirtualPosition)>>,
    intervals: Vec<Option<VirtualPosition>>,
}

/// 写出坐标排序的BAM，`with_index` 时在 `<bam>.bai` 写出对应的索引
pub fn write_bam(
    name: &str,
    references: &[(&str, u32)],
    reads: &[TestRead],
    with_index: bool,
) -> Fixture {
    let dir = tempfile::Builder::new()
        .prefix(&format!("maptide-{}-", name))
        .tempdir()
        .unwrap();
    let bam = dir.path().join("test.bam");
    let bai = dir.path().join("test.bam.bai");

    let mut writer = bgzf::io::Writer::new(Vec::new());

    let text = b"@HD\tVN:1.6\tSO:coordinate\n";
    let mut header = Vec::new();
    header.extend_from_slice(b"BAM\x01");
    header.extend_from_slice(&(text.len() as i32).to_le_bytes());
    header.extend_from_slice(text);
    header.extend_from_slice(&(references.len() as i32).to_le_bytes());
    for (name, length) in references {
        header.extend_from_slice(&(name.len() as i32 + 1).to_le_bytes());
        header.extend_from_slice(name.as_bytes());
        header.push(0);
        header.extend_from_slice(&(*length as i32).to_le_bytes());
    }
    writer.write_all(&header).unwrap();

    let mut indexes: Vec<IndexBuilder> =
        references.iter().map(|_| IndexBuilder::default()).collect();
    let mut unplaced = 0u64;

    for read in reads {
        let data = read.encode();
        let start = writer.virtual_position();
        writer.write_all(&(data.len() as i32).to_le_bytes()).unwrap();
        writer.write_all(&data).unwrap();
        let end = writer.virtual_position();

        if read.ref_id < 0 || read.pos < 0 {
            unplaced += 1;
            continue;
        }
        let beg = read.pos as u64;
        let stop = beg + read.reference_span().max(1) as u64;
        let index = &mut indexes[read.ref_id as usize];

        let chunks = index.bins.entry(reg2bin(beg, stop)).or_default();
        match chunks.last_mut() {
            Some(last) if last.1 == start => last.1 = end,
            _ => chunks.push((start, end)),
        }

        let last_window = ((stop - 1) >> 14) as usize;
        if index.intervals.len() <= last_window {
            index.intervals.resize(last_window + 1, None);
        }
        for window in (beg >> 14) as usize..=last_window {
            index.intervals[window].get_or_insert(start);
        }
    }

    let data = writer.finish().unwrap();
    fs::write(&bam, data).unwrap();

    if with_index {
        fs::write(&bai, encode_index(&indexes, unplaced)).unwrap();
    }

    Fixture { bam, bai, _dir: dir }
}

fn encode_index(indexes: &[IndexBuilder], unplaced: u64) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(b"BAI\x01");
    buf.extend_from_slice(&(indexes.len() as i32).to_le_bytes());
    for index in indexes {
        buf.extend_from_slice(&(index.bins.len() as i32).to_le_bytes());
        for (bin, chunks) in &index.bins {
            buf.extend_from_slice(&bin.to_le_bytes());
            buf.extend_from_slice(&(chunks.len() as i32).to_le_bytes());
            for (start, end) in chunks {
                buf.extend_from_slice(&u64::from(*start).to_le_bytes());
                buf.extend_from_slice(&u64::from(*end).to_le_bytes());
            }
        }

        buf.extend_from_slice(&(index.intervals.len() as i32).to_le_bytes());
        let mut previous = 0u64;
        for interval in &index.intervals {
            let offset = interval.map_or(previous, u64::from);
            buf.extend_from_slice(&offset.to_le_bytes());
            previous = offset;
        }
    }
    buf.extend_from_slice(&unplaced.to_le_bytes());
    buf
}

/// 确定性的伪随机数（线性同余）
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub fn below(&mut self, bound: u64) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (self.0 >> 33) % bound
    }
}

/// 在两条参考序列上生成坐标排序的随机读段，包含插入、缺失、剪切、跳过与被过滤的FLAG
pub fn random_reads(seed: u64, references: &[(&str, u32)], per_reference: usize) -> Vec<TestRead> {
    let mut rng = Lcg::new(seed);
    let mut reads = Vec::new();
    let cigars = [
        "20M",
        "5S10M2I8M",
        "8M3D12M",
        "3H10M100N10M",
        "1I15M",
        "12M4I",
        "6M1D2I6M2S",
        "10=2X8M",
    ];
    let bases = b"ACGTN";

    for (ref_id, &(_, length)) in references.iter().enumerate() {
        let mut positions: Vec<i32> = (0..per_reference)
            .map(|_| rng.below(u64::from(length) - 200) as i32)
            .collect();
        positions.sort_unstable();

        for pos in positions {
            let cigar = cigars[rng.below(cigars.len() as u64) as usize];
            let ops = parse_cigar(cigar);
            let read_len: u32 = ops
                .iter()
                .filter(|(op, _)| matches!(op, 0 | 1 | 4 | 7 | 8))
                .map(|&(_, len)| len)
                .sum();
            let sequence: Vec<u8> = (0..read_len)
                .map(|_| bases[rng.below(bases.len() as u64) as usize])
                .collect();
            let qualities: Vec<u8> = (0..read_len).map(|_| rng.below(41) as u8).collect();
            let flags = match rng.below(20) {
                0 => 0x400,
                1 => 0x100,
                2 => 0x10,
                _ => 0,
            };

            let mut read = TestRead::new(ref_id as i32, pos, cigar, &sequence)
                .mapq(rng.below(61) as u8)
                .flags(flags);
            read.qualities = qualities;
            reads.push(read);
        }
    }

    reads.push(TestRead::unplaced(b"ACGT"));
    reads
}
