//! BAM 比对记录解码
//!
//! ```text
//! block_size (int32)   不含自身的记录长度
//! refID      (int32)   参考序列ID, -1 表示未比对
//! pos        (int32)   0-based 最左比对位置, -1 表示未比对
//! l_read_name(uint8)   读名长度（含结尾NUL）
//! mapq       (uint8)   比对质量, 255 表示不可用
//! bin        (uint16)  BAI bin
//! n_cigar_op (uint16)
//! flag       (uint16)
//! l_seq      (int32)
//! next_refID (int32)
//! next_pos   (int32)
//! tlen       (int32)
//! read_name  char[l_read_name]
//! cigar      uint32[n_cigar_op]   高28位长度, 低4位操作码
//! seq        uint8[(l_seq+1)/2]   4-bit 编码, 高半字节在前
//! qual       char[l_seq]          Phred 值 (不加33), 缺失时全为 0xFF
//! tags       ...
//! ```

use crate::error::DecodeError;
use noodles::sam::alignment::record::cigar::{op::Kind, Op};
use noodles::sam::alignment::record::Flags;

/// 比对质量不可用的标记值
pub const MAPQ_UNAVAILABLE: u8 = 255;

/// 碱基质量缺失的标记值
pub const QUAL_MISSING: u8 = 0xFF;

/// 4-bit 编码到碱基字符
const SEQ_LOOKUP: [u8; 16] = *b"=ACMGRSVTWYHKDBN";

/// CIGAR 操作码 0-8 对应 `MIDNSHP=X`
const CIGAR_KINDS: [Kind; 9] = [
    Kind::Match,
    Kind::Insertion,
    Kind::Deletion,
    Kind::Skip,
    Kind::SoftClip,
    Kind::HardClip,
    Kind::Pad,
    Kind::SequenceMatch,
    Kind::SequenceMismatch,
];

const FIXED_FIELDS_LEN: usize = 32;

/// 一条解码后的比对记录
#[derive(Clone, Debug)]
pub struct AlignmentRecord {
    pub ref_id: Option<usize>,
    /// 0-based 最左比对位置
    pub pos: Option<u32>,
    pub mapping_quality: u8,
    pub bin: u16,
    pub flags: Flags,
    pub mate_ref_id: Option<usize>,
    pub mate_pos: Option<u32>,
    pub template_length: i32,
    pub name: Vec<u8>,
    pub cigar: Vec<Op>,
    /// 碱基字符 (A/C/G/T/N 及 IUPAC 码)
    pub sequence: Vec<u8>,
    /// 与 `sequence` 一一对应的 Phred 质量
    pub base_qualities: Vec<u8>,
}

impl Default for AlignmentRecord {
    fn default() -> Self {
        Self {
            ref_id: None,
            pos: None,
            mapping_quality: MAPQ_UNAVAILABLE,
            bin: 0,
            flags: Flags::empty(),
            mate_ref_id: None,
            mate_pos: None,
            template_length: 0,
            name: Vec::new(),
            cigar: Vec::new(),
            sequence: Vec::new(),
            base_qualities: Vec::new(),
        }
    }
}

impl AlignmentRecord {
    /// 比对质量，255 时返回 None
    pub fn mapping_quality(&self) -> Option<u8> {
        if self.mapping_quality == MAPQ_UNAVAILABLE {
            None
        } else {
            Some(self.mapping_quality)
        }
    }

    /// CIGAR 在参考序列上覆盖的长度
    pub fn reference_span(&self) -> usize {
        self.cigar
            .iter()
            .filter(|op| consumes_reference(op.kind()))
            .map(|op| op.len())
            .sum()
    }

    /// 0-based 半开区间 `[start, end)`。没有消耗参考的操作时按 1bp 处理。
    pub fn reference_interval(&self) -> Option<(u64, u64)> {
        let start = u64::from(self.pos?);
        let span = self.reference_span().max(1) as u64;
        Some((start, start + span))
    }
}

pub fn consumes_reference(kind: Kind) -> bool {
    matches!(
        kind,
        Kind::Match | Kind::Deletion | Kind::Skip | Kind::SequenceMatch | Kind::SequenceMismatch
    )
}

pub fn consumes_read(kind: Kind) -> bool {
    matches!(
        kind,
        Kind::Match
            | Kind::Insertion
            | Kind::SoftClip
            | Kind::SequenceMatch
            | Kind::SequenceMismatch
    )
}

/// 把 BAM 的 CIGAR 操作码映射为操作类型
pub fn cigar_kind(code: u8) -> Option<Kind> {
    CIGAR_KINDS.get(usize::from(code)).copied()
}

/// 从 `block_size` 之后的记录字节解码到 `record`（复用其缓冲区）
pub fn decode_record(data: &[u8], record: &mut AlignmentRecord) -> Result<(), DecodeError> {
    if data.len() < FIXED_FIELDS_LEN {
        return Err(DecodeError::BlockTooShort(data.len()));
    }

    let mut src = Fields { data, cursor: 0 };

    record.ref_id = reference_id(src.i32()?)?;
    record.pos = position(src.i32()?)?;
    let l_read_name = usize::from(src.u8()?);
    record.mapping_quality = src.u8()?;
    record.bin = src.u16()?;
    let n_cigar_op = usize::from(src.u16()?);
    record.flags = Flags::from(src.u16()?);
    let l_seq = src.i32()?;
    let l_seq = usize::try_from(l_seq).map_err(|_| DecodeError::InvalidSequenceLength(l_seq))?;
    record.mate_ref_id = reference_id(src.i32()?)?;
    record.mate_pos = position(src.i32()?)?;
    record.template_length = src.i32()?;

    if l_read_name == 0 {
        return Err(DecodeError::EmptyReadName);
    }
    let name = src.take("read_name", l_read_name)?;
    record.name.clear();
    record.name.extend_from_slice(&name[..name.len() - 1]);

    record.cigar.clear();
    let raw_cigar = src.take("cigar", n_cigar_op * 4)?;
    for chunk in raw_cigar.chunks_exact(4) {
        let value = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        let code = (value & 0xF) as u8;
        let kind = cigar_kind(code).ok_or(DecodeError::InvalidCigarOp(code))?;
        record.cigar.push(Op::new(kind, (value >> 4) as usize));
    }

    let packed = src.take("seq", l_seq.div_ceil(2))?;
    record.sequence.clear();
    record.sequence.extend(
        packed
            .iter()
            .flat_map(|&b| [SEQ_LOOKUP[usize::from(b >> 4)], SEQ_LOOKUP[usize::from(b & 0xF)]])
            .take(l_seq),
    );

    let quals = src.take("qual", l_seq)?;
    record.base_qualities.clear();
    record.base_qualities.extend_from_slice(quals);

    // 超过 65535 个操作的CIGAR以 `<l_seq>S<ref_len>N` 占位，真实CIGAR存于 CG:B,I 标签
    if is_cigar_placeholder(&record.cigar, l_seq) {
        if let Some(raw) = find_cg_tag(src.rest())? {
            record.cigar.clear();
            for value in raw {
                let code = (value & 0xF) as u8;
                let kind = cigar_kind(code).ok_or(DecodeError::InvalidCigarOp(code))?;
                record.cigar.push(Op::new(kind, (value >> 4) as usize));
            }
        }
    }

    // 没有CIGAR（`*`）的记录不校验
    if l_seq > 0 && !record.cigar.is_empty() {
        let consumed: usize = record
            .cigar
            .iter()
            .filter(|op| consumes_read(op.kind()))
            .map(|op| op.len())
            .sum();
        if consumed != l_seq {
            return Err(DecodeError::CigarSequenceMismatch {
                cigar: consumed,
                sequence: l_seq,
            });
        }
    }

    Ok(())
}

fn is_cigar_placeholder(cigar: &[Op], l_seq: usize) -> bool {
    matches!(
        cigar,
        [clip, skip] if clip.kind() == Kind::SoftClip
            && clip.len() == l_seq
            && skip.kind() == Kind::Skip
    )
}

/// 在标签区查找 `CG:B,I`，返回其中的原始CIGAR值
fn find_cg_tag(tags: &[u8]) -> Result<Option<Vec<u32>>, DecodeError> {
    let mut src = Fields {
        data: tags,
        cursor: 0,
    };
    while src.remaining() > 0 {
        let name = src.take("tag", 2)?;
        let ty = src.u8()?;
        match ty {
            b'A' | b'c' | b'C' => {
                src.take("tag", 1)?;
            }
            b's' | b'S' => {
                src.take("tag", 2)?;
            }
            b'i' | b'I' | b'f' => {
                src.take("tag", 4)?;
            }
            b'Z' | b'H' => {
                let rest = src.rest();
                let end = rest
                    .iter()
                    .position(|&b| b == 0)
                    .ok_or(DecodeError::Truncated {
                        field: "tag",
                        needed: rest.len() + 1,
                        available: rest.len(),
                    })?;
                src.take("tag", end + 1)?;
            }
            b'B' => {
                let subtype = src.u8()?;
                let count = src.i32()?;
                let count = usize::try_from(count).map_err(|_| DecodeError::InvalidTag(ty))?;
                let width = match subtype {
                    b'c' | b'C' => 1,
                    b's' | b'S' => 2,
                    b'i' | b'I' | b'f' => 4,
                    other => return Err(DecodeError::InvalidTag(other)),
                };
                let values = src.take("tag", count * width)?;
                if name == b"CG" && matches!(subtype, b'i' | b'I') {
                    let cigar = values
                        .chunks_exact(4)
                        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                        .collect();
                    return Ok(Some(cigar));
                }
            }
            other => return Err(DecodeError::InvalidTag(other)),
        }
    }
    Ok(None)
}

fn reference_id(value: i32) -> Result<Option<usize>, DecodeError> {
    match value {
        -1 => Ok(None),
        n if n >= 0 => Ok(Some(n as usize)),
        n => Err(DecodeError::InvalidReferenceId(n)),
    }
}

fn position(value: i32) -> Result<Option<u32>, DecodeError> {
    match value {
        -1 => Ok(None),
        n if n >= 0 => Ok(Some(n as u32)),
        n => Err(DecodeError::InvalidPosition(n)),
    }
}

/// 带越界检查的小端字段游标
struct Fields<'a> {
    data: &'a [u8],
    cursor: usize,
}

impl<'a> Fields<'a> {
    fn take(&mut self, field: &'static str, len: usize) -> Result<&'a [u8], DecodeError> {
        let available = self.data.len() - self.cursor;
        if len > available {
            return Err(DecodeError::Truncated {
                field,
                needed: len,
                available,
            });
        }
        let bytes = &self.data[self.cursor..self.cursor + len];
        self.cursor += len;
        Ok(bytes)
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.cursor
    }

    fn rest(&self) -> &'a [u8] {
        &self.data[self.cursor..]
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take("u8", 1)?[0])
    }

    fn u16(&mut self) -> Result<u16, DecodeError> {
        let b = self.take("u16", 2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn i32(&mut self) -> Result<i32, DecodeError> {
        let b = self.take("i32", 4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

/// 测试用编码器：按BAM格式编码一条记录（不含 block_size）
#[cfg(test)]
pub(crate) fn encode_record(
    ref_id: i32,
    pos: i32,
    mapq: u8,
    flags: u16,
    cigar: &[(u8, u32)],
    sequence: &[u8],
    quals: &[u8],
) -> Vec<u8> {
    let code = |base: u8| SEQ_LOOKUP.iter().position(|&b| b == base).unwrap() as u8;
    let name = b"read1\0";

    let mut raw = Vec::new();
    raw.extend_from_slice(&ref_id.to_le_bytes());
    raw.extend_from_slice(&pos.to_le_bytes());
    raw.push(name.len() as u8);
    raw.push(mapq);
    raw.extend_from_slice(&4680u16.to_le_bytes());
    raw.extend_from_slice(&(cigar.len() as u16).to_le_bytes());
    raw.extend_from_slice(&flags.to_le_bytes());
    raw.extend_from_slice(&(sequence.len() as i32).to_le_bytes());
    raw.extend_from_slice(&(-1i32).to_le_bytes());
    raw.extend_from_slice(&(-1i32).to_le_bytes());
    raw.extend_from_slice(&0i32.to_le_bytes());
    raw.extend_from_slice(name);
    for &(op, len) in cigar {
        raw.extend_from_slice(&((len << 4) | u32::from(op)).to_le_bytes());
    }
    for pair in sequence.chunks(2) {
        let hi = code(pair[0]) << 4;
        let lo = pair.get(1).map(|&b| code(b)).unwrap_or(0);
        raw.push(hi | lo);
    }
    raw.extend_from_slice(quals);
    raw
}
