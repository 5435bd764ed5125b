//! CIGAR 遍历
//!
//! 把一条比对记录展开为逐碱基事件：比对到参考的碱基、插入碱基、缺失。
//! 参考跳过（`N`）、软剪切、硬剪切与填充只推进游标，不产生事件。

use maptide_io::record::{consumes_read, consumes_reference};
use noodles::sam::alignment::record::cigar::{op::Kind, Op};

/// CIGAR 遍历产生的事件，`ref_pos` 为 1-based 参考坐标
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CigarEvent {
    /// 读段第 `read_pos` 个碱基比对在 `ref_pos`
    Aligned { ref_pos: i64, read_pos: usize },
    /// 读段第 `read_pos` 个碱基是 `ref_pos` 之后的第 `offset` 个插入碱基
    Inserted {
        ref_pos: i64,
        offset: u32,
        read_pos: usize,
    },
    /// 参考位置 `ref_pos` 在读段上缺失
    Deleted { ref_pos: i64 },
}

/// 逐碱基展开 CIGAR 的状态机
///
/// 参考游标从 `pos0 + 1` 开始；插入偏移只有在参考游标移动时才清零，
/// 因此被软剪切等操作隔开的两段插入仍然连续编号。
pub struct CigarWalker<'a> {
    ops: std::slice::Iter<'a, Op>,
    kind: Kind,
    remaining: usize,
    ref_cursor: i64,
    read_cursor: usize,
    insertion_offset: u32,
}

impl<'a> CigarWalker<'a> {
    pub fn new(cigar: &'a [Op], pos0: u32) -> Self {
        Self {
            ops: cigar.iter(),
            kind: Kind::Match,
            remaining: 0,
            ref_cursor: i64::from(pos0) + 1,
            read_cursor: 0,
            insertion_offset: 0,
        }
    }

    fn advance_reference(&mut self, len: usize) {
        if len > 0 {
            self.ref_cursor += len as i64;
            self.insertion_offset = 0;
        }
    }
}

impl Iterator for CigarWalker<'_> {
    type Item = CigarEvent;

    fn next(&mut self) -> Option<CigarEvent> {
        loop {
            if self.remaining == 0 {
                let op = self.ops.next()?;
                match op.kind() {
                    Kind::Match
                    | Kind::SequenceMatch
                    | Kind::SequenceMismatch
                    | Kind::Insertion
                    | Kind::Deletion => {
                        self.kind = op.kind();
                        self.remaining = op.len();
                    }
                    kind => {
                        // 不产生事件的操作一次性推进
                        if consumes_reference(kind) {
                            self.advance_reference(op.len());
                        }
                        if consumes_read(kind) {
                            self.read_cursor += op.len();
                        }
                    }
                }
                continue;
            }

            self.remaining -= 1;
            let event = match self.kind {
                Kind::Insertion => {
                    self.insertion_offset += 1;
                    let event = CigarEvent::Inserted {
                        ref_pos: self.ref_cursor - 1,
                        offset: self.insertion_offset,
                        read_pos: self.read_cursor,
                    };
                    self.read_cursor += 1;
                    event
                }
                Kind::Deletion => {
                    let event = CigarEvent::Deleted {
                        ref_pos: self.ref_cursor,
                    };
                    self.advance_reference(1);
                    event
                }
                _ => {
                    let event = CigarEvent::Aligned {
                        ref_pos: self.ref_cursor,
                        read_pos: self.read_cursor,
                    };
                    self.advance_reference(1);
                    self.read_cursor += 1;
                    event
                }
            };
            return Some(event);
        }
    }
}
