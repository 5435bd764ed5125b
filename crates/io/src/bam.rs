use crate::error::BamError;
use crate::header::{read_header, BamHeader};
use crate::reader::BinaryReader;
use crate::record::{decode_record, AlignmentRecord};
use noodles::bgzf::VirtualPosition;
use std::fs::File;
use std::io::{self, Read, Seek};
use std::path::Path;
use tracing::{debug, info};

/// BAM文件读取器
pub struct BamReader<R> {
    reader: BinaryReader<R>,
    header: BamHeader,
    records_read: u64,
    buf: Vec<u8>,
}

impl BamReader<File> {
    /// 从文件路径创建BAM读取器，并读取文件头
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, BamError> {
        let path = path.as_ref();
        let reader = Self::new(BinaryReader::from_path(path)?)?;
        info!(
            "已打开BAM文件: {} ({} 条参考序列)",
            path.display(),
            reader.header.references.len()
        );
        Ok(reader)
    }
}

impl<R: Read> BamReader<R> {
    pub fn new(mut reader: BinaryReader<R>) -> Result<Self, BamError> {
        let header = read_header(&mut reader)?;
        Ok(Self {
            reader,
            header,
            records_read: 0,
            buf: Vec::new(),
        })
    }

    pub fn header(&self) -> &BamHeader {
        &self.header
    }

    /// 已解码的记录数
    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    pub fn virtual_position(&self) -> VirtualPosition {
        self.reader.virtual_position()
    }

    /// 读取下一条记录到 `record`，返回消耗的字节数；流结束时返回 0
    pub fn read_record(&mut self, record: &mut AlignmentRecord) -> Result<usize, BamError> {
        let start = self.reader.virtual_position();
        let index = self.records_read;

        let mut size_buf = [0u8; 4];
        match self.reader.read_exact_or_eof(&mut size_buf) {
            Ok(false) => return Ok(0),
            Ok(true) => {}
            Err(e) => return Err(truncated(e, start, index)),
        }

        let block_size = i32::from_le_bytes(size_buf);
        let block_size = usize::try_from(block_size).map_err(|_| BamError::Format {
            offset: u64::from(start),
            record: index,
            message: format!("block_size 为负数: {}", block_size),
        })?;

        self.buf.resize(block_size, 0);
        self.reader
            .read_exact(&mut self.buf)
            .map_err(|e| truncated(e, start, index))?;

        decode_record(&self.buf, record).map_err(|e| BamError::Format {
            offset: u64::from(start),
            record: index,
            message: e.to_string(),
        })?;

        self.records_read += 1;
        Ok(block_size + 4)
    }

    /// 迭代剩余记录
    pub fn records(&mut self) -> BamRecordIterator<'_, R> {
        BamRecordIterator { reader: self }
    }
}

impl<R: Read + Seek> BamReader<R> {
    /// 定位到虚拟偏移（通常来自BAI索引的chunk起点）
    pub fn seek(&mut self, pos: VirtualPosition) -> Result<VirtualPosition, BamError> {
        self.reader.seek(pos)
    }
}

/// 记录流在中途结束属于格式错误，其它IO错误原样返回
fn truncated(e: io::Error, start: VirtualPosition, index: u64) -> BamError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        BamError::Format {
            offset: u64::from(start),
            record: index,
            message: format!("记录被截断: {}", e),
        }
    } else {
        BamError::Io(e)
    }
}

/// BAM记录迭代器
pub struct BamRecordIterator<'a, R> {
    reader: &'a mut BamReader<R>,
}

impl<R: Read> Iterator for BamRecordIterator<'_, R> {
    type Item = Result<AlignmentRecord, BamError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut record = AlignmentRecord::default();
        match self.reader.read_record(&mut record) {
            Ok(0) => None,
            Ok(_) => {
                let count = self.reader.records_read();
                if count % 1_000_000 == 0 {
                    debug!("已处理 {} 条记录", count);
                }
                Some(Ok(record))
            }
            Err(e) => Some(Err(e)),
        }
    }
}
