//! BGZF 随机访问字节流
//!
//! 在 noodles 的 BGZF 解压读取器之上提供按虚拟偏移定位和小端整数读取。
//! 虚拟偏移 = (压缩块在文件中的偏移 << 16) | 块内解压后偏移。

use crate::error::BamError;
use noodles::bgzf::{self, io::Seek as _, VirtualPosition};
use std::fs::File;
use std::io::{self, Read, Seek};
use std::path::Path;
use tracing::debug;

/// 可定位的解压字节流。文件句柄随读取器一起释放。
pub struct BinaryReader<R> {
    inner: bgzf::io::Reader<R>,
}

impl BinaryReader<File> {
    /// 打开BGZF压缩文件
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, BamError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| BamError::open(path, e))?;
        debug!("已打开BGZF文件: {}", path.display());
        Ok(Self::new(file))
    }
}

impl<R: Read> BinaryReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: bgzf::io::Reader::new(inner),
        }
    }

    /// 下一个待读取字节的虚拟偏移
    pub fn virtual_position(&self) -> VirtualPosition {
        self.inner.virtual_position()
    }

    /// 读满 `buf`，解压流在中途结束时返回 `UnexpectedEof`
    pub fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        if self.read_exact_or_eof(buf)? || buf.is_empty() {
            Ok(())
        } else {
            Err(io::Error::new(io::ErrorKind::UnexpectedEof, "数据流已结束"))
        }
    }

    /// 读满 `buf`。流在读取第一个字节之前结束时返回 `Ok(false)`，
    /// 读到一半结束视为截断。
    pub fn read_exact_or_eof(&mut self, buf: &mut [u8]) -> io::Result<bool> {
        let mut filled = 0;

        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(block_error(e)),
            }
        }

        if filled == 0 {
            Ok(false)
        } else if filled == buf.len() {
            Ok(true)
        } else {
            Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("数据被截断: 需要 {} 字节, 只读到 {} 字节", buf.len(), filled),
            ))
        }
    }

    pub fn read_u8(&mut self) -> io::Result<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    pub fn read_i32(&mut self) -> io::Result<i32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(i32::from_le_bytes(buf))
    }

    pub fn read_u32(&mut self) -> io::Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }
}

impl<R: Read + Seek> BinaryReader<R> {
    /// 定位到虚拟偏移，之后的读取从该位置的解压数据开始
    pub fn seek(&mut self, pos: VirtualPosition) -> Result<VirtualPosition, BamError> {
        Ok(self.inner.seek_to_virtual_position(pos)?)
    }
}

/// BGZF层的错误（压缩块被截断、校验和不符等）。
///
/// 块内被截断也会以 `UnexpectedEof` 报出，这里改为 `InvalidData`，
/// 与"解压后的数据流在记录中途结束"区分开。
fn block_error(e: io::Error) -> io::Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        io::Error::new(io::ErrorKind::InvalidData, format!("BGZF压缩块被截断: {}", e))
    } else {
        e
    }
}
