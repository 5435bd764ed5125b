//! BAM 文件头: 魔数、SAM 文本头和参考序列字典

use crate::error::BamError;
use crate::reader::BinaryReader;
use std::io::Read;

const BAM_MAGIC: &[u8; 4] = b"BAM\x01";

/// 参考序列（名称与长度）
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReferenceSequence {
    pub name: String,
    pub length: u32,
}

/// BAM文件头
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BamHeader {
    /// 原始SAM文本头（@HD/@SQ/@PG 等行）
    pub text: String,
    /// 参考序列，下标即记录中的 ref_id
    pub references: Vec<ReferenceSequence>,
}

impl BamHeader {
    /// 按名称查找参考序列ID
    pub fn reference_id(&self, name: &str) -> Option<usize> {
        self.references.iter().position(|r| r.name == name)
    }

    pub fn reference(&self, id: usize) -> Option<&ReferenceSequence> {
        self.references.get(id)
    }

    pub fn reference_names(&self) -> Vec<String> {
        self.references.iter().map(|r| r.name.clone()).collect()
    }
}

/// 从解压流开头读取BAM文件头，读取后流位于第一条记录处
pub fn read_header<R: Read>(reader: &mut BinaryReader<R>) -> Result<BamHeader, BamError> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != BAM_MAGIC {
        return Err(BamError::Header(format!(
            "魔数错误: 期望 {:?}, 实际 {:?}",
            BAM_MAGIC, magic
        )));
    }

    let l_text = read_length(reader, "l_text")?;
    let mut text = vec![0u8; l_text];
    reader.read_exact(&mut text)?;
    // 文本头允许以NUL填充
    while text.last() == Some(&0) {
        text.pop();
    }
    let text = String::from_utf8(text)
        .map_err(|e| BamError::Header(format!("SAM文本头不是合法UTF-8: {}", e)))?;

    let n_ref = read_length(reader, "n_ref")?;
    let mut references = Vec::with_capacity(n_ref);

    for _ in 0..n_ref {
        let l_name = read_length(reader, "l_name")?;
        let mut name = vec![0u8; l_name];
        reader.read_exact(&mut name)?;
        if name.pop() != Some(0) {
            return Err(BamError::Header("参考序列名缺少结尾NUL".to_string()));
        }
        let name = String::from_utf8(name)
            .map_err(|e| BamError::Header(format!("参考序列名不是合法UTF-8: {}", e)))?;

        let length = reader.read_i32()?;
        let length = u32::try_from(length)
            .map_err(|_| {
                BamError::Header(format!("参考序列 {} 长度非法: {}", name, length))
            })?;

        references.push(ReferenceSequence { name, length });
    }

    Ok(BamHeader { text, references })
}

fn read_length<R: Read>(reader: &mut BinaryReader<R>, field: &str) -> Result<usize, BamError> {
    let value = reader.read_i32()?;
    usize::try_from(value).map_err(|_| BamError::Header(format!("{} 为负数: {}", field, value)))
}
