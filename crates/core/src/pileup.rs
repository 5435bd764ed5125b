//! 稀疏的逐位置碱基计数表

use std::collections::HashMap;
use std::fmt;
use std::ops::{Index, IndexMut};

/// 碱基类别。顺序固定为 A, C, G, T, 缺失, N，输出列顺序依赖于此
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Base {
    A,
    C,
    G,
    T,
    Deletion,
    N,
}

impl Base {
    pub const ALL: [Base; 6] = [Base::A, Base::C, Base::G, Base::T, Base::Deletion, Base::N];

    pub fn index(self) -> usize {
        self as usize
    }

    /// 读段中的碱基字符到类别。`=` 与 IUPAC 兼并碱基都归为 N
    pub fn from_symbol(symbol: u8) -> Self {
        match symbol {
            b'A' | b'a' => Base::A,
            b'C' | b'c' => Base::C,
            b'G' | b'g' => Base::G,
            b'T' | b't' => Base::T,
            _ => Base::N,
        }
    }

    /// 输出列名
    pub fn label(self) -> &'static str {
        match self {
            Base::A => "a",
            Base::C => "c",
            Base::G => "g",
            Base::T => "t",
            Base::Deletion => "ds",
            Base::N => "n",
        }
    }
}

impl fmt::Display for Base {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// 一个位置上各碱基类别的计数
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct CountVector(pub [u64; 6]);

impl CountVector {
    pub fn increment(&mut self, base: Base) {
        self.0[base.index()] += 1;
    }

    /// 覆盖度（所有类别之和，含缺失）
    pub fn coverage(&self) -> u64 {
        self.0.iter().sum()
    }

    pub fn counts(&self) -> &[u64; 6] {
        &self.0
    }

    fn add(&mut self, other: &CountVector) {
        for (a, b) in self.0.iter_mut().zip(other.0.iter()) {
            *a += b;
        }
    }
}

impl Index<Base> for CountVector {
    type Output = u64;

    fn index(&self, base: Base) -> &u64 {
        &self.0[base.index()]
    }
}

impl IndexMut<Base> for CountVector {
    fn index_mut(&mut self, base: Base) -> &mut u64 {
        &mut self.0[base.index()]
    }
}

/// 表中的坐标：1-based 参考位置，加上插入偏移（0 为参考碱基本身，
/// k > 0 为紧随该位置之后的第 k 个插入碱基）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PileupKey {
    pub position: i64,
    pub insertion: u32,
}

impl PileupKey {
    pub fn new(position: i64, insertion: u32) -> Self {
        Self {
            position,
            insertion,
        }
    }
}

/// 参考序列名 → (坐标 → 计数)
///
/// 只有至少被一个碱基计入的坐标才有条目。内部按 BAM 头中的参考序列顺序存放，
/// 各序列内部不保证顺序，读取时用 [`PileupTable::sorted`] 排序。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PileupTable {
    references: Vec<String>,
    counts: Vec<HashMap<PileupKey, CountVector>>,
}

impl PileupTable {
    pub fn new(references: Vec<String>) -> Self {
        let counts = vec![HashMap::new(); references.len()];
        Self { references, counts }
    }

    pub(crate) fn increment(&mut self, ref_id: usize, key: PileupKey, base: Base) {
        self.counts[ref_id].entry(key).or_default().increment(base);
    }

    /// 参考序列名（BAM头顺序）
    pub fn references(&self) -> &[String] {
        &self.references
    }

    pub fn chrom(&self, name: &str) -> Option<&HashMap<PileupKey, CountVector>> {
        let id = self.references.iter().position(|r| r == name)?;
        self.counts.get(id)
    }

    pub fn get(&self, chrom: &str, key: PileupKey) -> Option<&CountVector> {
        self.chrom(chrom)?.get(&key)
    }

    /// 全表条目数
    pub fn len(&self) -> usize {
        self.counts.iter().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.iter().all(HashMap::is_empty)
    }

    /// 某条参考序列的条目，按 `(position, insertion)` 升序
    pub fn sorted(&self, chrom: &str) -> Vec<(PileupKey, CountVector)> {
        let mut entries: Vec<_> = self
            .chrom(chrom)
            .map(|m| m.iter().map(|(k, v)| (*k, *v)).collect())
            .unwrap_or_default();
        entries.sort_unstable_by_key(|(k, _)| *k);
        entries
    }

    /// 全表按参考序列顺序、再按坐标升序迭代
    pub fn rows(&self) -> impl Iterator<Item = (&str, PileupKey, CountVector)> + '_ {
        self.references.iter().flat_map(move |name| {
            self.sorted(name)
                .into_iter()
                .map(move |(key, counts)| (name.as_str(), key, counts))
        })
    }

    /// 把另一张表的计数累加进来。两张表必须来自同一个BAM头
    pub fn merge(&mut self, other: PileupTable) {
        for (ref_id, entries) in other.counts.into_iter().enumerate() {
            if ref_id >= self.counts.len() {
                self.references.push(other.references[ref_id].clone());
                self.counts.push(HashMap::new());
            }
            for (key, counts) in entries {
                self.counts[ref_id].entry(key).or_default().add(&counts);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_order_is_stable() {
        let labels: Vec<_> = Base::ALL.iter().map(|b| b.label()).collect();
        assert_eq!(labels, vec!["a", "c", "g", "t", "ds", "n"]);
        assert_eq!(Base::from_symbol(b'g'), Base::G);
        assert_eq!(Base::from_symbol(b'='), Base::N);
        assert_eq!(Base::from_symbol(b'R'), Base::N);
    }

    #[test]
    fn test_table_is_sparse() {
        let mut table = PileupTable::new(vec!["chr1".to_string(), "chr2".to_string()]);
        assert!(table.is_empty());

        table.increment(1, PileupKey::new(10, 0), Base::A);
        table.increment(1, PileupKey::new(10, 0), Base::A);
        table.increment(1, PileupKey::new(9, 2), Base::T);

        assert_eq!(table.len(), 2);
        assert!(table.chrom("chr1").unwrap().is_empty());
        assert_eq!(table.get("chr2", PileupKey::new(10, 0)).unwrap()[Base::A], 2);
        assert_eq!(table.get("chr2", PileupKey::new(11, 0)), None);
        assert_eq!(table.chrom("chr3"), None);
    }

    #[test]
    fn test_sorted_rows() {
        let mut table = PileupTable::new(vec!["chr1".to_string(), "chr2".to_string()]);
        table.increment(1, PileupKey::new(5, 0), Base::C);
        table.increment(0, PileupKey::new(7, 1), Base::G);
        table.increment(0, PileupKey::new(7, 0), Base::Deletion);
        table.increment(0, PileupKey::new(3, 0), Base::N);

        let keys: Vec<_> = table
            .rows()
            .map(|(c, k, _)| (c.to_string(), k.position, k.insertion))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("chr1".to_string(), 3, 0),
                ("chr1".to_string(), 7, 0),
                ("chr1".to_string(), 7, 1),
                ("chr2".to_string(), 5, 0),
            ]
        );
    }

    #[test]
    fn test_merge_adds_counts() {
        let refs = vec!["chr1".to_string()];
        let mut left = PileupTable::new(refs.clone());
        left.increment(0, PileupKey::new(1, 0), Base::A);
        let mut right = PileupTable::new(refs);
        right.increment(0, PileupKey::new(1, 0), Base::A);
        right.increment(0, PileupKey::new(2, 0), Base::C);

        left.merge(right);
        assert_eq!(left.get("chr1", PileupKey::new(1, 0)).unwrap().0, [2, 0, 0, 0, 0, 0]);
        assert_eq!(left.get("chr1", PileupKey::new(2, 0)).unwrap().coverage(), 1);
    }
}
