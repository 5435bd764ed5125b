//! 逐位置统计：覆盖度、各类别百分比、归一化香农熵与次级熵

use crate::pileup::CountVector;

/// 香农熵（以 2 为底）。`normalised` 时除以 log2(类别数)，结果落在 [0, 1]
pub fn entropy(probabilities: &[f64], normalised: bool) -> f64 {
    let value: f64 = probabilities
        .iter()
        .filter(|&&p| p > 0.0)
        .map(|&p| -p * p.log2())
        .sum();

    if normalised && probabilities.len() > 1 {
        value / (probabilities.len() as f64).log2()
    } else {
        value
    }
}

fn probabilities(counts: &[u64]) -> Vec<f64> {
    let total: u64 = counts.iter().sum();
    counts
        .iter()
        .map(|&c| if total > 0 { c as f64 / total as f64 } else { 0.0 })
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PositionStats {
    pub coverage: u64,
    /// 与 [`crate::pileup::Base::ALL`] 同序
    pub percentages: [f64; 6],
    pub entropy: f64,
    /// 去掉计数最多的类别（并列时取靠前者）后剩余类别的熵
    pub secondary_entropy: f64,
}

pub fn position_stats(counts: &CountVector) -> PositionStats {
    let counts = counts.counts();
    let probs = probabilities(counts);

    let mut percentages = [0.0; 6];
    for (pc, p) in percentages.iter_mut().zip(&probs) {
        *pc = 100.0 * p;
    }

    let mut modal = 0;
    for (i, &c) in counts.iter().enumerate() {
        if c > counts[modal] {
            modal = i;
        }
    }
    let secondary: Vec<u64> = counts
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != modal)
        .map(|(_, &c)| c)
        .collect();

    PositionStats {
        coverage: counts.iter().sum(),
        percentages,
        entropy: entropy(&probs, true),
        secondary_entropy: entropy(&probabilities(&secondary), true),
    }
}
