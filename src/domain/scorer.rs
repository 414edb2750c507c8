//! Fuzzy Scorer Registry - 模糊打分器注册表
//!
//! 按名称解析 rapidfuzz 打分函数，返回 0..100 的整数分值

use rapidfuzz::fuzz;

/// 打分函数：(输入规范文本, 候选规范文本) -> 0..100
pub type ScorerFn = fn(&str, &str) -> u8;

/// 按名称解析打分器，未知名称回落到 token_sort_ratio
pub fn resolve_scorer(name: &str) -> ScorerFn {
    match name {
        "ratio" => ratio,
        "partial_ratio" => partial_ratio,
        "token_set_ratio" => token_set_ratio,
        _ => token_sort_ratio,
    }
}

fn ratio(a: &str, b: &str) -> u8 {
    fuzz::ratio(a.chars(), b.chars()).round() as u8
}

fn partial_ratio(a: &str, b: &str) -> u8 {
    fuzz::partial_ratio(a.chars(), b.chars()).round() as u8
}

fn token_sort_ratio(a: &str, b: &str) -> u8 {
    fuzz::token_sort_ratio(a.chars(), b.chars()).round() as u8
}

fn token_set_ratio(a: &str, b: &str) -> u8 {
    fuzz::token_set_ratio(a.chars(), b.chars()).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_scores_100() {
        for name in ["ratio", "partial_ratio", "token_sort_ratio", "token_set_ratio"] {
            let scorer = resolve_scorer(name);
            assert_eq!(scorer("hemen bakiyorum", "hemen bakiyorum"), 100);
        }
    }

    #[test]
    fn test_disjoint_scores_low() {
        let scorer = resolve_scorer("ratio");
        assert!(scorer("abc", "xyz") < 50);
    }

    #[test]
    fn test_token_sort_ignores_word_order() {
        let scorer = resolve_scorer("token_sort_ratio");
        assert_eq!(scorer("kaynak buldum", "buldum kaynak"), 100);
    }

    #[test]
    fn test_unknown_name_falls_back() {
        let scorer = resolve_scorer("no_such_scorer");
        assert_eq!(scorer("a b", "b a"), 100);
    }
}
