//! Hot Index - 内存热索引
//!
//! 按 voice_id 分桶、再按规范化文本索引的音频路径列表（每版本一条）。
//! 读多写少，用读写锁保护；所有临界区都很短。
//!
//! 热索引只是 DB 条目的子集视图：缺失的键按 miss 处理，落回 DB 路径

use rand::Rng;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::scorer::ScorerFn;

/// 模糊命中结果
#[derive(Debug, Clone, PartialEq)]
pub struct FuzzyMatch {
    /// 命中的缓存条目规范文本
    pub matched: String,
    pub path: String,
    pub score: u8,
}

/// 内存热索引
pub struct HotIndex {
    /// voice_id -> normalized_text -> [audio_path]（每版本一条）
    buckets: RwLock<HashMap<String, HashMap<String, Vec<String>>>>,
    variety_depth: usize,
}

impl HotIndex {
    pub fn new(variety_depth: usize) -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            variety_depth: variety_depth.max(1),
        }
    }

    /// 追加一个版本路径
    ///
    /// 去重；超过 variety_depth 时丢弃最旧的路径
    pub fn add(&self, text_normalized: &str, voice_id: &str, audio_path: &str) {
        let mut buckets = self.buckets.write().unwrap();
        let paths = buckets
            .entry(voice_id.to_string())
            .or_default()
            .entry(text_normalized.to_string())
            .or_default();

        if !paths.iter().any(|p| p == audio_path) {
            paths.push(audio_path.to_string());
            if paths.len() > self.variety_depth {
                paths.remove(0);
            }
        }
    }

    /// 移除整个 (voice, text) 桶条目（Evictor 与 Reconciler 使用）
    pub fn remove(&self, text_normalized: &str, voice_id: &str) {
        let mut buckets = self.buckets.write().unwrap();
        if let Some(bucket) = buckets.get_mut(voice_id) {
            bucket.remove(text_normalized);
        }
    }

    /// 精确命中：非空桶里等概率随机取一个版本
    pub fn exact_lookup(&self, text_normalized: &str, voice_id: &str) -> Option<String> {
        let buckets = self.buckets.read().unwrap();
        let paths = buckets.get(voice_id)?.get(text_normalized)?;
        if paths.is_empty() {
            return None;
        }
        let index = rand::thread_rng().gen_range(0..paths.len());
        Some(paths[index].clone())
    }

    /// 完整版本路径列表（变体深度自省用）
    pub fn get_paths(&self, text_normalized: &str, voice_id: &str) -> Vec<String> {
        let buckets = self.buckets.read().unwrap();
        buckets
            .get(voice_id)
            .and_then(|bucket| bucket.get(text_normalized))
            .cloned()
            .unwrap_or_default()
    }

    /// 模糊命中：只扫同音色桶的键
    ///
    /// 取分值 >= threshold 中最高的候选；同分取字典序较小的（确定性）
    pub fn fuzzy_lookup(
        &self,
        text_normalized: &str,
        voice_id: &str,
        threshold: u8,
        scorer: ScorerFn,
    ) -> Option<FuzzyMatch> {
        let buckets = self.buckets.read().unwrap();
        let bucket = buckets.get(voice_id)?;

        let mut best: Option<(u8, &String)> = None;
        for candidate in bucket.keys() {
            let score = scorer(text_normalized, candidate);
            if score < threshold {
                continue;
            }
            best = match best {
                None => Some((score, candidate)),
                Some((best_score, best_key)) => {
                    if score > best_score || (score == best_score && candidate < best_key) {
                        Some((score, candidate))
                    } else {
                        Some((best_score, best_key))
                    }
                }
            };
        }

        let (score, matched) = best?;
        let path = bucket.get(matched)?.first()?.clone();
        Some(FuzzyMatch {
            matched: matched.clone(),
            path,
            score,
        })
    }

    /// 清空（DELETE /v1/cache）
    pub fn clear(&self) {
        self.buckets.write().unwrap().clear();
    }

    /// 不同 (voice, text) 桶条目总数
    pub fn size(&self) -> usize {
        let buckets = self.buckets.read().unwrap();
        buckets.values().map(|bucket| bucket.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::scorer::resolve_scorer;

    #[test]
    fn test_add_and_exact_lookup() {
        let hot = HotIndex::new(1);
        hot.add("merhaba", "v1", "/a.mp3");

        assert_eq!(hot.exact_lookup("merhaba", "v1"), Some("/a.mp3".to_string()));
        assert_eq!(hot.exact_lookup("merhaba", "v2"), None);
        assert_eq!(hot.exact_lookup("selam", "v1"), None);
        assert_eq!(hot.size(), 1);
    }

    #[test]
    fn test_add_dedupes_paths() {
        let hot = HotIndex::new(3);
        hot.add("merhaba", "v1", "/a.mp3");
        hot.add("merhaba", "v1", "/a.mp3");
        assert_eq!(hot.get_paths("merhaba", "v1").len(), 1);
    }

    #[test]
    fn test_add_caps_at_variety_depth_dropping_oldest() {
        let hot = HotIndex::new(2);
        hot.add("merhaba", "v1", "/a.mp3");
        hot.add("merhaba", "v1", "/b.mp3");
        hot.add("merhaba", "v1", "/c.mp3");

        let paths = hot.get_paths("merhaba", "v1");
        assert_eq!(paths, vec!["/b.mp3".to_string(), "/c.mp3".to_string()]);
    }

    #[test]
    fn test_exact_lookup_picks_member_of_bucket() {
        let hot = HotIndex::new(3);
        hot.add("merhaba", "v1", "/a.mp3");
        hot.add("merhaba", "v1", "/b.mp3");
        hot.add("merhaba", "v1", "/c.mp3");

        for _ in 0..20 {
            let path = hot.exact_lookup("merhaba", "v1").unwrap();
            assert!(["/a.mp3", "/b.mp3", "/c.mp3"].contains(&path.as_str()));
        }
    }

    #[test]
    fn test_remove_drops_bucket_entry() {
        let hot = HotIndex::new(1);
        hot.add("merhaba", "v1", "/a.mp3");
        hot.remove("merhaba", "v1");
        assert_eq!(hot.exact_lookup("merhaba", "v1"), None);
        assert_eq!(hot.size(), 0);
    }

    #[test]
    fn test_fuzzy_lookup_stays_within_voice_bucket() {
        let hot = HotIndex::new(1);
        hot.add("hemen bakiyorum", "v1", "/a.mp3");

        let scorer = resolve_scorer("token_sort_ratio");
        assert!(hot.fuzzy_lookup("hemen bakiyorum", "v2", 80, scorer).is_none());

        let hit = hot.fuzzy_lookup("bakiyorum hemen", "v1", 80, scorer).unwrap();
        assert_eq!(hit.matched, "hemen bakiyorum");
        assert_eq!(hit.path, "/a.mp3");
        assert_eq!(hit.score, 100);
    }

    #[test]
    fn test_fuzzy_lookup_respects_threshold() {
        let hot = HotIndex::new(1);
        hot.add("tamamen farkli bir cumle", "v1", "/a.mp3");

        let scorer = resolve_scorer("ratio");
        assert!(hot.fuzzy_lookup("merhaba", "v1", 90, scorer).is_none());
    }

    #[test]
    fn test_fuzzy_tie_breaks_lexicographically() {
        let hot = HotIndex::new(1);
        hot.add("bb", "v1", "/bb.mp3");
        hot.add("aa", "v1", "/aa.mp3");

        // 与两个候选都零重合，分值同为 0；阈值 0 时应取字典序较小的
        let scorer = resolve_scorer("ratio");
        let hit = hot.fuzzy_lookup("zz", "v1", 0, scorer).unwrap();
        assert_eq!(hit.matched, "aa");
    }

    #[test]
    fn test_clear() {
        let hot = HotIndex::new(1);
        hot.add("a", "v1", "/a.mp3");
        hot.add("b", "v2", "/b.mp3");
        assert_eq!(hot.size(), 2);
        hot.clear();
        assert_eq!(hot.size(), 0);
    }
}
