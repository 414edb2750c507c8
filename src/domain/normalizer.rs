//! Text Normalizer - 缓存键文本规范化
//!
//! 将用户输入折叠为规范形式，使大小写、标点、空白与数字差异
//! 不产生重复的缓存条目。对固定配置幂等：
//! `normalize(normalize(x)) == normalize(x)`

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

/// 数字占位符。保留在标点清理之外，保证二次规范化结果稳定
pub const NUMBER_PLACEHOLDER: char = '#';

/// MiniMax TTS 停顿标记，如 `<#0.5#>`
static MINIMAX_PAUSE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<#[\d.]+#>").unwrap());

/// MiniMax TTS 语气标签，如 `(laugh)`
static MINIMAX_INTERJECTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\([a-z_]+\)").unwrap());

/// 规范化阶段开关，全部默认开启
#[derive(Debug, Clone, Deserialize)]
pub struct NormalizeConfig {
    #[serde(default = "default_true")]
    pub lowercase: bool,

    #[serde(default = "default_true")]
    pub strip_punctuation: bool,

    #[serde(default = "default_true")]
    pub collapse_whitespace: bool,

    #[serde(default = "default_true")]
    pub replace_numbers: bool,

    #[serde(default = "default_true")]
    pub strip_minimax: bool,
}

fn default_true() -> bool {
    true
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            lowercase: true,
            strip_punctuation: true,
            collapse_whitespace: true,
            replace_numbers: true,
            strip_minimax: true,
        }
    }
}

/// 土耳其语感知小写转换
///
/// Unicode 默认规则会把 `I` 映射为 `i`，土耳其语里 `I` 的小写是 `ı`
pub fn turkish_lower(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            'I' => out.push('ı'),
            'İ' => out.push('i'),
            _ => out.extend(c.to_lowercase()),
        }
    }
    out
}

/// 枚举变音符号折叠表：çğıöşü -> cgiosu
fn fold_diacritics(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'ç' => 'c',
            'ğ' => 'g',
            'ı' => 'i',
            'ö' => 'o',
            'ş' => 's',
            'ü' => 'u',
            _ => c,
        })
        .collect()
}

/// 数字串替换为占位符，"3" 与 "42" 折叠到同一个键
fn replace_digit_runs(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_run = false;
    for c in text.chars() {
        if c.is_ascii_digit() {
            if !in_run {
                out.push(NUMBER_PLACEHOLDER);
                in_run = true;
            }
        } else {
            in_run = false;
            out.push(c);
        }
    }
    out
}

/// 完整规范化管线
///
/// 阶段顺序固定：MiniMax 标记最先剥离（避免后续阶段吃掉半截标记），
/// 标点清理先于空白折叠（清理产生的多余空格会被折叠掉）
pub fn normalize(text: &str, config: &NormalizeConfig) -> String {
    let mut text = text.trim().to_string();
    if text.is_empty() {
        return String::new();
    }

    if config.strip_minimax {
        text = MINIMAX_PAUSE_RE.replace_all(&text, "").into_owned();
        text = MINIMAX_INTERJECTION_RE.replace_all(&text, "").into_owned();
    }

    if config.lowercase {
        text = fold_diacritics(&turkish_lower(&text));
    }

    if config.strip_punctuation {
        text.retain(|c| {
            c.is_alphanumeric() || c.is_whitespace() || c == '_' || c == NUMBER_PLACEHOLDER
        });
    }

    if config.collapse_whitespace {
        text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    }

    if config.replace_numbers {
        text = replace_digit_runs(&text);
    }

    text.trim().to_string()
}
