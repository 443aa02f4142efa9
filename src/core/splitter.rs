use crate::models::predicate::RawCondition;

/// 按顶层 AND 把 WHERE 子句切成原子条件。
///
/// 括号内、单引号字面量与双引号标识符内、以及 `BETWEEN x AND y` 中的 AND
/// 都不是切分点，因此 BETWEEN 条件算作一个原子条件，片段数比顶层 AND 数
/// 少一。顶层含 OR 的条件整体保留，交给分类器识别。
/// 空子句返回空列表，等价于 "不加过滤"。
pub fn split(where_clause: &str) -> Vec<RawCondition> {
    let clause = strip_envelope(where_clause);
    let chars: Vec<char> = clause.chars().collect();

    let mut conditions = Vec::new();
    let mut depth: usize = 0;
    let mut quote: Option<char> = None;
    let mut pending_between = false;
    let mut start = 0;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if let Some(q) = quote {
            if c == q {
                // '' 与 "" 是转义
                if chars.get(i + 1) == Some(&q) {
                    i += 2;
                    continue;
                }
                quote = None;
            }
            i += 1;
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 && is_word_at(&chars, i, "between") => {
                pending_between = true;
                i += "between".len();
                continue;
            }
            _ if depth == 0 && is_word_at(&chars, i, "and") => {
                if pending_between {
                    pending_between = false;
                } else {
                    push_fragment(&mut conditions, &chars[start..i]);
                    start = i + 3;
                }
                i += 3;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    push_fragment(&mut conditions, &chars[start..]);
    conditions
}

/// 去掉前导 WHERE 关键字与结尾分号
fn strip_envelope(clause: &str) -> &str {
    let mut s = clause.trim();
    if let Some(rest) = s.strip_suffix(';') {
        s = rest.trim_end();
    }
    if s.len() >= 5 && s.is_char_boundary(5) && s[..5].eq_ignore_ascii_case("where") {
        let rest = &s[5..];
        if rest.is_empty() || rest.starts_with(|c: char| c.is_whitespace() || c == '(') {
            s = rest.trim_start();
        }
    }
    s
}

fn push_fragment(out: &mut Vec<RawCondition>, chars: &[char]) {
    let text: String = chars.iter().collect();
    let text = text.trim();
    if !text.is_empty() {
        out.push(RawCondition::new(text));
    }
}

/// chars[i..] 是否以完整单词 `word` 开头 (大小写不敏感，前后为空白、括号、引号或边界)
fn is_word_at(chars: &[char], i: usize, word: &str) -> bool {
    let len = word.chars().count();
    if i + len > chars.len() {
        return false;
    }
    let matches = chars[i..i + len]
        .iter()
        .zip(word.chars())
        .all(|(a, b)| a.to_ascii_lowercase() == b);
    if !matches {
        return false;
    }
    let boundary = |c: Option<&char>| match c {
        None => true,
        Some(c) => c.is_whitespace() || matches!(c, '(' | ')' | '\'' | '"'),
    };
    let before = if i == 0 { None } else { chars.get(i - 1) };
    boundary(before) && boundary(chars.get(i + len))
}
