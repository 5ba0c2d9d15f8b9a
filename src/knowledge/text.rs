//! 텍스트 유틸리티
//!
//! 정규화, 토큰화, 문장 분할. 청커, 해시 임베딩, 문장 점수 계산이 같은 규칙을
//! 공유해야 질의와 본문이 동일한 용어 공간에서 비교됩니다.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

/// 단어 토큰 패턴: 숫자 구두점($2,270.16 / 6.75%)을 한 토큰으로 유지
static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$?[\p{L}\p{N}]+(?:[.,'][\p{L}\p{N}]+)*%?").expect("Invalid token regex")
});

/// 영어 불용어 (점수 계산에서 제외, 임베딩에서 가중치 감소)
const STOPWORDS: &[&str] = &[
    "a", "about", "an", "and", "are", "as", "at", "be", "been", "but", "by", "can", "do",
    "does", "for", "from", "had", "has", "have", "how", "i", "if", "in", "into", "is", "it",
    "its", "me", "my", "of", "on", "or", "our", "so", "than", "that", "the", "their", "them",
    "then", "there", "these", "they", "this", "to", "us", "was", "we", "were", "what", "when",
    "where", "which", "who", "whom", "why", "will", "with", "would", "you", "your",
];

// ============================================================================
// Normalization
// ============================================================================

/// 페이지 텍스트 정규화
///
/// - 줄바꿈을 `\n`으로 통일
/// - 제어 문자와 탭을 공백으로 치환
/// - 연속 공백 축약, 줄 끝 공백 제거
/// - 3개 이상 연속 줄바꿈을 문단 구분(`\n\n`)으로 축약
pub fn normalize_text(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");

    let mut out = String::with_capacity(unified.len());
    let mut pending_space = false;
    let mut newlines = 0usize;

    for c in unified.chars() {
        if c == '\n' {
            pending_space = false;
            newlines += 1;
            continue;
        }

        if c.is_whitespace() || c.is_control() {
            pending_space = true;
            continue;
        }

        if newlines > 0 {
            if !out.is_empty() {
                out.push_str(if newlines >= 2 { "\n\n" } else { "\n" });
            }
            newlines = 0;
        } else if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.push(c);
    }

    out
}

/// 질의 정규화: 모든 공백을 단일 공백으로
pub fn normalize_query(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ============================================================================
// Tokenization
// ============================================================================

/// 소문자 토큰 목록 (간단한 복수형 어간 처리 포함)
pub fn tokenize(text: &str) -> Vec<String> {
    TOKEN_RE
        .find_iter(text)
        .map(|m| stem(&m.as_str().to_lowercase()))
        .collect()
}

/// 불용어 여부
pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.binary_search(&token).is_ok()
}

/// 내용어 목록 (불용어 제거, 순서 유지, 중복 제거)
///
/// 모든 토큰이 불용어면 전체 토큰을 사용합니다.
pub fn content_terms(text: &str) -> Vec<String> {
    let tokens = tokenize(text);

    let mut terms: Vec<String> = Vec::new();
    for token in tokens.iter().filter(|t| !is_stopword(t)) {
        if !terms.contains(token) {
            terms.push(token.clone());
        }
    }

    if terms.is_empty() {
        for token in tokens {
            if !terms.contains(&token) {
                terms.push(token);
            }
        }
    }

    terms
}

/// 복수형 `s` 제거 (payments -> payment)
fn stem(token: &str) -> String {
    let is_plural = token.len() > 3
        && token.ends_with('s')
        && !token.ends_with("ss")
        && token.chars().all(|c| c.is_alphabetic());

    if is_plural && !is_stopword(token) {
        token[..token.len() - 1].to_string()
    } else {
        token.to_string()
    }
}

// ============================================================================
// Sentence Splitting
// ============================================================================

/// 문장 단위 분할 (바이트 범위, 앞뒤 공백 제외)
///
/// 문장 경계: `.`, `!`, `?` (닫는 따옴표/괄호 포함) 뒤에 공백이나 끝이 오는 경우,
/// 그리고 빈 줄. `6.75%`처럼 구두점 뒤에 공백이 없으면 경계가 아닙니다.
pub fn split_sentences(text: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let boundary = match c {
            '.' | '!' | '?' => {
                let mut end = i + c.len_utf8();
                while let Some(&(j, next)) = chars.peek() {
                    if matches!(next, '"' | '\'' | ')' | ']' | '\u{201d}' | '\u{2019}') {
                        end = j + next.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                match chars.peek() {
                    None => Some(end),
                    Some(&(_, next)) if next.is_whitespace() => Some(end),
                    _ => None,
                }
            }
            '\n' if matches!(chars.peek(), Some(&(_, '\n'))) => Some(i),
            _ => None,
        };

        if let Some(end) = boundary {
            push_trimmed(text, start..end, &mut spans);
            start = end;
        }
    }

    push_trimmed(text, start..text.len(), &mut spans);
    spans
}

fn push_trimmed(text: &str, range: Range<usize>, spans: &mut Vec<Range<usize>>) {
    let slice = &text[range.clone()];
    let trimmed_start = slice.len() - slice.trim_start().len();
    let trimmed_end = slice.len() - slice.trim_end().len();

    if trimmed_start + trimmed_end < slice.len() {
        spans.push(range.start + trimmed_start..range.end - trimmed_end);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stopwords_sorted() {
        // binary_search 전제 조건
        let mut sorted = STOPWORDS.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, STOPWORDS);
    }

    #[test]
    fn test_normalize_text() {
        let raw = "  Hello\t\tworld \r\nsecond   line\n\n\n\nnext\x0cpara  ";
        assert_eq!(normalize_text(raw), "Hello world\nsecond line\n\nnext para");
    }

    #[test]
    fn test_normalize_text_empty() {
        assert_eq!(normalize_text(""), "");
        assert_eq!(normalize_text(" \n\t \n"), "");
    }

    #[test]
    fn test_normalize_query() {
        assert_eq!(normalize_query("  What   is\nthe rate? "), "What is the rate?");
        assert_eq!(normalize_query(" \t "), "");
    }

    #[test]
    fn test_tokenize_keeps_numbers() {
        let tokens = tokenize("The rate is 6.75%. Pay $2,270.16 now!");
        assert_eq!(
            tokens,
            vec!["the", "rate", "is", "6.75%", "pay", "$2,270.16", "now"]
        );
    }

    #[test]
    fn test_tokenize_stems_plurals() {
        assert_eq!(tokenize("Payments rates class bus"), vec!["payment", "rate", "class", "bus"]);
    }

    #[test]
    fn test_content_terms() {
        assert_eq!(content_terms("What is the interest rate?"), vec!["interest", "rate"]);
        assert_eq!(content_terms("what is it"), vec!["what", "is", "it"]);
        assert!(content_terms("?!").is_empty());
    }

    #[test]
    fn test_split_sentences() {
        let text = "The loan bears interest at a fixed annual rate of 6.75%. Payments are due monthly.";
        let spans = split_sentences(text);
        let sentences: Vec<&str> = spans.iter().map(|r| &text[r.clone()]).collect();
        assert_eq!(
            sentences,
            vec![
                "The loan bears interest at a fixed annual rate of 6.75%.",
                "Payments are due monthly."
            ]
        );
    }

    #[test]
    fn test_split_sentences_paragraphs_and_quotes() {
        let text = "He said \"stop.\" Then left\n\nNew paragraph without period";
        let spans = split_sentences(text);
        let sentences: Vec<&str> = spans.iter().map(|r| &text[r.clone()]).collect();
        assert_eq!(
            sentences,
            vec!["He said \"stop.\"", "Then left", "New paragraph without period"]
        );
    }

    #[test]
    fn test_split_sentences_empty() {
        assert!(split_sentences("").is_empty());
        assert!(split_sentences("   ").is_empty());
    }
}
