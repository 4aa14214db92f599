//! 프롬프트 구성 - 검색된 키워드를 생성 모델 입력으로 변환

use crate::knowledge::SearchResult;

/// 검색 결과가 없을 때의 컨텍스트
pub const NO_KEYWORD_DATA: &str = "No relevant keyword data found.";

const CONTEXT_HEADER: &str = "Relevant Keyword Data:\n\n";

/// 시스템 프롬프트
pub const SYSTEM_PROMPT: &str = "You are a digital marketing analyst working from Google Ads keyword planner data.
Answer using the keyword metrics provided: monthly search volume, competition level and cost-per-click range.
Ground every claim in the numbers you were given and say so when the data does not cover the question.
When a requested keyword is missing, point to the closest keywords that are present.";

const RECOMMENDATION_INSTRUCTION: &str =
    "Add concrete recommendations for keyword targeting and campaign optimization.";

/// 천 단위 구분 기호 (12100 -> "12,100")
pub fn format_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn format_record(rank: usize, result: &SearchResult) -> String {
    let kd = &result.keyword;
    format!(
        "{}. Keyword: '{}'\n   - Search Volume: {} monthly searches\n   - Competition: {}\n   - CPC Range: ${:.2} - ${:.2}\n   - Relevance Score: {:.3}\n\n",
        rank,
        kd.keyword,
        format_thousands(kd.search_volume),
        kd.competition,
        kd.cpc_low,
        kd.cpc_high,
        result.similarity
    )
}

/// 검색 결과를 컨텍스트 블록으로 포맷
///
/// 문자 수가 `max_chars`를 넘으면 레코드 단위로 자릅니다 (첫 레코드는 항상 포함).
pub fn format_keyword_context(results: &[SearchResult], max_chars: usize) -> String {
    if results.is_empty() {
        return NO_KEYWORD_DATA.to_string();
    }

    let mut context = String::from(CONTEXT_HEADER);
    let mut chars = CONTEXT_HEADER.chars().count();
    let mut included = 0;

    for (i, result) in results.iter().enumerate() {
        let block = format_record(i + 1, result);
        let block_chars = block.chars().count();
        if included > 0 && chars + block_chars > max_chars {
            break;
        }
        context.push_str(&block);
        chars += block_chars;
        included += 1;
    }

    if included < results.len() {
        tracing::debug!(
            "Keyword context truncated: {}/{} records within {} chars",
            included,
            results.len(),
            max_chars
        );
    }

    context
}

/// 사용자 프롬프트
pub fn build_user_prompt(user_query: &str, context: &str, include_recommendations: bool) -> String {
    let mut prompt = format!(
        "User Query: {}\n\n{}\n\nAnswer the query using the keyword data above.",
        user_query.trim(),
        context.trim_end()
    );
    if include_recommendations {
        prompt.push_str("\n\n");
        prompt.push_str(RECOMMENDATION_INSTRUCTION);
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{Competition, KeywordData};

    fn result(keyword: &str, volume: u64, similarity: f32) -> SearchResult {
        SearchResult {
            keyword: KeywordData::new(keyword, volume, Competition::Low).with_cpc(1.5, 3.257),
            similarity,
        }
    }

    #[test]
    fn test_format_thousands() {
        assert_eq!(format_thousands(0), "0");
        assert_eq!(format_thousands(999), "999");
        assert_eq!(format_thousands(1000), "1,000");
        assert_eq!(format_thousands(1234567), "1,234,567");
    }

    #[test]
    fn test_context_format() {
        let context = format_keyword_context(&[result("seo", 12100, 0.87654)], 6000);
        assert!(context.starts_with("Relevant Keyword Data:"));
        assert!(context.contains("1. Keyword: 'seo'"));
        assert!(context.contains("12,100 monthly searches"));
        assert!(context.contains("Competition: LOW"));
        assert!(context.contains("$1.50 - $3.26"));
        assert!(context.contains("Relevance Score: 0.877"));
    }

    #[test]
    fn test_context_empty() {
        assert_eq!(format_keyword_context(&[], 6000), NO_KEYWORD_DATA);
    }

    #[test]
    fn test_context_truncates_on_record_boundary() {
        let results: Vec<_> = (0..50).map(|i| result(&format!("kw {}", i), 100, 0.5)).collect();
        let context = format_keyword_context(&results, 500);

        assert!(context.len() <= 500);
        assert!(context.contains("1. Keyword: 'kw 0'"));
        assert!(!context.contains("50. Keyword"));
        assert!(context.ends_with("\n\n"));
    }

    #[test]
    fn test_context_keeps_first_record_over_budget() {
        let context = format_keyword_context(&[result("seo", 1, 0.1)], 10);
        assert!(context.contains("'seo'"));
    }

    #[test]
    fn test_context_budget_counts_characters() {
        let results = [result("검색 엔진 최적화", 100, 0.9), result("온라인 광고", 50, 0.8)];
        let full = format_keyword_context(&results, usize::MAX);
        let budget = full.chars().count();
        assert!(full.len() > budget);

        let context = format_keyword_context(&results, budget);
        assert!(context.contains("'온라인 광고'"));
        assert!(!format_keyword_context(&results, budget - 1).contains("'온라인 광고'"));
    }

    #[test]
    fn test_user_prompt_recommendations() {
        let with = build_user_prompt("best keywords?", "ctx", true);
        let without = build_user_prompt("best keywords?", "ctx", false);
        assert!(with.contains(RECOMMENDATION_INSTRUCTION));
        assert!(!without.contains(RECOMMENDATION_INSTRUCTION));
        assert!(without.starts_with("User Query: best keywords?"));
    }
}
