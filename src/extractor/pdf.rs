//! PDF 페이지 추출 모듈
//!
//! pdf-extract 크레이트로 텍스트를 뽑은 뒤 페이지로 나눕니다. 스캔 문서처럼
//! 텍스트가 없으면 빈 1페이지를 반환합니다 (OCR은 하지 않음).

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

use crate::knowledge::Page;

use super::split_pages;

/// 일부 PDF가 쓰는 페이지 구분 줄 (예: "--- Page 2 ---")
static PAGE_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*[-=]{2,}[ \t]*(?:Page[ \t]*)?\d+[ \t]*[-=]{2,}[ \t]*$")
        .expect("Invalid page marker regex")
});

/// PDF에서 페이지 추출 (페이지 번호는 1부터)
pub fn extract_pages_from_pdf(path: &Path) -> Result<Vec<Page>> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read PDF: {:?}", path))?;

    let text = pdf_extract::extract_text_from_mem(&bytes)
        .with_context(|| format!("Failed to extract text from PDF: {:?}", path))?;

    if text.trim().is_empty() {
        tracing::warn!(
            "No text extracted from PDF: {:?}. It might be a scanned document.",
            path
        );
        return Ok(vec![Page::new(1, String::new())]);
    }

    let pages = split_pdf_pages(&text);
    tracing::debug!("Extracted {} pages from {:?}", pages.len(), path);
    Ok(pages)
}

/// PDF 텍스트를 페이지로 분리
///
/// 폼피드가 있으면 폼피드 기준, 없으면 페이지 구분 줄 기준, 둘 다 없으면 1페이지.
fn split_pdf_pages(text: &str) -> Vec<Page> {
    if text.contains('\x0c') {
        return split_pages(text);
    }

    if PAGE_MARKER_RE.is_match(text) {
        let pages: Vec<Page> = PAGE_MARKER_RE
            .split(text)
            .filter(|part| !part.trim().is_empty())
            .enumerate()
            .map(|(i, part)| Page::new(i as u32 + 1, part.trim()))
            .collect();

        if pages.len() > 1 {
            return pages;
        }
    }

    vec![Page::new(1, text)]
}

// ============================================================================
// Tests
// ============================================================================
