//! 페이지 추출 모듈
//!
//! 소스 파일을 `(페이지 번호, 텍스트)` 목록으로 바꿉니다. 엔진 코어 밖의
//! 협력자이며, 추출이 끝난 뒤에만 텍스트가 엔진으로 들어갑니다.
//! - 텍스트 파일: 폼피드(`\x0c`)로 페이지 구분
//! - PDF 파일: pdf-extract로 텍스트 추출

pub mod pdf;

use std::path::Path;

use anyhow::{Context, Result};

use crate::collector::{FileType, SourceFile};
use crate::knowledge::Page;

// ============================================================================
// Extracted Document
// ============================================================================

/// 추출된 문서
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    /// 문서 ID
    pub document_id: String,
    /// 출처 이름 (인용 표시용)
    pub source_name: String,
    /// 원본 파일 타입
    pub file_type: FileType,
    /// 페이지 목록 (1부터)
    pub pages: Vec<Page>,
}

impl ExtractedDocument {
    /// 공백이 아닌 페이지 수
    pub fn non_empty_pages(&self) -> usize {
        self.pages.iter().filter(|p| !p.text.trim().is_empty()).count()
    }
}

// ============================================================================
// Page Extractor
// ============================================================================

/// 페이지 추출기
#[derive(Debug, Default, Clone, Copy)]
pub struct PageExtractor;

impl PageExtractor {
    pub fn new() -> Self {
        Self
    }

    /// 수집된 파일에서 문서 추출
    pub async fn extract(&self, file: &SourceFile) -> Result<ExtractedDocument> {
        let pages = self.extract_pages(&file.path, file.file_type).await?;

        if pages.iter().all(|p| p.text.trim().is_empty()) {
            tracing::warn!("No text extracted from {:?}", file.path);
        }

        Ok(ExtractedDocument {
            document_id: file.document_id(),
            source_name: file.source_name(),
            file_type: file.file_type,
            pages,
        })
    }

    /// 경로와 타입으로 페이지 추출
    pub async fn extract_pages(&self, path: &Path, file_type: FileType) -> Result<Vec<Page>> {
        match file_type {
            FileType::Text => self.extract_text(path).await,
            FileType::Pdf => self.extract_pdf(path).await,
        }
    }

    async fn extract_text(&self, path: &Path) -> Result<Vec<Page>> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read text file: {:?}", path))?;

        Ok(split_pages(&text))
    }

    async fn extract_pdf(&self, path: &Path) -> Result<Vec<Page>> {
        // PDF 추출은 CPU 바운드이므로 spawn_blocking 사용
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || pdf::extract_pages_from_pdf(&path))
            .await
            .context("PDF extraction task failed")?
    }
}

/// 폼피드로 페이지 분리 (번호는 위치 기준, 마지막 빈 페이지는 제외)
pub fn split_pages(text: &str) -> Vec<Page> {
    let mut parts: Vec<&str> = text.split('\x0c').collect();
    while parts.len() > 1 && parts.last().is_some_and(|p| p.trim().is_empty()) {
        parts.pop();
    }

    parts
        .into_iter()
        .enumerate()
        .map(|(i, part)| Page::new(i as u32 + 1, part))
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_split_pages() {
        let pages = split_pages("first\x0csecond\x0c\x0cfourth\x0c\n");
        assert_eq!(pages.len(), 4);
        assert_eq!(pages[0], Page::new(1, "first"));
        assert_eq!(pages[1].number, 2);
        assert_eq!(pages[2].text, "");
        assert_eq!(pages[3], Page::new(4, "fourth"));
    }

    #[test]
    fn test_split_pages_single() {
        let pages = split_pages("no page breaks here");
        assert_eq!(pages, vec![Page::new(1, "no page breaks here")]);
    }

    #[tokio::test]
    async fn test_extract_text_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("loan.txt");
        std::fs::write(&path, "Page one.\x0cPage two.").unwrap();

        let file = SourceFile::from_path(path).unwrap().unwrap();
        let doc = PageExtractor::new().extract(&file).await.unwrap();

        assert_eq!(doc.source_name, "loan.txt");
        assert_eq!(doc.file_type, FileType::Text);
        assert_eq!(doc.pages.len(), 2);
        assert_eq!(doc.non_empty_pages(), 2);
        assert_eq!(doc.pages[1], Page::new(2, "Page two."));
    }

    #[tokio::test]
    async fn test_extract_missing_file() {
        let result = PageExtractor::new()
            .extract_pages(Path::new("/nonexistent/file.txt"), FileType::Text)
            .await;
        assert!(result.is_err());
    }
}
