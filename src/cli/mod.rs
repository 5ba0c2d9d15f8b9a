//! CLI 모듈
//!
//! citeqa CLI 명령어 정의 및 구현

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::collector::{CollectorConfig, FileCollector, FileType};
use crate::config::EngineConfig;
use crate::embedding::{create_embedder, has_api_key, EmbedderKind};
use crate::extractor::PageExtractor;
use crate::knowledge::text::normalize_text;
use crate::knowledge::{chunker_from_config, Answer, AnswerEngine};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "citeqa")]
#[command(version, about = "문서 기반 인용 질의응답", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 문서를 읽고 질문에 인용과 함께 답변
    Query {
        /// 질문
        question: String,

        /// 문서 파일 경로 (여러 번 지정 가능)
        #[arg(short, long)]
        file: Vec<PathBuf>,

        /// 문서 폴더 경로 (재귀, 여러 번 지정 가능)
        #[arg(short, long)]
        dir: Vec<PathBuf>,

        /// 검색 후보 수 (기본값: 설정의 top_k)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// 최소 유사도 (기본값: 설정의 similarity_threshold)
        #[arg(short, long)]
        threshold: Option<f32>,

        /// 임베딩 프로바이더
        #[arg(short, long, value_enum, default_value_t = EmbedderKind::Hash)]
        embedder: EmbedderKind,

        /// JSON 설정 파일
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// PDF 파일 건너뛰기
        #[arg(long)]
        skip_pdfs: bool,

        /// 답변을 JSON으로 출력
        #[arg(long)]
        json: bool,
    },

    /// 파일의 청크 분할 결과 확인
    Chunks {
        /// 문서 파일 경로
        #[arg(short, long)]
        file: PathBuf,

        /// JSON 설정 파일
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// 유효 설정 및 프로바이더 상태 확인
    Status {
        /// JSON 설정 파일
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Query {
            question,
            file,
            dir,
            top_k,
            threshold,
            embedder,
            config,
            skip_pdfs,
            json,
        } => {
            let options = QueryOptions {
                top_k,
                threshold,
                embedder,
                skip_pdfs,
                json,
            };
            cmd_query(&question, &file, &dir, config.as_deref(), options).await
        }
        Commands::Chunks { file, config } => cmd_chunks(&file, config.as_deref()).await,
        Commands::Status { config } => cmd_status(config.as_deref()),
    }
}

/// 설정 로드: JSON 파일(선택) 위에 `CITEQA_*` 환경변수 적용
fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("설정 파일 로드 실패: {:?}", path))?
            .with_env_overrides(),
        None => EngineConfig::from_env(),
    };
    config.context("설정 검증 실패")
}

// ============================================================================
// Command Implementations
// ============================================================================

struct QueryOptions {
    top_k: Option<usize>,
    threshold: Option<f32>,
    embedder: EmbedderKind,
    skip_pdfs: bool,
    json: bool,
}

/// 질의 명령어 (query)
///
/// 파일/폴더를 수집하여 메모리 엔진에 넣은 뒤 한 번 질의합니다.
async fn cmd_query(
    question: &str,
    files: &[PathBuf],
    dirs: &[PathBuf],
    config_path: Option<&Path>,
    options: QueryOptions,
) -> Result<()> {
    if files.is_empty() && dirs.is_empty() {
        bail!("--file 또는 --dir 중 하나 이상을 지정해야 합니다");
    }
    if options.embedder == EmbedderKind::Gemini && !has_api_key() {
        bail!(
            "API 키가 설정되지 않았습니다.\n\n\
             설정 방법:\n  \
             export GEMINI_API_KEY=your-api-key\n  \
             또는\n  \
             export GOOGLE_AI_API_KEY=your-api-key"
        );
    }

    let config = load_config(config_path)?;
    let top_k = options.top_k.unwrap_or(config.top_k);
    let threshold = options.threshold.unwrap_or(config.similarity_threshold);

    let embedder = create_embedder(options.embedder, &config).context("임베더 생성 실패")?;
    let engine = AnswerEngine::new(config, embedder).context("엔진 초기화 실패")?;

    // 파일 수집
    let collector = FileCollector::new(CollectorConfig {
        skip_pdfs: options.skip_pdfs,
        ..Default::default()
    });
    let sources = collector.collect(files, dirs)?;
    if sources.is_empty() {
        bail!("수집할 문서가 없습니다");
    }

    let total_size: u64 = sources.iter().map(|f| f.size).sum();
    if !options.json {
        println!(
            "[*] 수집 대상: {} 파일 ({})",
            sources.len(),
            format_bytes(total_size as usize)
        );
    }

    // 추출 및 수집
    let extractor = PageExtractor::new();
    let mut error_count = 0;

    for (i, source) in sources.iter().enumerate() {
        let label = match source.file_type {
            FileType::Text => "TXT",
            FileType::Pdf => "PDF",
        };
        let progress = format!(
            "[{}/{}] [{}] {}",
            i + 1,
            sources.len(),
            label,
            source.source_name()
        );

        let document = match extractor.extract(source).await {
            Ok(document) => document,
            Err(e) => {
                eprintln!("{} 추출 실패: {:#}", progress, e);
                error_count += 1;
                continue;
            }
        };

        match engine
            .ingest(document.document_id, document.source_name, document.pages)
            .await
        {
            Ok(report) => {
                if !options.json {
                    println!(
                        "{} 청크 {} (버림 {}, 실패 {})",
                        progress, report.chunks_indexed, report.chunks_dropped, report.chunks_failed
                    );
                }
            }
            Err(e) => {
                eprintln!("{} 수집 실패: {}", progress, e);
                error_count += 1;
            }
        }
    }

    if error_count > 0 {
        tracing::warn!("{} files failed to ingest", error_count);
    }

    // 질의
    let answer = engine
        .answer_with(question, top_k, threshold)
        .await
        .context("질의 실패")?;

    if options.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&answer).context("답변 직렬화 실패")?
        );
    } else {
        println!();
        print_answer(question, &answer);
    }

    Ok(())
}

fn print_answer(question: &str, answer: &Answer) {
    println!("[*] 질문: \"{}\"", question);

    if answer.is_empty() {
        println!("\n[!] 관련 정보를 찾지 못했습니다.");
        return;
    }

    println!("\n[OK] 답변 (신뢰도: {:.2}):\n", answer.confidence);
    println!("   {}\n", answer.text);
    println!("출처 ({} 건):", answer.citations.len());

    for (i, citation) in answer.citations.iter().enumerate() {
        println!(
            "{}. {} p.{} [유사도: {:.4}]",
            i + 1,
            citation.source_name,
            citation.page_number,
            citation.similarity
        );
        println!("   \"{}\"", truncate_text(&citation.excerpt, 200));
    }
}

/// 청크 확인 명령어 (chunks)
async fn cmd_chunks(path: &Path, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let chunker = chunker_from_config(&config)?;

    let source = FileCollector::with_defaults()
        .collect_file(path)?
        .ok_or_else(|| anyhow::anyhow!("지원하지 않는 파일 형식: {:?}", path))?;
    let document = PageExtractor::new().extract(&source).await?;

    println!(
        "[*] {} ({} 페이지, chunk_size {}, overlap {})",
        document.source_name,
        document.pages.len(),
        config.chunk_size,
        config.chunk_overlap
    );

    let mut total = 0;
    let mut dropped = 0;

    for page in &document.pages {
        let text = normalize_text(&page.text);
        let chunked = chunker.chunk(&text, page.number);
        dropped += chunked.dropped;

        for chunk in &chunked.chunks {
            total += 1;
            println!(
                "  #{:<4} p.{:<3} {:>6}..{:<6} ({} chars) {}",
                total,
                chunk.page_number,
                chunk.start_offset,
                chunk.end_offset,
                chunk.text.chars().count(),
                truncate_text(&chunk.text, 60)
            );
        }
    }

    println!();
    println!("[OK] 청크 {} 개, 버림 {} 개", total, dropped);

    Ok(())
}

/// 상태 명령어 (status)
fn cmd_status(config_path: Option<&Path>) -> Result<()> {
    println!("citeqa v{}", env!("CARGO_PKG_VERSION"));
    println!();

    let config = load_config(config_path)?;
    println!("[OK] 설정:");
    println!(
        "{}",
        serde_json::to_string_pretty(&config).context("설정 직렬화 실패")?
    );
    println!();

    match create_embedder(EmbedderKind::Hash, &config) {
        Ok(embedder) => println!(
            "[OK] 로컬 임베딩: {} (차원: {})",
            embedder.name(),
            embedder.dimension()
        ),
        Err(e) => println!("[!] 로컬 임베딩 사용 불가: {}", e),
    }

    if has_api_key() {
        println!("[OK] Gemini API 키: 설정됨");
    } else {
        println!("[!] Gemini API 키: 미설정");
        println!("    설정: export GEMINI_API_KEY=your-key");
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("hello world", 5), "hello...");
        assert_eq!(truncate_text("hello\nworld", 20), "hello world");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
    }

    #[test]
    fn test_truncate_unicode() {
        let korean = "안녕하세요 세계";
        let truncated = truncate_text(korean, 5);
        assert_eq!(truncated, "안녕하세요...");
    }

    #[test]
    fn test_parse_query_command() {
        let cli = Cli::try_parse_from([
            "citeqa",
            "query",
            "What is the interest rate?",
            "--file",
            "a.txt",
            "--file",
            "b.pdf",
            "-k",
            "3",
            "--json",
        ])
        .unwrap();

        match cli.command {
            Commands::Query {
                question,
                file,
                top_k,
                embedder,
                json,
                ..
            } => {
                assert_eq!(question, "What is the interest rate?");
                assert_eq!(file.len(), 2);
                assert_eq!(top_k, Some(3));
                assert_eq!(embedder, EmbedderKind::Hash);
                assert!(json);
            }
            _ => panic!("expected query command"),
        }
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("citeqa.json");
        std::fs::write(&path, r#"{"chunk_size": 400, "chunk_overlap": 40}"#).unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.chunk_size, 400);
        assert_eq!(config.chunk_overlap, 40);
        assert_eq!(config.top_k, EngineConfig::default().top_k);
    }

    #[tokio::test]
    async fn test_query_requires_sources() {
        let options = QueryOptions {
            top_k: None,
            threshold: None,
            embedder: EmbedderKind::Hash,
            skip_pdfs: false,
            json: true,
        };
        assert!(cmd_query("question", &[], &[], None, options).await.is_err());
    }
}
