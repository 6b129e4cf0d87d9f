//! Text Splitter - 재귀 문자 분할
//!
//! 구분자 우선순위(`\n\n` → `\n` → 공백 → 문자)에 따라 텍스트를 나누고,
//! 작은 조각은 `chunk_size`까지 병합하며 `chunk_overlap`만큼 앞 청크의 꼬리를 이어 붙입니다.
//! 길이는 바이트가 아닌 문자(Unicode scalar) 단위입니다.

use anyhow::{bail, Result};

/// 기본 구분자 (우선순위 순, 빈 문자열 = 문자 단위)
pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str) -> Vec<String>;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// RecursiveCharacterSplitter
// ============================================================================

/// 재귀 문자 분할기
#[derive(Debug, Clone)]
pub struct RecursiveCharacterSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveCharacterSplitter {
    /// 기본 구분자로 생성
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        Self::with_separators(chunk_size, chunk_overlap, DEFAULT_SEPARATORS)
    }

    /// 구분자 지정 생성
    pub fn with_separators(
        chunk_size: usize,
        chunk_overlap: usize,
        separators: &[&str],
    ) -> Result<Self> {
        if chunk_size == 0 {
            bail!("chunk_size must be greater than 0");
        }
        if chunk_overlap > chunk_size {
            bail!(
                "chunk_overlap ({}) is larger than chunk_size ({})",
                chunk_overlap,
                chunk_size
            );
        }

        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: separators.iter().map(|s| s.to_string()).collect(),
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// 재귀 분할
    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        // 텍스트에 존재하는 첫 구분자 선택 (빈 구분자는 항상 매칭)
        let mut separator = separators.last().map(String::as_str).unwrap_or("");
        let mut remaining: &[String] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = "";
                break;
            }
            if text.contains(sep.as_str()) {
                separator = sep;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let mut chunks = Vec::new();
        let mut pending: Vec<String> = Vec::new();

        for piece in split_keeping_separator(text, separator) {
            if char_len(&piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }

            if !pending.is_empty() {
                chunks.extend(self.merge(&pending));
                pending.clear();
            }

            if remaining.is_empty() {
                // 더 나눌 구분자가 없으면 그대로 둠
                if let Some(chunk) = trimmed(&piece) {
                    chunks.push(chunk);
                }
            } else {
                chunks.extend(self.split_recursive(&piece, remaining));
            }
        }

        if !pending.is_empty() {
            chunks.extend(self.merge(&pending));
        }

        chunks
    }

    /// 작은 조각들을 chunk_size 이하로 병합 (오버랩 유지)
    fn merge(&self, pieces: &[String]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: Vec<&str> = Vec::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);

            if total + len > self.chunk_size && !window.is_empty() {
                if let Some(chunk) = trimmed(&window.concat()) {
                    chunks.push(chunk);
                }

                // 오버랩 이하가 될 때까지, 그리고 새 조각이 들어갈 때까지 앞에서 제거
                while !window.is_empty()
                    && (total > self.chunk_overlap || total + len > self.chunk_size)
                {
                    total -= char_len(window.remove(0));
                }
            }

            window.push(piece);
            total += len;
        }

        if let Some(chunk) = trimmed(&window.concat()) {
            chunks.push(chunk);
        }

        chunks
    }
}

impl Default for RecursiveCharacterSplitter {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Chunker for RecursiveCharacterSplitter {
    fn chunk(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        self.split_recursive(text, &self.separators)
    }

    fn name(&self) -> &'static str {
        "recursive-character"
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn trimmed(s: &str) -> Option<String> {
    let t = s.trim();
    (!t.is_empty()).then(|| t.to_string())
}

/// 구분자로 나누되 구분자를 다음 조각의 앞에 붙임
fn split_keeping_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(String::from).collect();
    }

    let mut parts = text.split(separator);
    let mut pieces = Vec::new();
    if let Some(first) = parts.next() {
        pieces.push(first.to_string());
    }
    pieces.extend(parts.map(|part| format!("{}{}", separator, part)));
    pieces.retain(|p| !p.is_empty());
    pieces
}

// ============================================================================
// Tests
// ============================================================================
