//! Sliding-window text chunker.
//!
//! Splits document text into [`Passage`]s of at most `chunk_size`
//! characters. Consecutive passages of one document share exactly
//! `overlap` characters, so the window advances by `chunk_size - overlap`.
//! The final window may be shorter. Sizes and offsets count Unicode scalar
//! values, never bytes, so a window never splits a character.

use crate::error::{RagError, Result};
use crate::models::{Document, Passage};

/// Split every document into passages, in document order.
pub fn chunk_documents(
    documents: &[Document],
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<Passage>> {
    let mut passages = Vec::new();
    for doc in documents {
        passages.extend(chunk_text(&doc.source, &doc.text, chunk_size, overlap)?);
    }
    Ok(passages)
}

/// Split one text into overlapping windows.
///
/// Empty text yields no passages; text no longer than `chunk_size` yields
/// exactly one passage equal to the whole text.
pub fn chunk_text(
    source: &str,
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<Passage>> {
    check_window(chunk_size, overlap)?;

    // Byte position of every char boundary, including the end of text.
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let total_chars = boundaries.len() - 1;

    let mut passages = Vec::new();
    if total_chars == 0 {
        return Ok(passages);
    }

    let step = chunk_size - overlap;
    let mut start = 0;
    loop {
        let end = (start + chunk_size).min(total_chars);
        passages.push(Passage {
            text: text[boundaries[start]..boundaries[end]].to_string(),
            source: source.to_string(),
            offset: start,
        });
        if end == total_chars {
            break;
        }
        start += step;
    }

    Ok(passages)
}

/// Number of passages [`chunk_text`] produces for a text of `len` characters.
///
/// Rejects the same window settings [`chunk_text`] rejects.
pub fn expected_chunk_count(len: usize, chunk_size: usize, overlap: usize) -> Result<usize> {
    check_window(chunk_size, overlap)?;
    Ok(if len == 0 {
        0
    } else if len <= chunk_size {
        1
    } else {
        (len - overlap).div_ceil(chunk_size - overlap)
    })
}

fn check_window(chunk_size: usize, overlap: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(RagError::InvalidArgument(
            "chunk_size must be > 0".to_string(),
        ));
    }
    if overlap >= chunk_size {
        return Err(RagError::InvalidArgument(format!(
            "overlap ({}) must be smaller than chunk_size ({})",
            overlap, chunk_size
        )));
    }
    Ok(())
}
