//! Paragraph chunking and content-addressed point ids.

use std::sync::OnceLock;

use regex::Regex;

fn splitter() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{2,}").expect("valid literal pattern"))
}

/// Derives the deterministic point id for a chunk: the first 8 bytes of
/// `md5("{path}:{index}")` read as a big-endian u64 (equivalently, the
/// first 16 hex digits of the digest).
pub fn point_id(path: &str, index: usize) -> u64 {
    let digest = md5::compute(format!("{path}:{index}"));
    u64::from_be_bytes([
        digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7],
    ])
}

/// Splits file text into blank-line-separated paragraphs, skipping empty
/// blocks. The chunk index counts every split block, including skipped
/// ones, so ids stay stable when blank runs move around the file.
pub fn split_chunks(path: &str, text: &str) -> Vec<(u64, String)> {
    splitter()
        .split(text)
        .enumerate()
        .filter(|(_, block)| !block.trim().is_empty())
        .map(|(i, block)| (point_id(path, i), block.to_string()))
        .collect()
}
