//! 提取程序输出解析
//!
//! 每行一个包：`<ts> <glyph> <len>`（带时间戳）或 `<glyph> <len>`（无时间戳）。
//! 长度可写作 `123` 或 `len=123`。任何一行不合语法，整次提取失败。

use crate::error::CaptureError;
use crate::packet::{PacketDir, PacketMeta};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ExtractMode {
    /// 首列是毫秒时间戳
    #[default]
    Timestamped,
    /// 无时间戳，以行序号代替
    Bare,
}

pub fn parse_extractor_output(
    text: &str,
    mode: ExtractMode,
) -> Result<Vec<PacketMeta>, CaptureError> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(seq, line)| {
            parse_line(line, seq, mode).ok_or_else(|| CaptureError::BadExtractorOutput {
                line: line.to_string(),
            })
        })
        .collect()
}

fn parse_line(line: &str, seq: usize, mode: ExtractMode) -> Option<PacketMeta> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let (ts, glyph, len) = match (mode, tokens.as_slice()) {
        (ExtractMode::Timestamped, [ts, glyph, len]) => (ts.parse().ok()?, *glyph, *len),
        (ExtractMode::Bare, [glyph, len]) => (i64::try_from(seq).ok()?, *glyph, *len),
        _ => return None,
    };

    let dir: PacketDir = glyph.parse().ok()?;
    let len = len.strip_prefix("len=").unwrap_or(len);
    if len.is_empty() || !len.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(PacketMeta::new(ts, dir, len.parse().ok()?))
}
