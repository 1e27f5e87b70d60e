//! Line-level Markdown scanning shared by metadata extraction and TOC
//! normalisation.

/// A line outside fenced code blocks, with its byte offset in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProseLine<'a> {
    pub offset: usize,
    /// Line content without the trailing `\n` / `\r\n`.
    pub text: &'a str,
}

/// Iterate over lines that are not inside (or delimiting) a fenced code block.
pub fn prose_lines(source: &str) -> impl Iterator<Item = ProseLine<'_>> {
    let mut offset = 0;
    let mut fence: Option<Fence> = None;
    source.split_inclusive('\n').filter_map(move |raw| {
        let line_offset = offset;
        offset += raw.len();
        let text = raw.trim_end_matches('\n').trim_end_matches('\r');

        match (fence, fence_marker(text)) {
            (None, Some(open)) => {
                fence = Some(open);
                None
            }
            (Some(open), Some(close)) if open.closes_with(close) => {
                fence = None;
                None
            }
            (Some(_), _) => None,
            (None, None) => Some(ProseLine {
                offset: line_offset,
                text,
            }),
        }
    })
}

/// A fence delimiter: its character and run length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fence {
    marker: char,
    len: usize,
}

impl Fence {
    /// A closing fence uses the same character and is at least as long.
    fn closes_with(self, other: Fence) -> bool {
        self.marker == other.marker && other.len >= self.len
    }
}

fn fence_marker(line: &str) -> Option<Fence> {
    let trimmed = line.trim_start();
    if line.len() - trimmed.len() > 3 {
        return None;
    }
    let marker = match trimmed.chars().next() {
        Some(c @ ('`' | '~')) => c,
        _ => return None,
    };
    let len = trimmed.chars().take_while(|&c| c == marker).count();
    (len >= 3).then_some(Fence { marker, len })
}

/// Level and text of an ATX heading (`## Title`), if `line` is one.
pub fn heading(line: &str) -> Option<(usize, &str)> {
    let level = line.bytes().take_while(|&b| b == b'#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = &line[level..];
    if !rest.is_empty() && !rest.starts_with([' ', '\t']) {
        return None;
    }
    Some((level, strip_closing_sequence(rest.trim())))
}

/// Drop an optional closing `#` run; it only counts when preceded by
/// whitespace, so `C#` keeps its hash.
fn strip_closing_sequence(text: &str) -> &str {
    let without = text.trim_end_matches('#');
    if without.is_empty() {
        return without;
    }
    if without.len() < text.len() && without.ends_with([' ', '\t']) {
        return without.trim_end();
    }
    text
}
