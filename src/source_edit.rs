//! Source rewriting with position tracking
//!
//! Edits are recorded against original byte offsets and only applied when the
//! output is rendered, so every pass can keep addressing the untouched source.
//! Rendering also yields the mappings for a v3 source map.

use std::collections::{BTreeMap, BTreeSet};

use sourcemap::SourceMapBuilder;

use crate::validate::LineIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteState {
    Keep,
    Removed,
    Overwritten,
}

/// One generated position pointing back at the original source. Lines and
/// columns are zero-based, columns count UTF-16 code units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    pub generated_line: u32,
    pub generated_column: u32,
    pub original_offset: u32,
}

pub struct SourceEdit<'s> {
    original: &'s str,
    state: Vec<ByteState>,
    overwrites: BTreeMap<usize, (usize, String)>,
    append_left: BTreeMap<usize, String>,
    prepend_right: BTreeMap<usize, String>,
    locations: BTreeSet<usize>,
}

impl<'s> SourceEdit<'s> {
    pub fn new(original: &'s str) -> Self {
        Self {
            original,
            state: vec![ByteState::Keep; original.len()],
            overwrites: BTreeMap::new(),
            append_left: BTreeMap::new(),
            prepend_right: BTreeMap::new(),
            locations: BTreeSet::new(),
        }
    }

    /// Original character at `offset`.
    pub fn char_at(&self, offset: u32) -> Option<char> {
        self.original.get(offset as usize..)?.chars().next()
    }

    fn clamp(&self, start: u32, end: u32) -> (usize, usize) {
        let len = self.original.len();
        ((start as usize).min(len), (end as usize).min(len))
    }

    pub fn remove(&mut self, start: u32, end: u32) {
        let (start, end) = self.clamp(start, end);
        if start >= end {
            return;
        }
        let stale: Vec<usize> = self.overwrites.range(start..end).map(|(k, _)| *k).collect();
        for key in stale {
            if let Some((over_end, _)) = self.overwrites.remove(&key) {
                for state in &mut self.state[end.min(over_end)..over_end] {
                    *state = ByteState::Removed;
                }
            }
        }
        for state in &mut self.state[start..end] {
            *state = ByteState::Removed;
        }
    }

    /// Replaces `start..end` with `content`. Inserts anchored inside the range
    /// are dropped.
    pub fn overwrite(&mut self, start: u32, end: u32, content: &str) {
        let (start, end) = self.clamp(start, end);
        if start >= end {
            if !content.is_empty() {
                self.prepend_right
                    .entry(start)
                    .or_default()
                    .insert_str(0, content);
            }
            return;
        }
        let stale: Vec<usize> = self.overwrites.range(start..end).map(|(k, _)| *k).collect();
        for key in stale {
            self.overwrites.remove(&key);
        }
        for state in &mut self.state[start..end] {
            *state = ByteState::Overwritten;
        }
        self.overwrites.insert(start, (end, content.to_string()));
    }

    /// Content that sticks to the text before `offset`.
    pub fn append_left(&mut self, offset: u32, content: &str) {
        let (offset, _) = self.clamp(offset, offset);
        self.append_left.entry(offset).or_default().push_str(content);
    }

    /// Content that sticks to the text after `offset`.
    pub fn prepend_right(&mut self, offset: u32, content: &str) {
        let (offset, _) = self.clamp(offset, offset);
        self.prepend_right
            .entry(offset)
            .or_default()
            .insert_str(0, content);
    }

    /// Forces a mapping at `offset` when it survives into the output.
    pub fn add_location(&mut self, offset: u32) {
        let (offset, _) = self.clamp(offset, offset);
        self.locations.insert(offset);
    }

    fn is_kept(&self, index: usize) -> bool {
        self.state.get(index) == Some(&ByteState::Keep)
    }

    fn next_boundary(&self, from: usize) -> usize {
        let mut end = from + 1;
        while end < self.original.len() {
            if !self.is_kept(end)
                || self.append_left.contains_key(&end)
                || self.prepend_right.contains_key(&end)
                || self.locations.contains(&end)
            {
                break;
            }
            end += 1;
        }
        while end < self.original.len() && !self.original.is_char_boundary(end) {
            end += 1;
        }
        end
    }

    pub fn render(&self) -> (String, Vec<Mapping>) {
        let mut out = Cursor::default();
        let len = self.original.len();
        let mut i = 0;

        while i <= len {
            if let Some(content) = self.append_left.get(&i) {
                if i > 0 && self.is_kept(i - 1) {
                    out.push(content);
                }
            }
            if i == len {
                break;
            }
            if let Some((end, content)) = self.overwrites.get(&i) {
                out.map(i);
                out.push(content);
                i = *end;
                continue;
            }
            if !self.is_kept(i) {
                i += 1;
                continue;
            }
            if let Some(content) = self.prepend_right.get(&i) {
                out.push(content);
            }
            let end = self.next_boundary(i);
            out.map(i);
            out.push(&self.original[i..end]);
            i = end;
        }

        (out.text, out.mappings)
    }

    /// JSON source map (v3) for the rendered output.
    pub fn generate_map(&self, source_name: &str, file: &str) -> Result<String, String> {
        let (_, mappings) = self.render();
        let lines = LineIndex::new(self.original);

        let mut builder = SourceMapBuilder::new(Some(file));
        let source_id = builder.add_source(source_name);
        builder.set_source_contents(source_id, Some(self.original.into()));
        for mapping in mappings {
            let (line, column) = lines.locate_utf16(self.original, mapping.original_offset);
            builder.add_raw(
                mapping.generated_line,
                mapping.generated_column,
                line,
                column,
                Some(source_id),
                None,
                false,
            );
        }

        let mut buf = Vec::new();
        builder
            .into_sourcemap()
            .to_writer(&mut buf)
            .map_err(|e| e.to_string())?;
        String::from_utf8(buf).map_err(|e| e.to_string())
    }
}

impl std::fmt::Display for SourceEdit<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render().0)
    }
}

#[derive(Default)]
struct Cursor {
    text: String,
    line: u32,
    column: u32,
    mappings: Vec<Mapping>,
}

impl Cursor {
    fn push(&mut self, content: &str) {
        for ch in content.chars() {
            if ch == '\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += ch.len_utf16() as u32;
            }
        }
        self.text.push_str(content);
    }

    fn map(&mut self, original_offset: usize) {
        let mapping = Mapping {
            generated_line: self.line,
            generated_column: self.column,
            original_offset: original_offset as u32,
        };
        if self.mappings.last() != Some(&mapping) {
            self.mappings.push(mapping);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_overwrite_and_inserts() {
        let mut edit = SourceEdit::new("a { color: red }");
        edit.remove(1, 2);
        edit.overwrite(9, 11, ":");
        edit.append_left(1, ".x");
        assert_eq!(edit.to_string(), "a.x{ color:red }");
    }

    #[test]
    fn test_inserts_on_removed_text_are_dropped() {
        let mut edit = SourceEdit::new("abcdef");
        edit.append_left(3, "!");
        edit.prepend_right(4, "?");
        edit.remove(2, 5);
        assert_eq!(edit.to_string(), "abf");
    }

    #[test]
    fn test_overwrite_drops_inner_inserts() {
        let mut edit = SourceEdit::new("a, b, c");
        edit.append_left(4, ".s");
        edit.overwrite(1, 6, ",");
        assert_eq!(edit.to_string(), "a,c");
    }

    #[test]
    fn test_mappings_track_lines() {
        let mut edit = SourceEdit::new("a\n  b");
        edit.remove(1, 4);
        let (code, mappings) = edit.render();
        assert_eq!(code, "ab");
        assert_eq!(
            mappings,
            vec![
                Mapping { generated_line: 0, generated_column: 0, original_offset: 0 },
                Mapping { generated_line: 0, generated_column: 1, original_offset: 4 },
            ]
        );
    }

    #[test]
    fn test_generated_map_is_v3_json() {
        let mut edit = SourceEdit::new(".a { color: red }");
        edit.append_left(2, ".svelte-x");
        let map = edit.generate_map("App.svelte", "App.css").expect("map");
        let json: serde_json::Value = serde_json::from_str(&map).expect("json");
        assert_eq!(json["version"], 3);
        assert_eq!(json["sources"][0], "App.svelte");
        assert_eq!(json["sourcesContent"][0], ".a { color: red }");
    }

    #[test]
    fn test_columns_count_utf16_units() {
        let source = ".a{content:\"😀\"}.b{}";
        let b = source.find(".b").expect(".b") as u32;
        let mut edit = SourceEdit::new(source);
        edit.append_left(2, ".x");
        edit.add_location(b);

        let (code, mappings) = edit.render();
        assert_eq!(code, ".a.x{content:\"😀\"}.b{}");
        assert!(mappings.contains(&Mapping { generated_line: 0, generated_column: 18, original_offset: b }));

        let map = edit.generate_map("App.svelte", "App.css").expect("map");
        let map = sourcemap::SourceMap::from_slice(map.as_bytes()).expect("parse map");
        let token = map.lookup_token(0, 18).expect("token");
        assert_eq!(token.get_dst_col(), 18);
        assert_eq!(token.get_src_col(), 16);
    }
}
