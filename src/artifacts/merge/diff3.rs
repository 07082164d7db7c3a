//! Line-based three-way merge
//!
//! Both sides are diffed against the base with Myers' algorithm. Walking the
//! three files in step, runs of lines that match in all of them are stable;
//! the stretches between stable runs become chunks, each taken from whichever
//! side changed it, or reported as a conflict when both sides did.

use crate::artifacts::diff::myers::MyersDiff;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Chunk<'l> {
    Clean(Vec<&'l [u8]>),
    Conflict {
        ours: Vec<&'l [u8]>,
        theirs: Vec<&'l [u8]>,
    },
}

/// Result of merging the content of one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedText {
    pub content: Vec<u8>,
    pub conflicted: bool,
}

pub fn split_lines(content: &[u8]) -> Vec<&[u8]> {
    content.split_inclusive(|&byte| byte == b'\n').collect()
}

/// Merge `ours` and `theirs` against `base`, writing conflict markers named
/// after the two labels where both sides changed the same lines
pub fn merge(
    base: &[u8],
    ours: &[u8],
    theirs: &[u8],
    ours_label: &str,
    theirs_label: &str,
) -> MergedText {
    let base = split_lines(base);
    let ours = split_lines(ours);
    let theirs = split_lines(theirs);

    let chunks = Diff3::new(&base, &ours, &theirs).chunks();
    let conflicted = chunks
        .iter()
        .any(|chunk| matches!(chunk, Chunk::Conflict { .. }));

    let mut content = Vec::new();
    for chunk in chunks {
        match chunk {
            Chunk::Clean(lines) => lines.iter().for_each(|line| content.extend_from_slice(line)),
            Chunk::Conflict { ours, theirs } => {
                write_marker(&mut content, "<<<<<<<", Some(ours_label));
                write_lines(&mut content, &ours);
                write_marker(&mut content, "=======", None);
                write_lines(&mut content, &theirs);
                write_marker(&mut content, ">>>>>>>", Some(theirs_label));
            }
        }
    }

    MergedText {
        content,
        conflicted,
    }
}

fn write_marker(content: &mut Vec<u8>, marker: &str, label: Option<&str>) {
    content.extend_from_slice(marker.as_bytes());
    if let Some(label) = label {
        content.push(b' ');
        content.extend_from_slice(label.as_bytes());
    }
    content.push(b'\n');
}

fn write_lines(content: &mut Vec<u8>, lines: &[&[u8]]) {
    for line in lines {
        content.extend_from_slice(line);
    }
    if content.last().is_some_and(|byte| *byte != b'\n') {
        content.push(b'\n');
    }
}

struct Diff3<'l, 'f> {
    base: &'f [&'l [u8]],
    ours: &'f [&'l [u8]],
    theirs: &'f [&'l [u8]],
    /// base line index -> matching line index on each side
    match_ours: HashMap<usize, usize>,
    match_theirs: HashMap<usize, usize>,
    line_base: usize,
    line_ours: usize,
    line_theirs: usize,
    chunks: Vec<Chunk<'l>>,
}

impl<'l, 'f> Diff3<'l, 'f> {
    fn new(base: &'f [&'l [u8]], ours: &'f [&'l [u8]], theirs: &'f [&'l [u8]]) -> Self {
        let match_ours = MyersDiff::new(base, ours).matches().into_iter().collect();
        let match_theirs = MyersDiff::new(base, theirs).matches().into_iter().collect();

        Self {
            base,
            ours,
            theirs,
            match_ours,
            match_theirs,
            line_base: 0,
            line_ours: 0,
            line_theirs: 0,
            chunks: Vec::new(),
        }
    }

    fn chunks(mut self) -> Vec<Chunk<'l>> {
        loop {
            match self.find_next_mismatch() {
                Some(1) => match self.find_next_match() {
                    (base, Some(ours), Some(theirs)) => self.emit_chunk(base, ours, theirs),
                    _ => break,
                },
                Some(offset) => self.emit_chunk(
                    self.line_base + offset - 1,
                    self.line_ours + offset - 1,
                    self.line_theirs + offset - 1,
                ),
                None => break,
            }
        }

        self.emit_final_chunk();
        self.chunks
    }

    // `offset` counts from 1: the line at `line_x + offset - 1` on each side
    fn in_bounds(&self, offset: usize) -> bool {
        self.line_base + offset <= self.base.len()
            || self.line_ours + offset <= self.ours.len()
            || self.line_theirs + offset <= self.theirs.len()
    }

    fn is_match(matches: &HashMap<usize, usize>, base_line: usize, side_line: usize) -> bool {
        matches.get(&base_line) == Some(&side_line)
    }

    fn find_next_mismatch(&self) -> Option<usize> {
        let mut offset = 1;
        while self.in_bounds(offset)
            && Self::is_match(
                &self.match_ours,
                self.line_base + offset - 1,
                self.line_ours + offset - 1,
            )
            && Self::is_match(
                &self.match_theirs,
                self.line_base + offset - 1,
                self.line_theirs + offset - 1,
            )
        {
            offset += 1;
        }

        self.in_bounds(offset).then_some(offset)
    }

    fn find_next_match(&self) -> (usize, Option<usize>, Option<usize>) {
        let mut base = self.line_base;
        while base < self.base.len()
            && !(self.match_ours.contains_key(&base) && self.match_theirs.contains_key(&base))
        {
            base += 1;
        }

        (
            base,
            self.match_ours.get(&base).copied(),
            self.match_theirs.get(&base).copied(),
        )
    }

    fn emit_chunk(&mut self, base: usize, ours: usize, theirs: usize) {
        let (base_lines, ours_lines, theirs_lines) = (self.base, self.ours, self.theirs);
        self.write_chunk(
            &base_lines[self.line_base..base],
            &ours_lines[self.line_ours..ours],
            &theirs_lines[self.line_theirs..theirs],
        );
        (self.line_base, self.line_ours, self.line_theirs) = (base, ours, theirs);
    }

    fn emit_final_chunk(&mut self) {
        let (base_lines, ours_lines, theirs_lines) = (self.base, self.ours, self.theirs);
        self.write_chunk(
            &base_lines[self.line_base..],
            &ours_lines[self.line_ours..],
            &theirs_lines[self.line_theirs..],
        );
    }

    fn write_chunk(&mut self, base: &[&'l [u8]], ours: &[&'l [u8]], theirs: &[&'l [u8]]) {
        let chunk = if ours == base || ours == theirs {
            Chunk::Clean(theirs.to_vec())
        } else if theirs == base {
            Chunk::Clean(ours.to_vec())
        } else {
            Chunk::Conflict {
                ours: ours.to_vec(),
                theirs: theirs.to_vec(),
            }
        };

        if !matches!(&chunk, Chunk::Clean(lines) if lines.is_empty()) {
            self.chunks.push(chunk);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn merged(base: &str, ours: &str, theirs: &str) -> (String, bool) {
        let result = merge(
            base.as_bytes(),
            ours.as_bytes(),
            theirs.as_bytes(),
            "HEAD",
            "topic",
        );
        (String::from_utf8(result.content).unwrap(), result.conflicted)
    }

    #[rstest]
    #[case::only_ours_changed("a\nb\nc\n", "a\nB\nc\n", "a\nb\nc\n", "a\nB\nc\n")]
    #[case::only_theirs_changed("a\nb\nc\n", "a\nb\nc\n", "a\nb\nC\n", "a\nb\nC\n")]
    #[case::disjoint_changes("a\nb\nc\nd\ne\n", "A\nb\nc\nd\ne\n", "a\nb\nc\nd\nE\n", "A\nb\nc\nd\nE\n")]
    #[case::same_change_on_both_sides("a\nb\n", "a\nX\n", "a\nX\n", "a\nX\n")]
    #[case::insertions_at_both_ends("m\n", "top\nm\n", "m\nbottom\n", "top\nm\nbottom\n")]
    fn clean_merges(
        #[case] base: &str,
        #[case] ours: &str,
        #[case] theirs: &str,
        #[case] expected: &str,
    ) {
        assert_eq!(merged(base, ours, theirs), (expected.to_string(), false));
    }

    #[test]
    fn overlapping_changes_get_markers() {
        let (content, conflicted) = merged("a\nb\nc\n", "a\nours\nc\n", "a\ntheirs\nc\n");

        assert!(conflicted);
        assert_eq!(
            content,
            "a\n<<<<<<< HEAD\nours\n=======\ntheirs\n>>>>>>> topic\nc\n"
        );
    }

    #[test]
    fn added_on_both_sides_without_base() {
        let (content, conflicted) = merged("", "one", "two");

        assert!(conflicted);
        assert_eq!(content, "<<<<<<< HEAD\none\n=======\ntwo\n>>>>>>> topic\n");
    }
}
