//! Post-edit normalization.
//!
//! Every command and formatter operation ends here. The passes run in a fixed
//! order because later ones rely on earlier ones:
//!
//! 1. drop empty annotations and placeholders that lost their character
//! 2. split inline annotations at line separators, then merge same-kind runs
//! 3. split list items at freshly typed separators
//! 4. snap block annotations to whole lines, one heading per line
//! 5. collapse duplicate blocks, recompute nesting, drop orphan list items
//! 6. add or remove the end-of-buffer marker

use std::cmp::Reverse;
use std::collections::HashSet;

use super::annotation::{Annotation, AnnotationKind, HeadingLevel};
use super::document::Document;
use super::lines::{is_line_start, line_end, line_spans_in, line_start};
use super::span::Span;
use super::{END_OF_BUFFER_MARKER, OBJECT_REPLACEMENT};

impl Document {
    pub(crate) fn normalize(&mut self) {
        self.normalize_with_breaks(&[]);
    }

    /// `breaks` are offsets of line separators inserted by the edit being
    /// normalized.
    pub(crate) fn normalize_with_breaks(&mut self, breaks: &[usize]) {
        let text = self.text();
        self.annotations.retain(|a| !a.span.is_empty());
        self.fit_placeholders(&text);
        self.split_inline_lines(&text);
        self.merge_runs(|a| a.kind.is_inline(), true);
        self.split_list_items(breaks);
        self.snap_blocks(&text);
        self.split_headings(&text, breaks);
        self.dedupe_blocks();
        self.recompute_nesting();
        self.sync_end_marker();
    }

    fn fit_placeholders(&mut self, text: &str) {
        let width = OBJECT_REPLACEMENT.len_utf8();
        self.annotations.retain(|a| {
            if !a.kind.is_placeholder() {
                return true;
            }
            let fits = a.span.len() == width
                && text
                    .get(a.span.as_range())
                    .is_some_and(|s| s.starts_with(OBJECT_REPLACEMENT));
            if !fits {
                log::warn!("dropping {:?} that no longer covers its placeholder", a.kind);
            }
            fits
        });
    }

    fn split_inline_lines(&mut self, text: &str) {
        let mut extra = Vec::new();
        let mut splits = Vec::new();
        for (index, annotation) in self.annotations.iter().enumerate() {
            if !annotation.kind.is_inline() {
                continue;
            }
            let Some(slice) = text.get(annotation.span.as_range()) else {
                continue;
            };
            if !slice.contains('\n') {
                continue;
            }
            let mut runs = Vec::new();
            let mut start = annotation.span.start;
            for (i, _) in slice.match_indices('\n') {
                let at = annotation.span.start + i;
                runs.push(Span::new(start, at));
                start = at + 1;
            }
            runs.push(Span::new(start, annotation.span.end));
            runs.retain(|r| !r.is_empty());
            splits.push((index, runs));
        }

        for (index, runs) in splits {
            let mut runs = runs.into_iter();
            let first = runs.next().unwrap_or_default();
            for run in runs {
                let id = self.next_annotation_id();
                let template = &self.annotations[index];
                let mut piece = Annotation::new(id, template.kind.clone(), run, template.attributes.clone());
                piece.display = template.display.clone();
                extra.push(piece);
            }
            self.annotations[index].span = first;
        }
        self.annotations.extend(extra);
        self.annotations.retain(|a| !a.span.is_empty());
    }

    fn split_list_items(&mut self, breaks: &[usize]) {
        for &at in breaks {
            let innermost = self
                .annotations
                .iter()
                .enumerate()
                .filter(|(_, a)| {
                    a.kind == AnnotationKind::ListItem && a.span.start <= at && at + 1 < a.span.end
                })
                .max_by_key(|(_, a)| (a.nesting_level, a.span.start))
                .map(|(i, _)| i);
            let Some(index) = innermost else {
                continue;
            };
            let tail = Span::new(at + 1, self.annotations[index].span.end);
            self.annotations[index].span.end = at + 1;
            let id = self.next_annotation_id();
            let template = &self.annotations[index];
            let mut item = Annotation::new(id, AnnotationKind::ListItem, tail, template.attributes.clone());
            item.nesting_level = template.nesting_level;
            self.annotations.push(item);
        }
    }

    fn snap_blocks(&mut self, text: &str) {
        for annotation in &mut self.annotations {
            if !annotation.kind.is_block() {
                continue;
            }
            let Span { start, end } = annotation.span;
            let snapped_end = if end == text.len() || is_line_start(text, end) {
                end
            } else {
                line_end(text, end)
            };
            annotation.span = Span::new(line_start(text, start), snapped_end);
        }
    }

    fn split_headings(&mut self, text: &str, breaks: &[usize]) {
        let mut extra = Vec::new();
        let mut firsts = Vec::new();
        for (index, annotation) in self.annotations.iter().enumerate() {
            if !matches!(annotation.kind, AnnotationKind::Heading(_)) {
                continue;
            }
            let lines = line_spans_in(text, annotation.span);
            if lines.len() <= 1 {
                continue;
            }
            firsts.push((index, lines[0]));
            for line in lines.into_iter().skip(1) {
                // Enter at the end of a heading leaves the new empty line plain.
                let typed_break = line.start > 0 && breaks.contains(&(line.start - 1));
                if typed_break && is_blank_line(text, line) {
                    continue;
                }
                extra.push((annotation.kind.clone(), line, annotation.attributes.clone()));
            }
        }
        for (index, line) in firsts {
            self.annotations[index].span = line;
        }
        for (kind, line, attributes) in extra {
            let id = self.next_annotation_id();
            self.annotations.push(Annotation::new(id, kind, line, attributes));
        }
    }

    fn dedupe_blocks(&mut self) {
        let mut seen: HashSet<(AnnotationKind, Span, Option<usize>)> = HashSet::new();
        self.annotations.retain(|a| {
            if !a.kind.is_block() {
                return true;
            }
            // One heading per line whatever the level.
            let key = match a.kind {
                AnnotationKind::Heading(_) => (AnnotationKind::Heading(HeadingLevel::ALL[0]), a.span, None),
                _ => (a.kind.clone(), a.span, a.nesting_level),
            };
            seen.insert(key)
        });
    }

    /// Assigns nesting levels from containment and drops list items that no
    /// longer sit directly inside a list.
    pub(crate) fn recompute_nesting(&mut self) {
        let mut order: Vec<usize> = (0..self.annotations.len())
            .filter(|&i| self.annotations[i].kind.is_block())
            .collect();
        order.sort_by_key(|&i| {
            let a = &self.annotations[i];
            (
                a.span.start,
                Reverse(a.span.end),
                a.nesting_level.unwrap_or(0),
                a.kind.block_rank(),
                a.id,
            )
        });

        let mut orphans = vec![false; self.annotations.len()];
        let mut stack: Vec<usize> = Vec::new();
        for i in order {
            let span = self.annotations[i].span;
            while let Some(&top) = stack.last() {
                if self.annotations[top].span.contains_span(span) {
                    break;
                }
                stack.pop();
            }
            let parent_is_list = stack
                .last()
                .is_some_and(|&top| self.annotations[top].kind.is_list());
            if self.annotations[i].kind == AnnotationKind::ListItem && !parent_is_list {
                log::debug!("dropping list item at {span:?} outside of a list");
                orphans[i] = true;
                continue;
            }
            self.annotations[i].nesting_level = Some(stack.len());
            stack.push(i);
        }

        let mut index = 0;
        self.annotations.retain(|_| {
            let keep = !orphans[index];
            index += 1;
            keep
        });
    }

    /// Keeps the end marker present exactly while a block annotation covers an
    /// unterminated last line.
    pub(crate) fn sync_end_marker(&mut self) {
        let len = self.len();
        let block_at_end = self
            .annotations
            .iter()
            .any(|a| a.kind.is_block() && a.span.end == len && !a.span.is_empty());
        if self.has_end_marker() {
            if !block_at_end {
                self.remove_end_marker();
            }
        } else if block_at_end && len > 0 && !self.text().ends_with('\n') {
            self.append_end_marker();
        }
    }
}

/// True for a line holding nothing but its separator or the end marker.
fn is_blank_line(text: &str, line: Span) -> bool {
    text.get(line.as_range())
        .is_some_and(|s| s.trim_end_matches(['\n', END_OF_BUFFER_MARKER]).is_empty())
}
