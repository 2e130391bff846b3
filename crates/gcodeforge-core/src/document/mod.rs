//! G-code document model
//!
//! A [`GcodeFile`] owns every [`Line`] and [`Section`] in two arenas and
//! hands out generational handles ([`LineId`], [`SectionId`]). Lines form
//! one doubly linked chain across the whole file; sections partition that
//! chain into contiguous typed runs and only record their first and last
//! line.
//!
//! Splicing is O(1). Inserting into an empty section relinks it to the
//! nearest non-empty neighbours.

pub mod line;
pub mod parser;

use std::collections::HashSet;
use std::fmt;

use slotmap::{new_key_type, SlotMap};

use crate::error::DocumentError;

pub use line::{param_precision, Line, Param, ParamValue};

new_key_type! {
    /// Stable handle to a line in a [`GcodeFile`]
    pub struct LineId;
    /// Stable handle to a section in a [`GcodeFile`]
    pub struct SectionId;
}

/// Section type given to the lines before the first type marker
pub const START_SECTION: &str = "start";

/// Section type given to layer change markers
pub const LAYER_CHANGE_SECTION: &str = "layer_change";

/// Contiguous run of lines sharing one slicer region type
#[derive(Debug, Clone)]
pub struct Section {
    kind: String,
    first: Option<LineId>,
    last: Option<LineId>,
    prev: Option<SectionId>,
    next: Option<SectionId>,
}

impl Section {
    fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            first: None,
            last: None,
            prev: None,
            next: None,
        }
    }

    /// Section type tag (`start`, `layer_change`, or a lower-cased slicer type)
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// First line, `None` when the section is empty
    pub fn first(&self) -> Option<LineId> {
        self.first
    }

    /// Last line, `None` when the section is empty
    pub fn last(&self) -> Option<LineId> {
        self.last
    }

    /// Previous section
    pub fn prev(&self) -> Option<SectionId> {
        self.prev
    }

    /// Next section
    pub fn next(&self) -> Option<SectionId> {
        self.next
    }

    /// Whether the section currently owns no lines
    pub fn is_empty(&self) -> bool {
        self.first.is_none()
    }
}

/// A parsed G-code file
#[derive(Debug, Clone)]
pub struct GcodeFile {
    lines: SlotMap<LineId, Line>,
    sections: SlotMap<SectionId, Section>,
    first_section: SectionId,
    last_section: SectionId,
}

impl GcodeFile {
    /// Create a file holding one empty `start` section
    pub fn new() -> Self {
        let mut sections = SlotMap::with_key();
        let first = sections.insert(Section::new(START_SECTION));
        Self {
            lines: SlotMap::with_key(),
            sections,
            first_section: first,
            last_section: first,
        }
    }

    /// Parse G-code text. See [`parser::parse`].
    pub fn parse(text: &str) -> Self {
        parser::parse(text)
    }

    /// Append a new empty section at the end of the file
    pub fn push_section(&mut self, kind: impl Into<String>) -> SectionId {
        let mut section = Section::new(kind);
        section.prev = Some(self.last_section);
        let id = self.sections.insert(section);
        self.sections[self.last_section].next = Some(id);
        self.last_section = id;
        id
    }

    /// Append a line at the end of a section
    pub fn push_line(&mut self, section: SectionId, line: Line) -> LineId {
        let place = self.sections[section].last;
        self.insert_after(section, place, line)
    }

    /// Look up a line. Panics on a stale handle.
    pub fn line(&self, id: LineId) -> &Line {
        &self.lines[id]
    }

    /// Look up a line mutably. Panics on a stale handle.
    pub fn line_mut(&mut self, id: LineId) -> &mut Line {
        &mut self.lines[id]
    }

    /// Whether a handle still refers to a stored line
    pub fn contains_line(&self, id: LineId) -> bool {
        self.lines.contains_key(id)
    }

    /// Look up a section. Panics on a stale handle.
    pub fn section(&self, id: SectionId) -> &Section {
        &self.sections[id]
    }

    /// Number of lines stored in the file
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Number of sections, including empty ones
    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    /// First section in the file
    pub fn first_section(&self) -> SectionId {
        self.first_section
    }

    /// Last section in the file
    pub fn last_section(&self) -> SectionId {
        self.last_section
    }

    /// Next line in the file
    pub fn next(&self, id: LineId) -> Option<LineId> {
        self.lines[id].next
    }

    /// Previous line in the file
    pub fn prev(&self, id: LineId) -> Option<LineId> {
        self.lines[id].prev
    }

    /// Section owning a line. Panics if the line is detached.
    pub fn section_of(&self, id: LineId) -> SectionId {
        match self.lines[id].section {
            Some(section) => section,
            None => panic!("line {:?} is not attached to a section", id),
        }
    }

    /// First line of the first non-empty section
    pub fn first_line(&self) -> Option<LineId> {
        self.sections().find_map(|id| self.sections[id].first)
    }

    /// Last line of the last non-empty section
    pub fn last_line(&self) -> Option<LineId> {
        let mut current = Some(self.last_section);
        while let Some(id) = current {
            let section = &self.sections[id];
            if section.last.is_some() {
                return section.last;
            }
            current = section.prev;
        }
        None
    }

    /// Iterate over section handles in file order
    pub fn sections(&self) -> SectionIter<'_> {
        SectionIter {
            file: self,
            current: Some(self.first_section),
        }
    }

    /// Iterate over every line handle in file order
    pub fn lines(&self) -> LineIter<'_> {
        LineIter {
            file: self,
            current: self.first_line(),
            last: None,
        }
    }

    /// Iterate over the lines owned by one section
    pub fn section_lines(&self, section: SectionId) -> LineIter<'_> {
        let section = &self.sections[section];
        LineIter {
            file: self,
            current: section.first,
            last: section.last,
        }
    }

    /// Insert `line` before `place` within `section`.
    ///
    /// `place = None` means the section is empty; the line becomes its only
    /// line and is linked to the neighbouring sections.
    pub fn insert_before(
        &mut self,
        section: SectionId,
        place: Option<LineId>,
        mut line: Line,
    ) -> LineId {
        line.section = Some(section);

        let Some(place) = place else {
            return self.init_section(section, line);
        };
        debug_assert_eq!(
            self.lines[place].section,
            Some(section),
            "insert place is not in the target section"
        );

        let current_prev = self.lines[place].prev;
        line.prev = current_prev;
        line.next = Some(place);
        let id = self.lines.insert(line);

        self.lines[place].prev = Some(id);
        if let Some(prev) = current_prev {
            self.lines[prev].next = Some(id);
        }

        let section = &mut self.sections[section];
        if section.first == Some(place) {
            section.first = Some(id);
        }
        id
    }

    /// Insert `line` after `place` within `section`.
    ///
    /// `place = None` means the section is empty; see [`Self::insert_before`].
    pub fn insert_after(
        &mut self,
        section: SectionId,
        place: Option<LineId>,
        mut line: Line,
    ) -> LineId {
        line.section = Some(section);

        let Some(place) = place else {
            return self.init_section(section, line);
        };
        debug_assert_eq!(
            self.lines[place].section,
            Some(section),
            "insert place is not in the target section"
        );

        let current_next = self.lines[place].next;
        line.prev = Some(place);
        line.next = current_next;
        let id = self.lines.insert(line);

        self.lines[place].next = Some(id);
        if let Some(next) = current_next {
            self.lines[next].prev = Some(id);
        }

        let section = &mut self.sections[section];
        if section.last == Some(place) {
            section.last = Some(id);
        }
        id
    }

    /// Unlink a line from its section and return it detached.
    pub fn remove(&mut self, section: SectionId, id: LineId) -> Line {
        debug_assert_eq!(
            self.lines[id].section,
            Some(section),
            "removed line is not in the given section"
        );

        let mut line = self.lines.remove(id).unwrap_or_else(|| {
            panic!("line {:?} was already removed", id);
        });

        let owner = &mut self.sections[section];
        if owner.first == Some(id) && owner.last == Some(id) {
            owner.first = None;
            owner.last = None;
        } else if owner.first == Some(id) {
            owner.first = line.next;
        } else if owner.last == Some(id) {
            owner.last = line.prev;
        }

        if let Some(prev) = line.prev {
            self.lines[prev].next = line.next;
        }
        if let Some(next) = line.next {
            self.lines[next].prev = line.prev;
        }

        line.prev = None;
        line.next = None;
        line.section = None;
        line
    }

    fn init_section(&mut self, section: SectionId, mut line: Line) -> LineId {
        debug_assert!(
            self.sections[section].is_empty(),
            "place may only be omitted for an empty section"
        );

        let before = self.neighbour_line(section, |s| s.prev, |s| s.last);
        let after = self.neighbour_line(section, |s| s.next, |s| s.first);

        line.prev = before;
        line.next = after;
        let id = self.lines.insert(line);

        if let Some(before) = before {
            self.lines[before].next = Some(id);
        }
        if let Some(after) = after {
            self.lines[after].prev = Some(id);
        }

        let section = &mut self.sections[section];
        section.first = Some(id);
        section.last = Some(id);
        id
    }

    /// Nearest line in the neighbouring non-empty section in one direction
    fn neighbour_line(
        &self,
        section: SectionId,
        step: impl Fn(&Section) -> Option<SectionId>,
        edge: impl Fn(&Section) -> Option<LineId>,
    ) -> Option<LineId> {
        let mut current = step(&self.sections[section]);
        while let Some(id) = current {
            let neighbour = &self.sections[id];
            if let Some(line) = edge(neighbour) {
                return Some(line);
            }
            current = step(neighbour);
        }
        None
    }

    /// Check that the line chain and section bookkeeping agree.
    ///
    /// Every section's first..last range must be reachable with each line
    /// owned by that section, neighbouring links must be mutual, and the
    /// file-wide walk must visit every stored line exactly once.
    pub fn validate_links(&self) -> Result<(), DocumentError> {
        let mut expected_next: Option<LineId> = self.first_line();

        for section_id in self.sections() {
            let section = &self.sections[section_id];
            let (Some(first), Some(last)) = (section.first, section.last) else {
                if section.first.is_some() || section.last.is_some() {
                    return Err(DocumentError::BrokenSection {
                        section: format!("{:?}", section_id),
                        kind: section.kind.clone(),
                    });
                }
                continue;
            };

            if expected_next != Some(first) {
                return Err(DocumentError::BrokenLink {
                    line: format!("{:?}", first),
                    reason: "section does not start where the previous section ended".into(),
                });
            }

            let mut current = first;
            loop {
                let line = self.lines.get(current).ok_or_else(|| DocumentError::BrokenSection {
                    section: format!("{:?}", section_id),
                    kind: section.kind.clone(),
                })?;

                if line.section != Some(section_id) {
                    return Err(DocumentError::OwnerMismatch {
                        line: format!("{:?}", current),
                        owner: format!("{:?}", line.section),
                        found: format!("{:?}", section_id),
                    });
                }

                if let Some(next) = line.next {
                    if self.lines.get(next).and_then(|n| n.prev) != Some(current) {
                        return Err(DocumentError::BrokenLink {
                            line: format!("{:?}", current),
                            reason: "next line does not link back".into(),
                        });
                    }
                }

                if current == last {
                    expected_next = line.next;
                    break;
                }

                current = line.next.ok_or_else(|| DocumentError::BrokenSection {
                    section: format!("{:?}", section_id),
                    kind: section.kind.clone(),
                })?;
            }
        }

        if expected_next.is_some() {
            return Err(DocumentError::BrokenLink {
                line: format!("{:?}", expected_next),
                reason: "chain continues past the last section".into(),
            });
        }

        let mut seen = HashSet::with_capacity(self.lines.len());
        for id in self.lines() {
            if !seen.insert(id) {
                return Err(DocumentError::BrokenLink {
                    line: format!("{:?}", id),
                    reason: "line chain contains a cycle".into(),
                });
            }
        }
        if seen.len() != self.lines.len() {
            return Err(DocumentError::LineCountMismatch {
                visited: seen.len(),
                stored: self.lines.len(),
            });
        }

        Ok(())
    }
}

impl Default for GcodeFile {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GcodeFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for id in self.lines() {
            writeln!(f, "{}", self.lines[id])?;
        }
        Ok(())
    }
}

/// Iterator over section handles
pub struct SectionIter<'a> {
    file: &'a GcodeFile,
    current: Option<SectionId>,
}

impl Iterator for SectionIter<'_> {
    type Item = SectionId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.current?;
        self.current = self.file.sections[id].next;
        Some(id)
    }
}

/// Iterator over line handles, optionally bounded by an inclusive last line
pub struct LineIter<'a> {
    file: &'a GcodeFile,
    current: Option<LineId>,
    last: Option<LineId>,
}

impl Iterator for LineIter<'_> {
    type Item = LineId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.current?;
        self.current = if Some(id) == self.last {
            None
        } else {
            self.file.lines[id].next
        };
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_of(file: &GcodeFile, ids: impl Iterator<Item = LineId>) -> Vec<String> {
        ids.map(|id| file.line(id).to_string()).collect()
    }

    #[test]
    fn test_new_file_has_empty_start_section() {
        let file = GcodeFile::new();
        assert_eq!(file.section(file.first_section()).kind(), START_SECTION);
        assert!(file.section(file.first_section()).is_empty());
        assert_eq!(file.first_line(), None);
        assert_eq!(file.to_string(), "");
        assert!(file.validate_links().is_ok());
    }

    #[test]
    fn test_insert_into_empty_section_links_neighbours() {
        let mut file = GcodeFile::new();
        let start = file.first_section();
        let middle = file.push_section("skirt");
        let end = file.push_section("outer wall");

        file.push_line(start, Line::parse("G90"));
        file.push_line(end, Line::parse("G1 X1 E1"));
        let inserted = file.insert_before(middle, None, Line::parse("M83"));

        assert_eq!(file.section(middle).first(), Some(inserted));
        assert_eq!(file.section(middle).last(), Some(inserted));
        assert_eq!(
            text_of(&file, file.lines()),
            vec!["G90", "M83", "G1 X1.000 E1.00000"]
        );
        assert!(file.validate_links().is_ok());
    }

    #[test]
    fn test_insert_before_and_after_update_bounds() {
        let mut file = GcodeFile::new();
        let section = file.first_section();
        let middle = file.push_line(section, Line::parse("G1 X2"));
        let first = file.insert_before(section, Some(middle), Line::parse("G1 X1"));
        let last = file.insert_after(section, Some(middle), Line::parse("G1 X3"));

        assert_eq!(file.section(section).first(), Some(first));
        assert_eq!(file.section(section).last(), Some(last));
        assert_eq!(file.next(first), Some(middle));
        assert_eq!(file.prev(last), Some(middle));
        assert!(file.validate_links().is_ok());
    }

    #[test]
    fn test_remove_first_last_and_only() {
        let mut file = GcodeFile::new();
        let section = file.first_section();
        let a = file.push_line(section, Line::parse("G1 X1"));
        let b = file.push_line(section, Line::parse("G1 X2"));
        let c = file.push_line(section, Line::parse("G1 X3"));

        let removed = file.remove(section, a);
        assert_eq!(removed.number('X'), Some(1.0));
        assert_eq!(removed.prev(), None);
        assert_eq!(file.section(section).first(), Some(b));
        assert_eq!(file.prev(b), None);

        file.remove(section, c);
        assert_eq!(file.section(section).last(), Some(b));
        assert_eq!(file.next(b), None);

        file.remove(section, b);
        assert!(file.section(section).is_empty());
        assert_eq!(file.line_count(), 0);
        assert!(!file.contains_line(b));
        assert!(file.validate_links().is_ok());
    }

    #[test]
    fn test_remove_emptying_middle_section_keeps_chain() {
        let mut file = GcodeFile::new();
        let start = file.first_section();
        let middle = file.push_section("skirt");
        let end = file.push_section("outer wall");
        file.push_line(start, Line::parse("G90"));
        let only = file.push_line(middle, Line::parse("M83"));
        file.push_line(end, Line::parse("G92 E0"));

        file.remove(middle, only);
        assert_eq!(text_of(&file, file.lines()), vec!["G90", "G92 E0"]);
        assert!(file.validate_links().is_ok());

        file.insert_after(middle, None, Line::parse("M82"));
        assert_eq!(text_of(&file, file.lines()), vec!["G90", "M82", "G92 E0"]);
        assert!(file.validate_links().is_ok());
    }

    #[test]
    fn test_section_lines_stop_at_section_end() {
        let mut file = GcodeFile::new();
        let start = file.first_section();
        let wall = file.push_section("outer wall");
        file.push_line(start, Line::parse("G90"));
        file.push_line(wall, Line::parse(";TYPE:Outer wall"));
        file.push_line(wall, Line::parse("G1 X1 E1"));

        assert_eq!(text_of(&file, file.section_lines(start)), vec!["G90"]);
        assert_eq!(file.section_lines(wall).count(), 2);
        assert_eq!(file.sections().count(), 2);
        assert_eq!(file.last_line(), file.section(wall).last());
    }

    #[test]
    fn test_validate_links_detects_owner_mismatch() {
        let mut file = GcodeFile::new();
        let start = file.first_section();
        let other = file.push_section("skirt");
        let line = file.push_line(start, Line::parse("G90"));
        file.line_mut(line).section = Some(other);

        assert!(matches!(
            file.validate_links(),
            Err(DocumentError::OwnerMismatch { .. })
        ));
    }
}
