//! The layered dictionary.
//!
//! Words live in segments. Each segment is an append-only list of words with
//! a numeric offset, chained to the segment it extends. A word's [`Code`] is
//! its segment's offset plus its index, and codes are handed out from a
//! single counter, so they are unique across the whole arena and never
//! reused.
//!
//! Name lookups start at a segment and walk toward the root, newest entry
//! first, so a redefinition (or a definition in a child segment) shadows
//! older words without touching them. Older words stay reachable by code.

use alloc::{vec, vec::Vec};
use core::fmt::Write;

use crate::{
    fastr::{Name, NameRef},
    word::{Cell, Code, Flags, SegmentId, Word, WordFunc, WordKind, WordRef},
    Error, ReplaceErr,
};

pub struct Segment<T: 'static> {
    offset: u32,
    entries: Vec<Word<T>>,
    parent: Option<SegmentId>,
}

impl<T: 'static> Segment<T> {
    pub fn offset(&self) -> Code {
        Code::new(self.offset)
    }

    pub fn parent(&self) -> Option<SegmentId> {
        self.parent
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn words(&self) -> impl Iterator<Item = &Word<T>> {
        self.entries.iter()
    }
}

/// The result of resolving a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved {
    Literal(Cell),
    Word(Code, WordRef),
}

pub struct Dictionary<T: 'static> {
    segments: Vec<Segment<T>>,
    active: SegmentId,
    next_code: u32,
    latest: Option<Code>,
}

impl<T: 'static> Default for Dictionary<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses `token` as a signed integer in radix `base`.
///
/// Bases outside of `2..=36` never parse.
pub fn parse_number(token: &str, base: Cell) -> Option<Cell> {
    let radix = u32::try_from(base)
        .ok()
        .filter(|radix| (2..=36).contains(radix))?;
    Cell::from_str_radix(token, radix).ok()
}

impl<T: 'static> Dictionary<T> {
    pub const ROOT: SegmentId = SegmentId(0);

    /// Creates a dictionary holding a single, empty root segment.
    pub fn new() -> Self {
        Self {
            segments: vec![Segment {
                offset: 0,
                entries: Vec::new(),
                parent: None,
            }],
            active: Self::ROOT,
            next_code: 0,
            latest: None,
        }
    }

    /// The segment new definitions are appended to.
    pub fn active(&self) -> SegmentId {
        self.active
    }

    pub fn segment(&self, id: SegmentId) -> Option<&Segment<T>> {
        self.segments.get(id.0)
    }

    /// The code the next definition will get.
    pub fn next_code(&self) -> Code {
        Code::new(self.next_code)
    }

    /// The most recently defined word, in any segment.
    pub fn latest(&self) -> Option<Code> {
        self.latest
    }

    /// Pushes a new segment on top of `parent` and makes it the active one.
    ///
    /// `parent` and everything it can see stay untouched, and all existing
    /// codes stay valid.
    pub fn extend(&mut self, parent: SegmentId) -> Result<SegmentId, Error> {
        if self.segment(parent).is_none() {
            return Err(Error::UnknownSegment);
        }
        let id = SegmentId(self.segments.len());
        self.segments.push(Segment {
            offset: self.next_code,
            entries: Vec::new(),
            parent: Some(parent),
        });
        self.active = id;
        tracing::debug!(segment = id.0, parent = parent.0, offset = self.next_code, "extended dictionary");
        Ok(id)
    }

    pub fn define_native(
        &mut self,
        name: &str,
        func: WordFunc<T>,
        min_depth: u8,
        flags: Flags,
    ) -> Result<WordRef, Error> {
        self.append(Word {
            name: Name::new(name),
            flags,
            kind: WordKind::Native { func, min_depth },
        })
    }

    /// Defines a compiled word from a list of tokens.
    ///
    /// Every token is resolved against the chain as it is right now, so a
    /// definition can't refer to itself (it would find an older word of the
    /// same name, or nothing). Numbers compile to `LIT n`, and the body is
    /// wrapped in `DOCOL ... EXIT`.
    pub fn define_compiled<'a, I>(&mut self, name: &str, tokens: I, base: Cell) -> Result<WordRef, Error>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut body = vec![Code::DOCOL.as_cell()];
        for token in tokens {
            match self.resolve_name(token, base)? {
                Resolved::Literal(val) => body.extend([Code::LIT.as_cell(), val]),
                Resolved::Word(code, _) => body.push(code.as_cell()),
            }
        }
        body.push(Code::EXIT.as_cell());
        self.define_body(name, body)
    }

    /// Appends an already assembled body.
    pub(crate) fn define_body(&mut self, name: &str, body: Vec<Cell>) -> Result<WordRef, Error> {
        self.append(Word {
            name: Name::new(name),
            flags: Flags::NONE,
            kind: WordKind::Compiled { body },
        })
    }

    fn append(&mut self, word: Word<T>) -> Result<WordRef, Error> {
        let code = self.next_code;
        self.next_code = code.checked_add(1).ok_or(Error::DictionaryFull)?;
        let segment = &mut self.segments[self.active.0];
        segment.entries.push(word);
        self.latest = Some(Code::new(code));
        Ok(WordRef {
            segment: self.active,
            index: segment.entries.len() - 1,
        })
    }

    /// Numbers first, then the newest visible word of that name.
    pub fn resolve_name(&self, token: &str, base: Cell) -> Result<Resolved, Error> {
        if let Some(val) = parse_number(token, base) {
            return Ok(Resolved::Literal(val));
        }
        self.find(token)
            .map(|(code, wr)| Resolved::Word(code, wr))
            .ok_or_else(|| Error::UndefinedWord(token.into()))
    }

    /// Finds the newest visible word named `name`, starting at the active
    /// segment.
    pub fn find(&self, name: &str) -> Option<(Code, WordRef)> {
        self.find_from(self.active, name)
    }

    pub fn find_from(&self, segment: SegmentId, name: &str) -> Option<(Code, WordRef)> {
        let name = NameRef::new(name);
        let mut cur = Some(segment);
        while let Some(id) = cur.take() {
            let seg = self.segment(id)?;
            let found = seg
                .entries
                .iter()
                .enumerate()
                .rev()
                .find(|(_, word)| !word.flags.is_hidden() && word.name.matches(&name));
            if let Some((index, _)) = found {
                return Some((
                    Code::new(seg.offset + index as u32),
                    WordRef { segment: id, index },
                ));
            }
            cur = seg.parent;
        }
        None
    }

    /// Translates a code back into its word, looking only at `segment` and
    /// its ancestors.
    pub fn resolve_code(&self, segment: SegmentId, code: Cell) -> Result<(Code, WordRef), Error> {
        let raw = u32::try_from(code).replace_err(Error::InvalidCode(code))?;
        if raw >= self.next_code {
            return Err(Error::InvalidCode(code));
        }
        let mut cur = Some(segment);
        while let Some(id) = cur.take() {
            let seg = self.segment(id).ok_or(Error::UnknownSegment)?;
            if raw >= seg.offset {
                let index = (raw - seg.offset) as usize;
                return match seg.entries.get(index) {
                    Some(_) => Ok((Code::new(raw), WordRef { segment: id, index })),
                    // Owned by a segment outside of this chain.
                    None => Err(Error::InvalidCode(code)),
                };
            }
            cur = seg.parent;
        }
        Err(Error::InvalidCode(code))
    }

    /// Translates any assigned code back into its word, whichever segment
    /// owns it.
    pub fn resolve_code_any(&self, code: Cell) -> Result<(Code, WordRef), Error> {
        let raw = u32::try_from(code).replace_err(Error::InvalidCode(code))?;
        self.segments
            .iter()
            .enumerate()
            .find_map(|(id, seg)| {
                let index = raw.checked_sub(seg.offset)? as usize;
                seg.entries.get(index)?;
                Some((Code::new(raw), WordRef { segment: SegmentId(id), index }))
            })
            .ok_or(Error::InvalidCode(code))
    }

    pub fn word(&self, wr: WordRef) -> &Word<T> {
        &self.segments[wr.segment.0].entries[wr.index]
    }

    pub fn body(&self, wr: WordRef) -> Option<&[Cell]> {
        self.segment(wr.segment)
            .and_then(|seg| seg.entries.get(wr.index))
            .and_then(Word::body)
    }

    pub fn code_of(&self, wr: WordRef) -> Code {
        Code::new(self.segments[wr.segment.0].offset + wr.index as u32)
    }

    pub fn toggle_hidden(&mut self, code: Cell) -> Result<(), Error> {
        self.toggle(code, Flags::HIDDEN)
    }

    pub fn toggle_immediate(&mut self, code: Cell) -> Result<(), Error> {
        self.toggle(code, Flags::IMMEDIATE)
    }

    fn toggle(&mut self, code: Cell, flag: Flags) -> Result<(), Error> {
        let (_, wr) = self.resolve_code(self.active, code)?;
        self.segments[wr.segment.0].entries[wr.index]
            .flags
            .toggle(flag);
        Ok(())
    }

    /// Names visible from the active segment, newest first. Shadowed and
    /// hidden words are left out.
    pub fn visible_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        let mut cur = Some(self.active);
        while let Some(id) = cur.take() {
            let Some(seg) = self.segment(id) else { break };
            for word in seg.entries.iter().rev() {
                let name = word.name.as_str();
                if !word.flags.is_hidden() && !names.contains(&name) {
                    names.push(name);
                }
            }
            cur = seg.parent;
        }
        names
    }

    /// Writes a word's body back out as source, up to its return marker.
    pub fn see<W: Write>(&self, wr: WordRef, out: &mut W) -> Result<(), Error> {
        let word = self.word(wr);
        write!(out, ": {}", word.name)?;
        match &word.kind {
            WordKind::Native { .. } => out.write_str(" <native>")?,
            WordKind::Compiled { body } => {
                let mut idx = usize::from(body.first() == Some(&Code::DOCOL.as_cell()));
                while let Some(&cell) = body.get(idx) {
                    idx += 1;
                    if cell == Code::EXIT.as_cell() {
                        break;
                    }
                    let Ok((code, callee)) = self.resolve_code(wr.segment, cell) else {
                        write!(out, " {cell}")?;
                        continue;
                    };
                    let operands = match code {
                        Code::LIT => {
                            if let Some(val) = body.get(idx) {
                                write!(out, " {val}")?;
                            }
                            idx += 1;
                            continue;
                        }
                        Code::BRANCH | Code::ZBRANCH => 1,
                        Code::LITSTRING => 2,
                        _ => 0,
                    };
                    write!(out, " {}", self.word(callee).name)?;
                    for val in body.iter().skip(idx).take(operands) {
                        write!(out, " {val}")?;
                    }
                    idx += operands;
                }
            }
        }
        out.write_str(" ;")?;
        if word.flags.is_immediate() {
            out.write_str(" IMMEDIATE")?;
        }
        out.write_str("\n")?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use alloc::string::String;

    use super::{parse_number, Dictionary, Resolved};
    use crate::{
        word::{Cell, Code, Flags},
        Error, Forth,
    };

    fn nop(_: &mut Forth<()>) -> Result<(), Error> {
        Ok(())
    }

    /// A root segment with the marker natives at their fixed codes, plus
    /// `DUP` and `+`.
    fn base_dict() -> Dictionary<()> {
        let mut dict = Dictionary::new();
        for name in ["DOCOL", "EXIT", "LIT", "LITSTRING", "TELL", "BRANCH", "0BRANCH", "DUP", "+"] {
            dict.define_native(name, nop, 0, Flags::NONE).unwrap();
        }
        dict
    }

    #[test]
    fn numbers() {
        assert_eq!(parse_number("42", 10), Some(42));
        assert_eq!(parse_number("-42", 10), Some(-42));
        assert_eq!(parse_number("ff", 16), Some(255));
        assert_eq!(parse_number("FF", 10), None);
        assert_eq!(parse_number("101", 2), Some(5));
        assert_eq!(parse_number("1+", 10), None);
        assert_eq!(parse_number("-", 10), None);
        assert_eq!(parse_number("10", 1), None);
        assert_eq!(parse_number("10", 37), None);
        assert_eq!(parse_number("10", -10), None);
    }

    #[test]
    fn numbers_beat_names() {
        let mut dict = base_dict();
        dict.define_compiled("10", ["DUP"], 10).unwrap();
        assert_eq!(dict.resolve_name("10", 10), Ok(Resolved::Literal(10)));
        assert_eq!(dict.resolve_name("10", 2), Ok(Resolved::Literal(2)));
        dict.define_compiled("ADD", ["+"], 10).unwrap();
        assert_eq!(dict.resolve_name("add", 16), Ok(Resolved::Literal(0xADD)));
        assert!(matches!(dict.resolve_name("add", 10), Ok(Resolved::Word(..))));
    }

    #[test]
    fn define_compiled_body() {
        let mut dict = base_dict();
        let wr = dict.define_compiled("double", ["dup", "+"], 10).unwrap();
        let (dup, _) = dict.find("DUP").unwrap();
        let (plus, _) = dict.find("+").unwrap();
        assert_eq!(
            dict.body(wr).unwrap(),
            &[Code::DOCOL.as_cell(), dup.as_cell(), plus.as_cell(), Code::EXIT.as_cell()]
        );

        let wr = dict.define_compiled("five", ["5"], 10).unwrap();
        assert_eq!(
            dict.body(wr).unwrap(),
            &[Code::DOCOL.as_cell(), Code::LIT.as_cell(), 5, Code::EXIT.as_cell()]
        );
    }

    #[test]
    fn no_self_reference() {
        let mut dict = base_dict();
        let res = dict.define_compiled("LOOPY", ["LOOPY"], 10);
        assert_eq!(res.unwrap_err(), Error::UndefinedWord("LOOPY".into()));
        assert!(dict.find("LOOPY").is_none());

        // With an older definition, the new one calls the old one.
        let old = dict.define_compiled("TWICE", ["DUP", "+"], 10).unwrap();
        let new = dict.define_compiled("TWICE", ["TWICE", "TWICE"], 10).unwrap();
        let old_code = dict.code_of(old).as_cell();
        assert_eq!(dict.body(new).unwrap()[1..3], [old_code, old_code]);
    }

    #[test]
    fn shadowing_keeps_codes() {
        let mut dict = base_dict();
        let first = dict.define_compiled("X", ["DUP"], 10).unwrap();
        let second = dict.define_compiled("X", ["+"], 10).unwrap();
        let (code, wr) = dict.find("x").unwrap();
        assert_eq!(wr, second);
        assert_eq!(code, dict.code_of(second));

        let old = dict.code_of(first).as_cell();
        assert_eq!(dict.resolve_code(dict.active(), old), Ok((dict.code_of(first), first)));
    }

    #[test]
    fn hidden_words_are_skipped() {
        let mut dict = base_dict();
        let first = dict.define_compiled("X", ["DUP"], 10).unwrap();
        let second = dict.define_compiled("X", ["+"], 10).unwrap();
        dict.toggle_hidden(dict.code_of(second).as_cell()).unwrap();
        assert_eq!(dict.find("X").map(|(_, wr)| wr), Some(first));
        assert!(dict.resolve_code(dict.active(), dict.code_of(second).as_cell()).is_ok());
        dict.toggle_hidden(dict.code_of(second).as_cell()).unwrap();
        assert_eq!(dict.find("X").map(|(_, wr)| wr), Some(second));
    }

    #[test]
    fn segments_layer() {
        let mut dict = base_dict();
        let base = dict.define_compiled("GREET", ["DUP"], 10).unwrap();
        let root = dict.active();
        let child = dict.extend(root).unwrap();
        assert_eq!(dict.segment(child).unwrap().offset(), dict.next_code());

        let over = dict.define_compiled("GREET", ["+"], 10).unwrap();
        assert_eq!(over.segment, child);
        assert_eq!(dict.find("GREET").map(|(_, wr)| wr), Some(over));
        assert_eq!(dict.find_from(root, "GREET").map(|(_, wr)| wr), Some(base));

        // The parent chain can't see the child's codes.
        let child_code = dict.code_of(over).as_cell();
        assert_eq!(dict.resolve_code(root, child_code), Err(Error::InvalidCode(child_code)));
        assert!(dict.resolve_code(child, child_code).is_ok());

        // Hiding the child's word uncovers the parent's again.
        dict.toggle_hidden(child_code).unwrap();
        assert_eq!(dict.find("GREET").map(|(_, wr)| wr), Some(base));

        assert_eq!(dict.extend(super::SegmentId(99)), Err(Error::UnknownSegment));
    }

    #[test]
    fn resolve_code_bounds() {
        let dict = base_dict();
        assert_eq!(dict.resolve_code(dict.active(), -1), Err(Error::InvalidCode(-1)));
        let past = dict.next_code().as_cell();
        assert_eq!(dict.resolve_code(dict.active(), past), Err(Error::InvalidCode(past)));
        assert!(dict.resolve_code(dict.active(), past - 1).is_ok());
    }

    #[test]
    fn resolve_code_any_ignores_chains() {
        let mut dict = base_dict();
        let root = dict.active();
        let child = dict.extend(root).unwrap();
        let wr = dict.define_compiled("SQ", ["DUP", "+"], 10).unwrap();
        let code = dict.code_of(wr);
        assert!(dict.resolve_code(root, code.as_cell()).is_err());
        assert_eq!(dict.resolve_code_any(code.as_cell()), Ok((code, wr)));
        assert_eq!(wr.segment, child);

        let (dup, dup_wr) = dict.find("DUP").unwrap();
        assert_eq!(dict.resolve_code_any(dup.as_cell()), Ok((dup, dup_wr)));
        let past = dict.next_code().as_cell();
        assert_eq!(dict.resolve_code_any(past), Err(Error::InvalidCode(past)));
        assert_eq!(dict.resolve_code_any(Cell::MIN), Err(Error::InvalidCode(Cell::MIN)));
    }

    #[test]
    fn visible_names_dedup() {
        let mut dict = base_dict();
        dict.define_compiled("X", ["DUP"], 10).unwrap();
        dict.define_compiled("X", ["+"], 10).unwrap();
        let names = dict.visible_names();
        assert_eq!(names.iter().filter(|n| **n == "X").count(), 1);
        assert_eq!(names[0], "X");
        assert!(names.contains(&"0BRANCH"));
    }

    #[test]
    fn see_body() {
        let mut dict = base_dict();
        let wr = dict.define_compiled("double", ["DUP", "+"], 10).unwrap();
        let mut out = String::new();
        dict.see(wr, &mut out).unwrap();
        assert_eq!(out, ": DOUBLE DUP + ;\n");

        let wr = dict.define_compiled("nine", ["4", "5", "+"], 10).unwrap();
        dict.toggle_immediate(dict.code_of(wr).as_cell()).unwrap();
        out.clear();
        dict.see(wr, &mut out).unwrap();
        assert_eq!(out, ": NINE 4 5 + ; IMMEDIATE\n");

        let (_, dup) = dict.find("dup").unwrap();
        out.clear();
        dict.see(dup, &mut out).unwrap();
        assert_eq!(out, ": DUP <native> ;\n");
    }
}
