use alloc::{string::String, vec::Vec};
use core::fmt;

use crate::{
    dictionary::Dictionary,
    input::WordStrBuf,
    output::OutputBuf,
    stack::Stack,
    vars::Variables,
    word::{Cell, Code, Dispatch, SegmentId, WordFunc, WordRef},
    Error, ReplaceErr,
};

pub mod builtins;
mod compiler;

pub use self::builtins::BuiltinEntry;
pub(crate) use self::compiler::Definition;

/// Capacities of the engine's bounded buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForthParams {
    pub data_stack_elems: usize,
    pub return_stack_elems: usize,
    pub output_buf_elems: usize,
}

impl Default for ForthParams {
    fn default() -> Self {
        Self {
            data_stack_elems: 256,
            return_stack_elems: 256,
            output_buf_elems: 4096,
        }
    }
}

/// Which state a comment or a quoted string returns to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Interpret,
    Compile,
}

/// What a finished quoted string turns into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quote {
    /// `."`: printed.
    Print,
    /// `S"`: left (or compiled) as `addr len`.
    Push,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Interpret,
    /// Saw `:`, the next token is the new word's name.
    Definition,
    Compile,
    Comment(Mode),
    QuotedString(Mode, Quote),
    /// Saw `SEE`, the next token is the word to print.
    Inspect,
    /// Saw `VARIABLE`, the next token is the variable's name.
    Variable,
    Exit,
}

impl State {
    pub fn name(&self) -> &'static str {
        match self {
            State::Interpret => "Interpret",
            State::Definition => "Definition",
            State::Compile => "Compile",
            State::Comment(_) => "Comment",
            State::QuotedString(..) => "QuotedString",
            State::Inspect => "Inspect",
            State::Variable => "Variable",
            State::Exit => "Exit",
        }
    }
}

impl From<Mode> for State {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Interpret => State::Interpret,
            Mode::Compile => State::Compile,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where execution is: a word and the index of the next cell of its body.
///
/// `word` is `None` when there is nothing left to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub code: Code,
    pub word: Option<WordRef>,
    pub position: usize,
    pub segment: SegmentId,
}

impl Cursor {
    fn idle(segment: SegmentId) -> Self {
        Self {
            code: Code::DOCOL,
            word: None,
            position: 0,
            segment,
        }
    }

    fn enter(code: Code, word: WordRef) -> Self {
        Self {
            code,
            word: Some(word),
            position: 0,
            segment: word.segment,
        }
    }
}

/// What a token means outside of the compiler's control words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Literal(Cell),
    /// The address of a variable.
    Variable(Cell),
    Word(Code, WordRef),
}

/// Forth is the "context" of the VM/interpreter.
///
/// It owns everything a running engine needs, so any number of independent
/// engines can live side by side. `T` is the host's own context, reachable
/// from host natives.
pub struct Forth<T: 'static> {
    state: State,
    pub data_stack: Stack<Cell>,
    pub(crate) return_stack: Stack<Cursor>,
    pub(crate) cursor: Cursor,
    // Return stack depth owned by the callers of the innermost `run`.
    run_base: usize,
    pub(crate) dict: Dictionary<T>,
    pub(crate) vars: Variables,
    pub(crate) definition: Option<Definition>,
    pub(crate) quote: Vec<String>,
    pub input: WordStrBuf,
    pub output: OutputBuf,
    pub host_ctxt: T,
}

impl<T: 'static> Forth<T> {
    /// Builds an engine with every native in the root segment, and an empty
    /// user segment on top of it.
    pub fn new(params: ForthParams, host_ctxt: T) -> Result<Self, Error> {
        let mut dict = Dictionary::new();
        for bi in Self::FULL_BUILTINS {
            dict.define_native(bi.name, bi.func, bi.min_depth, bi.flags)?;
        }
        let user = dict.extend(Dictionary::<T>::ROOT)?;

        Ok(Self {
            state: State::Interpret,
            data_stack: Stack::new(params.data_stack_elems),
            return_stack: Stack::new(params.return_stack_elems),
            cursor: Cursor::idle(user),
            run_base: 0,
            dict,
            vars: Variables::new(),
            definition: None,
            quote: Vec::new(),
            input: WordStrBuf::new(),
            output: OutputBuf::new(params.output_buf_elems),
            host_ctxt,
        })
    }

    /// Adds a native word to the active segment.
    pub fn add_builtin(&mut self, name: &str, min_depth: u8, bi: WordFunc<T>) -> Result<(), Error> {
        self.dict
            .define_native(name, bi, min_depth, crate::word::Flags::NONE)?;
        Ok(())
    }

    /// Layers a fresh segment on top of the active one. Later definitions
    /// go there, and can shadow anything below.
    pub fn extend_vocabulary(&mut self) -> Result<SegmentId, Error> {
        self.dict.extend(self.dict.active())
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_halted(&self) -> bool {
        self.state == State::Exit
    }

    /// Bottom to top.
    pub fn stack(&self) -> &[Cell] {
        self.data_stack.as_slice()
    }

    pub fn return_depth(&self) -> usize {
        self.return_stack.depth()
    }

    pub fn dictionary(&self) -> &Dictionary<T> {
        &self.dict
    }

    pub fn variables(&self) -> &Variables {
        &self.vars
    }

    pub fn word_names(&self) -> Vec<&str> {
        self.dict.visible_names()
    }

    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.vars.names()
    }

    /// Tears the engine down, handing back the host context.
    pub fn release(self) -> T {
        self.host_ctxt
    }

    /// Fills the input buffer with `line` and processes it.
    pub fn process(&mut self, line: &str) -> Result<(), Error> {
        self.input.fill(line);
        self.process_line()
    }

    /// Processes everything in the input buffer.
    ///
    /// On error, the rest of the line is dropped along with any open
    /// definition and the return stack. The data stack is left as the
    /// failing word left it.
    pub fn process_line(&mut self) -> Result<(), Error> {
        if self.state == State::Exit {
            return Ok(());
        }
        let res = self.munch_line();
        if let Err(e) = &res {
            tracing::warn!(error = %e, state = %self.state, "aborting command");
            self.abort();
        }
        res
    }

    fn munch_line(&mut self) -> Result<(), Error> {
        loop {
            self.input.advance();
            let token = match self.input.cur_word() {
                Some(w) => String::from(w),
                None => return Ok(()),
            };
            self.munch_token(&token)?;
            if self.state == State::Exit {
                return Ok(());
            }
        }
    }

    fn abort(&mut self) {
        self.return_stack.clear();
        self.run_base = 0;
        self.cursor = Cursor::idle(self.dict.active());
        self.definition = None;
        self.quote.clear();
        if self.state != State::Exit {
            self.state = State::Interpret;
        }
    }

    pub(crate) fn set_state(&mut self, state: State) {
        self.state = state;
    }

    /// Numbers win over variables, and variables over words.
    pub fn lookup(&self, token: &str) -> Option<Lookup> {
        if let Some(val) = crate::dictionary::parse_number(token, self.vars.base()) {
            return Some(Lookup::Literal(val));
        }
        if let Some(addr) = self.vars.address_of(token) {
            return Some(Lookup::Variable(addr));
        }
        self.dict
            .find(token)
            .map(|(code, wr)| Lookup::Word(code, wr))
    }

    /// Runs a word to completion.
    pub fn run(&mut self, code: Code) -> Result<(), Error> {
        let saved_cursor = self.cursor;
        let saved_base = self.run_base;
        self.run_base = self.return_stack.depth();
        self.cursor = Cursor::idle(self.dict.active());

        let res = self.run_inner(code);
        if res.is_err() {
            self.return_stack.truncate(self.run_base);
        }

        self.cursor = saved_cursor;
        self.run_base = saved_base;
        res
    }

    fn run_inner(&mut self, code: Code) -> Result<(), Error> {
        self.call(code.as_cell())?;
        while self.cursor.word.is_some() {
            self.step()?;
        }
        Ok(())
    }

    /// Runs the next cell of the current body.
    fn step(&mut self) -> Result<(), Error> {
        let mut cursor = self.cursor;
        let Some(wr) = cursor.word else {
            return Ok(());
        };
        let cell = match self.dict.body(wr).and_then(|body| body.get(cursor.position)) {
            Some(cell) => *cell,
            // Ran off the end of the body.
            None => return self.exit(),
        };
        // Move past the cell before dispatching it, so that natives reading
        // inline operands (and callees saving this cursor) see the next one.
        cursor.position += 1;
        self.cursor = cursor;
        self.call(cell)
    }

    /// Dispatches a single code. Natives run right away, compiled words
    /// become the new cursor.
    pub(crate) fn call(&mut self, code: Cell) -> Result<(), Error> {
        let (code, wr) = self.dict.resolve_code(self.cursor.segment, code)?;
        self.dispatch(code, wr)
    }

    /// Dispatches an already resolved word.
    pub(crate) fn dispatch(&mut self, code: Code, wr: WordRef) -> Result<(), Error> {
        match self.dict.word(wr).dispatch() {
            Dispatch::Native { func, min_depth } => {
                tracing::trace!(%code, word = %self.dict.word(wr).name, "native");
                if self.data_stack.depth() < usize::from(min_depth) {
                    return Err(Error::StackUnderflow);
                }
                func(self)
            }
            Dispatch::Compiled => {
                tracing::trace!(%code, word = %self.dict.word(wr).name, "enter");
                if self.cursor.word.is_some() {
                    self.return_stack
                        .push(self.cursor)
                        .replace_err(Error::ReturnStackOverflow)?;
                }
                self.cursor = Cursor::enter(code, wr);
                Ok(())
            }
        }
    }

    /// Leaves the current body, resuming the caller if there is one.
    pub(crate) fn exit(&mut self) -> Result<(), Error> {
        if self.return_stack.depth() > self.run_base {
            self.cursor = self.return_stack.try_pop()?;
        } else {
            self.cursor.word = None;
        }
        Ok(())
    }

    /// Reads the inline operand following the current cell.
    pub(crate) fn next_operand(&mut self) -> Result<Cell, Error> {
        let wr = self.cursor.word.ok_or(Error::CompileOnly)?;
        let val = self
            .dict
            .body(wr)
            .and_then(|body| body.get(self.cursor.position))
            .copied()
            .ok_or(Error::MissingOperand)?;
        self.cursor.position += 1;
        Ok(val)
    }

    /// Moves the cursor by `offset`, relative to the operand that was just
    /// read.
    pub(crate) fn branch(&mut self, offset: Cell) -> Result<(), Error> {
        let wr = self.cursor.word.ok_or(Error::CompileOnly)?;
        let len = self.dict.body(wr).map_or(0, <[Cell]>::len);
        let operand = self.cursor.position as Cell - 1;
        let target = operand
            .checked_add(offset)
            .and_then(|t| usize::try_from(t).ok())
            .filter(|t| *t <= len)
            .ok_or(Error::InvalidBranch)?;
        self.cursor.position = target;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::{Forth, ForthParams, Lookup, State};
    use crate::{
        testutil::{blocking_runtest, blocking_runtest_with},
        word::Code,
        Error, StructuralError,
    };

    fn forth() -> Forth<()> {
        Forth::new(ForthParams::default(), ()).unwrap()
    }

    #[test]
    fn marker_codes() {
        let forth = forth();
        let dict = forth.dictionary();
        for (name, code) in [
            ("EXIT", Code::EXIT),
            ("LIT", Code::LIT),
            ("LITSTRING", Code::LITSTRING),
            ("TELL", Code::TELL),
            ("BRANCH", Code::BRANCH),
            ("0BRANCH", Code::ZBRANCH),
        ] {
            assert_eq!(dict.find(name).map(|(c, _)| c), Some(code), "{name}");
        }
        // DOCOL is hidden, so a code of zero always means "not found".
        assert!(dict.find("DOCOL").is_none());
        assert!(dict.resolve_code(dict.active(), Code::DOCOL.as_cell()).is_ok());
    }

    #[test]
    fn lookup_priority() {
        let mut forth = forth();
        forth.process(": 7 99 ;").unwrap();
        assert_eq!(forth.lookup("7"), Some(Lookup::Literal(7)));
        forth.process("7").unwrap();
        assert_eq!(forth.stack(), &[7]);

        forth.process("variable dup").unwrap();
        assert!(matches!(forth.lookup("DUP"), Some(Lookup::Variable(_))));
        assert_eq!(forth.lookup("nope"), None);
    }

    #[test]
    fn arithmetic() {
        blocking_runtest(
            r#"
            > 2 3 +
            = 5
            > 7 2 /mod
            = 5 1 3
            x 0 /mod
            = 5 1 3 0
            "#,
        );
        let mut forth = forth();
        forth.process("5 0").unwrap();
        assert_eq!(forth.process("/MOD"), Err(Error::DivisionByZero));
        assert_eq!(forth.stack(), &[5, 0]);
    }

    #[test]
    fn underflow_leaves_stack_alone() {
        let mut forth = forth();
        assert_eq!(forth.process("DUP"), Err(Error::StackUnderflow));
        assert!(forth.stack().is_empty());

        forth.process("1").unwrap();
        assert_eq!(forth.process("+"), Err(Error::StackUnderflow));
        assert_eq!(forth.stack(), &[1]);

        // Partial mutations before the failing word stay.
        assert_eq!(forth.process("2 3 + swap drop drop drop"), Err(Error::StackUnderflow));
        assert!(forth.stack().is_empty());
    }

    #[test]
    fn stack_overflow() {
        blocking_runtest(
            r#"
            ( data_stack_elems 3 )
            > 1 2 3
            x 4
            = 1 2 3
            > drop
            x 2dup
            = 1 2
            x s" hi"
            = 1 2
            > drop s" hi" swap drop
            = 1 2
            "#,
        );
    }

    #[test]
    fn return_stack_overflow() {
        let params = ForthParams {
            return_stack_elems: 8,
            ..ForthParams::default()
        };
        let mut forth = Forth::new(params, ()).unwrap();
        forth.process(": forever recurse ;").unwrap();
        assert_eq!(forth.process("forever"), Err(Error::ReturnStackOverflow));
        assert_eq!(forth.return_depth(), 0);
        assert_eq!(forth.state(), State::Interpret);

        // Eight levels of nesting fit.
        forth.process(": l0 1 ;").unwrap();
        for n in 1..=8 {
            forth.process(&format!(": l{n} l{} ;", n - 1)).unwrap();
        }
        forth.process("l8").unwrap();
        assert_eq!(forth.stack(), &[1]);
        forth.process(": l9 l8 ;").unwrap();
        assert_eq!(forth.process("l9"), Err(Error::ReturnStackOverflow));
    }

    #[test]
    fn definition_round_trip() {
        blocking_runtest(
            r#"
            > : DOUBLE DUP + ;
            > 4 DOUBLE .
            < 8
            > SEE DOUBLE
            < : DOUBLE DUP + ;
            "#,
        );
    }

    #[test]
    fn shadowing() {
        let mut forth = forth();
        forth.process(": greet 1 ;").unwrap();
        let (old, _) = forth.dictionary().find("greet").unwrap();
        forth.process(": greet 2 ;").unwrap();
        let (new, _) = forth.dictionary().find("GREET").unwrap();
        assert_ne!(old, new);

        forth.process("greet").unwrap();
        assert_eq!(forth.stack(), &[2]);

        // The old one is still there by code.
        forth.process(&format!("{} execute", old.as_cell())).unwrap();
        assert_eq!(forth.stack(), &[2, 1]);
    }

    #[test]
    fn segment_layering() {
        let mut forth = forth();
        forth.process(": greet 1 ;").unwrap();
        forth.extend_vocabulary().unwrap();
        forth.process(": greet 2 ;").unwrap();
        forth.process("greet").unwrap();
        assert_eq!(forth.stack(), &[2]);

        let (code, _) = forth.dictionary().find("greet").unwrap();
        forth.process(&format!("{} hidden greet", code.as_cell())).unwrap();
        assert_eq!(forth.stack(), &[2, 1]);
    }

    #[test]
    fn parent_words_run_child_codes() {
        let mut forth = forth();
        forth.process(": apply execute ; : valid >cfa ;").unwrap();
        forth.extend_vocabulary().unwrap();
        forth.process(": sq dup * ;").unwrap();
        let (code, _) = forth.dictionary().find("sq").unwrap();
        let code = code.as_cell();

        forth.process(&format!("3 {code} apply")).unwrap();
        assert_eq!(forth.stack(), &[9]);
        forth.process(&format!("drop {code} valid")).unwrap();
        assert_eq!(forth.stack(), &[code]);

        let past = code + 1;
        assert_eq!(
            forth.process(&format!("drop {past} apply")),
            Err(Error::InvalidCode(past))
        );
        assert_eq!(forth.stack(), &[past]);
    }

    #[test]
    fn bye_is_terminal() {
        let mut forth = forth();
        forth.process("1 2 bye 3").unwrap();
        assert_eq!(forth.state(), State::Exit);
        assert!(forth.is_halted());
        assert_eq!(forth.stack(), &[1, 2]);

        let names = forth.word_names().len();
        forth.process(": late 4 ; 5 late").unwrap();
        assert_eq!(forth.stack(), &[1, 2]);
        assert_eq!(forth.word_names().len(), names);
        assert_eq!(forth.state(), State::Exit);
    }

    #[test]
    fn error_recovery() {
        let mut forth = forth();
        assert_eq!(
            forth.process(": broken 1 : ;"),
            Err(Error::Structural(StructuralError::NestedDefinition))
        );
        assert_eq!(forth.state(), State::Interpret);
        assert!(forth.dictionary().find("broken").is_none());

        assert_eq!(
            forth.process(";"),
            Err(Error::Structural(StructuralError::UnmatchedSemicolon))
        );

        // Nothing of the aborted line after the error runs.
        assert_eq!(
            forth.process("1 nope 2"),
            Err(Error::UndefinedWord("nope".into()))
        );
        assert_eq!(forth.stack(), &[1]);
    }

    #[test]
    fn compile_only_words() {
        let mut forth = forth();
        assert_eq!(forth.process("LIT"), Err(Error::CompileOnly));
        assert_eq!(forth.process("1 0BRANCH"), Err(Error::CompileOnly));
        assert_eq!(forth.process("IF"), Err(Error::CompileOnly));
    }

    #[test]
    fn runtest_with_host_words() {
        let mut forth = forth();
        forth.add_builtin("seven", 0, |f| Ok(f.data_stack.push(7)?)).unwrap();
        blocking_runtest_with(
            &mut forth,
            r#"
            > seven seven +
            = 14
            > : twice seven seven ;
            > twice
            = 14 7 7
            "#,
        );
    }
}
