//! The token state machine: interpreting, defining, and compiling.

use alloc::{string::String, vec, vec::Vec};

use crate::{
    vm::{Lookup, Mode, Quote, State},
    word::{Cell, Code},
    Error, Forth, StructuralError,
};

/// Compiler words recognised directly by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Colon,
    Semicolon,
    LParen,
    DotQuote,
    SQuote,
    See,
    Bye,
    Char,
    Variable,
    Literal,
    LBracket,
    RBracket,
    If,
    Else,
    Then,
    Begin,
    Until,
    Again,
    Recurse,
}

impl Control {
    fn from_token(token: &str) -> Option<Self> {
        const TABLE: &[(&str, Control)] = &[
            (":", Control::Colon),
            (";", Control::Semicolon),
            ("(", Control::LParen),
            (".\"", Control::DotQuote),
            ("S\"", Control::SQuote),
            ("SEE", Control::See),
            ("BYE", Control::Bye),
            ("CHAR", Control::Char),
            ("VARIABLE", Control::Variable),
            ("LITERAL", Control::Literal),
            ("[", Control::LBracket),
            ("]", Control::RBracket),
            ("IF", Control::If),
            ("ELSE", Control::Else),
            ("THEN", Control::Then),
            ("BEGIN", Control::Begin),
            ("UNTIL", Control::Until),
            ("AGAIN", Control::Again),
            ("RECURSE", Control::Recurse),
        ];
        TABLE
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(token))
            .map(|(_, ctl)| *ctl)
    }
}

/// One accumulated item of a definition's body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Pending {
    /// Resolved when the definition is closed.
    Token(String),
    Literal(Cell),
    /// Already final cells.
    Cells(Vec<Cell>),
    If,
    Else,
    Then,
    Begin,
    Until,
    Again,
    Recurse,
}

/// A definition between `:` and `;`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Definition {
    pub(crate) name: String,
    pub(crate) items: Vec<Pending>,
    pub(crate) immediate: bool,
}

impl<T: 'static> Forth<T> {
    pub(crate) fn munch_token(&mut self, token: &str) -> Result<(), Error> {
        match self.state() {
            State::Interpret => self.interpret_token(token),
            State::Definition => self.name_definition(token),
            State::Compile => self.compile_token(token),
            State::Comment(mode) => {
                if token == ")" {
                    self.set_state(mode.into());
                }
                Ok(())
            }
            State::QuotedString(mode, quote) => self.quote_token(token, mode, quote),
            State::Inspect => self.inspect(token),
            State::Variable => {
                let addr = self.vars.declare(token);
                tracing::debug!(name = token, addr, "declared variable");
                self.set_state(State::Interpret);
                Ok(())
            }
            State::Exit => Ok(()),
        }
    }

    fn interpret_token(&mut self, token: &str) -> Result<(), Error> {
        match Control::from_token(token) {
            Some(Control::Colon) => self.set_state(State::Definition),
            Some(Control::Semicolon) => return Err(StructuralError::UnmatchedSemicolon.into()),
            Some(Control::LParen) => self.set_state(State::Comment(Mode::Interpret)),
            Some(Control::DotQuote) => self.set_state(State::QuotedString(Mode::Interpret, Quote::Print)),
            Some(Control::SQuote) => self.set_state(State::QuotedString(Mode::Interpret, Quote::Push)),
            Some(Control::See) => self.set_state(State::Inspect),
            Some(Control::Bye) => {
                tracing::debug!("bye");
                self.set_state(State::Exit);
            }
            Some(Control::Variable) => self.set_state(State::Variable),
            Some(Control::Char) => {
                let c = self.next_char_literal()?;
                self.data_stack.push(c)?;
            }
            Some(
                Control::Literal
                | Control::If
                | Control::Else
                | Control::Then
                | Control::Begin
                | Control::Until
                | Control::Again
                | Control::Recurse,
            ) => return Err(Error::CompileOnly),
            Some(Control::LBracket | Control::RBracket) | None => {
                match self.lookup(token) {
                    Some(Lookup::Literal(val)) | Some(Lookup::Variable(val)) => {
                        self.data_stack.push(val)?;
                    }
                    Some(Lookup::Word(code, _)) => self.run(code)?,
                    None => return Err(Error::UndefinedWord(token.into())),
                }
            }
        }
        Ok(())
    }

    fn name_definition(&mut self, token: &str) -> Result<(), Error> {
        if token == ";" {
            return Err(StructuralError::MissingName.into());
        }
        tracing::debug!(name = token, "begin definition");
        self.definition = Some(Definition {
            name: token.to_ascii_uppercase(),
            items: Vec::new(),
            immediate: false,
        });
        self.set_state(State::Compile);
        Ok(())
    }

    fn compile_token(&mut self, token: &str) -> Result<(), Error> {
        let pending = match Control::from_token(token) {
            Some(Control::Semicolon) => return self.finish_definition(),
            Some(Control::Colon) => return Err(StructuralError::NestedDefinition.into()),
            Some(Control::LParen) => {
                self.set_state(State::Comment(Mode::Compile));
                return Ok(());
            }
            Some(Control::DotQuote) => {
                self.set_state(State::QuotedString(Mode::Compile, Quote::Print));
                return Ok(());
            }
            Some(Control::SQuote) => {
                self.set_state(State::QuotedString(Mode::Compile, Quote::Push));
                return Ok(());
            }
            Some(Control::LBracket | Control::RBracket) => return Ok(()),
            Some(Control::Char) => Pending::Literal(self.next_char_literal()?),
            Some(Control::Literal) => {
                let top = self.pending_mut()?.pop().ok_or(Error::StackUnderflow)?;
                Pending::Literal(self.literal_of(top)?)
            }
            Some(Control::If) => Pending::If,
            Some(Control::Else) => Pending::Else,
            Some(Control::Then) => Pending::Then,
            Some(Control::Begin) => Pending::Begin,
            Some(Control::Until) => Pending::Until,
            Some(Control::Again) => Pending::Again,
            Some(Control::Recurse) => Pending::Recurse,
            Some(Control::See | Control::Bye | Control::Variable) | None => {
                if let Some(Lookup::Word(code, wr)) = self.lookup(token) {
                    if self.dict.word(wr).flags.is_immediate() {
                        return self.run(code);
                    }
                }
                Pending::Token(token.into())
            }
        };
        self.pending_mut()?.push(pending);
        Ok(())
    }

    fn pending_mut(&mut self) -> Result<&mut Vec<Pending>, Error> {
        self.definition
            .as_mut()
            .map(|def| &mut def.items)
            .ok_or(Error::UnknownState)
    }

    /// Reads the token after `CHAR`, and returns its first character.
    fn next_char_literal(&mut self) -> Result<Cell, Error> {
        self.input.advance();
        self.input
            .cur_word()
            .and_then(|w| w.chars().next())
            .map(|c| c as Cell)
            .ok_or(Error::MissingOperand)
    }

    fn literal_of(&self, item: Pending) -> Result<Cell, Error> {
        match item {
            Pending::Literal(val) => Ok(val),
            Pending::Token(token) => match self.lookup(&token) {
                Some(Lookup::Literal(val) | Lookup::Variable(val)) => Ok(val),
                Some(Lookup::Word(code, _)) => Ok(code.as_cell()),
                None => Err(Error::UndefinedWord(token)),
            },
            _ => Err(StructuralError::LiteralOfControl.into()),
        }
    }

    fn quote_token(&mut self, token: &str, mode: Mode, quote: Quote) -> Result<(), Error> {
        let Some(last) = token.strip_suffix('"') else {
            self.quote.push(token.into());
            return Ok(());
        };
        self.quote.push(last.into());
        let text = self.quote.join(" ");
        self.quote.clear();
        self.set_state(mode.into());

        match (mode, quote) {
            (Mode::Interpret, Quote::Print) => {
                tracing::info!(quote = %text, "quote");
                self.output.push_str(&text)?;
            }
            (Mode::Interpret, Quote::Push) => {
                let (addr, len) = self.vars.allot_str(&text);
                self.data_stack.push_all(&[addr, len])?;
            }
            (Mode::Compile, _) => {
                let (addr, len) = self.vars.allot_str(&text);
                let mut cells = vec![Code::LITSTRING.as_cell(), addr, len];
                if quote == Quote::Print {
                    cells.push(Code::TELL.as_cell());
                }
                self.pending_mut()?.push(Pending::Cells(cells));
            }
        }
        Ok(())
    }

    fn inspect(&mut self, token: &str) -> Result<(), Error> {
        self.set_state(State::Interpret);
        let (_, wr) = self
            .dict
            .find(token)
            .ok_or_else(|| Error::UndefinedWord(token.into()))?;
        self.dict.see(wr, &mut self.output)
    }

    fn finish_definition(&mut self) -> Result<(), Error> {
        let def = self.definition.take().ok_or(Error::UnknownState)?;
        let body = self.assemble(&def.items)?;
        let wr = self.dict.define_body(&def.name, body)?;
        if def.immediate {
            let code = self.dict.code_of(wr);
            self.dict.toggle_immediate(code.as_cell())?;
        }
        tracing::debug!(name = %def.name, code = %self.dict.code_of(wr), "complete definition");
        self.set_state(State::Interpret);
        Ok(())
    }

    /// Turns the accumulated items into a body: `DOCOL ... EXIT`.
    ///
    /// Names resolve against the dictionary as it is now, before the new
    /// word is added. Branch offsets are relative to the offset cell.
    fn assemble(&self, items: &[Pending]) -> Result<Vec<Cell>, Error> {
        let mut body = vec![Code::DOCOL.as_cell()];
        // Open IF / ELSE / BEGIN, with the index of their offset cell (or
        // of the loop start, for BEGIN).
        let mut control: Vec<(Pending, usize)> = Vec::new();
        // Inline operands still owed to the last compiled word.
        let mut operands = 0;

        for item in items {
            if operands > 0 {
                let val = match item {
                    Pending::Literal(val) => *val,
                    Pending::Token(token) => {
                        crate::dictionary::parse_number(token, self.vars.base())
                            .ok_or(Error::MissingOperand)?
                    }
                    _ => return Err(Error::MissingOperand),
                };
                body.push(val);
                operands -= 1;
                continue;
            }

            match item {
                Pending::Token(token) => match self.lookup(token) {
                    Some(Lookup::Literal(val) | Lookup::Variable(val)) => {
                        body.extend([Code::LIT.as_cell(), val]);
                    }
                    Some(Lookup::Word(code, _)) => {
                        body.push(code.as_cell());
                        operands = match code {
                            Code::LIT | Code::BRANCH | Code::ZBRANCH => 1,
                            Code::LITSTRING => 2,
                            _ => 0,
                        };
                    }
                    None => return Err(Error::UndefinedWord(token.clone())),
                },
                Pending::Literal(val) => body.extend([Code::LIT.as_cell(), *val]),
                Pending::Cells(cells) => body.extend_from_slice(cells),
                Pending::Recurse => body.push(self.dict.next_code().as_cell()),
                Pending::If => {
                    body.extend([Code::ZBRANCH.as_cell(), 0]);
                    control.push((Pending::If, body.len() - 1));
                }
                Pending::Else => {
                    let at = match control.pop() {
                        Some((Pending::If, at)) => at,
                        _ => return Err(StructuralError::ElseWithoutIf.into()),
                    };
                    body.extend([Code::BRANCH.as_cell(), 0]);
                    control.push((Pending::Else, body.len() - 1));
                    body[at] = (body.len() - at) as Cell;
                }
                Pending::Then => match control.pop() {
                    Some((Pending::If | Pending::Else, at)) => {
                        body[at] = (body.len() - at) as Cell;
                    }
                    _ => return Err(StructuralError::ThenWithoutIf.into()),
                },
                Pending::Begin => control.push((Pending::Begin, body.len())),
                Pending::Until | Pending::Again => {
                    let Some((Pending::Begin, start)) = control.pop() else {
                        return Err(StructuralError::UntilWithoutBegin.into());
                    };
                    let branch = match item {
                        Pending::Until => Code::ZBRANCH,
                        _ => Code::BRANCH,
                    };
                    body.push(branch.as_cell());
                    body.push(start as Cell - body.len() as Cell);
                }
            }
        }

        if operands > 0 {
            return Err(Error::MissingOperand);
        }
        if !control.is_empty() {
            return Err(StructuralError::UnterminatedControl.into());
        }
        body.push(Code::EXIT.as_cell());
        Ok(body)
    }
}
