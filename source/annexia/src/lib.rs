#![cfg_attr(not(any(test, feature = "use-std")), no_std)]

extern crate alloc;

pub mod dictionary;
pub mod fastr;
pub mod input;
pub mod output;
pub mod stack;
pub mod vars;
pub mod vm;
pub mod word;

#[cfg(any(test, feature = "use-std"))]
pub mod testutil;

use alloc::string::String;
use core::fmt;

pub use crate::{
    vm::{Forth, ForthParams, State},
    word::{Cell, Code},
};
use crate::{output::OutputError, stack::StackError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    StackUnderflow,
    StackOverflow,
    ReturnStackOverflow,
    UndefinedWord(String),
    DivisionByZero,
    Structural(StructuralError),
    UnknownState,
    InvalidCode(Cell),
    InvalidAddress(Cell),
    InvalidBranch,
    CompileOnly,
    MissingOperand,
    DictionaryFull,
    UnknownSegment,
    Output(OutputError),
}

/// Malformed definitions and control structures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuralError {
    NestedDefinition,
    UnmatchedSemicolon,
    MissingName,
    ElseWithoutIf,
    ThenWithoutIf,
    UntilWithoutBegin,
    UnterminatedControl,
    LiteralOfControl,
}

impl From<StackError> for Error {
    fn from(se: StackError) -> Self {
        match se {
            StackError::StackEmpty | StackError::OverwriteInvalid => Error::StackUnderflow,
            StackError::StackFull => Error::StackOverflow,
        }
    }
}

impl From<OutputError> for Error {
    fn from(oe: OutputError) -> Self {
        Error::Output(oe)
    }
}

impl From<fmt::Error> for Error {
    fn from(_: fmt::Error) -> Self {
        Error::Output(OutputError::FormattingErr)
    }
}

impl From<StructuralError> for Error {
    fn from(se: StructuralError) -> Self {
        Error::Structural(se)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::StackUnderflow => f.write_str("stack underflow"),
            Error::StackOverflow => f.write_str("stack overflow"),
            Error::ReturnStackOverflow => f.write_str("return stack overflow"),
            Error::UndefinedWord(word) => write!(f, "undefined word: {word}"),
            Error::DivisionByZero => f.write_str("division by zero"),
            Error::Structural(se) => write!(f, "structural error: {se}"),
            Error::UnknownState => f.write_str("unknown compiler state"),
            Error::InvalidCode(code) => write!(f, "invalid word code: {code}"),
            Error::InvalidAddress(addr) => write!(f, "invalid variable address: {addr}"),
            Error::InvalidBranch => f.write_str("branch target outside of the word body"),
            Error::CompileOnly => f.write_str("word can only be used inside a definition"),
            Error::MissingOperand => f.write_str("missing inline operand"),
            Error::DictionaryFull => f.write_str("dictionary is out of codes"),
            Error::UnknownSegment => f.write_str("unknown dictionary segment"),
            Error::Output(OutputError::OutputFull) => f.write_str("output buffer full"),
            Error::Output(OutputError::FormattingErr) => f.write_str("formatting error"),
        }
    }
}

impl fmt::Display for StructuralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StructuralError::NestedDefinition => "`:` inside a definition",
            StructuralError::UnmatchedSemicolon => "`;` outside of a definition",
            StructuralError::MissingName => "definition has no name",
            StructuralError::ElseWithoutIf => "ELSE without IF",
            StructuralError::ThenWithoutIf => "THEN without IF",
            StructuralError::UntilWithoutBegin => "loop end without BEGIN",
            StructuralError::UnterminatedControl => "unterminated control structure",
            StructuralError::LiteralOfControl => "LITERAL of a non-literal item",
        })
    }
}

#[cfg(feature = "use-std")]
impl std::error::Error for Error {}

#[cfg(feature = "use-std")]
impl std::error::Error for StructuralError {}

trait ReplaceErr {
    type OK;
    fn replace_err<NE>(self, t: NE) -> Result<Self::OK, NE>;
}

impl<T, OE> ReplaceErr for Result<T, OE> {
    type OK = T;
    #[inline]
    fn replace_err<NE>(self, e: NE) -> Result<Self::OK, NE> {
        match self {
            Ok(t) => Ok(t),
            Err(_e) => Err(e),
        }
    }
}
