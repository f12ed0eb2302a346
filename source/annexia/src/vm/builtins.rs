use core::fmt::Write;

use crate::{
    word::{Cell, Flags, WordFunc},
    Error, Forth,
};

/// A row of the native word table.
pub struct BuiltinEntry<T: 'static> {
    pub name: &'static str,
    pub func: WordFunc<T>,
    /// The dispatcher refuses to call `func` with fewer items than this on
    /// the data stack.
    pub min_depth: u8,
    pub flags: Flags,
}

macro_rules! builtin {
    ($name:literal, $depth:literal, $func:expr) => {
        builtin!($name, $depth, $func, Flags::NONE)
    };
    ($name:literal, $depth:literal, $func:expr, $flags:expr) => {
        BuiltinEntry {
            name: $name,
            func: $func,
            min_depth: $depth,
            flags: $flags,
        }
    };
}

fn flag(b: bool) -> Cell {
    Cell::from(b)
}

impl<T: 'static> Forth<T> {
    pub const FULL_BUILTINS: &'static [BuiltinEntry<T>] = &[
        // These must come first, in this order, to land on the fixed marker
        // codes.
        builtin!("DOCOL", 0, Self::docol, Flags::HIDDEN),
        builtin!("EXIT", 0, Self::exit_word),
        builtin!("LIT", 0, Self::lit),
        builtin!("LITSTRING", 0, Self::litstring),
        builtin!("TELL", 2, Self::tell),
        builtin!("BRANCH", 0, Self::jump),
        builtin!("0BRANCH", 1, Self::jump_if_zero),
        //
        // stack
        //
        builtin!("DROP", 1, Self::drop),
        builtin!("SWAP", 2, Self::swap),
        builtin!("DUP", 1, Self::dup),
        builtin!("OVER", 2, Self::over),
        builtin!("ROT", 3, Self::rot),
        builtin!("-ROT", 3, Self::nrot),
        builtin!("2DROP", 2, Self::drop2),
        builtin!("2DUP", 2, Self::dup2),
        builtin!("2SWAP", 4, Self::swap2),
        builtin!("?DUP", 1, Self::qdup),
        builtin!("DEPTH", 0, Self::depth),
        //
        // arithmetic
        //
        builtin!("1+", 1, Self::incr),
        builtin!("1-", 1, Self::decr),
        builtin!("4+", 1, Self::incr4),
        builtin!("4-", 1, Self::decr4),
        builtin!("+", 2, Self::add),
        builtin!("-", 2, Self::minus),
        builtin!("*", 2, Self::mul),
        builtin!("/MOD", 2, Self::div_mod),
        //
        // comparison
        //
        builtin!("=", 2, Self::equal),
        builtin!("<>", 2, Self::not_equal),
        builtin!("<", 2, Self::less),
        builtin!(">", 2, Self::greater),
        builtin!("<=", 2, Self::less_eq),
        builtin!(">=", 2, Self::greater_eq),
        builtin!("0=", 1, Self::zero_equal),
        builtin!("0<>", 1, Self::zero_not_equal),
        builtin!("0<", 1, Self::zero_less),
        builtin!("0>", 1, Self::zero_greater),
        builtin!("0<=", 1, Self::zero_less_eq),
        builtin!("0>=", 1, Self::zero_greater_eq),
        //
        // bitwise
        //
        builtin!("AND", 2, Self::and),
        builtin!("OR", 2, Self::or),
        builtin!("XOR", 2, Self::xor),
        builtin!("INVERT", 1, Self::invert),
        //
        // memory
        //
        builtin!("!", 2, Self::store),
        builtin!("@", 1, Self::fetch),
        builtin!("+!", 2, Self::add_store),
        builtin!("-!", 2, Self::sub_store),
        //
        // i/o
        //
        builtin!("EMIT", 1, Self::emit),
        builtin!("KEY", 0, Self::key),
        builtin!(".", 1, Self::pop_print),
        builtin!("SPACES", 1, Self::spaces),
        //
        // dictionary and control
        //
        builtin!("FIND", 2, Self::find),
        builtin!(">CFA", 1, Self::to_cfa),
        builtin!("EXECUTE", 1, Self::execute),
        builtin!("HIDDEN", 1, Self::hidden),
        builtin!("IMMEDIATE", 0, Self::immediate, Flags::IMMEDIATE),
    ];

    /// Marks the start of a compiled body.
    pub fn docol(&mut self) -> Result<(), Error> {
        Ok(())
    }

    pub fn exit_word(&mut self) -> Result<(), Error> {
        self.exit()
    }

    pub fn lit(&mut self) -> Result<(), Error> {
        let val = self.next_operand()?;
        self.data_stack.push(val)?;
        Ok(())
    }

    pub fn litstring(&mut self) -> Result<(), Error> {
        let addr = self.next_operand()?;
        let len = self.next_operand()?;
        self.data_stack.push_all(&[addr, len])?;
        Ok(())
    }

    pub fn tell(&mut self) -> Result<(), Error> {
        let len = self.data_stack.try_peek_back_n(0)?;
        let addr = self.data_stack.try_peek_back_n(1)?;
        let text = self.vars.read_str(addr, len)?;
        self.data_stack.truncate(self.data_stack.depth() - 2);
        self.output.push_str(&text)?;
        Ok(())
    }

    pub fn jump(&mut self) -> Result<(), Error> {
        let offset = self.next_operand()?;
        self.branch(offset)
    }

    pub fn jump_if_zero(&mut self) -> Result<(), Error> {
        if self.cursor.word.is_none() {
            return Err(Error::CompileOnly);
        }
        let val = self.data_stack.try_pop()?;
        let offset = self.next_operand()?;
        if val == 0 {
            self.branch(offset)?;
        }
        Ok(())
    }

    pub fn drop(&mut self) -> Result<(), Error> {
        let _ = self.data_stack.try_pop()?;
        Ok(())
    }

    pub fn swap(&mut self) -> Result<(), Error> {
        let a = self.data_stack.try_pop()?;
        let b = self.data_stack.try_pop()?;
        self.data_stack.push(a)?;
        self.data_stack.push(b)?;
        Ok(())
    }

    pub fn dup(&mut self) -> Result<(), Error> {
        let val = self.data_stack.try_peek()?;
        self.data_stack.push(val)?;
        Ok(())
    }

    pub fn over(&mut self) -> Result<(), Error> {
        let val = self.data_stack.try_peek_back_n(1)?;
        self.data_stack.push(val)?;
        Ok(())
    }

    /// ( a b c -- b c a )
    pub fn rot(&mut self) -> Result<(), Error> {
        let c = self.data_stack.try_pop()?;
        let b = self.data_stack.try_pop()?;
        let a = self.data_stack.try_pop()?;
        self.data_stack.push(b)?;
        self.data_stack.push(c)?;
        self.data_stack.push(a)?;
        Ok(())
    }

    /// ( a b c -- c a b )
    pub fn nrot(&mut self) -> Result<(), Error> {
        let c = self.data_stack.try_pop()?;
        let b = self.data_stack.try_pop()?;
        let a = self.data_stack.try_pop()?;
        self.data_stack.push(c)?;
        self.data_stack.push(a)?;
        self.data_stack.push(b)?;
        Ok(())
    }

    pub fn drop2(&mut self) -> Result<(), Error> {
        let _ = self.data_stack.try_pop()?;
        let _ = self.data_stack.try_pop()?;
        Ok(())
    }

    pub fn dup2(&mut self) -> Result<(), Error> {
        let a = self.data_stack.try_peek_back_n(1)?;
        let b = self.data_stack.try_peek_back_n(0)?;
        self.data_stack.push_all(&[a, b])?;
        Ok(())
    }

    /// ( a b c d -- c d a b )
    pub fn swap2(&mut self) -> Result<(), Error> {
        let d = self.data_stack.try_pop()?;
        let c = self.data_stack.try_pop()?;
        let b = self.data_stack.try_pop()?;
        let a = self.data_stack.try_pop()?;
        self.data_stack.push(c)?;
        self.data_stack.push(d)?;
        self.data_stack.push(a)?;
        self.data_stack.push(b)?;
        Ok(())
    }

    pub fn qdup(&mut self) -> Result<(), Error> {
        let val = self.data_stack.try_peek()?;
        if val != 0 {
            self.data_stack.push(val)?;
        }
        Ok(())
    }

    pub fn depth(&mut self) -> Result<(), Error> {
        let depth = self.data_stack.depth() as Cell;
        self.data_stack.push(depth)?;
        Ok(())
    }

    fn unary(&mut self, f: fn(Cell) -> Cell) -> Result<(), Error> {
        let a = self.data_stack.try_pop()?;
        self.data_stack.push(f(a))?;
        Ok(())
    }

    /// Pops `b`, then `a`, and pushes `f(a, b)`.
    fn binary(&mut self, f: fn(Cell, Cell) -> Cell) -> Result<(), Error> {
        let b = self.data_stack.try_pop()?;
        let a = self.data_stack.try_pop()?;
        self.data_stack.push(f(a, b))?;
        Ok(())
    }

    pub fn incr(&mut self) -> Result<(), Error> {
        self.unary(|a| a.wrapping_add(1))
    }

    pub fn decr(&mut self) -> Result<(), Error> {
        self.unary(|a| a.wrapping_sub(1))
    }

    pub fn incr4(&mut self) -> Result<(), Error> {
        self.unary(|a| a.wrapping_add(4))
    }

    pub fn decr4(&mut self) -> Result<(), Error> {
        self.unary(|a| a.wrapping_sub(4))
    }

    pub fn add(&mut self) -> Result<(), Error> {
        self.binary(Cell::wrapping_add)
    }

    pub fn minus(&mut self) -> Result<(), Error> {
        self.binary(Cell::wrapping_sub)
    }

    pub fn mul(&mut self) -> Result<(), Error> {
        self.binary(Cell::wrapping_mul)
    }

    /// ( a b -- a%b a/b )
    pub fn div_mod(&mut self) -> Result<(), Error> {
        if self.data_stack.try_peek()? == 0 {
            return Err(Error::DivisionByZero);
        }
        let b = self.data_stack.try_pop()?;
        let a = self.data_stack.try_pop()?;
        self.data_stack.push(a.wrapping_rem(b))?;
        self.data_stack.push(a.wrapping_div(b))?;
        Ok(())
    }

    pub fn equal(&mut self) -> Result<(), Error> {
        self.binary(|a, b| flag(a == b))
    }

    pub fn not_equal(&mut self) -> Result<(), Error> {
        self.binary(|a, b| flag(a != b))
    }

    pub fn less(&mut self) -> Result<(), Error> {
        self.binary(|a, b| flag(a < b))
    }

    pub fn greater(&mut self) -> Result<(), Error> {
        self.binary(|a, b| flag(a > b))
    }

    pub fn less_eq(&mut self) -> Result<(), Error> {
        self.binary(|a, b| flag(a <= b))
    }

    pub fn greater_eq(&mut self) -> Result<(), Error> {
        self.binary(|a, b| flag(a >= b))
    }

    pub fn zero_equal(&mut self) -> Result<(), Error> {
        self.unary(|a| flag(a == 0))
    }

    pub fn zero_not_equal(&mut self) -> Result<(), Error> {
        self.unary(|a| flag(a != 0))
    }

    pub fn zero_less(&mut self) -> Result<(), Error> {
        self.unary(|a| flag(a < 0))
    }

    pub fn zero_greater(&mut self) -> Result<(), Error> {
        self.unary(|a| flag(a > 0))
    }

    pub fn zero_less_eq(&mut self) -> Result<(), Error> {
        self.unary(|a| flag(a <= 0))
    }

    pub fn zero_greater_eq(&mut self) -> Result<(), Error> {
        self.unary(|a| flag(a >= 0))
    }

    pub fn and(&mut self) -> Result<(), Error> {
        self.binary(|a, b| a & b)
    }

    pub fn or(&mut self) -> Result<(), Error> {
        self.binary(|a, b| a | b)
    }

    pub fn xor(&mut self) -> Result<(), Error> {
        self.binary(|a, b| a ^ b)
    }

    pub fn invert(&mut self) -> Result<(), Error> {
        self.unary(|a| !a)
    }

    /// ( n addr -- )
    pub fn store(&mut self) -> Result<(), Error> {
        self.update(|_, n| n)
    }

    /// ( addr -- n )
    pub fn fetch(&mut self) -> Result<(), Error> {
        let addr = self.data_stack.try_peek()?;
        let val = self.vars.fetch(addr)?;
        self.data_stack.overwrite_back_n(0, val)?;
        Ok(())
    }

    pub fn add_store(&mut self) -> Result<(), Error> {
        self.update(Cell::wrapping_add)
    }

    pub fn sub_store(&mut self) -> Result<(), Error> {
        self.update(Cell::wrapping_sub)
    }

    /// ( n addr -- ), storing `f(old, n)` at `addr`. A bad address leaves
    /// the stack as it was.
    fn update(&mut self, f: fn(Cell, Cell) -> Cell) -> Result<(), Error> {
        let addr = self.data_stack.try_peek_back_n(0)?;
        let n = self.data_stack.try_peek_back_n(1)?;
        let old = self.vars.fetch(addr)?;
        self.vars.store(addr, f(old, n))?;
        self.data_stack.truncate(self.data_stack.depth() - 2);
        Ok(())
    }

    pub fn emit(&mut self) -> Result<(), Error> {
        let val = self.data_stack.try_pop()?;
        let c = u32::try_from(val)
            .ok()
            .and_then(char::from_u32)
            .unwrap_or(char::REPLACEMENT_CHARACTER);
        self.output.push_char(c)?;
        Ok(())
    }

    /// ( -- c ), the next raw character of the line, or a newline once the
    /// line is used up.
    pub fn key(&mut self) -> Result<(), Error> {
        let c = self.input.next_char().unwrap_or('\n');
        self.data_stack.push(c as Cell)?;
        Ok(())
    }

    pub fn pop_print(&mut self) -> Result<(), Error> {
        let a = self.data_stack.try_pop()?;
        if self.vars.base() == 10 {
            write!(&mut self.output, "{a} ")?;
        } else if a < 0 {
            write!(&mut self.output, "-0x{:x} ", a.unsigned_abs())?;
        } else {
            write!(&mut self.output, "0x{a:x} ")?;
        }
        Ok(())
    }

    pub fn spaces(&mut self) -> Result<(), Error> {
        let num = self.data_stack.try_pop()?;
        for _ in 0..num.max(0) {
            self.output.push_char(' ')?;
        }
        Ok(())
    }

    /// ( addr len -- code | 0 )
    pub fn find(&mut self) -> Result<(), Error> {
        let len = self.data_stack.try_pop()?;
        let addr = self.data_stack.try_pop()?;
        let name = self.vars.read_str(addr, len)?;
        let code = self
            .dict
            .find(&name)
            .map_or(0, |(code, _)| code.as_cell());
        self.data_stack.push(code)?;
        Ok(())
    }

    pub fn to_cfa(&mut self) -> Result<(), Error> {
        let code = self.data_stack.try_peek()?;
        self.dict.resolve_code_any(code)?;
        Ok(())
    }

    /// ( code -- ), runs the word inside the current run loop.
    pub fn execute(&mut self) -> Result<(), Error> {
        let code = self.data_stack.try_peek()?;
        let (code, wr) = self.dict.resolve_code_any(code)?;
        self.data_stack.try_pop()?;
        self.dispatch(code, wr)
    }

    /// ( code -- ), toggles whether the word can be found by name.
    pub fn hidden(&mut self) -> Result<(), Error> {
        let code = self.data_stack.try_pop()?;
        self.dict.toggle_hidden(code)
    }

    /// Toggles the immediate flag of the word being defined, or else of the
    /// latest definition.
    pub fn immediate(&mut self) -> Result<(), Error> {
        if let Some(def) = self.definition.as_mut() {
            def.immediate = !def.immediate;
            return Ok(());
        }
        let latest = self.dict.latest().ok_or(Error::InvalidCode(-1))?;
        self.dict.toggle_immediate(latest.as_cell())
    }
}

#[cfg(test)]
mod test {
    use crate::{testutil::blocking_runtest, Error, Forth, ForthParams};

    fn forth() -> Forth<()> {
        Forth::new(ForthParams::default(), ()).unwrap()
    }

    #[test]
    fn stack_words() {
        blocking_runtest(
            r#"
            > 1 2 3 rot
            = 2 3 1
            > -rot
            = 1 2 3
            > over
            = 1 2 3 2
            > 2swap
            = 3 2 1 2
            > 2dup
            = 3 2 1 2 1 2
            > 2drop swap
            = 3 2 2 1
            > drop drop drop depth
            = 3 1
            > 0 ?dup 5 ?dup
            = 3 1 0 5 5
            "#,
        );
    }

    #[test]
    fn arithmetic_words() {
        blocking_runtest(
            r#"
            > 10 3 -
            = 7
            > 1+ 4+ 1- 4-
            = 7
            > 6 *
            = 42
            > -7 2 /mod
            = 42 -1 -3
            > 9223372036854775807 1+
            = 42 -1 -3 -9223372036854775808
            "#,
        );
    }

    #[test]
    fn comparison_and_bits() {
        blocking_runtest(
            r#"
            > 1 2 < 1 2 > 2 2 = 2 2 <> 2 2 <= 3 2 >=
            = 1 0 1 0 1 1
            > 0 0= 5 0= -1 0< 1 0> 0 0<= 0 0>= 3 0<>
            = 1 0 1 0 1 1 1 0 1 1 1 1 1
            "#,
        );
        blocking_runtest(
            r#"
            > 12 10 and 12 10 or 12 10 xor 0 invert
            = 8 14 6 -1
            "#,
        );
    }

    #[test]
    fn printing() {
        blocking_runtest(
            r#"
            > 42 . -7 .
            < 42 -7
            > 72 emit 105 emit 3 spaces 33 emit
            < Hi   !
            > 16 base ! 1f . -1f .
            < 0x1f -0x1f
            "#,
        );
    }

    #[test]
    fn key_reads_raw_input() {
        let mut forth = forth();
        forth.process("key x key").unwrap();
        assert_eq!(forth.stack(), &['x' as i64, 10]);
    }

    #[test]
    fn find_and_execute() {
        let mut forth = forth();
        forth.process(": sq dup * ;").unwrap();
        forth.process("s\" SQ\" find").unwrap();
        let code = forth.stack()[0];
        assert_ne!(code, 0);
        forth.process(">cfa 7 swap execute").unwrap();
        assert_eq!(forth.stack(), &[49]);

        forth.process("drop s\" nope\" find").unwrap();
        assert_eq!(forth.stack(), &[0]);
        assert_eq!(forth.process("drop -3 >cfa"), Err(Error::InvalidCode(-3)));
        assert_eq!(forth.process("drop 100000 execute"), Err(Error::InvalidCode(100000)));

        // EXECUTE inside a body nests like any other call.
        forth.process(": apply execute 1+ ;").unwrap();
        forth.process(&format!("3 {code} apply")).unwrap();
        assert_eq!(forth.stack(), &[10]);
    }

    #[test]
    fn store_checks_address_first() {
        let mut forth = forth();
        assert_eq!(forth.process("5 77 +!"), Err(Error::InvalidAddress(77)));
        assert_eq!(forth.stack(), &[5, 77]);
        assert_eq!(forth.process("2drop 77 @"), Err(Error::InvalidAddress(77)));
        assert_eq!(forth.stack(), &[77]);
    }

    #[test]
    fn tell_and_litstring() {
        let mut forth = forth();
        forth.process(": msg s\" ok then\" ;").unwrap();
        forth.process("msg tell").unwrap();
        assert_eq!(forth.output.as_str(), "ok then");
        assert_eq!(forth.process("LITSTRING"), Err(Error::CompileOnly));
        assert_eq!(forth.process("0 100 tell"), Err(Error::InvalidAddress(99)));
        forth.data_stack.clear();
        assert_eq!(
            forth.process("0 -9223372036854775808 tell"),
            Err(Error::InvalidAddress(0))
        );
        assert_eq!(forth.stack(), &[0, i64::MIN]);
    }
}
