//! Human-readable instruction formatting.
//!
//! [`InstructionPrinter`] is a [`Processor`] that renders each dispatched
//! instruction as text. Feeding it several instructions joins them with
//! `", "`, which is the shape the idiom reports use.

use std::fmt::Write;

use crate::cursor::Cursor;
use crate::error::BytecodeError;
use crate::op::{BinOp, Loc, Patt, StrRef};
use crate::process::Processor;

#[derive(Default)]
pub struct InstructionPrinter {
    out: String,
}

impl InstructionPrinter {
    pub fn new() -> Self {
        InstructionPrinter::default()
    }

    pub fn finish(self) -> String {
        self.out
    }

    fn mnemonic(&mut self, name: &str) {
        if !self.out.is_empty() {
            self.out.push_str(", ");
        }
        self.out.push_str(name);
    }

    fn arg(&mut self, a: impl std::fmt::Display) {
        let _ = write!(self.out, " {a}");
    }

    fn hex(&mut self, target: i32) {
        let _ = write!(self.out, " {:#010x}", target);
    }

    fn str_arg(&mut self, cur: &Cursor<'_>, s: StrRef) -> Result<(), BytecodeError> {
        let bytes = cur.image().str_bytes(s)?;
        let _ = write!(self.out, " {}", String::from_utf8_lossy(bytes));
        Ok(())
    }
}

impl Processor for InstructionPrinter {
    type Error = BytecodeError;

    fn binop(&mut self, _cur: &mut Cursor<'_>, op: BinOp) -> Result<(), BytecodeError> {
        self.mnemonic("BINOP");
        self.arg(op);
        Ok(())
    }

    fn constant(&mut self, _cur: &mut Cursor<'_>, n: i32) -> Result<(), BytecodeError> {
        self.mnemonic("CONST");
        self.arg(n);
        Ok(())
    }

    fn string(&mut self, cur: &mut Cursor<'_>, s: StrRef) -> Result<(), BytecodeError> {
        self.mnemonic("STRING");
        self.str_arg(cur, s)
    }

    fn sexp(&mut self, cur: &mut Cursor<'_>, tag: StrRef, n: i32) -> Result<(), BytecodeError> {
        self.mnemonic("SEXP");
        self.str_arg(cur, tag)?;
        self.arg(n);
        Ok(())
    }

    fn sti(&mut self, _cur: &mut Cursor<'_>) -> Result<(), BytecodeError> {
        self.mnemonic("STI");
        Ok(())
    }

    fn sta(&mut self, _cur: &mut Cursor<'_>) -> Result<(), BytecodeError> {
        self.mnemonic("STA");
        Ok(())
    }

    fn jmp(&mut self, _cur: &mut Cursor<'_>, target: i32) -> Result<(), BytecodeError> {
        self.mnemonic("JMP");
        self.hex(target);
        Ok(())
    }

    fn end(&mut self, _cur: &mut Cursor<'_>) -> Result<(), BytecodeError> {
        self.mnemonic("END");
        Ok(())
    }

    fn ret(&mut self, _cur: &mut Cursor<'_>) -> Result<(), BytecodeError> {
        self.mnemonic("RET");
        Ok(())
    }

    fn drop_top(&mut self, _cur: &mut Cursor<'_>) -> Result<(), BytecodeError> {
        self.mnemonic("DROP");
        Ok(())
    }

    fn dup(&mut self, _cur: &mut Cursor<'_>) -> Result<(), BytecodeError> {
        self.mnemonic("DUP");
        Ok(())
    }

    fn swap(&mut self, _cur: &mut Cursor<'_>) -> Result<(), BytecodeError> {
        self.mnemonic("SWAP");
        Ok(())
    }

    fn elem(&mut self, _cur: &mut Cursor<'_>) -> Result<(), BytecodeError> {
        self.mnemonic("ELEM");
        Ok(())
    }

    fn ld(&mut self, _cur: &mut Cursor<'_>, loc: Loc) -> Result<(), BytecodeError> {
        self.mnemonic("LD");
        self.arg(loc);
        Ok(())
    }

    fn lda(&mut self, _cur: &mut Cursor<'_>, loc: Loc) -> Result<(), BytecodeError> {
        self.mnemonic("LDA");
        self.arg(loc);
        Ok(())
    }

    fn st(&mut self, _cur: &mut Cursor<'_>, loc: Loc) -> Result<(), BytecodeError> {
        self.mnemonic("ST");
        self.arg(loc);
        Ok(())
    }

    fn cjmp(&mut self, _cur: &mut Cursor<'_>, target: i32, nonzero: bool) -> Result<(), BytecodeError> {
        self.mnemonic(if nonzero { "CJMPnz" } else { "CJMPz" });
        self.hex(target);
        Ok(())
    }

    fn begin(
        &mut self,
        _cur: &mut Cursor<'_>,
        n_args: i32,
        n_locals: i32,
        closure_entry: bool,
    ) -> Result<(), BytecodeError> {
        self.mnemonic(if closure_entry { "CBEGIN" } else { "BEGIN" });
        self.arg(n_args);
        self.arg(n_locals);
        Ok(())
    }

    fn closure(&mut self, _cur: &mut Cursor<'_>, target: i32, captures: &[Loc]) -> Result<(), BytecodeError> {
        self.mnemonic("CLOSURE");
        self.hex(target);
        for loc in captures {
            self.arg(loc);
        }
        Ok(())
    }

    fn callc(&mut self, _cur: &mut Cursor<'_>, n_args: i32) -> Result<(), BytecodeError> {
        self.mnemonic("CALLC");
        self.arg(n_args);
        Ok(())
    }

    fn call(&mut self, _cur: &mut Cursor<'_>, target: i32, n_args: i32) -> Result<(), BytecodeError> {
        self.mnemonic("CALL");
        self.hex(target);
        self.arg(n_args);
        Ok(())
    }

    fn tag(&mut self, cur: &mut Cursor<'_>, tag: StrRef, arity: i32) -> Result<(), BytecodeError> {
        self.mnemonic("TAG");
        self.str_arg(cur, tag)?;
        self.arg(arity);
        Ok(())
    }

    fn array(&mut self, _cur: &mut Cursor<'_>, n: i32) -> Result<(), BytecodeError> {
        self.mnemonic("ARRAY");
        self.arg(n);
        Ok(())
    }

    fn fail(&mut self, _cur: &mut Cursor<'_>, line: i32, col: i32) -> Result<(), BytecodeError> {
        self.mnemonic("FAIL");
        self.arg(line);
        self.arg(col);
        Ok(())
    }

    fn line(&mut self, _cur: &mut Cursor<'_>, line: i32) -> Result<(), BytecodeError> {
        self.mnemonic("LINE");
        self.arg(line);
        Ok(())
    }

    fn patt(&mut self, _cur: &mut Cursor<'_>, p: Patt) -> Result<(), BytecodeError> {
        self.mnemonic("PATT");
        self.arg(p);
        Ok(())
    }

    fn lread(&mut self, _cur: &mut Cursor<'_>) -> Result<(), BytecodeError> {
        self.mnemonic("CALL Lread");
        Ok(())
    }

    fn lwrite(&mut self, _cur: &mut Cursor<'_>) -> Result<(), BytecodeError> {
        self.mnemonic("CALL Lwrite");
        Ok(())
    }

    fn llength(&mut self, _cur: &mut Cursor<'_>) -> Result<(), BytecodeError> {
        self.mnemonic("CALL Llength");
        Ok(())
    }

    fn lstring(&mut self, _cur: &mut Cursor<'_>) -> Result<(), BytecodeError> {
        self.mnemonic("CALL Lstring");
        Ok(())
    }

    fn barray(&mut self, _cur: &mut Cursor<'_>, n: i32) -> Result<(), BytecodeError> {
        self.mnemonic("CALL Barray");
        self.arg(n);
        Ok(())
    }
}
