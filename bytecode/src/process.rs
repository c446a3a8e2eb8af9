//! Opcode-to-handler dispatch, generic over a processor.
//!
//! [`step`] decodes exactly one instruction at the cursor and invokes the
//! matching [`Processor`] callback. The interpreter and the reachability
//! analyzer are the two processors in this repository; every handler
//! defaults to a no-op so a processor only implements the opcodes it
//! observes. Handlers receive the cursor and may move it (jumps, calls).

use crate::cursor::Cursor;
use crate::error::BytecodeError;
use crate::op::{BinOp, Loc, Patt, StrRef};

/// Outcome of decoding one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    /// A `0xF_` stop byte: the decode loop terminates.
    Halt,
}

#[allow(unused_variables)]
pub trait Processor {
    type Error: From<BytecodeError>;

    fn binop(&mut self, cur: &mut Cursor<'_>, op: BinOp) -> Result<(), Self::Error> {
        Ok(())
    }

    fn constant(&mut self, cur: &mut Cursor<'_>, n: i32) -> Result<(), Self::Error> {
        Ok(())
    }

    fn string(&mut self, cur: &mut Cursor<'_>, s: StrRef) -> Result<(), Self::Error> {
        Ok(())
    }

    fn sexp(&mut self, cur: &mut Cursor<'_>, tag: StrRef, n: i32) -> Result<(), Self::Error> {
        Ok(())
    }

    fn sti(&mut self, cur: &mut Cursor<'_>) -> Result<(), Self::Error> {
        Ok(())
    }

    fn sta(&mut self, cur: &mut Cursor<'_>) -> Result<(), Self::Error> {
        Ok(())
    }

    fn jmp(&mut self, cur: &mut Cursor<'_>, target: i32) -> Result<(), Self::Error> {
        Ok(())
    }

    fn end(&mut self, cur: &mut Cursor<'_>) -> Result<(), Self::Error> {
        Ok(())
    }

    fn ret(&mut self, cur: &mut Cursor<'_>) -> Result<(), Self::Error> {
        Ok(())
    }

    fn drop_top(&mut self, cur: &mut Cursor<'_>) -> Result<(), Self::Error> {
        Ok(())
    }

    fn dup(&mut self, cur: &mut Cursor<'_>) -> Result<(), Self::Error> {
        Ok(())
    }

    fn swap(&mut self, cur: &mut Cursor<'_>) -> Result<(), Self::Error> {
        Ok(())
    }

    fn elem(&mut self, cur: &mut Cursor<'_>) -> Result<(), Self::Error> {
        Ok(())
    }

    fn ld(&mut self, cur: &mut Cursor<'_>, loc: Loc) -> Result<(), Self::Error> {
        Ok(())
    }

    fn lda(&mut self, cur: &mut Cursor<'_>, loc: Loc) -> Result<(), Self::Error> {
        Ok(())
    }

    fn st(&mut self, cur: &mut Cursor<'_>, loc: Loc) -> Result<(), Self::Error> {
        Ok(())
    }

    /// CJMPZ (`nonzero == false`) or CJMPNZ (`nonzero == true`).
    fn cjmp(&mut self, cur: &mut Cursor<'_>, target: i32, nonzero: bool) -> Result<(), Self::Error> {
        Ok(())
    }

    /// BEGIN, or CBEGIN when `closure_entry` is set.
    fn begin(
        &mut self,
        cur: &mut Cursor<'_>,
        n_args: i32,
        n_locals: i32,
        closure_entry: bool,
    ) -> Result<(), Self::Error> {
        Ok(())
    }

    fn closure(&mut self, cur: &mut Cursor<'_>, target: i32, captures: &[Loc]) -> Result<(), Self::Error> {
        Ok(())
    }

    fn callc(&mut self, cur: &mut Cursor<'_>, n_args: i32) -> Result<(), Self::Error> {
        Ok(())
    }

    fn call(&mut self, cur: &mut Cursor<'_>, target: i32, n_args: i32) -> Result<(), Self::Error> {
        Ok(())
    }

    fn tag(&mut self, cur: &mut Cursor<'_>, tag: StrRef, arity: i32) -> Result<(), Self::Error> {
        Ok(())
    }

    fn array(&mut self, cur: &mut Cursor<'_>, n: i32) -> Result<(), Self::Error> {
        Ok(())
    }

    fn fail(&mut self, cur: &mut Cursor<'_>, line: i32, col: i32) -> Result<(), Self::Error> {
        Ok(())
    }

    fn line(&mut self, cur: &mut Cursor<'_>, line: i32) -> Result<(), Self::Error> {
        Ok(())
    }

    fn patt(&mut self, cur: &mut Cursor<'_>, p: Patt) -> Result<(), Self::Error> {
        Ok(())
    }

    fn lread(&mut self, cur: &mut Cursor<'_>) -> Result<(), Self::Error> {
        Ok(())
    }

    fn lwrite(&mut self, cur: &mut Cursor<'_>) -> Result<(), Self::Error> {
        Ok(())
    }

    fn llength(&mut self, cur: &mut Cursor<'_>) -> Result<(), Self::Error> {
        Ok(())
    }

    fn lstring(&mut self, cur: &mut Cursor<'_>) -> Result<(), Self::Error> {
        Ok(())
    }

    fn barray(&mut self, cur: &mut Cursor<'_>, n: i32) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Decode one instruction and dispatch it.
pub fn step<P: Processor>(cur: &mut Cursor<'_>, proc: &mut P) -> Result<Step, P::Error> {
    let at = cur.offset();
    let opcode = cur.read_u8()?;
    let (hi, lo) = (opcode >> 4, opcode & 0x0F);

    let unknown = || BytecodeError::UnknownOpcode { opcode, offset: at };

    match hi {
        0xF => return Ok(Step::Halt),

        0x0 => {
            let op = BinOp::from_low(lo).ok_or_else(unknown)?;
            proc.binop(cur, op)?;
        }

        0x1 => match lo {
            0 => {
                let n = cur.read_i32()?;
                proc.constant(cur, n)?;
            }
            1 => {
                let s = cur.read_str()?;
                proc.string(cur, s)?;
            }
            2 => {
                let tag = cur.read_str()?;
                let n = non_negative(cur.read_i32()?, at)?;
                proc.sexp(cur, tag, n)?;
            }
            3 => proc.sti(cur)?,
            4 => proc.sta(cur)?,
            5 => {
                let target = cur.read_i32()?;
                proc.jmp(cur, target)?;
            }
            6 => proc.end(cur)?,
            7 => proc.ret(cur)?,
            8 => proc.drop_top(cur)?,
            9 => proc.dup(cur)?,
            10 => proc.swap(cur)?,
            11 => proc.elem(cur)?,
            _ => return Err(unknown().into()),
        },

        0x2 => {
            let loc = cur.read_loc(lo)?;
            proc.ld(cur, loc)?;
        }
        0x3 => {
            let loc = cur.read_loc(lo)?;
            proc.lda(cur, loc)?;
        }
        0x4 => {
            let loc = cur.read_loc(lo)?;
            proc.st(cur, loc)?;
        }

        0x5 => match lo {
            0 | 1 => {
                let target = cur.read_i32()?;
                proc.cjmp(cur, target, lo == 1)?;
            }
            2 | 3 => {
                let n_args = non_negative(cur.read_i32()?, at)?;
                let n_locals = non_negative(cur.read_i32()?, at)?;
                proc.begin(cur, n_args, n_locals, lo == 3)?;
            }
            4 => {
                let target = cur.read_i32()?;
                let n = non_negative(cur.read_i32()?, at)?;
                let mut captures = Vec::with_capacity(n as usize);
                for _ in 0..n {
                    let kind = cur.read_u8()?;
                    captures.push(cur.read_loc(kind)?);
                }
                proc.closure(cur, target, &captures)?;
            }
            5 => {
                let n_args = non_negative(cur.read_i32()?, at)?;
                proc.callc(cur, n_args)?;
            }
            6 => {
                let target = cur.read_i32()?;
                let n_args = non_negative(cur.read_i32()?, at)?;
                proc.call(cur, target, n_args)?;
            }
            7 => {
                let tag = cur.read_str()?;
                let arity = cur.read_i32()?;
                proc.tag(cur, tag, arity)?;
            }
            8 => {
                let n = cur.read_i32()?;
                proc.array(cur, n)?;
            }
            9 => {
                let line = cur.read_i32()?;
                let col = cur.read_i32()?;
                proc.fail(cur, line, col)?;
            }
            10 => {
                let line = cur.read_i32()?;
                proc.line(cur, line)?;
            }
            _ => return Err(unknown().into()),
        },

        0x6 => {
            let p = Patt::from_low(lo).ok_or_else(unknown)?;
            proc.patt(cur, p)?;
        }

        0x7 => match lo {
            0 => proc.lread(cur)?,
            1 => proc.lwrite(cur)?,
            2 => proc.llength(cur)?,
            3 => proc.lstring(cur)?,
            4 => {
                let n = non_negative(cur.read_i32()?, at)?;
                proc.barray(cur, n)?;
            }
            _ => return Err(unknown().into()),
        },

        _ => return Err(unknown().into()),
    }

    Ok(Step::Continue)
}

fn non_negative(count: i32, offset: usize) -> Result<i32, BytecodeError> {
    if count < 0 {
        return Err(BytecodeError::NegativeCount { count, offset });
    }
    Ok(count)
}
