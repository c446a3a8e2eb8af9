//! Per-opcode interpreter semantics.
//!
//! The interpreter is a [`Processor`]: the dispatch layer decodes one
//! instruction and calls back into the matching handler here. All
//! integer arithmetic happens on untagged payloads and results are
//! re-tagged; allocator calls receive their arguments as windows of the
//! value stack so every live value stays visible to the collector.

use bytecode::{step, BinOp, Cursor, Image, Loc, LocKind, Patt, Processor, Step, StrRef};
use log::{debug, trace};
use runtime::{Runtime, Tag, Value};

use crate::error::{Diagnostic, VmError};
use crate::stack::{CStack, VStack};

pub struct Interp<'a> {
    image: &'a Image,
    rt: &'a mut Runtime,
    vstack: VStack,
    cstack: CStack,
}

/// Load-time bootstrap, execution, and the fatal-diagnostic wrapper.
pub fn run(image: &Image, rt: &mut Runtime) -> Result<(), Diagnostic> {
    match Interp::new(image, rt) {
        Ok(mut interp) => interp.execute(),
        Err(source) => Err(Diagnostic {
            offset: image.entrypoint(),
            opcode: 0,
            vstack_top: 0,
            cstack_depth: 0,
            source,
        }),
    }
}

impl<'a> Interp<'a> {
    pub fn new(image: &'a Image, rt: &'a mut Runtime) -> Result<Self, VmError> {
        let vstack = VStack::new(image.global_area_size())?;
        let mut cstack = CStack::new();
        // The sentinel call record: the outermost END returns to the
        // one-past-end offset, which the loop reads as completion.
        cstack.push_call(false, image.code_size())?;
        debug!(
            "bootstrap: {} global words, entry {:#010x}",
            image.global_area_size(),
            image.entrypoint()
        );
        Ok(Interp {
            image,
            rt,
            vstack,
            cstack,
        })
    }

    fn execute(&mut self) -> Result<(), Diagnostic> {
        let image = self.image;
        let mut cur = Cursor::at(image, image.entrypoint())
            .map_err(|e| self.diagnostic(image.entrypoint(), 0, e.into()))?;
        loop {
            let at = cur.offset();
            if at == image.code_size() {
                break;
            }
            let opcode = image.code()[at];
            trace!("{at:#010x}: opcode {opcode:#04x}");
            match step(&mut cur, self) {
                Ok(Step::Continue) => {}
                Ok(Step::Halt) => break,
                Err(source) => return Err(self.diagnostic(at, opcode, source)),
            }
        }
        Ok(())
    }

    fn diagnostic(&self, offset: usize, opcode: u8, source: VmError) -> Diagnostic {
        Diagnostic {
            offset,
            opcode,
            vstack_top: self.vstack.sp(),
            cstack_depth: self.cstack.depth(),
            source,
        }
    }

    fn load_loc(&mut self, loc: Loc) -> Result<Value, VmError> {
        match loc.kind {
            LocKind::Global => Ok(*self.vstack.global(loc.index as isize)?),
            LocKind::Local => {
                let fp = self.cstack.frame_pointer()?;
                let n_locals = self.cstack.n_locals()?;
                Ok(*self.vstack.local(fp, n_locals, loc.index as isize)?)
            }
            LocKind::Arg => {
                let fp = self.cstack.frame_pointer()?;
                let n_args = self.cstack.n_args()?;
                Ok(*self.vstack.arg(fp, n_args, loc.index as isize)?)
            }
            LocKind::Closure => {
                let cell = self.closure_cell()?;
                Ok(self.rt.heap().closure_capture(cell, loc.index as isize)?)
            }
        }
    }

    fn store_loc(&mut self, loc: Loc, v: Value) -> Result<(), VmError> {
        match loc.kind {
            LocKind::Global => *self.vstack.global(loc.index as isize)? = v,
            LocKind::Local => {
                let fp = self.cstack.frame_pointer()?;
                let n_locals = self.cstack.n_locals()?;
                *self.vstack.local(fp, n_locals, loc.index as isize)? = v;
            }
            LocKind::Arg => {
                let fp = self.cstack.frame_pointer()?;
                let n_args = self.cstack.n_args()?;
                *self.vstack.arg(fp, n_args, loc.index as isize)? = v;
            }
            LocKind::Closure => {
                let cell = self.closure_cell()?;
                self.rt
                    .heap_mut()
                    .closure_capture_set(cell, loc.index as isize, v)?;
            }
        }
        Ok(())
    }

    /// The closure value of the current frame. Only meaningful when the
    /// frame was entered through CALLC.
    fn closure_cell(&self) -> Result<Value, VmError> {
        if !self.cstack.is_closure()? {
            return Err(VmError::Runtime(runtime::RuntimeError::NotAClosure {
                found: "a frame without a closure cell",
            }));
        }
        let fp = self.cstack.frame_pointer()?;
        let n_args = self.cstack.n_args()?;
        self.vstack.closure_cell(fp, n_args)
    }
}

impl Processor for Interp<'_> {
    type Error = VmError;

    fn binop(&mut self, _cur: &mut Cursor<'_>, op: BinOp) -> Result<(), VmError> {
        let rhs = self.vstack.pop()?.to_int();
        let lhs = self.vstack.pop()?.to_int();
        let v = match op {
            BinOp::Add => lhs.wrapping_add(rhs),
            BinOp::Sub => lhs.wrapping_sub(rhs),
            BinOp::Mul => lhs.wrapping_mul(rhs),
            BinOp::Div | BinOp::Rem if rhs == 0 => {
                return Err(VmError::DivisionByZero { lhs });
            }
            BinOp::Div => lhs.wrapping_div(rhs),
            BinOp::Rem => lhs.wrapping_rem(rhs),
            BinOp::Lt => (lhs < rhs) as isize,
            BinOp::Le => (lhs <= rhs) as isize,
            BinOp::Gt => (lhs > rhs) as isize,
            BinOp::Ge => (lhs >= rhs) as isize,
            BinOp::Eq => (lhs == rhs) as isize,
            BinOp::Ne => (lhs != rhs) as isize,
            BinOp::And => (lhs != 0 && rhs != 0) as isize,
            BinOp::Or => (lhs != 0 || rhs != 0) as isize,
        };
        self.vstack.push(Value::from_int(v))
    }

    fn constant(&mut self, _cur: &mut Cursor<'_>, n: i32) -> Result<(), VmError> {
        self.vstack.push(Value::from_int(n as isize))
    }

    fn string(&mut self, cur: &mut Cursor<'_>, s: StrRef) -> Result<(), VmError> {
        let bytes = cur.image().str_bytes(s)?;
        let v = self.rt.heap_mut().string(bytes);
        self.vstack.push(v)
    }

    fn sexp(&mut self, cur: &mut Cursor<'_>, tag: StrRef, n: i32) -> Result<(), VmError> {
        let hash = runtime::tag_hash(cur.image().str_bytes(tag)?)?;
        // The tag rides on the stack during allocation, together with
        // the fields below it.
        self.vstack.push(hash)?;
        let v = self.rt.heap_mut().sexp(self.vstack.window(n as usize + 1)?);
        self.vstack.drop_n(n as usize + 1)?;
        self.vstack.push(v)
    }

    fn sti(&mut self, _cur: &mut Cursor<'_>) -> Result<(), VmError> {
        Err(VmError::Unsupported("STI"))
    }

    fn sta(&mut self, _cur: &mut Cursor<'_>) -> Result<(), VmError> {
        let val = self.vstack.pop()?;
        let idx = self.vstack.pop()?;
        let dst = self.vstack.pop()?;
        let r = self.rt.heap_mut().sta(dst, idx, val)?;
        self.vstack.push(r)
    }

    fn jmp(&mut self, cur: &mut Cursor<'_>, target: i32) -> Result<(), VmError> {
        cur.jump(target as i64)?;
        Ok(())
    }

    fn end(&mut self, cur: &mut Cursor<'_>) -> Result<(), VmError> {
        let fp = self.cstack.frame_pointer()?;
        let n_locals = self.cstack.n_locals()?;
        let n_args = self.cstack.n_args()?;
        let is_closure = self.cstack.is_closure()?;
        let ret = self.cstack.return_offset()?;

        let locals_base = fp
            .checked_sub(n_locals)
            .ok_or(VmError::ValueStackUnderflow)?;
        // A return value is whatever the body left above the locals.
        let retval = if self.vstack.sp() < locals_base {
            Some(self.vstack.pop()?)
        } else {
            None
        };

        // Discard locals, arguments, and the closure cell if any.
        self.vstack.set_sp(fp + n_args + is_closure as usize)?;
        if let Some(v) = retval {
            self.vstack.push(v)?;
        }

        cur.jump(ret as i64)?;
        self.cstack.pop_frame()
    }

    fn ret(&mut self, _cur: &mut Cursor<'_>) -> Result<(), VmError> {
        Err(VmError::Unsupported("RET"))
    }

    fn drop_top(&mut self, _cur: &mut Cursor<'_>) -> Result<(), VmError> {
        self.vstack.pop()?;
        Ok(())
    }

    fn dup(&mut self, _cur: &mut Cursor<'_>) -> Result<(), VmError> {
        let v = self.vstack.peek(0)?;
        self.vstack.push(v)
    }

    fn swap(&mut self, _cur: &mut Cursor<'_>) -> Result<(), VmError> {
        let x = self.vstack.pop()?;
        let y = self.vstack.pop()?;
        self.vstack.push(x)?;
        self.vstack.push(y)
    }

    fn elem(&mut self, _cur: &mut Cursor<'_>) -> Result<(), VmError> {
        let idx = self.vstack.pop()?;
        let src = self.vstack.pop()?;
        let v = self.rt.heap().elem(src, idx)?;
        self.vstack.push(v)
    }

    fn ld(&mut self, _cur: &mut Cursor<'_>, loc: Loc) -> Result<(), VmError> {
        let v = self.load_loc(loc)?;
        self.vstack.push(v)
    }

    fn lda(&mut self, _cur: &mut Cursor<'_>, _loc: Loc) -> Result<(), VmError> {
        Err(VmError::Unsupported("LDA"))
    }

    fn st(&mut self, _cur: &mut Cursor<'_>, loc: Loc) -> Result<(), VmError> {
        let v = self.vstack.pop()?;
        self.store_loc(loc, v)?;
        // The assignment leaves its value on the stack.
        self.vstack.push(v)
    }

    fn cjmp(&mut self, cur: &mut Cursor<'_>, target: i32, nonzero: bool) -> Result<(), VmError> {
        let v = self.vstack.pop()?.to_int();
        if (v != 0) == nonzero {
            cur.jump(target as i64)?;
        }
        Ok(())
    }

    fn begin(
        &mut self,
        cur: &mut Cursor<'_>,
        n_args: i32,
        n_locals: i32,
        closure_entry: bool,
    ) -> Result<(), VmError> {
        if closure_entry {
            // CBEGIN carries no extra semantics yet; noted for a future
            // distinct entry path for curried closures.
            debug!("CBEGIN at {:#010x} handled as BEGIN", cur.offset());
        }
        let fp = self.vstack.sp();
        self.cstack.push_frame(fp, n_args as usize, n_locals as usize)?;
        for _ in 0..n_locals {
            self.vstack.push(Value::from_int(0))?;
        }
        Ok(())
    }

    fn closure(&mut self, _cur: &mut Cursor<'_>, target: i32, captures: &[Loc]) -> Result<(), VmError> {
        for &loc in captures {
            let v = self.load_loc(loc)?;
            self.vstack.push(v)?;
        }
        // The raw target offset rides on the stack under the captures,
        // mirroring the closure's own layout.
        self.vstack.push(Value::from_raw(target as usize))?;
        let v = self
            .rt
            .heap_mut()
            .closure(self.vstack.window(captures.len() + 1)?);
        self.vstack.drop_n(captures.len() + 1)?;
        self.vstack.push(v)
    }

    fn callc(&mut self, cur: &mut Cursor<'_>, n_args: i32) -> Result<(), VmError> {
        // The closure sits just above the arguments.
        let cell = self.vstack.peek(n_args as usize)?;
        let target = self.rt.heap().closure_target(cell)?;
        self.cstack.push_call(true, cur.offset())?;
        cur.jump(target as i64)?;
        Ok(())
    }

    fn call(&mut self, cur: &mut Cursor<'_>, target: i32, n_args: i32) -> Result<(), VmError> {
        // The arguments must already be on the stack.
        self.vstack.window(n_args as usize)?;
        self.cstack.push_call(false, cur.offset())?;
        cur.jump(target as i64)?;
        Ok(())
    }

    fn tag(&mut self, cur: &mut Cursor<'_>, tag: StrRef, arity: i32) -> Result<(), VmError> {
        let hash = runtime::tag_hash(cur.image().str_bytes(tag)?)?;
        let dst = self.vstack.pop()?;
        let r = self.rt.heap().tag_check(dst, hash, arity as isize);
        self.vstack.push(r)
    }

    fn array(&mut self, _cur: &mut Cursor<'_>, n: i32) -> Result<(), VmError> {
        let dst = self.vstack.pop()?;
        let r = self.rt.heap().array_check(dst, n as isize);
        self.vstack.push(r)
    }

    fn fail(&mut self, _cur: &mut Cursor<'_>, line: i32, col: i32) -> Result<(), VmError> {
        Err(VmError::Failure { line, col })
    }

    fn line(&mut self, _cur: &mut Cursor<'_>, _line: i32) -> Result<(), VmError> {
        Ok(())
    }

    fn patt(&mut self, _cur: &mut Cursor<'_>, p: Patt) -> Result<(), VmError> {
        let x = self.vstack.pop()?;
        let r = match p {
            Patt::StrEq => {
                let y = self.vstack.pop()?;
                self.rt.heap().string_eq(x, y)
            }
            Patt::String => self.rt.heap().shape_check(x, Tag::String),
            Patt::Array => self.rt.heap().shape_check(x, Tag::Array),
            Patt::Sexp => self.rt.heap().shape_check(x, Tag::Sexp),
            Patt::Boxed => Value::truth(x.is_ref()),
            Patt::Unboxed => Value::truth(x.is_int()),
            Patt::Closure => self.rt.heap().shape_check(x, Tag::Closure),
        };
        self.vstack.push(r)
    }

    fn lread(&mut self, _cur: &mut Cursor<'_>) -> Result<(), VmError> {
        let v = self.rt.read()?;
        self.vstack.push(v)
    }

    fn lwrite(&mut self, _cur: &mut Cursor<'_>) -> Result<(), VmError> {
        let x = self.vstack.pop()?;
        let r = self.rt.write(x)?;
        self.vstack.push(r)
    }

    fn llength(&mut self, _cur: &mut Cursor<'_>) -> Result<(), VmError> {
        let x = self.vstack.pop()?;
        let r = self.rt.length(x)?;
        self.vstack.push(r)
    }

    fn lstring(&mut self, _cur: &mut Cursor<'_>) -> Result<(), VmError> {
        // Render from the stack slot, then replace it with the result.
        let x = self.vstack.peek(0)?;
        let s = self.rt.stringify(x)?;
        self.vstack.pop()?;
        self.vstack.push(s)
    }

    fn barray(&mut self, _cur: &mut Cursor<'_>, n: i32) -> Result<(), VmError> {
        let v = self.rt.heap_mut().array(self.vstack.window(n as usize)?);
        self.vstack.drop_n(n as usize)?;
        self.vstack.push(v)
    }
}
