//! Runtime services for the virtual machine: tagged values, the heap
//! allocation contract, tag hashing, and the library builtins
//! (`read`, `write`, `length`, `string`).
//!
//! The collector itself is a collaborator behind this interface. The
//! arena in [`heap::Heap`] defers all reclamation to teardown; every
//! entry point that allocates receives its inputs as a borrowed window
//! of the value stack, which is exactly the root-visibility protocol a
//! moving collector needs from the interpreter.

mod error;
mod heap;
mod value;

use std::io::{self, BufRead, BufReader, Write};

pub use error::RuntimeError;
pub use heap::{Heap, Tag};
pub use value::Value;

/// Alphabet of tag hashing: each character encodes as its 6-bit
/// position in this string.
const TAG_CHARS: &[u8] = b"_abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ'";

/// At most this many characters of a tag are significant.
const TAG_HASH_CHARS: usize = 5;

/// Hash a constructor tag into an immediate integer.
pub fn tag_hash(tag: &[u8]) -> Result<Value, RuntimeError> {
    if tag.len() > TAG_HASH_CHARS {
        return Err(RuntimeError::BadTag {
            tag: String::from_utf8_lossy(tag).into_owned(),
            reason: "longer than five characters",
        });
    }
    let mut h: isize = 0;
    for &c in tag {
        let pos = TAG_CHARS
            .iter()
            .position(|&t| t == c)
            .ok_or_else(|| RuntimeError::BadTag {
                tag: String::from_utf8_lossy(tag).into_owned(),
                reason: "character outside the tag alphabet",
            })?;
        h = (h << 6) | pos as isize;
    }
    Ok(Value::from_int(h))
}

/// Recover the characters of a hashed tag.
pub fn tag_unhash(hash: Value) -> String {
    let mut h = hash.to_int() as u64;
    let mut chars = Vec::new();
    while h != 0 {
        let c = TAG_CHARS.get((h & 0x3F) as usize).copied().unwrap_or(b'?');
        chars.push(c);
        h >>= 6;
    }
    chars.reverse();
    String::from_utf8_lossy(&chars).into_owned()
}

/// The heap plus the program's I/O endpoints.
pub struct Runtime {
    heap: Heap,
    input: Box<dyn BufRead>,
    output: Box<dyn Write>,
}

impl Runtime {
    /// A runtime wired to the process's stdin and stdout.
    pub fn new() -> Self {
        Runtime::with_io(BufReader::new(io::stdin()), io::stdout())
    }

    /// A runtime with injected I/O, used by tests to capture output.
    pub fn with_io(input: impl BufRead + 'static, output: impl Write + 'static) -> Self {
        Runtime {
            heap: Heap::new(),
            input: Box::new(input),
            output: Box::new(output),
        }
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    /// Prompt for and read one integer. A line that does not parse
    /// reads as zero.
    pub fn read(&mut self) -> Result<Value, RuntimeError> {
        write!(self.output, "> ")?;
        self.output.flush()?;
        let mut line = String::new();
        self.input.read_line(&mut line)?;
        let n = line.trim().parse::<isize>().unwrap_or(0);
        Ok(Value::from_int(n))
    }

    /// Print one integer value followed by a newline. Returns boxed
    /// zero, the unit result.
    pub fn write(&mut self, v: Value) -> Result<Value, RuntimeError> {
        writeln!(self.output, "{}", v.to_int())?;
        Ok(Value::from_int(0))
    }

    /// Length of a string, array, or sexp as an immediate integer.
    pub fn length(&self, v: Value) -> Result<Value, RuntimeError> {
        Ok(Value::from_int(self.heap.length(v)? as isize))
    }

    /// Allocate the string representation of an arbitrary value.
    pub fn stringify(&mut self, v: Value) -> Result<Value, RuntimeError> {
        let mut s = String::new();
        self.render(v, &mut s);
        Ok(self.heap.string(s.as_bytes()))
    }

    fn render(&self, v: Value, out: &mut String) {
        use std::fmt::Write as _;

        if v.is_int() {
            let _ = write!(out, "{}", v.to_int());
            return;
        }
        match self.heap.tag_of(v) {
            Some(Tag::String) => {
                let bytes = self.heap.str_bytes(v).unwrap_or(b"");
                out.push_str(&String::from_utf8_lossy(bytes));
            }
            Some(Tag::Array) => {
                out.push('[');
                for (i, &e) in self.heap.fields(v).unwrap_or(&[]).iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.render(e, out);
                }
                out.push(']');
            }
            Some(Tag::Sexp) => {
                let tag = self.heap.sexp_tag(v).unwrap_or(Value::ZERO);
                out.push_str(&tag_unhash(tag));
                let fields = self.heap.fields(v).unwrap_or(&[]);
                if !fields.is_empty() {
                    out.push_str(" (");
                    for (i, &e) in fields.iter().enumerate() {
                        if i > 0 {
                            out.push_str(", ");
                        }
                        self.render(e, out);
                    }
                    out.push(')');
                }
            }
            Some(Tag::Closure) => out.push_str("<closure>"),
            None => out.push_str("<unknown>"),
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Runtime::new()
    }
}
