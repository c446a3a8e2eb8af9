//! Bytecode image loading, decoding, and dispatch.
//!
//! An [`Image`] is the validated in-memory form of a compiled bytecode
//! file. A [`Cursor`] streams over its code section with bounds checks.
//! [`step`] decodes one instruction and hands it to a [`Processor`]; the
//! interpreter and the static analyzer are both processors, and
//! [`InstructionPrinter`] renders instructions as text for them.

mod builder;
mod cursor;
mod disasm;
mod error;
mod image;
mod op;
mod process;

pub use builder::ImageBuilder;
pub use cursor::Cursor;
pub use disasm::InstructionPrinter;
pub use error::{BytecodeError, ImageError};
pub use image::{Image, ENTRY_SYMBOL};
pub use op::{BinOp, Loc, LocKind, Patt, StrRef};
pub use process::{step, Processor, Step};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_output_round_trips_through_the_printer() {
        let mut b = ImageBuilder::new();
        b.public("main", 0);
        b.const_int(1);
        b.const_int(2);
        b.binop(BinOp::Mul);
        b.sexp("cons", 2);
        b.tag("cons", 2);
        b.fail(4, 11);
        b.stop();

        let image = Image::from_bytes(b.build()).expect("valid image");
        let mut cur = Cursor::new(&image);
        let mut printer = InstructionPrinter::new();
        while step(&mut cur, &mut printer).expect("decode") == Step::Continue {}

        assert_eq!(
            printer.finish(),
            "CONST 1, CONST 2, BINOP *, SEXP cons 2, TAG cons 2, FAIL 4 11"
        );
    }

    #[test]
    fn decoding_always_advances_or_halts() {
        let mut b = ImageBuilder::new();
        b.public("main", 0);
        b.begin(2, 0);
        b.const_int(7);
        b.drop_top();
        b.stop();

        let image = Image::from_bytes(b.build()).expect("valid image");
        let mut cur = Cursor::new(&image);
        struct Sink;
        impl Processor for Sink {
            type Error = BytecodeError;
        }
        let mut sink = Sink;
        let mut last = cur.offset();
        loop {
            match step(&mut cur, &mut sink).expect("decode") {
                Step::Continue => {
                    assert!(cur.offset() > last, "cursor must advance");
                    assert!(cur.offset() <= image.code_size());
                    last = cur.offset();
                }
                Step::Halt => break,
            }
        }
    }
}
